use crate::block::{BoxedBlock, RefinementBlock, RoundCx, Signal};
use crate::error::RefineError;
use crate::precision::Precision;
use crate::result::{BlockTag, RefinementResult, Side};
use crate::stats::RefinementReport;

/// A cheap admissibility pre-check over pair candidates.
///
/// The filter extracts a comparable core per side and decides from the two
/// cores alone, never looking at anything expensive.
pub trait PairFilter {
    type Pair;
    type Core;

    fn tag(&self) -> BlockTag;

    fn core_of(&self, pair: &Self::Pair, side: Side, cx: &RoundCx<'_>) -> Self::Core;

    /// Can a pair with these cores still be a race at all?
    fn admissible(&self, first: &Self::Core, second: &Self::Core) -> bool;
}

/// Filter adapter: forwards a candidate to the inner block only when the
/// pre-check admits it, otherwise refutes outright.
///
/// Filter refutations carry no precision: the pre-check works on facts the
/// abstraction already tracks, so there is nothing new to request.
pub struct FilterBlock<F: PairFilter> {
    filter: F,
    inner: BoxedBlock<F::Pair>,
    filtered: u64,
    forwarded: u64,
}

impl<F: PairFilter> FilterBlock<F> {
    pub fn new(filter: F, inner: BoxedBlock<F::Pair>) -> Self {
        Self {
            filter,
            inner,
            filtered: 0,
            forwarded: 0,
        }
    }
}

impl<F: PairFilter> RefinementBlock for FilterBlock<F> {
    type Input = F::Pair;

    fn tag(&self) -> BlockTag {
        self.filter.tag()
    }

    fn refine(
        &mut self,
        input: &Self::Input,
        cx: &mut RoundCx<'_>,
    ) -> Result<RefinementResult, RefineError> {
        cx.check_cancelled()?;
        let first = self.filter.core_of(input, Side::First, cx);
        let second = self.filter.core_of(input, Side::Second, cx);
        if !self.filter.admissible(&first, &second) {
            self.filtered += 1;
            return Ok(RefinementResult::refuted(Precision::new()));
        }
        self.forwarded += 1;
        self.inner.refine(input, cx)
    }

    fn signal(&mut self, signal: &Signal, cx: &mut RoundCx<'_>) -> Result<(), RefineError> {
        // The filter itself is stateless.
        self.inner.signal(signal, cx)
    }

    fn collect_stats(&self, report: &mut RefinementReport) {
        let counters = report.stage_mut(self.tag());
        counters.filtered += self.filtered;
        counters.items += self.forwarded;
        self.inner.collect_stats(report);
    }
}
