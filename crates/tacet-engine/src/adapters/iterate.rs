use std::collections::VecDeque;

use crate::block::{BoxedBlock, RoundCx, Signal};
use crate::error::RefineError;
use crate::precision::Precision;
use crate::result::{BlockTag, RefinementResult, Verdict};
use crate::stats::RefinementReport;

/// One step of a candidate derivation.
#[derive(Debug)]
pub enum IterStep<T> {
    /// Refine this candidate now.
    Item(T),
    /// Park this candidate; it runs only after the main enumeration is
    /// exhausted without a confirmation.
    Postpone(T),
    Done,
}

/// Delegate that derives child candidates from one input candidate.
///
/// The surrounding [`IteratingBlock`] owns the loop: it drives `next`,
/// feeds each item to the inner block, short-circuits on confirmation,
/// accumulates precision otherwise, and calls `on_finalize` after every
/// non-confirmed item so the delegate can react to the verdict.
pub trait BlockIteration {
    type Input;
    type Item;

    fn tag(&self) -> BlockTag;

    /// Reset derivation state for a fresh input.
    fn init(&mut self, input: &Self::Input, cx: &mut RoundCx<'_>) -> Result<(), RefineError>;

    fn next(
        &mut self,
        input: &Self::Input,
        cx: &mut RoundCx<'_>,
    ) -> Result<IterStep<Self::Item>, RefineError>;

    fn on_finalize(
        &mut self,
        _item: &Self::Item,
        _result: &RefinementResult,
        _cx: &mut RoundCx<'_>,
    ) -> Result<(), RefineError> {
        Ok(())
    }

    /// Hook for signals addressed to this stage.
    fn on_signal(&mut self, _signal: &Signal, _cx: &mut RoundCx<'_>) -> Result<(), RefineError> {
        Ok(())
    }

    fn collect_stats(&self, _report: &mut RefinementReport) {}
}

/// Iterator adapter: turns a [`BlockIteration`] delegate plus an inner
/// block into a chain link.
///
/// A confirmed verdict from the inner block ends the iteration at once,
/// with all precision accumulated so far merged into the confirmation.
/// When the candidate space is exhausted the result is refuted, or
/// inconclusive if any item was. The finish-signal reaches the inner block
/// on every exit path, including errors, and the postponed queue never
/// outlives one `refine` call.
pub struct IteratingBlock<D: BlockIteration> {
    delegate: D,
    inner: BoxedBlock<D::Item>,
    postponed: VecDeque<D::Item>,
    items: u64,
    short_circuits: u64,
    postponed_total: u64,
}

impl<D: BlockIteration> IteratingBlock<D> {
    pub fn new(delegate: D, inner: BoxedBlock<D::Item>) -> Self {
        Self {
            delegate,
            inner,
            postponed: VecDeque::new(),
            items: 0,
            short_circuits: 0,
            postponed_total: 0,
        }
    }

    fn run(
        &mut self,
        input: &D::Input,
        cx: &mut RoundCx<'_>,
    ) -> Result<RefinementResult, RefineError> {
        let mut running = Precision::new();
        let mut any_inconclusive = false;
        loop {
            cx.check_cancelled()?;
            match self.delegate.next(input, cx)? {
                IterStep::Done => break,
                IterStep::Postpone(item) => {
                    self.postponed_total += 1;
                    self.postponed.push_back(item);
                }
                IterStep::Item(item) => {
                    if let Some(hit) = self.step(item, &mut running, &mut any_inconclusive, cx)? {
                        return Ok(hit);
                    }
                }
            }
        }
        while let Some(item) = self.postponed.pop_front() {
            cx.check_cancelled()?;
            if let Some(hit) = self.step(item, &mut running, &mut any_inconclusive, cx)? {
                return Ok(hit);
            }
        }
        let mut result = if any_inconclusive {
            RefinementResult::inconclusive()
        } else {
            RefinementResult::refuted(Precision::new())
        };
        result.precision = running;
        Ok(result)
    }

    fn step(
        &mut self,
        item: D::Item,
        running: &mut Precision,
        any_inconclusive: &mut bool,
        cx: &mut RoundCx<'_>,
    ) -> Result<Option<RefinementResult>, RefineError> {
        self.items += 1;
        let mut result = self.inner.refine(&item, cx)?;
        if result.is_confirmed() {
            self.short_circuits += 1;
            result.precision.merge(running);
            return Ok(Some(result));
        }
        running.merge(&result.precision);
        if result.verdict == Verdict::Inconclusive {
            *any_inconclusive = true;
        }
        self.delegate.on_finalize(&item, &result, cx)?;
        Ok(None)
    }
}

impl<D: BlockIteration> crate::block::RefinementBlock for IteratingBlock<D> {
    type Input = D::Input;

    fn tag(&self) -> BlockTag {
        self.delegate.tag()
    }

    fn refine(
        &mut self,
        input: &Self::Input,
        cx: &mut RoundCx<'_>,
    ) -> Result<RefinementResult, RefineError> {
        cx.check_cancelled()?;
        self.delegate.init(input, cx)?;
        let body = self.run(input, cx);
        // Finish must reach the inner block on every exit path so its
        // iteration-scoped caches cannot leak into the next candidate.
        self.postponed.clear();
        let finish = self.inner.signal(&Signal::finish(self.tag()), cx);
        match body {
            Err(err) => Err(err),
            Ok(result) => {
                finish?;
                Ok(result)
            }
        }
    }

    fn signal(&mut self, signal: &Signal, cx: &mut RoundCx<'_>) -> Result<(), RefineError> {
        if signal.addressed_to(self.tag()) {
            self.delegate.on_signal(signal, cx)?;
        }
        self.inner.signal(signal, cx)
    }

    fn collect_stats(&self, report: &mut RefinementReport) {
        let counters = report.stage_mut(self.tag());
        counters.items += self.items;
        counters.short_circuits += self.short_circuits;
        counters.postponed += self.postponed_total;
        self.delegate.collect_stats(report);
        self.inner.collect_stats(report);
    }
}
