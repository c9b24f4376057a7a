use crate::block::{BoxedBlock, PathPair, RefinementBlock, RoundCx, SidePath, Signal};
use crate::error::RefineError;
use crate::result::{BlockTag, RefinementResult, Side, Verdict};
use crate::stats::RefinementReport;

/// Validates one side of a path pair in isolation.
pub trait SideRefiner {
    fn tag(&self) -> BlockTag;

    /// Check a single reconstructed path. A refuted result must carry the
    /// precision increment that rules the path out, and should address an
    /// infeasibility payload at the path-pair iterator so it can exclude
    /// the path and rebuild.
    fn refine_side(
        &mut self,
        side: Side,
        side_path: &SidePath,
        cx: &mut RoundCx<'_>,
    ) -> Result<RefinementResult, RefineError>;

    fn collect_stats(&self, _report: &mut RefinementReport) {}
}

/// Per-side validation adapter, run before the joint pair check.
///
/// Each side is validated on its own; a side proven infeasible poisons its
/// occurrence and refutes the pair without touching the other side. A side
/// that validates is marked accepted on the occurrence, so reruns of the
/// same occurrence skip straight through. Only when both sides stand does
/// the pair reach the inner block.
pub struct SidePathBlock<R: SideRefiner> {
    sides: R,
    inner: BoxedBlock<PathPair>,
    skipped_accepted: u64,
    poisoned: u64,
}

impl<R: SideRefiner> SidePathBlock<R> {
    pub fn new(sides: R, inner: BoxedBlock<PathPair>) -> Self {
        Self {
            sides,
            inner,
            skipped_accepted: 0,
            poisoned: 0,
        }
    }
}

impl<R: SideRefiner> RefinementBlock for SidePathBlock<R> {
    type Input = PathPair;

    fn tag(&self) -> BlockTag {
        self.sides.tag()
    }

    fn refine(
        &mut self,
        input: &PathPair,
        cx: &mut RoundCx<'_>,
    ) -> Result<RefinementResult, RefineError> {
        cx.check_cancelled()?;
        for side in Side::both() {
            let side_path = input.side(side);
            if cx.usages.occurrence(side_path.occurrence).accepted {
                self.skipped_accepted += 1;
                continue;
            }
            let result = self.sides.refine_side(side, side_path, cx)?;
            match result.verdict {
                Verdict::Refuted => {
                    cx.poison(side_path.occurrence, &result.precision);
                    self.poisoned += 1;
                    return Ok(result);
                }
                Verdict::Confirmed => {
                    cx.usages.occurrence_mut(side_path.occurrence).accepted = true;
                }
                Verdict::Inconclusive => return Ok(result),
            }
        }
        self.inner.refine(input, cx)
    }

    fn signal(&mut self, signal: &Signal, cx: &mut RoundCx<'_>) -> Result<(), RefineError> {
        self.inner.signal(signal, cx)
    }

    fn collect_stats(&self, report: &mut RefinementReport) {
        let counters = report.stage_mut(self.tag());
        counters.skipped_accepted += self.skipped_accepted;
        counters.poisoned += self.poisoned;
        self.sides.collect_stats(report);
        self.inner.collect_stats(report);
    }
}
