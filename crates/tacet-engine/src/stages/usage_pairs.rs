use tracing::debug;

use tacet_arg::usage::UsageId;

use crate::adapters::{BlockIteration, IterStep};
use crate::block::{OccurrencePair, PointPair, RoundCx, Signal, SignalKind};
use crate::error::RefineError;
use crate::result::{BlockTag, RefinementResult, Verdict};

/// Enumerates concrete occurrence pairs within one point pair.
///
/// Bounded by a per-round cap on emitted pairs; unreachable occurrences
/// are skipped as lower layers poison them. Structurally equal occurrences
/// with a looped side are repeated counterexamples and are not retried,
/// the loop mark spreading to both sides instead.
pub struct UsagePairIteration {
    cap: usize,
    emitted_in_round: usize,
    cap_logged: bool,
    firsts: Vec<UsageId>,
    seconds: Vec<UsageId>,
    row: usize,
    col: usize,
}

impl UsagePairIteration {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            emitted_in_round: 0,
            cap_logged: false,
            firsts: Vec::new(),
            seconds: Vec::new(),
            row: 0,
            col: 0,
        }
    }
}

impl BlockIteration for UsagePairIteration {
    type Input = PointPair;
    type Item = OccurrencePair;

    fn tag(&self) -> BlockTag {
        BlockTag::UsagePairs
    }

    fn init(&mut self, input: &PointPair, cx: &mut RoundCx<'_>) -> Result<(), RefineError> {
        self.firsts = cx.usages.occurrences_at(&input.resource, &input.first);
        self.seconds = cx.usages.occurrences_at(&input.resource, &input.second);
        self.row = 0;
        self.col = 0;
        Ok(())
    }

    fn next(
        &mut self,
        input: &PointPair,
        cx: &mut RoundCx<'_>,
    ) -> Result<IterStep<OccurrencePair>, RefineError> {
        loop {
            if self.emitted_in_round >= self.cap {
                if !self.cap_logged {
                    self.cap_logged = true;
                    debug!(
                        resource = %input.resource,
                        cap = self.cap,
                        "occurrence pair cap reached for this round"
                    );
                }
                return Ok(IterStep::Done);
            }
            if self.row >= self.firsts.len() {
                return Ok(IterStep::Done);
            }
            if self.col >= self.seconds.len() {
                self.row += 1;
                self.col = 0;
                continue;
            }
            let (first, second) = (self.firsts[self.row], self.seconds[self.col]);
            self.col += 1;
            if first == second {
                continue;
            }
            // On a trivial point pair both sides draw from the same list;
            // keep one orientation of each pair.
            if input.is_trivial() && second < first {
                continue;
            }
            if !cx.usages.occurrence(first).reachable || !cx.usages.occurrence(second).reachable {
                continue;
            }
            let (a, b) = (cx.usages.occurrence(first), cx.usages.occurrence(second));
            if a.structurally_equal(b) && (a.looped || b.looped) {
                cx.usages.occurrence_mut(first).looped = true;
                cx.usages.occurrence_mut(second).looped = true;
                continue;
            }
            self.emitted_in_round += 1;
            return Ok(IterStep::Item(OccurrencePair {
                resource: input.resource.clone(),
                first,
                second,
            }));
        }
    }

    fn on_finalize(
        &mut self,
        item: &OccurrencePair,
        result: &RefinementResult,
        cx: &mut RoundCx<'_>,
    ) -> Result<(), RefineError> {
        // A pair of interchangeable occurrences that refinement could not
        // decide will come back unchanged; mark it as a repeated
        // counterexample so the next enumeration stops retrying it.
        if result.verdict == Verdict::Inconclusive {
            let (a, b) = (cx.usages.occurrence(item.first), cx.usages.occurrence(item.second));
            if a.structurally_equal(b) {
                cx.usages.occurrence_mut(item.first).looped = true;
                cx.usages.occurrence_mut(item.second).looped = true;
            }
        }
        Ok(())
    }

    fn on_signal(&mut self, signal: &Signal, _cx: &mut RoundCx<'_>) -> Result<(), RefineError> {
        if signal.kind == SignalKind::Start && signal.origin == BlockTag::Driver {
            self.emitted_in_round = 0;
            self.cap_logged = false;
        }
        Ok(())
    }
}
