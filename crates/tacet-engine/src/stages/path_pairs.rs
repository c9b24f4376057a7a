use std::collections::BTreeMap;

use tracing::debug;

use tacet_arg::exclusion::ExclusionSet;
use tacet_arg::graph::NodeKey;
use tacet_arg::path::Path;
use tacet_arg::reconstruct::reconstruct;
use tacet_arg::usage::UsageId;

use crate::adapters::{BlockIteration, IterStep};
use crate::block::{OccurrencePair, PathPair, RoundCx, SidePath, Signal, SignalKind, UpdatePayload};
use crate::error::RefineError;
use crate::precision::Precision;
use crate::result::{BlockTag, RefinementResult, Side, StagePayload};
use crate::stats::RefinementReport;

/// Lazily reconstructs concrete paths for an occurrence pair and retries
/// with diverse paths as the lower layers refute them.
///
/// Accepted paths are memoized per occurrence for the rest of the round.
/// A joint infeasibility coming back from below turns the blamed side's
/// path into an exclusion, so the next reconstruction explores a different
/// path; when the diverse path space of an occurrence runs out, the
/// occurrence is poisoned with the precision accumulated from those
/// refutations. Reconstruction per occurrence is bounded by an attempt
/// cap.
pub struct PathPairIteration {
    attempt_cap: usize,
    memo: BTreeMap<UsageId, Path>,
    exclusions: BTreeMap<UsageId, ExclusionSet>,
    attempts: BTreeMap<UsageId, usize>,
    refuted_precision: BTreeMap<UsageId, Precision>,
    last_emitted: Option<(Vec<NodeKey>, Vec<NodeKey>)>,
    done: bool,
    memo_hits: u64,
    built: u64,
    poisoned: u64,
}

impl PathPairIteration {
    pub fn new(attempt_cap: usize) -> Self {
        Self {
            attempt_cap,
            memo: BTreeMap::new(),
            exclusions: BTreeMap::new(),
            attempts: BTreeMap::new(),
            refuted_precision: BTreeMap::new(),
            last_emitted: None,
            done: false,
            memo_hits: 0,
            built: 0,
            poisoned: 0,
        }
    }

    /// Path for one occurrence: memoized, or freshly reconstructed under
    /// the occurrence's exclusions. `None` means the side is dead (already
    /// poisoned, capped out, or its path space just ran dry).
    fn side_path(
        &mut self,
        id: UsageId,
        cx: &mut RoundCx<'_>,
    ) -> Result<Option<Path>, RefineError> {
        let (target, reachable) = {
            let occ = cx.usages.occurrence(id);
            (occ.target, occ.reachable)
        };
        if !reachable {
            return Ok(None);
        }
        if let Some(path) = self.memo.get(&id) {
            self.memo_hits += 1;
            return Ok(Some(path.clone()));
        }
        let tried = self.attempts.get(&id).copied().unwrap_or(0);
        if tried >= self.attempt_cap {
            debug!(occurrence = id, cap = self.attempt_cap, "reconstruction attempt cap reached");
            return Ok(None);
        }
        let exclusions = self.exclusions.entry(id).or_default();
        let no_exclusions = exclusions.is_empty();
        let outcome = reconstruct(cx.graph, target, exclusions, cx.cancel)?;
        match outcome {
            Some(path) => {
                self.attempts.insert(id, tried + 1);
                self.built += 1;
                self.memo.insert(id, path.clone());
                Ok(Some(path))
            }
            None if no_exclusions => Err(RefineError::MalformedGraph(format!(
                "no root reaches the target of occurrence {id}"
            ))),
            None => {
                // Every diverse path was refuted; the refutations' precision
                // justifies poisoning the occurrence.
                let accumulated = self.refuted_precision.remove(&id).unwrap_or_default();
                cx.poison(id, &accumulated);
                self.poisoned += 1;
                debug!(occurrence = id, "path space exhausted, occurrence poisoned");
                Ok(None)
            }
        }
    }

    /// Dropping a memoized path also clears the occurrence's accepted
    /// mark: the replacement path must stand on its own.
    fn drop_memo(&mut self, id: UsageId, cx: &mut RoundCx<'_>) {
        if self.memo.remove(&id).is_some() {
            cx.usages.occurrence_mut(id).accepted = false;
        }
    }

    /// Drop every memoized path running through a node proven infeasible.
    fn drop_stale_memos(&mut self, nodes: &[NodeKey], cx: &mut RoundCx<'_>) {
        if nodes.is_empty() {
            return;
        }
        let stale: Vec<UsageId> = self
            .memo
            .iter()
            .filter(|(_, path)| path.key_sequence().iter().any(|k| nodes.contains(k)))
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            self.drop_memo(id, cx);
        }
    }

    /// Which side does a joint infeasibility blame? Prefer the payload's
    /// own attribution, then the side whose path contains a culprit node.
    fn blamed_side(item: &PathPair, side: Option<Side>, nodes: &[NodeKey]) -> Side {
        if let Some(side) = side {
            return side;
        }
        for candidate in Side::both() {
            let keys = item.side(candidate).path.key_sequence();
            if nodes.iter().any(|n| keys.contains(n)) {
                return candidate;
            }
        }
        Side::First
    }
}

impl BlockIteration for PathPairIteration {
    type Input = OccurrencePair;
    type Item = PathPair;

    fn tag(&self) -> BlockTag {
        BlockTag::PathPairs
    }

    fn init(&mut self, _input: &OccurrencePair, _cx: &mut RoundCx<'_>) -> Result<(), RefineError> {
        self.done = false;
        self.last_emitted = None;
        Ok(())
    }

    fn next(
        &mut self,
        input: &OccurrencePair,
        cx: &mut RoundCx<'_>,
    ) -> Result<IterStep<PathPair>, RefineError> {
        if self.done {
            return Ok(IterStep::Done);
        }
        let Some(first) = self.side_path(input.first, cx)? else {
            self.done = true;
            return Ok(IterStep::Done);
        };
        let Some(second) = self.side_path(input.second, cx)? else {
            self.done = true;
            return Ok(IterStep::Done);
        };
        let signature = (
            first.key_sequence().to_vec(),
            second.key_sequence().to_vec(),
        );
        // A refutation that changed nothing below would hand us the same
        // pair forever.
        if self.last_emitted.as_ref() == Some(&signature) {
            self.done = true;
            return Ok(IterStep::Done);
        }
        self.last_emitted = Some(signature);
        Ok(IterStep::Item(PathPair {
            resource: input.resource.clone(),
            first: SidePath {
                occurrence: input.first,
                path: first,
            },
            second: SidePath {
                occurrence: input.second,
                path: second,
            },
        }))
    }

    fn on_finalize(
        &mut self,
        item: &PathPair,
        result: &RefinementResult,
        cx: &mut RoundCx<'_>,
    ) -> Result<(), RefineError> {
        if let Some(StagePayload::Infeasible { side, nodes }) = result.payload(self.tag()) {
            let blamed = Self::blamed_side(item, *side, nodes);
            let side_path = item.side(blamed);
            // A side poisoned below us is out of the game; only a still
            // reachable side gets an exclusion and another attempt.
            if cx.usages.occurrence(side_path.occurrence).reachable {
                self.exclusions
                    .entry(side_path.occurrence)
                    .or_default()
                    .insert(side_path.path.key_sequence().to_vec());
                self.refuted_precision
                    .entry(side_path.occurrence)
                    .or_default()
                    .merge(&result.precision);
                self.drop_memo(side_path.occurrence, cx);
            }
            // Memoized paths of other occurrences through the infeasible
            // segment are stale too.
            self.drop_stale_memos(nodes, cx);
        }
        // Paths of occurrences poisoned below us are dead weight.
        for side in Side::both() {
            let id = item.side(side).occurrence;
            if !cx.usages.occurrence(id).reachable {
                self.drop_memo(id, cx);
            }
        }
        Ok(())
    }

    fn on_signal(&mut self, signal: &Signal, cx: &mut RoundCx<'_>) -> Result<(), RefineError> {
        match &signal.kind {
            // Memo and exclusions live for the round, so only the driver's
            // finish drops them; finishes from intermediate iterators pass
            // through.
            SignalKind::Finish if signal.origin == BlockTag::Driver => {
                self.memo.clear();
                self.exclusions.clear();
                self.attempts.clear();
                self.refuted_precision.clear();
                self.last_emitted = None;
            }
            SignalKind::Update(UpdatePayload::UnreachableNodes(keys)) => {
                self.drop_stale_memos(keys, cx);
            }
            _ => {}
        }
        Ok(())
    }

    fn collect_stats(&self, report: &mut RefinementReport) {
        let counters = report.stage_mut(self.tag());
        counters.memo_hits += self.memo_hits;
        counters.paths_built += self.built;
        counters.poisoned += self.poisoned;
    }
}
