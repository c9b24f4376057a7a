use tracing::debug;

use tacet_arg::graph::ExploredGraph;
use tacet_arg::path::Path;

use crate::block::{BoxedBlock, PathPair, RefinementBlock, RoundCx, Signal};
use crate::error::RefineError;
use crate::precision::{Precision, PrecisionEntry};
use crate::result::{BlockTag, RefinementResult};
use crate::stats::RefinementReport;
use crate::transfer::ContextTransfer;

/// Context compatibility filter over path pairs.
///
/// Replays the external transfer function along each side's path from the
/// initial snapshot to compute the synchronization context reachable at
/// the occurrence. Mutually exclusive contexts refute the pair; a second
/// replay over just the context-changing edges yields the minimal
/// precision hint for the refutation.
pub struct CompatFilterBlock<T: ContextTransfer> {
    transfer: T,
    inner: BoxedBlock<PathPair>,
    refuted: u64,
    forwarded: u64,
}

impl<T: ContextTransfer> CompatFilterBlock<T> {
    pub fn new(transfer: T, inner: BoxedBlock<PathPair>) -> Self {
        Self {
            transfer,
            inner,
            refuted: 0,
            forwarded: 0,
        }
    }

    fn replay(&self, path: &Path, graph: &ExploredGraph) -> T::Ctx {
        let mut ctx = self.transfer.initial();
        for &id in path.nodes() {
            let label = graph.label(id);
            if self.transfer.is_relevant(label) {
                ctx = self.transfer.apply(&ctx, label);
            }
        }
        ctx
    }

    /// Replay once more, keeping only the edges whose resulting context
    /// differs from the initial snapshot, and collect their hints.
    fn hint_edges(&self, path: &Path, graph: &ExploredGraph, precision: &mut Precision) {
        let initial = self.transfer.initial();
        let mut ctx = initial.clone();
        for &id in path.nodes() {
            let label = graph.label(id);
            if !self.transfer.is_relevant(label) {
                continue;
            }
            ctx = self.transfer.apply(&ctx, label);
            if ctx != initial {
                if let Some(hint) = self.transfer.hint(label) {
                    precision.insert(PrecisionEntry::new(label.location, hint));
                }
            }
        }
    }
}

impl<T: ContextTransfer> RefinementBlock for CompatFilterBlock<T> {
    type Input = PathPair;

    fn tag(&self) -> BlockTag {
        BlockTag::Compat
    }

    fn refine(
        &mut self,
        input: &PathPair,
        cx: &mut RoundCx<'_>,
    ) -> Result<RefinementResult, RefineError> {
        cx.check_cancelled()?;
        let first = self.replay(&input.first.path, cx.graph);
        let second = self.replay(&input.second.path, cx.graph);
        if self.transfer.mutually_exclusive(&first, &second) {
            self.refuted += 1;
            let mut precision = Precision::new();
            self.hint_edges(&input.first.path, cx.graph, &mut precision);
            self.hint_edges(&input.second.path, cx.graph, &mut precision);
            debug!(
                resource = %input.resource,
                hints = precision.len(),
                "contexts mutually exclusive, pair refuted"
            );
            return Ok(RefinementResult::refuted(precision));
        }
        self.forwarded += 1;
        self.inner.refine(input, cx)
    }

    fn signal(&mut self, signal: &Signal, cx: &mut RoundCx<'_>) -> Result<(), RefineError> {
        self.inner.signal(signal, cx)
    }

    fn collect_stats(&self, report: &mut RefinementReport) {
        let counters = report.stage_mut(self.tag());
        counters.filtered += self.refuted;
        counters.items += self.forwarded;
        self.inner.collect_stats(report);
    }
}
