use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use tacet_arg::cancel::CancelToken;
use tacet_arg::graph::{NodeKey, ResourceId};

use crate::block::{
    BoxedBlock, ExploredSpace, RoundCx, Signal, UpdatePayload,
};
use crate::config::RefinerOptions;
use crate::error::RefineError;
use crate::precision::Precision;
use crate::result::{BlockTag, StagePayload, Verdict};
use crate::stats::RefinementReport;

/// External state-space exploration, re-run between rounds.
pub trait Explorer {
    /// Rebuild the explored space under the accumulated precision. Node
    /// keys must start at `key_seed` so keys of the discarded round are
    /// never reused.
    fn explore(
        &mut self,
        precision: &Precision,
        key_seed: NodeKey,
    ) -> Result<ExploredSpace, RefineError>;
}

/// Root CEGAR driver.
///
/// Runs the refinement chain over every resource of the explored space,
/// collects precision increments, and re-explores under the merged
/// precision until a round produces none (or the round bound is hit).
/// Non-fatal stage errors abandon the current resource only; cancellation
/// and a malformed graph unwind the whole run.
pub struct RefinementDriver<E: Explorer> {
    chain: BoxedBlock<ResourceId>,
    explorer: E,
    options: RefinerOptions,
    cancel: CancelToken,
    global_precision: Precision,
    per_resource: BTreeMap<ResourceId, Precision>,
    confirmed: BTreeSet<ResourceId>,
    report: RefinementReport,
}

impl<E: Explorer> RefinementDriver<E> {
    pub fn new(
        chain: BoxedBlock<ResourceId>,
        explorer: E,
        options: RefinerOptions,
        cancel: CancelToken,
    ) -> Self {
        Self {
            chain,
            explorer,
            options,
            cancel,
            global_precision: Precision::new(),
            per_resource: BTreeMap::new(),
            confirmed: BTreeSet::new(),
            report: RefinementReport::default(),
        }
    }

    /// Refine the explored space to a fixpoint. Returns whether any race
    /// was confirmed.
    pub fn perform_refinement(&mut self, space: ExploredSpace) -> Result<bool, RefineError> {
        let mut space = space;
        let mut rounds = 0;
        loop {
            rounds += 1;
            space
                .graph
                .validate()
                .map_err(|err| RefineError::MalformedGraph(err.to_string()))?;
            let (round_precision, confirmations) = self.run_round(&mut space)?;
            self.global_precision.merge(&round_precision);

            let should_re_explore = !round_precision.is_empty()
                || confirmations >= self.options.confirmation_batch;
            if !should_re_explore {
                debug!(round = rounds, "no new precision, fixpoint reached");
                break;
            }
            if rounds >= self.options.max_rounds {
                warn!(rounds, "round bound hit before fixpoint");
                break;
            }
            let key_seed = space.graph.next_key_seed();
            info!(
                round = rounds,
                precision = self.global_precision.len(),
                "re-exploring under refined precision"
            );
            space = self.explorer.explore(&self.global_precision, key_seed)?;
        }
        self.report.rounds = rounds;
        self.report.graph_fingerprint = space.graph.fingerprint();
        self.report().emit();
        Ok(!self.confirmed.is_empty())
    }

    /// One pass over all resources. The driver's finish signal reaches the
    /// chain on every exit path, so round-lifetime caches never leak into
    /// the next round.
    fn run_round(
        &mut self,
        space: &mut ExploredSpace,
    ) -> Result<(Precision, usize), RefineError> {
        let mut cx = RoundCx {
            graph: &space.graph,
            usages: &mut space.usages,
            cancel: &self.cancel,
        };
        self.chain.signal(&Signal::start(BlockTag::Driver), &mut cx)?;

        let mut round_precision = Precision::new();
        let mut confirmations = 0usize;
        let mut fatal: Option<RefineError> = None;
        let resources: Vec<ResourceId> = cx.usages.resources().cloned().collect();
        for resource in resources {
            if self.confirmed.contains(&resource) {
                continue;
            }
            if let Err(err) = cx.check_cancelled() {
                fatal = Some(err);
                break;
            }
            match self.chain.refine(&resource, &mut cx) {
                Ok(result) => {
                    round_precision.merge(&result.precision);
                    if !result.precision.is_empty() {
                        self.per_resource
                            .entry(resource.clone())
                            .or_default()
                            .merge(&result.precision);
                    }
                    if let Some(StagePayload::Infeasible { nodes, .. }) =
                        result.payload(BlockTag::Driver)
                    {
                        if !nodes.is_empty() {
                            let update = Signal::update(
                                BlockTag::Driver,
                                BlockTag::PathPairs,
                                UpdatePayload::UnreachableNodes(nodes.clone()),
                            );
                            if let Err(err) = self.chain.signal(&update, &mut cx) {
                                fatal = Some(err);
                                break;
                            }
                        }
                    }
                    match result.verdict {
                        Verdict::Confirmed => {
                            confirmations += 1;
                            self.confirmed.insert(resource.clone());
                            self.report.races_confirmed += 1;
                            info!(resource = %resource, "race confirmed");
                        }
                        Verdict::Refuted => {
                            debug!(resource = %resource, "no race this round");
                        }
                        Verdict::Inconclusive => {
                            debug!(resource = %resource, "refinement inconclusive");
                        }
                    }
                }
                Err(err) if err.is_fatal() => {
                    fatal = Some(err);
                    break;
                }
                Err(err) => {
                    warn!(resource = %resource, error = %err, "stage failed, resource abandoned");
                    self.report.resources_aborted += 1;
                }
            }
        }

        let finish = self.chain.signal(&Signal::finish(BlockTag::Driver), &mut cx);
        match fatal {
            Some(err) => Err(err),
            None => {
                finish?;
                Ok((round_precision, confirmations))
            }
        }
    }

    /// Resources with a confirmed race.
    pub fn confirmed_races(&self) -> impl Iterator<Item = &ResourceId> {
        self.confirmed.iter()
    }

    pub fn precision(&self) -> &Precision {
        &self.global_precision
    }

    /// Precision accumulated for one resource across all rounds.
    pub fn resource_precision(&self, resource: &ResourceId) -> Option<&Precision> {
        self.per_resource.get(resource)
    }

    /// Snapshot of the run statistics, including every stage's counters.
    pub fn report(&self) -> RefinementReport {
        let mut report = self.report.clone();
        report.precision_entries = self.global_precision.len();
        self.chain.collect_stats(&mut report);
        report
    }
}
