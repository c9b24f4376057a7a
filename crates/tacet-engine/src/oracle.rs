//! Seam to the external feasibility oracle (an SMT-backed path checker in
//! a full verifier), plus the innermost chain link that consults it.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::mem;
use std::rc::Rc;

use thiserror::Error;
use tracing::debug;

use tacet_arg::graph::{ExploredGraph, NodeKey};
use tacet_arg::path::Path;

use crate::adapters::SideRefiner;
use crate::block::{PathPair, RefinementBlock, RoundCx, SidePath, Signal, SignalKind};
use crate::error::RefineError;
use crate::precision::Precision;
use crate::result::{BlockTag, RefinementResult, Side, StagePayload};
use crate::stats::RefinementReport;

/// Answer from the feasibility oracle.
#[derive(Debug, Clone)]
pub enum FeasibilityVerdict {
    Feasible,
    /// The path (or interleaving) cannot execute. The precision increment
    /// must be non-empty; `culprit` names the node keys of the infeasible
    /// segment and may be empty when the oracle cannot localize it.
    Infeasible {
        precision: Precision,
        culprit: Vec<NodeKey>,
    },
    /// The oracle gave up (timeout, incomplete theory). Downgraded to an
    /// inconclusive verdict rather than treated as an error.
    Unknown { reason: String },
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct OracleError(pub String);

/// External decision procedure for concrete path feasibility.
pub trait FeasibilityOracle {
    /// Is this single root-to-target path executable?
    fn check_path(
        &mut self,
        path: &Path,
        graph: &ExploredGraph,
    ) -> Result<FeasibilityVerdict, OracleError>;

    /// Can the two paths execute as one interleaving, both reaching their
    /// targets?
    fn check_pair(
        &mut self,
        first: &Path,
        second: &Path,
        graph: &ExploredGraph,
    ) -> Result<FeasibilityVerdict, OracleError>;
}

/// The oracle is shared between the joint check and the per-side check;
/// the core is single-threaded, so interior mutability is enough.
pub type SharedOracle = Rc<RefCell<dyn FeasibilityOracle>>;

fn require_precision(precision: Precision) -> Result<Precision, RefineError> {
    if precision.is_empty() {
        return Err(RefineError::Oracle(
            "oracle refuted a path without a precision increment".into(),
        ));
    }
    Ok(precision)
}

/// Innermost chain link: asks the oracle whether the candidate pair is a
/// feasible interleaving.
///
/// Joint infeasibility addresses the culprit nodes at the path-pair
/// iterator (for exclusion and rebuild). Culprits seen during the round
/// are also banked and ride the next confirmed result up to the driver,
/// which relays them as a stale-cache notification; only confirmations
/// survive the enclosing iterators intact.
pub struct OracleBlock {
    oracle: SharedOracle,
    round_culprits: BTreeSet<NodeKey>,
    checks: u64,
    downgraded: u64,
}

impl OracleBlock {
    pub fn new(oracle: SharedOracle) -> Self {
        Self {
            oracle,
            round_culprits: BTreeSet::new(),
            checks: 0,
            downgraded: 0,
        }
    }
}

impl RefinementBlock for OracleBlock {
    type Input = PathPair;

    fn tag(&self) -> BlockTag {
        BlockTag::Oracle
    }

    fn refine(
        &mut self,
        input: &PathPair,
        cx: &mut RoundCx<'_>,
    ) -> Result<RefinementResult, RefineError> {
        cx.check_cancelled()?;
        self.checks += 1;
        let verdict = self
            .oracle
            .borrow_mut()
            .check_pair(&input.first.path, &input.second.path, cx.graph)
            .map_err(|err| RefineError::Oracle(err.to_string()))?;
        match verdict {
            FeasibilityVerdict::Feasible => {
                let mut result = RefinementResult::confirmed(Precision::new());
                if !self.round_culprits.is_empty() {
                    let nodes = mem::take(&mut self.round_culprits);
                    result = result.with_payload(
                        BlockTag::Driver,
                        StagePayload::Infeasible {
                            side: None,
                            nodes: nodes.into_iter().collect(),
                        },
                    );
                }
                Ok(result)
            }
            FeasibilityVerdict::Infeasible { precision, culprit } => {
                let precision = require_precision(precision)?;
                self.round_culprits.extend(culprit.iter().copied());
                Ok(RefinementResult::refuted(precision).with_payload(
                    BlockTag::PathPairs,
                    StagePayload::Infeasible {
                        side: None,
                        nodes: culprit,
                    },
                ))
            }
            FeasibilityVerdict::Unknown { reason } => {
                self.downgraded += 1;
                debug!(resource = %input.resource, %reason, "oracle unknown, downgrading");
                Ok(RefinementResult::inconclusive())
            }
        }
    }

    fn signal(&mut self, signal: &Signal, _cx: &mut RoundCx<'_>) -> Result<(), RefineError> {
        // End of the chain; only the driver's round boundary drops the
        // banked culprits.
        if matches!(signal.kind, SignalKind::Finish) && signal.origin == BlockTag::Driver {
            self.round_culprits.clear();
        }
        Ok(())
    }

    fn collect_stats(&self, report: &mut RefinementReport) {
        let counters = report.stage_mut(self.tag());
        counters.items += self.checks;
        counters.downgraded_unknown += self.downgraded;
    }
}

/// Per-side oracle consultation, plugged into the single-path adapter.
pub struct OracleSideRefiner {
    oracle: SharedOracle,
    downgraded: u64,
}

impl OracleSideRefiner {
    pub fn new(oracle: SharedOracle) -> Self {
        Self {
            oracle,
            downgraded: 0,
        }
    }
}

impl SideRefiner for OracleSideRefiner {
    fn tag(&self) -> BlockTag {
        BlockTag::SinglePath
    }

    fn refine_side(
        &mut self,
        side: Side,
        side_path: &SidePath,
        cx: &mut RoundCx<'_>,
    ) -> Result<RefinementResult, RefineError> {
        let verdict = self
            .oracle
            .borrow_mut()
            .check_path(&side_path.path, cx.graph)
            .map_err(|err| RefineError::Oracle(err.to_string()))?;
        match verdict {
            FeasibilityVerdict::Feasible => Ok(RefinementResult::confirmed(Precision::new())),
            FeasibilityVerdict::Infeasible { precision, culprit } => {
                let precision = require_precision(precision)?;
                Ok(RefinementResult::refuted(precision).with_payload(
                    BlockTag::PathPairs,
                    StagePayload::Infeasible {
                        side: Some(side),
                        nodes: culprit,
                    },
                ))
            }
            FeasibilityVerdict::Unknown { reason } => {
                self.downgraded += 1;
                debug!(occurrence = side_path.occurrence, %reason, "oracle unknown on single path");
                Ok(RefinementResult::inconclusive())
            }
        }
    }

    fn collect_stats(&self, report: &mut RefinementReport) {
        report.stage_mut(self.tag()).downgraded_unknown += self.downgraded;
    }
}
