use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::result::BlockTag;

/// Counters one stage contributes to the report. Fields a stage has no use
/// for stay zero and are skipped on serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageCounters {
    /// Candidates this stage produced or forwarded to its inner block.
    #[serde(skip_serializing_if = "is_zero")]
    pub items: u64,
    /// Inner confirmations that short-circuited the iteration.
    #[serde(skip_serializing_if = "is_zero")]
    pub short_circuits: u64,
    /// Candidates parked on the postponed queue.
    #[serde(skip_serializing_if = "is_zero")]
    pub postponed: u64,
    /// Candidates refuted by an admissibility pre-check.
    #[serde(skip_serializing_if = "is_zero")]
    pub filtered: u64,
    /// Paths served from the reconstruction memo.
    #[serde(skip_serializing_if = "is_zero")]
    pub memo_hits: u64,
    /// Paths freshly reconstructed.
    #[serde(skip_serializing_if = "is_zero")]
    pub paths_built: u64,
    /// Occurrences poisoned after their path space was exhausted.
    #[serde(skip_serializing_if = "is_zero")]
    pub poisoned: u64,
    /// Sides skipped because an earlier run already accepted them.
    #[serde(skip_serializing_if = "is_zero")]
    pub skipped_accepted: u64,
    /// Oracle "unknown" answers downgraded to inconclusive verdicts.
    #[serde(skip_serializing_if = "is_zero")]
    pub downgraded_unknown: u64,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// End-of-run summary of a refinement run, serializable for embedding
/// hosts and regression baselines.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefinementReport {
    /// Exploration rounds performed (at least one).
    pub rounds: usize,
    pub races_confirmed: u64,
    /// Resources abandoned after a non-fatal stage error.
    pub resources_aborted: u64,
    /// Entries in the accumulated global precision.
    pub precision_entries: usize,
    /// Fingerprint of the final round's explored graph.
    pub graph_fingerprint: String,
    pub stages: BTreeMap<String, StageCounters>,
}

impl RefinementReport {
    /// Counter slot for a stage, created on first use.
    pub fn stage_mut(&mut self, tag: BlockTag) -> &mut StageCounters {
        self.stages.entry(tag.to_string()).or_default()
    }

    pub fn stage(&self, tag: BlockTag) -> Option<&StageCounters> {
        self.stages.get(&tag.to_string())
    }

    /// Log the headline numbers.
    pub fn emit(&self) {
        info!(
            rounds = self.rounds,
            races = self.races_confirmed,
            aborted = self.resources_aborted,
            precision = self.precision_entries,
            fingerprint = %self.graph_fingerprint,
            "refinement finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_slots_are_created_on_demand() {
        let mut report = RefinementReport::default();
        report.stage_mut(BlockTag::Oracle).downgraded_unknown += 1;
        assert_eq!(
            report.stage(BlockTag::Oracle).map(|s| s.downgraded_unknown),
            Some(1)
        );
        assert!(report.stage(BlockTag::Points).is_none());
    }
}
