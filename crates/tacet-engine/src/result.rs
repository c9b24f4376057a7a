use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tacet_arg::graph::NodeKey;

use crate::precision::Precision;

/// Stable identity of a refinement stage within the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockTag {
    Driver,
    Points,
    UsagePairs,
    UsageFilter,
    PathPairs,
    Compat,
    SinglePath,
    Oracle,
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockTag::Driver => "driver",
            BlockTag::Points => "points",
            BlockTag::UsagePairs => "usage-pairs",
            BlockTag::UsageFilter => "usage-filter",
            BlockTag::PathPairs => "path-pairs",
            BlockTag::Compat => "compat",
            BlockTag::SinglePath => "single-path",
            BlockTag::Oracle => "oracle",
        };
        write!(f, "{name}")
    }
}

/// Outcome of refining one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// A real race was established; short-circuits every enclosing iterator.
    Confirmed,
    /// The candidate cannot race. Any proof obligation this discharges is
    /// carried in the precision increment.
    Refuted,
    /// Neither established nor excluded under the current abstraction.
    Inconclusive,
}

/// Which side of a symmetric pair a payload or sub-verdict refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    First,
    Second,
}

impl Side {
    pub fn both() -> [Side; 2] {
        [Side::First, Side::Second]
    }
}

/// Stage-specific data riding along with a result, addressed at the stage
/// that knows how to consume it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagePayload {
    /// A path (or pair of paths) was proven infeasible. `side` is set when
    /// a single side carries the blame; `nodes` are the keys the oracle
    /// identified as the infeasible segment, possibly empty.
    Infeasible {
        side: Option<Side>,
        nodes: Vec<NodeKey>,
    },
}

/// The verdict of one refinement call, with the accumulated precision
/// increment and any stage-addressed payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinementResult {
    pub verdict: Verdict,
    pub precision: Precision,
    payloads: BTreeMap<BlockTag, StagePayload>,
}

impl RefinementResult {
    pub fn confirmed(precision: Precision) -> Self {
        Self::new(Verdict::Confirmed, precision)
    }

    pub fn refuted(precision: Precision) -> Self {
        Self::new(Verdict::Refuted, precision)
    }

    pub fn inconclusive() -> Self {
        Self::new(Verdict::Inconclusive, Precision::new())
    }

    fn new(verdict: Verdict, precision: Precision) -> Self {
        Self {
            verdict,
            precision,
            payloads: BTreeMap::new(),
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.verdict == Verdict::Confirmed
    }

    pub fn is_refuted(&self) -> bool {
        self.verdict == Verdict::Refuted
    }

    /// Attach a payload addressed at `tag`, replacing any previous one.
    pub fn with_payload(mut self, tag: BlockTag, payload: StagePayload) -> Self {
        self.payloads.insert(tag, payload);
        self
    }

    pub fn payload(&self, tag: BlockTag) -> Option<&StagePayload> {
        self.payloads.get(&tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_are_addressed() {
        let result = RefinementResult::refuted(Precision::new()).with_payload(
            BlockTag::PathPairs,
            StagePayload::Infeasible {
                side: Some(Side::First),
                nodes: vec![7],
            },
        );
        assert!(result.payload(BlockTag::PathPairs).is_some());
        assert!(result.payload(BlockTag::Oracle).is_none());
    }
}
