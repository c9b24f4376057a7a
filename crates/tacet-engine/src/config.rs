use serde::{Deserialize, Serialize};

use tacet_arg::graph::ResourceId;

use crate::adapters::{FilterBlock, IteratingBlock, SidePathBlock};
use crate::block::BoxedBlock;
use crate::error::RefineError;
use crate::oracle::{OracleBlock, OracleSideRefiner, SharedOracle};
use crate::result::BlockTag;
use crate::stages::{
    CompatFilterBlock, PathPairIteration, PointIteration, UsagePairIteration, UsagePointFilter,
};
use crate::transfer::ContextTransfer;

/// Stage names as they appear in a pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    Points,
    UsagePairs,
    UsageFilter,
    PathPairs,
    Compat,
    SinglePath,
    Oracle,
}

/// Outermost-to-innermost canonical order of the chain.
const CANONICAL: [StageName; 7] = [
    StageName::Points,
    StageName::UsagePairs,
    StageName::UsageFilter,
    StageName::PathPairs,
    StageName::Compat,
    StageName::SinglePath,
    StageName::Oracle,
];

const MANDATORY: [StageName; 5] = [
    StageName::Points,
    StageName::UsagePairs,
    StageName::PathPairs,
    StageName::SinglePath,
    StageName::Oracle,
];

/// Pipeline configuration: which stages run, and the iteration bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefinerOptions {
    /// Enabled stages, outermost first.
    pub chain: Vec<StageName>,
    /// Occurrence pairs emitted per round, across all point pairs.
    pub usage_pair_cap: usize,
    /// Reconstruction attempts per occurrence per round.
    pub path_attempt_cap: usize,
    /// Upper bound on exploration rounds.
    pub max_rounds: usize,
    /// Re-explore even without new precision once this many races were
    /// confirmed in a round.
    pub confirmation_batch: usize,
}

impl Default for RefinerOptions {
    fn default() -> Self {
        Self {
            chain: CANONICAL.to_vec(),
            usage_pair_cap: 256,
            path_attempt_cap: 8,
            max_rounds: 8,
            confirmation_batch: 4,
        }
    }
}

impl RefinerOptions {
    fn enabled(&self, stage: StageName) -> bool {
        self.chain.contains(&stage)
    }

    /// Reject chains that are not a sub-sequence of the canonical order or
    /// that miss a mandatory stage.
    pub fn validate(&self) -> Result<(), RefineError> {
        let positions: Vec<usize> = self
            .chain
            .iter()
            .map(|stage| {
                CANONICAL
                    .iter()
                    .position(|c| c == stage)
                    .ok_or_else(|| RefineError::Config(format!("unknown stage {stage:?}")))
            })
            .collect::<Result<_, _>>()?;
        if positions.windows(2).any(|w| w[0] >= w[1]) {
            return Err(RefineError::Config(
                "stages out of order or duplicated".into(),
            ));
        }
        for stage in MANDATORY {
            if !self.enabled(stage) {
                return Err(RefineError::Config(format!(
                    "mandatory stage {stage:?} missing from chain"
                )));
            }
        }
        if self.max_rounds == 0 {
            return Err(RefineError::Config("max_rounds must be at least 1".into()));
        }
        Ok(())
    }
}

/// Assemble the refinement chain, innermost link first.
///
/// `transfer` is required exactly when the compatibility filter is part of
/// the chain.
pub fn build_chain<T>(
    options: &RefinerOptions,
    oracle: SharedOracle,
    transfer: Option<T>,
) -> Result<BoxedBlock<ResourceId>, RefineError>
where
    T: ContextTransfer + 'static,
{
    options.validate()?;

    let mut path_level: BoxedBlock<_> = Box::new(OracleBlock::new(oracle.clone()));
    path_level = Box::new(SidePathBlock::new(OracleSideRefiner::new(oracle), path_level));
    if options.enabled(StageName::Compat) {
        let transfer = transfer.ok_or_else(|| {
            RefineError::Config("compat stage enabled but no context transfer supplied".into())
        })?;
        path_level = Box::new(CompatFilterBlock::new(transfer, path_level));
    }

    let mut pair_level: BoxedBlock<_> = Box::new(IteratingBlock::new(
        PathPairIteration::new(options.path_attempt_cap),
        path_level,
    ));
    if options.enabled(StageName::UsageFilter) {
        pair_level = Box::new(FilterBlock::new(UsagePointFilter, pair_level));
    }

    let point_level: BoxedBlock<_> = Box::new(IteratingBlock::new(
        UsagePairIteration::new(options.usage_pair_cap),
        pair_level,
    ));
    Ok(Box::new(IteratingBlock::new(
        PointIteration::new(),
        point_level,
    )))
}

impl From<StageName> for BlockTag {
    fn from(stage: StageName) -> Self {
        match stage {
            StageName::Points => BlockTag::Points,
            StageName::UsagePairs => BlockTag::UsagePairs,
            StageName::UsageFilter => BlockTag::UsageFilter,
            StageName::PathPairs => BlockTag::PathPairs,
            StageName::Compat => BlockTag::Compat,
            StageName::SinglePath => BlockTag::SinglePath,
            StageName::Oracle => BlockTag::Oracle,
        }
    }
}
