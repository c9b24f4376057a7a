//! The refinement block abstraction: the object-safe stage trait, the
//! per-round context handed to every call, the addressed control signals,
//! and the candidate item types flowing between chain links.

use tacet_arg::cancel::CancelToken;
use tacet_arg::graph::{ExploredGraph, NodeKey, ResourceId};
use tacet_arg::path::Path;
use tacet_arg::usage::{UsageId, UsagePoint, UsageStore};

use crate::error::RefineError;
use crate::precision::Precision;
use crate::result::{BlockTag, RefinementResult, Side};
use crate::stats::RefinementReport;

/// The explored state space of one exploration round: the state DAG plus
/// the usage store built over it.
#[derive(Debug, Clone, Default)]
pub struct ExploredSpace {
    pub graph: ExploredGraph,
    pub usages: UsageStore,
}

/// Context threaded through every refinement call of one round.
///
/// The graph is read-only for stages; the usage store may be mutated, but
/// only through the occurrence flags (poisoning, loop and accept marks).
pub struct RoundCx<'a> {
    pub graph: &'a ExploredGraph,
    pub usages: &'a mut UsageStore,
    pub cancel: &'a CancelToken,
}

impl RoundCx<'_> {
    pub fn check_cancelled(&self) -> Result<(), RefineError> {
        self.cancel.check().map_err(Into::into)
    }

    /// Mark an occurrence permanently unreachable for this round.
    ///
    /// Poisoning without a precision increment would silently lose a proof
    /// obligation, so the caller must pass the increment that justifies it.
    pub fn poison(&mut self, id: UsageId, delta: &Precision) {
        debug_assert!(!delta.is_empty(), "poisoning needs a precision increment");
        self.usages.occurrence_mut(id).reachable = false;
    }
}

/// Control signal kinds exchanged along the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalKind {
    /// A new round (or sub-iteration) begins.
    Start,
    /// The sender is done; round-lifetime caches keyed on it must drop.
    Finish,
    Update(UpdatePayload),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdatePayload {
    /// These node keys were proven unreachable; cached paths through them
    /// are stale.
    UnreachableNodes(Vec<NodeKey>),
}

/// Where a signal is going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalTarget {
    /// Every stage along the chain.
    Broadcast,
    /// Exactly the stage with this tag.
    Stage(BlockTag),
}

/// An addressed control signal. Every signal carries its origin so stages
/// can react differently to, say, a finish from the driver versus one from
/// an intermediate iterator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub kind: SignalKind,
    pub origin: BlockTag,
    pub target: SignalTarget,
}

impl Signal {
    pub fn start(origin: BlockTag) -> Self {
        Self {
            kind: SignalKind::Start,
            origin,
            target: SignalTarget::Broadcast,
        }
    }

    pub fn finish(origin: BlockTag) -> Self {
        Self {
            kind: SignalKind::Finish,
            origin,
            target: SignalTarget::Broadcast,
        }
    }

    pub fn update(origin: BlockTag, target: BlockTag, payload: UpdatePayload) -> Self {
        Self {
            kind: SignalKind::Update(payload),
            origin,
            target: SignalTarget::Stage(target),
        }
    }

    /// Is this signal meant for a stage with the given tag?
    pub fn addressed_to(&self, tag: BlockTag) -> bool {
        match self.target {
            SignalTarget::Broadcast => true,
            SignalTarget::Stage(t) => t == tag,
        }
    }
}

/// One link of the refinement chain.
///
/// Object-safe so chains compose as `Box<dyn RefinementBlock<Input = _>>`;
/// adjacent links differ in their input type, which is how the chain
/// refines candidates step by step from whole resources down to concrete
/// path pairs.
pub trait RefinementBlock {
    type Input;

    fn tag(&self) -> BlockTag;

    /// Refine one candidate. Implementations call into their inner block
    /// (if any) and must check cancellation at their boundary.
    fn refine(
        &mut self,
        input: &Self::Input,
        cx: &mut RoundCx<'_>,
    ) -> Result<RefinementResult, RefineError>;

    /// Receive a control signal. Implementations handle signals addressed
    /// to them and forward everything downstream.
    fn signal(&mut self, signal: &Signal, cx: &mut RoundCx<'_>) -> Result<(), RefineError>;

    /// Contribute counters to the end-of-run report.
    fn collect_stats(&self, report: &mut RefinementReport);
}

pub type BoxedBlock<I> = Box<dyn RefinementBlock<Input = I>>;

/// A pair of distinct usage points of one resource, the candidate unit
/// between the point iterator and the occurrence-pair iterator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointPair {
    pub resource: ResourceId,
    pub first: UsagePoint,
    pub second: UsagePoint,
}

impl PointPair {
    /// Same point on both sides.
    pub fn is_trivial(&self) -> bool {
        self.first == self.second
    }
}

/// A pair of concrete occurrences at the points of a [`PointPair`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccurrencePair {
    pub resource: ResourceId,
    pub first: UsageId,
    pub second: UsageId,
}

impl OccurrencePair {
    pub fn side(&self, side: Side) -> UsageId {
        match side {
            Side::First => self.first,
            Side::Second => self.second,
        }
    }
}

/// One side of a path pair: an occurrence together with a reconstructed
/// root-to-occurrence path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidePath {
    pub occurrence: UsageId,
    pub path: Path,
}

/// Concrete counterexample candidate: two occurrences with reconstructed
/// paths, ready for context compatibility checks and the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPair {
    pub resource: ResourceId,
    pub first: SidePath,
    pub second: SidePath,
}

impl PathPair {
    pub fn side(&self, side: Side) -> &SidePath {
        match side {
            Side::First => &self.first,
            Side::Second => &self.second,
        }
    }
}
