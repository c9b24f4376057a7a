use std::fmt;

use tacet_arg::graph::StateLabel;

use crate::precision::RefinementHint;

/// External abstract transfer function over edge labels, replayed by the
/// compatibility filter to compute the synchronization context reachable
/// at an occurrence.
///
/// The core never interprets edge operations itself; a verifier supplies
/// the domain (a lockset analysis, typically) through this trait.
pub trait ContextTransfer {
    type Ctx: Clone + PartialEq + fmt::Debug;

    /// Context at every root, before any edge.
    fn initial(&self) -> Self::Ctx;

    /// Does this edge affect the context at all? Declaration and no-op
    /// edges are expected to be irrelevant.
    fn is_relevant(&self, label: &StateLabel) -> bool;

    fn apply(&self, ctx: &Self::Ctx, label: &StateLabel) -> Self::Ctx;

    /// Can states with these two contexts never be co-reachable?
    fn mutually_exclusive(&self, a: &Self::Ctx, b: &Self::Ctx) -> bool;

    /// Precision hint for a context-changing edge, used to build the
    /// minimal increment on incompatibility.
    fn hint(&self, label: &StateLabel) -> Option<RefinementHint>;
}
