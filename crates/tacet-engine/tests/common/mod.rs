#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use tacet_arg::graph::{
    AccessKind, EdgeOp, ExploredGraph, LockId, NodeKey, ResourceId, StateLabel,
};
use tacet_arg::path::Path;
use tacet_arg::usage::{UsagePoint, UsageStore};

use tacet_engine::block::{ExploredSpace, RefinementBlock, RoundCx, Signal};
use tacet_engine::driver::Explorer;
use tacet_engine::error::RefineError;
use tacet_engine::oracle::{FeasibilityOracle, FeasibilityVerdict, OracleError, SharedOracle};
use tacet_engine::precision::{Precision, PrecisionEntry, RefinementHint};
use tacet_engine::result::{BlockTag, RefinementResult};
use tacet_engine::stats::RefinementReport;
use tacet_engine::transfer::ContextTransfer;

pub fn resource(name: &str) -> ResourceId {
    ResourceId::new(name)
}

pub fn lock(name: &str) -> LockId {
    LockId::new(name)
}

pub fn bare_write() -> UsagePoint {
    UsagePoint::new([], AccessKind::Write)
}

pub fn infeasible_hint(location: u64) -> Precision {
    Precision::singleton(PrecisionEntry::new(location, RefinementHint::PathInfeasible))
}

/// Lockset domain: the context is the set of locks held.
pub struct LockSetTransfer;

impl ContextTransfer for LockSetTransfer {
    type Ctx = BTreeSet<LockId>;

    fn initial(&self) -> Self::Ctx {
        BTreeSet::new()
    }

    fn is_relevant(&self, label: &StateLabel) -> bool {
        matches!(label.op, EdgeOp::Acquire(_) | EdgeOp::Release(_))
    }

    fn apply(&self, ctx: &Self::Ctx, label: &StateLabel) -> Self::Ctx {
        let mut next = ctx.clone();
        match &label.op {
            EdgeOp::Acquire(lock) => {
                next.insert(lock.clone());
            }
            EdgeOp::Release(lock) => {
                next.remove(lock);
            }
            _ => {}
        }
        next
    }

    fn mutually_exclusive(&self, a: &Self::Ctx, b: &Self::Ctx) -> bool {
        !a.is_disjoint(b)
    }

    fn hint(&self, label: &StateLabel) -> Option<RefinementHint> {
        match &label.op {
            EdgeOp::Acquire(lock) | EdgeOp::Release(lock) => {
                Some(RefinementHint::LockRelevant(lock.clone()))
            }
            _ => None,
        }
    }
}

/// Scripted oracle: feasible unless a rule matches, every call logged.
#[derive(Default)]
pub struct ScriptOracle {
    /// (key-sequence, precision, culprit keys)
    pub infeasible_paths: Vec<(Vec<NodeKey>, Precision, Vec<NodeKey>)>,
    /// Pair rules keyed on a node key appearing on the first side.
    pub infeasible_pairs_containing: Vec<(NodeKey, Precision, Vec<NodeKey>)>,
    pub unknown_pairs: bool,
    /// Fail every pair check with this message.
    pub pair_error: Option<String>,
    /// Shared call counters, observable after the oracle moved behind the
    /// trait object.
    pub path_checks: Rc<RefCell<usize>>,
    pub pair_checks: Rc<RefCell<usize>>,
}

impl ScriptOracle {
    pub fn feasible() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedOracle {
        Rc::new(RefCell::new(self))
    }
}

impl FeasibilityOracle for ScriptOracle {
    fn check_path(
        &mut self,
        path: &Path,
        _graph: &ExploredGraph,
    ) -> Result<FeasibilityVerdict, OracleError> {
        *self.path_checks.borrow_mut() += 1;
        for (keys, precision, culprit) in &self.infeasible_paths {
            if path.key_sequence() == keys.as_slice() {
                return Ok(FeasibilityVerdict::Infeasible {
                    precision: precision.clone(),
                    culprit: culprit.clone(),
                });
            }
        }
        Ok(FeasibilityVerdict::Feasible)
    }

    fn check_pair(
        &mut self,
        first: &Path,
        _second: &Path,
        _graph: &ExploredGraph,
    ) -> Result<FeasibilityVerdict, OracleError> {
        *self.pair_checks.borrow_mut() += 1;
        if let Some(message) = &self.pair_error {
            return Err(OracleError(message.clone()));
        }
        if self.unknown_pairs {
            return Ok(FeasibilityVerdict::Unknown {
                reason: "solver timeout".into(),
            });
        }
        for (key, precision, culprit) in &self.infeasible_pairs_containing {
            if first.key_sequence().contains(key) {
                return Ok(FeasibilityVerdict::Infeasible {
                    precision: precision.clone(),
                    culprit: culprit.clone(),
                });
            }
        }
        Ok(FeasibilityVerdict::Feasible)
    }
}

/// Explorer that hands out pre-built spaces, one per re-exploration.
pub struct SequenceExplorer {
    pub spaces: Vec<ExploredSpace>,
    pub calls: usize,
}

impl SequenceExplorer {
    pub fn new(spaces: Vec<ExploredSpace>) -> Self {
        Self { spaces, calls: 0 }
    }

    /// An explorer for runs expected to finish in one round.
    pub fn unused() -> Self {
        Self::new(Vec::new())
    }
}

impl Explorer for SequenceExplorer {
    fn explore(
        &mut self,
        _precision: &Precision,
        key_seed: NodeKey,
    ) -> Result<ExploredSpace, RefineError> {
        if self.calls >= self.spaces.len() {
            return Err(RefineError::Exploration(
                "no further exploration scripted".into(),
            ));
        }
        let mut space = self.spaces[self.calls].clone();
        self.calls += 1;
        // Rebuild with fresh keys, keeping the scripted structure.
        let mut graph = ExploredGraph::with_key_seed(key_seed);
        for id in space.graph.node_ids() {
            graph.add_node(space.graph.label(id).clone());
        }
        for id in space.graph.node_ids() {
            for &child in space.graph.children(id) {
                graph
                    .add_edge(id, child)
                    .map_err(|err| RefineError::Exploration(err.to_string()))?;
            }
        }
        space.graph = graph;
        Ok(space)
    }
}

/// Two unguarded writes to one resource, racing.
pub fn unguarded_write_space(res: &ResourceId) -> ExploredSpace {
    let mut graph = ExploredGraph::new();
    let root = graph.add_node(StateLabel::noop(0));
    let w1 = graph.add_node(StateLabel::new(
        1,
        EdgeOp::Access(res.clone(), AccessKind::Write),
    ));
    let w2 = graph.add_node(StateLabel::new(
        2,
        EdgeOp::Access(res.clone(), AccessKind::Write),
    ));
    graph.add_edge(root, w1).unwrap();
    graph.add_edge(root, w2).unwrap();

    let mut usages = UsageStore::new();
    usages.add_occurrence(res.clone(), w1, bare_write());
    usages.add_occurrence(res.clone(), w2, bare_write());
    ExploredSpace { graph, usages }
}

/// A single write occurrence; nothing to pair it with.
pub fn single_write_space(res: &ResourceId) -> ExploredSpace {
    let mut graph = ExploredGraph::new();
    let root = graph.add_node(StateLabel::noop(0));
    let w = graph.add_node(StateLabel::new(
        1,
        EdgeOp::Access(res.clone(), AccessKind::Write),
    ));
    graph.add_edge(root, w).unwrap();
    let mut usages = UsageStore::new();
    usages.add_occurrence(res.clone(), w, bare_write());
    ExploredSpace { graph, usages }
}

/// Both writes guarded by the same lock on their paths, but the usage
/// points do not know it yet (the lock domain is still coarse).
pub fn guarded_write_space(res: &ResourceId, guard: &LockId) -> ExploredSpace {
    let mut graph = ExploredGraph::new();
    let root = graph.add_node(StateLabel::noop(0));
    let acq1 = graph.add_node(StateLabel::new(1, EdgeOp::Acquire(guard.clone())));
    let w1 = graph.add_node(StateLabel::new(
        2,
        EdgeOp::Access(res.clone(), AccessKind::Write),
    ));
    let acq2 = graph.add_node(StateLabel::new(3, EdgeOp::Acquire(guard.clone())));
    let w2 = graph.add_node(StateLabel::new(
        4,
        EdgeOp::Access(res.clone(), AccessKind::Write),
    ));
    graph.add_edge(root, acq1).unwrap();
    graph.add_edge(acq1, w1).unwrap();
    graph.add_edge(root, acq2).unwrap();
    graph.add_edge(acq2, w2).unwrap();

    let mut usages = UsageStore::new();
    usages.add_occurrence(res.clone(), w1, bare_write());
    usages.add_occurrence(res.clone(), w2, bare_write());
    ExploredSpace { graph, usages }
}

/// A space whose usage points carry the guard, so the cheap unsafe-pair
/// predicate already excludes the pair.
pub fn resolved_guarded_space(res: &ResourceId, guard: &LockId) -> ExploredSpace {
    let mut space = guarded_write_space(res, guard);
    let point = UsagePoint::new([guard.clone()], AccessKind::Write);
    let mut usages = UsageStore::new();
    usages.add_occurrence(res.clone(), 2, point.clone());
    usages.add_occurrence(res.clone(), 4, point);
    space.usages = usages;
    space
}

/// Diamond above the first write: two diverse paths to `w1`, one to `w2`.
///
/// Node ids: root 0, a 1, b 2, w1 3, w2 4 (keys equal ids on a fresh
/// graph).
pub fn diamond_space(res: &ResourceId) -> ExploredSpace {
    let mut graph = ExploredGraph::new();
    let root = graph.add_node(StateLabel::noop(0));
    let a = graph.add_node(StateLabel::noop(1));
    let b = graph.add_node(StateLabel::noop(2));
    let w1 = graph.add_node(StateLabel::new(
        3,
        EdgeOp::Access(res.clone(), AccessKind::Write),
    ));
    let w2 = graph.add_node(StateLabel::new(
        4,
        EdgeOp::Access(res.clone(), AccessKind::Write),
    ));
    graph.add_edge(root, a).unwrap();
    graph.add_edge(root, b).unwrap();
    graph.add_edge(a, w1).unwrap();
    graph.add_edge(b, w1).unwrap();
    graph.add_edge(root, w2).unwrap();

    let mut usages = UsageStore::new();
    usages.add_occurrence(res.clone(), w1, bare_write());
    usages.add_occurrence(res.clone(), w2, bare_write());
    ExploredSpace { graph, usages }
}

/// Record of one call a [`ProbeBlock`] received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeEvent<I> {
    Refine(I),
    Signal(Signal),
}

/// Scripted innermost block: pops one pre-programmed result per refine
/// call and logs everything it sees.
pub struct ProbeBlock<I> {
    pub tag: BlockTag,
    pub results: RefCell<Vec<RefinementResult>>,
    pub events: Rc<RefCell<Vec<ProbeEvent<I>>>>,
}

impl<I: Clone> ProbeBlock<I> {
    pub fn new(tag: BlockTag, mut results: Vec<RefinementResult>) -> Self {
        // Scripts read more naturally first-call-first.
        results.reverse();
        Self {
            tag,
            results: RefCell::new(results),
            events: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn events_handle(&self) -> Rc<RefCell<Vec<ProbeEvent<I>>>> {
        Rc::clone(&self.events)
    }
}

impl<I: Clone> RefinementBlock for ProbeBlock<I> {
    type Input = I;

    fn tag(&self) -> BlockTag {
        self.tag
    }

    fn refine(
        &mut self,
        input: &I,
        _cx: &mut RoundCx<'_>,
    ) -> Result<RefinementResult, RefineError> {
        self.events.borrow_mut().push(ProbeEvent::Refine(input.clone()));
        self.results
            .borrow_mut()
            .pop()
            .ok_or_else(|| RefineError::Oracle("probe script exhausted".into()))
    }

    fn signal(&mut self, signal: &Signal, _cx: &mut RoundCx<'_>) -> Result<(), RefineError> {
        self.events.borrow_mut().push(ProbeEvent::Signal(signal.clone()));
        Ok(())
    }

    fn collect_stats(&self, _report: &mut RefinementReport) {}
}
