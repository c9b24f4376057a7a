//! Behavioral laws of the generic adapters, checked against scripted
//! delegates and a scripted inner block.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use tacet_arg::cancel::CancelToken;
use tacet_arg::path::Path;
use tacet_arg::usage::UsageId;

use tacet_engine::adapters::{
    BlockIteration, FilterBlock, IterStep, IteratingBlock, PairFilter, SidePathBlock, SideRefiner,
};
use tacet_engine::block::{
    ExploredSpace, PathPair, RefinementBlock, RoundCx, SidePath, SignalKind,
};
use tacet_engine::error::RefineError;
use tacet_engine::precision::Precision;
use tacet_engine::result::{BlockTag, RefinementResult, Side, StagePayload, Verdict};
use tacet_engine::stats::RefinementReport;

use common::{infeasible_hint, resource, unguarded_write_space, ProbeBlock, ProbeEvent};

#[derive(Default)]
struct IterLog {
    next_calls: usize,
    finalized: Vec<u32>,
}

/// Delegate that replays a fixed step script.
struct ScriptIteration {
    steps: RefCell<Vec<IterStep<u32>>>,
    log: Rc<RefCell<IterLog>>,
}

impl ScriptIteration {
    fn new(steps: Vec<IterStep<u32>>) -> (Self, Rc<RefCell<IterLog>>) {
        let log = Rc::new(RefCell::new(IterLog::default()));
        (
            Self {
                steps: RefCell::new(steps),
                log: Rc::clone(&log),
            },
            log,
        )
    }
}

impl BlockIteration for ScriptIteration {
    type Input = ();
    type Item = u32;

    fn tag(&self) -> BlockTag {
        BlockTag::Points
    }

    fn init(&mut self, _input: &(), _cx: &mut RoundCx<'_>) -> Result<(), RefineError> {
        Ok(())
    }

    fn next(&mut self, _input: &(), _cx: &mut RoundCx<'_>) -> Result<IterStep<u32>, RefineError> {
        self.log.borrow_mut().next_calls += 1;
        let mut steps = self.steps.borrow_mut();
        if steps.is_empty() {
            Ok(IterStep::Done)
        } else {
            Ok(steps.remove(0))
        }
    }

    fn on_finalize(
        &mut self,
        item: &u32,
        _result: &RefinementResult,
        _cx: &mut RoundCx<'_>,
    ) -> Result<(), RefineError> {
        self.log.borrow_mut().finalized.push(*item);
        Ok(())
    }
}

fn with_cx<T>(body: impl FnOnce(&mut RoundCx<'_>) -> T) -> T {
    let mut space = ExploredSpace::default();
    let cancel = CancelToken::new();
    let mut cx = RoundCx {
        graph: &space.graph,
        usages: &mut space.usages,
        cancel: &cancel,
    };
    body(&mut cx)
}

fn refined_items(events: &[ProbeEvent<u32>]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|e| match e {
            ProbeEvent::Refine(item) => Some(*item),
            ProbeEvent::Signal(_) => None,
        })
        .collect()
}

#[test]
fn confirmation_short_circuits_and_merges_precision() {
    let (delegate, log) = ScriptIteration::new(vec![
        IterStep::Item(1),
        IterStep::Item(2),
        IterStep::Item(3),
    ]);
    let probe = ProbeBlock::new(
        BlockTag::Oracle,
        vec![
            RefinementResult::refuted(infeasible_hint(7)),
            RefinementResult::confirmed(Precision::new()),
        ],
    );
    let events = probe.events_handle();
    let mut block = IteratingBlock::new(delegate, Box::new(probe));

    let result = with_cx(|cx| block.refine(&(), cx)).unwrap();
    assert_eq!(result.verdict, Verdict::Confirmed);
    // The refutation's precision rides along with the confirmation.
    assert_eq!(result.precision, infeasible_hint(7));

    // Item 3 was never requested, only item 1 was finalized.
    assert_eq!(refined_items(&events.borrow()), vec![1, 2]);
    assert_eq!(log.borrow().next_calls, 2);
    assert_eq!(log.borrow().finalized, vec![1]);
}

#[test]
fn postponed_items_run_after_the_main_enumeration() {
    let (delegate, log) = ScriptIteration::new(vec![IterStep::Postpone(9), IterStep::Item(1)]);
    let probe = ProbeBlock::new(
        BlockTag::Oracle,
        vec![
            RefinementResult::refuted(Precision::new()),
            RefinementResult::refuted(Precision::new()),
        ],
    );
    let events = probe.events_handle();
    let mut block = IteratingBlock::new(delegate, Box::new(probe));

    let result = with_cx(|cx| block.refine(&(), cx)).unwrap();
    assert_eq!(result.verdict, Verdict::Refuted);
    assert_eq!(refined_items(&events.borrow()), vec![1, 9]);
    assert_eq!(log.borrow().finalized, vec![1, 9]);
}

#[test]
fn finish_signal_reaches_inner_even_on_error() {
    let (delegate, _log) = ScriptIteration::new(vec![IterStep::Item(1)]);
    // Empty script: the first refine call fails.
    let probe: ProbeBlock<u32> = ProbeBlock::new(BlockTag::Oracle, vec![]);
    let events = probe.events_handle();
    let mut block = IteratingBlock::new(delegate, Box::new(probe));

    let err = with_cx(|cx| block.refine(&(), cx)).unwrap_err();
    assert!(matches!(err, RefineError::Oracle(_)));
    let events = events.borrow();
    assert!(matches!(
        events.last(),
        Some(ProbeEvent::Signal(signal))
            if signal.kind == SignalKind::Finish && signal.origin == BlockTag::Points
    ));
}

#[test]
fn exhaustion_with_an_inconclusive_item_is_inconclusive() {
    let (delegate, _log) = ScriptIteration::new(vec![IterStep::Item(1), IterStep::Item(2)]);
    let probe = ProbeBlock::new(
        BlockTag::Oracle,
        vec![
            RefinementResult::refuted(infeasible_hint(3)),
            RefinementResult::inconclusive(),
        ],
    );
    let mut block = IteratingBlock::new(delegate, Box::new(probe));

    let result = with_cx(|cx| block.refine(&(), cx)).unwrap();
    assert_eq!(result.verdict, Verdict::Inconclusive);
    assert_eq!(result.precision, infeasible_hint(3));
}

struct ParityFilter;

impl PairFilter for ParityFilter {
    type Pair = (u32, u32);
    type Core = u32;

    fn tag(&self) -> BlockTag {
        BlockTag::UsageFilter
    }

    fn core_of(&self, pair: &(u32, u32), side: Side, _cx: &RoundCx<'_>) -> u32 {
        match side {
            Side::First => pair.0,
            Side::Second => pair.1,
        }
    }

    fn admissible(&self, first: &u32, second: &u32) -> bool {
        first != second
    }
}

#[test]
fn filter_refutes_inadmissible_pairs_without_inner_calls() {
    let probe: ProbeBlock<(u32, u32)> = ProbeBlock::new(
        BlockTag::Oracle,
        vec![RefinementResult::confirmed(Precision::new())],
    );
    let events = probe.events_handle();
    let mut block = FilterBlock::new(ParityFilter, Box::new(probe));

    let refuted = with_cx(|cx| block.refine(&(4, 4), cx)).unwrap();
    assert_eq!(refuted.verdict, Verdict::Refuted);
    assert!(refuted.precision.is_empty());
    assert!(events.borrow().is_empty());

    let confirmed = with_cx(|cx| block.refine(&(4, 5), cx)).unwrap();
    assert_eq!(confirmed.verdict, Verdict::Confirmed);
    assert_eq!(refined_count(&events.borrow()), 1);

    let mut report = RefinementReport::default();
    block.collect_stats(&mut report);
    let counters = report.stage(BlockTag::UsageFilter).unwrap();
    assert_eq!(counters.filtered, 1);
    assert_eq!(counters.items, 1);
}

fn refined_count(events: &[ProbeEvent<(u32, u32)>]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ProbeEvent::Refine(_)))
        .count()
}

struct ScriptSides {
    results: RefCell<Vec<RefinementResult>>,
    calls: Rc<RefCell<Vec<(Side, UsageId)>>>,
}

impl ScriptSides {
    fn new(mut results: Vec<RefinementResult>) -> (Self, Rc<RefCell<Vec<(Side, UsageId)>>>) {
        results.reverse();
        let calls = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                results: RefCell::new(results),
                calls: Rc::clone(&calls),
            },
            calls,
        )
    }
}

impl SideRefiner for ScriptSides {
    fn tag(&self) -> BlockTag {
        BlockTag::SinglePath
    }

    fn refine_side(
        &mut self,
        side: Side,
        side_path: &SidePath,
        _cx: &mut RoundCx<'_>,
    ) -> Result<RefinementResult, RefineError> {
        self.calls.borrow_mut().push((side, side_path.occurrence));
        self.results
            .borrow_mut()
            .pop()
            .ok_or_else(|| RefineError::Oracle("side script exhausted".into()))
    }
}

fn write_pair(space: &ExploredSpace) -> PathPair {
    let first = Path::from_nodes(&space.graph, vec![0, 1]).unwrap();
    let second = Path::from_nodes(&space.graph, vec![0, 2]).unwrap();
    PathPair {
        resource: resource("shared"),
        first: SidePath {
            occurrence: 0,
            path: first,
        },
        second: SidePath {
            occurrence: 1,
            path: second,
        },
    }
}

#[test]
fn refuted_side_is_poisoned_and_the_pair_refuted() {
    let res = resource("shared");
    let mut space = unguarded_write_space(&res);
    let pair = write_pair(&space);
    let (sides, calls) = ScriptSides::new(vec![RefinementResult::refuted(infeasible_hint(1))
        .with_payload(
            BlockTag::PathPairs,
            StagePayload::Infeasible {
                side: Some(Side::First),
                nodes: vec![1],
            },
        )]);
    let probe: ProbeBlock<PathPair> = ProbeBlock::new(BlockTag::Oracle, vec![]);
    let events = probe.events_handle();
    let mut block = SidePathBlock::new(sides, Box::new(probe));

    let cancel = CancelToken::new();
    let mut cx = RoundCx {
        graph: &space.graph,
        usages: &mut space.usages,
        cancel: &cancel,
    };
    let result = block.refine(&pair, &mut cx).unwrap();
    assert_eq!(result.verdict, Verdict::Refuted);
    assert_eq!(result.precision, infeasible_hint(1));
    assert!(result.payload(BlockTag::PathPairs).is_some());

    // Only the first side was checked, and it is now poisoned.
    assert_eq!(calls.borrow().as_slice(), &[(Side::First, 0)]);
    assert!(!space.usages.occurrence(0).reachable);
    assert!(space.usages.occurrence(1).reachable);
    assert!(events.borrow().is_empty());
}

#[test]
fn accepted_sides_are_skipped_on_the_second_pass() {
    let res = resource("shared");
    let mut space = unguarded_write_space(&res);
    let pair = write_pair(&space);
    let (sides, calls) = ScriptSides::new(vec![
        RefinementResult::confirmed(Precision::new()),
        RefinementResult::confirmed(Precision::new()),
    ]);
    let probe: ProbeBlock<PathPair> = ProbeBlock::new(
        BlockTag::Oracle,
        vec![
            RefinementResult::inconclusive(),
            RefinementResult::inconclusive(),
        ],
    );
    let mut block = SidePathBlock::new(sides, Box::new(probe));

    let cancel = CancelToken::new();
    let mut cx = RoundCx {
        graph: &space.graph,
        usages: &mut space.usages,
        cancel: &cancel,
    };
    block.refine(&pair, &mut cx).unwrap();
    assert_eq!(calls.borrow().len(), 2);
    assert!(cx.usages.occurrence(0).accepted);
    assert!(cx.usages.occurrence(1).accepted);

    // Second pass: both sides accepted, the side refiner stays idle.
    block.refine(&pair, &mut cx).unwrap();
    assert_eq!(calls.borrow().len(), 2);

    let mut report = RefinementReport::default();
    block.collect_stats(&mut report);
    assert_eq!(
        report.stage(BlockTag::SinglePath).unwrap().skipped_accepted,
        2
    );
}
