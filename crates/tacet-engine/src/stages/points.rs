use tacet_arg::graph::ResourceId;
use tacet_arg::usage::UsagePoint;

use crate::adapters::{BlockIteration, IterStep};
use crate::block::{PointPair, RoundCx};
use crate::error::RefineError;
use crate::result::{BlockTag, RefinementResult};

/// Outermost derivation: unordered pairs of distinct usage points of one
/// resource.
///
/// Pairs failing the cheap unsafe-pair predicate are never emitted.
/// Trivial self-pairs (the same point on both sides) are postponed: they
/// only matter once every cross-point pair came up empty. Points whose
/// occurrences were all poisoned by lower layers drop out of the
/// enumeration as soon as a finished item reveals it.
pub struct PointIteration {
    points: Vec<UsagePoint>,
    dead: Vec<bool>,
    row: usize,
    col: usize,
}

impl PointIteration {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            dead: Vec::new(),
            row: 0,
            col: 0,
        }
    }

    fn mark_dead(&mut self, point: &UsagePoint) {
        if let Some(idx) = self.points.iter().position(|p| p == point) {
            self.dead[idx] = true;
        }
    }
}

impl Default for PointIteration {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockIteration for PointIteration {
    type Input = ResourceId;
    type Item = PointPair;

    fn tag(&self) -> BlockTag {
        BlockTag::Points
    }

    fn init(&mut self, input: &ResourceId, cx: &mut RoundCx<'_>) -> Result<(), RefineError> {
        self.points = cx.usages.live_points(input);
        self.dead = vec![false; self.points.len()];
        self.row = 0;
        self.col = 0;
        Ok(())
    }

    fn next(
        &mut self,
        input: &ResourceId,
        _cx: &mut RoundCx<'_>,
    ) -> Result<IterStep<PointPair>, RefineError> {
        loop {
            if self.row >= self.points.len() {
                return Ok(IterStep::Done);
            }
            if self.col >= self.points.len() {
                self.row += 1;
                self.col = self.row;
                continue;
            }
            let (i, j) = (self.row, self.col);
            self.col += 1;
            if self.dead[i] || self.dead[j] {
                continue;
            }
            let (first, second) = (&self.points[i], &self.points[j]);
            if !first.is_unsafe_pair(second) {
                continue;
            }
            let pair = PointPair {
                resource: input.clone(),
                first: first.clone(),
                second: second.clone(),
            };
            return Ok(if i == j {
                IterStep::Postpone(pair)
            } else {
                IterStep::Item(pair)
            });
        }
    }

    fn on_finalize(
        &mut self,
        item: &PointPair,
        _result: &RefinementResult,
        cx: &mut RoundCx<'_>,
    ) -> Result<(), RefineError> {
        if cx.usages.occurrences_at(&item.resource, &item.first).is_empty() {
            self.mark_dead(&item.first);
        }
        if cx.usages.occurrences_at(&item.resource, &item.second).is_empty() {
            self.mark_dead(&item.second);
        }
        Ok(())
    }
}
