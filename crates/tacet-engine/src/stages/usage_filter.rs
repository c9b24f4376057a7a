use tacet_arg::usage::UsagePoint;

use crate::adapters::PairFilter;
use crate::block::{OccurrencePair, RoundCx};
use crate::result::{BlockTag, Side};

/// Admissibility pre-check on occurrence pairs: the two usage points must
/// still form an unsafe pair.
///
/// The point iterator already checked this at the point level, but lower
/// layers run long after that check; occurrences whose pair became safe in
/// the meantime are refuted here without any reconstruction work.
pub struct UsagePointFilter;

impl PairFilter for UsagePointFilter {
    type Pair = OccurrencePair;
    type Core = UsagePoint;

    fn tag(&self) -> BlockTag {
        BlockTag::UsageFilter
    }

    fn core_of(&self, pair: &OccurrencePair, side: Side, cx: &RoundCx<'_>) -> UsagePoint {
        cx.usages.occurrence(pair.side(side)).point.clone()
    }

    fn admissible(&self, first: &UsagePoint, second: &UsagePoint) -> bool {
        first.is_unsafe_pair(second)
    }
}
