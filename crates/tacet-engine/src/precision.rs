use std::collections::BTreeSet;
use std::fmt;

use tacet_arg::graph::{LocationId, LockId};

/// What the next exploration round should track more precisely at a
/// location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum RefinementHint {
    /// The abstract path through this location was infeasible; track the
    /// predicate state that rules it out.
    PathInfeasible,
    /// The named lock is relevant to feasibility at this location.
    LockRelevant(LockId),
}

/// One precision increment: a location plus the hint for it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PrecisionEntry {
    pub location: LocationId,
    pub hint: RefinementHint,
}

impl PrecisionEntry {
    pub fn new(location: LocationId, hint: RefinementHint) -> Self {
        Self { location, hint }
    }
}

/// A set of precision entries, ordered for deterministic iteration.
///
/// Precision forms a join-semilattice under [`Precision::merge`]: merge is
/// idempotent, commutative, and associative, with the empty precision as
/// identity. Subtracting a merged-in increment restores the original set
/// when the increment was disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Precision {
    entries: BTreeSet<PrecisionEntry>,
}

impl Precision {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(entry: PrecisionEntry) -> Self {
        let mut p = Self::new();
        p.insert(entry);
        p
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert one entry; returns true when it was new.
    pub fn insert(&mut self, entry: PrecisionEntry) -> bool {
        self.entries.insert(entry)
    }

    pub fn contains(&self, entry: &PrecisionEntry) -> bool {
        self.entries.contains(entry)
    }

    /// Join with another precision.
    pub fn merge(&mut self, other: &Precision) {
        for entry in &other.entries {
            self.entries.insert(entry.clone());
        }
    }

    /// Remove every entry also present in `other`.
    pub fn subtract(&mut self, other: &Precision) {
        for entry in &other.entries {
            self.entries.remove(entry);
        }
    }

    pub fn is_disjoint(&self, other: &Precision) -> bool {
        self.entries.is_disjoint(&other.entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PrecisionEntry> {
        self.entries.iter()
    }

    /// Locations mentioned by any entry.
    pub fn locations(&self) -> BTreeSet<LocationId> {
        self.entries.iter().map(|e| e.location).collect()
    }
}

impl FromIterator<PrecisionEntry> for Precision {
    fn from_iter<I: IntoIterator<Item = PrecisionEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} precision entries", self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(location: LocationId, lock: Option<&str>) -> PrecisionEntry {
        let hint = match lock {
            Some(name) => RefinementHint::LockRelevant(LockId::new(name)),
            None => RefinementHint::PathInfeasible,
        };
        PrecisionEntry::new(location, hint)
    }

    #[test]
    fn merge_is_a_join() {
        let mut a = Precision::singleton(entry(1, None));
        let b = Precision::singleton(entry(2, Some("L")));
        a.merge(&b);
        assert_eq!(a.len(), 2);
        // Idempotent.
        a.merge(&b);
        assert_eq!(a.len(), 2);
        // Empty is identity.
        a.merge(&Precision::new());
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn subtract_of_disjoint_merge_round_trips() {
        let base = Precision::singleton(entry(1, None));
        let delta = Precision::singleton(entry(9, Some("M")));
        assert!(base.is_disjoint(&delta));
        let mut merged = base.clone();
        merged.merge(&delta);
        merged.subtract(&delta);
        assert_eq!(merged, base);
    }

    fn arb_precision() -> impl Strategy<Value = Precision> {
        proptest::collection::btree_set(
            (0u64..8, proptest::option::of("[ab]")).prop_map(|(loc, lock)| {
                entry(loc, lock.as_deref())
            }),
            0..6,
        )
        .prop_map(|entries| entries.into_iter().collect())
    }

    proptest! {
        #[test]
        fn merge_commutes_and_associates(
            a in arb_precision(),
            b in arb_precision(),
            c in arb_precision(),
        ) {
            let mut ab = a.clone();
            ab.merge(&b);
            let mut ba = b.clone();
            ba.merge(&a);
            prop_assert_eq!(&ab, &ba);

            let mut ab_c = ab.clone();
            ab_c.merge(&c);
            let mut bc = b.clone();
            bc.merge(&c);
            let mut a_bc = a.clone();
            a_bc.merge(&bc);
            prop_assert_eq!(ab_c, a_bc);
        }

        #[test]
        fn subtract_undoes_disjoint_merge(a in arb_precision(), b in arb_precision()) {
            prop_assume!(a.is_disjoint(&b));
            let mut merged = a.clone();
            merged.merge(&b);
            merged.subtract(&b);
            prop_assert_eq!(merged, a);
        }
    }
}
