use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fmt;

use crate::graph::{AccessKind, LockId, NodeId, ResourceId};

/// Identifier of one recorded occurrence within a round's usage store.
pub type UsageId = usize;

/// Canonical summary of the synchronization context at an occurrence.
///
/// Two occurrences with equal points are structurally interchangeable for
/// candidate enumeration. Points form a partial order: a point covers
/// another when it is at least as weakly protected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct UsagePoint {
    pub locks: BTreeSet<LockId>,
    pub access: AccessKind,
}

impl UsagePoint {
    pub fn new(locks: impl IntoIterator<Item = LockId>, access: AccessKind) -> Self {
        Self {
            locks: locks.into_iter().collect(),
            access,
        }
    }

    /// `self` covers `other` when it has the same access kind and holds a
    /// subset of the locks: anything reachable under `other`'s protection
    /// is reachable under `self`'s.
    pub fn covers(&self, other: &UsagePoint) -> bool {
        self.access == other.access && self.locks.is_subset(&other.locks)
    }

    /// Cheap candidacy test: can occurrences at these two points race at
    /// all? True when no common lock is held and at least one side writes.
    pub fn is_unsafe_pair(&self, other: &UsagePoint) -> bool {
        let writes = self.access == AccessKind::Write || other.access == AccessKind::Write;
        writes && self.locks.intersection(&other.locks).next().is_none()
    }
}

impl fmt::Display for UsagePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let locks: Vec<&str> = self.locks.iter().map(|l| l.as_str()).collect();
        write!(
            f,
            "{:?} under {{{}}}",
            self.access,
            locks.join(", ")
        )
    }
}

/// One concrete access to a tracked resource.
#[derive(Debug, Clone)]
pub struct Occurrence {
    pub id: UsageId,
    /// Node at which the access happens; the reconstruction target.
    pub target: NodeId,
    pub point: UsagePoint,
    /// Cleared once the occurrence is proven infeasible. Poisoning is
    /// permanent for the round.
    pub reachable: bool,
    /// Set when a repeated counterexample was detected for this occurrence.
    pub looped: bool,
    /// Set once a single-path refinement accepted this occurrence's path.
    pub accepted: bool,
}

impl Occurrence {
    /// Structural equality used by repeated-counterexample detection.
    pub fn structurally_equal(&self, other: &Occurrence) -> bool {
        self.point == other.point && self.target == other.target
    }
}

/// Per-round storage of occurrences, grouped by resource.
///
/// Built and owned externally for each exploration round; the refinement
/// stages read it through the round context and mutate only the occurrence
/// flags.
#[derive(Debug, Clone, Default)]
pub struct UsageStore {
    by_resource: IndexMap<ResourceId, Vec<UsageId>>,
    occurrences: Vec<Occurrence>,
}

impl UsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_occurrence(
        &mut self,
        resource: ResourceId,
        target: NodeId,
        point: UsagePoint,
    ) -> UsageId {
        let id = self.occurrences.len();
        self.occurrences.push(Occurrence {
            id,
            target,
            point,
            reachable: true,
            looped: false,
            accepted: false,
        });
        self.by_resource.entry(resource).or_default().push(id);
        id
    }

    pub fn resources(&self) -> impl Iterator<Item = &ResourceId> {
        self.by_resource.keys()
    }

    pub fn occurrence(&self, id: UsageId) -> &Occurrence {
        &self.occurrences[id]
    }

    pub fn occurrence_mut(&mut self, id: UsageId) -> &mut Occurrence {
        &mut self.occurrences[id]
    }

    /// Ids of reachable occurrences of one resource.
    pub fn live_occurrences(&self, resource: &ResourceId) -> Vec<UsageId> {
        self.by_resource
            .get(resource)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|&id| self.occurrences[id].reachable)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Distinct usage points among reachable occurrences of a resource,
    /// in first-seen order.
    pub fn live_points(&self, resource: &ResourceId) -> Vec<UsagePoint> {
        let mut points: Vec<UsagePoint> = Vec::new();
        for id in self.live_occurrences(resource) {
            let point = &self.occurrences[id].point;
            if !points.contains(point) {
                points.push(point.clone());
            }
        }
        points
    }

    /// Reachable occurrences of `resource` at exactly `point`.
    pub fn occurrences_at(&self, resource: &ResourceId, point: &UsagePoint) -> Vec<UsageId> {
        self.live_occurrences(resource)
            .into_iter()
            .filter(|&id| &self.occurrences[id].point == point)
            .collect()
    }
}
