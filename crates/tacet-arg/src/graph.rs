use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Arena index of a node within one explored graph.
pub type NodeId = usize;
/// Stable node key: survives for one exploration round, reassigned on
/// re-exploration. Exclusion matching works on keys, never on arena indices.
pub type NodeKey = u64;
/// Program location that produced an abstract state.
pub type LocationId = u64;

/// Identifier of a lock object tracked by the lock-state domain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockId(String);

impl LockId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a shared resource whose accesses are being raced-checked.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of access recorded at an occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessKind {
    Read,
    Write,
}

/// Abstract operation on the edge leading into a node.
///
/// The refinement core never interprets these; only the external transfer
/// function and the feasibility oracle do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeOp {
    /// No observable effect.
    Noop,
    /// Declaration edge; skipped by context replay.
    Decl,
    Acquire(LockId),
    Release(LockId),
    Access(ResourceId, AccessKind),
}

/// Opaque abstract-state payload attached to each explored node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLabel {
    pub location: LocationId,
    pub op: EdgeOp,
}

impl StateLabel {
    pub fn new(location: LocationId, op: EdgeOp) -> Self {
        Self { location, op }
    }

    /// A root/noop label at a synthetic location.
    pub fn noop(location: LocationId) -> Self {
        Self::new(location, EdgeOp::Noop)
    }
}

/// One explored abstract state.
#[derive(Debug, Clone)]
pub struct NodeData {
    pub key: NodeKey,
    pub label: StateLabel,
    /// Parents may be shared between children where branches merge.
    pub parents: Vec<NodeId>,
    pub children: Vec<NodeId>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("node {0} references unknown node {1}")]
    DanglingEdge(NodeId, NodeId),
    #[error("parent relation contains a cycle through node {0}")]
    Cyclic(NodeId),
    #[error("node {0} is not reachable from any root")]
    Unreachable(NodeId),
    #[error("duplicate edge {parent} -> {child}")]
    DuplicateEdge { parent: NodeId, child: NodeId },
}

/// The explored-state DAG for one exploration round.
///
/// Nodes are arena-allocated and addressed by `NodeId`; stable `NodeKey`s
/// are assigned at insertion from a per-round seed so that re-exploration
/// produces fresh keys. The graph is read-only for all refinement stages;
/// only the root driver replaces it wholesale at round boundaries.
#[derive(Debug, Clone, Default)]
pub struct ExploredGraph {
    nodes: Vec<NodeData>,
    by_key: IndexMap<NodeKey, NodeId>,
    key_seed: NodeKey,
}

impl ExploredGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A graph whose keys start from `seed`, for rebuilds that must not
    /// reuse keys of a discarded round.
    pub fn with_key_seed(seed: NodeKey) -> Self {
        Self {
            key_seed: seed,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First key that a later rebuild should start from.
    pub fn next_key_seed(&self) -> NodeKey {
        self.key_seed + self.nodes.len() as NodeKey
    }

    pub fn add_node(&mut self, label: StateLabel) -> NodeId {
        let id = self.nodes.len();
        let key = self.key_seed + id as NodeKey;
        self.nodes.push(NodeData {
            key,
            label,
            parents: Vec::new(),
            children: Vec::new(),
        });
        self.by_key.insert(key, id);
        id
    }

    pub fn add_edge(&mut self, parent: NodeId, child: NodeId) -> Result<(), GraphError> {
        let len = self.nodes.len();
        if parent >= len {
            return Err(GraphError::DanglingEdge(child, parent));
        }
        if child >= len {
            return Err(GraphError::DanglingEdge(parent, child));
        }
        if self.nodes[child].parents.contains(&parent) {
            return Err(GraphError::DuplicateEdge { parent, child });
        }
        self.nodes[child].parents.push(parent);
        self.nodes[parent].children.push(child);
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id]
    }

    pub fn key(&self, id: NodeId) -> NodeKey {
        self.nodes[id].key
    }

    pub fn label(&self, id: NodeId) -> &StateLabel {
        &self.nodes[id].label
    }

    pub fn parents(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].parents
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn by_key(&self, key: NodeKey) -> Option<NodeId> {
        self.by_key.get(&key).copied()
    }

    /// Nodes with no parents.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parents.is_empty())
            .map(|(id, _)| id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        0..self.nodes.len()
    }

    /// Check the structural invariants: acyclic parent relation and every
    /// node reachable from at least one root.
    pub fn validate(&self) -> Result<(), GraphError> {
        // Kahn-style topological pass over the child relation. Leftover
        // nodes either sit on a cycle or hang off one.
        let mut pending: Vec<usize> = self.nodes.iter().map(|n| n.parents.len()).collect();
        let mut queue: Vec<NodeId> = self.roots().collect();
        let mut visited = 0usize;
        while let Some(id) = queue.pop() {
            visited += 1;
            for &child in &self.nodes[id].children {
                pending[child] -= 1;
                if pending[child] == 0 {
                    queue.push(child);
                }
            }
        }
        if visited != self.nodes.len() {
            let stuck = pending
                .iter()
                .position(|&p| p > 0)
                .unwrap_or(self.nodes.len());
            // Distinguish a cycle from plain disconnection: a stuck node
            // with a stuck ancestor chain back to itself is cyclic.
            return if self.has_cycle_through(stuck) {
                Err(GraphError::Cyclic(stuck))
            } else {
                Err(GraphError::Unreachable(stuck))
            };
        }
        Ok(())
    }

    fn has_cycle_through(&self, start: NodeId) -> bool {
        let mut stack = vec![start];
        let mut seen = vec![false; self.nodes.len()];
        while let Some(id) = stack.pop() {
            for &p in &self.nodes[id].parents {
                if p == start {
                    return true;
                }
                if !seen[p] {
                    seen[p] = true;
                    stack.push(p);
                }
            }
        }
        false
    }

    /// Reproducibility fingerprint over keys, labels, and edges.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for node in &self.nodes {
            hasher.update(node.key.to_le_bytes());
            hasher.update(node.label.location.to_le_bytes());
            for &p in &node.parents {
                hasher.update(self.nodes[p].key.to_le_bytes());
            }
        }
        let digest = hasher.finalize();
        let mut out = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

impl fmt::Display for ExploredGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "explored graph: {} nodes, {} roots",
            self.nodes.len(),
            self.roots().count()
        )
    }
}
