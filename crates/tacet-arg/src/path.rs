use std::fmt;
use thiserror::Error;

use crate::graph::{ExploredGraph, NodeId, NodeKey};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path does not start at a root (node {0} has parents)")]
    NotRooted(NodeId),
    #[error("consecutive nodes {0} -> {1} violate parent-of")]
    BrokenLink(NodeId, NodeId),
}

/// An ordered, immutable root-to-target sequence of explored nodes.
///
/// Each consecutive pair satisfies parent-of. The key sequence is
/// snapshotted at construction so exclusion matching stays valid even if
/// the caller later drops the graph handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    nodes: Vec<NodeId>,
    keys: Vec<NodeKey>,
}

impl Path {
    /// Build a path from root-to-target node ids, checking the invariants.
    pub fn from_nodes(graph: &ExploredGraph, nodes: Vec<NodeId>) -> Result<Self, PathError> {
        let first = *nodes.first().ok_or(PathError::Empty)?;
        if !graph.parents(first).is_empty() {
            return Err(PathError::NotRooted(first));
        }
        for pair in nodes.windows(2) {
            if !graph.parents(pair[1]).contains(&pair[0]) {
                return Err(PathError::BrokenLink(pair[0], pair[1]));
            }
        }
        let keys = nodes.iter().map(|&id| graph.key(id)).collect();
        Ok(Self { nodes, keys })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn root(&self) -> NodeId {
        self.nodes[0]
    }

    pub fn target(&self) -> NodeId {
        *self.nodes.last().unwrap_or(&self.nodes[0])
    }

    /// Ordered node keys, used for exclusion matching.
    pub fn key_sequence(&self) -> &[NodeKey] {
        &self.keys
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, key) in self.keys.iter().enumerate() {
            if i > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "{key}")?;
        }
        write!(f, "]")
    }
}
