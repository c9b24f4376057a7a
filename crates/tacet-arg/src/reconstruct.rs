use thiserror::Error;
use tracing::trace;

use crate::cancel::CancelToken;
use crate::exclusion::{ExclusionMatcher, ExclusionSet};
use crate::graph::{ExploredGraph, GraphError, NodeId};
use crate::path::{Path, PathError};

#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error("reconstruction cancelled")]
    Cancelled,
    #[error("explored graph is malformed: {0}")]
    Malformed(#[from] GraphError),
    #[error("reconstructed path violates its own invariant: {0}")]
    Path(#[from] PathError),
}

/// A branch point recorded while walking upward: the path length at which
/// the choice was made, plus the parent options not yet tried.
#[derive(Debug)]
struct Branch {
    depth: usize,
    untried: Vec<NodeId>,
}

/// Backtracking state for one reconstruction request.
struct Walk<'a> {
    graph: &'a ExploredGraph,
    cancel: &'a CancelToken,
    /// Nodes currently on the partial path (cleared when popped).
    on_path: Vec<bool>,
    /// Branch options given up for the rest of this request.
    abandoned: Vec<bool>,
    path: Vec<NodeId>,
    matcher: ExclusionMatcher<'a>,
    branches: Vec<Branch>,
}

/// Reconstruct one concrete execution path from a root down to `target`.
///
/// Backtracking depth-first walk upward via parent links. Nodes on the
/// current partial path are blocked from re-entry (merge points cannot
/// loop); a branch option whose whole subtree failed is abandoned for the
/// remainder of the request. Completions whose key sequence equals an
/// entry of `exclusions` are treated as dead ends and backtracked past.
///
/// Returns `Ok(None)` when the branch stack is exhausted: with an empty
/// exclusion set that means no root is reachable above `target` (callers
/// treat it as a malformed graph, fatal); under exclusions it means the
/// diverse path space is exhausted.
pub fn reconstruct(
    graph: &ExploredGraph,
    target: NodeId,
    exclusions: &ExclusionSet,
    cancel: &CancelToken,
) -> Result<Option<Path>, ReconstructError> {
    let mut walk = Walk {
        graph,
        cancel,
        on_path: vec![false; graph.len()],
        abandoned: vec![false; graph.len()],
        path: Vec::new(),
        matcher: exclusions.matcher(),
        branches: Vec::new(),
    };
    walk.push(target);
    walk.run()
}

impl Walk<'_> {
    fn run(mut self) -> Result<Option<Path>, ReconstructError> {
        loop {
            self.cancel.check()?;
            let current = *self.path.last().expect("partial path never empty");

            if self.graph.parents(current).is_empty() {
                // Root reached; reject excluded completions and keep searching.
                if !self.matcher.rejects_completion(self.path.len()) {
                    let mut nodes = self.path;
                    nodes.reverse();
                    return Ok(Some(Path::from_nodes(self.graph, nodes)?));
                }
                trace!(depth = self.path.len(), "completion excluded, backtracking");
                if !self.backtrack()? {
                    return Ok(None);
                }
                continue;
            }

            let mut untried = self
                .graph
                .parents(current)
                .iter()
                .copied()
                .filter(|&p| self.admissible(p));
            match untried.next() {
                None => {
                    // Dead end: every parent is on the path or abandoned.
                    if !self.backtrack()? {
                        return Ok(None);
                    }
                }
                Some(first) => {
                    let rest: Vec<NodeId> = untried.collect();
                    if !rest.is_empty() {
                        self.branches.push(Branch {
                            depth: self.path.len(),
                            untried: rest,
                        });
                    }
                    self.push(first);
                }
            }
        }
    }

    fn admissible(&self, node: NodeId) -> bool {
        !self.on_path[node] && !self.abandoned[node]
    }

    fn push(&mut self, node: NodeId) {
        self.on_path[node] = true;
        self.matcher.push(self.graph.key(node));
        self.path.push(node);
    }

    /// Pop back to the most recent branch with an untried option. The
    /// option whose subtree just failed (the node right after the branch
    /// point) is abandoned permanently for this request; deeper nodes
    /// become available again through other branches. Returns false when
    /// no branch remains.
    fn backtrack(&mut self) -> Result<bool, ReconstructError> {
        loop {
            self.cancel.check()?;
            let Some(branch) = self.branches.last() else {
                return Ok(false);
            };
            let depth = branch.depth;
            while self.path.len() > depth {
                let popped = self.path.pop().expect("truncation below branch depth");
                self.matcher.pop();
                self.on_path[popped] = false;
                // The first node popped down to the branch point carries the
                // failed choice.
                if self.path.len() == depth {
                    self.abandoned[popped] = true;
                }
            }
            let branch = self.branches.last_mut().expect("branch checked above");
            let next = loop {
                match branch.untried.pop() {
                    // An option can have been consumed through a deeper
                    // branch in the meantime.
                    Some(n) if self.on_path[n] || self.abandoned[n] => continue,
                    other => break other,
                }
            };
            match next {
                Some(next) => {
                    if branch.untried.is_empty() {
                        self.branches.pop();
                    }
                    self.push(next);
                    return Ok(true);
                }
                None => {
                    self.branches.pop();
                }
            }
        }
    }
}
