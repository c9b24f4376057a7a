use crate::graph::NodeKey;

/// Key sequences that a freshly reconstructed path must not equal.
///
/// The reconstructor consumes sequences incrementally while walking upward
/// from the target; a completed path is rejected exactly when its key
/// sequence equals one of the stored sequences.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    sequences: Vec<Vec<NodeKey>>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Add a key sequence. Duplicates are ignored.
    pub fn insert(&mut self, sequence: Vec<NodeKey>) {
        if !sequence.is_empty() && !self.sequences.contains(&sequence) {
            self.sequences.push(sequence);
        }
    }

    pub fn contains(&self, sequence: &[NodeKey]) -> bool {
        self.sequences.iter().any(|s| s == sequence)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[NodeKey]> {
        self.sequences.iter().map(|s| s.as_slice())
    }

    pub(crate) fn matcher(&self) -> ExclusionMatcher<'_> {
        ExclusionMatcher::new(self)
    }
}

/// Incremental tail-first matcher over an exclusion set.
///
/// The reconstructor visits nodes target-first, so each pushed key is
/// compared against the corresponding sequence element counted from the
/// sequence's end. A sequence stays "live" only while every pushed key has
/// matched; liveness per depth is kept on an explicit stack so backtracking
/// restores consumption state exactly.
#[derive(Debug)]
pub(crate) struct ExclusionMatcher<'a> {
    set: &'a ExclusionSet,
    /// live[d][i]: sequence i still matches after d pushed nodes.
    live: Vec<Vec<bool>>,
}

impl<'a> ExclusionMatcher<'a> {
    fn new(set: &'a ExclusionSet) -> Self {
        Self {
            live: vec![vec![true; set.sequences.len()]],
            set,
        }
    }

    /// Record one more node on the partial path (walking toward the roots).
    pub(crate) fn push(&mut self, key: NodeKey) {
        let depth = self.live.len(); // depth after this push
        let prev = self.live.last().expect("matcher stack never empty");
        let next: Vec<bool> = self
            .set
            .sequences
            .iter()
            .zip(prev.iter())
            .map(|(seq, &alive)| alive && depth <= seq.len() && seq[seq.len() - depth] == key)
            .collect();
        self.live.push(next);
    }

    /// Undo the most recent push.
    pub(crate) fn pop(&mut self) {
        debug_assert!(self.live.len() > 1, "pop past the matcher base");
        self.live.pop();
    }

    /// Would completing the path here (a root was reached after `depth`
    /// pushed nodes) reproduce an excluded sequence?
    pub(crate) fn rejects_completion(&self, depth: usize) -> bool {
        let flags = self.live.last().expect("matcher stack never empty");
        self.set
            .sequences
            .iter()
            .zip(flags.iter())
            .any(|(seq, &alive)| alive && seq.len() == depth)
    }
}
