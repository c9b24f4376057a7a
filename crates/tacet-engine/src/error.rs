use thiserror::Error;

use tacet_arg::reconstruct::ReconstructError;

/// Errors raised by refinement stages and the root driver.
///
/// `Cancelled` and `MalformedGraph` abort the whole refinement run; the
/// driver treats every other variant as fatal to the current resource only
/// and moves on to the next candidate.
#[derive(Debug, Error)]
pub enum RefineError {
    #[error("refinement cancelled")]
    Cancelled,
    #[error("explored graph is malformed: {0}")]
    MalformedGraph(String),
    #[error("feasibility oracle failed: {0}")]
    Oracle(String),
    #[error("re-exploration failed: {0}")]
    Exploration(String),
    #[error("invalid refiner configuration: {0}")]
    Config(String),
}

impl From<ReconstructError> for RefineError {
    fn from(err: ReconstructError) -> Self {
        match err {
            ReconstructError::Cancelled => RefineError::Cancelled,
            other => RefineError::MalformedGraph(other.to_string()),
        }
    }
}

impl RefineError {
    /// True for errors that must unwind the whole run rather than abort a
    /// single resource.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RefineError::Cancelled | RefineError::MalformedGraph(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tacet_arg::graph::GraphError;

    #[test]
    fn cancellation_converts_losslessly() {
        let err: RefineError = ReconstructError::Cancelled.into();
        assert!(matches!(err, RefineError::Cancelled));
        assert!(err.is_fatal());
    }

    #[test]
    fn graph_trouble_becomes_malformed() {
        let err: RefineError = ReconstructError::Malformed(GraphError::Cyclic(3)).into();
        assert!(matches!(err, RefineError::MalformedGraph(_)));
        assert!(err.is_fatal());
        assert!(!RefineError::Oracle("timeout".into()).is_fatal());
    }
}
