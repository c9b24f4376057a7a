use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::reconstruct::ReconstructError;

/// Cooperative cancellation flag shared between the driver and every stage.
///
/// The core is single-threaded; the token exists so an embedding host (or a
/// watchdog thread) can request an orderly unwind. Every stage boundary and
/// every backtracking step calls [`CancelToken::check`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Error out if cancellation was requested.
    pub fn check(&self) -> Result<(), ReconstructError> {
        if self.is_cancelled() {
            Err(ReconstructError::Cancelled)
        } else {
            Ok(())
        }
    }
}
