use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag signalling that the current run should be aborted.
///
/// Clones share the same flag, so the signal handler and the pipeline can
/// each hold one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
