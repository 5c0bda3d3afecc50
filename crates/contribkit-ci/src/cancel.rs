//! Cooperative cancellation shared between the signal handler and the pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Once set, the pipeline stops launching new contributions. Work already
/// started runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
