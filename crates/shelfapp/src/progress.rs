//! Progress reporting and cooperative cancellation for long operations.
//!
//! Shelving, applying and importing check their [`CancellationToken`] between
//! batches or files, never in the middle of one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, ShelfError};

pub trait Progress: Send + Sync {
    /// Called before working on item `done` (0-based) of `total`.
    fn report(&self, done: usize, total: usize, item: &str);
}

/// Progress sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&self, _done: usize, _total: usize, _item: &str) {}
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ShelfError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(observer.check().is_ok());
        token.cancel();
        assert!(observer.is_cancelled());
        assert!(matches!(observer.check(), Err(ShelfError::Cancelled)));
    }
}
