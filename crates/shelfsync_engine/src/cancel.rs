//! Cooperative cancellation.

use crate::error::{SyncError, SyncResult};
use std::sync::atomic::{AtomicBool, Ordering};

/// A cancellation flag shared between the coordinator and the engines.
///
/// Cancellation is cooperative: the engines check the flag at every
/// suspension point (each transport call and each processing poll), so a
/// cancelled sync always stops on a committed-transaction boundary.
#[derive(Debug, Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    /// Creates a flag in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the in-flight sync.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Clears the flag before a new cycle starts.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns `Err(SyncError::Cancelled)` once cancellation is requested.
    pub fn check(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_lifecycle() {
        let flag = CancelFlag::new();
        assert!(flag.check().is_ok());

        flag.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.check(), Err(SyncError::Cancelled)));

        flag.reset();
        assert!(flag.check().is_ok());
    }
}
