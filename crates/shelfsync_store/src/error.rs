//! Error types for the local store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in local store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The transaction body failed; nothing was committed.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for the abort.
        reason: String,
    },

    /// The commit itself failed; the store keeps its previous state.
    #[error("commit failed: {reason}")]
    CommitFailed {
        /// Reason for the failure.
        reason: String,
    },
}

impl StoreError {
    /// Creates a transaction-aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }
}
