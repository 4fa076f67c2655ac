//! Error types for the sync engine.

use shelfsync_protocol::{PayloadError, RecordId};
use shelfsync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The network or remote service is unreachable. Aborts the remaining
    /// work in the current phase; all dirty and cursor state is preserved
    /// for the next cycle.
    #[error("network unavailable: {message}")]
    NetworkUnavailable {
        /// Underlying transport failure.
        message: String,
    },

    /// The remote service rejected a request for a reason other than an
    /// optimistic-lock mismatch.
    #[error("remote service error: {0}")]
    Remote(String),

    /// The remote service rejected a write because the supplied version
    /// was stale. Recovered internally by the conflict resolver, never
    /// surfaced to callers of the coordinator.
    #[error("stale version pushed for record {id}")]
    VersionConflict {
        /// The record whose write was rejected.
        id: RecordId,
    },

    /// The record no longer exists on the remote service.
    #[error("record {id} vanished remotely")]
    RemoteMissing {
        /// The missing record.
        id: RecordId,
    },

    /// A single record's payload could not be decoded. Scoped to that
    /// record; the batch continues.
    #[error(transparent)]
    MalformedPayload(#[from] PayloadError),

    /// Remote asset processing did not finish within the poll budget. The
    /// owning record stays dirty and is retried next cycle.
    #[error("processing timed out for asset {id} after {attempts} polls")]
    ProcessingTimeout {
        /// The asset being processed.
        id: RecordId,
        /// Number of polls performed.
        attempts: u32,
    },

    /// Remote asset processing failed permanently for this upload.
    #[error("processing failed for asset {id}: {reason}")]
    ProcessingFailed {
        /// The asset being processed.
        id: RecordId,
        /// Server-reported reason.
        reason: String,
    },

    /// The binary bytes for an asset could not be read locally.
    #[error("no binary available for asset {id}")]
    BinaryMissing {
        /// The asset without a readable binary.
        id: RecordId,
    },

    /// Local store failure. The cycle aborts; transactional merges leave
    /// no partial state behind.
    #[error("local store error: {0}")]
    Store(#[from] StoreError),

    /// The sync was cancelled cooperatively.
    #[error("sync cancelled")]
    Cancelled,

    /// A sync or reset is already in progress; the request was dropped.
    #[error("{active} already in progress")]
    Busy {
        /// The activity holding the slot.
        active: String,
    },
}

impl SyncError {
    /// Creates a network-unavailable error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkUnavailable {
            message: message.into(),
        }
    }

    /// True if the same request can be retried on a later cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkUnavailable { .. }
                | SyncError::Remote(_)
                | SyncError::ProcessingTimeout { .. }
        )
    }

    /// True if this error must stop the current phase rather than just
    /// the record being processed.
    pub fn aborts_phase(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkUnavailable { .. }
                | SyncError::Store(_)
                | SyncError::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::network("connection refused").is_retryable());
        assert!(SyncError::Remote("internal error".into()).is_retryable());
        assert!(SyncError::ProcessingTimeout {
            id: RecordId::new("a1"),
            attempts: 4
        }
        .is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::VersionConflict {
            id: RecordId::new("e1")
        }
        .is_retryable());
    }

    #[test]
    fn phase_aborting_errors() {
        assert!(SyncError::network("down").aborts_phase());
        assert!(SyncError::Cancelled.aborts_phase());
        assert!(!SyncError::Remote("bad request".into()).aborts_phase());
        assert!(!SyncError::ProcessingTimeout {
            id: RecordId::new("a1"),
            attempts: 4
        }
        .aborts_phase());
    }

    #[test]
    fn error_display() {
        let err = SyncError::VersionConflict {
            id: RecordId::new("e1"),
        };
        assert!(err.to_string().contains("e1"));

        let err = SyncError::Busy {
            active: "sync".into(),
        };
        assert_eq!(err.to_string(), "sync already in progress");
    }
}
