//! Error types for payload decoding.

use thiserror::Error;

/// Errors raised while decoding a single remote record payload.
///
/// Payload errors are always scoped to one record: the pull engine logs and
/// skips the offending item rather than aborting the batch.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The record payload did not match the expected shape.
    #[error("malformed record payload: {detail}")]
    Malformed {
        /// Description of the decode failure.
        detail: String,
    },

    /// The payload was well-formed but named a record kind this client
    /// does not know.
    #[error("unknown record kind: {kind}")]
    UnknownKind {
        /// The unrecognized kind tag.
        kind: String,
    },
}

impl PayloadError {
    /// Creates a malformed-payload error from any decode failure.
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::Malformed {
            detail: detail.into(),
        }
    }
}
