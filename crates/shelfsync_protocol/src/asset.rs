//! Asset upload workflow types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Short-lived reference to uploaded binary bytes.
///
/// Obtained from the upload step and exchanged for a durable asset URL once
/// remote processing completes. Handles expire server-side; they are never
/// persisted locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadHandle(String);

impl UploadHandle {
    /// Wraps a server-issued handle.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Returns the handle as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// File metadata sent when linking an upload to an asset record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMetadata {
    /// Original file name.
    pub file_name: String,
    /// MIME content type.
    pub content_type: String,
    /// Size of the binary in bytes.
    pub size_bytes: u64,
}

/// Final shape of a processed asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyAsset {
    /// Durable content URL.
    pub url: String,
    /// Pixel width derived by the remote service.
    pub width: u32,
    /// Pixel height derived by the remote service.
    pub height: u32,
    /// Optimistic-lock version after processing.
    pub version: u32,
}

/// Outcome of one processing poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// The remote service is still deriving the final URL and dimensions.
    Processing,
    /// Processing finished; the asset is addressable.
    Ready(ReadyAsset),
    /// Processing failed permanently for this upload.
    Failed {
        /// Server-reported failure reason.
        reason: String,
    },
}

impl ProcessingStatus {
    /// True when another poll is required.
    pub fn is_pending(&self) -> bool {
        matches!(self, ProcessingStatus::Processing)
    }
}
