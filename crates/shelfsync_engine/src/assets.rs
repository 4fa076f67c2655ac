//! Asset upload pipeline.
//!
//! Getting a binary into the remote service is a multi-step workflow, not
//! one HTTP call: upload the bytes, link the resulting handle to the asset
//! record, then poll until the service has derived the durable URL and
//! dimensions. The pipeline walks that state machine once per asset per
//! sync cycle; the caller retries the whole asset on the next cycle if any
//! step fails.

use crate::cancel::CancelFlag;
use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::AssetTransport;
use shelfsync_protocol::{AssetMetadata, ProcessingStatus, ReadyAsset};
use shelfsync_store::Asset;
use tracing::{debug, warn};

/// Phase of the upload workflow, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    /// Local record exists, nothing sent yet.
    Created,
    /// Binary bytes are being sent.
    Uploading,
    /// The upload handle is being linked to the asset record.
    Linking,
    /// The remote service is deriving the final URL and dimensions.
    Processing,
    /// URL and version resolved.
    Ready,
    /// The workflow failed for this cycle.
    Failed,
}

/// Drives one asset through the remote upload workflow.
pub struct AssetUploadPipeline<'a, T: AssetTransport> {
    transport: &'a T,
    policy: &'a RetryConfig,
    cancel: &'a CancelFlag,
}

impl<'a, T: AssetTransport> AssetUploadPipeline<'a, T> {
    /// Creates a pipeline over the given transport and poll policy.
    pub fn new(transport: &'a T, policy: &'a RetryConfig, cancel: &'a CancelFlag) -> Self {
        Self {
            transport,
            policy,
            cancel,
        }
    }

    /// Uploads `bytes` for `asset` and blocks until the remote service
    /// resolves a durable URL, the poll budget runs out, or processing
    /// fails.
    ///
    /// Upload and link failures are terminal for this cycle; the binary is
    /// never re-sent inside the pipeline.
    pub fn run(&self, asset: &Asset, bytes: &[u8]) -> SyncResult<ReadyAsset> {
        self.cancel.check()?;
        debug!(asset = %asset.id, phase = ?UploadPhase::Uploading, size = bytes.len(), "uploading asset binary");
        let handle = self.transport.create_upload(bytes)?;

        self.cancel.check()?;
        debug!(asset = %asset.id, phase = ?UploadPhase::Linking, handle = %handle, "linking upload");
        let metadata = AssetMetadata {
            file_name: asset.file_name.clone(),
            content_type: asset.content_type.clone(),
            size_bytes: asset.size_bytes,
        };
        self.transport.link_asset(&asset.id, &handle, &metadata)?;

        self.poll_until_ready(asset)
    }

    fn poll_until_ready(&self, asset: &Asset) -> SyncResult<ReadyAsset> {
        for attempt in 0..self.policy.max_attempts {
            self.cancel.check()?;
            let delay = self.policy.delay_for_attempt(attempt);
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }

            match self.transport.poll_processing(&asset.id)? {
                ProcessingStatus::Processing => {
                    debug!(asset = %asset.id, phase = ?UploadPhase::Processing, attempt, "asset still processing");
                }
                ProcessingStatus::Ready(ready) => {
                    debug!(asset = %asset.id, phase = ?UploadPhase::Ready, url = %ready.url, "asset processed");
                    return Ok(ready);
                }
                ProcessingStatus::Failed { reason } => {
                    warn!(asset = %asset.id, phase = ?UploadPhase::Failed, %reason, "asset processing failed");
                    return Err(SyncError::ProcessingFailed {
                        id: asset.id.clone(),
                        reason,
                    });
                }
            }
        }

        warn!(asset = %asset.id, attempts = self.policy.max_attempts, "asset processing timed out");
        Err(SyncError::ProcessingTimeout {
            id: asset.id.clone(),
            attempts: self.policy.max_attempts,
        })
    }
}
