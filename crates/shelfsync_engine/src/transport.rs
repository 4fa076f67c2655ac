//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use bytes::Bytes;
use parking_lot::Mutex;
use shelfsync_protocol::{
    AssetMetadata, AssetPayload, EntryPayload, ProcessingStatus, PullRequest, PullResponse,
    RecordId, RemoteAsset, RemoteEntry, UploadHandle, WriteAck,
};
use shelfsync_store::Asset;
use std::collections::{HashMap, VecDeque};

/// Network communication with the remote content service.
///
/// This trait abstracts the delta-fetch and write APIs, allowing different
/// implementations (HTTP, mock for testing). Optimistic-lock rejections
/// surface as [`SyncError::VersionConflict`]; a write against a record the
/// server no longer has surfaces as [`SyncError::RemoteMissing`].
pub trait ContentTransport: Send + Sync {
    /// Fetches one page of the remote change stream.
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse>;

    /// Fetches the current remote copy of an entry, if it still exists.
    fn fetch_entry(&self, id: &RecordId) -> SyncResult<Option<RemoteEntry>>;

    /// Fetches the current remote copy of an asset, if it still exists.
    fn fetch_asset(&self, id: &RecordId) -> SyncResult<Option<RemoteAsset>>;

    /// Creates or updates an entry. `expected_version` is `None` for a
    /// create.
    fn write_entry(
        &self,
        payload: &EntryPayload,
        expected_version: Option<u32>,
    ) -> SyncResult<WriteAck>;

    /// Creates or updates an asset's metadata.
    fn write_asset(
        &self,
        payload: &AssetPayload,
        expected_version: Option<u32>,
    ) -> SyncResult<WriteAck>;

    /// Deletes an entry remotely.
    fn delete_entry(&self, id: &RecordId, expected_version: u32) -> SyncResult<()>;

    /// Deletes an asset remotely.
    fn delete_asset(&self, id: &RecordId, expected_version: u32) -> SyncResult<()>;
}

/// The multi-step remote asset workflow.
pub trait AssetTransport: Send + Sync {
    /// Uploads binary bytes, returning a short-lived handle.
    fn create_upload(&self, bytes: &[u8]) -> SyncResult<UploadHandle>;

    /// Links an upload handle to an asset record, starting remote
    /// processing.
    fn link_asset(
        &self,
        asset_id: &RecordId,
        handle: &UploadHandle,
        metadata: &AssetMetadata,
    ) -> SyncResult<()>;

    /// Polls remote processing for an asset.
    fn poll_processing(&self, asset_id: &RecordId) -> SyncResult<ProcessingStatus>;
}

/// Source of the binary bytes behind a local asset record.
///
/// The store tracks only asset metadata; the bytes themselves live with
/// the embedding application (file system, image cache). The push engine
/// reads them through this trait when an upload is required.
pub trait BinarySource: Send + Sync {
    /// Reads the binary for `asset`.
    fn read(&self, asset: &Asset) -> SyncResult<Bytes>;
}

/// An in-memory binary source for tests and examples.
#[derive(Debug, Default)]
pub struct MemoryBinarySource {
    binaries: Mutex<HashMap<RecordId, Bytes>>,
}

impl MemoryBinarySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers bytes for an asset id.
    pub fn insert(&self, id: RecordId, bytes: impl Into<Bytes>) {
        self.binaries.lock().insert(id, bytes.into());
    }
}

impl BinarySource for MemoryBinarySource {
    fn read(&self, asset: &Asset) -> SyncResult<Bytes> {
        self.binaries
            .lock()
            .get(&asset.id)
            .cloned()
            .ok_or_else(|| SyncError::BinaryMissing {
                id: asset.id.clone(),
            })
    }
}

/// A scriptable transport for testing.
///
/// Responses are queued per endpoint and consumed in order; an exhausted
/// queue yields a remote error so a test that under-scripts fails loudly.
/// Every call is also recorded for assertion.
#[derive(Debug, Default)]
pub struct MockTransport {
    pull_responses: Mutex<VecDeque<SyncResult<PullResponse>>>,
    entry_write_results: Mutex<VecDeque<SyncResult<WriteAck>>>,
    asset_write_results: Mutex<VecDeque<SyncResult<WriteAck>>>,
    delete_results: Mutex<VecDeque<SyncResult<()>>>,
    upload_results: Mutex<VecDeque<SyncResult<UploadHandle>>>,
    link_results: Mutex<VecDeque<SyncResult<()>>>,
    poll_results: Mutex<VecDeque<SyncResult<ProcessingStatus>>>,
    remote_entries: Mutex<HashMap<RecordId, RemoteEntry>>,
    remote_assets: Mutex<HashMap<RecordId, RemoteAsset>>,

    pulls_seen: Mutex<Vec<PullRequest>>,
    entry_writes_seen: Mutex<Vec<(EntryPayload, Option<u32>)>>,
    asset_writes_seen: Mutex<Vec<(AssetPayload, Option<u32>)>>,
    deletes_seen: Mutex<Vec<RecordId>>,
    uploads_seen: Mutex<Vec<usize>>,
    links_seen: Mutex<Vec<(RecordId, UploadHandle)>>,
    polls_seen: Mutex<Vec<RecordId>>,
}

impl MockTransport {
    /// Creates a transport with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a pull page.
    pub fn script_pull(&self, response: SyncResult<PullResponse>) {
        self.pull_responses.lock().push_back(response);
    }

    /// Queues an entry write result.
    pub fn script_write_entry(&self, result: SyncResult<WriteAck>) {
        self.entry_write_results.lock().push_back(result);
    }

    /// Queues an asset write result.
    pub fn script_write_asset(&self, result: SyncResult<WriteAck>) {
        self.asset_write_results.lock().push_back(result);
    }

    /// Queues a delete result.
    pub fn script_delete(&self, result: SyncResult<()>) {
        self.delete_results.lock().push_back(result);
    }

    /// Queues an upload result.
    pub fn script_upload(&self, result: SyncResult<UploadHandle>) {
        self.upload_results.lock().push_back(result);
    }

    /// Queues a link result.
    pub fn script_link(&self, result: SyncResult<()>) {
        self.link_results.lock().push_back(result);
    }

    /// Queues a processing poll result.
    pub fn script_poll(&self, result: SyncResult<ProcessingStatus>) {
        self.poll_results.lock().push_back(result);
    }

    /// Sets the remote copy returned by [`ContentTransport::fetch_entry`].
    pub fn set_remote_entry(&self, entry: RemoteEntry) {
        self.remote_entries.lock().insert(entry.id.clone(), entry);
    }

    /// Sets the remote copy returned by [`ContentTransport::fetch_asset`].
    pub fn set_remote_asset(&self, asset: RemoteAsset) {
        self.remote_assets.lock().insert(asset.id.clone(), asset);
    }

    /// Pull requests observed so far.
    pub fn pulls_seen(&self) -> Vec<PullRequest> {
        self.pulls_seen.lock().clone()
    }

    /// Entry writes observed so far, with their expected versions.
    pub fn entry_writes_seen(&self) -> Vec<(EntryPayload, Option<u32>)> {
        self.entry_writes_seen.lock().clone()
    }

    /// Asset writes observed so far, with their expected versions.
    pub fn asset_writes_seen(&self) -> Vec<(AssetPayload, Option<u32>)> {
        self.asset_writes_seen.lock().clone()
    }

    /// Ids deleted so far.
    pub fn deletes_seen(&self) -> Vec<RecordId> {
        self.deletes_seen.lock().clone()
    }

    /// Byte lengths of uploads so far.
    pub fn uploads_seen(&self) -> Vec<usize> {
        self.uploads_seen.lock().clone()
    }

    /// Link calls observed so far.
    pub fn links_seen(&self) -> Vec<(RecordId, UploadHandle)> {
        self.links_seen.lock().clone()
    }

    /// Processing polls observed so far.
    pub fn polls_seen(&self) -> Vec<RecordId> {
        self.polls_seen.lock().clone()
    }

    fn pop<T>(queue: &Mutex<VecDeque<SyncResult<T>>>, endpoint: &str) -> SyncResult<T> {
        queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SyncError::Remote(format!("no scripted {endpoint} response"))))
    }
}

impl ContentTransport for MockTransport {
    fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        self.pulls_seen.lock().push(request.clone());
        Self::pop(&self.pull_responses, "pull")
    }

    fn fetch_entry(&self, id: &RecordId) -> SyncResult<Option<RemoteEntry>> {
        Ok(self.remote_entries.lock().get(id).cloned())
    }

    fn fetch_asset(&self, id: &RecordId) -> SyncResult<Option<RemoteAsset>> {
        Ok(self.remote_assets.lock().get(id).cloned())
    }

    fn write_entry(
        &self,
        payload: &EntryPayload,
        expected_version: Option<u32>,
    ) -> SyncResult<WriteAck> {
        self.entry_writes_seen
            .lock()
            .push((payload.clone(), expected_version));
        Self::pop(&self.entry_write_results, "write_entry")
    }

    fn write_asset(
        &self,
        payload: &AssetPayload,
        expected_version: Option<u32>,
    ) -> SyncResult<WriteAck> {
        self.asset_writes_seen
            .lock()
            .push((payload.clone(), expected_version));
        Self::pop(&self.asset_write_results, "write_asset")
    }

    fn delete_entry(&self, id: &RecordId, _expected_version: u32) -> SyncResult<()> {
        self.deletes_seen.lock().push(id.clone());
        Self::pop(&self.delete_results, "delete_entry")
    }

    fn delete_asset(&self, id: &RecordId, _expected_version: u32) -> SyncResult<()> {
        self.deletes_seen.lock().push(id.clone());
        Self::pop(&self.delete_results, "delete_asset")
    }
}

impl AssetTransport for MockTransport {
    fn create_upload(&self, bytes: &[u8]) -> SyncResult<UploadHandle> {
        self.uploads_seen.lock().push(bytes.len());
        Self::pop(&self.upload_results, "create_upload")
    }

    fn link_asset(
        &self,
        asset_id: &RecordId,
        handle: &UploadHandle,
        _metadata: &AssetMetadata,
    ) -> SyncResult<()> {
        self.links_seen.lock().push((asset_id.clone(), handle.clone()));
        Self::pop(&self.link_results, "link_asset")
    }

    fn poll_processing(&self, asset_id: &RecordId) -> SyncResult<ProcessingStatus> {
        self.polls_seen.lock().push(asset_id.clone());
        Self::pop(&self.poll_results, "poll_processing")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_replays_scripted_responses_in_order() {
        let transport = MockTransport::new();
        transport.script_pull(Ok(PullResponse::empty("tok-1")));
        transport.script_pull(Err(SyncError::network("offline")));

        let request = PullRequest {
            token: None,
            limit: 10,
        };
        assert!(transport.pull(&request).is_ok());
        assert!(matches!(
            transport.pull(&request),
            Err(SyncError::NetworkUnavailable { .. })
        ));
        assert_eq!(transport.pulls_seen().len(), 2);
    }

    #[test]
    fn exhausted_queue_fails_loudly() {
        let transport = MockTransport::new();
        let request = PullRequest {
            token: None,
            limit: 10,
        };
        let err = transport.pull(&request).unwrap_err();
        assert!(matches!(err, SyncError::Remote(msg) if msg.contains("pull")));
    }

    #[test]
    fn memory_binary_source_round_trip() {
        let source = MemoryBinarySource::new();
        let asset = Asset::new("cover.jpg", "image/jpeg", 3);
        source.insert(asset.id.clone(), &b"jpg"[..]);

        assert_eq!(source.read(&asset).unwrap(), Bytes::from_static(b"jpg"));

        let other = Asset::new("missing.jpg", "image/jpeg", 0);
        assert!(matches!(
            source.read(&other),
            Err(SyncError::BinaryMissing { .. })
        ));
    }
}
