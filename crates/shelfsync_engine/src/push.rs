//! Push engine: send dirty local records to the remote service.

use crate::assets::AssetUploadPipeline;
use crate::cancel::CancelFlag;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{AssetTransport, BinarySource, ContentTransport};
use shelfsync_protocol::{resolve_latest_wins, ConflictVerdict, WriteAck};
use shelfsync_store::{Asset, Entry, MarkCleanOutcome, MemoryStore};
use tracing::{debug, info, warn};

/// Counters for one push phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushSummary {
    /// Records written remotely and marked clean.
    pub pushed: u64,
    /// Local deletions propagated remotely.
    pub deleted: u64,
    /// Version conflicts resolved in favor of local fields.
    pub conflicts_kept_local: u64,
    /// Version conflicts resolved by adopting the remote copy.
    pub conflicts_accepted_remote: u64,
    /// Records left dirty for the next cycle.
    pub left_dirty: u64,
}

impl PushSummary {
    /// True when every dirty record was reconciled this cycle.
    pub fn is_complete(&self) -> bool {
        self.left_dirty == 0
    }
}

/// Outcome of pushing a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Pushed,
    Deleted,
    KeptLocal,
    AcceptedRemote,
    LeftDirty,
}

/// Finds all dirty records and reconciles them with the remote service,
/// record by record.
pub struct PushEngine<'a, T, A, B>
where
    T: ContentTransport,
    A: AssetTransport,
    B: BinarySource,
{
    store: &'a MemoryStore,
    transport: &'a T,
    assets: &'a A,
    binaries: &'a B,
    config: &'a SyncConfig,
}

impl<'a, T, A, B> PushEngine<'a, T, A, B>
where
    T: ContentTransport,
    A: AssetTransport,
    B: BinarySource,
{
    /// Creates a push engine over the given store and transports.
    pub fn new(
        store: &'a MemoryStore,
        transport: &'a T,
        assets: &'a A,
        binaries: &'a B,
        config: &'a SyncConfig,
    ) -> Self {
        Self {
            store,
            transport,
            assets,
            binaries,
            config,
        }
    }

    /// Runs the push phase over the current dirty work set.
    ///
    /// Assets go first so entry payloads can reference resolved cover
    /// URLs. Each record is pushed in isolation: a per-record failure is
    /// logged and the engine moves on; only phase-level conditions
    /// (network unreachable, store failure, cancellation) abort the
    /// remaining work set.
    pub fn run(&self, cancel: &CancelFlag) -> SyncResult<PushSummary> {
        let mut summary = PushSummary::default();

        for asset in self.store.fetch_assets(|a| a.is_dirty) {
            cancel.check()?;
            match self.push_asset(&asset, cancel) {
                Ok(outcome) => tally(&mut summary, outcome),
                Err(err) if err.aborts_phase() => return Err(err),
                Err(err) => {
                    warn!(id = %asset.id, %err, "asset push failed; retrying next cycle");
                    summary.left_dirty += 1;
                }
            }
        }

        for entry in self.store.fetch_entries(|e| e.is_dirty) {
            cancel.check()?;
            match self.push_entry(&entry) {
                Ok(outcome) => tally(&mut summary, outcome),
                Err(err) if err.aborts_phase() => return Err(err),
                Err(err) => {
                    warn!(id = %entry.id, %err, "entry push failed; retrying next cycle");
                    summary.left_dirty += 1;
                }
            }
        }

        info!(
            pushed = summary.pushed,
            deleted = summary.deleted,
            kept_local = summary.conflicts_kept_local,
            accepted_remote = summary.conflicts_accepted_remote,
            left_dirty = summary.left_dirty,
            "push complete"
        );
        Ok(summary)
    }

    fn push_asset(&self, asset: &Asset, cancel: &CancelFlag) -> SyncResult<RecordOutcome> {
        if asset.is_deleted {
            return self.push_asset_deletion(asset);
        }

        if asset.needs_upload() {
            let bytes = self.binaries.read(asset)?;
            let pipeline = AssetUploadPipeline::new(self.assets, &self.config.poll, cancel);
            let ready = pipeline.run(asset, &bytes)?;

            let outcome = self.store.run_in_transaction(|tx| {
                Ok(tx.complete_asset_push(&asset.id, asset.updated_at, |stored| {
                    stored.url = Some(ready.url.clone());
                    stored.width = Some(ready.width);
                    stored.height = Some(ready.height);
                    stored.remote_version = Some(ready.version);
                    stored.is_dirty = false;
                }))
            })?;
            return Ok(clean_outcome(&asset.id, outcome, RecordOutcome::Pushed));
        }

        cancel.check()?;
        match self
            .transport
            .write_asset(&asset.payload(), asset.remote_version)
        {
            Ok(ack) => self.finish_asset(asset, ack, RecordOutcome::Pushed),
            Err(SyncError::VersionConflict { .. }) => self.resolve_asset_conflict(asset),
            Err(SyncError::RemoteMissing { .. }) => {
                debug!(id = %asset.id, "asset vanished remotely; recreating");
                let ack = self.transport.write_asset(&asset.payload(), None)?;
                self.finish_asset(asset, ack, RecordOutcome::Pushed)
            }
            Err(err) => Err(err),
        }
    }

    fn resolve_asset_conflict(&self, local: &Asset) -> SyncResult<RecordOutcome> {
        let Some(remote) = self.transport.fetch_asset(&local.id)? else {
            let ack = self.transport.write_asset(&local.payload(), None)?;
            return self.finish_asset(local, ack, RecordOutcome::Pushed);
        };

        match resolve_latest_wins(local.updated_at, remote.updated_at, remote.version) {
            ConflictVerdict::KeepLocal { retry_version } => {
                match self
                    .transport
                    .write_asset(&local.payload(), Some(retry_version))
                {
                    Ok(ack) => self.finish_asset(local, ack, RecordOutcome::KeptLocal),
                    Err(SyncError::VersionConflict { id }) => {
                        warn!(%id, "second version conflict; leaving asset dirty");
                        Ok(RecordOutcome::LeftDirty)
                    }
                    Err(err) => Err(err),
                }
            }
            ConflictVerdict::AcceptRemote => {
                debug!(id = %local.id, "conflict resolved in favor of remote asset");
                let outcome = self.store.run_in_transaction(|tx| {
                    Ok(tx.complete_asset_push(&local.id, local.updated_at, |stored| {
                        *stored = Asset::from_remote(&remote);
                    }))
                })?;
                Ok(clean_outcome(&local.id, outcome, RecordOutcome::AcceptedRemote))
            }
        }
    }

    fn push_asset_deletion(&self, asset: &Asset) -> SyncResult<RecordOutcome> {
        if let Some(version) = asset.remote_version {
            match self.transport.delete_asset(&asset.id, version) {
                Ok(()) | Err(SyncError::RemoteMissing { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        self.store.run_in_transaction(|tx| {
            tx.remove_asset(&asset.id);
            Ok(())
        })?;
        Ok(RecordOutcome::Deleted)
    }

    fn finish_asset(
        &self,
        pushed: &Asset,
        ack: WriteAck,
        success: RecordOutcome,
    ) -> SyncResult<RecordOutcome> {
        let outcome = self.store.run_in_transaction(|tx| {
            Ok(tx.complete_asset_push(&pushed.id, pushed.updated_at, |stored| {
                stored.acknowledge(ack);
            }))
        })?;
        Ok(clean_outcome(&pushed.id, outcome, success))
    }

    fn push_entry(&self, entry: &Entry) -> SyncResult<RecordOutcome> {
        if entry.is_deleted {
            return self.push_entry_deletion(entry);
        }

        // a cover that has not finished its upload workflow must not be
        // referenced remotely; defer the entry rather than dropping the
        // association
        if let Some(cover_id) = &entry.cover_asset_id {
            if let Some(cover) = self.store.get_asset(cover_id) {
                if cover.is_dirty || cover.needs_upload() {
                    warn!(id = %entry.id, cover = %cover_id, "cover not uploaded; deferring entry push");
                    return Ok(RecordOutcome::LeftDirty);
                }
            }
        }

        match self
            .transport
            .write_entry(&entry.payload(), entry.remote_version)
        {
            Ok(ack) => self.finish_entry(entry, ack, RecordOutcome::Pushed),
            Err(SyncError::VersionConflict { .. }) => self.resolve_entry_conflict(entry),
            Err(SyncError::RemoteMissing { .. }) => {
                debug!(id = %entry.id, "entry vanished remotely; recreating");
                let ack = self.transport.write_entry(&entry.payload(), None)?;
                self.finish_entry(entry, ack, RecordOutcome::Pushed)
            }
            Err(err) => Err(err),
        }
    }

    fn resolve_entry_conflict(&self, local: &Entry) -> SyncResult<RecordOutcome> {
        let Some(remote) = self.transport.fetch_entry(&local.id)? else {
            let ack = self.transport.write_entry(&local.payload(), None)?;
            return self.finish_entry(local, ack, RecordOutcome::Pushed);
        };

        match resolve_latest_wins(local.updated_at, remote.updated_at, remote.version) {
            ConflictVerdict::KeepLocal { retry_version } => {
                match self
                    .transport
                    .write_entry(&local.payload(), Some(retry_version))
                {
                    Ok(ack) => self.finish_entry(local, ack, RecordOutcome::KeptLocal),
                    Err(SyncError::VersionConflict { id }) => {
                        warn!(%id, "second version conflict; leaving entry dirty");
                        Ok(RecordOutcome::LeftDirty)
                    }
                    Err(err) => Err(err),
                }
            }
            ConflictVerdict::AcceptRemote => {
                debug!(id = %local.id, "conflict resolved in favor of remote entry");
                let locale = self.config.locale.clone();
                let outcome = self.store.run_in_transaction(|tx| {
                    Ok(tx.complete_entry_push(&local.id, local.updated_at, |stored| {
                        *stored = Entry::from_remote(&remote, &locale);
                    }))
                })?;
                Ok(clean_outcome(&local.id, outcome, RecordOutcome::AcceptedRemote))
            }
        }
    }

    fn push_entry_deletion(&self, entry: &Entry) -> SyncResult<RecordOutcome> {
        if let Some(version) = entry.remote_version {
            match self.transport.delete_entry(&entry.id, version) {
                Ok(()) | Err(SyncError::RemoteMissing { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        self.store.run_in_transaction(|tx| {
            tx.remove_entry(&entry.id);
            Ok(())
        })?;
        Ok(RecordOutcome::Deleted)
    }

    fn finish_entry(
        &self,
        pushed: &Entry,
        ack: WriteAck,
        success: RecordOutcome,
    ) -> SyncResult<RecordOutcome> {
        let outcome = self.store.run_in_transaction(|tx| {
            Ok(tx.complete_entry_push(&pushed.id, pushed.updated_at, |stored| {
                stored.acknowledge(ack);
            }))
        })?;
        Ok(clean_outcome(&pushed.id, outcome, success))
    }
}

fn clean_outcome(
    id: &shelfsync_protocol::RecordId,
    outcome: MarkCleanOutcome,
    success: RecordOutcome,
) -> RecordOutcome {
    match outcome {
        MarkCleanOutcome::Cleaned => success,
        MarkCleanOutcome::EditedSincePush => {
            debug!(%id, "record edited mid-push; stays dirty");
            RecordOutcome::LeftDirty
        }
        MarkCleanOutcome::Missing => {
            debug!(%id, "record removed locally mid-push");
            RecordOutcome::LeftDirty
        }
    }
}

fn tally(summary: &mut PushSummary, outcome: RecordOutcome) {
    match outcome {
        RecordOutcome::Pushed => summary.pushed += 1,
        RecordOutcome::Deleted => summary.deleted += 1,
        RecordOutcome::KeptLocal => {
            summary.pushed += 1;
            summary.conflicts_kept_local += 1;
        }
        RecordOutcome::AcceptedRemote => summary.conflicts_accepted_remote += 1,
        RecordOutcome::LeftDirty => summary.left_dirty += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::transport::{MemoryBinarySource, MockTransport};
    use chrono::{DateTime, TimeZone, Utc};
    use shelfsync_protocol::{ProcessingStatus, ReadyAsset, RecordId, RemoteEntry, UploadHandle};
    use shelfsync_store::SaveOrigin;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    struct Fixture {
        store: MemoryStore,
        transport: MockTransport,
        binaries: MemoryBinarySource,
        config: SyncConfig,
        cancel: CancelFlag,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: MemoryStore::new(),
                transport: MockTransport::new(),
                binaries: MemoryBinarySource::new(),
                config: SyncConfig::default().with_poll(RetryConfig::zero_delay(4)),
                cancel: CancelFlag::new(),
            }
        }

        fn run(&self) -> SyncResult<PushSummary> {
            let engine = PushEngine::new(
                &self.store,
                &self.transport,
                &self.transport,
                &self.binaries,
                &self.config,
            );
            engine.run(&self.cancel)
        }

        fn seed_dirty_entry(&self, id: &str, updated_secs: i64, version: Option<u32>) -> Entry {
            let mut entry = Entry::new("Annihilation", "en-US");
            entry.id = RecordId::new(id);
            entry.updated_at = ts(updated_secs);
            entry.is_dirty = true;
            entry.remote_version = version;
            self.store
                .run_in_transaction(|tx| {
                    tx.put_entry(entry.clone(), SaveOrigin::Sync);
                    Ok(())
                })
                .unwrap();
            entry
        }
    }

    fn remote_entry(id: &str, updated_secs: i64, version: u32, title: &str) -> RemoteEntry {
        RemoteEntry {
            id: RecordId::new(id),
            version,
            created_at: ts(0),
            updated_at: ts(updated_secs),
            title: title.into(),
            author: None,
            isbn: None,
            rating: None,
            review: None,
            started_on: None,
            finished_on: None,
            cover_asset_id: None,
            locale: None,
        }
    }

    #[test]
    fn successful_push_clears_dirty_and_adopts_version() {
        let fixture = Fixture::new();
        fixture.seed_dirty_entry("e1", 30, Some(2));
        fixture.transport.script_write_entry(Ok(WriteAck {
            version: 3,
            updated_at: ts(31),
        }));

        let summary = fixture.run().unwrap();
        assert_eq!(summary.pushed, 1);

        let stored = fixture.store.get_entry(&RecordId::new("e1")).unwrap();
        assert!(!stored.is_dirty);
        assert_eq!(stored.remote_version, Some(3));
        assert_eq!(stored.updated_at, ts(31));
        // the push carried the last observed version
        assert_eq!(fixture.transport.entry_writes_seen()[0].1, Some(2));
    }

    #[test]
    fn conflict_with_newer_local_retries_with_remote_version() {
        let fixture = Fixture::new();
        fixture.seed_dirty_entry("e1", 30, Some(2));
        fixture
            .transport
            .set_remote_entry(remote_entry("e1", 5, 3, "Server Title"));
        fixture
            .transport
            .script_write_entry(Err(SyncError::VersionConflict {
                id: RecordId::new("e1"),
            }));
        fixture.transport.script_write_entry(Ok(WriteAck {
            version: 4,
            updated_at: ts(32),
        }));

        let summary = fixture.run().unwrap();
        assert_eq!(summary.conflicts_kept_local, 1);
        assert_eq!(summary.pushed, 1);

        let writes = fixture.transport.entry_writes_seen();
        assert_eq!(writes[0].1, Some(2));
        assert_eq!(writes[1].1, Some(3));

        let stored = fixture.store.get_entry(&RecordId::new("e1")).unwrap();
        assert_eq!(stored.title, "Annihilation");
        assert_eq!(stored.remote_version, Some(4));
        assert!(!stored.is_dirty);
    }

    #[test]
    fn conflict_with_newer_remote_adopts_remote_fields() {
        let fixture = Fixture::new();
        fixture.seed_dirty_entry("e1", 10, Some(2));
        fixture
            .transport
            .set_remote_entry(remote_entry("e1", 20, 5, "Server Title"));
        fixture
            .transport
            .script_write_entry(Err(SyncError::VersionConflict {
                id: RecordId::new("e1"),
            }));

        let summary = fixture.run().unwrap();
        assert_eq!(summary.conflicts_accepted_remote, 1);
        assert_eq!(summary.pushed, 0);

        let stored = fixture.store.get_entry(&RecordId::new("e1")).unwrap();
        assert_eq!(stored.title, "Server Title");
        assert_eq!(stored.remote_version, Some(5));
        assert!(!stored.is_dirty);
        // only the first write was attempted
        assert_eq!(fixture.transport.entry_writes_seen().len(), 1);
    }

    #[test]
    fn second_conflict_leaves_record_dirty() {
        let fixture = Fixture::new();
        fixture.seed_dirty_entry("e1", 30, Some(2));
        fixture
            .transport
            .set_remote_entry(remote_entry("e1", 5, 3, "Server Title"));
        for _ in 0..2 {
            fixture
                .transport
                .script_write_entry(Err(SyncError::VersionConflict {
                    id: RecordId::new("e1"),
                }));
        }

        let summary = fixture.run().unwrap();
        assert_eq!(summary.left_dirty, 1);
        assert!(fixture.store.get_entry(&RecordId::new("e1")).unwrap().is_dirty);
    }

    #[test]
    fn vanished_remote_record_is_recreated() {
        let fixture = Fixture::new();
        fixture.seed_dirty_entry("e1", 30, Some(2));
        fixture
            .transport
            .script_write_entry(Err(SyncError::RemoteMissing {
                id: RecordId::new("e1"),
            }));
        fixture.transport.script_write_entry(Ok(WriteAck {
            version: 1,
            updated_at: ts(31),
        }));

        let summary = fixture.run().unwrap();
        assert_eq!(summary.pushed, 1);
        let writes = fixture.transport.entry_writes_seen();
        // the retry was a create
        assert_eq!(writes[1].1, None);
    }

    #[test]
    fn network_failure_aborts_remaining_work_set() {
        let fixture = Fixture::new();
        fixture.seed_dirty_entry("e1", 30, None);
        fixture.seed_dirty_entry("e2", 31, None);
        fixture
            .transport
            .script_write_entry(Err(SyncError::network("offline")));

        let err = fixture.run().unwrap_err();
        assert!(matches!(err, SyncError::NetworkUnavailable { .. }));
        // only one write was attempted before aborting
        assert_eq!(fixture.transport.entry_writes_seen().len(), 1);
        assert_eq!(fixture.store.dirty_count(), 2);
    }

    #[test]
    fn per_record_failure_does_not_block_others() {
        let fixture = Fixture::new();
        let first = fixture.seed_dirty_entry("e1", 30, Some(1));
        fixture.seed_dirty_entry("e2", 31, Some(1));
        fixture
            .transport
            .script_write_entry(Err(SyncError::Remote("validation failed".into())));
        fixture.transport.script_write_entry(Ok(WriteAck {
            version: 2,
            updated_at: ts(40),
        }));

        let summary = fixture.run().unwrap();
        assert_eq!(summary.left_dirty, 1);
        assert_eq!(summary.pushed, 1);
        assert!(fixture.store.get_entry(&first.id).unwrap().is_dirty);
    }

    #[test]
    fn local_deletion_is_pushed_then_removed() {
        let fixture = Fixture::new();
        let mut entry = fixture.seed_dirty_entry("e1", 30, Some(4));
        entry.is_deleted = true;
        fixture
            .store
            .run_in_transaction(|tx| {
                tx.put_entry(entry, SaveOrigin::Sync);
                Ok(())
            })
            .unwrap();
        fixture.transport.script_delete(Ok(()));

        let summary = fixture.run().unwrap();
        assert_eq!(summary.deleted, 1);
        assert!(fixture.store.get_entry(&RecordId::new("e1")).is_none());
        assert_eq!(fixture.transport.deletes_seen(), vec![RecordId::new("e1")]);
    }

    #[test]
    fn never_pushed_deletion_skips_remote_call() {
        let fixture = Fixture::new();
        let mut entry = fixture.seed_dirty_entry("e1", 30, None);
        entry.is_deleted = true;
        fixture
            .store
            .run_in_transaction(|tx| {
                tx.put_entry(entry, SaveOrigin::Sync);
                Ok(())
            })
            .unwrap();

        let summary = fixture.run().unwrap();
        assert_eq!(summary.deleted, 1);
        assert!(fixture.transport.deletes_seen().is_empty());
    }

    #[test]
    fn new_asset_runs_upload_workflow_and_adopts_url() {
        let fixture = Fixture::new();
        let mut asset = Asset::new("cover.jpg", "image/jpeg", 3);
        asset.id = RecordId::new("a1");
        asset.updated_at = ts(10);
        asset.is_dirty = true;
        fixture
            .store
            .run_in_transaction(|tx| {
                tx.put_asset(asset, SaveOrigin::Sync);
                Ok(())
            })
            .unwrap();
        fixture.binaries.insert(RecordId::new("a1"), &b"jpg"[..]);

        fixture.transport.script_upload(Ok(UploadHandle::new("h1")));
        fixture.transport.script_link(Ok(()));
        fixture
            .transport
            .script_poll(Ok(ProcessingStatus::Ready(ReadyAsset {
                url: "https://cdn.example.com/a1.jpg".into(),
                width: 600,
                height: 900,
                version: 1,
            })));

        let summary = fixture.run().unwrap();
        assert_eq!(summary.pushed, 1);

        let stored = fixture.store.get_asset(&RecordId::new("a1")).unwrap();
        assert_eq!(stored.url.as_deref(), Some("https://cdn.example.com/a1.jpg"));
        assert_eq!(stored.width, Some(600));
        assert_eq!(stored.remote_version, Some(1));
        assert!(!stored.is_dirty);
    }

    #[test]
    fn processing_timeout_keeps_asset_dirty() {
        let fixture = Fixture::new();
        let mut asset = Asset::new("cover.jpg", "image/jpeg", 3);
        asset.id = RecordId::new("a1");
        asset.is_dirty = true;
        fixture
            .store
            .run_in_transaction(|tx| {
                tx.put_asset(asset, SaveOrigin::Sync);
                Ok(())
            })
            .unwrap();
        fixture.binaries.insert(RecordId::new("a1"), &b"jpg"[..]);

        fixture.transport.script_upload(Ok(UploadHandle::new("h1")));
        fixture.transport.script_link(Ok(()));
        for _ in 0..4 {
            fixture
                .transport
                .script_poll(Ok(ProcessingStatus::Processing));
        }

        let summary = fixture.run().unwrap();
        assert_eq!(summary.left_dirty, 1);
        let stored = fixture.store.get_asset(&RecordId::new("a1")).unwrap();
        assert!(stored.is_dirty);
        assert!(stored.url.is_none());
    }

    #[test]
    fn entry_with_unuploaded_cover_is_deferred() {
        let fixture = Fixture::new();
        let mut asset = Asset::new("cover.jpg", "image/jpeg", 3);
        asset.id = RecordId::new("a1");
        // clean but never uploaded: upload must happen before the entry
        // may reference it
        asset.is_dirty = false;
        let mut entry = Entry::new("Annihilation", "en-US");
        entry.id = RecordId::new("e1");
        entry.cover_asset_id = Some(RecordId::new("a1"));
        entry.is_dirty = true;
        fixture
            .store
            .run_in_transaction(|tx| {
                tx.put_asset(asset, SaveOrigin::Sync);
                tx.put_entry(entry, SaveOrigin::Sync);
                Ok(())
            })
            .unwrap();

        let summary = fixture.run().unwrap();
        assert_eq!(summary.left_dirty, 1);
        assert!(fixture.transport.entry_writes_seen().is_empty());
        assert!(fixture.store.get_entry(&RecordId::new("e1")).unwrap().is_dirty);
    }
}
