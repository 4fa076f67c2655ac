//! Pull engine: merge remote changes into the local store.

use crate::cancel::CancelFlag;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::transport::ContentTransport;
use shelfsync_protocol::{
    should_overwrite_on_pull, PullRequest, RecordId, RemoteRecord, SyncCursor,
};
use shelfsync_store::{Asset, Entry, MemoryStore, SaveOrigin, StoreTransaction};
use tracing::{debug, info, warn};

/// Counters for one pull phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullSummary {
    /// Records upserted from remote payloads.
    pub upserted: u64,
    /// Records deleted on remote instruction.
    pub deleted: u64,
    /// Records left untouched because they were locally dirty.
    pub skipped_dirty: u64,
    /// Items skipped because their payload would not decode.
    pub skipped_malformed: u64,
    /// Pages fetched.
    pub pages: u32,
}

/// Fetches everything changed remotely since the stored cursor and merges
/// it without clobbering unsynced local edits.
pub struct PullEngine<'a, T: ContentTransport> {
    store: &'a MemoryStore,
    transport: &'a T,
    config: &'a SyncConfig,
}

impl<'a, T: ContentTransport> PullEngine<'a, T> {
    /// Creates a pull engine over the given store and transport.
    pub fn new(store: &'a MemoryStore, transport: &'a T, config: &'a SyncConfig) -> Self {
        Self {
            store,
            transport,
            config,
        }
    }

    /// Runs the pull phase to completion.
    ///
    /// Each page is merged and its cursor committed in one transaction, so
    /// an abort at any point leaves the previous cursor with its matching
    /// data. A transport failure surfaces immediately; the next sync
    /// resumes from the last committed page.
    pub fn run(&self, cancel: &CancelFlag) -> SyncResult<PullSummary> {
        let mut summary = PullSummary::default();

        loop {
            cancel.check()?;

            let cursor = self.store.cursor();
            if cursor.is_initial() {
                debug!("pulling full snapshot");
            }
            let request = PullRequest::from_cursor(&cursor, self.config.pull_page_size);
            let page = self.transport.pull(&request)?;

            let locale = self.config.locale.clone();
            self.store.run_in_transaction(|tx| {
                for item in &page.items {
                    match RemoteRecord::decode(item) {
                        Ok(record) => merge_record(tx, &record, &locale, &mut summary),
                        Err(err) => {
                            warn!(%err, "skipping malformed pull item");
                            summary.skipped_malformed += 1;
                        }
                    }
                }
                for id in &page.deleted {
                    apply_remote_deletion(tx, id, &mut summary);
                }
                tx.set_cursor(SyncCursor::at(page.next_token.clone()));
                Ok(())
            })?;
            summary.pages += 1;

            if !page.has_more {
                break;
            }
        }

        info!(
            upserted = summary.upserted,
            deleted = summary.deleted,
            skipped_dirty = summary.skipped_dirty,
            skipped_malformed = summary.skipped_malformed,
            pages = summary.pages,
            "pull complete"
        );
        Ok(summary)
    }
}

/// Upserts one decoded remote record, deferring to dirty local copies.
fn merge_record(
    tx: &mut StoreTransaction,
    record: &RemoteRecord,
    default_locale: &str,
    summary: &mut PullSummary,
) {
    match record {
        RemoteRecord::Entry(remote) => {
            let local_dirty = tx.get_entry(&remote.id).map(|e| e.is_dirty);
            if should_overwrite_on_pull(local_dirty) {
                tx.put_entry(Entry::from_remote(remote, default_locale), SaveOrigin::Sync);
                summary.upserted += 1;
            } else {
                debug!(id = %remote.id, "pull skipping dirty entry");
                summary.skipped_dirty += 1;
            }
        }
        RemoteRecord::Asset(remote) => {
            let local_dirty = tx.get_asset(&remote.id).map(|a| a.is_dirty);
            if should_overwrite_on_pull(local_dirty) {
                tx.put_asset(Asset::from_remote(remote), SaveOrigin::Sync);
                summary.upserted += 1;
            } else {
                debug!(id = %remote.id, "pull skipping dirty asset");
                summary.skipped_dirty += 1;
            }
        }
    }
}

/// Applies one remote deletion notice. Dirty records are left alone; the
/// next push either recreates them remotely or resolves the conflict.
fn apply_remote_deletion(tx: &mut StoreTransaction, id: &RecordId, summary: &mut PullSummary) {
    if let Some(entry) = tx.get_entry(id) {
        if entry.is_dirty {
            debug!(%id, "pull keeping dirty entry deleted remotely");
            summary.skipped_dirty += 1;
        } else {
            tx.remove_entry(id);
            summary.deleted += 1;
        }
    } else if let Some(asset) = tx.get_asset(id) {
        if asset.is_dirty {
            debug!(%id, "pull keeping dirty asset deleted remotely");
            summary.skipped_dirty += 1;
        } else {
            tx.remove_asset(id);
            summary.deleted += 1;
        }
    }
}
