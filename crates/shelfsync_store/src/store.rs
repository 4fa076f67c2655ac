//! Copy-on-write in-memory store.

use crate::dirty::stamp_local_edit;
use crate::error::{StoreError, StoreResult};
use crate::record::{Asset, Entry};
use chrono::Utc;
use parking_lot::RwLock;
use shelfsync_protocol::{RecordId, SyncCursor};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Origin of a record save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOrigin {
    /// A locally-originated edit on the foreground transaction scope.
    /// The dirty tracker inspects and stamps these saves.
    Local,
    /// A save made by the sync engines (pull merge, mark clean). Bypasses
    /// the dirty tracker and writes the record exactly as given.
    Sync,
}

/// Outcome of completing a push for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkCleanOutcome {
    /// The record was acknowledged and is now clean.
    Cleaned,
    /// The record was edited again while the push was in flight; it stays
    /// dirty and will be pushed next cycle.
    EditedSincePush,
    /// The record no longer exists locally.
    Missing,
}

#[derive(Debug, Clone, Default)]
struct Shelves {
    entries: HashMap<RecordId, Entry>,
    assets: HashMap<RecordId, Asset>,
    cursor: SyncCursor,
    write_count: u64,
}

/// An in-memory transactional record store.
///
/// The store is the reference implementation of the transactional-record
/// interface the sync engines consume. All mutations run inside
/// [`MemoryStore::run_in_transaction`]: the body works on a copy of the
/// store state, and the copy replaces the live state only when the body
/// and the commit both succeed. A failure at any point leaves the previous
/// state observable, including the sync cursor.
///
/// # Thread Safety
///
/// A single write lock serializes transactions, so the dirty tracker and
/// the engines can never interleave on the same record.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<Shelves>,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `body` inside a transaction and commits atomically.
    pub fn run_in_transaction<T>(
        &self,
        body: impl FnOnce(&mut StoreTransaction) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self.state.write();
        let mut tx = StoreTransaction {
            shelves: guard.clone(),
        };
        let result = body(&mut tx)?;
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::CommitFailed {
                reason: "injected commit failure".into(),
            });
        }
        *guard = tx.shelves;
        Ok(result)
    }

    /// Returns entries matching `predicate`.
    pub fn fetch_entries(&self, predicate: impl Fn(&Entry) -> bool) -> Vec<Entry> {
        self.state
            .read()
            .entries
            .values()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    /// Returns assets matching `predicate`.
    pub fn fetch_assets(&self, predicate: impl Fn(&Asset) -> bool) -> Vec<Asset> {
        self.state
            .read()
            .assets
            .values()
            .filter(|a| predicate(a))
            .cloned()
            .collect()
    }

    /// Looks up one entry.
    pub fn get_entry(&self, id: &RecordId) -> Option<Entry> {
        self.state.read().entries.get(id).cloned()
    }

    /// Looks up one asset.
    pub fn get_asset(&self, id: &RecordId) -> Option<Asset> {
        self.state.read().assets.get(id).cloned()
    }

    /// The last committed sync cursor.
    pub fn cursor(&self) -> SyncCursor {
        self.state.read().cursor.clone()
    }

    /// Number of records with unacknowledged local edits.
    pub fn dirty_count(&self) -> usize {
        let state = self.state.read();
        state.entries.values().filter(|e| e.is_dirty).count()
            + state.assets.values().filter(|a| a.is_dirty).count()
    }

    /// Total number of physical record writes committed so far.
    ///
    /// Test probe for redundant-write detection.
    pub fn write_count(&self) -> u64 {
        self.state.read().write_count
    }

    /// Makes the next transaction commit fail after its body has run.
    ///
    /// Test hook for crash-recovery scenarios: the transaction's merges
    /// and cursor write are discarded together, as a real mid-commit
    /// crash would.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

/// A mutable view of the store inside one transaction.
pub struct StoreTransaction {
    shelves: Shelves,
}

impl StoreTransaction {
    /// Looks up one entry.
    pub fn get_entry(&self, id: &RecordId) -> Option<Entry> {
        self.shelves.entries.get(id).cloned()
    }

    /// Looks up one asset.
    pub fn get_asset(&self, id: &RecordId) -> Option<Asset> {
        self.shelves.assets.get(id).cloned()
    }

    /// Saves an entry. Local saves pass through the dirty tracker and are
    /// skipped entirely when no syncable field changed; sync saves write
    /// the record exactly as given.
    ///
    /// Returns whether a physical write happened.
    pub fn put_entry(&mut self, mut entry: Entry, origin: SaveOrigin) -> bool {
        match origin {
            SaveOrigin::Local => {
                let before = self.shelves.entries.get(&entry.id);
                if !stamp_local_edit(before, &mut entry, Utc::now()) {
                    return false;
                }
            }
            SaveOrigin::Sync => {}
        }
        self.shelves.entries.insert(entry.id.clone(), entry);
        self.shelves.write_count += 1;
        true
    }

    /// Saves an asset, with the same origin semantics as [`Self::put_entry`].
    pub fn put_asset(&mut self, mut asset: Asset, origin: SaveOrigin) -> bool {
        match origin {
            SaveOrigin::Local => {
                let before = self.shelves.assets.get(&asset.id);
                if !stamp_local_edit(before, &mut asset, Utc::now()) {
                    return false;
                }
            }
            SaveOrigin::Sync => {}
        }
        self.shelves.assets.insert(asset.id.clone(), asset);
        self.shelves.write_count += 1;
        true
    }

    /// Removes an entry outright. Used for remote-driven deletions and
    /// for local cleanup after a deletion was pushed.
    pub fn remove_entry(&mut self, id: &RecordId) -> bool {
        let removed = self.shelves.entries.remove(id).is_some();
        if removed {
            self.shelves.write_count += 1;
        }
        removed
    }

    /// Removes an asset outright.
    pub fn remove_asset(&mut self, id: &RecordId) -> bool {
        let removed = self.shelves.assets.remove(id).is_some();
        if removed {
            self.shelves.write_count += 1;
        }
        removed
    }

    /// Completes a push for an entry.
    ///
    /// `pushed_updated_at` is the modification timestamp of the snapshot
    /// that was sent. If the stored record has moved past it, the record
    /// was edited mid-push and must stay dirty; otherwise `apply` receives
    /// the stored record to adopt the server acknowledgement.
    pub fn complete_entry_push(
        &mut self,
        id: &RecordId,
        pushed_updated_at: chrono::DateTime<Utc>,
        apply: impl FnOnce(&mut Entry),
    ) -> MarkCleanOutcome {
        match self.shelves.entries.get_mut(id) {
            None => MarkCleanOutcome::Missing,
            Some(entry) if entry.updated_at != pushed_updated_at => {
                MarkCleanOutcome::EditedSincePush
            }
            Some(entry) => {
                apply(entry);
                self.shelves.write_count += 1;
                MarkCleanOutcome::Cleaned
            }
        }
    }

    /// Completes a push for an asset, with the same semantics as
    /// [`Self::complete_entry_push`].
    pub fn complete_asset_push(
        &mut self,
        id: &RecordId,
        pushed_updated_at: chrono::DateTime<Utc>,
        apply: impl FnOnce(&mut Asset),
    ) -> MarkCleanOutcome {
        match self.shelves.assets.get_mut(id) {
            None => MarkCleanOutcome::Missing,
            Some(asset) if asset.updated_at != pushed_updated_at => {
                MarkCleanOutcome::EditedSincePush
            }
            Some(asset) => {
                apply(asset);
                self.shelves.write_count += 1;
                MarkCleanOutcome::Cleaned
            }
        }
    }

    /// The cursor as of this transaction.
    pub fn cursor(&self) -> SyncCursor {
        self.shelves.cursor.clone()
    }

    /// Overwrites the cursor. Committed atomically with every other write
    /// in the same transaction.
    pub fn set_cursor(&mut self, cursor: SyncCursor) {
        self.shelves.cursor = cursor;
    }

    /// Removes every record and resets the cursor. Used by the full reset
    /// flow before re-pulling from scratch.
    pub fn wipe(&mut self) {
        self.shelves.entries.clear();
        self.shelves.assets.clear();
        self.shelves.cursor = SyncCursor::empty();
    }
}
