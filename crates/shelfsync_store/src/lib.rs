//! # shelfsync Store
//!
//! Transactional local record store for shelfsync.
//!
//! This crate provides:
//! - Local record types (`Entry`, `Asset`) with sync-control fields
//! - A copy-on-write in-memory store with atomic transactions
//! - Dirty tracking intercepting locally-originated saves
//! - A write-count probe for redundant-write tests
//!
//! ## Key Invariants
//!
//! - A record's dirty flag is true iff it has local mutations the remote
//!   service has not acknowledged
//! - `updated_at` only ever advances on local content mutations
//! - A transaction either commits whole or leaves the store untouched,
//!   including the sync cursor
//! - Saves originating from sync merges bypass the dirty tracker

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dirty;
mod error;
mod record;
mod store;

pub use dirty::stamp_local_edit;
pub use error::{StoreError, StoreResult};
pub use record::{Asset, Entry, SyncRecord};
pub use store::{MarkCleanOutcome, MemoryStore, SaveOrigin, StoreTransaction};
