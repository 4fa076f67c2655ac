//! # shelfsync Protocol
//!
//! Wire payload types and pure sync decisions for shelfsync.
//!
//! This crate provides:
//! - Remote record payloads (`RemoteEntry`, `RemoteAsset`) and their
//!   per-item decoding
//! - Delta-fetch messages (`PullRequest`, `PullResponse`) and the
//!   `SyncCursor`
//! - Write payloads and acknowledgements for optimistic-lock pushes
//! - Asset workflow types (`UploadHandle`, `ProcessingStatus`)
//! - Conflict resolution (`resolve_latest_wins`) and the pull merge
//!   decision (`should_overwrite_on_pull`)
//!
//! This is a pure protocol crate with no I/O operations. Everything here is
//! deterministic and unit-testable in isolation from any store or network.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod asset;
mod conflict;
mod delta;
mod error;
mod id;
mod payload;

pub use asset::{AssetMetadata, ProcessingStatus, ReadyAsset, UploadHandle};
pub use conflict::{resolve_latest_wins, should_overwrite_on_pull, ConflictVerdict};
pub use delta::{PullRequest, PullResponse, SyncCursor, CURSOR_SCHEMA_VERSION};
pub use error::PayloadError;
pub use id::RecordId;
pub use payload::{AssetPayload, EntryPayload, RemoteAsset, RemoteEntry, RemoteRecord, WriteAck};
