//! # shelfsync Engine
//!
//! Bidirectional sync engine for shelfsync.
//!
//! This crate provides:
//! - Sync coordinator state machine (idle → syncing/resetting → idle)
//! - Pull engine merging remote deltas without clobbering dirty records
//! - Push engine with optimistic-lock version checks and latest-wins
//!   conflict recovery
//! - Asset upload pipeline (upload → link → poll → ready)
//! - Transport abstraction with a scriptable mock and an HTTP adapter
//! - Retry policies with exponential backoff
//!
//! ## Architecture
//!
//! One sync cycle runs **pull-then-push** by default:
//! 1. Pull remote changes since the stored cursor and merge them locally,
//!    skipping records with unsynced local edits
//! 2. Push every dirty record, resolving version conflicts latest-wins
//!
//! ## Key Invariants
//!
//! - At most one sync or reset holds the coordinator slot at a time;
//!   concurrent requests are dropped, not queued
//! - The pull cursor only advances in the same transaction as the merged
//!   data it describes
//! - Dirty records belong to the push engine; pulls never overwrite them
//! - Optimistic-lock versions come only from server responses
//! - Per-record push failures never block the rest of the work set

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod assets;
mod cancel;
mod config;
mod coordinator;
mod error;
mod http;
mod pull;
mod push;
mod transport;

pub use assets::{AssetUploadPipeline, UploadPhase};
pub use cancel::CancelFlag;
pub use config::{ContentMode, RetryConfig, SyncConfig, SyncOrder};
pub use coordinator::{CoordinatorState, SyncCoordinator, SyncReport, SyncStats};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpTransport};
pub use pull::{PullEngine, PullSummary};
pub use push::{PushEngine, PushSummary};
pub use transport::{
    AssetTransport, BinarySource, ContentTransport, MemoryBinarySource, MockTransport,
};
