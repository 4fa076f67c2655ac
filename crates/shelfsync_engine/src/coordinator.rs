//! Sync coordinator: lifecycle, exclusivity, and observable state.

use crate::cancel::CancelFlag;
use crate::config::{SyncConfig, SyncOrder};
use crate::error::{SyncError, SyncResult};
use crate::pull::{PullEngine, PullSummary};
use crate::push::{PushEngine, PushSummary};
use crate::transport::{AssetTransport, BinarySource, ContentTransport};
use parking_lot::RwLock;
use shelfsync_store::MemoryStore;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Lifecycle state of the coordinator.
///
/// Only one activity may hold the slot at a time; requests arriving while
/// the slot is held are dropped, not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordinatorState {
    /// No sync activity.
    #[default]
    Idle,
    /// A sync cycle is running.
    Syncing,
    /// A full reset followed by a sync cycle is running.
    Resetting,
}

impl CoordinatorState {
    /// True while the slot is held.
    pub fn is_busy(&self) -> bool {
        !matches!(self, CoordinatorState::Idle)
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorState::Idle => write!(f, "idle"),
            CoordinatorState::Syncing => write!(f, "sync"),
            CoordinatorState::Resetting => write!(f, "reset"),
        }
    }
}

/// Cumulative statistics across sync cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Completed sync cycles.
    pub cycles_completed: u64,
    /// Records upserted or deleted by pulls.
    pub records_pulled: u64,
    /// Records written or deleted by pushes.
    pub records_pushed: u64,
    /// Version conflicts resolved, either direction.
    pub conflicts_resolved: u64,
    /// Message of the most recent failure, cleared on success.
    pub last_error: Option<String>,
    /// Completion time of the last successful cycle.
    pub last_sync_time: Option<Instant>,
}

/// Result of one sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// Pull phase counters.
    pub pull: PullSummary,
    /// Push phase counters.
    pub push: PushSummary,
    /// Wall-clock duration of the cycle.
    pub duration: Duration,
    /// Whether the cycle was preceded by a full local reset.
    pub did_reset: bool,
}

/// Owns the sync/reset lifecycle and composes the pull and push engines.
///
/// The coordinator serializes concurrent sync attempts through a single
/// state slot, runs the phases in the configured order, and exposes the
/// observable state the embedding application surfaces in its UI. Engine
/// failures are returned to the caller as failed-sync results and never
/// panic or poison the coordinator; the slot is released on every exit
/// path.
pub struct SyncCoordinator<T, A, B>
where
    T: ContentTransport,
    A: AssetTransport,
    B: BinarySource,
{
    config: SyncConfig,
    store: Arc<MemoryStore>,
    transport: Arc<T>,
    assets: Arc<A>,
    binaries: Arc<B>,
    state: RwLock<CoordinatorState>,
    stats: RwLock<SyncStats>,
    cancel: CancelFlag,
}

impl<T, A, B> SyncCoordinator<T, A, B>
where
    T: ContentTransport,
    A: AssetTransport,
    B: BinarySource,
{
    /// Creates a coordinator over the given store and transports.
    pub fn new(
        config: SyncConfig,
        store: Arc<MemoryStore>,
        transport: Arc<T>,
        assets: Arc<A>,
        binaries: Arc<B>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            assets,
            binaries,
            state: RwLock::new(CoordinatorState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cancel: CancelFlag::new(),
        }
    }

    /// The local store this coordinator syncs.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CoordinatorState {
        *self.state.read()
    }

    /// True while a sync cycle is running.
    pub fn is_syncing(&self) -> bool {
        self.state() == CoordinatorState::Syncing
    }

    /// True while a reset-and-sync is running.
    pub fn is_resetting(&self) -> bool {
        self.state() == CoordinatorState::Resetting
    }

    /// Number of local records still awaiting a push.
    pub fn pending_push_count(&self) -> usize {
        self.store.dirty_count()
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Requests cooperative cancellation of the in-flight cycle.
    ///
    /// Used when the embedding application switches content mode: cancel,
    /// wait for the running cycle to return, then rebuild the engine with
    /// the new mode. The store and cursor keep their last committed state.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Runs one sync cycle, if no other activity holds the slot.
    pub fn sync(&self) -> SyncResult<SyncReport> {
        let _slot = self.acquire(CoordinatorState::Syncing)?;
        self.cancel.reset();
        let result = self.run_cycle(false);
        self.record(&result);
        result
    }

    /// Wipes all local records and the cursor, then runs a full cycle.
    pub fn reset_and_sync(&self) -> SyncResult<SyncReport> {
        let _slot = self.acquire(CoordinatorState::Resetting)?;
        self.cancel.reset();

        let result = self
            .store
            .run_in_transaction(|tx| {
                tx.wipe();
                Ok(())
            })
            .map_err(SyncError::from)
            .and_then(|()| {
                info!("local store wiped; pulling from scratch");
                self.run_cycle(true)
            });
        self.record(&result);
        result
    }

    /// Runs one sync cycle on a background thread and hands the result to
    /// `on_complete`.
    pub fn spawn_sync<F>(self: &Arc<Self>, on_complete: F) -> JoinHandle<()>
    where
        F: FnOnce(SyncResult<SyncReport>) + Send + 'static,
        T: 'static,
        A: 'static,
        B: 'static,
    {
        let coordinator = Arc::clone(self);
        std::thread::spawn(move || on_complete(coordinator.sync()))
    }

    fn acquire(&self, target: CoordinatorState) -> SyncResult<SlotGuard<'_>> {
        let mut state = self.state.write();
        if state.is_busy() {
            return Err(SyncError::Busy {
                active: state.to_string(),
            });
        }
        *state = target;
        Ok(SlotGuard { state: &self.state })
    }

    fn run_cycle(&self, did_reset: bool) -> SyncResult<SyncReport> {
        let start = Instant::now();
        let pull_engine = PullEngine::new(&self.store, self.transport.as_ref(), &self.config);
        let push_engine = PushEngine::new(
            &self.store,
            self.transport.as_ref(),
            self.assets.as_ref(),
            self.binaries.as_ref(),
            &self.config,
        );

        let (pull, push) = match self.config.order {
            SyncOrder::PullThenPush => {
                let pull = pull_engine.run(&self.cancel)?;
                let push = push_engine.run(&self.cancel)?;
                (pull, push)
            }
            SyncOrder::PushThenPull => {
                let push = push_engine.run(&self.cancel)?;
                let pull = pull_engine.run(&self.cancel)?;
                (pull, push)
            }
        };

        Ok(SyncReport {
            pull,
            push,
            duration: start.elapsed(),
            did_reset,
        })
    }

    fn record(&self, result: &SyncResult<SyncReport>) {
        let mut stats = self.stats.write();
        match result {
            Ok(report) => {
                stats.cycles_completed += 1;
                stats.records_pulled += report.pull.upserted + report.pull.deleted;
                stats.records_pushed += report.push.pushed + report.push.deleted;
                stats.conflicts_resolved +=
                    report.push.conflicts_kept_local + report.push.conflicts_accepted_remote;
                stats.last_error = None;
                stats.last_sync_time = Some(Instant::now());
            }
            Err(err) => {
                warn!(%err, "sync cycle failed");
                stats.last_error = Some(err.to_string());
            }
        }
    }
}

/// Releases the state slot on every exit path, including panics and early
/// returns from failed phases.
struct SlotGuard<'a> {
    state: &'a RwLock<CoordinatorState>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        *self.state.write() = CoordinatorState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryBinarySource, MockTransport};
    use shelfsync_protocol::{
        PullRequest, PullResponse, RecordId, RemoteAsset, RemoteEntry, SyncCursor,
    };
    use shelfsync_store::{Entry, SaveOrigin};
    use std::sync::mpsc;

    fn coordinator(
        transport: MockTransport,
    ) -> Arc<SyncCoordinator<MockTransport, MockTransport, MemoryBinarySource>> {
        let transport = Arc::new(transport);
        Arc::new(SyncCoordinator::new(
            SyncConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::clone(&transport),
            transport,
            Arc::new(MemoryBinarySource::new()),
        ))
    }

    #[test]
    fn idle_coordinator_runs_empty_cycle() {
        let transport = MockTransport::new();
        transport.script_pull(Ok(PullResponse::empty("tok-1")));

        let coordinator = coordinator(transport);
        assert_eq!(coordinator.state(), CoordinatorState::Idle);

        let report = coordinator.sync().unwrap();
        assert_eq!(report.pull.upserted, 0);
        assert_eq!(report.push.pushed, 0);
        assert!(!report.did_reset);
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert_eq!(coordinator.stats().cycles_completed, 1);
    }

    #[test]
    fn failed_cycle_returns_to_idle_and_records_error() {
        let transport = MockTransport::new();
        transport.script_pull(Err(SyncError::network("offline")));

        let coordinator = coordinator(transport);
        assert!(coordinator.sync().is_err());
        assert_eq!(coordinator.state(), CoordinatorState::Idle);

        let stats = coordinator.stats();
        assert_eq!(stats.cycles_completed, 0);
        assert!(stats.last_error.unwrap().contains("network"));

        // a later success clears the error
        let transport = MockTransport::new();
        transport.script_pull(Ok(PullResponse::empty("tok-1")));
        let coordinator = self::coordinator(transport);
        coordinator.sync().unwrap();
        assert!(coordinator.stats().last_error.is_none());
    }

    #[test]
    fn reset_and_sync_wipes_before_pulling() {
        let transport = MockTransport::new();
        transport.script_pull(Ok(PullResponse::empty("tok-fresh")));

        let coordinator = coordinator(transport);
        coordinator
            .store()
            .run_in_transaction(|tx| {
                let mut entry = Entry::new("Stale", "en-US");
                entry.is_dirty = false;
                tx.put_entry(entry, SaveOrigin::Sync);
                tx.set_cursor(SyncCursor::at("tok-old"));
                Ok(())
            })
            .unwrap();

        let report = coordinator.reset_and_sync().unwrap();
        assert!(report.did_reset);
        assert_eq!(coordinator.store().fetch_entries(|_| true).len(), 0);
        assert_eq!(coordinator.store().cursor(), SyncCursor::at("tok-fresh"));
        // the pull after the wipe was a full fetch
        assert_eq!(coordinator.transport.pulls_seen()[0].token, None);
    }

    #[test]
    fn pending_push_count_tracks_dirty_records() {
        let transport = MockTransport::new();
        let coordinator = coordinator(transport);
        assert_eq!(coordinator.pending_push_count(), 0);

        coordinator
            .store()
            .run_in_transaction(|tx| {
                tx.put_entry(Entry::new("Draft", "en-US"), SaveOrigin::Local);
                Ok(())
            })
            .unwrap();
        assert_eq!(coordinator.pending_push_count(), 1);
    }

    /// Transport whose pull blocks until the test releases it, to hold the
    /// coordinator in the `Syncing` state.
    struct GateTransport {
        entered: mpsc::SyncSender<()>,
        release: parking_lot::Mutex<mpsc::Receiver<()>>,
    }

    impl ContentTransport for GateTransport {
        fn pull(&self, _request: &PullRequest) -> SyncResult<PullResponse> {
            self.entered.send(()).unwrap();
            self.release.lock().recv().unwrap();
            Ok(PullResponse::empty("tok-1"))
        }

        fn fetch_entry(&self, _id: &RecordId) -> SyncResult<Option<RemoteEntry>> {
            Ok(None)
        }

        fn fetch_asset(&self, _id: &RecordId) -> SyncResult<Option<RemoteAsset>> {
            Ok(None)
        }

        fn write_entry(
            &self,
            _payload: &shelfsync_protocol::EntryPayload,
            _expected_version: Option<u32>,
        ) -> SyncResult<shelfsync_protocol::WriteAck> {
            Err(SyncError::Remote("unexpected write".into()))
        }

        fn write_asset(
            &self,
            _payload: &shelfsync_protocol::AssetPayload,
            _expected_version: Option<u32>,
        ) -> SyncResult<shelfsync_protocol::WriteAck> {
            Err(SyncError::Remote("unexpected write".into()))
        }

        fn delete_entry(&self, _id: &RecordId, _expected_version: u32) -> SyncResult<()> {
            Err(SyncError::Remote("unexpected delete".into()))
        }

        fn delete_asset(&self, _id: &RecordId, _expected_version: u32) -> SyncResult<()> {
            Err(SyncError::Remote("unexpected delete".into()))
        }
    }

    #[test]
    fn concurrent_sync_request_is_dropped() {
        let (entered_tx, entered_rx) = mpsc::sync_channel(1);
        let (release_tx, release_rx) = mpsc::sync_channel::<()>(1);
        let gate = GateTransport {
            entered: entered_tx,
            release: parking_lot::Mutex::new(release_rx),
        };

        let coordinator = Arc::new(SyncCoordinator::new(
            SyncConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(gate),
            Arc::new(MockTransport::new()),
            Arc::new(MemoryBinarySource::new()),
        ));

        let (done_tx, done_rx) = mpsc::channel();
        let handle = coordinator.spawn_sync(move |result| done_tx.send(result).unwrap());

        // wait until the background cycle holds the slot
        entered_rx.recv().unwrap();
        assert!(coordinator.is_syncing());

        let err = coordinator.sync().unwrap_err();
        assert!(matches!(err, SyncError::Busy { .. }));

        release_tx.send(()).unwrap();
        let result = done_rx.recv().unwrap();
        assert!(result.is_ok());
        handle.join().unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[test]
    fn stale_cancel_does_not_affect_next_cycle() {
        let transport = MockTransport::new();
        let coordinator = coordinator(transport);
        // sync() resets the flag on entry; cancellation targets in-flight
        // cycles only
        coordinator.cancel();
        coordinator.transport.script_pull(Ok(PullResponse::empty("t")));
        assert!(coordinator.sync().is_ok());
    }
}
