//! Polling coordinator owning the current snapshot and its refresh cadence.
//!
//! One coordinator polls exactly one household. It re-derives its own poll
//! interval after every successful fetch (daily normally, every 15 minutes
//! on collection days) and runs an independent fine-grained tick that
//! watches for the wall-clock date rolling over onto a collection day
//! between scheduled polls.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::model::{CollectionKind, Snapshot, Uprn};
use crate::ports::{CollectionPort, PortError};

/// Poll cadence outside collection days.
pub const POLL_INTERVAL_NORMAL: Duration = Duration::from_secs(24 * 60 * 60);
/// Poll cadence while today is a collection day.
pub const POLL_INTERVAL_COLLECTION_DAY: Duration = Duration::from_secs(15 * 60);
/// Cadence of the date-rollover check, much finer than either poll interval.
pub const ROLLOVER_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(thiserror::Error, Debug)]
/// Refresh failure surfaced to the host.
///
/// The previously held snapshot stays untouched; stale data is preferred
/// over no data.
pub enum UpdateFailed {
    /// The fetch layer could not reach the remote service.
    #[error("Error communicating with the waste service: {0}")]
    Remote(#[from] PortError),
}

/// Mutable coordinator state, guarded by a single lock.
#[derive(Debug)]
struct CoordinatorState {
    snapshot: Option<Snapshot>,
    poll_interval: Duration,
    last_fetch_at: Option<DateTime<Local>>,
}

/// Shared core of a coordinator, owned jointly with its timer tasks.
struct Inner {
    uprn: Uprn,
    port: Arc<dyn CollectionPort>,
    state: RwLock<CoordinatorState>,
    /// Serialises fetches. Held across the network call so that a forced
    /// rollover refresh can detect an in-flight refresh and skip instead of
    /// queueing behind it.
    refresh_gate: AsyncMutex<()>,
    /// Wakes the poll timer so an interval change or out-of-band refresh
    /// re-arms the next firing from now.
    reschedule: Notify,
}

impl Inner {
    fn with_state<R>(&self, read: impl FnOnce(&CoordinatorState) -> R) -> R {
        let state = self.state.read().expect("coordinator state lock poisoned");
        read(&state)
    }

    fn with_state_mut<R>(&self, write: impl FnOnce(&mut CoordinatorState) -> R) -> R {
        let mut state = self.state.write().expect("coordinator state lock poisoned");
        write(&mut state)
    }

    /// Fetch and commit a new snapshot. Caller must hold `refresh_gate`.
    async fn refresh_locked(&self) -> Result<Snapshot, UpdateFailed> {
        let snapshot = self.port.fetch_collections(&self.uprn).await?;

        let today = Local::now().date_naive();
        let interval = if snapshot.has_collection_on(today) {
            POLL_INTERVAL_COLLECTION_DAY
        } else {
            POLL_INTERVAL_NORMAL
        };

        self.with_state_mut(|state| {
            if state.poll_interval != interval {
                tracing::debug!(
                    uprn = %self.uprn,
                    ?interval,
                    "poll cadence changed"
                );
            }
            state.snapshot = Some(snapshot.clone());
            state.poll_interval = interval;
            state.last_fetch_at = Some(Local::now());
        });

        Ok(snapshot)
    }

    /// Whether the wall-clock date has advanced past the last fetch and the
    /// held snapshot says the new date is a collection day.
    fn rollover_refresh_due(&self, today: NaiveDate) -> bool {
        self.with_state(|state| {
            let (Some(snapshot), Some(last_fetch)) = (&state.snapshot, state.last_fetch_at) else {
                return false;
            };
            today > last_fetch.date_naive() && snapshot.has_collection_on(today)
        })
    }
}

#[derive(Debug)]
/// Handle to a spawned timer task, cancelled exactly once at shutdown.
pub struct TimerHandle(JoinHandle<()>);

impl TimerHandle {
    fn cancel(self) {
        self.0.abort();
    }
}

/// Polls the collection service for a single household and answers
/// read-only queries over the most recent snapshot.
pub struct CollectionCoordinator {
    inner: Arc<Inner>,
    poll_timer: Option<TimerHandle>,
    rollover_timer: Option<TimerHandle>,
}

impl CollectionCoordinator {
    /// Create a coordinator for one household. No timers run until
    /// [`Self::start`] is called.
    #[must_use]
    pub fn new(uprn: Uprn, port: Arc<dyn CollectionPort>) -> Self {
        Self {
            inner: Arc::new(Inner {
                uprn,
                port,
                state: RwLock::new(CoordinatorState {
                    snapshot: None,
                    poll_interval: POLL_INTERVAL_NORMAL,
                    last_fetch_at: None,
                }),
                refresh_gate: AsyncMutex::new(()),
                reschedule: Notify::new(),
            }),
            poll_timer: None,
            rollover_timer: None,
        }
    }

    /// The household this coordinator polls.
    #[must_use]
    pub fn uprn(&self) -> &Uprn {
        &self.inner.uprn
    }

    /// Spawn the adaptive poll timer and the date-rollover checker.
    ///
    /// Must be called from within a tokio runtime. Calling it again while
    /// the timers are running is a no-op.
    pub fn start(&mut self) {
        if self.poll_timer.is_none() {
            let inner = Arc::clone(&self.inner);
            self.poll_timer = Some(TimerHandle(tokio::spawn(run_poll_timer(inner))));
        }
        if self.rollover_timer.is_none() {
            let inner = Arc::clone(&self.inner);
            self.rollover_timer = Some(TimerHandle(tokio::spawn(run_rollover_timer(inner))));
        }
    }

    /// Stop issuing refreshes and cancel both timers.
    ///
    /// An in-flight fetch may still complete on the runtime; its result is
    /// discarded along with the task.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.poll_timer.take() {
            handle.cancel();
        }
        if let Some(handle) = self.rollover_timer.take() {
            handle.cancel();
        }
    }

    /// Fetch fresh data now, replacing the held snapshot on success.
    ///
    /// On success the poll interval is re-derived from the new snapshot and
    /// the poll timer is re-armed from now.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateFailed`] when the fetch layer reports a transport
    /// failure. The held snapshot and cadence stay as they were.
    pub async fn refresh(&self) -> Result<Snapshot, UpdateFailed> {
        let gate = self.inner.refresh_gate.lock().await;
        let snapshot = self.inner.refresh_locked().await?;
        drop(gate);

        self.inner.reschedule.notify_one();
        Ok(snapshot)
    }

    /// Force a refresh if the date has rolled over onto a collection day.
    ///
    /// Returns `true` when a refresh was performed. Does nothing — and
    /// returns `false` — when no snapshot is held yet, when the date has
    /// not advanced since the last fetch, when the new date is not a
    /// collection day, or when another refresh is already in flight.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateFailed`] when the forced fetch itself fails.
    pub async fn refresh_if_rolled_over(&self) -> Result<bool, UpdateFailed> {
        let today = Local::now().date_naive();
        if !self.inner.rollover_refresh_due(today) {
            return Ok(false);
        }

        // A scheduled or manual refresh already underway will pick up the
        // new date on its own; skip rather than queue a second fetch.
        let Ok(gate) = self.inner.refresh_gate.try_lock() else {
            return Ok(false);
        };

        tracing::debug!(uprn = %self.inner.uprn, "date rolled over onto a collection day, forcing refresh");
        let result = self.inner.refresh_locked().await;
        drop(gate);

        result.map(|_| {
            self.inner.reschedule.notify_one();
            true
        })
    }

    /// Whether today is a collection day for `kind`, or any kind when
    /// `kind` is `None`. `false` before the first successful fetch.
    #[must_use]
    pub fn is_collection_day(&self, kind: Option<CollectionKind>) -> bool {
        let today = Local::now().date_naive();
        self.inner.with_state(|state| {
            state
                .snapshot
                .as_ref()
                .is_some_and(|snapshot| snapshot.is_collection_day(kind, today))
        })
    }

    /// Effective next collection date for a kind.
    #[must_use]
    pub fn next_collection_date(&self, kind: CollectionKind) -> Option<NaiveDate> {
        self.inner.with_state(|state| {
            state
                .snapshot
                .as_ref()
                .and_then(|snapshot| snapshot.collection(kind))
                .and_then(|info| info.next_collection)
        })
    }

    /// Raw live status name for a kind, if one is being reported.
    #[must_use]
    pub fn live_status(&self, kind: CollectionKind) -> Option<String> {
        self.inner.with_state(|state| {
            state
                .snapshot
                .as_ref()
                .and_then(|snapshot| snapshot.live_status(kind))
                .map(|status| status.status.clone())
        })
    }

    /// Explanatory text attached to a kind's live status, if any.
    #[must_use]
    pub fn live_status_reason(&self, kind: CollectionKind) -> Option<String> {
        self.inner.with_state(|state| {
            state
                .snapshot
                .as_ref()
                .and_then(|snapshot| snapshot.live_status(kind))
                .and_then(|status| status.reason.clone())
        })
    }

    /// Timestamp of the last completed collection for a kind.
    #[must_use]
    pub fn completion_time(&self, kind: CollectionKind) -> Option<DateTime<FixedOffset>> {
        self.inner.with_state(|state| {
            state
                .snapshot
                .as_ref()
                .and_then(|snapshot| snapshot.collection(kind))
                .and_then(|info| info.last_completed)
        })
    }

    /// Whether the household has this collection service at all.
    /// `false` before the first successful fetch.
    #[must_use]
    pub fn is_available(&self, kind: CollectionKind) -> bool {
        self.inner.with_state(|state| {
            state
                .snapshot
                .as_ref()
                .and_then(|snapshot| snapshot.collection(kind))
                .is_some_and(|info| info.available)
        })
    }

    /// Clone of the current snapshot, if any fetch has succeeded yet.
    #[must_use]
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.inner.with_state(|state| state.snapshot.clone())
    }

    /// The currently applied poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.inner.with_state(|state| state.poll_interval)
    }

    /// Local time of the last successful fetch.
    #[must_use]
    pub fn last_fetch_at(&self) -> Option<DateTime<Local>> {
        self.inner.with_state(|state| state.last_fetch_at)
    }
}

impl Drop for CollectionCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Adaptive poll loop: sleep for the current interval, refresh, repeat.
///
/// Re-arms immediately when an out-of-band refresh changes the cadence.
async fn run_poll_timer(inner: Arc<Inner>) {
    loop {
        let interval = inner.with_state(|state| state.poll_interval);

        tokio::select! {
            () = time::sleep(interval) => {
                let gate = inner.refresh_gate.lock().await;
                if let Err(error) = inner.refresh_locked().await {
                    // No retry here; the next scheduled tick tries again.
                    tracing::warn!(uprn = %inner.uprn, %error, "scheduled refresh failed, keeping previous snapshot");
                }
                drop(gate);
            }
            () = inner.reschedule.notified() => {}
        }
    }
}

/// Fixed 5-minute tick watching for the date advancing between polls.
async fn run_rollover_timer(inner: Arc<Inner>) {
    let mut ticker = time::interval(ROLLOVER_CHECK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval() fires immediately once; the rollover check only makes
    // sense after some time has passed.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let today = Local::now().date_naive();
        if !inner.rollover_refresh_due(today) {
            continue;
        }
        let Ok(gate) = inner.refresh_gate.try_lock() else {
            continue;
        };

        tracing::debug!(uprn = %inner.uprn, "date rolled over onto a collection day, forcing refresh");
        match inner.refresh_locked().await {
            Ok(_) => inner.reschedule.notify_one(),
            Err(error) => {
                tracing::warn!(uprn = %inner.uprn, %error, "forced rollover refresh failed");
            }
        }
        drop(gate);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::model::{CollectionInfo, LiveStatus};

    /// Port returning a scripted sequence of responses.
    struct ScriptedPort {
        responses: Mutex<VecDeque<Result<Snapshot, String>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedPort {
        fn new(responses: Vec<Result<Snapshot, String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().expect("calls lock")
        }
    }

    #[async_trait]
    impl CollectionPort for ScriptedPort {
        async fn fetch_collections(&self, _uprn: &Uprn) -> Result<Snapshot, PortError> {
            *self.calls.lock().expect("calls lock") += 1;
            self.responses
                .lock()
                .expect("responses lock")
                .pop_front()
                .expect("scripted port ran out of responses")
                .map_err(PortError::Internal)
        }
    }

    fn info_with_next(next: Option<NaiveDate>) -> CollectionInfo {
        CollectionInfo {
            next_collection: next,
            original_next_collection: next,
            last_collection: None,
            last_completed: None,
            available: true,
            schedule: "Weekly".to_owned(),
            round: "R1".to_owned(),
            round_group: "G1".to_owned(),
        }
    }

    fn snapshot_with_next(next: NaiveDate) -> Snapshot {
        Snapshot {
            collections: HashMap::from([(CollectionKind::Refuse, info_with_next(Some(next)))]),
            live_status: HashMap::new(),
            fetched_at: Local::now(),
        }
    }

    fn coordinator(port: Arc<ScriptedPort>) -> CollectionCoordinator {
        CollectionCoordinator::new(Uprn("12345".to_owned()), port)
    }

    #[test]
    fn queries_are_empty_before_first_fetch() {
        let coordinator = coordinator(ScriptedPort::new(Vec::new()));

        assert!(!coordinator.is_collection_day(None));
        assert!(!coordinator.is_available(CollectionKind::Refuse));
        assert_eq!(coordinator.next_collection_date(CollectionKind::Refuse), None);
        assert_eq!(coordinator.live_status(CollectionKind::Refuse), None);
        assert_eq!(coordinator.live_status_reason(CollectionKind::Refuse), None);
        assert_eq!(coordinator.completion_time(CollectionKind::Refuse), None);
        assert_eq!(coordinator.poll_interval(), POLL_INTERVAL_NORMAL);
    }

    #[tokio::test]
    async fn interval_follows_collection_day_in_both_directions() {
        let today = Local::now().date_naive();
        let next_week = today + ChronoDuration::days(7);
        let port = ScriptedPort::new(vec![
            Ok(snapshot_with_next(today)),
            Ok(snapshot_with_next(next_week)),
            Ok(snapshot_with_next(today)),
        ]);
        let coordinator = coordinator(port);

        coordinator.refresh().await.expect("first refresh");
        assert_eq!(coordinator.poll_interval(), POLL_INTERVAL_COLLECTION_DAY);

        coordinator.refresh().await.expect("second refresh");
        assert_eq!(coordinator.poll_interval(), POLL_INTERVAL_NORMAL);

        coordinator.refresh().await.expect("third refresh");
        assert_eq!(coordinator.poll_interval(), POLL_INTERVAL_COLLECTION_DAY);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot_and_cadence() {
        let today = Local::now().date_naive();
        let port = ScriptedPort::new(vec![
            Ok(snapshot_with_next(today)),
            Err("boom".to_owned()),
        ]);
        let coordinator = coordinator(port);

        coordinator.refresh().await.expect("first refresh");
        let last_fetch = coordinator.last_fetch_at();

        let result = coordinator.refresh().await;
        assert!(result.is_err(), "second refresh should surface the failure");

        assert_eq!(
            coordinator.next_collection_date(CollectionKind::Refuse),
            Some(today)
        );
        assert_eq!(coordinator.poll_interval(), POLL_INTERVAL_COLLECTION_DAY);
        assert_eq!(coordinator.last_fetch_at(), last_fetch);
    }

    #[tokio::test]
    async fn refresh_is_idempotent_for_unchanged_remote_data() {
        let today = Local::now().date_naive();
        let mut snapshot = snapshot_with_next(today + ChronoDuration::days(3));
        snapshot.live_status.insert(
            CollectionKind::Refuse,
            LiveStatus {
                status: "Not Started".to_owned(),
                reason: Some("Bank holiday".to_owned()),
                source: Some("crew".to_owned()),
            },
        );
        let port = ScriptedPort::new(vec![Ok(snapshot.clone()), Ok(snapshot)]);
        let coordinator = coordinator(port);

        let first = coordinator.refresh().await.expect("first refresh");
        let second = coordinator.refresh().await.expect("second refresh");

        assert_eq!(first.collections, second.collections);
        assert_eq!(first.live_status, second.live_status);
    }

    #[tokio::test]
    async fn rollover_forces_exactly_one_refresh_onto_new_collection_day() {
        let today = Local::now().date_naive();
        let port = ScriptedPort::new(vec![
            Ok(snapshot_with_next(today)),
            Ok(snapshot_with_next(today)),
        ]);
        let coordinator = coordinator(Arc::clone(&port));

        coordinator.refresh().await.expect("initial refresh");
        // Pretend the initial fetch happened yesterday.
        coordinator.inner.with_state_mut(|state| {
            state.last_fetch_at = state
                .last_fetch_at
                .map(|at| at - ChronoDuration::days(1));
        });

        let forced = coordinator
            .refresh_if_rolled_over()
            .await
            .expect("rollover check");
        assert!(forced, "crossing midnight into a collection day must force a refresh");
        assert_eq!(port.calls(), 2);

        // The forced refresh stamped last_fetch_at = today; no further
        // rollover refresh is due.
        let forced_again = coordinator
            .refresh_if_rolled_over()
            .await
            .expect("second rollover check");
        assert!(!forced_again);
        assert_eq!(port.calls(), 2);
    }

    #[tokio::test]
    async fn rollover_does_nothing_without_snapshot_or_collection_today() {
        let today = Local::now().date_naive();
        let port = ScriptedPort::new(vec![Ok(snapshot_with_next(
            today + ChronoDuration::days(2),
        ))]);
        let coordinator = coordinator(Arc::clone(&port));

        // No snapshot held yet.
        let forced = coordinator
            .refresh_if_rolled_over()
            .await
            .expect("rollover check");
        assert!(!forced);
        assert_eq!(port.calls(), 0);

        // Snapshot held, date advanced, but the new day is not a collection day.
        coordinator.refresh().await.expect("refresh");
        coordinator.inner.with_state_mut(|state| {
            state.last_fetch_at = state
                .last_fetch_at
                .map(|at| at - ChronoDuration::days(1));
        });
        let forced = coordinator
            .refresh_if_rolled_over()
            .await
            .expect("rollover check");
        assert!(!forced);
        assert_eq!(port.calls(), 1);
    }

    #[tokio::test]
    async fn rollover_skips_while_refresh_in_flight() {
        let today = Local::now().date_naive();
        let port = ScriptedPort::new(vec![Ok(snapshot_with_next(today))]);
        let coordinator = coordinator(Arc::clone(&port));

        coordinator.refresh().await.expect("refresh");
        coordinator.inner.with_state_mut(|state| {
            state.last_fetch_at = state
                .last_fetch_at
                .map(|at| at - ChronoDuration::days(1));
        });

        // Simulate an in-flight refresh by holding the gate.
        let gate = coordinator
            .inner
            .refresh_gate
            .try_lock()
            .expect("gate free");
        let forced = coordinator
            .refresh_if_rolled_over()
            .await
            .expect("rollover check");
        drop(gate);

        assert!(!forced, "a due rollover refresh must be skipped, not queued");
        assert_eq!(port.calls(), 1);
    }
}
