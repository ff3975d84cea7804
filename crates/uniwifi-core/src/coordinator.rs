// ── Polling coordinator ──
//
// One coordinator per controller endpoint. Owns the cache, the refresh
// schedule, single-flight coalescing, failure classification, and listener
// notification. All operations against one controller are serialized
// through the flight slot — concurrent sessions against the same
// controller never overlap.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use uniwifi_api::{ControllerEndpoint, Session};

use crate::cache::{Cache, CacheSnapshot, WlanChange, wlan_changes};
use crate::error::CoreError;

const UPDATE_CHANNEL_SIZE: usize = 64;

// ── Observable state ─────────────────────────────────────────────────

/// Coordinator lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// Scheduled and waiting for the next tick.
    Idle,
    /// A refresh cycle is in flight.
    Refreshing,
    /// Terminal: too many consecutive auth failures. The schedule has
    /// stopped; credentials need operator attention.
    Failed,
}

/// Which failure class a refresh cycle ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 401/403 — credentials should be re-checked.
    Auth,
    /// Server failure, connectivity, or deadline — retried on schedule.
    Api,
}

/// Notification delivered to subscribers after every refresh cycle.
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// Cache replaced; `changes` lists ssids whose user-relevant fields
    /// differ from the previous snapshot.
    Updated { changes: Vec<WlanChange> },
    /// Cycle failed; previous snapshot remains visible.
    UpdateFailed { kind: FailureKind, message: String },
}

/// Outcome of one refresh cycle (or of the in-flight cycle a caller
/// coalesced onto).
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Updated { changes: Vec<WlanChange> },
    AuthFailed { message: String },
    ApiFailed { message: String },
    TimedOut { timeout_secs: u64 },
    /// The coordinator is terminal; no cycle was attempted.
    Stopped,
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }

    /// Convert into a `Result` for callers that must propagate failure
    /// (the mandatory refresh-after-write, primarily).
    pub fn into_result(self) -> Result<Vec<WlanChange>, CoreError> {
        match self {
            Self::Updated { changes } => Ok(changes),
            Self::AuthFailed { message } => Err(CoreError::AuthenticationFailed { message }),
            Self::ApiFailed { message } => Err(CoreError::ApiUnavailable { message }),
            Self::TimedOut { timeout_secs } => Err(CoreError::RefreshTimeout { timeout_secs }),
            Self::Stopped => Err(CoreError::CoordinatorFailed),
        }
    }
}

/// One in-flight refresh cycle: the sequence number assigned when its
/// leader claimed the slot, and the channel its outcome arrives on.
struct Flight {
    started_at: u64,
    rx: watch::Receiver<Option<RefreshOutcome>>,
}

/// Role a `refresh()` caller ends up with: the leader runs the cycle,
/// followers await the leader's outcome, and a caller whose ordering
/// barrier postdates the in-flight cycle waits it out and retries.
enum FlightRole {
    Leader(watch::Sender<Option<RefreshOutcome>>),
    Follower(watch::Receiver<Option<RefreshOutcome>>),
    Stale(watch::Receiver<Option<RefreshOutcome>>),
}

// ── Coordinator ──────────────────────────────────────────────────────

/// Polling coordinator for one controller endpoint.
///
/// Cheaply cloneable via `Arc`. Create with [`new`](Self::new), then call
/// [`start`](Self::start) to spawn the poll task, or drive refreshes by
/// hand with [`refresh`](Self::refresh).
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    endpoint: ControllerEndpoint,
    cache: Cache,
    state: watch::Sender<CoordinatorState>,
    update_tx: broadcast::Sender<UpdateEvent>,
    /// Single-flight slot: `Some` while a cycle is in flight. Followers
    /// clone the receiver and await the leader's outcome instead of
    /// opening a second session against the same controller.
    flight: StdMutex<Option<Flight>>,
    /// Monotonic count of cycles ever started; orders cycles against
    /// writes so a post-write refresh never accepts a stale fetch.
    cycles_started: AtomicU64,
    consecutive_auth_failures: AtomicU32,
    cancel: CancellationToken,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Create a coordinator with an empty cache. Does not poll until
    /// [`start`](Self::start) is called.
    pub fn new(endpoint: ControllerEndpoint) -> Self {
        let (state, _) = watch::channel(CoordinatorState::Idle);
        let (update_tx, _) = broadcast::channel(UPDATE_CHANNEL_SIZE);

        Self {
            inner: Arc::new(CoordinatorInner {
                endpoint,
                cache: Cache::new(),
                state,
                update_tx,
                flight: StdMutex::new(None),
                cycles_started: AtomicU64::new(0),
                consecutive_auth_failures: AtomicU32::new(0),
                cancel: CancellationToken::new(),
                poll_handle: Mutex::new(None),
            }),
        }
    }

    /// The endpoint this coordinator polls.
    pub fn endpoint(&self) -> &ControllerEndpoint {
        &self.inner.endpoint
    }

    /// Current cache snapshot. Safe to call at any time, including
    /// mid-refresh: always a complete old or complete new snapshot.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.inner.cache.snapshot()
    }

    /// Subscribe to coordinator state transitions.
    pub fn state(&self) -> watch::Receiver<CoordinatorState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to update notifications. Unsubscribe by dropping the
    /// receiver.
    pub fn updates(&self) -> broadcast::Receiver<UpdateEvent> {
        self.inner.update_tx.subscribe()
    }

    // ── Scheduling ───────────────────────────────────────────────────

    /// Spawn the poll task. The first tick fires immediately, giving the
    /// cache its initial fill; later ticks follow the endpoint's poll
    /// interval. Calling `start` twice replaces nothing — the second call
    /// is ignored.
    pub async fn start(&self) {
        let mut guard = self.inner.poll_handle.lock().await;
        if guard.is_some() {
            return;
        }

        let coordinator = self.clone();
        let cancel = self.inner.cancel.clone();
        let interval = self.inner.endpoint.poll_interval;

        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if matches!(coordinator.refresh().await, RefreshOutcome::Stopped) {
                            break;
                        }
                    }
                }
            }
            debug!(controller = %coordinator.inner.endpoint.name, "poll task exited");
        }));
    }

    /// Stop the poll task and wait for it to finish. In-flight refreshes
    /// complete; no new ticks fire.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(handle) = self.inner.poll_handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    // ── Refresh protocol ─────────────────────────────────────────────

    /// Refresh now, or coalesce onto the refresh already in flight.
    ///
    /// Exactly one session is opened per cycle no matter how many callers
    /// arrive while it runs — every caller receives the same outcome.
    pub async fn refresh(&self) -> RefreshOutcome {
        // Cycle numbering starts at 1, so barrier 0 accepts any cycle.
        self.refresh_started_after(0).await
    }

    /// The current cycle sequence number, for use as an ordering barrier:
    /// any cycle started after this point observes controller state from
    /// after the caller's own requests.
    pub(crate) fn cycle_barrier(&self) -> u64 {
        self.inner.cycles_started.load(Ordering::SeqCst)
    }

    /// Refresh, accepting only the outcome of a cycle that started after
    /// `barrier`. An in-flight cycle that started earlier may have fetched
    /// before the caller's write, so it is waited out and a fresh cycle is
    /// run instead of coalescing onto it.
    pub(crate) async fn refresh_started_after(&self, barrier: u64) -> RefreshOutcome {
        loop {
            let role = {
                let mut guard = self.inner.flight.lock().expect("flight lock poisoned");
                match guard.as_ref() {
                    Some(flight) if flight.started_at > barrier => {
                        FlightRole::Follower(flight.rx.clone())
                    }
                    Some(flight) => FlightRole::Stale(flight.rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        let started_at =
                            self.inner.cycles_started.fetch_add(1, Ordering::SeqCst) + 1;
                        *guard = Some(Flight { started_at, rx });
                        FlightRole::Leader(tx)
                    }
                }
            };

            match role {
                FlightRole::Leader(tx) => {
                    let outcome = self.lead_cycle().await;
                    // Clear the slot before publishing so late arrivals
                    // start a fresh cycle instead of reading a stale
                    // outcome.
                    *self.inner.flight.lock().expect("flight lock poisoned") = None;
                    let _ = tx.send(Some(outcome.clone()));
                    return outcome;
                }
                FlightRole::Follower(rx) => return Self::await_outcome(rx).await,
                FlightRole::Stale(rx) => {
                    let _ = Self::await_outcome(rx).await;
                }
            }
        }
    }

    async fn await_outcome(mut rx: watch::Receiver<Option<RefreshOutcome>>) -> RefreshOutcome {
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return RefreshOutcome::ApiFailed {
                    message: "refresh cycle aborted".into(),
                };
            }
        }
    }

    /// Run one full cycle as the flight leader and apply the failure
    /// policy to its outcome.
    async fn lead_cycle(&self) -> RefreshOutcome {
        if *self.inner.state.borrow() == CoordinatorState::Failed {
            return RefreshOutcome::Stopped;
        }

        self.inner.state.send_replace(CoordinatorState::Refreshing);
        debug!(controller = %self.inner.endpoint.name, "refresh cycle started");

        let deadline = self.inner.endpoint.request_timeout;
        let outcome = match tokio::time::timeout(deadline, self.fetch_snapshot()).await {
            Ok(Ok(snapshot)) => {
                let old = self.inner.cache.replace(snapshot);
                let changes = wlan_changes(&old, &self.inner.cache.snapshot());
                RefreshOutcome::Updated { changes }
            }
            Ok(Err(err)) if err.is_auth() => RefreshOutcome::AuthFailed {
                message: err.to_string(),
            },
            Ok(Err(err)) => RefreshOutcome::ApiFailed {
                message: err.to_string(),
            },
            // Deadline exceeded: the partial session is dropped on the
            // floor and nothing reaches the cache.
            Err(_) => RefreshOutcome::TimedOut {
                timeout_secs: deadline.as_secs(),
            },
        };

        match &outcome {
            RefreshOutcome::Updated { changes } => {
                self.inner
                    .consecutive_auth_failures
                    .store(0, Ordering::Relaxed);
                self.inner.state.send_replace(CoordinatorState::Idle);
                debug!(
                    controller = %self.inner.endpoint.name,
                    changed = changes.len(),
                    "refresh cycle complete"
                );
                let _ = self.inner.update_tx.send(UpdateEvent::Updated {
                    changes: changes.clone(),
                });
            }
            RefreshOutcome::AuthFailed { message } => {
                let failures = self
                    .inner
                    .consecutive_auth_failures
                    .fetch_add(1, Ordering::Relaxed)
                    + 1;
                let limit = self.inner.endpoint.auth_failure_limit;
                if failures >= limit {
                    warn!(
                        controller = %self.inner.endpoint.name,
                        failures,
                        "auth failure limit reached, stopping schedule"
                    );
                    self.inner.state.send_replace(CoordinatorState::Failed);
                } else {
                    info!(
                        controller = %self.inner.endpoint.name,
                        failures, limit,
                        "update failed, credentials should be re-checked"
                    );
                    self.inner.state.send_replace(CoordinatorState::Idle);
                }
                let _ = self.inner.update_tx.send(UpdateEvent::UpdateFailed {
                    kind: FailureKind::Auth,
                    message: message.clone(),
                });
            }
            RefreshOutcome::ApiFailed { message } => {
                // A non-auth failure breaks any run of consecutive auth
                // failures.
                self.inner
                    .consecutive_auth_failures
                    .store(0, Ordering::Relaxed);
                self.inner.state.send_replace(CoordinatorState::Idle);
                info!(
                    controller = %self.inner.endpoint.name,
                    %message,
                    "update failed, retrying on schedule"
                );
                let _ = self.inner.update_tx.send(UpdateEvent::UpdateFailed {
                    kind: FailureKind::Api,
                    message: message.clone(),
                });
            }
            RefreshOutcome::TimedOut { timeout_secs } => {
                self.inner
                    .consecutive_auth_failures
                    .store(0, Ordering::Relaxed);
                self.inner.state.send_replace(CoordinatorState::Idle);
                info!(
                    controller = %self.inner.endpoint.name,
                    timeout_secs,
                    "refresh deadline exceeded, retrying on schedule"
                );
                let _ = self.inner.update_tx.send(UpdateEvent::UpdateFailed {
                    kind: FailureKind::Api,
                    message: format!("refresh exceeded {timeout_secs}s deadline"),
                });
            }
            RefreshOutcome::Stopped => {}
        }

        outcome
    }

    /// Open a session, run the fetchers, and build the replacement
    /// snapshot. The session is logged out on success and failure alike;
    /// logout failures never mask the fetch result.
    async fn fetch_snapshot(&self) -> Result<CacheSnapshot, CoreError> {
        let session = Session::login(&self.inner.endpoint).await?;
        let fetched = self.run_fetchers(&session).await;

        if let Err(e) = session.logout().await {
            warn!(controller = %self.inner.endpoint.name, error = %e, "logout failed (non-fatal)");
        }

        let (wlans, networks, system_info) = fetched?;
        Ok(CacheSnapshot {
            wlans,
            networks,
            system_info,
            refreshed_at: Some(Utc::now()),
        })
    }

    async fn run_fetchers(
        &self,
        session: &Session,
    ) -> Result<
        (
            Vec<uniwifi_api::WlanConfig>,
            Vec<uniwifi_api::NetworkConfig>,
            uniwifi_api::SystemInfo,
        ),
        CoreError,
    > {
        let wlans = session.list_wlans().await?;
        let networks = session.list_networks().await?;
        let system_info = session.sys_info().await?;
        Ok((wlans, networks, system_info))
    }
}
