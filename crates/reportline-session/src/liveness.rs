//! Adaptive account-liveness polling.
//!
//! The scheduler asks the backend whether the account behind the stored
//! credential is still active. Checks are strictly sequential: the next
//! timer is armed only once the current check has settled, and its interval
//! is derived from how long the session has been running.
//!
//! ```text
//!   start()          active           inactive
//! Idle ──▶ Starting ───────▶ Running ──────────▶ StoppedByInactive
//!            │                  │  error
//!            │                  └──────────────▶ StoppedByError
//!            └─ skipped / 401 ─▶ Idle
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::StatusError;
use crate::oracle::ExpiryOracle;
use crate::store::SharedStore;

/// Settings for the liveness scheduler.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// Delay before the first check after [`LivenessScheduler::start`].
    pub initial_delay: Duration,

    /// Interval while the session is younger than `early_window`.
    pub early_interval: Duration,

    /// Interval while the session is younger than `mid_window`.
    pub mid_interval: Duration,

    /// Interval once the session is older than `mid_window`.
    pub late_interval: Duration,

    /// End of the early tier.
    pub early_window: Duration,

    /// End of the middle tier.
    pub mid_window: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            early_interval: Duration::from_secs(5),
            mid_interval: Duration::from_secs(15),
            late_interval: Duration::from_secs(30),
            early_window: Duration::from_secs(2 * 60),
            mid_window: Duration::from_secs(10 * 60),
        }
    }
}

impl LivenessConfig {
    /// Polling interval for a session that started `elapsed` ago.
    pub fn interval_for(&self, elapsed: Duration) -> Duration {
        if elapsed < self.early_window {
            self.early_interval
        } else if elapsed < self.mid_window {
            self.mid_interval
        } else {
            self.late_interval
        }
    }
}

/// Scheduler lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessPhase {
    /// No timer pending.
    Idle,
    /// Initial check pending.
    Starting,
    /// Recurring checks scheduled.
    Running,
    /// A check found the account inactive.
    StoppedByInactive,
    /// A check failed for a reason other than an expired credential.
    StoppedByError,
}

/// Why a liveness check could not be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckFailure {
    /// Connection failure.
    Network,
    /// No response within the request timeout.
    Timeout,
    /// Backend answered with a 5xx status.
    ServerError(u16),
    /// Backend answered with something other than a status report.
    UnexpectedResponse,
}

impl CheckFailure {
    /// Stable classification string for logs and UI messaging.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckFailure::Network => "network",
            CheckFailure::Timeout => "timeout",
            CheckFailure::ServerError(_) => "server_error",
            CheckFailure::UnexpectedResponse => "unexpected_response",
        }
    }
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend query answering "is this account still active?".
#[async_trait]
pub trait StatusChecker: Send + Sync {
    /// Check the account behind `token`.
    async fn is_account_active(&self, token: &str) -> Result<bool, StatusError>;
}

/// Receives the terminal results of liveness checks.
pub trait LivenessListener: Send + Sync {
    /// The account has been deactivated.
    fn on_inactive(&self);

    /// A check could not be completed.
    fn on_error(&self, failure: CheckFailure);
}

/// Shared listener handle.
pub type SharedListener = Arc<dyn LivenessListener>;

/// Result of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckOutcome {
    Active,
    Inactive,
    /// No credential, or a credential already known to be expired.
    Skipped,
    /// Backend rejected the credential; the expiry path owns this.
    Unauthorized,
    Failed(CheckFailure),
}

struct SchedulerState {
    phase: LivenessPhase,
    /// Bumped on every start/stop; completions from older runs are discarded.
    generation: u64,
    session_started_at: Option<Instant>,
    cancel: Option<CancellationToken>,
}

struct SchedulerInner {
    checker: Arc<dyn StatusChecker>,
    store: SharedStore,
    oracle: ExpiryOracle,
    config: LivenessConfig,
    state: Mutex<SchedulerState>,
}

/// Cancellable, tiered polling loop over [`StatusChecker`].
#[derive(Clone)]
pub struct LivenessScheduler {
    inner: Arc<SchedulerInner>,
}

impl LivenessScheduler {
    /// Create an idle scheduler.
    pub fn new(
        checker: Arc<dyn StatusChecker>,
        store: SharedStore,
        oracle: ExpiryOracle,
        config: LivenessConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                checker,
                store,
                oracle,
                config,
                state: Mutex::new(SchedulerState {
                    phase: LivenessPhase::Idle,
                    generation: 0,
                    session_started_at: None,
                    cancel: None,
                }),
            }),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> LivenessPhase {
        self.inner.state.lock().phase
    }

    /// Get the scheduler configuration.
    pub fn config(&self) -> &LivenessConfig {
        &self.inner.config
    }

    /// Start (or restart) polling.
    ///
    /// Any pending timer is cancelled and the session clock reset. The first
    /// check runs after `initial_delay`; recurring checks follow only if it
    /// reports the account active.
    pub fn start(&self, listener: SharedListener) {
        let (generation, cancel) = {
            let mut state = self.inner.state.lock();
            if let Some(previous) = state.cancel.take() {
                previous.cancel();
            }
            state.generation += 1;
            state.phase = LivenessPhase::Starting;
            state.session_started_at = Some(Instant::now());

            let cancel = CancellationToken::new();
            state.cancel = Some(cancel.clone());
            (state.generation, cancel)
        };

        debug!(generation = generation, "Liveness scheduler started");
        tokio::spawn(run_loop(
            Arc::clone(&self.inner),
            generation,
            cancel,
            listener,
        ));
    }

    /// Cancel the pending timer and return to [`LivenessPhase::Idle`].
    ///
    /// A check already in flight is allowed to finish; its result is ignored.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
            debug!(generation = state.generation, "Liveness scheduler stopped");
        }
        state.generation += 1;
        state.phase = LivenessPhase::Idle;
    }

    /// Run one check outside the recurring loop.
    ///
    /// Returns `Some(true)` if the account is active, `Some(false)` if it is
    /// inactive (after notifying `listener`), and `None` when the answer is
    /// unknown: no usable credential, a rejected credential, or a failed
    /// call (reported through `listener.on_error`). `None` is never a
    /// liveness confirmation.
    pub async fn express_check(&self, listener: &dyn LivenessListener) -> Option<bool> {
        match self.inner.check().await {
            CheckOutcome::Active => Some(true),
            CheckOutcome::Inactive => {
                info!("Express check: account inactive");
                listener.on_inactive();
                Some(false)
            }
            CheckOutcome::Skipped | CheckOutcome::Unauthorized => None,
            CheckOutcome::Failed(failure) => {
                listener.on_error(failure);
                None
            }
        }
    }
}

impl SchedulerInner {
    async fn check(&self) -> CheckOutcome {
        let Some(token) = self.store.token() else {
            trace!("No credential, skipping liveness check");
            return CheckOutcome::Skipped;
        };
        if self.oracle.is_expired(&token) {
            trace!("Credential expired, skipping liveness check");
            return CheckOutcome::Skipped;
        }

        match self.checker.is_account_active(&token).await {
            Ok(true) => CheckOutcome::Active,
            Ok(false) => CheckOutcome::Inactive,
            Err(StatusError::Unauthorized) => {
                debug!("Liveness check rejected credential");
                CheckOutcome::Unauthorized
            }
            Err(StatusError::Failed { kind, message }) => {
                warn!(kind = %kind, error = %message, "Liveness check failed");
                CheckOutcome::Failed(kind)
            }
        }
    }

    /// Apply a settled check to the state machine.
    ///
    /// Returns the delay before the next check, or `None` when the loop ends.
    /// A completion from a stale generation changes nothing.
    fn settle(&self, generation: u64, outcome: CheckOutcome) -> Option<Option<Duration>> {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(generation = generation, "Discarding stale liveness result");
            return None;
        }

        let next = match outcome {
            CheckOutcome::Active => {
                state.phase = LivenessPhase::Running;
                let elapsed = state
                    .session_started_at
                    .map(|started| started.elapsed())
                    .unwrap_or_default();
                Some(self.config.interval_for(elapsed))
            }
            CheckOutcome::Inactive => {
                state.phase = LivenessPhase::StoppedByInactive;
                None
            }
            CheckOutcome::Failed(_) => {
                state.phase = LivenessPhase::StoppedByError;
                None
            }
            CheckOutcome::Skipped | CheckOutcome::Unauthorized => {
                state.phase = LivenessPhase::Idle;
                None
            }
        };

        if next.is_none() {
            state.cancel = None;
        }
        Some(next)
    }
}

async fn run_loop(
    inner: Arc<SchedulerInner>,
    generation: u64,
    cancel: CancellationToken,
    listener: SharedListener,
) {
    let mut delay = inner.config.initial_delay;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                trace!(generation = generation, "Liveness timer cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let outcome = inner.check().await;

        let Some(next) = inner.settle(generation, outcome) else {
            return;
        };

        match outcome {
            CheckOutcome::Inactive => {
                info!("Account inactive, liveness polling halted");
                listener.on_inactive();
            }
            CheckOutcome::Failed(failure) => {
                warn!(kind = %failure, "Liveness polling halted on error");
                listener.on_error(failure);
            }
            _ => {}
        }

        match next {
            Some(interval) => {
                trace!(interval_ms = interval.as_millis() as u64, "Next liveness check scheduled");
                delay = interval;
            }
            None => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;
    use crate::oracle::tests::token_expiring_at;
    use crate::store::{CredentialStore, MemoryStore, SessionField};
    use chrono::{TimeDelta, Utc};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted answers, then repeats the last one.
    struct ScriptedChecker {
        answers: Mutex<VecDeque<Result<bool, StatusError>>>,
        last: Mutex<Result<bool, StatusError>>,
        latency: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedChecker {
        fn new(answers: Vec<Result<bool, StatusError>>) -> Arc<Self> {
            Self::with_latency(answers, Duration::ZERO)
        }

        fn with_latency(answers: Vec<Result<bool, StatusError>>, latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                last: Mutex::new(answers.last().cloned().unwrap_or(Ok(true))),
                answers: Mutex::new(answers.into()),
                latency,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StatusChecker for ScriptedChecker {
        async fn is_account_active(&self, _token: &str) -> Result<bool, StatusError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let next = self.answers.lock().pop_front();
            next.unwrap_or_else(|| self.last.lock().clone())
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        inactive: AtomicUsize,
        errors: Mutex<Vec<CheckFailure>>,
    }

    impl LivenessListener for RecordingListener {
        fn on_inactive(&self) {
            self.inactive.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, failure: CheckFailure) {
            self.errors.lock().push(failure);
        }
    }

    fn server_error() -> StatusError {
        StatusError::Failed {
            kind: CheckFailure::ServerError(500),
            message: "HTTP 500".to_string(),
        }
    }

    fn scheduler_with(checker: Arc<ScriptedChecker>, store: Arc<MemoryStore>) -> LivenessScheduler {
        let oracle = ExpiryOracle::new(Arc::new(MonotonicClock::new()));
        LivenessScheduler::new(checker, store, oracle, LivenessConfig::default())
    }

    fn valid_store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_token(&token_expiring_at(
            Utc::now() + TimeDelta::hours(8),
        )))
    }

    #[test]
    fn test_tiered_intervals() {
        let config = LivenessConfig::default();
        assert_eq!(config.interval_for(Duration::ZERO), Duration::from_secs(5));
        assert_eq!(config.interval_for(Duration::from_secs(119)), Duration::from_secs(5));
        assert_eq!(config.interval_for(Duration::from_secs(120)), Duration::from_secs(15));
        assert_eq!(config.interval_for(Duration::from_secs(599)), Duration::from_secs(15));
        assert_eq!(config.interval_for(Duration::from_secs(600)), Duration::from_secs(30));
        assert_eq!(config.interval_for(Duration::from_secs(7200)), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_initial_check_makes_no_calls() {
        let checker = ScriptedChecker::new(vec![Ok(true)]);
        let scheduler = scheduler_with(Arc::clone(&checker), valid_store());
        let listener = Arc::new(RecordingListener::default());

        scheduler.start(listener.clone());
        assert_eq!(scheduler.phase(), LivenessPhase::Starting);
        scheduler.stop();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(checker.calls(), 0);
        assert_eq!(scheduler.phase(), LivenessPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_on_first_check_fires_once() {
        let checker = ScriptedChecker::new(vec![Ok(false)]);
        let scheduler = scheduler_with(Arc::clone(&checker), valid_store());
        let listener = Arc::new(RecordingListener::default());

        scheduler.start(listener.clone());
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(checker.calls(), 1);
        assert_eq!(listener.inactive.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.phase(), LivenessPhase::StoppedByInactive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_halts_on_first_server_error() {
        let checker = ScriptedChecker::new(vec![Ok(true), Err(server_error()), Ok(true)]);
        let scheduler = scheduler_with(Arc::clone(&checker), valid_store());
        let listener = Arc::new(RecordingListener::default());

        scheduler.start(listener.clone());
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(checker.calls(), 2);
        assert_eq!(*listener.errors.lock(), vec![CheckFailure::ServerError(500)]);
        assert_eq!(listener.inactive.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.phase(), LivenessPhase::StoppedByError);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_is_not_an_error() {
        let checker = ScriptedChecker::new(vec![Err(StatusError::Unauthorized)]);
        let scheduler = scheduler_with(Arc::clone(&checker), valid_store());
        let listener = Arc::new(RecordingListener::default());

        scheduler.start(listener.clone());
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(checker.calls(), 1);
        assert!(listener.errors.lock().is_empty());
        assert_eq!(scheduler.phase(), LivenessPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_credential_skips_check() {
        let checker = ScriptedChecker::new(vec![Ok(true)]);
        let store = Arc::new(MemoryStore::with_token(&token_expiring_at(
            Utc::now() - TimeDelta::minutes(1),
        )));
        let scheduler = scheduler_with(Arc::clone(&checker), store);
        let listener = Arc::new(RecordingListener::default());

        scheduler.start(listener.clone());
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(checker.calls(), 0);
        assert!(listener.errors.lock().is_empty());
        assert_eq!(scheduler.phase(), LivenessPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cadence_follows_tiers() {
        let checker = ScriptedChecker::new(vec![Ok(true)]);
        let scheduler = scheduler_with(Arc::clone(&checker), valid_store());
        let listener = Arc::new(RecordingListener::default());

        scheduler.start(listener.clone());

        // Initial check at 0.5s, then every 5s: 5.5, 10.5, ... 115.5, 120.5
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(checker.calls(), 1);
        assert_eq!(scheduler.phase(), LivenessPhase::Running);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(checker.calls(), 3);

        // The check at 120.5s moves the loop to the 15s tier: 135.5, 150.5, ...
        tokio::time::sleep(Duration::from_millis(121_000 - 10_600)).await;
        assert_eq!(checker.calls(), 25);
        let at_two_minutes = checker.calls();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(checker.calls(), at_two_minutes + 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_checks_never_overlap() {
        let checker = ScriptedChecker::with_latency(vec![Ok(true)], Duration::from_secs(12));
        let scheduler = scheduler_with(Arc::clone(&checker), valid_store());
        let listener = Arc::new(RecordingListener::default());

        scheduler.start(listener.clone());

        // Each cycle takes 12s of latency plus a 5s interval.
        tokio::time::sleep(Duration::from_millis(500 + 12_000 + 5_000 + 1_000)).await;
        assert_eq!(checker.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_result_is_discarded() {
        let checker = ScriptedChecker::with_latency(vec![Ok(false)], Duration::from_secs(2));
        let scheduler = scheduler_with(Arc::clone(&checker), valid_store());
        let listener = Arc::new(RecordingListener::default());

        scheduler.start(listener.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(checker.calls(), 1);

        scheduler.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(listener.inactive.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.phase(), LivenessPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_session_clock() {
        let checker = ScriptedChecker::new(vec![Ok(true)]);
        let scheduler = scheduler_with(Arc::clone(&checker), valid_store());
        let listener = Arc::new(RecordingListener::default());

        scheduler.start(listener.clone());
        tokio::time::sleep(Duration::from_secs(700)).await;

        scheduler.start(listener.clone());
        let before = checker.calls();
        tokio::time::sleep(Duration::from_millis(10_600)).await;

        // Back in the 5s tier: initial check plus two more.
        assert_eq!(checker.calls(), before + 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_express_check() {
        let listener = RecordingListener::default();

        let active = scheduler_with(ScriptedChecker::new(vec![Ok(true)]), valid_store());
        assert_eq!(active.express_check(&listener).await, Some(true));

        let inactive = scheduler_with(ScriptedChecker::new(vec![Ok(false)]), valid_store());
        assert_eq!(inactive.express_check(&listener).await, Some(false));
        assert_eq!(listener.inactive.load(Ordering::SeqCst), 1);

        let failing = scheduler_with(ScriptedChecker::new(vec![Err(server_error())]), valid_store());
        assert_eq!(failing.express_check(&listener).await, None);
        assert_eq!(listener.errors.lock().len(), 1);

        let store = valid_store();
        store.remove(SessionField::Token).unwrap();
        let checker = ScriptedChecker::new(vec![Ok(true)]);
        let logged_out = scheduler_with(Arc::clone(&checker), store);
        assert_eq!(logged_out.express_check(&listener).await, None);
        assert_eq!(checker.calls(), 0);

        // Express checks never start the loop.
        assert_eq!(active.phase(), LivenessPhase::Idle);
    }
}
