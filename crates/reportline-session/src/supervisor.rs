//! Session supervision.
//!
//! [`SessionSupervisor`] wires the expiry oracle, the liveness scheduler and
//! the teardown procedure to their triggers:
//!
//! - a fixed-interval expiry poll over the stored credential
//! - account deactivation reported by the liveness scheduler
//! - visibility changes and host unload
//!
//! Either detector ends the session through one guarded path, so a double
//! trigger produces a single teardown and a single [`SessionEvent`].

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::liveness::{CheckFailure, LivenessConfig, LivenessListener, LivenessScheduler, StatusChecker};
use crate::oracle::{ExpiryOracle, SessionClaims, decode_claims};
use crate::store::{SharedStore, write_session};
use crate::teardown::{FileCleaner, Navigator, SessionTeardown, TeardownOutcome};

/// Capacity of the event channel; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 16;

/// Supervisor settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Liveness scheduler settings.
    pub liveness: LivenessConfig,
    /// Interval of the local expiry poll.
    pub expiry_poll_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            liveness: LivenessConfig::default(),
            expiry_poll_interval: Duration::from_secs(1),
        }
    }
}

/// Why a session was ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    /// The credential passed its expiry instant.
    TokenExpired,
    /// The backend reported the account inactive.
    AccountDeactivated,
}

impl ExpiryReason {
    fn event(self) -> SessionEvent {
        match self {
            ExpiryReason::TokenExpired => SessionEvent::TokenExpired,
            ExpiryReason::AccountDeactivated => SessionEvent::AccountDeactivated,
        }
    }
}

/// Notifications for the embedding UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The credential expired; show the expiry modal.
    TokenExpired,
    /// The account was deactivated; show the expiry modal.
    AccountDeactivated,
    /// A liveness check failed. The session stays up.
    LivenessFailed { kind: CheckFailure },
    /// Teardown after an ended session has finished.
    CleanupFinished { outcome: TeardownOutcome },
}

/// The blocking modal shown once a session has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExpiryModal {
    pub reason: ExpiryReason,
    /// Server cleanup is still running; acknowledgement will wait for it.
    pub cleanup_in_flight: bool,
}

impl ExpiryModal {
    /// The modal can only be left through [`SessionSupervisor::acknowledge`].
    pub fn is_dismissible(&self) -> bool {
        false
    }
}

#[derive(Default)]
struct SupervisorState {
    ended: Option<ExpiryReason>,
    cleanup_in_flight: bool,
    expiry_poll: Option<CancellationToken>,
}

struct SupervisorInner {
    store: SharedStore,
    oracle: ExpiryOracle,
    scheduler: LivenessScheduler,
    teardown: SessionTeardown,
    config: SupervisorConfig,
    events: broadcast::Sender<SessionEvent>,
    state: Mutex<SupervisorState>,
    /// `true` while no cleanup is running.
    cleanup_idle: watch::Sender<bool>,
}

/// Composition root of the session layer.
///
/// Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct SessionSupervisor {
    inner: Arc<SupervisorInner>,
}

impl SessionSupervisor {
    /// Create a stopped supervisor.
    pub fn new(
        store: SharedStore,
        checker: Arc<dyn StatusChecker>,
        cleaner: Arc<dyn FileCleaner>,
        oracle: ExpiryOracle,
        config: SupervisorConfig,
    ) -> Self {
        let scheduler = LivenessScheduler::new(
            checker,
            Arc::clone(&store),
            oracle.clone(),
            config.liveness.clone(),
        );
        let teardown = SessionTeardown::new(Arc::clone(&store), cleaner, oracle.clone());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (cleanup_idle, _) = watch::channel(true);

        Self {
            inner: Arc::new(SupervisorInner {
                store,
                oracle,
                scheduler,
                teardown,
                config,
                events,
                state: Mutex::new(SupervisorState::default()),
                cleanup_idle,
            }),
        }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Get the liveness scheduler.
    pub fn scheduler(&self) -> &LivenessScheduler {
        &self.inner.scheduler
    }

    /// Get the teardown procedure.
    pub fn teardown(&self) -> &SessionTeardown {
        &self.inner.teardown
    }

    /// Persist a freshly issued token and its claims.
    ///
    /// Does not start supervision; call [`start`](Self::start) afterwards.
    pub fn begin_session(
        &self,
        token: &str,
        display_name: Option<&str>,
    ) -> Result<SessionClaims, SessionError> {
        let claims = decode_claims(token)?;
        if self.inner.oracle.now() >= claims.expires_at {
            return Err(SessionError::Expired);
        }
        write_session(self.inner.store.as_ref(), token, &claims, display_name)?;
        info!(subject_id = ?claims.subject_id, "Session started");
        Ok(claims)
    }

    /// Start the expiry poll and the liveness scheduler.
    ///
    /// Restarting re-arms the first-trigger guard for the new session.
    pub fn start(&self) {
        let cancel = {
            let mut state = self.inner.state.lock();
            if state.cleanup_in_flight {
                warn!("Session cleanup still in flight, not restarting supervision");
                return;
            }
            state.ended = None;
            if let Some(previous) = state.expiry_poll.take() {
                previous.cancel();
            }
            let cancel = CancellationToken::new();
            state.expiry_poll = Some(cancel.clone());
            cancel
        };

        spawn_expiry_poll(&self.inner, cancel);
        self.inner.scheduler.start(Arc::new(SupervisorListener {
            inner: Arc::downgrade(&self.inner),
        }));
        debug!(
            poll_ms = self.inner.config.expiry_poll_interval.as_millis() as u64,
            "Session supervision started"
        );
    }

    /// Stop both detectors without ending the session.
    pub fn stop(&self) {
        self.inner.stop_detectors();
    }

    /// End the session for `reason`.
    ///
    /// Only the first call after [`start`](Self::start) acts; later calls
    /// return `false` without side effects.
    pub async fn end_session(&self, reason: ExpiryReason) -> bool {
        self.inner.end_session(reason).await
    }

    /// The expiry modal to show, if the session has ended.
    pub fn expiry_modal(&self) -> Option<ExpiryModal> {
        let state = self.inner.state.lock();
        state.ended.map(|reason| ExpiryModal {
            reason,
            cleanup_in_flight: state.cleanup_in_flight,
        })
    }

    /// Acknowledge the expiry modal.
    ///
    /// Waits for the running cleanup to finish, then navigates to login.
    /// Returns `false` and does nothing when no session has ended.
    pub async fn acknowledge(&self, navigator: &dyn Navigator) -> bool {
        if self.inner.state.lock().ended.is_none() {
            return false;
        }

        let mut idle = self.inner.cleanup_idle.subscribe();
        if idle.wait_for(|idle| *idle).await.is_err() {
            warn!("Cleanup status channel closed");
        }

        navigator.to_login();
        true
    }

    /// Whether error alerts should be withheld.
    ///
    /// True when there is no credential or it is already expired; the
    /// expiry path owns those conditions.
    pub fn suppress_alerts(&self) -> bool {
        self.inner.credential_unusable()
    }

    /// React to the host UI becoming visible or hidden.
    ///
    /// On becoming visible, expiry is checked immediately and, if the
    /// credential is still usable, an express liveness check runs.
    pub async fn on_visibility_change(&self, visible: bool) {
        if !visible {
            return;
        }
        debug!("Host visible, re-checking session");

        if self.inner.check_expiry().await {
            return;
        }
        if self.inner.state.lock().ended.is_some() {
            return;
        }

        let listener = SupervisorListener {
            inner: Arc::downgrade(&self.inner),
        };
        self.inner.scheduler.express_check(&listener).await;
    }

    /// Best-effort teardown when the host is closing.
    pub async fn on_unload(&self) -> TeardownOutcome {
        self.inner.stop_detectors();
        self.inner.teardown.teardown().await
    }

    /// Explicit logout: stop supervision, tear down, navigate to login.
    pub async fn logout(&self, navigator: &dyn Navigator) -> TeardownOutcome {
        self.inner.stop_detectors();
        info!("Logging out");
        self.inner.teardown.teardown_with_redirect(navigator).await
    }
}

impl SupervisorInner {
    fn stop_detectors(&self) {
        if let Some(cancel) = self.state.lock().expiry_poll.take() {
            cancel.cancel();
        }
        self.scheduler.stop();
    }

    fn credential_unusable(&self) -> bool {
        match self.store.token() {
            Some(token) => self.oracle.is_expired(&token),
            None => true,
        }
    }

    /// End the session if the stored credential has expired.
    ///
    /// Returns `true` when this call ended the session.
    async fn check_expiry(&self) -> bool {
        let Some(token) = self.store.token() else {
            return false;
        };
        if !self.oracle.is_expired(&token) {
            return false;
        }
        self.end_session(ExpiryReason::TokenExpired).await
    }

    async fn end_session(&self, reason: ExpiryReason) -> bool {
        if !self.mark_ended(reason) {
            return false;
        }
        self.finish_cleanup().await;
        true
    }

    /// Apply the first-trigger guard and stop detection.
    ///
    /// Returns `false` if the session had already ended.
    fn mark_ended(&self, reason: ExpiryReason) -> bool {
        {
            let mut state = self.state.lock();
            if let Some(previous) = state.ended {
                debug!(?reason, ?previous, "Session already ended, ignoring trigger");
                return false;
            }
            state.ended = Some(reason);
            state.cleanup_in_flight = true;
            self.cleanup_idle.send_replace(false);
            if let Some(cancel) = state.expiry_poll.take() {
                cancel.cancel();
            }
        }

        self.scheduler.stop();
        info!(?reason, "Session ended");
        // No subscribers is fine; the modal state is still queryable.
        let _ = self.events.send(reason.event());
        true
    }

    async fn finish_cleanup(&self) {
        let outcome = self.teardown.teardown().await;

        self.state.lock().cleanup_in_flight = false;
        self.cleanup_idle.send_replace(true);
        let _ = self.events.send(SessionEvent::CleanupFinished { outcome });
    }
}

fn spawn_expiry_poll(inner: &Arc<SupervisorInner>, cancel: CancellationToken) {
    let period = inner.config.expiry_poll_interval;
    let weak = Arc::downgrade(inner);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.check_expiry().await {
                return;
            }
        }
    });
}

/// Routes scheduler callbacks back into the supervisor.
struct SupervisorListener {
    inner: Weak<SupervisorInner>,
}

impl LivenessListener for SupervisorListener {
    fn on_inactive(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if inner.mark_ended(ExpiryReason::AccountDeactivated) {
            tokio::spawn(async move { inner.finish_cleanup().await });
        }
    }

    fn on_error(&self, failure: CheckFailure) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let _ = inner
            .events
            .send(SessionEvent::LivenessFailed { kind: failure });
    }
}
