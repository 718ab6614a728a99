//! End-to-end supervision tests.
//!
//! Paused-time tests drive the supervisor with in-process collaborators;
//! the wiremock tests run a real `ApiClient` against a mock backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use reportline_client::ApiClient;
use reportline_session::{
    CleanupError, Clock, CredentialStore, ExpiryOracle, ExpiryReason, FileCleaner, FileCleanup,
    FileStore, LivenessConfig, MemoryStore, MonotonicClock, Navigator, SessionEvent,
    SessionSupervisor, StatusChecker, StatusError, SupervisorConfig,
};
use tokio::sync::broadcast;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn token_expiring_at(expires_at: DateTime<Utc>) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = serde_json::json!({
        "sub": 42,
        "role": "coordinator",
        "exp": expires_at.timestamp_millis() as f64 / 1000.0,
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

struct AlwaysActive;

#[async_trait]
impl StatusChecker for AlwaysActive {
    async fn is_account_active(&self, _token: &str) -> Result<bool, StatusError> {
        Ok(true)
    }
}

#[derive(Default)]
struct CountingCleaner {
    calls: AtomicUsize,
}

#[async_trait]
impl FileCleaner for CountingCleaner {
    async fn cleanup_logout_files(&self, _token: &str) -> Result<(), CleanupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn cleanup_user_files(&self, _token: &str) -> Result<(), CleanupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct CountingNavigator {
    redirects: AtomicUsize,
}

impl Navigator for CountingNavigator {
    fn to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

/// Wait until `events` yields an event matching `wanted`.
async fn wait_for_event(
    events: &mut broadcast::Receiver<SessionEvent>,
    wanted: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        liveness: LivenessConfig {
            initial_delay: Duration::from_millis(10),
            ..LivenessConfig::default()
        },
        expiry_poll_interval: Duration::from_secs(1),
    }
}

fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::builder()
        .base_url(server.uri())
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Paused-time tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_token_expiry_fires_exactly_once() {
    let clock = MonotonicClock::new();
    let token = token_expiring_at(clock.now() + TimeDelta::milliseconds(1500));
    let store = Arc::new(MemoryStore::with_token(&token));
    let cleaner = Arc::new(CountingCleaner::default());

    let supervisor = SessionSupervisor::new(
        store.clone(),
        Arc::new(AlwaysActive),
        cleaner.clone(),
        ExpiryOracle::new(Arc::new(clock)),
        SupervisorConfig::default(),
    );
    let mut events = supervisor.subscribe();
    supervisor.start();

    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert!(drain(&mut events).is_empty());
    assert!(supervisor.expiry_modal().is_none());

    tokio::time::sleep(Duration::from_secs(10)).await;
    let seen = drain(&mut events);
    assert_eq!(seen.len(), 2, "unexpected events: {seen:?}");
    assert_eq!(seen[0], SessionEvent::TokenExpired);
    assert!(matches!(seen[1], SessionEvent::CleanupFinished { .. }));

    let modal = supervisor.expiry_modal().unwrap();
    assert_eq!(modal.reason, ExpiryReason::TokenExpired);
    assert!(!modal.cleanup_in_flight);
    assert_eq!(cleaner.calls.load(Ordering::SeqCst), 1);
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_repeated_triggers_are_ignored() {
    let clock = MonotonicClock::new();
    let token = token_expiring_at(clock.now() + TimeDelta::milliseconds(1500));
    let cleaner = Arc::new(CountingCleaner::default());

    let supervisor = SessionSupervisor::new(
        Arc::new(MemoryStore::with_token(&token)),
        Arc::new(AlwaysActive),
        cleaner.clone(),
        ExpiryOracle::new(Arc::new(clock)),
        SupervisorConfig::default(),
    );
    let mut events = supervisor.subscribe();
    supervisor.start();
    tokio::time::sleep(Duration::from_secs(3)).await;

    supervisor.on_visibility_change(true).await;
    assert!(!supervisor.end_session(ExpiryReason::AccountDeactivated).await);
    tokio::time::sleep(Duration::from_secs(30)).await;

    let expiries = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::TokenExpired | SessionEvent::AccountDeactivated))
        .count();
    assert_eq!(expiries, 1);
    assert_eq!(cleaner.calls.load(Ordering::SeqCst), 1);

    let navigator = CountingNavigator::default();
    assert!(supervisor.acknowledge(&navigator).await);
    assert_eq!(navigator.redirects.load(Ordering::SeqCst), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock backend tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_deactivated_account_ends_session() {
    let server = MockServer::start().await;
    let token = token_expiring_at(Utc::now() + TimeDelta::hours(1));

    Mock::given(method("GET"))
        .and(path("/api/auth/verify-status"))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "isActive": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/reports/cleanup-logout-files"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(temp.path()));
    let client = Arc::new(client_for(&server));

    let supervisor = SessionSupervisor::new(
        store.clone(),
        client.clone(),
        client,
        ExpiryOracle::system(),
        fast_config(),
    );
    supervisor.begin_session(&token, Some("Ana")).unwrap();
    assert!(store.path().exists());

    let mut events = supervisor.subscribe();
    supervisor.start();

    let first = wait_for_event(&mut events, |_| true).await;
    assert_eq!(first, SessionEvent::AccountDeactivated);

    let finished = wait_for_event(&mut events, |e| {
        matches!(e, SessionEvent::CleanupFinished { .. })
    })
    .await;
    let SessionEvent::CleanupFinished { outcome } = finished else {
        unreachable!();
    };
    assert_eq!(outcome.file_cleanup, FileCleanup::Cleaned);
    assert!(!store.path().exists());

    let navigator = CountingNavigator::default();
    assert!(supervisor.acknowledge(&navigator).await);
    assert_eq!(navigator.redirects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_visibility_runs_express_check() {
    let server = MockServer::start().await;
    let token = token_expiring_at(Utc::now() + TimeDelta::hours(1));

    Mock::given(method("GET"))
        .and(path("/api/auth/verify-status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "isActive": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/reports/cleanup-logout-files"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_token(&token));
    let client = Arc::new(client_for(&server));
    let supervisor = SessionSupervisor::new(
        store.clone(),
        client.clone(),
        client,
        ExpiryOracle::system(),
        fast_config(),
    );

    supervisor.on_visibility_change(false).await;
    assert!(supervisor.expiry_modal().is_none());

    supervisor.on_visibility_change(true).await;
    assert_eq!(
        supervisor.expiry_modal().map(|m| m.reason),
        Some(ExpiryReason::AccountDeactivated)
    );

    let navigator = CountingNavigator::default();
    assert!(supervisor.acknowledge(&navigator).await);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_server_error_keeps_session() {
    let server = MockServer::start().await;
    let token = token_expiring_at(Utc::now() + TimeDelta::hours(1));

    Mock::given(method("GET"))
        .and(path("/api/auth/verify-status"))
        .respond_with(ResponseTemplate::new(502))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_token(&token));
    let client = Arc::new(client_for(&server));
    let supervisor = SessionSupervisor::new(
        store.clone(),
        client.clone(),
        client,
        ExpiryOracle::system(),
        fast_config(),
    );
    let mut events = supervisor.subscribe();
    supervisor.start();

    let event = wait_for_event(&mut events, |_| true).await;
    assert!(matches!(
        event,
        SessionEvent::LivenessFailed {
            kind: reportline_session::CheckFailure::ServerError(502)
        }
    ));
    assert!(supervisor.expiry_modal().is_none());
    assert_eq!(store.token(), Some(token));
    supervisor.stop();
}

#[tokio::test]
async fn test_logout_falls_back_to_active_cleanup() {
    let server = MockServer::start().await;
    let token = token_expiring_at(Utc::now() + TimeDelta::hours(1));

    Mock::given(method("DELETE"))
        .and(path("/api/reports/cleanup-logout-files"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "message": "storage offline"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/reports/cleanup-user-files"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_token(&token));
    let client = Arc::new(client_for(&server));
    let supervisor = SessionSupervisor::new(
        store.clone(),
        client.clone(),
        client,
        ExpiryOracle::system(),
        fast_config(),
    );

    let navigator = CountingNavigator::default();
    let outcome = supervisor.logout(&navigator).await;

    assert_eq!(outcome.file_cleanup, FileCleanup::Cleaned);
    assert!(outcome.local_state_cleared);
    assert_eq!(navigator.redirects.load(Ordering::SeqCst), 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_logout_drops_cached_reads() {
    let server = MockServer::start().await;
    let token = token_expiring_at(Utc::now() + TimeDelta::hours(1));

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{ "id": 1 }])))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/api/reports/cleanup-logout-files"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::with_token(&token));
    let client = Arc::new(client_for(&server));
    let supervisor = SessionSupervisor::new(
        store,
        client.clone(),
        client.clone(),
        ExpiryOracle::system(),
        fast_config(),
    );

    let _: serde_json::Value = client.cached_get("api/devices", &token).await.unwrap();
    supervisor.logout(&CountingNavigator::default()).await;

    let next_token = token_expiring_at(Utc::now() + TimeDelta::hours(2));
    let _: serde_json::Value = client.cached_get("api/devices", &next_token).await.unwrap();
}
