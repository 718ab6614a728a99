//! Session teardown.
//!
//! Teardown revokes server-side temporary files on a best-effort basis and
//! then clears every local session field. The local wipe always runs; a
//! failed server call only produces a log line and a `Failed` status in the
//! outcome.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::CleanupError;
use crate::oracle::ExpiryOracle;
use crate::store::{SessionField, SharedStore};

/// Server-side cleanup of a session's temporary files.
#[async_trait]
pub trait FileCleaner: Send + Sync {
    /// Cleanup variant that accepts an expired credential.
    async fn cleanup_logout_files(&self, token: &str) -> Result<(), CleanupError>;

    /// Cleanup variant for a still-valid credential.
    async fn cleanup_user_files(&self, token: &str) -> Result<(), CleanupError>;

    /// Drop any responses cached on behalf of the ending session.
    ///
    /// Runs as part of the local wipe.
    fn forget_cached_reads(&self) {}
}

/// Performs the hard navigation to the unauthenticated entry point.
pub trait Navigator: Send + Sync {
    /// Leave the authenticated UI for the login view.
    fn to_login(&self);
}

/// What happened to the session's server-side files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCleanup {
    /// A cleanup call succeeded.
    Cleaned,
    /// There was no session to clean up.
    NotNeeded,
    /// Every attempted cleanup call failed.
    Failed,
}

/// Result of a teardown, for logging only.
///
/// Never gate navigation on this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TeardownOutcome {
    /// Server-side file status.
    pub file_cleanup: FileCleanup,
    /// Whether the local wipe ran. Always `true` once teardown returns.
    pub local_state_cleared: bool,
}

impl TeardownOutcome {
    /// Whether server-side files are gone (or there were none to remove).
    pub fn files_cleaned(&self) -> bool {
        matches!(self.file_cleanup, FileCleanup::Cleaned | FileCleanup::NotNeeded)
    }
}

/// Idempotent teardown of the current session.
pub struct SessionTeardown {
    store: SharedStore,
    cleaner: Arc<dyn FileCleaner>,
    oracle: ExpiryOracle,
    /// Serializes concurrent teardowns; the second one finds nothing to do.
    serial: tokio::sync::Mutex<()>,
}

impl SessionTeardown {
    /// Create a teardown procedure over `store` and `cleaner`.
    pub fn new(store: SharedStore, cleaner: Arc<dyn FileCleaner>, oracle: ExpiryOracle) -> Self {
        Self {
            store,
            cleaner,
            oracle,
            serial: tokio::sync::Mutex::new(()),
        }
    }

    /// Revoke server-side files, then wipe local session state.
    ///
    /// With no stored credential nothing is sent to the backend. When the
    /// primary cleanup call fails and the credential is still valid, the
    /// active-session endpoint is tried once; there are no other retries.
    ///
    /// The local wipe also runs if the cleaner panics or this future is
    /// dropped before the server call finishes.
    pub async fn teardown(&self) -> TeardownOutcome {
        let _serial = self.serial.lock().await;
        let wipe = LocalWipeGuard {
            store: &self.store,
            cleaner: self.cleaner.as_ref(),
        };

        let file_cleanup = match self.store.token() {
            Some(token) => self.revoke_files(&token).await,
            None => {
                debug!("No credential stored, session already torn down");
                FileCleanup::NotNeeded
            }
        };

        drop(wipe);

        let outcome = TeardownOutcome {
            file_cleanup,
            local_state_cleared: true,
        };
        info!(file_cleanup = ?outcome.file_cleanup, "Session torn down");
        outcome
    }

    /// Run [`teardown`](Self::teardown), then navigate to login.
    ///
    /// Navigation happens when this returns, unwinds, or is dropped midway.
    pub async fn teardown_with_redirect(&self, navigator: &dyn Navigator) -> TeardownOutcome {
        let _redirect = RedirectGuard { navigator };
        self.teardown().await
    }

    async fn revoke_files(&self, token: &str) -> FileCleanup {
        let primary = match self.cleaner.cleanup_logout_files(token).await {
            Ok(()) => return FileCleanup::Cleaned,
            Err(e) => e,
        };
        warn!(error = %primary, "Logout file cleanup failed");

        if matches!(primary, CleanupError::Unauthorized) || self.oracle.is_expired(token) {
            return FileCleanup::Failed;
        }

        match self.cleaner.cleanup_user_files(token).await {
            Ok(()) => {
                debug!("Fallback file cleanup succeeded");
                FileCleanup::Cleaned
            }
            Err(e) => {
                warn!(error = %e, "Fallback file cleanup failed");
                FileCleanup::Failed
            }
        }
    }
}

/// Clears every local session field and cached read when dropped.
struct LocalWipeGuard<'a> {
    store: &'a SharedStore,
    cleaner: &'a dyn FileCleaner,
}

impl Drop for LocalWipeGuard<'_> {
    fn drop(&mut self) {
        self.cleaner.forget_cached_reads();
        for field in SessionField::ALL {
            if let Err(e) = self.store.remove(field) {
                warn!(field = %field, error = %e, "Failed to clear session field");
            }
        }
    }
}

struct RedirectGuard<'a> {
    navigator: &'a dyn Navigator,
}

impl Drop for RedirectGuard<'_> {
    fn drop(&mut self) {
        self.navigator.to_login();
    }
}
