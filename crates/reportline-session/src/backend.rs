//! Backend adapters over [`reportline_client::ApiClient`].

use async_trait::async_trait;
use reportline_client::{ApiClient, Error as ClientError};
use tracing::warn;

use crate::error::{CleanupError, StatusError};
use crate::liveness::{CheckFailure, StatusChecker};
use crate::teardown::FileCleaner;

/// Classify a client error for the liveness state machine.
pub fn classify(error: &ClientError) -> CheckFailure {
    match error {
        e if e.is_timeout() => CheckFailure::Timeout,
        ClientError::Http(e) if e.is_decode() => CheckFailure::UnexpectedResponse,
        ClientError::Http(_) => CheckFailure::Network,
        ClientError::Api { status, .. } if *status >= 500 => CheckFailure::ServerError(*status),
        _ => CheckFailure::UnexpectedResponse,
    }
}

#[async_trait]
impl StatusChecker for ApiClient {
    async fn is_account_active(&self, token: &str) -> Result<bool, StatusError> {
        match self.auth().verify_status(token).await {
            Ok(status) => Ok(status.is_active),
            Err(e) if e.is_auth_error() => Err(StatusError::Unauthorized),
            Err(e) => Err(StatusError::Failed {
                kind: classify(&e),
                message: e.to_string(),
            }),
        }
    }
}

fn cleanup_error(error: ClientError) -> CleanupError {
    if error.is_auth_error() {
        CleanupError::Unauthorized
    } else {
        CleanupError::Failed(error.to_string())
    }
}

#[async_trait]
impl FileCleaner for ApiClient {
    async fn cleanup_logout_files(&self, token: &str) -> Result<(), CleanupError> {
        self.reports()
            .cleanup_logout_files(token)
            .await
            .map_err(cleanup_error)
    }

    async fn cleanup_user_files(&self, token: &str) -> Result<(), CleanupError> {
        self.reports()
            .cleanup_user_files(token)
            .await
            .map_err(cleanup_error)
    }

    fn forget_cached_reads(&self) {
        if let Err(e) = self.clear_cache(None) {
            warn!(error = %e, "Failed to clear cached reads");
        }
    }
}
