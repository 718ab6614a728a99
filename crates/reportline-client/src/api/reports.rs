//! Reports API.

use crate::client::ApiClient;
use crate::error::Result;

/// Reports API client.
///
/// Only the session-cleanup endpoints live here; report generation is driven
/// by other parts of the application.
pub struct ReportsApi {
    client: ApiClient,
}

impl ReportsApi {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Remove the temporary files of an active session.
    pub async fn cleanup_user_files(&self, token: &str) -> Result<()> {
        let url = self.client.reports_url("cleanup-user-files")?;
        self.client.delete(url, token).await
    }

    /// Remove the temporary files of a session that is ending.
    ///
    /// The backend accepts an already-expired credential for this call.
    pub async fn cleanup_logout_files(&self, token: &str) -> Result<()> {
        let url = self.client.reports_url("cleanup-logout-files")?;
        self.client.delete(url, token).await
    }
}
