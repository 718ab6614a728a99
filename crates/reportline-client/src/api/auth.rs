//! Auth API.

use crate::client::ApiClient;
use crate::error::Result;
use crate::types::{LoginRequest, LoginResponse, VerifyStatusResponse};

/// Auth API client.
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    pub(crate) fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Exchange account credentials for a session token.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        let url = self.client.auth_url("login")?;
        self.client.post(url, request, None).await
    }

    /// Ask whether the account behind `token` is still active.
    ///
    /// An expired or invalid credential yields [`Error::Auth`](crate::Error::Auth).
    pub async fn verify_status(&self, token: &str) -> Result<VerifyStatusResponse> {
        let url = self.client.auth_url("verify-status")?;
        self.client.get(url, token).await
    }
}
