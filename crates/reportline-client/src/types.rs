//! Request and response types for the backend API.

use serde::{Deserialize, Serialize};

/// Response of `GET <auth>/verify-status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyStatusResponse {
    /// Whether the account behind the credential is still active.
    pub is_active: bool,
}

/// Login request body.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// Login response.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    /// Signed session token.
    pub token: String,
    /// Display name of the account, when the backend provides one.
    #[serde(default, alias = "displayName")]
    pub name: Option<String>,
}

