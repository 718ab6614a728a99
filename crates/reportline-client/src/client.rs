//! Main client implementation.

use std::sync::Arc;
use std::time::Duration;

use reportline_cache::{CoordinatorConfig, RequestCoordinator};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::debug;
use url::Url;

use crate::api::{AuthApi, ReportsApi};
use crate::error::{Error, ErrorResponse, Result};

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default path prefix of the auth endpoints.
pub const DEFAULT_AUTH_PATH: &str = "api/auth";

/// Default path prefix of the reports endpoints.
pub const DEFAULT_REPORTS_PATH: &str = "api/reports";

/// Reportline API client.
///
/// Cheap to clone; clones share the HTTP connection pool and the read
/// coordinator.
///
/// # Example
///
/// ```no_run
/// use reportline_client::ApiClient;
///
/// # async fn example() -> reportline_client::Result<()> {
/// let client = ApiClient::builder()
///     .base_url("http://localhost:8080")
///     .build()?;
///
/// let devices: serde_json::Value = client.cached_get("api/devices", "token").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    /// Inner shared state.
    inner: Arc<ClientInner>,
}

/// Inner client state (shared across clones).
pub(crate) struct ClientInner {
    /// HTTP client.
    pub(crate) http: reqwest::Client,
    /// Base URL for API requests.
    pub(crate) base_url: Url,
    /// Path prefix of the auth endpoints.
    pub(crate) auth_path: String,
    /// Path prefix of the reports endpoints.
    pub(crate) reports_path: String,
    /// Request timeout.
    pub(crate) timeout: Duration,
    /// Single-flight cache for idempotent reads.
    pub(crate) reads: RequestCoordinator<serde_json::Value>,
}

impl ApiClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Access the auth API.
    pub fn auth(&self) -> AuthApi {
        AuthApi::new(self.clone())
    }

    /// Access the reports API.
    pub fn reports(&self) -> ReportsApi {
        ReportsApi::new(self.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Coordinated reads
    // ─────────────────────────────────────────────────────────────────────────

    /// GET `path` through the read coordinator.
    ///
    /// Concurrent calls for the same URL share one network request, and a
    /// successful response is reused for the coordinator's TTL.
    pub async fn cached_get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token: &str,
    ) -> Result<T> {
        let url = self.url(path)?;
        let client = self.clone();
        let token = token.to_string();
        let producer_url = url.clone();

        let value = self
            .inner
            .reads
            .execute(url.as_str(), move || async move {
                client.get::<serde_json::Value>(producer_url, &token).await
            })
            .await?;

        Ok(serde_json::from_value(value)?)
    }

    /// Drop one coordinated read from the cache, or all of them.
    pub fn clear_cache(&self, path: Option<&str>) -> Result<()> {
        match path {
            Some(path) => {
                let url = self.url(path)?;
                self.inner.reads.clear(Some(url.as_str()));
            }
            None => self.inner.reads.clear(None),
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal HTTP methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Build a URL for a path relative to the base URL.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        let path = path.trim_start_matches('/');
        self.inner.base_url.join(path).map_err(Error::from)
    }

    /// Build a URL for an auth endpoint.
    pub(crate) fn auth_url(&self, endpoint: &str) -> Result<Url> {
        self.url(&format!("{}/{}", self.inner.auth_path, endpoint))
    }

    /// Build a URL for a reports endpoint.
    pub(crate) fn reports_url(&self, endpoint: &str) -> Result<Url> {
        self.url(&format!("{}/{}", self.inner.reports_path, endpoint))
    }

    /// Make an authenticated GET request.
    pub(crate) async fn get<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        token: &str,
    ) -> Result<T> {
        debug!(url = %url, "GET");
        let response = self
            .inner
            .http
            .get(url)
            .bearer_auth(token)
            .timeout(self.inner.timeout)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Make a POST request, optionally authenticated.
    pub(crate) async fn post<T, B>(&self, url: Url, body: &B, token: Option<&str>) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        debug!(url = %url, "POST");
        let mut request = self
            .inner
            .http
            .post(url)
            .json(body)
            .timeout(self.inner.timeout);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Make an authenticated DELETE request.
    pub(crate) async fn delete(&self, url: Url, token: &str) -> Result<()> {
        debug!(url = %url, "DELETE");
        let response = self
            .inner
            .http
            .delete(url)
            .bearer_auth(token)
            .timeout(self.inner.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.extract_error(response).await);
        }

        Ok(())
    }

    /// Handle a response, extracting the body or error.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(self.extract_error(response).await)
        }
    }

    /// Extract an error from a failed response.
    async fn extract_error(&self, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();

        let message = match response.json::<ErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => format!("HTTP {}", status),
        };

        match status {
            401 => Error::Auth(message),
            404 => Error::NotFound(message),
            _ => Error::Api { status, message },
        }
    }
}

/// Builder for creating an [`ApiClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: Option<String>,
    auth_path: String,
    reports_path: String,
    timeout: Duration,
    user_agent: Option<String>,
    coordination: CoordinatorConfig,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            base_url: None,
            auth_path: DEFAULT_AUTH_PATH.to_string(),
            reports_path: DEFAULT_REPORTS_PATH.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
            coordination: CoordinatorConfig::default(),
        }
    }

    /// Set the base URL for the server.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the path prefix of the auth endpoints.
    pub fn auth_path(mut self, path: impl Into<String>) -> Self {
        self.auth_path = path.into().trim_matches('/').to_string();
        self
    }

    /// Set the path prefix of the reports endpoints.
    pub fn reports_path(mut self, path: impl Into<String>) -> Self {
        self.reports_path = path.into().trim_matches('/').to_string();
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Configure the read coordinator used by [`ApiClient::cached_get`].
    pub fn request_coordination(mut self, config: CoordinatorConfig) -> Self {
        self.coordination = config;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ApiClient> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Config("base_url is required".to_string()))?;

        // Parse and normalize base URL
        let mut base_url = Url::parse(&base_url)?;
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("reportline-client/{}", env!("CARGO_PKG_VERSION")));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .build()?;

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                auth_path: self.auth_path,
                reports_path: self.reports_path,
                timeout: self.timeout,
                reads: RequestCoordinator::new(self.coordination),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_base_url() {
        let result = ClientBuilder::new().build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_normalizes_trailing_slash() {
        let client = ClientBuilder::new()
            .base_url("http://localhost:8080/backend")
            .build()
            .unwrap();

        assert_eq!(client.base_url().as_str(), "http://localhost:8080/backend/");
    }

    #[test]
    fn test_endpoint_urls() {
        let client = ClientBuilder::new()
            .base_url("http://localhost:8080")
            .auth_path("/v2/auth/")
            .build()
            .unwrap();

        let url = client.auth_url("verify-status").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/v2/auth/verify-status");

        let url = client.reports_url("cleanup-logout-files").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/reports/cleanup-logout-files"
        );
    }
}
