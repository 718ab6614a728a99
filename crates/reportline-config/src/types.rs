//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [server]      # backend connection
//! [cache]       # read coordination
//! [liveness]    # account-status polling
//! [expiry]      # local expiry poll
//! [storage]     # session file location
//! ```

use std::path::PathBuf;
use std::time::Duration;

use reportline_cache::CoordinatorConfig;
use reportline_client::ClientBuilder;
use reportline_session::{LivenessConfig, SupervisorConfig};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportlineConfig {
    /// Backend connection.
    pub server: Option<ServerConfig>,

    /// Read coordination.
    pub cache: Option<CacheConfig>,

    /// Account-status polling.
    pub liveness: Option<LivenessSection>,

    /// Local expiry poll.
    pub expiry: Option<ExpiryConfig>,

    /// Session storage.
    pub storage: Option<StorageConfig>,
}

impl ReportlineConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole, not merged field by field.
    pub fn merge(&mut self, other: ReportlineConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }

        if other.cache.is_some() {
            self.cache = other.cache;
        }

        if other.liveness.is_some() {
            self.liveness = other.liveness;
        }

        if other.expiry.is_some() {
            self.expiry = other.expiry;
        }

        if other.storage.is_some() {
            self.storage = other.storage;
        }
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if let Some(cache) = &self.cache
            && cache.max_entries == 0
        {
            return Err(invalid("cache.max_entries", "must be at least 1"));
        }

        if let Some(expiry) = &self.expiry
            && expiry.poll_interval_ms == 0
        {
            return Err(invalid("expiry.poll_interval_ms", "must be positive"));
        }

        if let Some(liveness) = &self.liveness {
            let intervals = [
                ("liveness.early_interval_secs", liveness.early_interval_secs),
                ("liveness.mid_interval_secs", liveness.mid_interval_secs),
                ("liveness.late_interval_secs", liveness.late_interval_secs),
            ];
            for (field, value) in intervals {
                if value == 0 {
                    return Err(invalid(field, "must be positive"));
                }
            }
            if liveness.mid_window_secs < liveness.early_window_secs {
                return Err(invalid(
                    "liveness.mid_window_secs",
                    "must not be shorter than early_window_secs",
                ));
            }
        }

        if let Some(server) = &self.server
            && server.timeout_secs == 0
        {
            return Err(invalid("server.timeout_secs", "must be positive"));
        }

        Ok(())
    }

    /// Effective server settings.
    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    /// Client builder for the configured backend and read coordination.
    pub fn client_builder(&self) -> ClientBuilder {
        let server = self.server();
        ClientBuilder::new()
            .base_url(server.base_url)
            .auth_path(server.auth_path)
            .reports_path(server.reports_path)
            .timeout(Duration::from_secs(server.timeout_secs))
            .request_coordination(self.cache.clone().unwrap_or_default().into())
    }

    /// Supervisor settings from the `[liveness]` and `[expiry]` sections.
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            liveness: self.liveness.clone().unwrap_or_default().into(),
            expiry_poll_interval: Duration::from_millis(
                self.expiry.clone().unwrap_or_default().poll_interval_ms,
            ),
        }
    }

    /// Explicit session file path, if configured.
    pub fn session_path(&self) -> Option<PathBuf> {
        self.storage.as_ref().and_then(|s| s.path.clone())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the backend.
    pub base_url: String,
    /// Path prefix of the auth endpoints.
    pub auth_path: String,
    /// Path prefix of the reports endpoints.
    pub reports_path: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            auth_path: reportline_client::client::DEFAULT_AUTH_PATH.to_string(),
            reports_path: reportline_client::client::DEFAULT_REPORTS_PATH.to_string(),
            timeout_secs: 30,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cache Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Read coordination settings.
///
/// ```toml
/// [cache]
/// ttl_ms = 5000
/// debounce_ms = 100
/// max_entries = 256
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// How long a successful read is reused, in milliseconds.
    pub ttl_ms: u64,
    /// Coalescing window before a read is sent, in milliseconds.
    pub debounce_ms: u64,
    /// Maximum number of cached reads.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let defaults = CoordinatorConfig::default();
        Self {
            ttl_ms: defaults.ttl.as_millis() as u64,
            debounce_ms: defaults.debounce.as_millis() as u64,
            max_entries: defaults.max_entries,
        }
    }
}

impl From<CacheConfig> for CoordinatorConfig {
    fn from(config: CacheConfig) -> Self {
        CoordinatorConfig::new()
            .with_ttl(Duration::from_millis(config.ttl_ms))
            .with_debounce(Duration::from_millis(config.debounce_ms))
            .with_max_entries(config.max_entries)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Liveness Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Account-status polling settings.
///
/// ```toml
/// [liveness]
/// initial_delay_ms = 500
/// early_interval_secs = 5     # session younger than early_window_secs
/// mid_interval_secs = 15      # session younger than mid_window_secs
/// late_interval_secs = 30
/// early_window_secs = 120
/// mid_window_secs = 600
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessSection {
    pub initial_delay_ms: u64,
    pub early_interval_secs: u64,
    pub mid_interval_secs: u64,
    pub late_interval_secs: u64,
    pub early_window_secs: u64,
    pub mid_window_secs: u64,
}

impl Default for LivenessSection {
    fn default() -> Self {
        let defaults = LivenessConfig::default();
        Self {
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            early_interval_secs: defaults.early_interval.as_secs(),
            mid_interval_secs: defaults.mid_interval.as_secs(),
            late_interval_secs: defaults.late_interval.as_secs(),
            early_window_secs: defaults.early_window.as_secs(),
            mid_window_secs: defaults.mid_window.as_secs(),
        }
    }
}

impl From<LivenessSection> for LivenessConfig {
    fn from(section: LivenessSection) -> Self {
        LivenessConfig {
            initial_delay: Duration::from_millis(section.initial_delay_ms),
            early_interval: Duration::from_secs(section.early_interval_secs),
            mid_interval: Duration::from_secs(section.mid_interval_secs),
            late_interval: Duration::from_secs(section.late_interval_secs),
            early_window: Duration::from_secs(section.early_window_secs),
            mid_window: Duration::from_secs(section.mid_window_secs),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Expiry / Storage Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Local expiry poll settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    /// Interval between expiry checks, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

/// Session storage settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Session file path. Defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = ReportlineConfig::from_toml(
            r#"
[server]
base_url = "https://reports.example.com"
timeout_secs = 10

[cache]
ttl_ms = 2000

[liveness]
early_interval_secs = 3
mid_window_secs = 900

[expiry]
poll_interval_ms = 250

[storage]
path = "/tmp/session.json"
"#,
        )
        .unwrap();

        let server = config.server();
        assert_eq!(server.base_url, "https://reports.example.com");
        assert_eq!(server.auth_path, "api/auth");
        assert_eq!(server.timeout_secs, 10);

        let cache: CoordinatorConfig = config.cache.clone().unwrap().into();
        assert_eq!(cache.ttl, Duration::from_secs(2));
        assert_eq!(cache.debounce, Duration::from_millis(100));
        assert_eq!(cache.max_entries, 256);

        let supervisor = config.supervisor_config();
        assert_eq!(supervisor.expiry_poll_interval, Duration::from_millis(250));
        assert_eq!(supervisor.liveness.early_interval, Duration::from_secs(3));
        assert_eq!(supervisor.liveness.mid_interval, Duration::from_secs(15));
        assert_eq!(supervisor.liveness.mid_window, Duration::from_secs(900));

        assert_eq!(config.session_path(), Some(PathBuf::from("/tmp/session.json")));
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ReportlineConfig::from_toml("").unwrap();
        assert_eq!(config, ReportlineConfig::new());

        let supervisor = config.supervisor_config();
        assert_eq!(supervisor.expiry_poll_interval, Duration::from_secs(1));
        assert_eq!(supervisor.liveness.initial_delay, Duration::from_millis(500));
        assert_eq!(supervisor.liveness.late_interval, Duration::from_secs(30));
        assert!(config.session_path().is_none());
        assert!(config.client_builder().build().is_ok());
    }

    #[test]
    fn test_merge_replaces_sections() {
        let mut base = ReportlineConfig::from_toml(
            r#"
[server]
base_url = "http://base:8080"

[cache]
ttl_ms = 1000
"#,
        )
        .unwrap();
        let overlay = ReportlineConfig::from_toml(
            r#"
[server]
base_url = "http://overlay:8080"
"#,
        )
        .unwrap();

        base.merge(overlay);
        assert_eq!(base.server().base_url, "http://overlay:8080");
        assert_eq!(base.cache.unwrap().ttl_ms, 1000);
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let config = ReportlineConfig::from_toml("[expiry]\npoll_interval_ms = 0\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "expiry.poll_interval_ms"
        ));

        let config = ReportlineConfig::from_toml("[liveness]\nmid_interval_secs = 0\n").unwrap();
        assert!(config.validate().is_err());

        let config = ReportlineConfig::from_toml(
            "[liveness]\nearly_window_secs = 600\nmid_window_secs = 120\n",
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = ReportlineConfig::from_toml("[cache]\nmax_entries = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_keeps_sections() {
        let mut config = ReportlineConfig::new();
        config.expiry = Some(ExpiryConfig {
            poll_interval_ms: 500,
        });

        let parsed = ReportlineConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
