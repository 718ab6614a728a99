//! Token expiry interpretation.
//!
//! Session tokens are JWT-shaped (`header.payload.signature`). Only the
//! payload is read; the signature is the backend's concern. Anything that
//! cannot be decoded is treated as expired.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::clock::{SharedClock, SystemClock};
use crate::error::DecodeError;

/// Label returned by [`ExpiryOracle::format_remaining`] at or past expiry.
pub const EXPIRED_LABEL: &str = "Expired";

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionClaims {
    /// Account identifier.
    #[serde(
        default,
        rename = "sub",
        alias = "id",
        alias = "subjectId",
        deserialize_with = "opt_string_or_number"
    )]
    pub subject_id: Option<String>,

    /// Account role.
    #[serde(default)]
    pub role: Option<String>,

    /// Policy the account is bound to, if any.
    #[serde(
        default,
        alias = "policyId",
        deserialize_with = "opt_string_or_number"
    )]
    pub policy_id: Option<String>,

    /// When the token was issued.
    #[serde(default, rename = "iat", deserialize_with = "opt_numeric_date")]
    pub issued_at: Option<DateTime<Utc>>,

    /// When the token stops being valid.
    #[serde(rename = "exp", deserialize_with = "numeric_date")]
    pub expires_at: DateTime<Utc>,
}

/// Decode the claims of a session token without verifying its signature.
pub fn decode_claims(token: &str) -> Result<SessionClaims, DecodeError> {
    let mut segments = token.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(DecodeError::Malformed);
    };

    if payload.is_empty() {
        return Err(DecodeError::Malformed);
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Answers temporal-validity questions about session tokens.
///
/// Holds no state besides its clock. Every query fails closed: a token that
/// cannot be decoded is reported as expired with no time remaining.
#[derive(Debug, Clone)]
pub struct ExpiryOracle {
    clock: SharedClock,
}

impl ExpiryOracle {
    /// Create an oracle reading the given clock.
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    /// Create an oracle reading the system clock.
    pub fn system() -> Self {
        Self::new(std::sync::Arc::new(SystemClock))
    }

    /// Current time according to the oracle's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Absolute expiry of `token`, if it can be decoded.
    pub fn expires_at(&self, token: &str) -> Option<DateTime<Utc>> {
        match decode_claims(token) {
            Ok(claims) => Some(claims.expires_at),
            Err(e) => {
                tracing::debug!(error = %e, "Undecodable session token");
                None
            }
        }
    }

    /// Whether `token` is expired (or undecodable).
    pub fn is_expired(&self, token: &str) -> bool {
        match self.expires_at(token) {
            Some(expires_at) => self.now() >= expires_at,
            None => true,
        }
    }

    /// Time left before `token` expires; zero when expired or undecodable.
    pub fn time_remaining(&self, token: &str) -> Duration {
        self.expires_at(token)
            .and_then(|expires_at| (expires_at - self.now()).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Human-readable remaining lifetime, e.g. `"1d 4h 12m"` or `"35m"`.
    pub fn format_remaining(&self, token: &str) -> String {
        let remaining = self.time_remaining(token);
        if remaining.is_zero() {
            return EXPIRED_LABEL.to_string();
        }

        let total_minutes = remaining.as_secs() / 60;
        let days = total_minutes / (24 * 60);
        let hours = (total_minutes % (24 * 60)) / 60;
        let minutes = total_minutes % 60;

        if days > 0 {
            format!("{}d {}h {}m", days, hours, minutes)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes)
        } else if minutes > 0 {
            format!("{}m", minutes)
        } else {
            "<1m".to_string()
        }
    }
}

impl Default for ExpiryOracle {
    fn default() -> Self {
        Self::system()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Claim deserializers
// ─────────────────────────────────────────────────────────────────────────────

/// JWT NumericDate: seconds since the epoch, possibly fractional.
fn numeric_date<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    seconds_to_datetime(secs).ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
}

fn opt_numeric_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f64>::deserialize(deserializer)? {
        Some(secs) => seconds_to_datetime(secs)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range")),
        None => Ok(None),
    }
}

fn seconds_to_datetime(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}
