//! Local session storage.
//!
//! The store is a string-valued key-value map, written only by the login
//! flow and by teardown. Readers go through it on every use instead of
//! holding a copy across an await.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StoreError;
use crate::oracle::SessionClaims;

/// Default session file name within the reportline data directory.
pub const SESSION_FILE: &str = "session.json";

/// A locally persisted session field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SessionField {
    /// The signed session token.
    Token,
    /// Account role.
    Role,
    /// Display name shown in the UI.
    DisplayName,
    /// Account identifier.
    SubjectId,
    /// Policy the account is bound to.
    PolicyId,
}

impl SessionField {
    /// Every field, in the order teardown clears them.
    pub const ALL: [SessionField; 5] = [
        SessionField::Token,
        SessionField::Role,
        SessionField::DisplayName,
        SessionField::SubjectId,
        SessionField::PolicyId,
    ];

    /// Storage key of this field.
    pub fn key(self) -> &'static str {
        match self {
            SessionField::Token => "token",
            SessionField::Role => "role",
            SessionField::DisplayName => "display_name",
            SessionField::SubjectId => "subject_id",
            SessionField::PolicyId => "policy_id",
        }
    }
}

impl fmt::Display for SessionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Key-value storage for session fields.
///
/// Removing an absent field is a no-op, so clearing is idempotent.
pub trait CredentialStore: Send + Sync + fmt::Debug {
    /// Read a field.
    fn get(&self, field: SessionField) -> Result<Option<String>, StoreError>;

    /// Write a field.
    fn set(&self, field: SessionField, value: &str) -> Result<(), StoreError>;

    /// Remove a field.
    fn remove(&self, field: SessionField) -> Result<(), StoreError>;

    /// Current session token. A storage failure reads as "no token".
    fn token(&self) -> Option<String> {
        match self.get(SessionField::Token) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session token");
                None
            }
        }
    }
}

/// Shared store handle.
pub type SharedStore = Arc<dyn CredentialStore>;

/// Persist a freshly issued session.
///
/// Fields not derivable from `claims` or `display_name` are removed so that
/// nothing from a previous session survives.
pub fn write_session(
    store: &dyn CredentialStore,
    token: &str,
    claims: &SessionClaims,
    display_name: Option<&str>,
) -> Result<(), StoreError> {
    let values = [
        (SessionField::Token, Some(token)),
        (SessionField::Role, claims.role.as_deref()),
        (SessionField::DisplayName, display_name),
        (SessionField::SubjectId, claims.subject_id.as_deref()),
        (SessionField::PolicyId, claims.policy_id.as_deref()),
    ];

    for (field, value) in values {
        match value {
            Some(value) => store.set(field, value)?,
            None => store.remove(field)?,
        }
    }

    tracing::debug!(subject_id = ?claims.subject_id, "Session written to storage");
    Ok(())
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory store, for tests and short-lived embeddings.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<SessionField, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding a token.
    pub fn with_token(token: &str) -> Self {
        let store = Self::new();
        store
            .values
            .lock()
            .insert(SessionField::Token, token.to_string());
        store
    }

    /// Number of fields currently stored.
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// Whether no field is stored.
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, field: SessionField) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().get(&field).cloned())
    }

    fn set(&self, field: SessionField, value: &str) -> Result<(), StoreError> {
        self.values.lock().insert(field, value.to_string());
        Ok(())
    }

    fn remove(&self, field: SessionField) -> Result<(), StoreError> {
        self.values.lock().remove(&field);
        Ok(())
    }
}

// ============================================================================
// FileStore
// ============================================================================

/// JSON-file-backed store for CLI sessions.
///
/// The whole file is rewritten on every change; a missing file is an empty
/// session.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Store the session in `data_dir/session.json`.
    pub fn new(data_dir: &Path) -> Self {
        Self::with_path(data_dir.join(SESSION_FILE))
    }

    /// Store the session at an explicit path.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    /// Get the session file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content)
            .map_err(|e| StoreError::Serialization(format!("Failed to parse session file: {}", e)))
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if values.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(self.io_error(e)),
            };
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_string_pretty(values).map_err(|e| {
            StoreError::Serialization(format!("Failed to serialize session: {}", e))
        })?;
        std::fs::write(&self.path, json).map_err(|e| self.io_error(e))
    }
}

impl CredentialStore for FileStore {
    fn get(&self, field: SessionField) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(field.key()))
    }

    fn set(&self, field: SessionField, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut values = self.read_all()?;
        values.insert(field.key().to_string(), value.to_string());
        self.write_all(&values)
    }

    fn remove(&self, field: SessionField) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut values = self.read_all()?;
        if values.remove(field.key()).is_none() {
            return Ok(());
        }
        self.write_all(&values)
    }
}
