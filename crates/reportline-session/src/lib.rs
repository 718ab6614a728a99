//! Session liveness, expiry detection and teardown for Reportline clients.
//!
//! The pieces, leaves first:
//!
//! - [`ExpiryOracle`]: reads the expiry instant out of a session token
//! - [`LivenessScheduler`]: tiered polling of the backend account status
//! - [`SessionTeardown`]: server file cleanup plus local state wipe
//! - [`SessionSupervisor`]: wires the above to expiry, visibility and
//!   unload triggers and exposes the expiry modal decision
//!
//! [`ApiClient`](reportline_client::ApiClient) implements both
//! [`StatusChecker`] and [`FileCleaner`], so a production supervisor is
//! built from one client:
//!
//! ```rust,ignore
//! let client = Arc::new(ApiClient::builder().base_url(url).build()?);
//! let supervisor = SessionSupervisor::new(
//!     Arc::new(FileStore::new(&data_dir)),
//!     client.clone(),
//!     client,
//!     ExpiryOracle::system(),
//!     SupervisorConfig::default(),
//! );
//! supervisor.start();
//! ```

mod backend;
pub mod clock;
pub mod error;
pub mod liveness;
pub mod oracle;
pub mod store;
pub mod supervisor;
pub mod teardown;

pub use backend::classify;
pub use clock::{Clock, MonotonicClock, SharedClock, SystemClock};
pub use error::{CleanupError, DecodeError, SessionError, StatusError, StoreError};
pub use liveness::{
    CheckFailure, LivenessConfig, LivenessListener, LivenessPhase, LivenessScheduler,
    SharedListener, StatusChecker,
};
pub use oracle::{EXPIRED_LABEL, ExpiryOracle, SessionClaims, decode_claims};
pub use store::{
    CredentialStore, FileStore, MemoryStore, SessionField, SharedStore, write_session,
};
pub use supervisor::{ExpiryModal, ExpiryReason, SessionEvent, SessionSupervisor, SupervisorConfig};
pub use teardown::{FileCleaner, FileCleanup, Navigator, SessionTeardown, TeardownOutcome};
