//! HTTP client for the Reportline maintenance-report backend.
//!
//! Covers the endpoints the session layer depends on:
//!
//! - **Auth**: login, account status verification
//! - **Reports**: server-side temporary file cleanup
//!
//! Every call takes the bearer credential explicitly; the client never caches
//! it, so callers always send the value currently held in session storage.
//!
//! # Example
//!
//! ```no_run
//! use reportline_client::{ApiClient, Result};
//!
//! # async fn example(token: &str) -> Result<()> {
//! let client = ApiClient::builder()
//!     .base_url("http://localhost:8080")
//!     .build()?;
//!
//! let status = client.auth().verify_status(token).await?;
//! println!("active: {}", status.is_active);
//!
//! client.reports().cleanup_logout_files(token).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod error;
pub mod types;

pub use client::{ApiClient, ClientBuilder};
pub use error::{Error, Result};
pub use types::*;
