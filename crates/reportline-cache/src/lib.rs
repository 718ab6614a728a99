//! Single-flight request coordination with a short-lived result cache.
//!
//! This crate provides a deduplication layer for idempotent reads:
//! - At most one in-flight producer call per logical key
//! - Concurrent callers share the outcome of that call
//! - Successful results are served from memory for a fixed TTL
//! - A short debounce window coalesces near-simultaneous callers
//!
//! # Example
//!
//! ```rust,ignore
//! use reportline_cache::{CoordinatorConfig, RequestCoordinator};
//!
//! let coordinator = RequestCoordinator::new(CoordinatorConfig::default());
//! let devices = coordinator
//!     .execute("devices?page=1", move || async move { api.list_devices(1).await })
//!     .await?;
//! ```

mod config;
mod coordinator;
mod error;

pub use config::CoordinatorConfig;
pub use coordinator::{CacheEntry, CoordinatorStats, RequestCoordinator};
pub use error::{Error, Result};
