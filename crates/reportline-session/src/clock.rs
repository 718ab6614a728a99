//! Wall-clock sources.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock that advances with the tokio runtime clock.
///
/// Anchored to a wall-clock instant at construction and driven by
/// [`tokio::time::Instant`] afterwards, so paused-time tests move token
/// expiry and timers together.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    wall_anchor: DateTime<Utc>,
    anchor: Instant,
}

impl MonotonicClock {
    /// Anchor at the current system time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Anchor at an explicit wall-clock time.
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            wall_anchor: wall,
            anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.anchor.elapsed()).unwrap_or_else(|_| TimeDelta::zero());
        self.wall_anchor + elapsed
    }
}
