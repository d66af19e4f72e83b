//! Window boundary calculations
//!
//! A window algorithm answers two questions for one evaluation: which recorded
//! admissions have left the window (the prune cutoff), and how long a deferred
//! job should wait before it is retried. Both answers come from the same
//! boundary so the reported delay always agrees with what pruning will free up.

pub mod fixed_window;
pub mod sliding_window;

use crate::error::ThrottlerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

pub use fixed_window::FixedWindow;
pub use sliding_window::SlidingWindow;

/// Trait for window boundary algorithms
pub trait WindowAlgorithm: Send + Sync {
    /// Admissions recorded at or before this instant are outside the window.
    fn cutoff(&self, now: SystemTime, period: Duration) -> SystemTime;

    /// Delay after which a deferred job should be retried.
    fn retry_after(&self, now: SystemTime, period: Duration) -> Duration;
}

/// Which window boundary a worker is limited by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPolicy {
    /// Trailing window of `period` ending now.
    #[default]
    Rolling,
    /// Windows aligned to multiples of `period`; all admissions reset together
    /// at each boundary.
    FixedBoundary,
}

impl WindowPolicy {
    pub fn algorithm(&self) -> &'static dyn WindowAlgorithm {
        match self {
            WindowPolicy::Rolling => &SlidingWindow,
            WindowPolicy::FixedBoundary => &FixedWindow,
        }
    }
}

impl fmt::Display for WindowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowPolicy::Rolling => write!(f, "rolling"),
            WindowPolicy::FixedBoundary => write!(f, "fixed_boundary"),
        }
    }
}

impl FromStr for WindowPolicy {
    type Err = ThrottlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rolling" | "sliding" => Ok(WindowPolicy::Rolling),
            "fixed_boundary" | "fixed" | "reset" => Ok(WindowPolicy::FixedBoundary),
            other => Err(ThrottlerError::Configuration(format!(
                "unknown window policy '{}' (expected 'rolling' or 'fixed_boundary')",
                other
            ))),
        }
    }
}
