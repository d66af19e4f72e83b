//! Rolling window
//!
//! Counts admissions in the trailing `period` ending at the evaluation instant.
//! A deferred job is told to come back after one full period.

use super::WindowAlgorithm;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Default)]
pub struct SlidingWindow;

impl WindowAlgorithm for SlidingWindow {
    fn cutoff(&self, now: SystemTime, period: Duration) -> SystemTime {
        now.checked_sub(period).unwrap_or(UNIX_EPOCH)
    }

    fn retry_after(&self, _now: SystemTime, period: Duration) -> Duration {
        period
    }
}
