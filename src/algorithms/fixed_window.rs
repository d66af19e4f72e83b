//! Fixed-boundary window
//!
//! Windows start at multiples of `period` since the unix epoch. Every admission
//! recorded before the start of the current window is expired, and a deferred
//! job is retried when the next window opens.

use super::WindowAlgorithm;
use crate::clock::unix_secs_f64;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWindow;

impl FixedWindow {
    /// Start of the window containing `now`. `None` when the boundary cannot
    /// be represented as a `SystemTime`.
    fn window_start(now: SystemTime, period: Duration) -> Option<SystemTime> {
        let period = period.as_secs_f64();
        let start = (unix_secs_f64(now) / period).floor() * period;
        Duration::try_from_secs_f64(start)
            .ok()
            .and_then(|offset| UNIX_EPOCH.checked_add(offset))
    }

    /// End of the window containing `now`. `None` when it lies beyond the
    /// range of `SystemTime`.
    pub fn end_of_period(now: SystemTime, period: Duration) -> Option<SystemTime> {
        if period.is_zero() {
            return Some(now);
        }
        Self::window_start(now, period)?.checked_add(period)
    }
}

impl WindowAlgorithm for FixedWindow {
    fn cutoff(&self, now: SystemTime, period: Duration) -> SystemTime {
        if period.is_zero() {
            return now;
        }
        match Self::window_start(now, period) {
            // Pruning removes entries at or before the cutoff; an admission made
            // exactly at the window start still belongs to this window.
            Some(start) => start
                .checked_sub(Duration::from_nanos(1))
                .unwrap_or(UNIX_EPOCH),
            None => now.checked_sub(period).unwrap_or(UNIX_EPOCH),
        }
    }

    fn retry_after(&self, now: SystemTime, period: Duration) -> Duration {
        match Self::end_of_period(now, period) {
            Some(end) => end.duration_since(now).unwrap_or_default(),
            None => period,
        }
    }
}
