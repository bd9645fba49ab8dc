//! Sliding window of admission timestamps
//!
//! Timestamps at or before `now - window` fall out of the window on every
//! prune, so capacity frees up continuously instead of at bucket boundaries.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Outcome of one rate check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCheck {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Admissions left in the window after this one
    pub remaining: u32,
    /// Seconds until the oldest admission leaves the window
    pub reset_in_seconds: u64,
}

/// Ordered admission timestamps (Unix milliseconds) for one `(identity, tier)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlidingWindow {
    admissions: VecDeque<i64>,
}

impl SlidingWindow {
    /// Create empty window
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admissions currently held
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.admissions.len()
    }

    /// Whether the window holds no admission
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.admissions.is_empty()
    }

    /// Drop admissions that left the window
    pub fn prune(&mut self, now_ms: i64, window_ms: i64) {
        let cutoff = now_ms.saturating_sub(window_ms);
        while self.admissions.front().is_some_and(|&ts| ts <= cutoff) {
            self.admissions.pop_front();
        }
    }

    /// Decide without recording; the window must already be pruned
    #[must_use]
    pub fn evaluate(&self, max_requests: u32, window_ms: i64, now_ms: i64) -> RateCheck {
        let held = u32::try_from(self.admissions.len()).unwrap_or(u32::MAX);

        if held < max_requests {
            // The front stays the oldest after a push; an empty window would hold only `now`.
            let oldest = self.admissions.front().copied().unwrap_or(now_ms);
            RateCheck {
                allowed: true,
                remaining: max_requests - held - 1,
                reset_in_seconds: seconds_until_reset(oldest, window_ms, now_ms),
            }
        } else {
            let reset_in_seconds = match self.admissions.front() {
                Some(&oldest) => seconds_until_reset(oldest, window_ms, now_ms),
                None => ceil_seconds(window_ms),
            };
            RateCheck {
                allowed: false,
                remaining: 0,
                reset_in_seconds,
            }
        }
    }

    /// Record an admission at `now_ms`
    #[inline]
    pub fn record(&mut self, now_ms: i64) {
        self.admissions.push_back(now_ms);
    }

    /// Prune, evaluate and record when admitted
    pub fn check(&mut self, max_requests: u32, window_ms: i64, now_ms: i64) -> RateCheck {
        self.prune(now_ms, window_ms);
        let check = self.evaluate(max_requests, window_ms, now_ms);
        if check.allowed {
            self.record(now_ms);
        }
        check
    }
}

/// `ceil((window - (now - oldest)) / 1000)`, clamped to `[0, ceil(window / 1000)]`
fn seconds_until_reset(oldest_ms: i64, window_ms: i64, now_ms: i64) -> u64 {
    let elapsed = now_ms.saturating_sub(oldest_ms).max(0);
    let left = window_ms.saturating_sub(elapsed).clamp(0, window_ms.max(0));
    ceil_seconds(left)
}

fn ceil_seconds(ms: i64) -> u64 {
    let ms = u64::try_from(ms.max(0)).unwrap_or(0);
    ms.div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000;

    #[test]
    fn empty_window_allows() {
        let mut window = SlidingWindow::new();
        let check = window.check(3, MINUTE, 0);
        assert!(check.allowed);
        assert_eq!(check.remaining, 2);
        assert_eq!(check.reset_in_seconds, 60);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn zero_capacity_always_rejects() {
        let mut window = SlidingWindow::new();
        let check = window.check(0, MINUTE, 0);
        assert!(!check.allowed);
        assert_eq!(check.remaining, 0);
        assert!(window.is_empty());
    }

    #[test]
    fn rejection_reports_time_until_oldest_expires() {
        let mut window = SlidingWindow::new();
        window.check(1, MINUTE, 0);

        let check = window.check(1, MINUTE, 15_500);
        assert!(!check.allowed);
        // 60000 - 15500 = 44500ms -> 45s
        assert_eq!(check.reset_in_seconds, 45);
    }

    #[test]
    fn admission_on_window_boundary_is_pruned() {
        let mut window = SlidingWindow::new();
        window.check(1, MINUTE, 0);
        assert!(!window.check(1, MINUTE, MINUTE - 1).allowed);
        assert!(window.check(1, MINUTE, MINUTE).allowed);
    }

    #[test]
    fn rejected_check_does_not_record() {
        let mut window = SlidingWindow::new();
        window.check(1, MINUTE, 0);
        window.check(1, MINUTE, 10);
        window.check(1, MINUTE, 20);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn clock_going_backwards_is_clamped() {
        let mut window = SlidingWindow::new();
        window.check(1, MINUTE, 10_000);
        let check = window.check(1, MINUTE, 5_000);
        assert!(!check.allowed);
        assert_eq!(check.reset_in_seconds, 60);
    }
}
