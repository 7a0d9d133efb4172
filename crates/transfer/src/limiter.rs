//! Rate limiting as a granted budget.
//!
//! Every tenth of a second the budget gains one grant of `rate / 10`
//! bytes (or lines), capped at a burst window of five seconds' worth.
//! The loop asks how much it may send this pass and pays back what the
//! engine actually moved.

use std::time::{Duration, Instant};

/// Time between budget grants.
pub const RATE_GRANULARITY: Duration = Duration::from_millis(100);
/// Maximum accumulable budget, in multiples of the configured rate.
pub const RATE_BURST_WINDOW: u64 = 5;

/// Byte (or line) budget for a configured transfer rate.
#[derive(Debug)]
pub struct RateLimiter {
    rate: u64,
    target: f64,
    next_grant: Instant,
}

impl RateLimiter {
    /// Creates a limiter for `rate` units per second.
    #[must_use]
    pub fn new(rate: u64, now: Instant) -> Self {
        Self {
            rate,
            target: 0.0,
            next_grant: now,
        }
    }

    /// Adds a grant if one is due and returns the whole-unit budget the
    /// caller may send right now.
    pub fn allowed(&mut self, now: Instant) -> u64 {
        if now >= self.next_grant {
            let per_grant = self.rate as f64
                * (RATE_GRANULARITY.as_secs_f64());
            self.target += per_grant;
            let burst_max = (self.rate * RATE_BURST_WINDOW) as f64;
            if self.target > burst_max {
                self.target = burst_max;
            }
            self.next_grant += RATE_GRANULARITY;
        }
        if self.target <= 0.0 {
            0
        } else {
            self.target as u64
        }
    }

    /// Pays back what was actually sent.
    pub fn consume(&mut self, sent: u64) {
        self.target -= sent as f64;
    }
}
