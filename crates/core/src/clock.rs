//! Monotonic elapsed-time tracking for the transfer.
//!
//! The transfer clock measures wall time minus the total time the process
//! spent stopped (SIGTSTP to SIGCONT).  The stoppage total is accumulated
//! by the signal adapter; the clock only combines the two readings, so a
//! resume can never make the elapsed time go backwards.

use std::time::{Duration, Instant};

/// The transfer's start point.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    start: Instant,
}

impl Clock {
    /// Starts the clock now.
    #[must_use]
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    /// Restarts the clock from now, discarding prior elapsed time.  Used
    /// when `--wait` fires on the first transferred byte.
    pub fn restart(&mut self) {
        self.start = Instant::now();
    }

    /// Elapsed time excluding the given stoppage total.  Clamps to zero
    /// rather than going negative when a stoppage reading races ahead of
    /// the current time.
    #[must_use]
    pub fn elapsed_excluding(&self, stoppage: Duration) -> Duration {
        Instant::now()
            .checked_duration_since(self.start)
            .and_then(|elapsed| elapsed.checked_sub(stoppage))
            .unwrap_or(Duration::ZERO)
    }

    /// Elapsed seconds excluding the given stoppage total.
    #[must_use]
    pub fn elapsed_seconds(&self, stoppage: Duration) -> f64 {
        self.elapsed_excluding(stoppage).as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_grows() {
        let clock = Clock::start();
        let first = clock.elapsed_seconds(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        let second = clock.elapsed_seconds(Duration::ZERO);
        assert!(second >= first);
    }

    #[test]
    fn stoppage_is_subtracted() {
        let clock = Clock::start();
        std::thread::sleep(Duration::from_millis(5));
        let raw = clock.elapsed_excluding(Duration::ZERO);
        let reduced = clock.elapsed_excluding(Duration::from_millis(2));
        assert!(reduced < raw);
    }

    #[test]
    fn excessive_stoppage_clamps_to_zero() {
        let clock = Clock::start();
        let elapsed = clock.elapsed_excluding(Duration::from_secs(3600));
        assert_eq!(elapsed, Duration::ZERO);
    }

    #[test]
    fn restart_resets_the_origin() {
        let mut clock = Clock::start();
        std::thread::sleep(Duration::from_millis(5));
        clock.restart();
        assert!(clock.elapsed_seconds(Duration::ZERO) < 0.005);
    }
}
