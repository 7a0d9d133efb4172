//! Rate, percentage, and ETA calculation.

use pipemeter_core::Control;

/// One average-rate history sample.
#[derive(Debug, Clone, Copy, Default)]
struct Sample {
    elapsed_sec: f64,
    transferred: u64,
}

/// Derived transfer figures, refreshed once per display interval and a
/// final time when the transfer ends.
#[derive(Debug)]
pub struct Calculator {
    prev_transferred: u64,
    prev_elapsed_sec: f64,
    prev_rate: f64,
    /// Amount carried forward when the interval since the previous
    /// calculation was too small to divide by.
    carried: f64,

    history: Vec<Sample>,
    history_capacity: usize,
    history_first: usize,
    history_last: usize,
    history_len: usize,

    /// Windowed average rate used for the ETA.
    pub current_avg_rate: f64,
    /// Instantaneous rate (whole-transfer average on the final update).
    pub transfer_rate: f64,
    /// Displayed average rate.
    pub average_rate: f64,

    pub rate_min: f64,
    pub rate_max: f64,
    pub rate_sum: f64,
    pub rate_squared_sum: f64,
    pub measurements_taken: u64,

    /// 0..=100 when the size is known; otherwise a sawtooth that climbs
    /// to 200 and wraps, which the unknown-size indicator folds back.
    pub percentage: f64,
}

impl Calculator {
    #[must_use]
    pub fn new(control: &Control) -> Self {
        let capacity = control.history_capacity().max(1);
        Self {
            prev_transferred: 0,
            prev_elapsed_sec: 0.0,
            prev_rate: 0.0,
            carried: 0.0,
            history: vec![Sample::default(); capacity],
            history_capacity: capacity,
            history_first: 0,
            history_last: 0,
            history_len: 1,
            current_avg_rate: 0.0,
            transfer_rate: 0.0,
            average_rate: 0.0,
            rate_min: 0.0,
            rate_max: 0.0,
            rate_sum: 0.0,
            rate_squared_sum: 0.0,
            measurements_taken: 0,
            percentage: 0.0,
        }
    }

    /// Refreshes every derived figure from the current counters.
    ///
    /// `transferred` and `elapsed_seconds` come from the transfer state;
    /// `initial_offset` is the starting position when monitoring resumed
    /// mid-stream; `final_update` replaces both rates with the
    /// whole-transfer average.
    pub fn update(
        &mut self,
        control: &Control,
        transferred: u64,
        elapsed_seconds: f64,
        initial_offset: u64,
        final_update: bool,
    ) {
        let bytes_since_last = transferred.saturating_sub(self.prev_transferred) as f64;
        self.prev_transferred = transferred;

        let time_since_last = elapsed_seconds - self.prev_elapsed_sec;
        let mut transfer_rate;
        if time_since_last <= 0.01 {
            // Too little time has passed for a stable division; carry
            // the delta into the next calculation instead.
            transfer_rate = self.prev_rate;
            self.carried += bytes_since_last;
        } else {
            transfer_rate = (bytes_since_last + self.carried) / time_since_last;
            self.prev_elapsed_sec = elapsed_seconds;
            self.carried = 0.0;

            let measured_rate = if control.bits {
                transfer_rate * 8.0
            } else {
                transfer_rate
            };
            if self.measurements_taken < 1 || measured_rate < self.rate_min {
                self.rate_min = measured_rate;
            }
            if measured_rate > self.rate_max {
                self.rate_max = measured_rate;
            }
            self.rate_sum += measured_rate;
            self.rate_squared_sum += measured_rate * measured_rate;
            self.measurements_taken += 1;
        }
        self.prev_rate = transfer_rate;

        self.update_history(
            control.history_interval(),
            elapsed_seconds,
            transferred,
            transfer_rate,
        );
        let mut average_rate = self.current_avg_rate;

        if final_update {
            let total_elapsed = elapsed_seconds.max(0.000_001);
            average_rate =
                (transferred as f64 - initial_offset as f64) / total_elapsed;
            transfer_rate = average_rate;
        }

        self.transfer_rate = transfer_rate;
        self.average_rate = average_rate;

        if control.size == 0 {
            // Unknown size: creep the percentage along while data flows
            // so the indicator keeps sweeping, wrapping at 200.
            if transfer_rate > 0.0 {
                self.percentage += 2.0;
            }
            if self.percentage > 199.0 {
                self.percentage = 0.0;
            }
        } else {
            self.percentage = pipemeter_units::percentage(transferred, control.size);
        }

        self.percentage = self.percentage.clamp(0.0, 100_000.0);
    }

    /// Appends a history sample once `history_interval` seconds have
    /// passed since the previous one, evicting the oldest on overflow,
    /// and re-derives the windowed average.
    fn update_history(
        &mut self,
        history_interval: u32,
        elapsed_seconds: f64,
        transferred: u64,
        rate: f64,
    ) {
        let last_elapsed = self.history[self.history_last].elapsed_sec;

        if last_elapsed > 0.0 && elapsed_seconds < last_elapsed + f64::from(history_interval) {
            return;
        }

        if last_elapsed > 0.0 {
            self.history_last = (self.history_last + 1) % self.history_capacity;
            if self.history_last == self.history_first {
                self.history_first = (self.history_first + 1) % self.history_capacity;
            } else {
                self.history_len = (self.history_len + 1).min(self.history_capacity);
            }
        }

        self.history[self.history_last] = Sample {
            elapsed_sec: elapsed_seconds,
            transferred,
        };

        if self.history_first == self.history_last {
            self.current_avg_rate = rate;
        } else {
            let newest = self.history[self.history_last];
            let oldest = self.history[self.history_first];
            let amount = newest.transferred.saturating_sub(oldest.transferred) as f64;
            let mut seconds = newest.elapsed_sec - oldest.elapsed_sec;
            if seconds.abs() < 0.000_001 {
                seconds = 0.000_001;
            }
            self.current_avg_rate = amount / seconds;
        }
    }

    /// Mean measured rate over the whole run.
    #[must_use]
    pub fn rate_mean(&self) -> f64 {
        if self.measurements_taken == 0 {
            return 0.0;
        }
        self.rate_sum / self.measurements_taken as f64
    }

    /// Standard deviation of the measured rate.
    #[must_use]
    pub fn rate_deviation(&self) -> f64 {
        if self.measurements_taken == 0 {
            return 0.0;
        }
        let mean = self.rate_mean();
        let variance = self.rate_squared_sum / self.measurements_taken as f64 - mean * mean;
        variance.max(0.0).sqrt()
    }
}

/// Estimated seconds until completion, clamped to
/// [`crate::TIME_BOUND_SECONDS`].  Zero until data has flowed and the
/// rate is meaningful.
#[must_use]
pub fn seconds_remaining(so_far: u64, total: u64, rate: f64) -> i64 {
    if so_far < 1 || rate < 0.001 {
        return 0;
    }
    let remaining = (total.saturating_sub(so_far)) as f64 / rate;
    (remaining as i64).clamp(0, crate::TIME_BOUND_SECONDS)
}
