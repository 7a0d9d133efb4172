//! Transfer control settings, immutable once the command line has been
//! digested.

/// Hard ceiling on the display width, matching the widest terminal the
/// renderer will lay out for.
pub const WIDTH_MAX: u16 = u16::MAX;

/// Bounds for the display update interval, in seconds.
pub const INTERVAL_MIN: f64 = 0.1;
pub const INTERVAL_MAX: f64 = 600.0;

/// Everything the transfer loop, engine, and display need to know about
/// the requested behaviour.  Built once by the CLI crate; nothing mutates
/// it afterwards except the `direct_io_changed` edge used to (re)apply
/// `O_DIRECT` to freshly opened descriptors.
#[derive(Debug, Clone)]
pub struct Control {
    /// Seconds between display updates.
    pub interval: f64,
    /// Seconds to wait before the first display update (0 = none).
    pub delay_start: f64,
    /// Requested transfer buffer size in bytes; 0 means derive from the
    /// input block size.
    pub target_buffer_size: usize,
    /// Rate limit in bytes (or lines) per second; 0 means unlimited.
    pub rate_limit: u64,
    /// Window for the average-rate calculation, in seconds (>= 1).
    pub average_rate_window: u32,
    /// Declared total size in bytes (or lines); 0 means unknown.
    pub size: u64,

    /// Display width in columns and whether the user pinned it.
    pub width: u16,
    pub width_set_manually: bool,
    /// Display height in rows and whether the user pinned it.
    pub height: u16,
    pub height_set_manually: bool,

    /// Count lines instead of bytes.
    pub line_mode: bool,
    /// Lines are terminated by NUL instead of newline.
    pub null_terminated_lines: bool,
    /// Show bits instead of bytes in rates and totals.
    pub bits: bool,
    /// Use powers of 1000 instead of 1024.
    pub decimal_units: bool,
    /// Emit the display even when not in the foreground.
    pub force: bool,
    /// Numeric output: integer-per-line instead of a status bar.
    pub numeric: bool,
    /// Hold the timer until the first byte (or line) is transferred.
    pub wait_for_first_byte: bool,
    /// Suppress the display entirely.
    pub no_display: bool,
    /// Never use the zero-copy path.
    pub no_splice: bool,
    /// Stop transferring once `size` bytes have been written.
    pub stop_at_size: bool,
    /// Flush data to storage after every write.
    pub sync_after_write: bool,
    /// Use O_DIRECT on input and output.
    pub direct_io: bool,
    /// Turn all-zero writes into seeks and punch the final hole.
    pub sparse_output: bool,
    /// Read and count input without writing it anywhere.
    pub discard_input: bool,
    /// With unknown size, show current rate against the observed maximum.
    pub rate_gauge: bool,
    /// Print the min/avg/max/mdev rate summary at the end.
    pub show_stats: bool,

    /// Read-error handling: 0 = report and stop, 1 = skip quietly,
    /// >= 2 = skip and report each skip.
    pub skip_errors: u32,
    /// Fixed skip block size in bytes; 0 selects the adaptive schedule.
    pub error_skip_block: u64,

    /// Name prefix shown by the `%N` directive.
    pub name: Option<String>,
    /// User-supplied format template, if any.
    pub format_string: Option<String>,
    /// Template synthesised from the display toggles.
    pub default_format: String,
    /// Bar style used when a bar directive doesn't pick its own.
    pub default_bar_style: String,
    /// Output target name, for error messages.
    pub output_name: Option<String>,
}

impl Control {
    /// Spacing in seconds between average-rate history samples.
    #[must_use]
    pub fn history_interval(&self) -> u32 {
        if self.average_rate_window < 20 { 1 } else { 5 }
    }

    /// Number of slots in the average-rate history ring.
    #[must_use]
    pub fn history_capacity(&self) -> usize {
        if self.average_rate_window < 20 {
            self.average_rate_window as usize + 1
        } else {
            self.average_rate_window as usize / 5 + 1
        }
    }

    /// The template the display should parse: the explicit format if one
    /// was given, the synthesised default otherwise.
    #[must_use]
    pub fn template(&self) -> &str {
        self.format_string.as_deref().unwrap_or(&self.default_format)
    }
}

impl Default for Control {
    fn default() -> Self {
        Self {
            interval: 1.0,
            delay_start: 0.0,
            target_buffer_size: 0,
            rate_limit: 0,
            average_rate_window: 30,
            size: 0,
            width: 80,
            width_set_manually: false,
            height: 25,
            height_set_manually: false,
            line_mode: false,
            null_terminated_lines: false,
            bits: false,
            decimal_units: false,
            force: false,
            numeric: false,
            wait_for_first_byte: false,
            no_display: false,
            no_splice: false,
            stop_at_size: false,
            sync_after_write: false,
            direct_io: false,
            sparse_output: false,
            discard_input: false,
            rate_gauge: false,
            show_stats: false,
            skip_errors: 0,
            error_skip_block: 0,
            name: None,
            format_string: None,
            default_format: String::new(),
            default_bar_style: "plain".to_owned(),
            output_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_spacing_follows_window() {
        let mut control = Control::default();
        control.average_rate_window = 5;
        assert_eq!(control.history_interval(), 1);
        assert_eq!(control.history_capacity(), 6);

        control.average_rate_window = 19;
        assert_eq!(control.history_interval(), 1);
        assert_eq!(control.history_capacity(), 20);

        control.average_rate_window = 20;
        assert_eq!(control.history_interval(), 5);
        assert_eq!(control.history_capacity(), 5);

        control.average_rate_window = 120;
        assert_eq!(control.history_interval(), 5);
        assert_eq!(control.history_capacity(), 25);
    }

    #[test]
    fn explicit_format_wins_over_default() {
        let mut control = Control::default();
        control.default_format = "%b".to_owned();
        assert_eq!(control.template(), "%b");
        control.format_string = Some("%t %r".to_owned());
        assert_eq!(control.template(), "%t %r");
    }
}
