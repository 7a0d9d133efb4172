//! Elapsed time, ETA, and estimated completion clock time.

use time::macros::format_description;
use time::OffsetDateTime;

use crate::calc::seconds_remaining;
use crate::format::{commit, FormatterArgs};
use crate::segment::Segment;
use crate::TIME_BOUND_SECONDS;

/// Renders whole seconds as `H:MM:SS`, adding a day count above 24h.
fn clock_text(total_seconds: i64) -> String {
    if total_seconds > 86_400 {
        format!(
            "{}:{:02}:{:02}:{:02}",
            total_seconds / 86_400,
            (total_seconds / 3_600) % 24,
            (total_seconds / 60) % 60,
            total_seconds % 60
        )
    } else {
        format!(
            "{}:{:02}:{:02}",
            total_seconds / 3_600,
            (total_seconds / 60) % 60,
            total_seconds % 60
        )
    }
}

/// `%t`: elapsed transfer time.
pub(super) fn timer(
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
) -> usize {
    args.flags.showing_timer = true;
    if args.zero_pass {
        return 0;
    }

    let elapsed = args
        .transfer
        .elapsed_seconds
        .clamp(0.0, TIME_BOUND_SECONDS as f64);

    let content = if args.control.numeric {
        format!("{elapsed:.4}")
    } else {
        clock_text(elapsed as i64)
    };
    commit(content.as_bytes(), segment, assembly)
}

fn eta_seconds(args: &FormatterArgs<'_>) -> i64 {
    seconds_remaining(
        args.transfer.transferred.saturating_sub(args.initial_offset),
        args.control.size.saturating_sub(args.initial_offset),
        args.calc.current_avg_rate,
    )
}

/// `%e`: estimated time until completion.  Blanked (same width) on the
/// final update so the finished line doesn't carry a stale estimate.
pub(super) fn eta(
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
) -> usize {
    if args.control.size < 1 || args.zero_pass {
        return 0;
    }

    let remaining = eta_seconds(args);
    let mut content = format!("ETA {}", clock_text(remaining));
    if args.final_update {
        content = " ".repeat(content.len());
    }
    commit(content.as_bytes(), segment, assembly)
}

/// `%I`: wall-clock time at which the transfer should finish, with the
/// date included once the estimate reaches past six hours.
pub(super) fn fineta(
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
) -> usize {
    if args.control.size < 1 || args.zero_pass {
        return 0;
    }

    let remaining = eta_seconds(args);

    let now = match OffsetDateTime::now_local() {
        Ok(now) => now,
        // Without a local clock offset there is no meaningful local
        // completion time to show.
        Err(_) => return 0,
    };
    let then = now + time::Duration::seconds(remaining);

    let rendered = if remaining > 6 * 3_600 {
        then.format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
    } else {
        then.format(format_description!("[hour]:[minute]:[second]"))
    };

    let content = match rendered {
        Ok(text) => format!("FIN {text}"),
        Err(_) => return 0,
    };
    commit(content.as_bytes(), segment, assembly)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_rolls_through_units() {
        assert_eq!(clock_text(0), "0:00:00");
        assert_eq!(clock_text(45), "0:00:45");
        assert_eq!(clock_text(125), "0:02:05");
        assert_eq!(clock_text(3_661), "1:01:01");
        assert_eq!(clock_text(86_400), "24:00:00");
        assert_eq!(clock_text(90_061), "1:01:01:01");
    }
}
