//! Counts and rates: transferred total, instantaneous rate, windowed
//! average, and transfer-buffer utilisation.

use pipemeter_units::describe_with;

use crate::format::{commit, FormatterArgs};
use crate::segment::Segment;

fn rate_text(args: &FormatterArgs<'_>, rate: f64, open: char, close: char) -> String {
    if args.control.numeric {
        let factor = if args.control.bits { 8.0 } else { 1.0 };
        return format!("{:.4}", factor * rate);
    }
    if args.control.bits && !args.control.line_mode {
        format!(
            "{open}{}{close}",
            describe_with(8.0 * rate, "", "b/s", args.count_type)
        )
    } else {
        format!(
            "{open}{}{close}",
            describe_with(rate, "/s", "B/s", args.count_type)
        )
    }
}

/// `%r`: instantaneous rate, bracketed.
pub(super) fn rate(
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
) -> usize {
    args.flags.showing_rate = true;
    if args.zero_pass {
        return 0;
    }
    let content = rate_text(args, args.calc.transfer_rate, '[', ']');
    commit(content.as_bytes(), segment, assembly)
}

/// `%a`: windowed average rate, parenthesised.
pub(super) fn average_rate(
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
) -> usize {
    if args.zero_pass {
        return 0;
    }
    let content = rate_text(args, args.calc.average_rate, '(', ')');
    commit(content.as_bytes(), segment, assembly)
}

/// `%b`: amount transferred so far.
pub(super) fn bytes(
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
) -> usize {
    args.flags.showing_bytes = true;
    if args.zero_pass {
        return 0;
    }

    let transferred = args.transfer.transferred;
    let content = if args.control.numeric {
        let factor: u64 = if args.control.bits { 8 } else { 1 };
        format!("{}", factor * transferred)
    } else if args.control.bits && !args.control.line_mode {
        describe_with(transferred as f64 * 8.0, "", "b", args.count_type)
    } else {
        describe_with(transferred as f64, "", "B", args.count_type)
    };
    commit(content.as_bytes(), segment, assembly)
}

/// `%T`: transfer-buffer fill percentage; `{----}` on a splice pass,
/// which bypasses the buffer entirely.
pub(super) fn buffer_percent(
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
) -> usize {
    if args.zero_pass {
        return 0;
    }

    let content = if args.transfer.splice_used {
        "{----}".to_owned()
    } else if args.transfer.buffer_size > 0 {
        let percent = 100.0 * args.transfer.buffer_fill_fraction();
        format!("{{{:>3.0}%}}", percent)
    } else {
        return 0;
    };
    commit(content.as_bytes(), segment, assembly)
}
