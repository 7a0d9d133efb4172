//! Progress-bar rendering: known-size bars with a trailing percentage,
//! rate gauges, and the back-and-forth sweep used when the size is
//! unknown.

use pipemeter_units::describe_with;

use crate::format::{commit, FormatterArgs};
use crate::segment::Segment;
use crate::width::display_width;

/// Picks the segment's bar style on first use.
fn select_style(args: &mut FormatterArgs<'_>, segment: &mut Segment, style_name: Option<&str>) {
    if segment.parameter != 0 {
        return;
    }
    let name = style_name.unwrap_or(args.control.default_bar_style.as_str());
    segment.parameter = args
        .styles
        .index_for(name, args.terminal_supports_utf8);
}

/// The number shown after the bar: a percentage when the size is known,
/// or the observed maximum rate for the gauge.  Includes a leading
/// space.
fn after_bar_text(args: &FormatterArgs<'_>) -> String {
    if args.control.size > 0 {
        return format!(" {:>3}%", args.calc.percentage.min(999.0) as i64);
    }
    if args.control.bits && !args.control.line_mode {
        format!(
            "/{}",
            describe_with(8.0 * args.calc.rate_max, "", "b/s", args.count_type)
        )
    } else {
        format!(
            "/{}",
            describe_with(args.calc.rate_max, "/s", "B/s", args.count_type)
        )
    }
}

/// Fill percentage for the bar body.
fn bar_percentage(args: &FormatterArgs<'_>) -> f64 {
    if args.control.size > 0 {
        return args.calc.percentage;
    }
    if args.calc.rate_max > 0.0 {
        100.0 * args.calc.transfer_rate / args.calc.rate_max
    } else {
        0.0
    }
}

/// A bar for a known size or rate gauge.
fn render_known(
    args: &mut FormatterArgs<'_>,
    segment: &Segment,
    sides: bool,
    include_bar: bool,
    include_amount: bool,
) -> Vec<u8> {
    let style = args.styles.get(segment.parameter);
    let full_index = style.full_index();
    let has_tip = style.has_tip();

    let percentage = bar_percentage(args);
    let after_bar = if include_amount {
        after_bar_text(args)
    } else {
        String::new()
    };
    let after_bar_width = display_width(after_bar.as_bytes());

    if !include_bar {
        // Only the amount, without its leading space.
        if after_bar.len() > 1 {
            return after_bar.as_bytes()[1..].to_vec();
        }
        return Vec::new();
    }

    let reserved = after_bar_width + if sides { 2 } else { 0 };
    if segment.width < reserved {
        return Vec::new();
    }
    let bar_area_width = segment.width - reserved;

    let mut filled_width = (bar_area_width as f64 * percentage / 100.0) as usize;
    if has_tip && filled_width > 0 {
        filled_width = filled_width.saturating_sub(style.tip.width);
    }

    let mut content: Vec<u8> = Vec::with_capacity(segment.width + 8);
    if sides {
        content.push(b'[');
    }

    let mut cells = 0usize;
    while cells < filled_width && cells < bar_area_width {
        content.extend_from_slice(style.fillers[full_index].text.as_bytes());
        cells += style.fillers[full_index].width.max(1);
    }

    if has_tip && cells < bar_area_width {
        content.extend_from_slice(style.tip.text.as_bytes());
        cells += style.tip.width;
    }

    // Sub-cell granularity: one partial glyph at the boundary.
    if cells < bar_area_width && full_index > 1 && !has_tip {
        let exact_width = bar_area_width as f64 * percentage / 100.0;
        let cell_portion = exact_width - filled_width as f64;
        let cell_index = ((full_index as f64 * cell_portion) as usize).min(full_index);
        content.extend_from_slice(style.fillers[cell_index].text.as_bytes());
        cells += style.fillers[cell_index].width.max(1);
    }

    while cells < bar_area_width {
        content.extend_from_slice(style.fillers[0].text.as_bytes());
        cells += style.fillers[0].width.max(1);
    }

    if sides {
        content.push(b']');
    }
    content.extend_from_slice(after_bar.as_bytes());
    content
}

/// The sweeping indicator used when the total size is unknown.
fn render_unknown(args: &mut FormatterArgs<'_>, segment: &Segment, sides: bool) -> Vec<u8> {
    let style = args.styles.get(segment.parameter);

    let needed = style.indicator.width + if sides { 3 } else { 2 };
    if segment.width < needed {
        return Vec::new();
    }
    let bar_area_width = if sides {
        segment.width - (style.indicator.width + 2)
    } else {
        segment.width - style.indicator.width
    };

    // The calculator's sawtooth covers 0..200; fold the upper half back
    // so the indicator moves out and back.
    let mut position = args.calc.percentage % 200.0;
    if position > 100.0 {
        position = 200.0 - position;
    }
    if position < 0.0 {
        position = 0.0;
    }

    let before = (bar_area_width as f64 * position / 100.0) as usize;

    let mut content: Vec<u8> = Vec::with_capacity(segment.width + 8);
    if sides {
        content.push(b'[');
    }

    let mut cells = 0usize;
    while cells < bar_area_width && cells < before {
        content.extend_from_slice(style.fillers[0].text.as_bytes());
        cells += style.fillers[0].width.max(1);
    }

    // The indicator rides on top of the padded area; the area width
    // already excludes it.
    content.extend_from_slice(style.indicator.text.as_bytes());

    while cells < bar_area_width {
        content.extend_from_slice(style.fillers[0].text.as_bytes());
        cells += style.fillers[0].width.max(1);
    }

    if sides {
        content.push(b']');
    }
    content
}

fn render_bar(
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
    style_name: Option<&str>,
    sides: bool,
    include_amount: bool,
) -> usize {
    select_style(args, segment, style_name);
    if args.zero_pass {
        return 0;
    }

    let content = if args.control.size > 0 || args.control.rate_gauge {
        render_known(args, segment, sides, true, include_amount)
    } else {
        render_unknown(args, segment, sides)
    };
    commit(&content, segment, assembly)
}

/// `%p` / `%{progress}`: bar with sides and the trailing amount.
pub(super) fn progress(
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
) -> usize {
    render_bar(args, segment, assembly, None, true, true)
}

/// Bar body only, optionally with a fixed style.
pub(super) fn bar_only(
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
    style_name: Option<&'static str>,
) -> usize {
    render_bar(args, segment, assembly, style_name, false, false)
}

/// `%{progress-amount-only}`: just the number after the bar.
pub(super) fn amount_only(
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
) -> usize {
    if args.zero_pass {
        return 0;
    }

    if args.control.numeric {
        let content = format!("{:.0}", args.calc.percentage);
        return commit(content.as_bytes(), segment, assembly);
    }
    if args.control.size > 0 || args.control.rate_gauge {
        let content = render_known(args, segment, false, false, true);
        return commit(&content, segment, assembly);
    }
    0
}
