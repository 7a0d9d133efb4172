//! Textual segments: the transfer name, the last bytes written, and the
//! most recent complete line.

use pipemeter_transfer::preview::{LASTWRITTEN_BUFFER_SIZE, PREVLINE_BUFFER_SIZE};

use crate::format::{commit, FormatterArgs};
use crate::segment::Segment;

fn printable_or(byte: u8, replacement: u8) -> u8 {
    if (32..=126).contains(&byte) {
        byte
    } else {
        replacement
    }
}

/// `%N`: the transfer's name, right-justified with a trailing colon.
pub(super) fn name(
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
) -> usize {
    if args.zero_pass {
        return 0;
    }

    let field_width = match segment.chosen_size {
        0 => 9,
        chosen => chosen.min(500),
    };

    let Some(name) = args.control.name.as_deref() else {
        return 0;
    };
    let mut clipped = name;
    if clipped.len() > 500 {
        let mut cut = 500;
        while !clipped.is_char_boundary(cut) {
            cut -= 1;
        }
        clipped = &clipped[..cut];
    }
    let content = format!("{clipped:>field_width$}:");
    commit(content.as_bytes(), segment, assembly)
}

/// `%A` / `%{last-written}`: the last few bytes written, with anything
/// unprintable shown as a dot.
pub(super) fn last_written(
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
) -> usize {
    args.flags.showing_last_written = true;

    let mut bytes_to_show = segment.chosen_size;
    if bytes_to_show == 0 {
        bytes_to_show = segment.width;
    }
    bytes_to_show = bytes_to_show.min(LASTWRITTEN_BUFFER_SIZE);
    if bytes_to_show == 0 {
        return 0;
    }

    if bytes_to_show > args.flags.lastwritten_request {
        args.flags.lastwritten_request = bytes_to_show;
    }

    if args.zero_pass {
        return 0;
    }

    let content: Vec<u8> = args
        .preview
        .last_written(bytes_to_show)
        .iter()
        .map(|&byte| printable_or(byte, b'.'))
        .collect();
    // A window the engine has not grown to yet still occupies its full
    // slot, padded on the left.
    let mut padded = vec![b'.'; bytes_to_show.saturating_sub(content.len())];
    padded.extend_from_slice(&content);
    commit(&padded, segment, assembly)
}

/// `%L` / `%{previous-line}`: the most recent complete line, padded or
/// truncated to the segment's width.
pub(super) fn previous_line(
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
) -> usize {
    args.flags.showing_previous_line = true;

    if args.zero_pass {
        return 0;
    }

    let mut bytes_to_show = segment.chosen_size;
    if bytes_to_show == 0 {
        bytes_to_show = segment.width;
    }
    bytes_to_show = bytes_to_show.min(PREVLINE_BUFFER_SIZE);
    if bytes_to_show == 0 {
        return 0;
    }

    let line = args.preview.previous_line();
    let content: Vec<u8> = (0..bytes_to_show)
        .map(|index| {
            line.get(index)
                .map_or(b' ', |&byte| printable_or(byte, b' '))
        })
        .collect();
    commit(&content, segment, assembly)
}
