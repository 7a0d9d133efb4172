//! ECMA-48 select-graphic-rendition directives.

use crate::format::{commit, FormatterArgs};
use crate::segment::Segment;

/// Keyword-to-code table.  Numeric arguments in 0..=254 are passed
/// through as-is.
const KEYWORDS: &[(&str, u8)] = &[
    ("reset", 0),
    ("none", 0),
    ("bold", 1),
    ("dim", 2),
    ("italic", 3),
    ("underscore", 4),
    ("underline", 4),
    ("blink", 5),
    ("reverse", 7),
    ("no-bold", 22),
    ("no-dim", 22),
    ("no-italic", 23),
    ("no-underscore", 24),
    ("no-underline", 24),
    ("no-blink", 25),
    ("no-reverse", 27),
    ("black", 30),
    ("red", 31),
    ("green", 32),
    ("brown", 33),
    ("yellow", 33),
    ("blue", 34),
    ("magenta", 35),
    ("cyan", 36),
    ("white", 37),
    ("fg-black", 30),
    ("fg-red", 31),
    ("fg-green", 32),
    ("fg-brown", 33),
    ("fg-yellow", 33),
    ("fg-blue", 34),
    ("fg-magenta", 35),
    ("fg-cyan", 36),
    ("fg-white", 37),
    ("fg-default", 39),
    ("bg-black", 40),
    ("bg-red", 41),
    ("bg-green", 42),
    ("bg-brown", 43),
    ("bg-yellow", 43),
    ("bg-blue", 44),
    ("bg-magenta", 45),
    ("bg-cyan", 46),
    ("bg-white", 47),
    ("bg-default", 49),
];

fn code_for(token: &str) -> Option<u8> {
    if !token.is_empty() && token.bytes().all(|byte| byte.is_ascii_digit()) {
        return match token.parse::<u16>() {
            Ok(value) if value < 255 => Some(value as u8),
            _ => None,
        };
    }
    KEYWORDS
        .iter()
        .find(|(keyword, _)| *keyword == token)
        .map(|&(_, code)| code)
}

/// Builds the escape sequences for a comma-separated code list, starting
/// a fresh escape after every 16 codes.
fn escape_text(argument: &str) -> (String, Option<u8>) {
    let mut content = String::new();
    let mut code_count = 0;
    let mut most_recent = None;

    for token in argument.split([',', ';']) {
        let Some(code) = code_for(token) else {
            continue;
        };
        if code_count > 15 {
            content.push('m');
            code_count = 0;
        }
        if code_count == 0 {
            content.push_str("\x1b[");
        } else {
            content.push(';');
        }
        content.push_str(&code.to_string());
        code_count += 1;
        most_recent = Some(code);
    }

    if code_count > 0 {
        content.push('m');
    }
    (content, most_recent)
}

/// `%{sgr:...}`: emits the escape sequence when the terminal can colour,
/// nothing otherwise.  Leaves a note for the assembler when codes other
/// than a reset are left active.
pub(super) fn sgr(
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
) -> usize {
    if !args.colour_permitted {
        return 0;
    }

    args.flags.format_uses_colour = true;

    if !args.terminal_supports_colour {
        return 0;
    }
    let Some(argument) = args.argument(segment) else {
        return 0;
    };
    if argument.is_empty() || args.zero_pass {
        return 0;
    }

    let (content, most_recent) = escape_text(argument);
    match most_recent {
        Some(0) => args.flags.sgr_code_active = false,
        Some(_) => args.flags.sgr_code_active = true,
        None => {}
    }
    commit(content.as_bytes(), segment, assembly)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_become_codes() {
        let (text, last) = escape_text("bold,red");
        assert_eq!(text, "\x1b[1;31m");
        assert_eq!(last, Some(31));
    }

    #[test]
    fn numeric_codes_pass_through() {
        let (text, last) = escape_text("38;5;196");
        assert_eq!(text, "\x1b[38;5;196m");
        assert_eq!(last, Some(196));
    }

    #[test]
    fn unknown_keywords_are_dropped() {
        let (text, last) = escape_text("sparkly,red");
        assert_eq!(text, "\x1b[31m");
        assert_eq!(last, Some(31));
    }

    #[test]
    fn reset_clears_the_active_note() {
        let (_, last) = escape_text("bold,reset");
        assert_eq!(last, Some(0));
    }

    #[test]
    fn empty_list_emits_nothing() {
        let (text, last) = escape_text(",,");
        assert_eq!(text, "");
        assert_eq!(last, None);
    }

    #[test]
    fn long_lists_split_into_multiple_escapes() {
        let tokens = vec!["1"; 20].join(",");
        let (text, _) = escape_text(&tokens);
        assert_eq!(text.matches('\x1b').count(), 2);
        assert!(text.ends_with('m'));
    }
}
