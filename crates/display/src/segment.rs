//! Format-template parsing.
//!
//! A template is a byte string of literal runs and `%` directives.  A
//! directive is `%` plus either a single letter or a braced name with an
//! optional `:argument`, optionally preceded by a decimal size.  `%%`
//! collapses to a literal percent sign and anything unrecognised passes
//! through verbatim.

use crate::width::display_width;
use crate::FORMAT_SEGMENTS_MAX;

/// Widest value a directive's size prefix may request.
pub const CHOSEN_SIZE_MAX: usize = u16::MAX as usize;

/// Every directive the formatter knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Bar with sides and a trailing percentage or rate.
    Progress,
    /// Bar body only, in the default style.
    ProgressBarOnly,
    /// Only the number after the bar.
    ProgressAmountOnly,
    BarPlain,
    BarBlock,
    BarGranular,
    BarShaded,
    Timer,
    Eta,
    FinEta,
    Rate,
    AverageRate,
    Bytes,
    BufferPercent,
    LastWritten,
    PreviousLine,
    Name,
    Sgr,
}

impl Directive {
    /// Whether the directive takes a share of the remaining width when
    /// no explicit size was chosen.
    #[must_use]
    pub fn is_dynamic(self) -> bool {
        matches!(
            self,
            Directive::Progress
                | Directive::ProgressBarOnly
                | Directive::BarPlain
                | Directive::BarBlock
                | Directive::BarGranular
                | Directive::BarShaded
                | Directive::PreviousLine
        )
    }

    fn from_letter(letter: u8) -> Option<Self> {
        Some(match letter {
            b'p' => Directive::Progress,
            b't' => Directive::Timer,
            b'e' => Directive::Eta,
            b'I' => Directive::FinEta,
            b'r' => Directive::Rate,
            b'a' => Directive::AverageRate,
            b'b' => Directive::Bytes,
            b'T' => Directive::BufferPercent,
            b'A' => Directive::LastWritten,
            b'L' => Directive::PreviousLine,
            b'N' => Directive::Name,
            _ => return None,
        })
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "progress" => Directive::Progress,
            "progress-bar-only" => Directive::ProgressBarOnly,
            "progress-amount-only" => Directive::ProgressAmountOnly,
            "bar-plain" => Directive::BarPlain,
            "bar-block" => Directive::BarBlock,
            "bar-granular" => Directive::BarGranular,
            "bar-shaded" => Directive::BarShaded,
            "timer" => Directive::Timer,
            "eta" => Directive::Eta,
            "fineta" => Directive::FinEta,
            "rate" => Directive::Rate,
            "average-rate" => Directive::AverageRate,
            "bytes" | "transferred" => Directive::Bytes,
            "buffer-percent" => Directive::BufferPercent,
            "last-written" => Directive::LastWritten,
            "previous-line" => Directive::PreviousLine,
            "name" => Directive::Name,
            "sgr" => Directive::Sgr,
            _ => return None,
        })
    }
}

/// What one parsed segment renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// A byte range of the template, copied verbatim.
    Literal { start: usize, len: usize },
    Directive(Directive),
}

/// One parsed segment plus its per-render slots in the assembly buffer.
#[derive(Debug, Clone)]
pub struct Segment {
    pub kind: SegmentKind,
    /// Size prefix from the template; 0 means unconstrained.
    pub chosen_size: usize,
    /// Byte range of the `:argument` within the template, if any.
    pub argument: Option<(usize, usize)>,
    /// Loaded bar-style slot (1-based); 0 until a bar directive picks.
    pub parameter: u8,
    /// Start of this segment's content in the assembly buffer.
    pub offset: usize,
    /// Content length in bytes.
    pub bytes: usize,
    /// Content width in display cells.
    pub width: usize,
}

impl Segment {
    fn literal(template: &str, start: usize, len: usize) -> Self {
        Self {
            kind: SegmentKind::Literal { start, len },
            chosen_size: 0,
            argument: None,
            parameter: 0,
            offset: 0,
            bytes: len,
            width: display_width(&template.as_bytes()[start..start + len]),
        }
    }

    fn directive(directive: Directive, chosen_size: usize, argument: Option<(usize, usize)>) -> Self {
        Self {
            kind: SegmentKind::Directive(directive),
            chosen_size,
            argument,
            parameter: 0,
            offset: 0,
            bytes: 0,
            width: 0,
        }
    }
}

/// Parses a template into its ordered segments.
#[must_use]
pub fn parse_template(template: &str) -> Vec<Segment> {
    let bytes = template.as_bytes();
    let mut segments: Vec<Segment> = Vec::new();
    let mut position = 0;

    while position < bytes.len() && segments.len() < FORMAT_SEGMENTS_MAX {
        if bytes[position] != b'%' {
            let run = memchr::memchr(b'%', &bytes[position..]).unwrap_or(bytes.len() - position);
            segments.push(Segment::literal(template, position, run));
            position += run;
            continue;
        }

        let percent_offset = position;
        position += 1;

        // Optional decimal size prefix.
        let digits_start = position;
        while position < bytes.len() && bytes[position].is_ascii_digit() {
            position += 1;
        }
        let chosen_size = template[digits_start..position]
            .parse::<usize>()
            .unwrap_or(0)
            .min(CHOSEN_SIZE_MAX);

        if position >= bytes.len() {
            // A trailing "%" (or "%123") passes through verbatim.
            segments.push(Segment::literal(
                template,
                percent_offset,
                bytes.len() - percent_offset,
            ));
            break;
        }

        if bytes[position] == b'%' && position == percent_offset + 1 {
            // "%%" collapses to "%".
            segments.push(Segment::literal(template, percent_offset, 1));
            position += 1;
            continue;
        }

        if bytes[position] == b'{' {
            // Scan for the closing brace; '%' or end of string aborts.
            let body_start = position + 1;
            let mut scan = body_start;
            while scan < bytes.len() && bytes[scan] != b'}' && bytes[scan] != b'%' {
                scan += 1;
            }

            if scan >= bytes.len() || bytes[scan] == b'%' {
                // Unclosed sequence: emit it verbatim and let a '%'
                // start over as the next segment.
                segments.push(Segment::literal(
                    template,
                    percent_offset,
                    scan - percent_offset,
                ));
                position = scan;
                continue;
            }

            let body = &template[body_start..scan];
            let (name, argument) = match body.find(':') {
                Some(colon) => (
                    &body[..colon],
                    Some((body_start + colon + 1, scan - (body_start + colon + 1))),
                ),
                None => (body, None),
            };

            match Directive::from_name(name) {
                Some(directive) => {
                    segments.push(Segment::directive(directive, chosen_size, argument));
                }
                None => {
                    segments.push(Segment::literal(
                        template,
                        percent_offset,
                        scan + 1 - percent_offset,
                    ));
                }
            }
            position = scan + 1;
            continue;
        }

        // Single-letter directive.
        match Directive::from_letter(bytes[position]) {
            Some(directive) => {
                segments.push(Segment::directive(directive, chosen_size, None));
            }
            None => {
                segments.push(Segment::literal(
                    template,
                    percent_offset,
                    position + 1 - percent_offset,
                ));
            }
        }
        position += 1;
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(template: &str) -> Vec<SegmentKind> {
        parse_template(template)
            .into_iter()
            .map(|segment| segment.kind)
            .collect()
    }

    #[test]
    fn plain_text_is_one_literal() {
        let segments = parse_template("just text");
        assert_eq!(segments.len(), 1);
        assert_eq!(
            segments[0].kind,
            SegmentKind::Literal { start: 0, len: 9 }
        );
        assert_eq!(segments[0].width, 9);
    }

    #[test]
    fn letters_and_braced_names_agree() {
        assert_eq!(
            kinds("%p"),
            vec![SegmentKind::Directive(Directive::Progress)]
        );
        assert_eq!(
            kinds("%{progress}"),
            vec![SegmentKind::Directive(Directive::Progress)]
        );
        assert_eq!(
            kinds("%{transferred}"),
            vec![SegmentKind::Directive(Directive::Bytes)]
        );
    }

    #[test]
    fn default_template_shape() {
        let segments = parse_template("%N %b %t %r %a %p %e");
        let directives = segments
            .iter()
            .filter(|segment| matches!(segment.kind, SegmentKind::Directive(_)))
            .count();
        assert_eq!(directives, 7);
        // Six separating spaces.
        let literals = segments.len() - directives;
        assert_eq!(literals, 6);
    }

    #[test]
    fn double_percent_collapses() {
        let segments = parse_template("100%% done");
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].kind, SegmentKind::Literal { start: 0, len: 3 });
        assert_eq!(segments[1].kind, SegmentKind::Literal { start: 3, len: 1 });
        assert_eq!(segments[2].kind, SegmentKind::Literal { start: 5, len: 5 });
    }

    #[test]
    fn unknown_sequences_pass_through() {
        let segments = parse_template("%x");
        assert_eq!(segments[0].kind, SegmentKind::Literal { start: 0, len: 2 });
        let segments = parse_template("%{nonesuch}");
        assert_eq!(segments[0].kind, SegmentKind::Literal { start: 0, len: 11 });
    }

    #[test]
    fn trailing_percent_is_literal() {
        let segments = parse_template("done %");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].kind, SegmentKind::Literal { start: 5, len: 1 });
    }

    #[test]
    fn unclosed_brace_stops_at_next_percent() {
        let segments = parse_template("%{foo%p");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].kind, SegmentKind::Literal { start: 0, len: 5 });
        assert_eq!(
            segments[1].kind,
            SegmentKind::Directive(Directive::Progress)
        );
    }

    #[test]
    fn size_prefix_is_captured() {
        let segments = parse_template("%20A");
        assert_eq!(
            segments[0].kind,
            SegmentKind::Directive(Directive::LastWritten)
        );
        assert_eq!(segments[0].chosen_size, 20);

        let segments = parse_template("%12{name}");
        assert_eq!(segments[0].kind, SegmentKind::Directive(Directive::Name));
        assert_eq!(segments[0].chosen_size, 12);
    }

    #[test]
    fn sgr_argument_is_sliced() {
        let template = "%{sgr:bold,red}";
        let segments = parse_template(template);
        assert_eq!(segments[0].kind, SegmentKind::Directive(Directive::Sgr));
        let (start, len) = segments[0].argument.expect("argument");
        assert_eq!(&template[start..start + len], "bold,red");
    }

    #[test]
    fn dynamic_classification() {
        assert!(Directive::Progress.is_dynamic());
        assert!(Directive::PreviousLine.is_dynamic());
        assert!(Directive::BarShaded.is_dynamic());
        assert!(!Directive::Timer.is_dynamic());
        assert!(!Directive::ProgressAmountOnly.is_dynamic());
        assert!(!Directive::LastWritten.is_dynamic());
    }

    #[test]
    fn segment_count_is_bounded() {
        let template = "%p".repeat(FORMAT_SEGMENTS_MAX + 50);
        assert_eq!(parse_template(&template).len(), FORMAT_SEGMENTS_MAX);
    }
}
