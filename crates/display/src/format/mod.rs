//! The formatter set.
//!
//! Every directive renders through the same narrow contract: given the
//! shared context it appends its content to the assembly buffer and
//! records the segment's slot.  A zero pass (no buffer) still runs each
//! formatter for its side effects, which is how the engine learns which
//! accumulators the format needs.

mod bar;
mod quantity;
mod sgr;
mod text;
mod time;

use pipemeter_core::Control;
use pipemeter_transfer::{Preview, TransferState};
use pipemeter_units::CountKind;

use crate::barstyle::BarStyleSet;
use crate::calc::Calculator;
use crate::segment::{Directive, Segment};
use crate::width::display_width;
use crate::ASSEMBLY_BUFFER_SIZE;

/// Which display features the parsed format uses.  Set during the zero
/// pass and read by the transfer loop to switch on the matching
/// bookkeeping.
#[derive(Debug, Default, Clone)]
pub struct FeatureFlags {
    pub showing_timer: bool,
    pub showing_bytes: bool,
    pub showing_rate: bool,
    pub showing_last_written: bool,
    pub showing_previous_line: bool,
    pub format_uses_colour: bool,
    /// Largest last-written window any segment asked for.
    pub lastwritten_request: usize,
    /// SGR codes were emitted and not reset; the assembler appends a
    /// reset tail.
    pub sgr_code_active: bool,
}

/// Everything a formatter may look at while rendering one segment.
pub struct FormatterArgs<'a> {
    pub control: &'a Control,
    pub transfer: &'a TransferState,
    pub preview: &'a Preview,
    pub calc: &'a Calculator,
    pub flags: &'a mut FeatureFlags,
    pub styles: &'a mut BarStyleSet,
    /// The parsed template, for argument slices.
    pub template: &'a str,
    pub count_type: CountKind,
    pub initial_offset: u64,
    pub final_update: bool,
    pub colour_permitted: bool,
    pub terminal_supports_colour: bool,
    pub terminal_supports_utf8: bool,
    /// Side-effects-only pass: set flags, produce no output.
    pub zero_pass: bool,
}

impl FormatterArgs<'_> {
    /// The segment's `:argument` text, if any.
    #[must_use]
    pub fn argument(&self, segment: &Segment) -> Option<&str> {
        segment
            .argument
            .map(|(start, len)| &self.template[start..start + len])
    }
}

/// Appends `content` to the assembly buffer if it fits, recording the
/// segment's slot.  Content that does not fit is dropped whole, never
/// truncated, so a segment's bytes never exceed its reserved slot.
pub(crate) fn commit(content: &[u8], segment: &mut Segment, assembly: &mut Vec<u8>) -> usize {
    let offset = assembly.len();
    segment.offset = offset;
    segment.bytes = 0;

    if content.is_empty()
        || offset >= ASSEMBLY_BUFFER_SIZE
        || offset + content.len() >= ASSEMBLY_BUFFER_SIZE
    {
        return 0;
    }

    assembly.extend_from_slice(content);
    segment.bytes = content.len();
    content.len()
}

/// Renders one directive segment, returning the bytes appended to the
/// assembly buffer.
pub fn render_directive(
    directive: Directive,
    args: &mut FormatterArgs<'_>,
    segment: &mut Segment,
    assembly: &mut Vec<u8>,
) -> usize {
    match directive {
        Directive::Progress => bar::progress(args, segment, assembly),
        Directive::ProgressBarOnly => bar::bar_only(args, segment, assembly, None),
        Directive::ProgressAmountOnly => bar::amount_only(args, segment, assembly),
        Directive::BarPlain => bar::bar_only(args, segment, assembly, Some("plain")),
        Directive::BarBlock => bar::bar_only(args, segment, assembly, Some("block")),
        Directive::BarGranular => bar::bar_only(args, segment, assembly, Some("granular")),
        Directive::BarShaded => bar::bar_only(args, segment, assembly, Some("shaded")),
        Directive::Timer => time::timer(args, segment, assembly),
        Directive::Eta => time::eta(args, segment, assembly),
        Directive::FinEta => time::fineta(args, segment, assembly),
        Directive::Rate => quantity::rate(args, segment, assembly),
        Directive::AverageRate => quantity::average_rate(args, segment, assembly),
        Directive::Bytes => quantity::bytes(args, segment, assembly),
        Directive::BufferPercent => quantity::buffer_percent(args, segment, assembly),
        Directive::LastWritten => text::last_written(args, segment, assembly),
        Directive::PreviousLine => text::previous_line(args, segment, assembly),
        Directive::Name => text::name(args, segment, assembly),
        Directive::Sgr => sgr::sgr(args, segment, assembly),
    }
}

/// Width in display cells of the content a segment just rendered.
pub(crate) fn rendered_width(assembly: &[u8], segment: &Segment) -> usize {
    display_width(&assembly[segment.offset..segment.offset + segment.bytes])
}
