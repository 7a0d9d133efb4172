//! Display-line assembly.
//!
//! Rendering runs in two passes: fixed-width segments first, so the
//! remaining terminal width is known, then the dynamic segments share
//! what is left in equal integer parts.  The finished line is composed
//! from the template (literals) and the assembly buffer (directives),
//! with an SGR reset tail when colour codes were left active and
//! trailing spaces when the line shrank under an unchanged terminal
//! width.

use pipemeter_core::Control;
use pipemeter_transfer::{Preview, TransferState};
use pipemeter_units::CountKind;

use crate::barstyle::BarStyleSet;
use crate::calc::Calculator;
use crate::format::{render_directive, rendered_width, FeatureFlags, FormatterArgs};
use crate::segment::{parse_template, Directive, Segment, SegmentKind};
use crate::ASSEMBLY_BUFFER_SIZE;

/// Most trailing spaces ever appended to cover a shrinking line.
const SHRINK_PAD_MAX: usize = 15;

fn probe_colour_support(force: bool) -> bool {
    if force {
        return true;
    }
    match std::env::var("TERM") {
        Ok(term) => !term.is_empty() && term != "dumb",
        Err(_) => false,
    }
}

fn probe_utf8_support() -> bool {
    for variable in ["LC_ALL", "LC_CTYPE", "LANG"] {
        if let Ok(value) = std::env::var(variable) {
            if !value.is_empty() {
                let lowered = value.to_lowercase();
                return lowered.contains("utf-8") || lowered.contains("utf8");
            }
        }
    }
    false
}

/// Parsed format plus everything remembered between renders.
#[derive(Debug)]
pub struct DisplayState {
    template: String,
    segments: Vec<Segment>,
    pub flags: FeatureFlags,
    styles: BarStyleSet,

    pub count_type: CountKind,
    /// Position the monitor started from, subtracted from ETA maths.
    pub initial_offset: u64,
    /// Whether any progress output has reached the terminal.
    pub output_produced: bool,

    display_buffer: Vec<u8>,
    display_string_width: usize,
    prev_screen_width: u16,

    colour_permitted: bool,
    terminal_supports_colour: bool,
    terminal_supports_utf8: bool,
}

impl DisplayState {
    #[must_use]
    pub fn new(control: &Control) -> Self {
        Self {
            template: String::new(),
            segments: Vec::new(),
            flags: FeatureFlags::default(),
            styles: BarStyleSet::new(),
            count_type: CountKind::Bytes,
            initial_offset: 0,
            output_produced: false,
            display_buffer: Vec::new(),
            display_string_width: 0,
            prev_screen_width: 0,
            colour_permitted: true,
            terminal_supports_colour: probe_colour_support(control.force),
            terminal_supports_utf8: probe_utf8_support(),
        }
    }

    /// The finished status line.
    #[must_use]
    pub fn line(&self) -> &[u8] {
        &self.display_buffer
    }

    /// Width of the finished line in display cells.
    #[must_use]
    pub fn line_width(&self) -> usize {
        self.display_string_width
    }

    /// True when the template has been parsed.
    #[must_use]
    pub fn initialised(&self) -> bool {
        !self.segments.is_empty() || !self.template.is_empty()
    }

    fn count_type_for(control: &Control) -> CountKind {
        if control.line_mode {
            CountKind::Lines
        } else if control.decimal_units {
            CountKind::DecimalBytes
        } else {
            CountKind::Bytes
        }
    }

    /// Parses (or re-parses) the template and runs the zero pass so the
    /// feature flags reflect what the format needs.
    pub fn reinitialise(
        &mut self,
        control: &Control,
        transfer: &TransferState,
        preview: &Preview,
        calc: &Calculator,
    ) {
        self.template = control.template().to_owned();
        self.segments = parse_template(&self.template);
        self.flags = FeatureFlags::default();
        self.styles.clear();
        self.count_type = Self::count_type_for(control);

        let mut assembly = Vec::new();
        for index in 0..self.segments.len() {
            let SegmentKind::Directive(directive) = self.segments[index].kind else {
                continue;
            };
            let mut segment = self.segments[index].clone();
            let mut args = FormatterArgs {
                control,
                transfer,
                preview,
                calc,
                flags: &mut self.flags,
                styles: &mut self.styles,
                template: &self.template,
                count_type: self.count_type,
                initial_offset: self.initial_offset,
                final_update: false,
                colour_permitted: self.colour_permitted,
                terminal_supports_colour: self.terminal_supports_colour,
                terminal_supports_utf8: self.terminal_supports_utf8,
                zero_pass: true,
            };
            let _ = render_directive(directive, &mut args, &mut segment, &mut assembly);
            self.segments[index] = segment;
        }
    }

    /// Renders the status line for the current state.  Returns false
    /// only when there is no template at all.
    pub fn render(
        &mut self,
        control: &Control,
        transfer: &TransferState,
        preview: &Preview,
        calc: &Calculator,
        final_update: bool,
    ) -> bool {
        if !self.initialised() {
            return false;
        }

        self.count_type = Self::count_type_for(control);
        self.flags.sgr_code_active = false;

        let mut assembly: Vec<u8> = Vec::with_capacity(ASSEMBLY_BUFFER_SIZE.min(1024));

        let mut static_portion_width = 0usize;
        let mut dynamic_segment_count = 0usize;

        // First pass: everything whose width is already known.
        for index in 0..self.segments.len() {
            let directive = match self.segments[index].kind {
                SegmentKind::Literal { .. } => {
                    static_portion_width += self.segments[index].width;
                    continue;
                }
                SegmentKind::Directive(directive) => directive,
            };

            if directive.is_dynamic() && self.segments[index].chosen_size == 0 {
                dynamic_segment_count += 1;
                continue;
            }

            let mut segment = self.segments[index].clone();
            segment.width = segment.chosen_size;
            segment.offset = 0;
            segment.bytes = 0;
            let added = self.run_formatter(
                directive,
                control,
                transfer,
                preview,
                calc,
                final_update,
                &mut segment,
                &mut assembly,
            );
            segment.width = if added > 0 {
                rendered_width(&assembly, &segment)
            } else {
                0
            };
            static_portion_width += segment.width;
            self.segments[index] = segment;
        }

        // Second pass: the dynamic segments share what is left.
        let mut dynamic_segment_width =
            (control.width as usize).saturating_sub(static_portion_width);
        if dynamic_segment_count > 1 {
            dynamic_segment_width /= dynamic_segment_count;
        }

        for index in 0..self.segments.len() {
            let SegmentKind::Directive(directive) = self.segments[index].kind else {
                continue;
            };
            if !directive.is_dynamic() || self.segments[index].chosen_size != 0 {
                continue;
            }

            let mut segment = self.segments[index].clone();
            segment.width = dynamic_segment_width;
            segment.offset = 0;
            segment.bytes = 0;
            let added = self.run_formatter(
                directive,
                control,
                transfer,
                preview,
                calc,
                final_update,
                &mut segment,
                &mut assembly,
            );
            if added == 0 {
                segment.width = 0;
            }
            self.segments[index] = segment;
        }

        // Compose the line.
        let buffer_limit = 4 * control.width as usize
            + 80
            + control.name.as_deref().map_or(0, str::len)
            + 16;
        self.display_buffer.clear();
        let mut new_width = 0usize;

        for segment in &self.segments {
            if segment.bytes == 0 {
                continue;
            }
            if self.display_buffer.len() + segment.bytes > buffer_limit {
                continue;
            }
            match segment.kind {
                SegmentKind::Literal { start, len } => {
                    self.display_buffer
                        .extend_from_slice(&self.template.as_bytes()[start..start + len]);
                }
                SegmentKind::Directive(_) => {
                    self.display_buffer
                        .extend_from_slice(&assembly[segment.offset..segment.offset + segment.bytes]);
                }
            }
            new_width += segment.width;
        }

        if self.flags.sgr_code_active {
            self.display_buffer.extend_from_slice(b"\x1b[m");
            self.flags.sgr_code_active = false;
        }

        // When the line shrinks under the same terminal width, pad with
        // spaces so leftovers from the longer render are overwritten.
        if new_width < self.display_string_width && control.width >= self.prev_screen_width {
            let pad = (self.display_string_width - new_width).min(SHRINK_PAD_MAX);
            self.display_buffer.extend(std::iter::repeat(b' ').take(pad));
            new_width += pad;
        }

        self.display_string_width = new_width;
        self.prev_screen_width = control.width;

        true
    }

    #[allow(clippy::too_many_arguments)]
    fn run_formatter(
        &mut self,
        directive: Directive,
        control: &Control,
        transfer: &TransferState,
        preview: &Preview,
        calc: &Calculator,
        final_update: bool,
        segment: &mut Segment,
        assembly: &mut Vec<u8>,
    ) -> usize {
        let mut args = FormatterArgs {
            control,
            transfer,
            preview,
            calc,
            flags: &mut self.flags,
            styles: &mut self.styles,
            template: &self.template,
            count_type: self.count_type,
            initial_offset: self.initial_offset,
            final_update,
            colour_permitted: self.colour_permitted,
            terminal_supports_colour: self.terminal_supports_colour,
            terminal_supports_utf8: self.terminal_supports_utf8,
            zero_pass: false,
        };
        render_directive(directive, &mut args, segment, assembly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::width::display_width;
    use pipemeter_transfer::TransferState;

    fn fixture(template: &str, size: u64, width: u16) -> (Control, TransferState, Preview, Calculator, DisplayState) {
        let mut control = Control::default();
        control.format_string = Some(template.to_owned());
        control.size = size;
        control.width = width;
        let transfer = TransferState::new();
        let preview = Preview::new();
        let calc = Calculator::new(&control);
        let mut state = DisplayState::new(&control);
        state.reinitialise(&control, &transfer, &preview, &calc);
        (control, transfer, preview, calc, state)
    }

    fn render_line(
        control: &Control,
        transfer: &TransferState,
        preview: &Preview,
        calc: &Calculator,
        state: &mut DisplayState,
    ) -> String {
        assert!(state.render(control, transfer, preview, calc, false));
        String::from_utf8_lossy(state.line()).into_owned()
    }

    #[test]
    fn literal_only_template_renders_verbatim() {
        let (control, transfer, preview, calc, mut state) = fixture("plain text", 0, 80);
        let line = render_line(&control, &transfer, &preview, &calc, &mut state);
        assert_eq!(line, "plain text");
    }

    #[test]
    fn parse_render_reparse_is_a_fixed_point_without_dynamic_segments() {
        let (control, transfer, preview, calc, mut state) = fixture("copying %% done", 0, 80);
        let first = render_line(&control, &transfer, &preview, &calc, &mut state);
        assert_eq!(first, "copying % done");

        let mut reparse_control = control.clone();
        reparse_control.format_string = Some(first.clone());
        let mut restate = DisplayState::new(&reparse_control);
        restate.reinitialise(&reparse_control, &transfer, &preview, &calc);
        let second = render_line(&reparse_control, &transfer, &preview, &calc, &mut restate);
        assert_eq!(second, first);
    }

    #[test]
    fn transferred_bytes_render() {
        let (control, mut transfer, preview, calc, mut state) = fixture("%b", 0, 80);
        transfer.transferred = 2048;
        let line = render_line(&control, &transfer, &preview, &calc, &mut state);
        assert_eq!(line, "2.00KiB");
    }

    #[test]
    fn timer_renders_clock() {
        let (control, mut transfer, preview, calc, mut state) = fixture("%t", 0, 80);
        transfer.elapsed_seconds = 125.0;
        let line = render_line(&control, &transfer, &preview, &calc, &mut state);
        assert_eq!(line, "0:02:05");
    }

    #[test]
    fn progress_bar_fills_the_terminal_width() {
        let (control, mut transfer, preview, mut calc, mut state) = fixture("%p", 100, 40);
        transfer.transferred = 50;
        calc.update(&control, 50, 1.0, 0, false);
        let line = render_line(&control, &transfer, &preview, &calc, &mut state);
        assert_eq!(display_width(line.as_bytes()), 40);
        assert!(line.starts_with('['));
        assert!(line.contains('='));
        assert!(line.ends_with(" 50%"));
        assert!(line.contains('>'));
    }

    #[test]
    fn unknown_size_bar_shows_indicator() {
        let (control, mut transfer, preview, mut calc, mut state) = fixture("%p", 0, 40);
        transfer.transferred = 1000;
        calc.update(&control, 1000, 1.0, 0, false);
        let line = render_line(&control, &transfer, &preview, &calc, &mut state);
        assert!(line.contains("<=>"));
        assert_eq!(display_width(line.as_bytes()), 40);
    }

    #[test]
    fn rendered_line_never_exceeds_terminal_width() {
        // Narrower terminals than the fixed segments need will overflow
        // just as the template would; the bound applies once the fixed
        // portion fits.
        for width in [70u16, 80, 132, 200] {
            let (mut control, mut transfer, preview, mut calc, mut state) =
                fixture("%N %b %t %r %a %p %e", 1000, width);
            control.name = Some("data".to_owned());
            transfer.transferred = 400;
            transfer.elapsed_seconds = 2.0;
            calc.update(&control, 400, 2.0, 0, false);
            let line = render_line(&control, &transfer, &preview, &calc, &mut state);
            assert!(
                display_width(line.as_bytes()) <= width as usize,
                "width {width}: {line:?}"
            );
        }
    }

    #[test]
    fn zero_pass_sets_feature_flags() {
        let (_, _, _, _, state) = fixture("%t %r %b %20A %L", 0, 80);
        assert!(state.flags.showing_timer);
        assert!(state.flags.showing_rate);
        assert!(state.flags.showing_bytes);
        assert!(state.flags.showing_last_written);
        assert!(state.flags.showing_previous_line);
        assert_eq!(state.flags.lastwritten_request, 20);
    }

    #[test]
    fn shrinking_line_pads_with_spaces() {
        let (mut control, mut transfer, preview, calc, mut state) = fixture("%b", 0, 80);
        control.numeric = true;
        transfer.transferred = 1_500_000;
        let long = render_line(&control, &transfer, &preview, &calc, &mut state);
        assert_eq!(long, "1500000");

        let mut small_transfer = TransferState::new();
        small_transfer.transferred = 5;
        let short = render_line(&control, &small_transfer, &preview, &calc, &mut state);
        // Six spaces cover the residue of the longer render.
        assert_eq!(short, "5      ");
    }

    #[test]
    fn numeric_mode_renders_bare_percentage() {
        let mut control = Control::default();
        control.format_string = Some("%{progress-amount-only}".to_owned());
        control.numeric = true;
        control.size = 100;
        control.width = 80;
        let mut transfer = TransferState::new();
        transfer.transferred = 42;
        let preview = Preview::new();
        let mut calc = Calculator::new(&control);
        calc.update(&control, 42, 1.0, 0, false);
        let mut state = DisplayState::new(&control);
        state.reinitialise(&control, &transfer, &preview, &calc);
        let line = render_line(&control, &transfer, &preview, &calc, &mut state);
        assert_eq!(line, "42");
    }
}
