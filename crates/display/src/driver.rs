//! Emission decisions: when the rendered line actually reaches the
//! terminal, and how each refresh is terminated.

use pipemeter_core::{report, signal, terminal, Control};
use pipemeter_transfer::{Preview, TransferState};

use crate::calc::Calculator;
use crate::render::DisplayState;

/// Applies the zero-pass feature decisions to the engine's preview
/// accumulators: the display decides what to track, the engine does the
/// tracking.
fn apply_preview_tracking(state: &DisplayState, preview: &mut Preview) {
    preview.track_previous_line = state.flags.showing_previous_line;
    preview.track_last_written = state.flags.showing_last_written;
    preview.request_lastwritten(state.flags.lastwritten_request);
}

/// Parses the template ahead of the first refresh so the engine tracks
/// the right accumulators from the first byte.
pub fn prepare(
    control: &Control,
    transfer: &TransferState,
    preview: &mut Preview,
    calc: &Calculator,
    state: &mut DisplayState,
) {
    state.reinitialise(control, transfer, preview, calc);
    apply_preview_tracking(state, preview);
}

/// One display refresh: recalculate, re-render, and emit if permitted.
///
/// Output is produced only when forced or when this process is the
/// terminal's foreground group.  Numeric mode terminates each refresh
/// with a newline; everything else uses a carriage return so the next
/// refresh overwrites the same line.
pub fn refresh(
    control: &Control,
    transfer: &TransferState,
    preview: &mut Preview,
    calc: &mut Calculator,
    state: &mut DisplayState,
    final_update: bool,
) {
    signal::check_background();

    calc.update(
        control,
        transfer.transferred,
        transfer.elapsed_seconds,
        state.initial_offset,
        final_update,
    );

    if signal::take_reparse() || !state.initialised() {
        state.reinitialise(control, transfer, preview, calc);
        apply_preview_tracking(state, preview);
    }

    if !state.render(control, transfer, preview, calc, final_update) {
        return;
    }

    tracing::debug!(line = %String::from_utf8_lossy(state.line()), "display");

    if control.numeric {
        terminal::tty_write(state.line());
        terminal::tty_write(b"\n");
        state.output_produced = true;
        report::note_output_produced();
    } else if control.force || terminal::in_foreground() {
        terminal::tty_write(state.line());
        terminal::tty_write(b"\r");
        state.output_produced = true;
        report::note_output_produced();
    }
}

/// Recalculates without rendering, for `--no-display` runs that still
/// want final statistics.
pub fn refresh_calculations_only(
    control: &Control,
    transfer: &TransferState,
    calc: &mut Calculator,
    state: &DisplayState,
    final_update: bool,
) {
    calc.update(
        control,
        transfer.transferred,
        transfer.elapsed_seconds,
        state.initial_offset,
        final_update,
    );
}
