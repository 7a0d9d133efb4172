//! The transfer loop: one pass per iteration through budget, engine,
//! accounting, file advance, and display cadence.

use std::os::fd::RawFd;
use std::time::{Duration, Instant};

use pipemeter_core::{report, signal, terminal, Clock, Control, ExitStatus};
use pipemeter_display::{driver, Calculator, DisplayState};
use pipemeter_transfer::{fd, Engine, PipeDepth, Preview, RateLimiter, TransferState};
use pipemeter_transfer::{BUFFER_SIZE, BUFFER_SIZE_MAX};

use crate::files::{open_next, OpenInput};
use crate::options::InputSpec;

/// Pause while end-of-file waits on an undrained output pipe.
const DRAIN_WAIT: Duration = Duration::from_millis(50);

/// Derives the transfer buffer size from the output block size when the
/// user did not choose one.
fn resolve_buffer_size(control: &mut Control, output_fd: RawFd) {
    if control.target_buffer_size == 0 {
        if let Some(block) = fd::block_size(output_fd) {
            control.target_buffer_size = ((block as usize) * 32).min(BUFFER_SIZE_MAX);
        }
    }
    if control.target_buffer_size == 0 {
        control.target_buffer_size = BUFFER_SIZE;
    }
}

/// Re-reads the terminal size after a resize signal, keeping any
/// user-pinned dimension.
fn resize_display(control: &mut Control) {
    let Some((width, height)) = terminal::screen_size() else {
        return;
    };
    if !control.width_set_manually {
        control.width = width;
    }
    if !control.height_set_manually {
        control.height = height;
    }
}

/// Readies a freshly opened input: sequential read-ahead advice and a
/// pending direct-I/O application.
fn prime_input(control: &Control, state: &mut TransferState, input: &OpenInput) {
    fd::advise_sequential(input.fd());
    if control.direct_io {
        state.direct_pending = true;
    }
}

/// The end-of-run `min/avg/max/mdev` summary.
fn show_stats(control: &Control, calc: &Calculator) {
    if !control.show_stats {
        return;
    }
    if calc.measurements_taken == 0 {
        terminal::tty_write(b"rate not measured\n");
        return;
    }
    let unit = if control.bits { "b/s" } else { "B/s" };
    let line = format!(
        "rate min/avg/max/mdev = {:.3}/{:.3}/{:.3}/{:.3} {unit}\n",
        calc.rate_min,
        calc.rate_mean(),
        calc.rate_max,
        calc.rate_deviation(),
    );
    terminal::tty_write(line.as_bytes());
}

/// Runs the whole transfer.  Returns when every input is exhausted and
/// the final display update has been emitted, or on a fatal error or
/// termination signal.
pub fn run(
    control: &mut Control,
    inputs: &[InputSpec],
    output_fd: RawFd,
    status: &mut ExitStatus,
) {
    let mut state = TransferState::new();
    let mut preview = Preview::new();
    let mut calc = Calculator::new(control);
    let mut display = DisplayState::new(control);

    let mut pipe_depth = PipeDepth::probe(output_fd);

    let Some((mut input, mut file_index)) = open_next(inputs, 0, status) else {
        return;
    };
    prime_input(control, &mut state, &input);
    if control.direct_io {
        if let Err(error) = fd::set_direct_io(output_fd, true) {
            tracing::debug!(%error, "direct I/O on output failed");
        }
    }
    resolve_buffer_size(control, output_fd);

    driver::prepare(control, &state, &mut preview, &calc, &mut display);

    let mut clock = Clock::start();
    let now = Instant::now();
    let mut limiter = (control.rate_limit > 0)
        .then(|| RateLimiter::new(control.rate_limit, now));

    let first_delay = if control.delay_start > control.interval {
        control.delay_start
    } else {
        control.interval
    };
    let mut next_update = now + Duration::from_secs_f64(first_delay);
    let interval = Duration::from_secs_f64(control.interval);

    let mut eof_in = false;
    let mut eof_out = false;
    let mut final_update = false;
    let mut waiting_for_first = control.wait_for_first_byte;

    while !(eof_in && eof_out) || !final_update {
        if signal::exit_requested() {
            break;
        }

        let mut allowed = 0u64;
        if let Some(limiter) = limiter.as_mut() {
            allowed = limiter.allowed(Instant::now());
        }

        // With stop-at-size, never hand the engine more budget than the
        // declared size leaves.
        if control.size > 0 && control.stop_at_size {
            let remaining = control.size.saturating_sub(state.total_written);
            if remaining < allowed || (allowed == 0 && control.rate_limit == 0) {
                allowed = remaining;
                if allowed == 0 {
                    eof_in = true;
                    eof_out = true;
                }
            }
        }

        let mut lines_written = 0u64;
        let written = if eof_in && eof_out && allowed == 0 && control.stop_at_size {
            0
        } else {
            let mut engine = Engine::new(
                control,
                output_fd,
                input.name(),
                &mut state,
                &mut preview,
                status,
            );
            match engine.transfer(
                input.fd(),
                &mut eof_in,
                &mut eof_out,
                allowed,
                &mut lines_written,
            ) {
                Ok(written) => written,
                Err(error) => {
                    tracing::debug!(%error, "transfer ended on fatal error");
                    return;
                }
            }
        };

        if control.line_mode {
            state.total_written += lines_written;
            if let Some(limiter) = limiter.as_mut() {
                limiter.consume(lines_written);
            }
        } else {
            state.total_written += written;
            if let Some(limiter) = limiter.as_mut() {
                limiter.consume(written);
            }
        }

        // How much of what we wrote is still sitting in the output pipe.
        if let Some(depth) = pipe_depth.as_mut() {
            state.written_but_not_consumed = if signal::pipe_closed() {
                0
            } else {
                depth.unread()
            };
        }

        state.transferred = state.total_written;
        if pipe_depth.is_some() {
            if !control.line_mode {
                state.transferred = state
                    .total_written
                    .saturating_sub(state.written_but_not_consumed);
            } else if state.written_but_not_consumed > 0 {
                if let Some(ring) = state.line_positions.as_ref() {
                    let last_consumed = state
                        .last_output_position
                        .saturating_sub(state.written_but_not_consumed);
                    let unconsumed_lines = ring.lines_after(last_consumed);
                    state.transferred =
                        state.total_written.saturating_sub(unconsumed_lines);
                }
            }
        }

        // This input is spent and more remain: move along.
        while eof_in && eof_out && file_index + 1 < inputs.len() {
            match open_next(inputs, file_index + 1, status) {
                Some((next_input, next_index)) => {
                    input = next_input;
                    file_index = next_index;
                    eof_in = false;
                    eof_out = false;
                    prime_input(control, &mut state, &input);
                }
                None => {
                    file_index = inputs.len();
                    break;
                }
            }
        }

        let now = Instant::now();

        if eof_in && eof_out && state.written_but_not_consumed == 0 {
            final_update = true;
            if display.output_produced || control.delay_start < 0.001 {
                next_update = now;
            }
        }

        // Everything is written but the consumer has not caught up;
        // don't spin while the pipe drains.
        if eof_in && eof_out && state.written_but_not_consumed > 0 {
            std::thread::sleep(DRAIN_WAIT);
        }

        if waiting_for_first {
            let started = if control.line_mode {
                lines_written > 0
            } else {
                written > 0
            };
            if !started {
                continue;
            }
            waiting_for_first = false;

            // The elapsed clock starts from the first byte; a pause
            // edge must not interleave with the reset.
            signal::block_pause();
            clock.restart();
            signal::clear_stoppage();
            signal::allow_pause();

            next_update = Instant::now() + interval;
        }

        state.elapsed_seconds = clock.elapsed_seconds(signal::total_stoppage());

        if control.no_display && !control.show_stats {
            continue;
        }

        if now < next_update {
            continue;
        }
        next_update += interval;
        if next_update < now {
            next_update = now;
        }

        if signal::take_resize() {
            resize_display(control);
        }

        if control.no_display {
            driver::refresh_calculations_only(control, &state, &mut calc, &display, final_update);
        } else {
            driver::refresh(
                control,
                &state,
                &mut preview,
                &mut calc,
                &mut display,
                final_update,
            );
        }
    }

    if !control.numeric && !control.no_display && display.output_produced {
        terminal::tty_write(b"\n");
    }

    if signal::exit_requested() {
        status.set(ExitStatus::SIGNAL);
    }

    // Sparse output: the zeros we skipped become a trailing hole.
    if control.sparse_output && !state.output_not_seekable && pipe_depth.is_none() {
        if let Ok(position) = fd::seek_current(output_fd, 0) {
            if let Err(error) = fd::truncate(output_fd, position) {
                report::error(&format!("cannot truncate output: {error}"));
                status.set(ExitStatus::TRANSFER);
            }
        }
    }

    show_stats(control, &calc);
}
