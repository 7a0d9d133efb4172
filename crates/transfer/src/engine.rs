//! One transfer pass: a bounded read attempt, a bounded write attempt,
//! and the accounting between them.

use std::io;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

use memchr::memrchr;
use pipemeter_core::{report, signal, Control, ExitStatus};

use crate::buffer::AlignedBuffer;
use crate::poll::{wait_ready, POLL_DEADLINE};
use crate::preview::Preview;
use crate::state::{LineRing, TransferState};
use crate::{
    fd, TransferError, MAX_READ_AT_ONCE, MAX_WRITE_AT_ONCE, TRANSFER_READ_TIMEOUT,
    TRANSFER_WRITE_TIMEOUT,
};

/// Outcome of one side of a pass: either it completed (possibly hitting
/// EOF), or a transient condition means the whole pass should end now
/// and report zero bytes.
enum Step {
    Done,
    Transient,
}

/// The transfer engine for one pass.  Borrows the loop's state for the
/// duration of the pass; nothing here outlives it.
pub struct Engine<'a> {
    control: &'a Control,
    output_fd: RawFd,
    file_name: &'a str,
    pub state: &'a mut TransferState,
    pub preview: &'a mut Preview,
    status: &'a mut ExitStatus,
}

impl<'a> Engine<'a> {
    pub fn new(
        control: &'a Control,
        output_fd: RawFd,
        file_name: &'a str,
        state: &'a mut TransferState,
        preview: &'a mut Preview,
        status: &'a mut ExitStatus,
    ) -> Self {
        Self {
            control,
            output_fd,
            file_name,
            state,
            preview,
            status,
        }
    }

    /// Moves data from `fd` towards the output, bounded to one read and
    /// one write attempt, writing at most `allowed` bytes when a rate
    /// limit or stop-at-size budget applies (`allowed` of 0 with no rate
    /// limit means unbounded).
    ///
    /// Returns the bytes written by this pass; `lines_written` receives
    /// the separator count in line mode.  `eof_in`/`eof_out` are raised
    /// as the input ends and the buffered data drains.
    ///
    /// # Errors
    ///
    /// Only fatal conditions: allocation failure, a failed poll, or a
    /// non-transient write error.  Transient I/O comes back as `Ok(0)`.
    pub fn transfer(
        &mut self,
        fd: RawFd,
        eof_in: &mut bool,
        eof_out: &mut bool,
        allowed: u64,
        lines_written: &mut u64,
    ) -> Result<u64, TransferError> {
        self.apply_direct_io(fd, *eof_in, *eof_out);

        // A new input descriptor starts with a clean error-skip record.
        if fd != self.state.last_read_skip_fd {
            self.state.last_read_skip_fd = fd;
            self.state.read_errors_in_a_row = 0;
            self.state.read_error_warning_shown = false;
        }

        self.ensure_buffer(fd)?;

        if self.control.line_mode {
            *lines_written = 0;
        }

        if *eof_in && *eof_out {
            return Ok(0);
        }

        let check_read = if !*eof_in && self.state.read_pos < self.state.buffer_size {
            Some(fd)
        } else {
            None
        };

        // How much we may write this pass, bounded by the budget when
        // rate limiting or stop-at-size is active.
        self.state.to_write = self.state.pending();
        if (self.control.rate_limit > 0 || allowed > 0)
            && self.state.to_write as u64 > allowed
        {
            self.state.to_write = allowed as usize;
        }

        let check_write = if !*eof_out && self.state.to_write > 0 {
            Some(self.output_fd)
        } else {
            None
        };

        let (ready_read, ready_write) = wait_ready(check_read, check_write, POLL_DEADLINE)
            .map_err(|error| {
                report::error(&format!(
                    "{}: select call failed: {error}",
                    self.file_name
                ));
                self.status.set(ExitStatus::TRANSFER);
                TransferError::Poll(error)
            })?;

        self.state.pass_written = 0;
        self.state.splice_used = false;

        if ready_read {
            if let Step::Transient = self.read_side(fd, eof_in, eof_out, allowed)? {
                return Ok(0);
            }
        }

        self.clamp_to_line_boundary(*eof_in);

        if ready_write
            && !self.state.splice_used
            && self.state.read_pos > self.state.write_pos
            && self.state.to_write > 0
        {
            if let Step::Transient = self.write_side(eof_in, eof_out, lines_written)? {
                return Ok(0);
            }
        }

        // Rotate what remains to the front so the next read can fill
        // the whole buffer.
        if self.state.write_pos > 0 {
            if self.state.write_pos < self.state.read_pos {
                let (write_pos, read_pos) = (self.state.write_pos, self.state.read_pos);
                if let Some(buffer) = self.state.buffer.as_mut() {
                    buffer.as_mut_slice().copy_within(write_pos..read_pos, 0);
                }
                self.state.read_pos -= write_pos;
            } else {
                self.state.read_pos = 0;
            }
            self.state.write_pos = 0;
        }

        Ok(self.state.pass_written)
    }

    /// Applies a pending direct-I/O change to both descriptors.
    fn apply_direct_io(&mut self, fd: RawFd, eof_in: bool, eof_out: bool) {
        if !self.state.direct_pending {
            return;
        }
        if !eof_in {
            if let Err(error) = fd::set_direct_io(fd, self.control.direct_io) {
                tracing::debug!(fd, %error, "fcntl O_DIRECT on input failed");
            }
        }
        if !eof_out {
            if let Err(error) = fd::set_direct_io(self.output_fd, self.control.direct_io) {
                tracing::debug!(fd = self.output_fd, %error, "fcntl O_DIRECT on output failed");
            }
        }
        self.state.direct_pending = false;
    }

    /// Allocates the transfer buffer on first use and grows it if the
    /// target size has been raised mid-transfer.
    fn ensure_buffer(&mut self, input_fd: RawFd) -> Result<(), TransferError> {
        let target = self.control.target_buffer_size.max(1);

        if self.state.buffer.is_none() {
            let alignment = fd::transfer_alignment(Some(input_fd), self.output_fd);
            let buffer = AlignedBuffer::new(target + 32, alignment).map_err(|error| {
                report::error("buffer allocation failed");
                self.status.set(ExitStatus::MEMORY);
                error
            })?;
            self.state.buffer = Some(buffer);
            self.state.buffer_size = target;
        } else if self.state.buffer_size < target {
            let alignment = fd::transfer_alignment(Some(input_fd), self.output_fd);
            if let Some(buffer) = self.state.buffer.as_mut() {
                match buffer.grow(target + 32, alignment) {
                    Ok(()) => self.state.buffer_size = target,
                    Err(_) => {
                        tracing::debug!(target, "buffer growth failed, keeping current size");
                    }
                }
            }
        }
        Ok(())
    }

    /// In line mode, never write past the last complete separator; hold
    /// a trailing partial line until more input arrives or the input
    /// ends, at which point it is flushed as a final block.
    fn clamp_to_line_boundary(&mut self, eof_in: bool) {
        if !self.control.line_mode || self.state.to_write == 0 {
            return;
        }
        let separator = if self.control.null_terminated_lines {
            b'\0'
        } else {
            b'\n'
        };
        let Some(buffer) = self.state.buffer.as_ref() else {
            return;
        };
        let pending =
            &buffer.as_slice()[self.state.write_pos..self.state.write_pos + self.state.to_write];
        match memrchr(separator, pending) {
            Some(last) => self.state.to_write = last + 1,
            // At end of input the trailing partial line is flushed as a
            // final block; a line that outgrew the whole buffer has to be
            // flushed too or the transfer would wedge.
            None if eof_in || self.state.pending() >= self.state.buffer_size => {}
            None => self.state.to_write = 0,
        }
    }

    /// One read attempt, preferring the zero-copy path.
    fn read_side(
        &mut self,
        fd: RawFd,
        eof_in: &mut bool,
        eof_out: &mut bool,
        allowed: u64,
    ) -> Result<Step, TransferError> {
        let mut bytes_can_read = self.state.buffer_size - self.state.read_pos;

        // Never read past the declared size when stop-at-size is set;
        // line mode can't honour this since lines have no fixed size.
        if self.control.stop_at_size && !self.control.line_mode && self.control.size > 0 {
            let remaining = self
                .control
                .size
                .saturating_sub(self.state.total_bytes_read);
            if bytes_can_read as u64 > remaining {
                bytes_can_read = remaining as usize;
            }
        }

        let mut result: Option<io::Result<usize>> = None;

        #[cfg(target_os = "linux")]
        if !self.control.line_mode
            && !self.control.no_splice
            && fd != self.state.splice_failed_fd
            && self.state.to_write == 0
            && !self.control.discard_input
        {
            result = self.try_splice(fd, bytes_can_read, allowed)?;
        }

        let outcome = match result {
            Some(outcome) => outcome,
            None => {
                let state = &mut *self.state;
                let buffer = state.buffer.as_mut().expect("buffer allocated");
                let region = &mut buffer.as_mut_slice()
                    [state.read_pos..state.read_pos + bytes_can_read];
                read_repeated(fd, region)
            }
        };

        match outcome {
            Ok(0) => {
                *eof_in = true;
                if self.state.write_pos >= self.state.read_pos {
                    *eof_out = true;
                }
                Ok(Step::Done)
            }
            Ok(nread) => {
                self.state.read_errors_in_a_row = 0;
                if !self.state.splice_used {
                    self.state.read_pos += nread;
                }
                self.state.total_bytes_read += nread as u64;
                Ok(Step::Done)
            }
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) =>
            {
                std::thread::sleep(Duration::from_millis(10));
                Ok(Step::Transient)
            }
            Err(error) => {
                self.status.set(ExitStatus::TRANSFER);
                self.state.read_errors_in_a_row += 1;
                self.handle_read_error(fd, error, bytes_can_read, eof_in, eof_out);
                Ok(Step::Done)
            }
        }
    }

    /// The kernel-mediated fast path.  Returns `Ok(None)` when the pass
    /// should fall back to an ordinary read.
    #[cfg(target_os = "linux")]
    fn try_splice(
        &mut self,
        fd: RawFd,
        bytes_can_read: usize,
        allowed: u64,
    ) -> Result<Option<io::Result<usize>>, TransferError> {
        let bytes_to_splice = if self.control.rate_limit > 0 || allowed > 0 {
            allowed as usize
        } else {
            bytes_can_read
        };

        self.state.splice_used = true;
        match fd::splice(fd, self.output_fd, bytes_to_splice) {
            Ok(0) => {
                // A zero here does not prove the input has ended; let an
                // ordinary read make that call.
                self.state.splice_used = false;
                Ok(None)
            }
            Ok(moved) => {
                self.state.pass_written += moved as u64;
                if self.control.sync_after_write {
                    if let Err(error) = fd::datasync(self.output_fd) {
                        if error.raw_os_error() == Some(libc::EIO) {
                            report::error(&format!("write failed: {error}"));
                            self.status.set(ExitStatus::TRANSFER);
                            return Err(TransferError::Write(error));
                        }
                    }
                }
                Ok(Some(Ok(moved)))
            }
            Err(error) if error.raw_os_error() == Some(libc::EINVAL) => {
                tracing::debug!(fd, "splice not supported here, disabling for this input");
                self.state.splice_failed_fd = fd;
                self.state.splice_used = false;
                Ok(None)
            }
            Err(error) => Ok(Some(Err(error))),
        }
    }

    /// A non-transient read error: report and end the file, or skip past
    /// the bad region when skipping is enabled.
    fn handle_read_error(
        &mut self,
        fd: RawFd,
        error: io::Error,
        bytes_can_read: usize,
        eof_in: &mut bool,
        eof_out: &mut bool,
    ) {
        let may_skip = self.control.skip_errors > 0;

        if !may_skip {
            report::error(&format!("{}: read failed: {error}", self.file_name));
            *eof_in = true;
            if self.state.write_pos >= self.state.read_pos {
                *eof_out = true;
            }
            return;
        }

        if !self.state.read_error_warning_shown {
            report::error(&format!(
                "{}: warning: read errors detected: {error}",
                self.file_name
            ));
            self.state.read_error_warning_shown = true;
        }

        let original_offset = match fd::seek_current(fd, 0) {
            Ok(offset) => offset,
            Err(seek_error) => {
                report::error(&format!(
                    "{}: file is not seekable: {seek_error}",
                    self.file_name
                ));
                *eof_in = true;
                if self.state.write_pos >= self.state.read_pos {
                    *eof_out = true;
                }
                return;
            }
        };

        let mut amount_to_skip = if self.control.error_skip_block > 0 {
            self.control.error_skip_block
        } else {
            adaptive_skip_amount(self.state.read_errors_in_a_row)
        };

        // Align the landing offset to a multiple of the skip amount, so
        // skips fall on block boundaries.
        if amount_to_skip > 1 {
            let target = original_offset + amount_to_skip;
            let aligned = target - target % amount_to_skip;
            if aligned > original_offset {
                amount_to_skip = aligned - original_offset;
            }
        }

        if amount_to_skip > bytes_can_read as u64 {
            amount_to_skip = bytes_can_read as u64;
        }

        let mut landed = fd::seek_set(fd, original_offset + amount_to_skip);
        if landed.is_err() {
            // Maybe we aimed past the end; a single byte may still work.
            amount_to_skip = 1;
            landed = fd::seek_set(fd, original_offset + amount_to_skip);
        }

        match landed {
            Err(seek_error) => {
                *eof_in = true;
                if seek_error.raw_os_error() != Some(libc::EINVAL) {
                    report::error(&format!(
                        "{}: failed to seek past error: {seek_error}",
                        self.file_name
                    ));
                }
                if self.state.write_pos >= self.state.read_pos {
                    *eof_out = true;
                }
            }
            Ok(new_offset) => {
                let skipped = new_offset.saturating_sub(original_offset) as usize;
                if skipped == 0 {
                    *eof_in = true;
                    if self.state.write_pos >= self.state.read_pos {
                        *eof_out = true;
                    }
                    return;
                }
                // The skipped region becomes zeroes so the output keeps
                // its shape.
                let read_pos = self.state.read_pos;
                if let Some(buffer) = self.state.buffer.as_mut() {
                    buffer.as_mut_slice()[read_pos..read_pos + skipped].fill(0);
                }
                self.state.read_pos += skipped;
                if self.control.skip_errors >= 2 {
                    report::error(&format!(
                        "{}: skipped past read error: {original_offset} - {new_offset} ({skipped} B)",
                        self.file_name
                    ));
                }
            }
        }
    }

    /// One write attempt of `to_write` bytes from the buffer.
    fn write_side(
        &mut self,
        eof_in: &mut bool,
        eof_out: &mut bool,
        lines_written: &mut u64,
    ) -> Result<Step, TransferError> {
        let to_write = self.state.to_write;
        let mut sparse_skipped = false;

        let write_result: io::Result<usize> = if self.control.discard_input {
            Ok(to_write)
        } else {
            // In sparse mode an all-zero region becomes a forward seek;
            // the zeros materialise as a hole at final truncation.
            if self.control.sparse_output && !self.state.output_not_seekable {
                let buffer = self.state.buffer.as_ref().expect("buffer allocated");
                let pending =
                    &buffer.as_slice()[self.state.write_pos..self.state.write_pos + to_write];
                if pending.iter().all(|&byte| byte == 0) {
                    match fd::seek_current(self.output_fd, to_write as i64) {
                        Ok(_) => sparse_skipped = true,
                        Err(error) => {
                            tracing::debug!(%error, "output seek failed, disabling sparse writes");
                            self.state.output_not_seekable = true;
                        }
                    }
                }
            }

            if sparse_skipped {
                Ok(to_write)
            } else {
                // An interval timer interrupts a long write so the
                // display can refresh; cancelled immediately after.
                arm_interval_timer(self.control.interval);
                let state = &mut *self.state;
                let buffer = state.buffer.as_ref().expect("buffer allocated");
                let pending = &buffer.as_slice()[state.write_pos..state.write_pos + to_write];
                let result =
                    write_repeated(self.output_fd, pending, self.control.sync_after_write);
                disarm_interval_timer();
                result
            }
        };

        match write_result {
            Ok(0) => {
                std::thread::sleep(Duration::from_millis(10));
                Ok(Step::Transient)
            }
            Ok(nwritten) => {
                self.account_write(nwritten, sparse_skipped, lines_written);
                if self.state.write_pos >= self.state.read_pos {
                    self.state.write_pos = 0;
                    self.state.read_pos = 0;
                    if *eof_in {
                        *eof_out = true;
                    }
                }
                Ok(Step::Done)
            }
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) =>
            {
                std::thread::sleep(Duration::from_millis(10));
                Ok(Step::Transient)
            }
            Err(error) if error.kind() == io::ErrorKind::BrokenPipe => {
                // The consumer went away; that is their business, not an
                // error of ours.
                *eof_in = true;
                *eof_out = true;
                signal::set_pipe_closed();
                Ok(Step::Transient)
            }
            Err(error) => {
                report::error(&format!("write failed: {error}"));
                self.status.set(ExitStatus::TRANSFER);
                *eof_out = true;
                Err(TransferError::Write(error))
            }
        }
    }

    /// Updates positions, counters, line records, and previews after a
    /// successful write of `nwritten` bytes.
    fn account_write(&mut self, nwritten: usize, sparse_skipped: bool, lines_written: &mut u64) {
        let control = self.control;
        let state = &mut *self.state;
        let preview = &mut *self.preview;

        // The buffer is parked outside the state while counters that
        // live next to it are updated.
        let buffer = state.buffer.take().expect("buffer allocated");
        let written = &buffer.as_slice()[state.write_pos..state.write_pos + nwritten];

        let tracking_lines = control.line_mode || preview.track_previous_line;
        if tracking_lines {
            if control.line_mode && state.line_positions.is_none() {
                match LineRing::new() {
                    Ok(ring) => state.line_positions = Some(ring),
                    Err(_) => report::error("line position buffer allocation failed"),
                }
            }

            let separator = if control.null_terminated_lines {
                b'\0'
            } else {
                b'\n'
            };

            let mut lines = 0u64;
            for &byte in written {
                state.last_output_position += 1;
                if byte != separator {
                    preview.push_line_byte(byte);
                    continue;
                }
                lines += 1;
                preview.complete_line();
                if let Some(ring) = state.line_positions.as_mut() {
                    ring.push(state.last_output_position - 1);
                }
            }
            if control.line_mode {
                *lines_written += lines;
            }
        }

        if preview.track_last_written && !sparse_skipped && !control.discard_input {
            preview.note_written(written);
        }

        state.buffer = Some(buffer);
        state.write_pos += nwritten;
        state.pass_written += nwritten as u64;
    }
}

/// The adaptive error-skip schedule: 1 byte for the first few errors,
/// then 2, then powers of two up to a hard cap of 512 bytes per skip.
fn adaptive_skip_amount(errors_in_a_row: u32) -> u64 {
    if errors_in_a_row < 5 {
        1
    } else if errors_in_a_row < 10 {
        2
    } else if errors_in_a_row < 20 {
        1u64 << (errors_in_a_row - 10)
    } else {
        512
    }
}

/// Reads like `read(2)`, but keeps trying to top the buffer up while the
/// descriptor stays readable and the elapsed time is under
/// [`TRANSFER_READ_TIMEOUT`].
fn read_repeated(fd: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    let started = Instant::now();
    let mut total_read = 0usize;

    while total_read < buffer.len() {
        let span = (buffer.len() - total_read).min(MAX_READ_AT_ONCE);
        let nread = match fd::read(fd, &mut buffer[total_read..total_read + span]) {
            Ok(nread) => nread,
            Err(error) => {
                if total_read > 0 {
                    return Ok(total_read);
                }
                return Err(error);
            }
        };

        total_read += nread;
        if nread == 0 {
            break;
        }

        if started.elapsed().as_secs_f64() > TRANSFER_READ_TIMEOUT {
            tracing::debug!(fd, total_read, "stopping read, timer expired");
            break;
        }

        if total_read < buffer.len() {
            match wait_ready(Some(fd), None, Duration::ZERO) {
                Ok((true, _)) => {}
                _ => break,
            }
        }
    }

    Ok(total_read)
}

/// Writes like `write(2)`, but keeps flushing while progress is made and
/// the elapsed time is under [`TRANSFER_WRITE_TIMEOUT`].  Interruption
/// returns the partial count; a zero-byte write does the same so the
/// caller can treat it as transient.
fn write_repeated(fd: RawFd, buffer: &[u8], sync_after_write: bool) -> io::Result<usize> {
    let started = Instant::now();
    let mut total_written = 0usize;

    while total_written < buffer.len() {
        let span = (buffer.len() - total_written).min(MAX_WRITE_AT_ONCE);
        let result = fd::write(fd, &buffer[total_written..total_written + span]);

        if sync_after_write {
            if let Ok(&nwritten) = result.as_ref() {
                if nwritten > 0 {
                    if let Err(error) = fd::datasync(fd) {
                        // Only a real I/O failure counts; EINVAL just
                        // means the output cannot sync (a pipe).
                        if error.raw_os_error() == Some(libc::EIO) {
                            return Err(error);
                        }
                    }
                }
            }
        }

        let nwritten = match result {
            Ok(nwritten) => nwritten,
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) =>
            {
                return Ok(total_written);
            }
            Err(error) => return Err(error),
        };

        total_written += nwritten;
        if nwritten == 0 {
            break;
        }

        if started.elapsed().as_secs_f64() > TRANSFER_WRITE_TIMEOUT {
            tracing::debug!(fd, total_written, "stopping write, timer expired");
            break;
        }
    }

    Ok(total_written)
}

/// Arms the real-time interval timer to fire every display interval.
fn arm_interval_timer(interval_seconds: f64) {
    let seconds = interval_seconds.max(0.0);
    let tv_sec = seconds as libc::time_t;
    let tv_usec = ((seconds * 1_000_000.0) as libc::suseconds_t) % 1_000_000;
    let spec = libc::timeval { tv_sec, tv_usec };
    let timer = libc::itimerval {
        it_interval: spec,
        it_value: spec,
    };
    // SAFETY: setitimer with an initialised struct.
    if unsafe { libc::setitimer(libc::ITIMER_REAL, &timer, std::ptr::null_mut()) } != 0 {
        report::error("failed to set interval timer");
    }
}

/// Cancels the interval timer again.
fn disarm_interval_timer() {
    let zero = libc::timeval { tv_sec: 0, tv_usec: 0 };
    let timer = libc::itimerval {
        it_interval: zero,
        it_value: zero,
    };
    // SAFETY: as above.
    let _ = unsafe { libc::setitimer(libc::ITIMER_REAL, &timer, std::ptr::null_mut()) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read as _, Seek as _, SeekFrom, Write as _};
    use std::os::fd::AsRawFd;

    fn test_control() -> Control {
        Control {
            target_buffer_size: 4096,
            no_splice: true,
            ..Control::default()
        }
    }

    fn run_to_completion(
        control: &Control,
        input: &std::fs::File,
        output: &std::fs::File,
    ) -> (TransferState, ExitStatus, u64) {
        let mut state = TransferState::new();
        let mut preview = Preview::new();
        let mut status = ExitStatus::new();
        let mut eof_in = false;
        let mut eof_out = false;
        let mut total_lines = 0u64;

        for _ in 0..10_000 {
            if eof_in && eof_out {
                break;
            }
            let mut lines = 0u64;
            let mut engine = Engine::new(
                control,
                output.as_raw_fd(),
                "input",
                &mut state,
                &mut preview,
                &mut status,
            );
            let written = engine
                .transfer(input.as_raw_fd(), &mut eof_in, &mut eof_out, 0, &mut lines)
                .expect("transfer");
            total_lines += lines;
            if !control.line_mode {
                state.total_written += written;
            } else {
                state.total_written += lines;
            }
        }
        assert!(eof_in && eof_out, "transfer did not finish");
        (state, status, total_lines)
    }

    #[test]
    fn copies_bytes_exactly() {
        let control = test_control();
        let mut input = tempfile::tempfile().expect("input");
        input.write_all(b"hello\n").expect("fill");
        input.seek(SeekFrom::Start(0)).expect("rewind");
        let output = tempfile::tempfile().expect("output");

        let (state, status, _) = run_to_completion(&control, &input, &output);

        assert!(status.is_success());
        assert_eq!(state.total_written, 6);
        assert_eq!(state.total_bytes_read, 6);

        let mut copied = Vec::new();
        let mut reread = output.try_clone().expect("clone");
        reread.seek(SeekFrom::Start(0)).expect("rewind");
        reread.read_to_end(&mut copied).expect("read back");
        assert_eq!(copied, b"hello\n");
    }

    #[test]
    fn copies_large_payload_through_small_buffer() {
        let mut control = test_control();
        control.target_buffer_size = 512;
        let payload: Vec<u8> = (0..100_000u32).map(|v| (v % 251) as u8).collect();

        let mut input = tempfile::tempfile().expect("input");
        input.write_all(&payload).expect("fill");
        input.seek(SeekFrom::Start(0)).expect("rewind");
        let output = tempfile::tempfile().expect("output");

        let (state, status, _) = run_to_completion(&control, &input, &output);

        assert!(status.is_success());
        assert_eq!(state.total_written, payload.len() as u64);

        let mut copied = Vec::new();
        let mut reread = output.try_clone().expect("clone");
        reread.seek(SeekFrom::Start(0)).expect("rewind");
        reread.read_to_end(&mut copied).expect("read back");
        assert_eq!(copied, payload);
    }

    #[test]
    fn line_mode_counts_separators() {
        let mut control = test_control();
        control.line_mode = true;

        let mut input = tempfile::tempfile().expect("input");
        input.write_all(b"A\nB\nC\nD").expect("fill");
        input.seek(SeekFrom::Start(0)).expect("rewind");
        let output = tempfile::tempfile().expect("output");

        let (_, status, lines) = run_to_completion(&control, &input, &output);

        assert!(status.is_success());
        assert_eq!(lines, 3);

        let mut copied = Vec::new();
        let mut reread = output.try_clone().expect("clone");
        reread.seek(SeekFrom::Start(0)).expect("rewind");
        reread.read_to_end(&mut copied).expect("read back");
        // The trailing partial line is flushed once the input ends.
        assert_eq!(copied, b"A\nB\nC\nD");
    }

    #[test]
    fn discard_mode_writes_nothing() {
        let mut control = test_control();
        control.discard_input = true;

        let mut input = tempfile::tempfile().expect("input");
        input.write_all(b"discarded").expect("fill");
        input.seek(SeekFrom::Start(0)).expect("rewind");
        let output = tempfile::tempfile().expect("output");

        let (state, status, _) = run_to_completion(&control, &input, &output);

        assert!(status.is_success());
        assert_eq!(state.total_written, 9);
        assert_eq!(fd::file_size(output.as_raw_fd()), Some(0));
    }

    #[test]
    fn sparse_output_skips_zero_regions() {
        let mut control = test_control();
        control.sparse_output = true;

        let mut payload = vec![0u8; 8192];
        payload[0] = b'x';
        // A fully-zero tail after one data byte.
        let mut input = tempfile::tempfile().expect("input");
        input.write_all(&payload).expect("fill");
        input.seek(SeekFrom::Start(0)).expect("rewind");
        let output = tempfile::tempfile().expect("output");

        let (state, status, _) = run_to_completion(&control, &input, &output);
        assert!(status.is_success());
        assert_eq!(state.total_written, 8192);
        assert!(!state.output_not_seekable);

        // The shutdown path truncates to the final position; emulate it
        // the way the main loop does.
        fd::truncate(output.as_raw_fd(), state.total_written).expect("truncate");
        assert_eq!(fd::file_size(output.as_raw_fd()), Some(8192));
    }

    #[test]
    fn adaptive_skip_schedule_ramps_and_caps() {
        assert_eq!(adaptive_skip_amount(1), 1);
        assert_eq!(adaptive_skip_amount(4), 1);
        assert_eq!(adaptive_skip_amount(5), 2);
        assert_eq!(adaptive_skip_amount(9), 2);
        assert_eq!(adaptive_skip_amount(10), 1);
        assert_eq!(adaptive_skip_amount(13), 8);
        assert_eq!(adaptive_skip_amount(19), 512);
        assert_eq!(adaptive_skip_amount(20), 512);
        assert_eq!(adaptive_skip_amount(100), 512);
    }

    #[test]
    fn write_repeated_moves_everything_within_deadline() {
        let mut output = tempfile::tempfile().expect("output");
        let payload = vec![7u8; 100_000];
        let written =
            write_repeated(output.as_raw_fd(), &payload, false).expect("write");
        assert_eq!(written, payload.len());
        output.seek(SeekFrom::Start(0)).expect("rewind");
        let mut copied = Vec::new();
        output.read_to_end(&mut copied).expect("read back");
        assert_eq!(copied, payload);
    }

    #[test]
    fn read_repeated_fills_from_a_file() {
        let mut input = tempfile::tempfile().expect("input");
        input.write_all(b"0123456789").expect("fill");
        input.seek(SeekFrom::Start(0)).expect("rewind");
        let mut buffer = [0u8; 16];
        let read = read_repeated(input.as_raw_fd(), &mut buffer).expect("read");
        assert_eq!(read, 10);
        assert_eq!(&buffer[..10], b"0123456789");
    }
}
