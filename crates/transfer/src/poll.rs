//! Readiness polling with a short deadline.
//!
//! The deadline is kept under a tenth of a second so the main loop can
//! service signal flags, the display interval, and the rate limiter
//! promptly even when neither side of the transfer is ready.

use std::io;
use std::os::fd::{BorrowedFd, RawFd};
use std::time::Duration;

use rustix::event::{poll, PollFd, PollFlags};

/// Longest time `wait_ready` may block.
pub const POLL_DEADLINE: Duration = Duration::from_millis(90);

/// Waits for the input side to become readable and/or the output side to
/// become writable, for at most `timeout`.  Interruption is reported as
/// neither side ready, not as an error.
pub fn wait_ready(
    input: Option<RawFd>,
    output: Option<RawFd>,
    timeout: Duration,
) -> io::Result<(bool, bool)> {
    if input.is_none() && output.is_none() {
        std::thread::sleep(timeout);
        return Ok((false, false));
    }

    // SAFETY: the descriptors outlive this call; see fd module.
    let input_fd = input.map(|fd| unsafe { BorrowedFd::borrow_raw(fd) });
    let output_fd = output.map(|fd| unsafe { BorrowedFd::borrow_raw(fd) });

    let mut fds = Vec::with_capacity(2);
    let mut input_index = None;
    let mut output_index = None;
    if let Some(fd) = &input_fd {
        input_index = Some(fds.len());
        fds.push(PollFd::new(fd, PollFlags::IN));
    }
    if let Some(fd) = &output_fd {
        output_index = Some(fds.len());
        fds.push(PollFd::new(fd, PollFlags::OUT));
    }

    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
    match poll(&mut fds, timeout_ms) {
        Ok(0) => Ok((false, false)),
        Ok(_) => {
            // EOF and error states count as readable so the read path
            // can observe them.
            let readable =
                PollFlags::IN | PollFlags::HUP | PollFlags::ERR | PollFlags::NVAL;
            let writable = PollFlags::OUT | PollFlags::ERR | PollFlags::NVAL;
            let in_ready = input_index
                .map(|i| fds[i].revents().intersects(readable))
                .unwrap_or(false);
            let out_ready = output_index
                .map(|i| fds[i].revents().intersects(writable))
                .unwrap_or(false);
            Ok((in_ready, out_ready))
        }
        Err(rustix::io::Errno::INTR) => Ok((false, false)),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::os::fd::AsRawFd;

    #[test]
    fn empty_pipe_is_not_readable() {
        let (reader, _writer) = rustix::pipe::pipe().expect("pipe");
        let (in_ready, out_ready) =
            wait_ready(Some(reader.as_raw_fd()), None, Duration::from_millis(1)).expect("poll");
        assert!(!in_ready);
        assert!(!out_ready);
    }

    #[test]
    fn written_pipe_becomes_readable() {
        let (reader, writer) = rustix::pipe::pipe().expect("pipe");
        rustix::io::write(&writer, b"x").expect("write");
        let (in_ready, _) =
            wait_ready(Some(reader.as_raw_fd()), None, Duration::from_millis(100)).expect("poll");
        assert!(in_ready);
    }

    #[test]
    fn fresh_pipe_is_writable() {
        let (_reader, writer) = rustix::pipe::pipe().expect("pipe");
        let (_, out_ready) =
            wait_ready(None, Some(writer.as_raw_fd()), Duration::from_millis(100)).expect("poll");
        assert!(out_ready);
    }

    #[test]
    fn closed_read_end_reports_readable_for_eof() {
        let (reader, writer) = rustix::pipe::pipe().expect("pipe");
        let mut file = std::fs::File::from(writer);
        file.write_all(b"tail").expect("write");
        drop(file);
        let (in_ready, _) =
            wait_ready(Some(reader.as_raw_fd()), None, Duration::from_millis(100)).expect("poll");
        assert!(in_ready);
    }
}
