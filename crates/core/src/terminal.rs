//! Terminal helpers: foreground detection, window size, TOSTOP
//! management, and retrying writes to the status stream.

use std::io::Write;
use std::os::fd::BorrowedFd;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::signal;

const STDERR: libc::c_int = libc::STDERR_FILENO;

/// Whether we set TOSTOP ourselves and therefore must clear it on exit.
static CLEAR_TOSTOP_ON_EXIT: AtomicBool = AtomicBool::new(false);

/// Returns true if we are the terminal's foreground process group, or if
/// stderr is not a terminal at all.
#[must_use]
pub fn in_foreground() -> bool {
    // SAFETY: isatty/getpgrp/tcgetpgrp only inspect process state.
    unsafe {
        if libc::isatty(STDERR) == 0 {
            return true;
        }
        let ours = libc::getpgrp();
        let tty = libc::tcgetpgrp(STDERR);
        if tty == -1 && std::io::Error::last_os_error().raw_os_error() == Some(libc::ENOTTY) {
            return true;
        }
        ours == tty
    }
}

/// Current terminal size in (columns, rows), if stderr is a terminal.
#[must_use]
pub fn screen_size() -> Option<(u16, u16)> {
    // SAFETY: stderr is open for the lifetime of the process.
    let stderr = unsafe { BorrowedFd::borrow_raw(STDERR) };
    if !rustix::termios::isatty(stderr) {
        return None;
    }
    match rustix::termios::tcgetwinsize(stderr) {
        Ok(size) if size.ws_col > 0 => Some((size.ws_col, size.ws_row)),
        _ => None,
    }
}

/// Sets the TOSTOP terminal attribute if it is not already set, so a
/// background write raises SIGTTOU.  Records whether we were the one to
/// set it.  Does nothing while stderr output is suspended.
pub fn ensure_tostop() {
    if signal::stderr_suspended() {
        return;
    }

    // SAFETY: tcgetattr/tcsetattr with a zero-initialised termios.
    unsafe {
        let mut attributes: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(STDERR, &mut attributes) != 0 {
            return;
        }
        if signal::stderr_suspended() {
            return;
        }
        if attributes.c_lflag & libc::TOSTOP == 0 {
            attributes.c_lflag |= libc::TOSTOP;
            if libc::tcsetattr(STDERR, libc::TCSANOW, &attributes) == 0 {
                CLEAR_TOSTOP_ON_EXIT.store(true, Ordering::SeqCst);
            }
        }
    }
}

/// Clears TOSTOP again on the way out, but only if we set it and we are
/// still in the foreground.
pub fn restore_tostop() {
    if !CLEAR_TOSTOP_ON_EXIT.swap(false, Ordering::SeqCst) {
        return;
    }
    if !in_foreground() {
        return;
    }

    // SAFETY: as in ensure_tostop.
    unsafe {
        let mut attributes: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(STDERR, &mut attributes) != 0 {
            return;
        }
        if attributes.c_lflag & libc::TOSTOP != 0 {
            attributes.c_lflag &= !libc::TOSTOP;
            let _ = libc::tcsetattr(STDERR, libc::TCSANOW, &attributes);
        }
    }
}

/// Writes the whole buffer to stderr, retrying transient failures, unless
/// stderr output is currently suspended.
pub fn tty_write(buffer: &[u8]) {
    let mut remaining = buffer;
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    while !signal::stderr_suspended() && !remaining.is_empty() {
        match handle.write(remaining) {
            Ok(0) => return,
            Ok(written) => remaining = &remaining[written..],
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {}
            Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreground_is_true_without_a_terminal() {
        // Test harnesses redirect stderr, so this exercises the
        // not-a-tty path.
        if unsafe { libc::isatty(STDERR) } == 0 {
            assert!(in_foreground());
        }
    }

    #[test]
    fn screen_size_absent_without_a_terminal() {
        if unsafe { libc::isatty(STDERR) } == 0 {
            assert!(screen_size().is_none());
        }
    }

    #[test]
    fn tty_write_handles_empty_buffers() {
        tty_write(b"");
    }
}
