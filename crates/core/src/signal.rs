//! Signal adapter.
//!
//! Handlers are installed with raw `sigaction` and restricted to
//! async-signal-safe work: atomic stores, a monotonic clock read, and the
//! process-group `SIGCONT` kick needed to keep the rest of a pipeline
//! running after a background write.  The main loop consumes the state as
//! edge-triggered flags.
//!
//! Handlers are installed without `SA_RESTART` so a pending alarm or
//! interval timer interrupts a blocking `write` with `EINTR`, which is
//! what lets the display keep updating during a stalled write.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::time::Duration;

use crate::terminal;

static TERMINAL_RESIZED: AtomicBool = AtomicBool::new(false);
static TRIGGER_EXIT: AtomicBool = AtomicBool::new(false);
static SUSPEND_STDERR: AtomicBool = AtomicBool::new(false);
static REPARSE_DISPLAY: AtomicBool = AtomicBool::new(false);
static PIPE_CLOSED: AtomicBool = AtomicBool::new(false);
static SKIP_NEXT_CONT: AtomicI32 = AtomicI32::new(0);

/// Monotonic nanosecond timestamp of the last SIGTSTP; 0 when none is
/// outstanding.
static TSTP_ARRIVED_NS: AtomicU64 = AtomicU64::new(0);
/// Total nanoseconds spent stopped since the transfer began.
static TOTAL_STOPPAGE_NS: AtomicU64 = AtomicU64::new(0);

/// Monotonic clock read that is safe inside a signal handler.
fn monotonic_ns() -> u64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: clock_gettime with a valid pointer is async-signal-safe.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if rc != 0 {
        return 0;
    }
    (ts.tv_sec as u64).saturating_mul(1_000_000_000).saturating_add(ts.tv_nsec as u64)
}

/// SIGTTOU: we wrote to the terminal from the background.  Suspend stderr
/// output and wake the rest of the process group, which the kernel stopped
/// along with us; the SIGCONT we raise here must not be treated as a real
/// resume, so the next one is skipped.
extern "C" fn handle_ttou(_signum: libc::c_int) {
    if !SUSPEND_STDERR.swap(true, Ordering::SeqCst) {
        SKIP_NEXT_CONT.fetch_add(1, Ordering::SeqCst);
        // SAFETY: killpg with our own process group is async-signal-safe.
        unsafe {
            let _ = libc::killpg(libc::getpgrp(), libc::SIGCONT);
        }
    }
}

/// SIGTSTP: remember when we stopped, then actually stop.
extern "C" fn handle_tstp(_signum: libc::c_int) {
    TSTP_ARRIVED_NS.store(monotonic_ns(), Ordering::SeqCst);
    // SAFETY: raise is async-signal-safe.
    unsafe {
        let _ = libc::raise(libc::SIGSTOP);
    }
}

/// SIGCONT: fold the stopped interval into the stoppage total, re-derive
/// the layout, and resume terminal output if we are foregrounded again.
extern "C" fn handle_cont(_signum: libc::c_int) {
    if SKIP_NEXT_CONT.fetch_sub(1, Ordering::SeqCst) > 0 {
        return;
    }
    SKIP_NEXT_CONT.store(0, Ordering::SeqCst);

    TERMINAL_RESIZED.store(true, Ordering::SeqCst);

    let stopped_at = TSTP_ARRIVED_NS.swap(0, Ordering::SeqCst);
    if stopped_at != 0 {
        let interval = monotonic_ns().saturating_sub(stopped_at);
        TOTAL_STOPPAGE_NS.fetch_add(interval, Ordering::SeqCst);
    }

    if SUSPEND_STDERR.load(Ordering::SeqCst) && terminal::in_foreground() {
        SUSPEND_STDERR.store(false, Ordering::SeqCst);
    }
    if !SUSPEND_STDERR.load(Ordering::SeqCst) {
        terminal::ensure_tostop();
    }
}

/// SIGWINCH: the layout must be re-derived.
extern "C" fn handle_winch(_signum: libc::c_int) {
    TERMINAL_RESIZED.store(true, Ordering::SeqCst);
}

/// SIGINT, SIGHUP, SIGTERM: finish cleanly at the next loop edge.
extern "C" fn handle_term(_signum: libc::c_int) {
    TRIGGER_EXIT.store(true, Ordering::SeqCst);
}

/// SIGALRM: nothing.  The handler exists because an ignored signal would
/// not interrupt a blocking write.
extern "C" fn handle_alrm(_signum: libc::c_int) {}

fn install_handler(
    signum: libc::c_int,
    handler: libc::sighandler_t,
) -> io::Result<()> {
    // SAFETY: sigaction with a zeroed, initialised struct; the handlers
    // registered here only perform async-signal-safe operations.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler;
        action.sa_flags = 0;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(signum, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Handle onto the installed signal state.
#[derive(Debug)]
pub struct SignalHandler {
    _installed: (),
}

impl SignalHandler {
    /// True once a termination signal has been received.
    #[inline]
    #[must_use]
    pub fn exit_requested(&self) -> bool {
        exit_requested()
    }

    /// Consumes a pending resize edge.
    #[inline]
    pub fn take_resize(&self) -> bool {
        take_resize()
    }
}

/// Installs all handlers.  SIGPIPE is ignored so a closed output pipe
/// surfaces as `EPIPE` on the write path instead of killing the process.
///
/// # Errors
///
/// Returns the OS error if any handler cannot be installed.
pub fn install() -> io::Result<SignalHandler> {
    SUSPEND_STDERR.store(false, Ordering::SeqCst);
    SKIP_NEXT_CONT.store(0, Ordering::SeqCst);
    TSTP_ARRIVED_NS.store(0, Ordering::SeqCst);
    TOTAL_STOPPAGE_NS.store(0, Ordering::SeqCst);

    install_handler(libc::SIGPIPE, libc::SIG_IGN)?;
    install_handler(libc::SIGTTOU, handle_ttou as libc::sighandler_t)?;
    install_handler(libc::SIGTSTP, handle_tstp as libc::sighandler_t)?;
    install_handler(libc::SIGCONT, handle_cont as libc::sighandler_t)?;
    install_handler(libc::SIGWINCH, handle_winch as libc::sighandler_t)?;
    install_handler(libc::SIGINT, handle_term as libc::sighandler_t)?;
    install_handler(libc::SIGHUP, handle_term as libc::sighandler_t)?;
    install_handler(libc::SIGTERM, handle_term as libc::sighandler_t)?;
    install_handler(libc::SIGALRM, handle_alrm as libc::sighandler_t)?;

    terminal::ensure_tostop();

    Ok(SignalHandler { _installed: () })
}

/// True once a termination signal has been received.
#[must_use]
pub fn exit_requested() -> bool {
    TRIGGER_EXIT.load(Ordering::SeqCst)
}

/// Consumes a pending terminal-resize edge.
pub fn take_resize() -> bool {
    TERMINAL_RESIZED.swap(false, Ordering::SeqCst)
}

/// Arms the resize edge, forcing the next pass to re-derive the layout.
pub fn arm_resize() {
    TERMINAL_RESIZED.store(true, Ordering::SeqCst);
}

/// Consumes a pending format-reparse edge.
pub fn take_reparse() -> bool {
    REPARSE_DISPLAY.swap(false, Ordering::SeqCst)
}

/// Requests a format reparse on the next display update.
pub fn arm_reparse() {
    REPARSE_DISPLAY.store(true, Ordering::SeqCst)
}

/// True while terminal output is suspended (stopped in the background).
#[must_use]
pub fn stderr_suspended() -> bool {
    SUSPEND_STDERR.load(Ordering::SeqCst)
}

/// Records that the downstream pipe has gone away.
pub fn set_pipe_closed() {
    PIPE_CLOSED.store(true, Ordering::SeqCst)
}

/// True once the downstream pipe has gone away.
#[must_use]
pub fn pipe_closed() -> bool {
    PIPE_CLOSED.load(Ordering::SeqCst)
}

/// Total time spent stopped since [`install`] (or [`clear_stoppage`]).
#[must_use]
pub fn total_stoppage() -> Duration {
    Duration::from_nanos(TOTAL_STOPPAGE_NS.load(Ordering::SeqCst))
}

/// Zeroes the stoppage total.  Used with [`block_pause`] around the
/// wait-mode timer reset.
pub fn clear_stoppage() {
    TOTAL_STOPPAGE_NS.store(0, Ordering::SeqCst);
    TSTP_ARRIVED_NS.store(0, Ordering::SeqCst);
}

fn set_pause_mask(how: libc::c_int) {
    // SAFETY: sigprocmask with an initialised set.
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGTSTP);
        libc::sigaddset(&mut set, libc::SIGCONT);
        let _ = libc::sigprocmask(how, &set, std::ptr::null_mut());
    }
}

/// Blocks SIGTSTP and SIGCONT so a resume cannot interleave with a timer
/// reset.
pub fn block_pause() {
    set_pause_mask(libc::SIG_BLOCK);
}

/// Unblocks SIGTSTP and SIGCONT again.
pub fn allow_pause() {
    set_pause_mask(libc::SIG_UNBLOCK);
}

/// Periodic foreground re-check: if stderr is suspended but we are now the
/// foreground process group, resume output.  Rate-limited to roughly once
/// a second.
pub fn check_background() {
    static NEXT_CHECK_NS: AtomicU64 = AtomicU64::new(0);

    let now = monotonic_ns();
    if now < NEXT_CHECK_NS.load(Ordering::SeqCst) {
        return;
    }
    NEXT_CHECK_NS.store(now + 1_000_000_000, Ordering::SeqCst);

    if !SUSPEND_STDERR.load(Ordering::SeqCst) {
        return;
    }
    if !terminal::in_foreground() {
        return;
    }

    tracing::debug!("foregrounded again, resuming stderr");
    SUSPEND_STDERR.store(false, Ordering::SeqCst);
    terminal::ensure_tostop();
}

#[cfg(test)]
pub(crate) fn reset_for_testing() {
    TERMINAL_RESIZED.store(false, Ordering::SeqCst);
    TRIGGER_EXIT.store(false, Ordering::SeqCst);
    SUSPEND_STDERR.store(false, Ordering::SeqCst);
    REPARSE_DISPLAY.store(false, Ordering::SeqCst);
    PIPE_CLOSED.store(false, Ordering::SeqCst);
    SKIP_NEXT_CONT.store(0, Ordering::SeqCst);
    TSTP_ARRIVED_NS.store(0, Ordering::SeqCst);
    TOTAL_STOPPAGE_NS.store(0, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_flag_is_edge_triggered() {
        reset_for_testing();
        assert!(!take_resize());
        handle_winch(libc::SIGWINCH);
        assert!(take_resize());
        assert!(!take_resize());
    }

    #[test]
    fn termination_signals_set_the_exit_flag() {
        reset_for_testing();
        assert!(!exit_requested());
        handle_term(libc::SIGTERM);
        assert!(exit_requested());
    }

    #[test]
    fn cont_after_tstp_accumulates_stoppage() {
        reset_for_testing();
        TSTP_ARRIVED_NS.store(monotonic_ns().saturating_sub(5_000_000), Ordering::SeqCst);
        handle_cont(libc::SIGCONT);
        assert!(total_stoppage() >= Duration::from_millis(4));
        // The resume also forces a layout refresh.
        assert!(take_resize());
    }

    #[test]
    fn skipped_cont_changes_nothing() {
        reset_for_testing();
        SKIP_NEXT_CONT.store(1, Ordering::SeqCst);
        TSTP_ARRIVED_NS.store(1, Ordering::SeqCst);
        handle_cont(libc::SIGCONT);
        assert_eq!(TSTP_ARRIVED_NS.load(Ordering::SeqCst), 1);
        assert!(!take_resize());
        assert_eq!(SKIP_NEXT_CONT.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clear_stoppage_zeroes_the_total() {
        reset_for_testing();
        TOTAL_STOPPAGE_NS.store(42, Ordering::SeqCst);
        clear_stoppage();
        assert_eq!(total_stoppage(), Duration::ZERO);
    }

    #[test]
    fn install_succeeds() {
        let handler = install().expect("signal installation");
        assert!(!handler.exit_requested());
    }
}
