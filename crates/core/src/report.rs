//! User-facing diagnostics.
//!
//! Errors are prefixed with the program name and written to stderr.  Once
//! any progress output has been produced, each error is preceded by a
//! newline so it lands on its own line instead of overwriting the status
//! line; the status line then resumes below it on the next refresh.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

static PROGRAM_NAME: OnceLock<String> = OnceLock::new();
static OUTPUT_PRODUCED: AtomicBool = AtomicBool::new(false);

/// Sets the prefix used for error messages.  Later calls are ignored.
pub fn set_program_name(name: &str) {
    let _ = PROGRAM_NAME.set(name.to_owned());
}

/// Records that progress output has been written to the terminal.
pub fn note_output_produced() {
    OUTPUT_PRODUCED.store(true, Ordering::SeqCst);
}

/// True once any progress output has been produced.
#[must_use]
pub fn output_produced() -> bool {
    OUTPUT_PRODUCED.load(Ordering::SeqCst)
}

/// Writes one error line to stderr.
pub fn error(message: &str) {
    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    if OUTPUT_PRODUCED.load(Ordering::SeqCst) {
        let _ = handle.write_all(b"\n");
    }
    if let Some(name) = PROGRAM_NAME.get() {
        let _ = write!(handle, "{name}: ");
    }
    let _ = writeln!(handle, "{message}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_flag_latches() {
        note_output_produced();
        assert!(output_produced());
    }
}
