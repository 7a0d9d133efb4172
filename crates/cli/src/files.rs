//! Input-file sequencing.
//!
//! Inputs are consumed strictly in order.  An unreadable input is
//! reported once and skipped, like `cat(1)`, with the access bit set in
//! the exit status; the transfer then continues with the next file.

use std::fs::File;
use std::os::fd::{AsRawFd, RawFd};

use pipemeter_core::{report, ExitStatus};

use crate::options::InputSpec;

/// An open input: either borrowed stdin or an owned file.
#[derive(Debug)]
pub enum OpenInput {
    Stdin,
    File { file: File, name: String },
}

impl OpenInput {
    #[must_use]
    pub fn fd(&self) -> RawFd {
        match self {
            OpenInput::Stdin => libc::STDIN_FILENO,
            OpenInput::File { file, .. } => file.as_raw_fd(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            OpenInput::Stdin => "(stdin)",
            OpenInput::File { name, .. } => name,
        }
    }
}

/// Opens the input at `index`, reporting and recording a failure.
pub fn open_input(spec: &InputSpec, status: &mut ExitStatus) -> Option<OpenInput> {
    match spec {
        InputSpec::Stdin => Some(OpenInput::Stdin),
        InputSpec::File(path) => match File::open(path) {
            Ok(file) => {
                let name = path.display().to_string();
                Some(OpenInput::File { file, name })
            }
            Err(error) => {
                report::error(&format!("{}: {error}", path.display()));
                status.set(ExitStatus::ACCESS);
                None
            }
        },
    }
}

/// Walks forward from `index` until an input opens, returning it and
/// the index it was found at.
pub fn open_next(
    inputs: &[InputSpec],
    mut index: usize,
    status: &mut ExitStatus,
) -> Option<(OpenInput, usize)> {
    while index < inputs.len() {
        if let Some(input) = open_input(&inputs[index], status) {
            return Some((input, index));
        }
        index += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_files_set_the_access_bit_and_are_skipped() {
        let mut status = ExitStatus::new();
        let inputs = vec![
            InputSpec::File(PathBuf::from("/nonexistent/input")),
            InputSpec::Stdin,
        ];
        let (input, index) = open_next(&inputs, 0, &mut status).expect("stdin fallback");
        assert_eq!(index, 1);
        assert_eq!(input.fd(), libc::STDIN_FILENO);
        assert!(status.contains(ExitStatus::ACCESS));
    }

    #[test]
    fn all_unreadable_inputs_yield_nothing() {
        let mut status = ExitStatus::new();
        let inputs = vec![InputSpec::File(PathBuf::from("/nonexistent/input"))];
        assert!(open_next(&inputs, 0, &mut status).is_none());
        assert!(status.contains(ExitStatus::ACCESS));
    }

    #[test]
    fn readable_files_open_with_their_name() {
        use std::io::Write as _;
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(b"data").expect("write");
        let mut status = ExitStatus::new();
        let spec = InputSpec::File(file.path().to_path_buf());
        let input = open_input(&spec, &mut status).expect("open");
        assert!(status.is_success());
        assert_eq!(input.name(), file.path().display().to_string());
    }
}
