//! Command-line frontend: argument digestion, setup and teardown around
//! the transfer loop, and exit-status mapping.

pub mod command;
pub mod files;
pub mod main_loop;
pub mod options;

use std::ffi::OsString;
use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::Path;

use pipemeter_core::{report, signal, terminal, ExitStatus};

/// Runs the program with the given arguments (including argv[0]) and
/// returns the exit code: zero on success, the accumulated error
/// bitmask otherwise, or 1 for a configuration problem.
pub fn run<I, S>(arguments: I) -> u8
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let arguments: Vec<OsString> = arguments.into_iter().map(Into::into).collect();

    let program_name = arguments
        .first()
        .map(Path::new)
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .unwrap_or(env!("CARGO_PKG_NAME"))
        .to_owned();
    report::set_program_name(&program_name);

    let matches = match command::build_command(&program_name).try_get_matches_from(arguments) {
        Ok(matches) => matches,
        Err(error) => {
            let code = if error.use_stderr() { 1 } else { 0 };
            let _ = error.print();
            return code;
        }
    };

    let mut options = match options::digest(&matches) {
        Ok(options) => options,
        Err(error) => {
            report::error(&error.to_string());
            return 1;
        }
    };

    let mut status = ExitStatus::new();

    if let Err(error) = signal::install() {
        report::error(&format!("cannot install signal handlers: {error}"));
        status.set(ExitStatus::SIGNAL);
        return status.code();
    }

    // The output file handle must outlive the loop; stdout is borrowed.
    let output_file: Option<File> = match &options.output {
        None => None,
        Some(path) => match File::create(path) {
            Ok(file) => Some(file),
            Err(error) => {
                report::error(&format!("{}: {error}", path.display()));
                status.set(ExitStatus::ACCESS);
                return status.code();
            }
        },
    };
    let output_fd = output_file
        .as_ref()
        .map_or(libc::STDOUT_FILENO, |file| file.as_raw_fd());

    main_loop::run(&mut options.control, &options.inputs, output_fd, &mut status);

    terminal::restore_tostop();

    status.code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_request_succeeds() {
        assert_eq!(run(["pipemeter", "--version"]), 0);
    }

    #[test]
    fn help_request_succeeds() {
        assert_eq!(run(["pipemeter", "--help"]), 0);
    }

    #[test]
    fn bad_option_fails() {
        assert_eq!(run(["pipemeter", "--definitely-not-an-option"]), 1);
    }

    #[test]
    fn bad_number_fails() {
        assert_eq!(run(["pipemeter", "-q", "-s", "wibble"]), 1);
    }
}
