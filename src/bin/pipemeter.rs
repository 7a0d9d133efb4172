//! The `pipemeter` executable.

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Diagnostics are opt-in via PIPEMETER_DEBUG; user-facing output
    // never goes through tracing.
    if std::env::var_os("PIPEMETER_DEBUG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_env("PIPEMETER_DEBUG"))
            .with_writer(std::io::stderr)
            .init();
    }

    ExitCode::from(pipemeter_cli::run(std::env::args_os()))
}
