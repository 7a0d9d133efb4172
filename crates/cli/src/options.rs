//! Digesting parsed arguments into the transfer control settings.

use std::io::Seek;
use std::path::PathBuf;

use clap::ArgMatches;
use pipemeter_core::{control, terminal, Control};
use pipemeter_units::{parse_count, parse_integer, parse_interval, parse_size, NumberError};

/// A fully digested command line.
#[derive(Debug)]
pub struct Options {
    pub control: Control,
    /// Input files in order; `-` means standard input.
    pub inputs: Vec<InputSpec>,
    /// Output target; `None` means standard output.
    pub output: Option<PathBuf>,
}

/// One input source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    Stdin,
    File(PathBuf),
}

impl InputSpec {
    /// Name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            InputSpec::Stdin => "(stdin)".to_owned(),
            InputSpec::File(path) => path.display().to_string(),
        }
    }
}

/// A configuration problem: the offending option and the complaint.
#[derive(Debug)]
pub struct ConfigError {
    pub option: &'static str,
    pub message: String,
}

impl ConfigError {
    fn number(option: &'static str, error: NumberError) -> Self {
        Self {
            option,
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.option, self.message)
    }
}

fn numeric_option(
    matches: &ArgMatches,
    option: &'static str,
    decimal_units: bool,
) -> Result<Option<u64>, ConfigError> {
    match matches.get_one::<String>(option) {
        None => Ok(None),
        Some(text) => parse_size(text, decimal_units)
            .map(Some)
            .map_err(|error| ConfigError::number(option, error)),
    }
}

/// Resolves `--size @FILE`: a regular file's length, or the seekable end
/// of a block device.
fn size_of_file(path: &str) -> Result<u64, ConfigError> {
    let mut file = std::fs::File::open(path).map_err(|error| ConfigError {
        option: "size",
        message: format!("{path}: {error}"),
    })?;
    let metadata = file.metadata().map_err(|error| ConfigError {
        option: "size",
        message: format!("{path}: {error}"),
    })?;
    if metadata.is_file() {
        return Ok(metadata.len());
    }
    file.seek(std::io::SeekFrom::End(0)).map_err(|error| ConfigError {
        option: "size",
        message: format!("{path}: cannot determine size: {error}"),
    })
}

/// The standard-order default template for the enabled display options.
fn default_format(
    numeric: bool,
    name: bool,
    bytes: bool,
    bufpercent: bool,
    timer: bool,
    rate: bool,
    average_rate: bool,
    progress: bool,
    eta: bool,
    fineta: bool,
    lastwritten: usize,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut add = |enabled: bool, text: &str| {
        if enabled {
            parts.push(text.to_owned());
        }
    };

    if numeric {
        add(timer, "%t");
        add(bytes, "%b");
        add(rate, "%r");
        if !(bytes || rate) {
            parts.push("%{progress-amount-only}".to_owned());
        }
    } else {
        add(name, "%N");
        add(bytes, "%b");
        add(bufpercent, "%T");
        add(timer, "%t");
        add(rate, "%r");
        add(average_rate, "%a");
        add(progress, "%p");
        add(eta, "%e");
        add(fineta, "%I");
        if lastwritten > 0 {
            parts.push(format!("%{lastwritten}A"));
        }
    }

    parts.join(" ")
}

/// Builds the digested options from clap's matches.
pub fn digest(matches: &ArgMatches) -> Result<Options, ConfigError> {
    let decimal_units = matches.get_flag("decimal-units");

    let mut control = Control {
        decimal_units,
        line_mode: matches.get_flag("line-mode"),
        null_terminated_lines: matches.get_flag("null"),
        bits: matches.get_flag("bits"),
        force: matches.get_flag("force"),
        numeric: matches.get_flag("numeric"),
        wait_for_first_byte: matches.get_flag("wait"),
        no_display: matches.get_flag("quiet"),
        no_splice: matches.get_flag("no-splice"),
        stop_at_size: matches.get_flag("stop-at-size"),
        sync_after_write: matches.get_flag("sync"),
        direct_io: matches.get_flag("direct-io"),
        sparse_output: matches.get_flag("sparse-output"),
        discard_input: matches.get_flag("discard"),
        rate_gauge: matches.get_flag("rate-gauge"),
        show_stats: matches.get_flag("show-stats"),
        skip_errors: u32::from(matches.get_count("skip-errors")),
        ..Control::default()
    };

    if let Some(value) = matches.get_one::<String>("interval") {
        let interval = parse_interval(value)
            .map_err(|error| ConfigError::number("interval", error))?;
        control.interval = interval.clamp(control::INTERVAL_MIN, control::INTERVAL_MAX);
    }
    if let Some(value) = matches.get_one::<String>("delay-start") {
        control.delay_start =
            parse_interval(value).map_err(|error| ConfigError::number("delay-start", error))?;
    }

    if let Some(value) = matches.get_one::<String>("size") {
        control.size = if let Some(path) = value.strip_prefix('@') {
            size_of_file(path)?
        } else {
            parse_size(value, decimal_units).map_err(|error| ConfigError::number("size", error))?
        };
    }

    if let Some(rate) = numeric_option(matches, "rate-limit", decimal_units)? {
        control.rate_limit = rate;
    }
    if let Some(bytes) = numeric_option(matches, "buffer-size", decimal_units)? {
        control.target_buffer_size = bytes as usize;
    }
    if let Some(block) = numeric_option(matches, "error-skip-block", decimal_units)? {
        control.error_skip_block = block;
    }

    if let Some(value) = matches.get_one::<String>("average-rate-window") {
        let window =
            parse_integer(value).map_err(|error| ConfigError::number("average-rate-window", error))?;
        control.average_rate_window = window.clamp(1, u64::from(u32::MAX)) as u32;
    }

    let (auto_width, auto_height) = terminal::screen_size().unwrap_or((80, 25));
    match matches.get_one::<String>("width") {
        Some(value) => {
            let width = parse_count(value, decimal_units)
                .map_err(|error| ConfigError::number("width", error))?;
            control.width = width.min(u64::from(control::WIDTH_MAX)).max(1) as u16;
            control.width_set_manually = true;
        }
        None => control.width = auto_width,
    }
    match matches.get_one::<String>("height") {
        Some(value) => {
            let height = parse_count(value, decimal_units)
                .map_err(|error| ConfigError::number("height", error))?;
            control.height = height.min(u64::from(u16::MAX)).max(1) as u16;
            control.height_set_manually = true;
        }
        None => control.height = auto_height,
    }

    let lastwritten = match matches.get_one::<String>("last-written") {
        Some(value) => parse_integer(value)
            .map_err(|error| ConfigError::number("last-written", error))? as usize,
        None => 0,
    };

    control.name = matches.get_one::<String>("name").cloned();
    control.format_string = matches.get_one::<String>("format").cloned();
    if let Some(style) = matches.get_one::<String>("bar-style") {
        control.default_bar_style = style.clone();
    }

    // Display option selection, defaulting to the classic set when no
    // explicit switch was given.
    let mut progress = matches.get_flag("progress");
    let mut timer = matches.get_flag("timer");
    let mut eta = matches.get_flag("eta");
    let fineta = matches.get_flag("fineta");
    let mut rate = matches.get_flag("rate");
    let average_rate = matches.get_flag("average-rate");
    let mut bytes = matches.get_flag("bytes");
    let bufpercent = matches.get_flag("buffer-percent");

    let any_display_chosen = progress
        || timer
        || eta
        || fineta
        || rate
        || average_rate
        || bytes
        || bufpercent
        || lastwritten > 0
        || control.format_string.is_some();
    if !any_display_chosen {
        progress = true;
        timer = true;
        eta = true;
        rate = true;
        bytes = true;
    }

    control.default_format = default_format(
        control.numeric,
        control.name.is_some(),
        bytes,
        bufpercent,
        timer,
        rate,
        average_rate,
        progress,
        eta,
        fineta,
        lastwritten,
    );

    let inputs: Vec<InputSpec> = match matches.get_many::<String>("FILE") {
        None => vec![InputSpec::Stdin],
        Some(files) => files
            .map(|file| {
                if file == "-" {
                    InputSpec::Stdin
                } else {
                    InputSpec::File(PathBuf::from(file))
                }
            })
            .collect(),
    };

    let output = matches
        .get_one::<String>("output")
        .filter(|path| path.as_str() != "-")
        .map(PathBuf::from);
    control.output_name = output.as_ref().map(|path| path.display().to_string());

    Ok(Options {
        control,
        inputs,
        output,
    })
}
