//! The clap command definition.

use clap::{Arg, ArgAction, Command};

/// Builds the argument parser.
pub fn build_command(program_name: &str) -> Command {
    Command::new(program_name.to_owned())
        .about("Monitor the progress of data through a pipeline")
        .version(env!("CARGO_PKG_VERSION"))
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(
            Arg::new("help")
                .short('h')
                .long("help")
                .action(ArgAction::Help)
                .help("show this help and exit"),
        )
        .arg(
            Arg::new("version")
                .short('V')
                .long("version")
                .action(ArgAction::Version)
                .help("show version information and exit"),
        )
        // Display switches.
        .arg(flag('p', "progress", "show progress bar"))
        .arg(flag('t', "timer", "show elapsed time"))
        .arg(flag('e', "eta", "show estimated time of arrival (completion)"))
        .arg(flag('I', "fineta", "show absolute estimated time of arrival (completion)"))
        .arg(flag('r', "rate", "show data transfer rate counter"))
        .arg(flag('a', "average-rate", "show data transfer average rate counter"))
        .arg(flag('b', "bytes", "show number of bytes transferred"))
        .arg(flag('8', "bits", "show bits instead of bytes"))
        .arg(
            Arg::new("decimal-units")
                .long("decimal-units")
                .action(ArgAction::SetTrue)
                .help("use powers of 1000 rather than 1024"),
        )
        .arg(flag('T', "buffer-percent", "show percentage of transfer buffer in use"))
        .arg(
            Arg::new("last-written")
                .short('A')
                .long("last-written")
                .value_name("NUM")
                .help("show NUM bytes last written"),
        )
        .arg(
            Arg::new("format")
                .short('F')
                .long("format")
                .value_name("FORMAT")
                .help("set output format to FORMAT"),
        )
        .arg(flag('n', "numeric", "output percentages, not visual information"))
        .arg(flag('q', "quiet", "do not output any transfer information at all"))
        .arg(flag('v', "show-stats", "show statistics at the end of the transfer"))
        .arg(flag('g', "rate-gauge", "with unknown size, show rate against maximum seen"))
        .arg(
            Arg::new("bar-style")
                .long("bar-style")
                .value_name("STYLE")
                .help("set default progress bar style"),
        )
        // Transfer modifiers.
        .arg(flag('W', "wait", "display nothing until first byte transferred"))
        .arg(
            Arg::new("delay-start")
                .short('D')
                .long("delay-start")
                .value_name("SEC")
                .help("display nothing until SEC seconds have passed"),
        )
        .arg(
            Arg::new("size")
                .short('s')
                .long("size")
                .value_name("SIZE")
                .help("set estimated data size to SIZE bytes, or @FILE for the size of FILE"),
        )
        .arg(flag('l', "line-mode", "count lines instead of bytes"))
        .arg(flag('0', "null", "lines are null-terminated"))
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .value_name("SEC")
                .help("update every SEC seconds"),
        )
        .arg(
            Arg::new("width")
                .short('w')
                .long("width")
                .value_name("WIDTH")
                .help("assume terminal is WIDTH characters wide"),
        )
        .arg(
            Arg::new("height")
                .short('H')
                .long("height")
                .value_name("HEIGHT")
                .help("assume terminal is HEIGHT rows high"),
        )
        .arg(
            Arg::new("name")
                .short('N')
                .long("name")
                .value_name("NAME")
                .help("prefix visual information with NAME"),
        )
        .arg(flag('f', "force", "output even if standard error is not a terminal"))
        .arg(
            Arg::new("rate-limit")
                .short('L')
                .long("rate-limit")
                .value_name("RATE")
                .help("limit transfer to RATE bytes per second"),
        )
        .arg(
            Arg::new("buffer-size")
                .short('B')
                .long("buffer-size")
                .value_name("BYTES")
                .help("use a buffer size of BYTES"),
        )
        .arg(flag('C', "no-splice", "never use splice(), always use read/write"))
        .arg(
            Arg::new("skip-errors")
                .short('E')
                .long("skip-errors")
                .action(ArgAction::Count)
                .help("skip read errors in input; repeat to report each skip"),
        )
        .arg(
            Arg::new("error-skip-block")
                .short('Z')
                .long("error-skip-block")
                .value_name("BYTES")
                .help("skip errors in BYTES blocks instead of adaptively"),
        )
        .arg(flag('S', "stop-at-size", "stop after --size bytes have been transferred"))
        .arg(flag('Y', "sync", "flush cache to storage after every write"))
        .arg(flag('K', "direct-io", "use direct I/O, bypassing cache"))
        .arg(
            Arg::new("sparse-output")
                .short('X')
                .long("sparse-output")
                .alias("sparse")
                .action(ArgAction::SetTrue)
                .help("write all-zero blocks as holes in the output"),
        )
        .arg(
            Arg::new("discard")
                .long("discard")
                .action(ArgAction::SetTrue)
                .help("discard input data rather than writing it anywhere"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("write data to FILE instead of standard output"),
        )
        .arg(
            Arg::new("average-rate-window")
                .short('m')
                .long("average-rate-window")
                .value_name("SEC")
                .help("compute average rate over the past SEC seconds"),
        )
        .arg(
            Arg::new("FILE")
                .action(ArgAction::Append)
                .help("input files; - means standard input"),
        )
}

fn flag(short: char, long: &'static str, help: &'static str) -> Arg {
    Arg::new(long)
        .short(short)
        .long(long)
        .action(ArgAction::SetTrue)
        .help(help)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_parses_typical_invocations() {
        let command = build_command("pipemeter");
        let matches = command
            .try_get_matches_from(["pipemeter", "-pterb", "-s", "100M", "-L", "1M", "file.bin"])
            .expect("parse");
        assert!(matches.get_flag("progress"));
        assert!(matches.get_flag("timer"));
        assert!(matches.get_flag("eta"));
        assert!(matches.get_flag("rate"));
        assert!(matches.get_flag("bytes"));
        assert_eq!(
            matches.get_one::<String>("size").map(String::as_str),
            Some("100M")
        );
        let files: Vec<_> = matches
            .get_many::<String>("FILE")
            .expect("files")
            .collect();
        assert_eq!(files, ["file.bin"]);
    }

    #[test]
    fn skip_errors_counts_repeats() {
        let command = build_command("pipemeter");
        let matches = command
            .try_get_matches_from(["pipemeter", "-E", "-E"])
            .expect("parse");
        assert_eq!(matches.get_count("skip-errors"), 2);
    }

    #[test]
    fn unknown_options_are_rejected() {
        let command = build_command("pipemeter");
        assert!(command
            .try_get_matches_from(["pipemeter", "--no-such-option"])
            .is_err());
    }
}
