//! Numeric parsing and magnitude formatting.
//!
//! Command-line values such as sizes, rates, and buffer lengths are written
//! as a digit sequence with an optional decimal fraction and an optional
//! `K`/`M`/`G`/`T` suffix.  Suffixes multiply by powers of 1024 by default
//! and powers of 1000 when decimal units are requested.  The formatting
//! half of the crate goes the other way, reducing a magnitude to three or
//! four significant digits with the matching SI or IEC prefix.

mod format;
mod parse;

pub use format::{describe_amount, describe_with, percentage, si_prefix, CountKind};
pub use parse::{parse_count, parse_integer, parse_interval, parse_size, NumberError};
