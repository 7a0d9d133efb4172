use memchr::memchr2;
use thiserror::Error;

/// Failure modes when parsing a numeric command-line value.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NumberError {
    /// The value contained no digits.
    #[error("not a number")]
    Empty,
    /// A character other than a digit, decimal mark, or known suffix.
    #[error("invalid number")]
    Invalid,
    /// The value does not fit in the result type.
    #[error("number too large")]
    TooLarge,
    /// A fraction or suffix was supplied where a bare integer is required.
    #[error("integer value required")]
    IntegerRequired,
}

/// Multiplier for a units suffix letter: binary shift and decimal factor.
fn suffix_factors(suffix: u8) -> Option<(u32, u128)> {
    match suffix {
        b'k' | b'K' => Some((10, 1_000)),
        b'm' | b'M' => Some((20, 1_000_000)),
        b'g' | b'G' => Some((30, 1_000_000_000)),
        b't' | b'T' => Some((40, 1_000_000_000_000)),
        _ => None,
    }
}

fn parse_digits(bytes: &[u8]) -> Result<u128, NumberError> {
    let mut value = 0u128;
    for &byte in bytes {
        if !byte.is_ascii_digit() {
            return Err(NumberError::Invalid);
        }
        value = value
            .checked_mul(10)
            .and_then(|acc| acc.checked_add(u128::from(byte - b'0')))
            .ok_or(NumberError::TooLarge)?;
    }
    Ok(value)
}

/// Splits a value into integer digits, fraction digits, and a trailing
/// suffix portion.  The decimal mark may be `.` or `,`.
fn split_value(text: &str) -> Result<(&[u8], &[u8], &[u8]), NumberError> {
    let bytes = text.trim().as_bytes();
    if bytes.is_empty() {
        return Err(NumberError::Empty);
    }

    let digits_end = bytes
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(bytes.len());
    let (integer, mut rest) = bytes.split_at(digits_end);
    if integer.is_empty() {
        return Err(NumberError::Empty);
    }

    let mut fraction: &[u8] = &[];
    if let Some(position) = memchr2(b'.', b',', rest) {
        if position != 0 {
            return Err(NumberError::Invalid);
        }
        rest = &rest[1..];
        let fraction_end = rest
            .iter()
            .position(|b| !b.is_ascii_digit())
            .unwrap_or(rest.len());
        fraction = &rest[..fraction_end];
        rest = &rest[fraction_end..];
    }

    // Spaces or tabs are tolerated between the digits and the suffix.
    while let [b' ' | b'\t', tail @ ..] = rest {
        rest = tail;
    }

    Ok((integer, fraction, rest))
}

/// Parses a size value with an optional fraction and `K`/`M`/`G`/`T`
/// suffix.  Suffixes are powers of 1024, or powers of 1000 when
/// `decimal_units` is set.
pub fn parse_size(text: &str, decimal_units: bool) -> Result<u64, NumberError> {
    let (integer, fraction, suffix) = split_value(text)?;

    let mut integral = parse_digits(integer)?;
    let mut fractional = 0u128;
    let mut divisor = 1u128;
    for &byte in fraction {
        // Fraction digits below 0.0001 cannot influence the result.
        if divisor >= 10_000 {
            break;
        }
        if !byte.is_ascii_digit() {
            return Err(NumberError::Invalid);
        }
        fractional = fractional * 10 + u128::from(byte - b'0');
        divisor *= 10;
    }

    match suffix {
        [] => {}
        [letter] => {
            let (shift, factor) = suffix_factors(*letter).ok_or(NumberError::Invalid)?;
            if decimal_units {
                integral = integral.checked_mul(factor).ok_or(NumberError::TooLarge)?;
                fractional = fractional.checked_mul(factor).ok_or(NumberError::TooLarge)?;
            } else {
                if integral.leading_zeros() < shift || fractional.leading_zeros() < shift {
                    return Err(NumberError::TooLarge);
                }
                integral <<= shift;
                fractional <<= shift;
            }
        }
        _ => return Err(NumberError::Invalid),
    }

    let total = integral
        .checked_add(fractional / divisor)
        .ok_or(NumberError::TooLarge)?;
    u64::try_from(total).map_err(|_| NumberError::TooLarge)
}

/// Parses a count (buffer size, screen columns); same grammar as
/// [`parse_size`].
pub fn parse_count(text: &str, decimal_units: bool) -> Result<u64, NumberError> {
    parse_size(text, decimal_units)
}

/// Parses a bare non-negative integer, rejecting fractions and suffixes.
pub fn parse_integer(text: &str) -> Result<u64, NumberError> {
    let (integer, fraction, suffix) = split_value(text)?;
    if !fraction.is_empty() || !suffix.is_empty() {
        return Err(NumberError::IntegerRequired);
    }
    u64::try_from(parse_digits(integer)?).map_err(|_| NumberError::TooLarge)
}

/// Parses a positive decimal time interval in seconds.  No suffix is
/// accepted.
pub fn parse_interval(text: &str) -> Result<f64, NumberError> {
    let (integer, fraction, suffix) = split_value(text)?;
    if !suffix.is_empty() {
        return Err(NumberError::Invalid);
    }

    let mut result = 0.0f64;
    for &byte in integer {
        result = result * 10.0 + f64::from(byte - b'0');
    }
    let mut step = 1.0f64;
    for &byte in fraction {
        if step >= 1_000_000.0 {
            break;
        }
        step *= 10.0;
        result += f64::from(byte - b'0') / step;
    }
    Ok(result)
}
