/// What a transfer total is counting, which selects the divisor and the
/// prefix table used when formatting magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountKind {
    /// Bytes with IEC prefixes (KiB, MiB, ...), divisor 1024.
    #[default]
    Bytes,
    /// Bytes with decimal prefixes (kB, MB, ...), divisor 1000.
    DecimalBytes,
    /// Lines (or other plain counts), divisor 1000.
    Lines,
}

impl CountKind {
    /// Divisor between adjacent prefixes.
    pub fn ratio(self) -> f64 {
        match self {
            CountKind::Bytes => 1024.0,
            CountKind::DecimalBytes | CountKind::Lines => 1000.0,
        }
    }
}

/// Prefix letters in increasing order of magnitude, with the no-prefix
/// space in the middle; moving left of the space divides (milli, micro,
/// ...), moving right multiplies (kilo, mega, ...).
const PREFIXES_DECIMAL: &[u8] = b"yzafpnum kMGTPEZY";
const PREFIXES_BINARY: &[u8] = b"yzafpnum KMGTPEZY";
const NO_PREFIX_INDEX: usize = 8;

/// Scales `value` into the range 1.0..1000 (or 1.0..1024) and returns the
/// matching prefix: one character, or two for [`CountKind::Bytes`] where
/// IEC prefixes carry a trailing `i` (`Ki`, `Mi`, ...).
pub fn si_prefix(value: &mut f64, kind: CountKind) -> String {
    let table = match kind {
        CountKind::Bytes => PREFIXES_BINARY,
        _ => PREFIXES_DECIMAL,
    };
    let ratio = kind.ratio();

    // A near-zero value keeps the blank prefix so we don't show "0yB".
    if value.abs() < 0.000_000_01 {
        return if kind == CountKind::Bytes {
            "  ".to_owned()
        } else {
            " ".to_owned()
        };
    }

    let mut index = NO_PREFIX_INDEX;
    let mut prefix = b' ';

    // Move to the next prefix a little before the ratio itself.
    let cutoff = ratio * 0.97;

    while value.abs() > cutoff && index + 1 < table.len() {
        index += 1;
        *value /= ratio;
        prefix = table[index];
    }
    while value.abs() < 1.0 && index > 0 {
        index -= 1;
        *value *= ratio;
        prefix = table[index];
    }

    if kind == CountKind::Bytes {
        let tail = if prefix == b' ' { ' ' } else { 'i' };
        format!("{}{}", prefix as char, tail)
    } else {
        (prefix as char).to_string()
    }
}

/// Formats `amount` as 3-4 significant digits, an SI/IEC prefix, and one
/// of the two suffixes: `suffix_bytes` for byte counts, `suffix_basic`
/// otherwise.
pub fn describe_with(
    amount: f64,
    suffix_basic: &str,
    suffix_bytes: &str,
    kind: CountKind,
) -> String {
    let suffix = match kind {
        CountKind::Bytes | CountKind::DecimalBytes => suffix_bytes,
        CountKind::Lines => suffix_basic,
    };

    let mut value = amount;
    let prefix = si_prefix(&mut value, kind);

    // Keep the number inside its 4-character field.
    value = value.clamp(-100_000.0, 100_000.0);

    let digits = if value.abs() > 99.9 {
        format!("{:>4}", value as i64)
    } else if value.abs() >= 10.0 {
        format!("{value:>4.1}")
    } else {
        format!("{value:>4.2}")
    };

    format!("{digits}{prefix}{suffix}")
}

/// Formats a transferred amount with a bare `B` (or nothing, for lines).
pub fn describe_amount(amount: f64, kind: CountKind) -> String {
    describe_with(amount, "", "B", kind)
}

/// Returns `100 * amount / total`, or 0 when `total` is not positive.
pub fn percentage(amount: u64, total: u64) -> f64 {
    if total < 1 {
        return 0.0;
    }
    amount as f64 * 100.0 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_keeps_blank_prefix() {
        assert_eq!(describe_amount(0.0, CountKind::Bytes), "0.00  B");
        assert_eq!(describe_with(0.0, "/s", "B/s", CountKind::Lines), "0.00 /s");
    }

    #[test]
    fn bytes_use_iec_prefixes() {
        assert_eq!(describe_amount(2048.0, CountKind::Bytes), "2.00KiB");
        assert_eq!(describe_amount(3.0 * 1024.0 * 1024.0, CountKind::Bytes), "3.00MiB");
        assert_eq!(describe_amount(1536.0, CountKind::Bytes), "1.50KiB");
    }

    #[test]
    fn decimal_bytes_use_si_prefixes() {
        assert_eq!(describe_amount(2000.0, CountKind::DecimalBytes), "2.00kB");
        assert_eq!(describe_amount(5_000_000.0, CountKind::DecimalBytes), "5.00MB");
    }

    #[test]
    fn lines_have_no_byte_marker() {
        assert_eq!(describe_with(1500.0, "/s", "B/s", CountKind::Lines), "1.50k/s");
        assert_eq!(describe_with(20.0, "/s", "B/s", CountKind::Lines), "20.0 /s");
    }

    #[test]
    fn small_values_scale_down() {
        let mut value = 0.5;
        let prefix = si_prefix(&mut value, CountKind::Lines);
        assert_eq!(prefix, "m");
        assert!((value - 500.0).abs() < 1e-9);
    }

    #[test]
    fn mid_range_keeps_three_digits() {
        assert_eq!(describe_amount(100.0 * 1024.0, CountKind::Bytes), " 100KiB");
        assert_eq!(describe_amount(99.0, CountKind::Bytes), "99.0  B");
    }

    #[test]
    fn values_just_under_the_ratio_stay_unscaled() {
        // 1000 is divided by the cutoff rule but multiplied straight back
        // because the scaled value drops below 1.0.
        assert_eq!(describe_amount(1000.0, CountKind::Bytes), "1000  B");
        assert_eq!(describe_amount(1030.0, CountKind::Bytes), "1.01KiB");
    }

    #[test]
    fn percentage_basics() {
        assert!((percentage(50, 100) - 50.0).abs() < f64::EPSILON);
        assert!((percentage(0, 100)).abs() < f64::EPSILON);
        assert!((percentage(5, 0)).abs() < f64::EPSILON);
        assert!((percentage(150, 100) - 150.0).abs() < f64::EPSILON);
    }

    #[test]
    fn format_reparses_to_same_magnitude() {
        // "2.00KiB" reparsed as a size comes back to the same byte count.
        let rendered = describe_amount(2048.0, CountKind::Bytes);
        let numeric: String = rendered
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let reparsed = crate::parse_size(&format!("{numeric}K"), false).unwrap();
        assert_eq!(reparsed, 2048);
    }
}
