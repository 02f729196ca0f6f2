//! Numeric formatting and parsing.
//!
//! PRINT and `STR$` format with up to 12 significant digits, trailing
//! zeros trimmed, switching to scientific notation outside the fixed
//! range the way `%.12g` does. `VAL`, READ-into-numeric, and INPUT
//! use the prefix parse: leading whitespace and an optional sign, then
//! as many numeric characters as make sense, with 0 for no digits.

/// Significant digits carried by the formatter.
const SIGNIFICANT_DIGITS: i32 = 12;

/// Format a value with up to 12 significant digits.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }

    // Decimal exponent after rounding to 12 significant digits.
    let sci = format!("{:.*e}", (SIGNIFICANT_DIGITS - 1) as usize, value);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((mantissa, exp)) => (mantissa, exp.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exp < -4 || exp >= SIGNIFICANT_DIGITS {
        let mantissa = trim_zeros(mantissa);
        format!(
            "{}e{}{:02}",
            mantissa,
            if exp < 0 { '-' } else { '+' },
            exp.abs()
        )
    } else {
        let precision = (SIGNIFICANT_DIGITS - 1 - exp).max(0) as usize;
        let fixed = format!("{:.*}", precision, value);
        trim_zeros(&fixed).to_string()
    }
}

fn trim_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// `strtod`-style prefix parse: accepts leading blanks, a sign,
/// digits with one decimal point, and an exponent; anything after the
/// numeric prefix is ignored. No digits at all parses as 0.
pub fn parse_number(text: &str) -> f64 {
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    let start = i;

    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let mut saw_digit = false;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        saw_digit = true;
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            saw_digit = true;
            i += 1;
        }
    }
    if !saw_digit {
        return 0.0;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }

    text[start..i].parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // FORMATTING
    // =========================================================================

    #[test]
    fn test_integers_have_no_point() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-17.0), "-17");
        assert_eq!(format_number(100000.0), "100000");
    }

    #[test]
    fn test_fractions_trim_trailing_zeros() {
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(-0.5), "-0.5");
    }

    #[test]
    fn test_twelve_significant_digits() {
        // 0.1 + 0.2 rounds clean at 12 digits.
        assert_eq!(format_number(0.1 + 0.2), "0.3");
        assert_eq!(format_number(1.0 / 3.0), "0.333333333333");
    }

    #[test]
    fn test_scientific_for_large_magnitudes() {
        assert_eq!(format_number(1.0e15), "1e+15");
        assert_eq!(format_number(-2.5e20), "-2.5e+20");
    }

    #[test]
    fn test_scientific_for_small_magnitudes() {
        assert_eq!(format_number(1.0e-7), "1e-07");
        assert_eq!(format_number(0.000001), "1e-06");
        assert_eq!(format_number(0.0001), "0.0001");
    }

    // =========================================================================
    // PARSING
    // =========================================================================

    #[test]
    fn test_parse_basic_forms() {
        assert_eq!(parse_number("42"), 42.0);
        assert_eq!(parse_number("-3.5"), -3.5);
        assert_eq!(parse_number("  7"), 7.0);
        assert_eq!(parse_number(".5"), 0.5);
        assert_eq!(parse_number("1e3"), 1000.0);
        assert_eq!(parse_number("2.5E-1"), 0.25);
    }

    #[test]
    fn test_parse_prefix_only() {
        assert_eq!(parse_number("12ABC"), 12.0);
        assert_eq!(parse_number("3.5X"), 3.5);
        assert_eq!(parse_number("1E"), 1.0);
        assert_eq!(parse_number("1E+"), 1.0);
    }

    #[test]
    fn test_parse_non_numeric_is_zero() {
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("HELLO"), 0.0);
        assert_eq!(parse_number("-"), 0.0);
        assert_eq!(parse_number("."), 0.0);
    }

    // =========================================================================
    // ROUND TRIP
    // =========================================================================

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // STR$ then VAL round-trips values of up to 12 significant
            // digits.
            #[test]
            fn format_parse_round_trip(value in -1.0e8f64..1.0e8) {
                let rounded: f64 = format!("{value:.3}").parse().unwrap();
                let text = format_number(rounded);
                prop_assert_eq!(parse_number(&text), rounded);
            }

            #[test]
            fn integers_round_trip(value in -999_999_999_999i64..=999_999_999_999) {
                let text = format_number(value as f64);
                prop_assert_eq!(parse_number(&text), value as f64);
            }
        }
    }
}
