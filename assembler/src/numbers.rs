//! Numeric literal parsing shared by pass 2 and address resolution.
//!
//! Accepts decimal, `0x` hex, `0o` octal, and `0b` binary, with an
//! optional leading `-`, matching `parse_immediate`/`parse_address`/
//! `parse_int` in the original source (`int(value, 0)` plus sign).

/// Parse `text` as a number if it looks like one; `None` (not an error)
/// if it doesn't, so callers can fall back to label lookup.
pub fn try_parse(text: &str) -> Option<i64> {
    let (negative, rest) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let value = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(oct) = rest.strip_prefix("0o").or_else(|| rest.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8).ok()?
    } else if let Some(bin) = rest.strip_prefix("0b").or_else(|| rest.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2).ok()?
    } else {
        rest.parse::<i64>().ok()?
    };

    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_hex_octal_binary() {
        assert_eq!(try_parse("42"), Some(42));
        assert_eq!(try_parse("0x2A"), Some(42));
        assert_eq!(try_parse("0o52"), Some(42));
        assert_eq!(try_parse("0b101010"), Some(42));
    }

    #[test]
    fn parses_negative_numbers() {
        assert_eq!(try_parse("-5"), Some(-5));
        assert_eq!(try_parse("-0x10"), Some(-16));
    }

    #[test]
    fn non_numeric_text_is_none() {
        assert_eq!(try_parse("LOOP"), None);
        assert_eq!(try_parse(""), None);
    }
}
