//! Lenient text parsing for attribute arguments
//!
//! Control surfaces hand attribute arguments over as strings. Each parser
//! trims whitespace and returns `None` instead of guessing on bad input.

/// Parse a boolean: true/false, 1/0, yes/no, on/off (any case)
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse an integer, accepting integral float text such as "3.0"
pub fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(v) = text.parse::<i64>() {
        return Some(v);
    }
    let v = text.parse::<f64>().ok()?;
    let in_range = v >= i64::MIN as f64 && v < i64::MAX as f64;
    (v.is_finite() && v.fract() == 0.0 && in_range).then_some(v as i64)
}

/// Parse a finite float
pub fn parse_float(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("true", Some(true))]
    #[test_case(" ON ", Some(true))]
    #[test_case("1", Some(true))]
    #[test_case("No", Some(false))]
    #[test_case("0", Some(false))]
    #[test_case("maybe", None)]
    #[test_case("", None)]
    fn test_parse_bool(input: &str, expected: Option<bool>) {
        assert_eq!(parse_bool(input), expected);
    }

    #[test_case("42", Some(42))]
    #[test_case("-7", Some(-7))]
    #[test_case(" 3.0 ", Some(3))]
    #[test_case("3.5", None)]
    #[test_case("1e3", Some(1000))]
    #[test_case("inf", None)]
    #[test_case("twelve", None)]
    #[test_case("9223372036854775807", Some(i64::MAX))]
    #[test_case("9223372036854775808", None)]
    #[test_case("9.3e18", None)]
    #[test_case("-9223372036854775808", Some(i64::MIN))]
    fn test_parse_int(input: &str, expected: Option<i64>) {
        assert_eq!(parse_int(input), expected);
    }

    #[test_case("0.25", Some(0.25))]
    #[test_case("2", Some(2.0))]
    #[test_case("-1e-3", Some(-0.001))]
    #[test_case("NaN", None)]
    #[test_case("0.5dB", None)]
    fn test_parse_float(input: &str, expected: Option<f64>) {
        assert_eq!(parse_float(input), expected);
    }
}
