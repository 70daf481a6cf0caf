//! Human-readable duration strings used by configuration.

use std::time::Duration;

/// Parse a duration such as `30s`, `2m`, `1h30m` or `500ms`.
///
/// Units are `d`, `h`, `m`, `s` and `ms`; components add up. A bare number
/// is seconds. Returns `None` for empty, unknown-unit or overflowing input.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse::<u64>().ok().map(Duration::from_secs);
    }

    let mut total_ms: u64 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let value: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let scale_ms = unit_ms(&rest[..unit_len])?;
        rest = &rest[unit_len..];

        total_ms = total_ms.checked_add(value.checked_mul(scale_ms)?)?;
    }

    Some(Duration::from_millis(total_ms))
}

fn unit_ms(unit: &str) -> Option<u64> {
    match unit {
        "ms" => Some(1),
        "s" => Some(1_000),
        "m" => Some(60_000),
        "h" => Some(3_600_000),
        "d" => Some(86_400_000),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3_600)));
        assert_eq!(parse_duration("1d"), Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn parses_combined_units() {
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration(" 1h5m "), Some(Duration::from_secs(3_900)));
    }

    #[test]
    fn bare_number_is_seconds() {
        assert_eq!(parse_duration("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("30m15"), None);
        assert_eq!(parse_duration("10us"), None);
        assert_eq!(parse_duration("m5"), None);
    }

    #[test]
    fn parses_milliseconds() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("1s250ms"), Some(Duration::from_millis(1_250)));
    }

    #[test]
    fn overflow_is_rejected_not_a_panic() {
        assert_eq!(parse_duration("99999999999999999d"), None);
        assert_eq!(parse_duration("18446744073709551615s1s"), None);
        assert_eq!(parse_duration("99999999999999999999"), None);
    }
}
