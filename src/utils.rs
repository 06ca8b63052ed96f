// Utility functions
use chrono::{DateTime, NaiveDate};

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parses a period given either as `YYYY-MM-DD` or as an RFC 3339 timestamp.
pub fn parse_period(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}

/// Trims and collapses runs of whitespace into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round2_keeps_two_decimals() {
        assert_eq!(round2(3.333_333), 3.33);
        assert_eq!(round2(-0.005_1), -0.01);
        assert_eq!(round2(620.0), 620.0);
    }

    #[test]
    fn parse_period_accepts_date_and_timestamp() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 2);
        assert_eq!(parse_period("2024-01-02"), expected);
        assert_eq!(parse_period("2024-01-02T00:00:00Z"), expected);
        assert_eq!(parse_period("02/01/2024"), None);
    }

    #[test]
    fn collapse_whitespace_normalizes_names() {
        assert_eq!(collapse_whitespace("  Cross   River "), "Cross River");
    }
}
