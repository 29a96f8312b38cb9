use anyhow::{Context, Result};
use chrono::NaiveDateTime;

/// Format used when writing completion markers.
const MARKER_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
/// Accepted when reading markers back; the fractional seconds are optional.
const MARKER_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Render a local wall-clock time the way completion markers record it,
/// e.g. `2024-03-01 10:15:42.000123`.
pub fn format_marker_timestamp(t: &NaiveDateTime) -> String {
    t.format(MARKER_FORMAT).to_string()
}

/// Parse a timestamp previously written by [`format_marker_timestamp`].
pub fn parse_marker_timestamp(t: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(t.trim(), MARKER_PARSE_FORMAT)
        .with_context(|| format!("Parsing timestamp {t:?}"))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_format() {
        let t = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_micro_opt(10, 15, 42, 123)
            .unwrap();
        similar_asserts::assert_eq!(format_marker_timestamp(&t), "2024-03-01 10:15:42.000123");
        assert_eq!(parse_marker_timestamp(&format_marker_timestamp(&t)).unwrap(), t);
    }

    #[test]
    fn test_parse() {
        let t = parse_marker_timestamp("2024-03-01 10:15:42").unwrap();
        assert_eq!(t.to_string(), "2024-03-01 10:15:42");
        assert!(parse_marker_timestamp("2024-03-01 10:15:42.5\n").is_ok());
        for bad in ["", "yesterday", "2024-03-01", "2024-13-01 10:15:42"] {
            let e = parse_marker_timestamp(bad).unwrap_err();
            assert!(e.to_string().starts_with("Parsing timestamp"), "{bad}: {e}");
        }
    }
}
