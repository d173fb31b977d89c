use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%m/%d/%Y", "%d %B %Y", "%B %d, %Y"];

/// Parse a date/time cell. Empty or unrecognised text yields `None`; callers
/// store that as a null cell instead of failing the load.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let s = text.trim();
    if s.is_empty() {
        return None;
    }

    // Offsets are dropped after conversion to UTC.
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd_hms(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn parses_iso_forms() {
        assert_eq!(parse_datetime("2024-01-05 10:30:00"), Some(ymd_hms(2024, 1, 5, 10, 30, 0)));
        assert_eq!(parse_datetime("2024-01-05T10:30:00.250"), Some(
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().and_hms_milli_opt(10, 30, 0, 250).unwrap()
        ));
        assert_eq!(parse_datetime(" 2024-01-05 "), Some(ymd_hms(2024, 1, 5, 0, 0, 0)));
    }

    #[test]
    fn parses_rfc3339_as_utc() {
        assert_eq!(
            parse_datetime("2024-01-05T10:30:00+02:00"),
            Some(ymd_hms(2024, 1, 5, 8, 30, 0))
        );
    }

    #[test]
    fn parses_us_and_slash_forms() {
        assert_eq!(parse_datetime("01/05/2024"), Some(ymd_hms(2024, 1, 5, 0, 0, 0)));
        assert_eq!(parse_datetime("2024/01/05 07:15"), Some(ymd_hms(2024, 1, 5, 7, 15, 0)));
        assert_eq!(parse_datetime("01/05/2024 3:04 PM"), Some(ymd_hms(2024, 1, 5, 15, 4, 0)));
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_datetime(""), None);
        assert_eq!(parse_datetime("   "), None);
        assert_eq!(parse_datetime("not a date"), None);
        assert_eq!(parse_datetime("2024-13-45"), None);
    }
}
