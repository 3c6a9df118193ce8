use chrono::{DateTime, SecondsFormat, Utc};

/// `2025-06-10T04:00:00.000Z`, the shape browsers produce with `toISOString`.
pub fn format_iso8601(datetime: DateTime<Utc>) -> String {
    datetime.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_feed_date(date_str: &str) -> Option<DateTime<Utc>> {
    let date_str = date_str.trim();

    DateTime::parse_from_rfc2822(date_str)
        .or_else(|_| DateTime::parse_from_rfc3339(date_str))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Normalizes an item's `pubDate`. Dates we cannot read are kept as they came,
/// a missing or blank date becomes `now`.
pub fn normalize_pub_date(raw: Option<&str>, now: DateTime<Utc>) -> String {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(date_str) => match parse_feed_date(date_str) {
            Some(dt) => format_iso8601(dt),
            None => date_str.to_string(),
        },
        None => format_iso8601(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rfc2822_is_converted_to_utc() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            normalize_pub_date(Some("Tue, 10 Jun 2025 06:30:00 +0200"), now),
            "2025-06-10T04:30:00.000Z"
        );
    }

    #[test]
    fn rfc3339_is_accepted() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            normalize_pub_date(Some("2025-06-10T04:30:00Z"), now),
            "2025-06-10T04:30:00.000Z"
        );
    }

    #[test]
    fn missing_date_uses_now() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(normalize_pub_date(None, now), "2026-03-04T05:06:07.000Z");
        assert_eq!(normalize_pub_date(Some("  "), now), "2026-03-04T05:06:07.000Z");
    }

    #[test]
    fn unreadable_date_passes_through() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(normalize_pub_date(Some(" yesterday "), now), "yesterday");
    }
}
