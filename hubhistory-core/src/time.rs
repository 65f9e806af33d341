// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Timestamp helpers
//!
//! History keys use milliseconds since the Unix epoch. Callers seeking into
//! the history pass human readable times, so [`parse_timestamp`] accepts the
//! common textual layouts rather than strict ISO-8601 only.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Layouts without a zone, interpreted in local time.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Layouts carrying a numeric zone offset without a colon.
const ZONED_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S %z",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Current time in milliseconds since the Unix epoch.
pub fn now_msec() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parse a textual timestamp into milliseconds since the Unix epoch.
///
/// Accepts RFC 3339, RFC 2822, `YYYY-MM-DD[ T]HH:MM[:SS[.fff]]` with or
/// without a numeric offset, date-only forms (including compact
/// `YYYYMMDD`) and plain integers (taken as epoch milliseconds). Times without a zone are local time.
/// Returns `None` when nothing matches.
pub fn parse_timestamp(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    // eight digits read as a compact date, not as a 1970 epoch time
    if text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y%m%d") {
            return local_msec(date.and_hms_opt(0, 0, 0)?);
        }
    }
    if let Ok(msec) = text.parse::<i64>() {
        return (msec >= 0).then_some(msec);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ZONED_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt.timestamp_millis());
        }
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return local_msec(naive);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return local_msec(date.and_hms_opt(0, 0, 0)?);
        }
    }
    None
}

fn local_msec(naive: NaiveDateTime) -> Option<i64> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339() {
        assert_eq!(
            parse_timestamp("2023-11-14T22:13:20Z"),
            Some(1_700_000_000_000)
        );
        assert_eq!(
            parse_timestamp("2023-11-14T23:13:20.250+01:00"),
            Some(1_700_000_000_250)
        );
    }

    #[test]
    fn test_rfc2822_and_offset_without_colon() {
        assert_eq!(
            parse_timestamp("Tue, 14 Nov 2023 22:13:20 +0000"),
            Some(1_700_000_000_000)
        );
        assert_eq!(
            parse_timestamp("2023-11-14T22:13:20+0000"),
            Some(1_700_000_000_000)
        );
    }

    #[test]
    fn test_naive_is_local_time() {
        let expected = Local
            .with_ymd_and_hms(2023, 11, 14, 8, 30, 0)
            .earliest()
            .unwrap()
            .timestamp_millis();
        assert_eq!(parse_timestamp("2023-11-14 08:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2023-11-14T08:30"), Some(expected));
    }

    #[test]
    fn test_epoch_millis() {
        assert_eq!(parse_timestamp("1700000000000"), Some(1_700_000_000_000));
        assert_eq!(parse_timestamp("-5"), None);
    }

    #[test]
    fn test_compact_date() {
        let expected = Local
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2023, 11, 14)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            )
            .earliest()
            .unwrap()
            .timestamp_millis();
        assert_eq!(parse_timestamp("20231114"), Some(expected));
        // not a valid date, so still epoch milliseconds
        assert_eq!(parse_timestamp("99999999"), Some(99_999_999));
    }

    #[test]
    fn test_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday-ish"), None);
        assert_eq!(parse_timestamp("2023-13-45"), None);
    }

    #[test]
    fn test_now_is_recent() {
        assert!(now_msec() > 1_577_836_800_000);
    }
}
