// =============================================================================
// Time Normalizer — heterogeneous timestamps to epoch seconds
// =============================================================================
//
// Upstream rows carry time as epoch seconds, epoch milliseconds, numeric
// strings, `DD-MM-YYYY[ HH:mm:ss]` broker strings, or ISO/RFC dates.
//
//   number > 1e12  => milliseconds, floored to seconds
//   number > 1e9   => already seconds
//   anything else  => rejected
//
// `None` means "discard this record". It is never a stand-in for zero or now.
// =============================================================================

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use serde_json::Value;

const MILLIS_THRESHOLD: f64 = 1e12;
const SECONDS_THRESHOLD: f64 = 1e9;

/// Broker `DD-MM-YYYY` layouts, tried before the generic date formats.
const DMY_DATETIME_FORMATS: &[&str] = &["%d-%m-%Y %H:%M:%S", "%d-%m-%Y %H:%M"];
const DMY_DATE_FORMAT: &str = "%d-%m-%Y";

/// Zone-less layouts accepted as "any other parseable date string".
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];
const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Epoch seconds for `raw`, with zone-less strings interpreted in `offset`.
pub fn normalize(raw: &Value, offset: FixedOffset) -> Option<i64> {
    let secs = match raw {
        Value::Number(n) => from_number(n.as_f64()?),
        Value::String(s) => from_str(s.trim(), offset),
        _ => None,
    }?;
    (secs > 0).then_some(secs)
}

/// Offset east of UTC in minutes; out-of-range values fall back to UTC.
pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(utc_offset)
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

fn from_number(value: f64) -> Option<i64> {
    if !value.is_finite() {
        return None;
    }
    let secs = if value > MILLIS_THRESHOLD {
        (value / 1000.0).floor()
    } else if value > SECONDS_THRESHOLD {
        value.floor()
    } else {
        return None;
    };
    // `as` saturates; anything chrono cannot place on the calendar is garbage.
    if secs >= i64::MAX as f64 {
        return None;
    }
    let secs = secs as i64;
    DateTime::from_timestamp(secs, 0).map(|_| secs)
}

fn from_str(s: &str, offset: FixedOffset) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<f64>() {
        return from_number(n);
    }
    if let Some(naive) = parse_dmy(s) {
        return localize(naive, offset);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.timestamp());
    }
    NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NAIVE_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .and_then(|naive| localize(naive, offset))
}

fn parse_dmy(s: &str) -> Option<NaiveDateTime> {
    DMY_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, DMY_DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn localize(naive: NaiveDateTime, offset: FixedOffset) -> Option<i64> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.timestamp())
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc() -> FixedOffset {
        offset_from_minutes(0)
    }

    // 2023-11-14T22:13:20Z
    const INSTANT: i64 = 1_700_000_000;

    #[test]
    fn all_encodings_of_one_instant_agree() {
        let encodings = [
            json!(INSTANT),
            json!(1_700_000_000_000i64),
            json!(1_700_000_000_999i64),
            json!("1700000000"),
            json!("1700000000000"),
            json!("14-11-2023 22:13:20"),
            json!("2023-11-14T22:13:20Z"),
            json!("2023-11-14T22:13:20+00:00"),
            json!("2023-11-14 22:13:20"),
            json!("Tue, 14 Nov 2023 22:13:20 +0000"),
        ];
        for raw in &encodings {
            assert_eq!(normalize(raw, utc()), Some(INSTANT), "encoding {raw}");
        }
    }

    #[test]
    fn fractional_seconds_are_floored() {
        assert_eq!(normalize(&json!(1_700_000_000.75), utc()), Some(INSTANT));
    }

    #[test]
    fn date_only_dmy_is_midnight() {
        assert_eq!(normalize(&json!("14-11-2023"), utc()), Some(1_699_920_000));
    }

    #[test]
    fn dmy_respects_feed_offset() {
        let ist = offset_from_minutes(330);
        assert_eq!(
            normalize(&json!("15-11-2023 03:43:20"), ist),
            Some(INSTANT)
        );
        // Explicit zones ignore the configured offset.
        assert_eq!(
            normalize(&json!("2023-11-14T22:13:20Z"), ist),
            Some(INSTANT)
        );
    }

    #[test]
    fn small_numbers_are_rejected() {
        assert_eq!(normalize(&json!(0), utc()), None);
        assert_eq!(normalize(&json!(123_456), utc()), None);
        assert_eq!(normalize(&json!(1_000_000_000), utc()), None);
        assert_eq!(normalize(&json!(-1_700_000_000), utc()), None);
        assert_eq!(normalize(&json!("2023"), utc()), None);
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(normalize(&json!(""), utc()), None);
        assert_eq!(normalize(&json!("not a date"), utc()), None);
        assert_eq!(normalize(&json!("32-13-2023 10:00:00"), utc()), None);
        assert_eq!(normalize(&json!(null), utc()), None);
        assert_eq!(normalize(&json!(true), utc()), None);
        assert_eq!(normalize(&json!({ "t": 1 }), utc()), None);
    }

    #[test]
    fn unrepresentable_numbers_are_rejected() {
        assert_eq!(normalize(&json!(1e300), utc()), None);
        assert_eq!(normalize(&json!(f64::MAX), utc()), None);
        assert_eq!(normalize(&json!("1e20"), utc()), None);
        assert_eq!(normalize(&json!("1e300"), utc()), None);
        assert_eq!(normalize(&json!(u64::MAX), utc()), None);
    }

    #[test]
    fn far_future_but_representable_is_kept() {
        // 2100-01-01T00:00:00Z, in seconds and milliseconds.
        assert_eq!(normalize(&json!(4_102_444_800i64), utc()), Some(4_102_444_800));
        assert_eq!(normalize(&json!(4_102_444_800_000i64), utc()), Some(4_102_444_800));
    }

    #[test]
    fn pre_epoch_dates_are_rejected() {
        assert_eq!(normalize(&json!("01-01-1960 00:00:00"), utc()), None);
    }
}
