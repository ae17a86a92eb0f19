// =============================================================================
// Candle Validator — admission control for raw OHLC rows
// =============================================================================
//
// For each raw row: normalise time, coerce prices, enforce the OHLC envelope.
// Survivors are de-duplicated by time (later row in input order wins) and
// returned ascending. Rejections are counted, never raised.
// =============================================================================

use std::collections::BTreeMap;

use chrono::FixedOffset;
use tracing::debug;

use super::candle::{coerce_f64, Candle, RawCandle};
use super::time_normalizer;

/// Output of one validation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validated {
    /// Surviving candles, strictly ascending by time.
    pub candles: Vec<Candle>,
    /// Rows dropped as malformed.
    pub rejected: usize,
    /// Valid rows superseded by a later row with the same time.
    pub duplicates: usize,
}

/// Validate with zone-less timestamps read in `offset`.
pub fn validate(rows: &[RawCandle], offset: FixedOffset) -> Validated {
    let mut by_time: BTreeMap<i64, Candle> = BTreeMap::new();
    let mut rejected = 0;
    let mut duplicates = 0;

    for (idx, row) in rows.iter().enumerate() {
        match to_candle(row, offset) {
            Some(candle) => {
                if by_time.insert(candle.time, candle).is_some() {
                    duplicates += 1;
                }
            }
            None => {
                rejected += 1;
                debug!(row = idx, "rejected malformed candle row");
            }
        }
    }

    Validated {
        candles: by_time.into_values().collect(),
        rejected,
        duplicates,
    }
}

/// Convert a single raw row; `None` if any field is unusable or the OHLC
/// envelope is inconsistent.
pub fn to_candle(row: &RawCandle, offset: FixedOffset) -> Option<Candle> {
    let time = time_normalizer::normalize(row.time.as_ref()?, offset)?;
    let candle = Candle {
        time,
        open: coerce_f64(row.open.as_ref()?)?,
        high: coerce_f64(row.high.as_ref()?)?,
        low: coerce_f64(row.low.as_ref()?)?,
        close: coerce_f64(row.close.as_ref()?)?,
        volume: row.volume.as_ref().and_then(coerce_volume),
    };
    candle.is_valid().then_some(candle)
}

/// Volume is optional: negative or non-numeric volume is treated as absent.
fn coerce_volume(val: &serde_json::Value) -> Option<u64> {
    let v = coerce_f64(val)?;
    (v.is_finite() && v >= 0.0).then(|| v.floor() as u64)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc() -> FixedOffset {
        time_normalizer::offset_from_minutes(0)
    }

    fn raw(value: serde_json::Value) -> RawCandle {
        serde_json::from_value(value).unwrap()
    }

    fn row(time: i64, open: f64, high: f64, low: f64, close: f64) -> RawCandle {
        raw(json!({ "time": time, "open": open, "high": high, "low": low, "close": close }))
    }

    #[test]
    fn keeps_valid_rows_sorted() {
        let rows = vec![
            row(1_700_000_120, 10.0, 11.0, 9.0, 10.5),
            row(1_700_000_000, 10.0, 11.0, 9.0, 10.5),
            row(1_700_000_060, 10.0, 11.0, 9.0, 10.5),
        ];
        let out = validate(&rows, utc());
        let times: Vec<i64> = out.candles.iter().map(|c| c.time).collect();
        assert_eq!(times, vec![1_700_000_000, 1_700_000_060, 1_700_000_120]);
        assert_eq!(out.rejected, 0);
    }

    #[test]
    fn rejects_each_kind_of_malformed_row() {
        let rows = vec![
            row(1_700_000_000, 10.0, 11.0, 9.0, 10.5), // ok
            row(5, 10.0, 11.0, 9.0, 10.5),             // bad time
            row(1_700_000_060, 10.0, 9.5, 9.0, 10.5),  // high < close
            row(1_700_000_120, 10.0, 11.0, 10.2, 10.5), // low > open
            row(1_700_000_180, -1.0, 11.0, 9.0, 10.5), // non-positive
            raw(json!({ "time": 1_700_000_240, "open": "abc", "high": 11, "low": 9, "close": 10 })),
            raw(json!({ "time": 1_700_000_300, "open": 10, "high": 11, "low": 9 })), // missing close
            raw(json!("not an object")),
        ];
        let out = validate(&rows, utc());
        assert_eq!(out.candles.len(), 1);
        assert_eq!(out.rejected, 7);
        assert!(out.candles.len() <= rows.len());
    }

    #[test]
    fn later_row_wins_on_duplicate_time() {
        let rows = vec![
            row(1_700_000_000, 10.0, 11.0, 9.0, 10.5),
            row(1_700_000_060, 10.0, 11.0, 9.0, 10.5),
            row(1_700_000_000, 20.0, 22.0, 19.0, 21.0),
        ];
        let out = validate(&rows, utc());
        assert_eq!(out.candles.len(), 2);
        assert_eq!(out.duplicates, 1);
        assert!((out.candles[0].close - 21.0).abs() < 1e-12);
    }

    #[test]
    fn mixed_encodings_are_coerced() {
        let rows = vec![raw(json!({
            "datetime": "14-11-2023 22:13:20",
            "o": "100.5", "h": "101", "l": 99.5, "c": "100.75", "volume": "1500.9"
        }))];
        let out = validate(&rows, utc());
        assert_eq!(out.candles.len(), 1);
        let c = out.candles[0];
        assert_eq!(c.time, 1_700_000_000);
        assert!((c.open - 100.5).abs() < 1e-12);
        assert_eq!(c.volume, Some(1500));
    }

    #[test]
    fn bad_volume_is_dropped_not_fatal() {
        let rows = vec![raw(json!({
            "time": 1_700_000_000, "open": 1, "high": 1, "low": 1, "close": 1, "volume": -5
        }))];
        let out = validate(&rows, utc());
        assert_eq!(out.candles.len(), 1);
        assert_eq!(out.candles[0].volume, None);
    }

    #[test]
    fn every_output_satisfies_invariants() {
        let rows: Vec<RawCandle> = (0..50)
            .map(|i| {
                let base = 100.0 + (i as f64).sin() * 5.0;
                // Every third row is deliberately inverted.
                let (hi, lo) = if i % 3 == 0 { (base - 1.0, base + 1.0) } else { (base + 1.0, base - 1.0) };
                row(1_700_000_000 + i * 60, base, hi, lo, base)
            })
            .collect();
        let out = validate(&rows, utc());
        assert!(out.candles.iter().all(Candle::is_valid));
        assert_eq!(out.candles.len() + out.rejected, rows.len());
    }

    #[test]
    fn unrepresentable_times_are_rejected() {
        let rows = vec![
            raw(json!({ "time": 1e300, "open": 10, "high": 11, "low": 9, "close": 10 })),
            raw(json!({ "time": "1e20", "open": 10, "high": 11, "low": 9, "close": 10 })),
            row(1_700_000_000, 10.0, 11.0, 9.0, 10.0),
        ];
        let out = validate(&rows, utc());
        assert_eq!(out.rejected, 2);
        assert_eq!(out.candles.len(), 1);
        assert_eq!(out.candles[0].time, 1_700_000_000);
    }
}
