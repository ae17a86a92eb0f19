// =============================================================================
// Feed Message Parser — live push envelopes to candidate updates
// =============================================================================
//
// Accepted shapes:
//   [ {...}, {...} ]                      batch
//   { "candles": [ {...} ] }              batch
//   { "symbol": .., "data": { ... } }     wrapped single update
//   { "open": .., "high": .., ... }       OHLC bar (any RawCandle alias)
//   { "last_price": .. } / { "lp": .. }   price tick
//
// A full OHLC quadruple takes precedence over a price field in the same
// object.  Objects matching none of these are counted as unrecognised and
// ignored; malformed bars and ticks are counted as rejected.
// =============================================================================

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde_json::{Map, Value};
use tracing::debug;

use super::candle::{coerce_f64, first_field, Candle, RawCandle};
use super::time_normalizer;
use super::validator;

const PRICE_KEYS: &[&str] = &["last_price", "lp"];
const TIME_KEYS: &[&str] = &["time", "timestamp", "datetime"];
const VOLUME_KEYS: &[&str] = &["volume", "v"];

/// One candidate update extracted from a push message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiveUpdate {
    /// A validated OHLC bar (time not yet bucketed).
    Bar(Candle),
    /// A single trade price.  `time` is `None` when the message carried no
    /// time at all; the receiver stamps it with the arrival time.
    Tick {
        time: Option<i64>,
        price: f64,
        volume: Option<u64>,
    },
}

/// Everything extracted from one push message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub updates: Vec<LiveUpdate>,
    /// Bars or ticks dropped as malformed.
    pub rejected: usize,
    /// Objects that matched no known envelope shape.
    pub unrecognized: usize,
}

/// Parse a text frame.  Errors only when the frame is not JSON at all.
pub fn parse_feed_message(text: &str, offset: FixedOffset) -> Result<ParsedFeed> {
    let root: Value = serde_json::from_str(text).context("failed to parse feed message JSON")?;
    let mut parsed = ParsedFeed::default();
    collect(&root, offset, &mut parsed);
    Ok(parsed)
}

fn collect(value: &Value, offset: FixedOffset, out: &mut ParsedFeed) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect(item, offset, out);
            }
        }
        Value::Object(obj) => {
            if let Some(Value::Array(items)) = obj.get("candles") {
                for item in items {
                    collect(item, offset, out);
                }
            } else if let Some(data @ Value::Object(_)) = obj.get("data") {
                collect(data, offset, out);
            } else {
                collect_object(obj, offset, out);
            }
        }
        other => {
            out.unrecognized += 1;
            debug!(kind = json_kind(other), "ignored non-object feed item");
        }
    }
}

fn collect_object(obj: &Map<String, Value>, offset: FixedOffset, out: &mut ParsedFeed) {
    if RawCandle::has_ohlc(obj) {
        match validator::to_candle(&RawCandle::from_object(obj), offset) {
            Some(candle) => out.updates.push(LiveUpdate::Bar(candle)),
            None => {
                out.rejected += 1;
                debug!("rejected malformed live bar");
            }
        }
        return;
    }

    let Some(raw_price) = first_field(obj, PRICE_KEYS) else {
        out.unrecognized += 1;
        debug!(keys = ?obj.keys().collect::<Vec<_>>(), "ignored unrecognised feed envelope");
        return;
    };

    let price = coerce_f64(&raw_price).filter(|p| p.is_finite() && *p > 0.0);
    // A time that is present but unparseable discards the tick.
    let time = match first_field(obj, TIME_KEYS) {
        Some(raw) => time_normalizer::normalize(&raw, offset).map(Some),
        None => Some(None),
    };

    match (price, time) {
        (Some(price), Some(time)) => {
            let volume = first_field(obj, VOLUME_KEYS)
                .as_ref()
                .and_then(coerce_f64)
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v.floor() as u64);
            out.updates.push(LiveUpdate::Tick { time, price, volume });
        }
        _ => {
            out.rejected += 1;
            debug!("rejected malformed live tick");
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Bucketing
// ---------------------------------------------------------------------------

/// Start of the interval bucket containing `time`.
pub fn bucket_start(time: i64, interval_secs: i64) -> i64 {
    if interval_secs <= 1 {
        return time;
    }
    time - time.rem_euclid(interval_secs)
}

/// Floor a bar onto its bucket.  Flooring never breaks the OHLC envelope.
pub fn bucket_bar(mut candle: Candle, interval_secs: i64) -> Candle {
    candle.time = bucket_start(candle.time, interval_secs);
    candle
}

/// Fold a tick into the bar forming at `bucket`.
///
/// With a forming bar for the same bucket: open is kept, high/low widen to
/// the price, close becomes the price and volumes add up.  Otherwise the tick
/// opens a fresh flat bar.
pub fn merge_tick(forming: Option<&Candle>, bucket: i64, price: f64, volume: Option<u64>) -> Candle {
    match forming.filter(|c| c.time == bucket) {
        Some(bar) => Candle {
            time: bucket,
            open: bar.open,
            high: bar.high.max(price),
            low: bar.low.min(price),
            close: price,
            volume: match (bar.volume, volume) {
                (Some(a), Some(b)) => Some(a.saturating_add(b)),
                (a, b) => a.or(b),
            },
        },
        None => Candle {
            time: bucket,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
