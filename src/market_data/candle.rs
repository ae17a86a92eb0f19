use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single validated OHLCV candle keyed by its bucket start (epoch seconds).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
}

impl Candle {
    /// `(high + low + close) / 3`.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Volume used by the volume-weighted indicators; a bar without a
    /// reported volume counts as 1.
    pub fn effective_volume(&self) -> f64 {
        self.volume.map_or(1.0, |v| v as f64)
    }

    /// Positive finite time and prices, and a consistent OHLC envelope.
    pub fn is_valid(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        self.time > 0
            && prices.iter().all(|p| p.is_finite() && *p > 0.0)
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
            && self.high >= self.low
    }
}

/// One raw row as delivered by an upstream collaborator, before validation.
///
/// Fields are kept as untyped JSON so numbers-as-strings, millisecond
/// timestamps and formatted dates all survive until normalisation.
/// Accepted aliases: `time|timestamp|datetime`, `open|o`, `high|h`, `low|l`,
/// `close|c`, `volume|v`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct RawCandle {
    pub time: Option<Value>,
    pub open: Option<Value>,
    pub high: Option<Value>,
    pub low: Option<Value>,
    pub close: Option<Value>,
    pub volume: Option<Value>,
}

const TIME_KEYS: &[&str] = &["time", "timestamp", "datetime"];
const OPEN_KEYS: &[&str] = &["open", "o"];
const HIGH_KEYS: &[&str] = &["high", "h"];
const LOW_KEYS: &[&str] = &["low", "l"];
const CLOSE_KEYS: &[&str] = &["close", "c"];
const VOLUME_KEYS: &[&str] = &["volume", "v"];

impl RawCandle {
    /// Pick fields out of a JSON object, first alias present wins.
    pub fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            time: first_field(obj, TIME_KEYS),
            open: first_field(obj, OPEN_KEYS),
            high: first_field(obj, HIGH_KEYS),
            low: first_field(obj, LOW_KEYS),
            close: first_field(obj, CLOSE_KEYS),
            volume: first_field(obj, VOLUME_KEYS),
        }
    }

    /// Whether the object carries a full OHLC quadruple under any alias.
    pub fn has_ohlc(obj: &Map<String, Value>) -> bool {
        [OPEN_KEYS, HIGH_KEYS, LOW_KEYS, CLOSE_KEYS]
            .iter()
            .all(|keys| first_field(obj, keys).is_some())
    }
}

impl From<Value> for RawCandle {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(obj) => Self::from_object(&obj),
            _ => Self::default(),
        }
    }
}

impl From<&Candle> for RawCandle {
    fn from(c: &Candle) -> Self {
        Self {
            time: Some(Value::from(c.time)),
            open: Some(Value::from(c.open)),
            high: Some(Value::from(c.high)),
            low: Some(Value::from(c.low)),
            close: Some(Value::from(c.close)),
            volume: c.volume.map(Value::from),
        }
    }
}

/// First non-null value stored under any of `keys`.
pub(crate) fn first_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
        .cloned()
}

/// Coerce a JSON number or numeric string into `f64`.
pub(crate) fn coerce_f64(val: &Value) -> Option<f64> {
    match val {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
