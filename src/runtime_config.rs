// =============================================================================
// Chart Configuration — feed, history and indicator settings
// =============================================================================
//
// Every tunable of the chart feed lives here.  All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an older
// config file, and an empty JSON object yields the stock configuration.
//
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::indicators::engine::IndicatorSpec;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbol() -> String {
    "NIFTY".to_string()
}

fn default_interval_minutes() -> u32 {
    60
}

fn default_lookback_days() -> u32 {
    2
}

fn default_flush_interval_ms() -> u64 {
    150
}

fn default_max_pending_updates() -> usize {
    10_000
}

fn default_staleness_window_secs() -> i64 {
    3600
}

fn default_max_series_len() -> usize {
    5_000
}

fn default_history_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_history_timeout_secs() -> u64 {
    10
}

fn default_min_history_points() -> usize {
    10
}

fn default_synthetic_points() -> usize {
    100
}

fn default_synthetic_baseline_price() -> f64 {
    100.0
}

fn default_feed_url() -> String {
    "ws://localhost:8000/market/ws".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_indicators() -> Vec<IndicatorSpec> {
    vec![
        IndicatorSpec::Sma { period: 20 },
        IndicatorSpec::Rsi { period: 14 },
    ]
}

// =============================================================================
// ChartConfig
// =============================================================================

/// Top-level configuration for one chart feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    // --- Instrument ----------------------------------------------------------

    /// Instrument the feed subscribes to.
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Candle bucket width in minutes.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,

    /// How many days of history to request on startup.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    // --- Live update pipeline ------------------------------------------------

    /// Coalescing window, measured from the first buffered update.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Upper bound on distinct buffered bars between flushes; the oldest bar
    /// is dropped beyond it.
    #[serde(default = "default_max_pending_updates")]
    pub max_pending_updates: usize,

    /// Updates older than the last stored bar by more than this are stale.
    #[serde(default = "default_staleness_window_secs")]
    pub staleness_window_secs: i64,

    /// Retention bound on the in-memory series (oldest bars trimmed).
    #[serde(default = "default_max_series_len")]
    pub max_series_len: usize,

    /// Offset applied to zone-less formatted timestamps (e.g. 330 for IST).
    #[serde(default)]
    pub feed_utc_offset_minutes: i32,

    // --- History -------------------------------------------------------------

    #[serde(default = "default_history_base_url")]
    pub history_base_url: String,

    #[serde(default = "default_history_timeout_secs")]
    pub history_timeout_secs: u64,

    /// Below this many valid bars the upstream history is considered unusable.
    #[serde(default = "default_min_history_points")]
    pub min_history_points: usize,

    #[serde(default = "default_synthetic_points")]
    pub synthetic_points: usize,

    #[serde(default = "default_synthetic_baseline_price")]
    pub synthetic_baseline_price: f64,

    /// Fixed seed for the synthetic walk; random when absent.
    #[serde(default)]
    pub synthetic_seed: Option<u64>,

    // --- Push connection -----------------------------------------------------

    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Session token forwarded to the history and push endpoints.
    /// Never serialised back out.
    #[serde(default, skip_serializing)]
    pub feed_token: Option<String>,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Consecutive failed attempts before giving up; `None` retries forever.
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,

    // --- Indicators ----------------------------------------------------------

    /// Indicators activated when the feed starts.
    #[serde(default = "default_indicators")]
    pub indicators: Vec<IndicatorSpec>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            interval_minutes: default_interval_minutes(),
            lookback_days: default_lookback_days(),
            flush_interval_ms: default_flush_interval_ms(),
            max_pending_updates: default_max_pending_updates(),
            staleness_window_secs: default_staleness_window_secs(),
            max_series_len: default_max_series_len(),
            feed_utc_offset_minutes: 0,
            history_base_url: default_history_base_url(),
            history_timeout_secs: default_history_timeout_secs(),
            min_history_points: default_min_history_points(),
            synthetic_points: default_synthetic_points(),
            synthetic_baseline_price: default_synthetic_baseline_price(),
            synthetic_seed: None,
            feed_url: default_feed_url(),
            feed_token: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_reconnect_attempts: None,
            indicators: default_indicators(),
        }
    }
}

impl ChartConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read chart config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse chart config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            interval_minutes = config.interval_minutes,
            "chart config loaded"
        );

        Ok(config)
    }

    /// Apply `CHART_*` environment overrides on top of the file values.
    pub fn apply_env(&mut self) {
        if let Ok(sym) = std::env::var("CHART_SYMBOL") {
            let sym = sym.trim().to_uppercase();
            if !sym.is_empty() {
                self.symbol = sym;
            }
        }
        if let Ok(token) = std::env::var("CHART_FEED_TOKEN") {
            if !token.is_empty() {
                self.feed_token = Some(token);
            }
        }
    }

    /// Bucket width in seconds (never zero).
    pub fn interval_secs(&self) -> i64 {
        i64::from(self.interval_minutes.max(1)) * 60
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn history_timeout(&self) -> Duration {
        Duration::from_secs(self.history_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = ChartConfig::default();
        assert_eq!(cfg.interval_minutes, 60);
        assert_eq!(cfg.lookback_days, 2);
        assert_eq!(cfg.staleness_window_secs, 3600);
        assert_eq!(cfg.initial_backoff_ms, 1_000);
        assert_eq!(cfg.max_backoff_ms, 30_000);
        assert!(cfg.max_reconnect_attempts.is_none());
        assert_eq!(cfg.min_history_points, 10);
        assert!((100..=200).contains(&cfg.flush_interval_ms));
        assert_eq!(cfg.indicators.len(), 2);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: ChartConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.symbol, "NIFTY");
        assert_eq!(cfg.interval_secs(), 3600);
        assert_eq!(cfg.indicators, default_indicators());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "symbol": "TCS-EQ",
            "interval_minutes": 5,
            "max_reconnect_attempts": 12,
            "indicators": [{ "kind": "macd", "fast": 12, "slow": 26, "signal": 9 }]
        }"#;
        let cfg: ChartConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbol, "TCS-EQ");
        assert_eq!(cfg.interval_secs(), 300);
        assert_eq!(cfg.max_reconnect_attempts, Some(12));
        assert_eq!(
            cfg.indicators,
            vec![IndicatorSpec::Macd { fast: 12, slow: 26, signal: 9 }]
        );
        assert_eq!(cfg.flush_interval_ms, 150);
    }

    #[test]
    fn feed_token_is_never_serialised() {
        let mut cfg = ChartConfig::default();
        cfg.feed_token = Some("secret".into());
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let cfg = ChartConfig {
            interval_minutes: 0,
            ..ChartConfig::default()
        };
        assert_eq!(cfg.interval_secs(), 60);
    }
}
