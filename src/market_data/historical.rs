// =============================================================================
// Historical Loader — seeds the series before the live feed starts
// =============================================================================
//
// Fetches a bounded window from the history endpoint and validates it.  When
// the request fails, times out, reports `success: false`, or leaves fewer
// than `min_points` valid bars, a synthetic random walk is substituted and
// the origin is flagged degraded.  The loader therefore never returns an
// empty series and never returns an error.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::candle::{Candle, RawCandle};
use super::feed_message::bucket_start;
use super::validator;
use crate::types::HistoryOrigin;

/// Parameters of one history request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub symbol: String,
    pub interval_minutes: u32,
    pub lookback_days: u32,
}

/// Body of `GET /market/{symbol}/history`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub candles: Vec<RawCandle>,
}

pub trait HistorySource: Send + Sync + 'static {
    fn fetch(&self, request: &HistoryRequest) -> BoxFuture<'static, Result<HistoryResponse>>;
}

// ---------------------------------------------------------------------------
// REST client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct HistoryClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HistoryClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build history HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    /// GET /market/{symbol}/history?interval=&days=
    #[instrument(skip(self), name = "history::get_history")]
    pub async fn get_history(&self, request: &HistoryRequest) -> Result<HistoryResponse> {
        let url = format!(
            "{}/market/{}/history?interval={}&days={}",
            self.base_url, request.symbol, request.interval_minutes, request.lookback_days
        );

        let mut req = self.client.get(&url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.context("GET history request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GET history returned {}: {}", status, body);
        }

        let body: HistoryResponse = resp
            .json()
            .await
            .context("failed to parse history response")?;

        debug!(symbol = %request.symbol, rows = body.candles.len(), "history fetched");
        Ok(body)
    }
}

impl HistorySource for HistoryClient {
    fn fetch(&self, request: &HistoryRequest) -> BoxFuture<'static, Result<HistoryResponse>> {
        let this = self.clone();
        let request = request.clone();
        async move { this.get_history(&request).await }.boxed()
    }
}

impl std::fmt::Debug for HistoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoaderSettings {
    pub timeout: Duration,
    pub min_points: usize,
    pub synthetic_points: usize,
    pub synthetic_baseline: f64,
    pub synthetic_seed: Option<u64>,
    pub utc_offset: FixedOffset,
}

/// Seed material for the series store.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedHistory {
    pub candles: Vec<Candle>,
    pub origin: HistoryOrigin,
    /// Upstream rows the validator dropped.
    pub rejected: usize,
}

pub struct HistoricalLoader<S> {
    source: S,
    settings: LoaderSettings,
}

impl<S: HistorySource> HistoricalLoader<S> {
    pub fn new(source: S, settings: LoaderSettings) -> Self {
        Self { source, settings }
    }

    pub async fn load(&self, symbol: &str, interval_minutes: u32, lookback_days: u32) -> LoadedHistory {
        let request = HistoryRequest {
            symbol: symbol.to_string(),
            interval_minutes,
            lookback_days,
        };

        let mut rejected = 0;
        let reason = match tokio::time::timeout(self.settings.timeout, self.source.fetch(&request)).await {
            Err(_) => format!("history request timed out after {:?}", self.settings.timeout),
            Ok(Err(e)) => format!("history request failed: {e:#}"),
            Ok(Ok(resp)) if !resp.success => "history endpoint reported success=false".to_string(),
            Ok(Ok(resp)) => {
                let validated = validator::validate(&resp.candles, self.settings.utc_offset);
                rejected = validated.rejected;
                if validated.rejected > 0 {
                    debug!(rejected = validated.rejected, "history rows rejected");
                }
                if validated.candles.len() >= self.settings.min_points {
                    info!(
                        symbol = %symbol,
                        count = validated.candles.len(),
                        rejected,
                        duplicates = validated.duplicates,
                        "history loaded"
                    );
                    return LoadedHistory {
                        candles: validated.candles,
                        origin: HistoryOrigin::Upstream,
                        rejected,
                    };
                }
                format!(
                    "only {} valid history points (minimum {})",
                    validated.candles.len(),
                    self.settings.min_points
                )
            }
        };

        warn!(symbol = %symbol, reason = %reason, "using synthetic history");

        let interval_secs = i64::from(interval_minutes.max(1)) * 60;
        let end = bucket_start(Utc::now().timestamp(), interval_secs);
        let mut rng = match self.settings.synthetic_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::seed_from_u64(rand::random()),
        };
        let candles = synthetic_series(
            end,
            interval_secs,
            self.settings.synthetic_points.max(1),
            self.settings.synthetic_baseline,
            &mut rng,
        );

        LoadedHistory {
            candles,
            origin: HistoryOrigin::Synthetic { reason },
            rejected,
        }
    }
}

/// Multiplicative random walk of `count` bars ending at `end_time`.
///
/// Each bar opens at the previous close; high and low sit outside both, so
/// every bar satisfies the OHLC envelope by construction and prices stay
/// strictly positive.
pub fn synthetic_series(
    end_time: i64,
    interval_secs: i64,
    count: usize,
    baseline: f64,
    rng: &mut StdRng,
) -> Vec<Candle> {
    let baseline = if baseline.is_finite() && baseline > 0.0 { baseline } else { 100.0 };
    let interval_secs = interval_secs.max(1);
    let mut bars = Vec::with_capacity(count);
    let mut price = baseline;

    for i in 0..count {
        let time = end_time - (count - 1 - i) as i64 * interval_secs;
        let open = price;
        let close = open * (1.0 + rng.random_range(-0.01_f64..0.01));
        let high = open.max(close) * (1.0 + rng.random_range(0.0_f64..0.005));
        let low = open.min(close) * (1.0 - rng.random_range(0.0_f64..0.005));
        price = close;

        if time <= 0 {
            continue;
        }
        bars.push(Candle {
            time,
            open,
            high,
            low,
            close,
            volume: Some(rng.random_range(500_u64..5_000)),
        });
    }

    bars
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::time_normalizer::offset_from_minutes;
    use futures_util::future;
    use serde_json::json;

    const END: i64 = 1_700_002_800;

    fn settings() -> LoaderSettings {
        LoaderSettings {
            timeout: Duration::from_secs(10),
            min_points: 10,
            synthetic_points: 100,
            synthetic_baseline: 100.0,
            synthetic_seed: Some(7),
            utc_offset: offset_from_minutes(0),
        }
    }

    enum Scripted {
        Rows(bool, Vec<serde_json::Value>),
        Fail,
        Hang,
    }

    impl HistorySource for Scripted {
        fn fetch(&self, _request: &HistoryRequest) -> BoxFuture<'static, Result<HistoryResponse>> {
            match self {
                Scripted::Rows(success, rows) => {
                    let resp = HistoryResponse {
                        success: *success,
                        candles: rows.iter().cloned().map(RawCandle::from).collect(),
                    };
                    future::ready(Ok(resp)).boxed()
                }
                Scripted::Fail => future::ready(Err(anyhow::anyhow!("connection refused"))).boxed(),
                Scripted::Hang => future::pending().boxed(),
            }
        }
    }

    fn rows(n: usize) -> Vec<serde_json::Value> {
        (0..n)
            .map(|i| json!({ "time": 1_700_000_000 + i as i64 * 3600, "o": 10, "h": 11, "l": 9, "c": 10.5 }))
            .collect()
    }

    #[test]
    fn synthetic_series_round_trips_through_validator() {
        let mut rng = StdRng::seed_from_u64(42);
        let series = synthetic_series(END, 60, 250, 100.0, &mut rng);
        assert_eq!(series.len(), 250);
        assert_eq!(series.last().map(|c| c.time), Some(END));

        let raw: Vec<RawCandle> = series.iter().map(RawCandle::from).collect();
        let validated = validator::validate(&raw, offset_from_minutes(0));
        assert_eq!(validated.rejected, 0);
        assert_eq!(validated.candles, series);
    }

    #[test]
    fn synthetic_series_is_deterministic_per_seed() {
        let a = synthetic_series(END, 60, 20, 100.0, &mut StdRng::seed_from_u64(1));
        let b = synthetic_series(END, 60, 20, 100.0, &mut StdRng::seed_from_u64(1));
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn upstream_history_is_used_when_sufficient() {
        let mut data = rows(12);
        data.push(json!({ "time": "garbage", "o": 1, "h": 1, "l": 1, "c": 1 }));
        let loader = HistoricalLoader::new(Scripted::Rows(true, data), settings());
        let loaded = loader.load("NIFTY", 60, 2).await;
        assert_eq!(loaded.origin, HistoryOrigin::Upstream);
        assert_eq!(loaded.candles.len(), 12);
        assert_eq!(loaded.rejected, 1);
    }

    #[tokio::test]
    async fn too_few_points_falls_back() {
        let loader = HistoricalLoader::new(Scripted::Rows(true, rows(9)), settings());
        let loaded = loader.load("NIFTY", 60, 2).await;
        assert!(loaded.origin.is_degraded());
        assert_eq!(loaded.candles.len(), 100);
    }

    #[tokio::test]
    async fn unsuccessful_response_falls_back() {
        let loader = HistoricalLoader::new(Scripted::Rows(false, rows(50)), settings());
        let loaded = loader.load("NIFTY", 5, 2).await;
        assert!(loaded.origin.is_degraded());
        let times: Vec<i64> = loaded.candles.iter().map(|c| c.time).collect();
        assert!(times.windows(2).all(|w| w[1] - w[0] == 300));
    }

    #[tokio::test]
    async fn request_failure_falls_back() {
        let loader = HistoricalLoader::new(Scripted::Fail, settings());
        let loaded = loader.load("NIFTY", 60, 2).await;
        match loaded.origin {
            HistoryOrigin::Synthetic { reason } => assert!(reason.contains("connection refused")),
            other => panic!("expected synthetic, got {other}"),
        }
        assert!(loaded.candles.iter().all(Candle::is_valid));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_falls_back() {
        let loader = HistoricalLoader::new(Scripted::Hang, settings());
        let loaded = loader.load("NIFTY", 60, 2).await;
        match loaded.origin {
            HistoryOrigin::Synthetic { reason } => assert!(reason.contains("timed out")),
            other => panic!("expected synthetic, got {other}"),
        }
        assert!(!loaded.candles.is_empty());
    }
}
