// =============================================================================
// Central Application State — chart feed
// =============================================================================
//
// Read-only view of the feed for the HTTP and WebSocket consumers.  The feed
// session is the only writer: after every commit, recompute or connection
// transition it publishes a fresh `ChartSnapshot`, which replaces the previous
// one wholesale and bumps the state version.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock around the published snapshot, the session handle
//     and the error log.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::indicators::IndicatorSeries;
use crate::market_data::series_store::StoreStats;
use crate::market_data::session::{FeedCounters, SessionHandle};
use crate::market_data::Candle;
use crate::runtime_config::ChartConfig;
use crate::types::{ConnectionState, HistoryOrigin};

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event for the consumer error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

// =============================================================================
// Chart snapshot
// =============================================================================

/// Everything the rendering layer needs, as of the last publish.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSnapshot {
    pub state_version: u64,
    pub symbol: String,
    pub interval_secs: i64,
    pub candles: Vec<Candle>,
    pub indicators: Vec<IndicatorSeries>,
    pub connection: ConnectionState,
    pub history: HistoryOrigin,
    /// True while the series is seeded from synthetic data.
    pub degraded: bool,
    pub store: StoreStats,
    pub feed: FeedCounters,
    /// Updates buffered in the coalescer, not yet committed.
    pub pending_updates: usize,
}

impl ChartSnapshot {
    /// Placeholder published before the session has seeded anything.
    pub fn empty(config: &ChartConfig) -> Self {
        Self {
            state_version: 0,
            symbol: config.symbol.clone(),
            interval_secs: config.interval_secs(),
            candles: Vec::new(),
            indicators: Vec::new(),
            connection: ConnectionState::new(config.initial_backoff_ms),
            history: HistoryOrigin::Synthetic {
                reason: "history not loaded yet".to_string(),
            },
            degraded: true,
            store: StoreStats::default(),
            feed: FeedCounters::default(),
            pending_updates: 0,
        }
    }
}

/// Payload of `GET /api/v1/snapshot` and the WebSocket push.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_secs: u64,
    pub chart: ChartSnapshot,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recent_errors: Vec<ErrorRecord>,
}

// =============================================================================
// AppState
// =============================================================================

/// Shared across the HTTP handlers and the feed session via `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing version counter.  The WebSocket feed uses
    /// this to detect changes and push updates.
    pub state_version: AtomicU64,

    chart: RwLock<Arc<ChartSnapshot>>,

    /// Command handle of the running feed session, once spawned.
    session: RwLock<Option<SessionHandle>>,

    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    /// Instant when the service was started. Used for uptime calculations.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: &ChartConfig) -> Self {
        let chart = ChartSnapshot::empty(config);
        Self {
            state_version: AtomicU64::new(1),
            chart: RwLock::new(Arc::new(chart)),
            session: RwLock::new(None),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    /// Atomically increment the state version, returning the new value.
    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Chart publication ───────────────────────────────────────────────

    /// Replace the published chart view.
    pub fn publish(&self, mut chart: ChartSnapshot) {
        let mut slot = self.chart.write();
        chart.state_version = self.increment_version();
        *slot = Arc::new(chart);
    }

    /// The last published chart view.
    pub fn chart(&self) -> Arc<ChartSnapshot> {
        self.chart.read().clone()
    }

    // ── Session handle ──────────────────────────────────────────────────

    pub fn set_session(&self, handle: SessionHandle) {
        *self.session.write() = Some(handle);
    }

    pub fn session(&self) -> Option<SessionHandle> {
        self.session.read().clone()
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error message.  The ring buffer is capped at
    /// [`MAX_RECENT_ERRORS`]; oldest entries are evicted first.
    pub fn push_error(&self, msg: String) {
        let record = ErrorRecord {
            message: msg,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        let excess = errors.len().saturating_sub(MAX_RECENT_ERRORS);
        errors.drain(..excess);
        drop(errors);

        self.increment_version();
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    pub fn build_snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            chart: ChartSnapshot::clone(&self.chart()),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}
