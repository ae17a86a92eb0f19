use serde::Serialize;
use tracing::{debug, warn};

use super::candle::Candle;

// ---------------------------------------------------------------------------
// SeriesStore -- the canonical ordered candle series for one feed
// ---------------------------------------------------------------------------

/// Per-commit result, used to decide whether indicators need a recompute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOutcome {
    pub appended: usize,
    pub replaced: usize,
    pub stale: usize,
    pub out_of_order: usize,
}

impl CommitOutcome {
    /// Whether the buffer was mutated.
    pub fn changed(&self) -> bool {
        self.appended > 0 || self.replaced > 0
    }
}

/// Lifetime counters surfaced to consumers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub appended: u64,
    pub replaced: u64,
    pub stale_dropped: u64,
    pub out_of_order_dropped: u64,
    pub trimmed: u64,
}

/// Ordered series keyed by strictly increasing `time`.
///
/// Only the last bar is mutable: an update carrying the last stored time
/// replaces it in place (the forming bar), a newer time appends, and anything
/// older is dropped without touching the buffer.  The staleness window does not
/// change admission: it only decides whether an older bar is counted as stale
/// (beyond the window) or out-of-order (inside it).  The buffer is trimmed from
/// the front to `max_candles`.
pub struct SeriesStore {
    candles: Vec<Candle>,
    staleness_window_secs: i64,
    max_candles: usize,
    stats: StoreStats,
}

impl SeriesStore {
    pub fn new(staleness_window_secs: i64, max_candles: usize) -> Self {
        Self {
            candles: Vec::new(),
            staleness_window_secs,
            max_candles: max_candles.max(1),
            stats: StoreStats::default(),
        }
    }

    /// Replace the whole buffer with an already validated, ascending series.
    pub fn seed(&mut self, candles: Vec<Candle>) {
        self.candles = candles;
        self.trim();
        debug!(count = self.candles.len(), "series seeded");
    }

    /// Apply a batch in time order.
    pub fn commit(&mut self, batch: &[Candle]) -> CommitOutcome {
        let mut outcome = CommitOutcome::default();

        for candle in batch {
            let last_time = self.candles.last().map(|c| c.time);
            match last_time {
                None => {
                    self.candles.push(*candle);
                    outcome.appended += 1;
                }
                Some(last) if candle.time > last => {
                    self.candles.push(*candle);
                    outcome.appended += 1;
                }
                Some(last) if candle.time == last => {
                    if let Some(slot) = self.candles.last_mut() {
                        *slot = *candle;
                    }
                    outcome.replaced += 1;
                }
                Some(last) if candle.time < last - self.staleness_window_secs => {
                    outcome.stale += 1;
                    debug!(time = candle.time, last, "dropped stale candle");
                }
                Some(last) => {
                    // Inside the window but behind the forming bar: committed
                    // bars are immutable.
                    outcome.out_of_order += 1;
                    warn!(time = candle.time, last, "dropped out-of-order candle");
                }
            }
        }

        self.stats.appended += outcome.appended as u64;
        self.stats.replaced += outcome.replaced as u64;
        self.stats.stale_dropped += outcome.stale as u64;
        self.stats.out_of_order_dropped += outcome.out_of_order as u64;
        self.trim();
        outcome
    }

    fn trim(&mut self) {
        let excess = self.candles.len().saturating_sub(self.max_candles);
        if excess > 0 {
            self.candles.drain(..excess);
            self.stats.trimmed += excess as u64;
        }
    }

    /// The series, oldest first.
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// Owned copy for publishing.
    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.clone()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
