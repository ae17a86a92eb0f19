// =============================================================================
// Live Update Coalescer — bounds recompute cost under bursty feeds
// =============================================================================
//
// Updates are buffered for a fixed window measured from the first buffered
// item, then released as one batch: de-duplicated by time (last enqueued
// wins) and ascending.  An empty buffer never produces a batch.
//
// The buffer is bounded by `max_pending` distinct bar times; beyond it the
// oldest bar is dropped and counted.
// =============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::warn;

use super::candle::Candle;
use super::timer::Timer;

pub struct Coalescer {
    window: Duration,
    max_pending: usize,
    pending: BTreeMap<i64, Candle>,
    timer: Timer,
    overflow_dropped: u64,
    flushes: u64,
}

impl Coalescer {
    pub fn new(window: Duration, max_pending: usize) -> Self {
        Self {
            window,
            max_pending: max_pending.max(1),
            pending: BTreeMap::new(),
            timer: Timer::idle(),
            overflow_dropped: 0,
            flushes: 0,
        }
    }

    /// Buffer one update, arming the flush timer if the buffer was empty.
    pub fn enqueue(&mut self, candle: Candle) {
        if self.pending.is_empty() && !self.timer.is_armed() {
            self.timer.schedule(self.window);
        }
        self.pending.insert(candle.time, candle);

        if self.pending.len() > self.max_pending {
            if let Some((time, _)) = self.pending.pop_first() {
                self.overflow_dropped += 1;
                warn!(time, max_pending = self.max_pending, "coalescer full, dropped oldest bar");
            }
        }
    }

    /// The buffered bar for `time`, if one is waiting.
    pub fn pending_bar(&self, time: i64) -> Option<&Candle> {
        self.pending.get(&time)
    }

    /// The flush timer, for the owner's event loop to await.
    pub fn timer_mut(&mut self) -> &mut Timer {
        &mut self.timer
    }

    /// Release the buffered batch once the timer has fired.
    pub fn take_batch(&mut self) -> Option<Vec<Candle>> {
        self.timer.cancel();
        if self.pending.is_empty() {
            return None;
        }
        self.flushes += 1;
        Some(std::mem::take(&mut self.pending).into_values().collect())
    }

    /// Release the buffered batch now, bypassing the timer.
    pub fn force_flush(&mut self) -> Option<Vec<Candle>> {
        self.take_batch()
    }

    /// Discard everything buffered and disarm the timer.
    pub fn clear(&mut self) {
        self.timer.cancel();
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn overflow_dropped(&self) -> u64 {
        self.overflow_dropped
    }

    pub fn flushes(&self) -> u64 {
        self.flushes
    }
}
