// =============================================================================
// Live Feed Session — one owned feed per symbol subscription
// =============================================================================
//
// A single tokio task owns the series store, the indicator engine, the
// coalescer, the reconnect controller, both timers and the open connection.
// Nothing else mutates them: consumers read published snapshots from
// `AppState` and talk to the task through `SessionHandle` commands.
//
// Event loop (one `select!`):
//   command       -> connect / disconnect / indicator changes / flush
//   connect done  -> Connected, or Reconnecting with backoff
//   frame         -> parse -> bucket -> coalescer
//   frame error / stream end -> Reconnecting with backoff
//   flush timer   -> store.commit(batch) then engine.recompute_all()
//   backoff timer -> Connecting
//
// Teardown flips the liveness flag first, so an event already in flight is
// dropped instead of touching the disposed store.
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::candle::Candle;
use super::coalescer::Coalescer;
use super::feed_message::{self, LiveUpdate};
use super::historical::LoadedHistory;
use super::reconnect::{ReconnectController, ReconnectPolicy};
use super::series_store::SeriesStore;
use super::time_normalizer;
use super::timer::Timer;
use super::transport::{FeedStream, FeedTransport};
use crate::app_state::{AppState, ChartSnapshot};
use crate::indicators::{IndicatorEngine, IndicatorSpec};
use crate::runtime_config::ChartConfig;
use crate::types::HistoryOrigin;

// =============================================================================
// Settings / counters
// =============================================================================

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub symbol: String,
    pub interval_secs: i64,
    pub flush_interval: Duration,
    pub max_pending_updates: usize,
    pub staleness_window_secs: i64,
    pub max_series_len: usize,
    pub connect_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub utc_offset: FixedOffset,
}

impl SessionSettings {
    pub fn from_config(config: &ChartConfig) -> Self {
        Self {
            symbol: config.symbol.clone(),
            interval_secs: config.interval_secs(),
            flush_interval: config.flush_interval(),
            max_pending_updates: config.max_pending_updates,
            staleness_window_secs: config.staleness_window_secs,
            max_series_len: config.max_series_len,
            connect_timeout: config.connect_timeout(),
            reconnect: ReconnectPolicy {
                initial_backoff_ms: config.initial_backoff_ms,
                max_backoff_ms: config.max_backoff_ms,
                max_attempts: config.max_reconnect_attempts,
            },
            utc_offset: time_normalizer::offset_from_minutes(config.feed_utc_offset_minutes),
        }
    }
}

/// Live-side observability counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedCounters {
    pub messages: u64,
    /// Frames that were not JSON.
    pub unparseable: u64,
    /// Rows dropped as malformed (history and live).
    pub rejected_rows: u64,
    pub unrecognized: u64,
    pub coalescer_overflow: u64,
    pub flushes: u64,
    pub connections: u64,
}

// =============================================================================
// Commands / handle
// =============================================================================

pub enum SessionCommand {
    Connect,
    Disconnect,
    Activate {
        spec: IndicatorSpec,
        reply: oneshot::Sender<Result<Uuid>>,
    },
    Deactivate {
        id: Uuid,
        reply: oneshot::Sender<bool>,
    },
    Update {
        id: Uuid,
        spec: IndicatorSpec,
        reply: oneshot::Sender<Result<Uuid>>,
    },
    SetVisible {
        id: Uuid,
        visible: bool,
        reply: oneshot::Sender<bool>,
    },
    /// Commit whatever the coalescer holds without waiting for the timer.
    Flush { reply: oneshot::Sender<()> },
}

/// Cloneable command side of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    symbol: Arc<str>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    alive: Arc<AtomicBool>,
}

impl SessionHandle {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn send(&self, cmd: SessionCommand) -> Result<()> {
        if !self.is_alive() {
            anyhow::bail!("feed session for {} has been torn down", self.symbol);
        }
        self.commands
            .send(cmd)
            .map_err(|_| anyhow!("feed session for {} is not running", self.symbol))
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx))?;
        rx.await.context("feed session dropped the request")
    }

    pub fn connect(&self) -> Result<()> {
        self.send(SessionCommand::Connect)
    }

    pub fn disconnect(&self) -> Result<()> {
        self.send(SessionCommand::Disconnect)
    }

    pub async fn activate(&self, spec: IndicatorSpec) -> Result<Uuid> {
        self.request(|reply| SessionCommand::Activate { spec, reply }).await?
    }

    pub async fn deactivate(&self, id: Uuid) -> Result<bool> {
        self.request(|reply| SessionCommand::Deactivate { id, reply }).await
    }

    pub async fn update(&self, id: Uuid, spec: IndicatorSpec) -> Result<Uuid> {
        self.request(|reply| SessionCommand::Update { id, spec, reply }).await?
    }

    pub async fn set_visible(&self, id: Uuid, visible: bool) -> Result<bool> {
        self.request(|reply| SessionCommand::SetVisible { id, visible, reply }).await
    }

    pub async fn flush(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Flush { reply }).await
    }
}

/// Owner of the session task.
pub struct LiveFeedSession {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

impl LiveFeedSession {
    /// Seed the store from `history` and start the session task.  The feed
    /// stays disconnected until [`SessionHandle::connect`].
    pub fn spawn(
        settings: SessionSettings,
        history: LoadedHistory,
        transport: Arc<dyn FeedTransport>,
        state: Arc<AppState>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));

        let handle = SessionHandle {
            symbol: Arc::from(settings.symbol.as_str()),
            commands: tx,
            alive: alive.clone(),
        };

        let driver = SessionDriver::new(settings, history, transport, state, rx, alive);
        let task = tokio::spawn(driver.run());

        Self { handle, task }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Dispose the session now.  Any event the task is about to handle is
    /// ignored, and the task (with its timers and connection) is cancelled.
    pub fn teardown(&self) {
        if self.handle.alive.swap(false, Ordering::SeqCst) {
            info!(symbol = %self.handle.symbol, "feed session torn down");
        }
        self.task.abort();
    }

    /// Commit pending updates, then tear down and wait for the task to end.
    pub async fn shutdown(self) {
        if let Err(e) = self.handle.flush().await {
            debug!(error = %e, "final flush skipped");
        }
        self.teardown();
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!(error = %e, "feed session task failed");
            }
        }
    }
}

// =============================================================================
// Driver
// =============================================================================

type ConnectFuture = BoxFuture<'static, Result<FeedStream>>;

struct SessionDriver {
    settings: SessionSettings,
    store: SeriesStore,
    engine: IndicatorEngine,
    coalescer: Coalescer,
    controller: ReconnectController,
    backoff: Timer,
    connecting: Option<ConnectFuture>,
    stream: Option<FeedStream>,
    history: HistoryOrigin,
    counters: FeedCounters,
    transport: Arc<dyn FeedTransport>,
    state: Arc<AppState>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    alive: Arc<AtomicBool>,
}

impl SessionDriver {
    fn new(
        settings: SessionSettings,
        history: LoadedHistory,
        transport: Arc<dyn FeedTransport>,
        state: Arc<AppState>,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        alive: Arc<AtomicBool>,
    ) -> Self {
        let mut store = SeriesStore::new(settings.staleness_window_secs, settings.max_series_len);
        store.seed(history.candles);
        if store.is_empty() {
            warn!(symbol = %settings.symbol, "feed session starts with an empty series");
        }

        let counters = FeedCounters {
            rejected_rows: history.rejected as u64,
            ..FeedCounters::default()
        };

        Self {
            coalescer: Coalescer::new(settings.flush_interval, settings.max_pending_updates),
            controller: ReconnectController::new(settings.reconnect),
            settings,
            store,
            engine: IndicatorEngine::new(),
            backoff: Timer::idle(),
            connecting: None,
            stream: None,
            history: history.origin,
            counters,
            transport,
            state,
            commands,
            alive,
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn run(mut self) {
        info!(
            symbol = %self.settings.symbol,
            candles = self.store.len(),
            history = %self.history,
            "feed session started"
        );
        self.publish();

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd),
                    None => {
                        debug!("all session handles dropped");
                        break;
                    }
                },
                result = await_connect(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_result(result);
                }
                frame = next_frame(&mut self.stream) => self.on_frame(frame),
                _ = self.coalescer.timer_mut().fired() => self.flush_pending(),
                _ = self.backoff.fired() => self.on_backoff_elapsed(),
            }

            if !self.is_alive() {
                break;
            }
        }

        self.teardown();
    }

    fn teardown(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        if !self.coalescer.is_empty() {
            debug!(pending = self.coalescer.len(), "discarding uncommitted updates");
        }
        self.coalescer.clear();
        self.backoff.cancel();
        self.connecting = None;
        self.stream = None;
        self.controller.dispose();
        debug!(symbol = %self.settings.symbol, "feed session stopped");
    }

    // ── Commands ────────────────────────────────────────────────────────

    fn on_command(&mut self, cmd: SessionCommand) {
        if !self.is_alive() {
            return;
        }
        match cmd {
            SessionCommand::Connect => {
                if self.controller.connect() {
                    self.backoff.cancel();
                    self.start_connect();
                }
            }
            SessionCommand::Disconnect => self.on_closed(true),
            SessionCommand::Activate { spec, reply } => {
                let _ = reply.send(self.engine.activate(spec, self.store.candles()));
            }
            SessionCommand::Deactivate { id, reply } => {
                let _ = reply.send(self.engine.deactivate(id));
            }
            SessionCommand::Update { id, spec, reply } => {
                let _ = reply.send(self.engine.update(id, spec, self.store.candles()));
            }
            SessionCommand::SetVisible { id, visible, reply } => {
                let _ = reply.send(self.engine.set_visible(id, visible, self.store.candles()));
            }
            SessionCommand::Flush { reply } => {
                if let Some(batch) = self.coalescer.force_flush() {
                    self.apply_batch(batch);
                }
                let _ = reply.send(());
            }
        }
        self.publish();
    }

    // ── Connection lifecycle ────────────────────────────────────────────

    fn start_connect(&mut self) {
        let timeout = self.settings.connect_timeout;
        let connect = self.transport.connect(&self.settings.symbol);
        self.stream = None;
        self.connecting = Some(
            async move {
                match tokio::time::timeout(timeout, connect).await {
                    Ok(result) => result,
                    Err(_) => Err(anyhow!("connect timed out after {timeout:?}")),
                }
            }
            .boxed(),
        );
    }

    fn on_connect_result(&mut self, result: Result<FeedStream>) {
        if !self.is_alive() {
            return;
        }
        match result {
            Ok(stream) => {
                if self.controller.on_open() {
                    self.stream = Some(stream);
                    self.counters.connections += 1;
                }
            }
            Err(e) => {
                warn!(symbol = %self.settings.symbol, error = %format!("{e:#}"), "feed connect failed");
                self.state.push_error(format!("feed connect failed: {e:#}"));
                self.on_closed(false);
            }
        }
        self.publish();
    }

    fn on_frame(&mut self, frame: Option<Result<String>>) {
        if !self.is_alive() {
            return;
        }
        match frame {
            Some(Ok(text)) => self.on_message(&text),
            Some(Err(e)) => {
                warn!(symbol = %self.settings.symbol, error = %format!("{e:#}"), "feed connection error");
                self.state.push_error(format!("feed connection error: {e:#}"));
                self.on_closed(false);
                self.publish();
            }
            None => {
                warn!(symbol = %self.settings.symbol, "feed stream ended");
                self.on_closed(false);
                self.publish();
            }
        }
    }

    /// Connection gone: drop it and let the controller decide on a retry.
    fn on_closed(&mut self, user_initiated: bool) {
        self.connecting = None;
        self.stream = None;
        match self.controller.on_close(user_initiated) {
            Some(delay) => self.backoff.schedule(delay),
            None => self.backoff.cancel(),
        }
    }

    fn on_backoff_elapsed(&mut self) {
        if !self.is_alive() {
            return;
        }
        if self.controller.on_retry_timer() {
            self.start_connect();
            self.publish();
        }
    }

    // ── Data path ───────────────────────────────────────────────────────

    fn on_message(&mut self, text: &str) {
        self.counters.messages += 1;

        let parsed = match feed_message::parse_feed_message(text, self.settings.utc_offset) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.counters.unparseable += 1;
                debug!(error = %e, "ignored unparseable feed frame");
                return;
            }
        };
        self.counters.rejected_rows += parsed.rejected as u64;
        self.counters.unrecognized += parsed.unrecognized as u64;

        let interval = self.settings.interval_secs;
        for update in parsed.updates {
            let candle = match update {
                LiveUpdate::Bar(bar) => feed_message::bucket_bar(bar, interval),
                LiveUpdate::Tick { time, price, volume } => {
                    let at = time.unwrap_or_else(|| Utc::now().timestamp());
                    let bucket = feed_message::bucket_start(at, interval);
                    let forming = self
                        .coalescer
                        .pending_bar(bucket)
                        .or_else(|| self.store.last().filter(|c| c.time == bucket))
                        .copied();
                    feed_message::merge_tick(forming.as_ref(), bucket, price, volume)
                }
            };
            self.coalescer.enqueue(candle);
        }
    }

    fn flush_pending(&mut self) {
        if !self.is_alive() {
            return;
        }
        if let Some(batch) = self.coalescer.take_batch() {
            self.apply_batch(batch);
            self.publish();
        }
    }

    /// Commit, then recompute.  Never interleaved: both run on this task.
    fn apply_batch(&mut self, batch: Vec<Candle>) {
        let outcome = self.store.commit(&batch);
        if outcome.changed() {
            self.engine.recompute_all(self.store.candles());
        }
        debug!(
            batch = batch.len(),
            appended = outcome.appended,
            replaced = outcome.replaced,
            stale = outcome.stale,
            out_of_order = outcome.out_of_order,
            "coalesced batch committed"
        );
    }

    // ── Publication ─────────────────────────────────────────────────────

    fn publish(&mut self) {
        if !self.is_alive() {
            return;
        }
        self.counters.coalescer_overflow = self.coalescer.overflow_dropped();
        self.counters.flushes = self.coalescer.flushes();

        let snapshot = ChartSnapshot {
            state_version: 0,
            symbol: self.settings.symbol.clone(),
            interval_secs: self.settings.interval_secs,
            candles: self.store.to_vec(),
            indicators: self.engine.snapshot(),
            connection: self.controller.state(),
            degraded: self.history.is_degraded(),
            history: self.history.clone(),
            store: self.store.stats(),
            feed: self.counters,
            pending_updates: self.coalescer.len(),
        };
        self.state.publish(snapshot);
    }
}

async fn await_connect(pending: &mut Option<ConnectFuture>) -> Result<FeedStream> {
    match pending {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

/// `None` means the open stream ended.  Pends forever with no stream.
async fn next_frame(stream: &mut Option<FeedStream>) -> Option<Result<String>> {
    match stream {
        Some(s) => s.next().await,
        None => std::future::pending().await,
    }
}
