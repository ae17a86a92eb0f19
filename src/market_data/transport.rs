// =============================================================================
// Feed Transport — per-symbol push connection
// =============================================================================
//
// The session only needs "open a connection, then read text frames until it
// ends".  `FeedTransport` captures exactly that so the session can be driven
// by a scripted stream in tests and by a WebSocket in production.
// =============================================================================

use anyhow::{Context, Result};
use futures_util::future::{self, BoxFuture, FutureExt};
use futures_util::stream::{BoxStream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

/// Text frames from an open connection.  The stream ends when the peer
/// closes; an `Err` item means the connection broke.
pub type FeedStream = BoxStream<'static, Result<String>>;

pub trait FeedTransport: Send + Sync + 'static {
    /// Open the push connection for `symbol`.
    fn connect(&self, symbol: &str) -> BoxFuture<'static, Result<FeedStream>>;
}

// ---------------------------------------------------------------------------
// WebSocket transport
// ---------------------------------------------------------------------------

/// Connects to `{base_url}/{symbol}` with the session token as a query
/// parameter.
#[derive(Clone)]
pub struct WsTransport {
    base_url: String,
    token: Option<String>,
}

impl WsTransport {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
        }
    }

    fn url_for(&self, symbol: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        match &self.token {
            Some(token) => format!("{base}/{symbol}?token={token}"),
            None => format!("{base}/{symbol}"),
        }
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl FeedTransport for WsTransport {
    fn connect(&self, symbol: &str) -> BoxFuture<'static, Result<FeedStream>> {
        let url = self.url_for(symbol);
        let base = self.base_url.clone();
        let symbol = symbol.to_string();

        async move {
            info!(url = %base, symbol = %symbol, "connecting to feed WebSocket");
            let (ws_stream, _response) = connect_async(&url)
                .await
                .context("failed to connect to feed WebSocket")?;
            info!(symbol = %symbol, "feed WebSocket connected");

            // Ping / Pong / Binary frames are skipped; tungstenite answers
            // pings itself.  A Close frame ends the stream.
            let frames = ws_stream
                .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
                .filter_map(|msg| {
                    future::ready(match msg {
                        Ok(Message::Text(text)) => Some(Ok(text)),
                        Ok(other) => {
                            debug!(len = other.len(), "skipped non-text feed frame");
                            None
                        }
                        Err(e) => Some(Err(anyhow::Error::new(e).context("feed WebSocket read error"))),
                    })
                })
                .boxed();
            Ok(frames)
        }
        .boxed()
    }
}
