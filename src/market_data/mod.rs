pub mod candle;
pub mod coalescer;
pub mod feed_message;
pub mod historical;
pub mod reconnect;
pub mod series_store;
pub mod session;
pub mod time_normalizer;
pub mod timer;
pub mod transport;
pub mod validator;

// Re-export the Candle struct for convenient access (e.g. `use crate::market_data::Candle`).
pub use candle::Candle;
pub use historical::{HistoricalLoader, HistoryClient, LoaderSettings};
pub use session::{LiveFeedSession, SessionHandle, SessionSettings};
pub use transport::WsTransport;
