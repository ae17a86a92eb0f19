// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free indicator calculations over the candle series.  Each
// function returns its full output series, aligned to the tail of its input:
// the warm-up span is simply absent.  `engine` owns the active set and maps
// those series onto candle times.

pub mod atr;
pub mod bollinger;
pub mod cci;
pub mod ema;
pub mod engine;
pub mod macd;
pub mod mfi;
pub mod obv;
pub mod psar;
pub mod rsi;
pub mod sma;
pub mod stochastic;
pub mod vwap;

pub use engine::{IndicatorEngine, IndicatorSeries, IndicatorSpec};
