// =============================================================================
// Average True Range (ATR)
// =============================================================================
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// The first bar has no previous close, so its TR is simply H - L.
// ATR is the EMA of the TR series over `period`.
// =============================================================================

use super::ema::calculate_ema;
use crate::market_data::Candle;

/// One TR per candle, oldest first.
pub fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(candles.len());
    let mut prev_close: Option<f64> = None;

    for c in candles {
        let hl = c.high - c.low;
        let value = match prev_close {
            Some(pc) => hl.max((c.high - pc).abs()).max((c.low - pc).abs()),
            None => hl,
        };
        tr.push(value);
        prev_close = Some(c.close);
    }

    tr
}

/// ATR series; element `i` belongs to candle `i + period - 1`.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Vec<f64> {
    calculate_ema(&true_ranges(candles), period)
}
