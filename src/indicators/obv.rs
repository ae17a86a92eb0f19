// =============================================================================
// On-Balance Volume (OBV)
// =============================================================================

use crate::market_data::Candle;

/// Running total starting at 0 on the first candle: add the bar's volume when
/// close rises against the previous close, subtract it when close falls.
pub fn calculate_obv(candles: &[Candle]) -> Vec<f64> {
    let mut out = Vec::with_capacity(candles.len());
    let mut obv = 0.0;
    let mut prev_close: Option<f64> = None;

    for c in candles {
        if let Some(pc) = prev_close {
            if c.close > pc {
                obv += c.effective_volume();
            } else if c.close < pc {
                obv -= c.effective_volume();
            }
        }
        out.push(obv);
        prev_close = Some(c.close);
    }

    out
}
