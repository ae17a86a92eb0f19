// =============================================================================
// Money Flow Index (MFI)
// =============================================================================
//
// Volume-weighted RSI analogue.  Raw money flow = typical price × volume,
// counted as positive when the typical price rose against the previous bar
// and negative when it fell (unchanged bars count as neither).
//
//   MFI = 100 - 100 / (1 + Σpositive / Σnegative)   over `period` flows
//
// MFI is 100 when the window has no negative flow.  Missing volume counts
// as 1.
// =============================================================================

use crate::market_data::Candle;

/// Element `i` belongs to candle `i + period` (the first candle only
/// provides the reference typical price).
pub fn calculate_mfi(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return Vec::new();
    }

    // (positive, negative) flow for each candle after the first.
    let flows: Vec<(f64, f64)> = candles
        .windows(2)
        .map(|w| {
            let prev_tp = w[0].typical_price();
            let tp = w[1].typical_price();
            let raw = tp * w[1].effective_volume();
            if tp > prev_tp {
                (raw, 0.0)
            } else if tp < prev_tp {
                (0.0, raw)
            } else {
                (0.0, 0.0)
            }
        })
        .collect();

    flows
        .windows(period)
        .map(|w| {
            let (pos, neg) = w
                .iter()
                .fold((0.0, 0.0), |(p, n), &(dp, dn)| (p + dp, n + dn));
            if neg == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + pos / neg)
            }
        })
        .collect()
}
