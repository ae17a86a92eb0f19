// =============================================================================
// Stochastic Oscillator
// =============================================================================
//
//   raw %K = (close - lowest low) / (highest high - lowest low) * 100
//   %K     = SMA(raw %K, smooth_k)
//   %D     = SMA(%K, smooth_d)
//
// A window whose high equals its low yields a raw %K of 50.
// =============================================================================

use super::sma::calculate_sma;
use crate::market_data::Candle;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StochasticLines {
    pub k: Vec<f64>,
    pub d: Vec<f64>,
}

pub fn calculate_stochastic(
    candles: &[Candle],
    period: usize,
    smooth_k: usize,
    smooth_d: usize,
) -> StochasticLines {
    if period == 0 || candles.len() < period {
        return StochasticLines::default();
    }

    let raw_k: Vec<f64> = candles
        .windows(period)
        .map(|w| {
            let highest = w.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            let lowest = w.iter().map(|c| c.low).fold(f64::MAX, f64::min);
            let close = w[w.len() - 1].close;
            let range = highest - lowest;
            if range > 0.0 {
                (close - lowest) / range * 100.0
            } else {
                50.0
            }
        })
        .collect();

    let k = calculate_sma(&raw_k, smooth_k);
    let d = calculate_sma(&k, smooth_d);
    StochasticLines { k, d }
}
