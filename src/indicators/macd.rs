// =============================================================================
// MACD — Moving Average Convergence / Divergence
// =============================================================================
//
//   macd      = EMA(fast) - EMA(slow)      (from index slow - 1)
//   signal    = EMA(macd, signal)
//   histogram = macd - signal              (aligned to the signal line)
// =============================================================================

use super::ema::calculate_ema;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacdLines {
    pub macd: Vec<f64>,
    /// Shorter than `macd` by `signal - 1`; both end at the last input.
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdLines {
    if fast == 0 || slow == 0 || signal == 0 || fast >= slow {
        return MacdLines::default();
    }

    let fast_ema = calculate_ema(closes, fast);
    let slow_ema = calculate_ema(closes, slow);
    if slow_ema.is_empty() {
        return MacdLines::default();
    }

    // fast_ema starts `slow - fast` inputs earlier than slow_ema.
    let offset = slow - fast;
    let macd: Vec<f64> = fast_ema[offset..]
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();

    let signal_line = calculate_ema(&macd, signal);
    let lag = macd.len() - signal_line.len();
    let histogram = macd[lag..]
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();

    MacdLines {
        macd,
        signal: signal_line,
        histogram,
    }
}
