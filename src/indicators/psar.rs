// =============================================================================
// Parabolic SAR
// =============================================================================
//
// Trend-following stop.  Each bar the SAR moves toward the extreme point (EP)
// of the current trend:
//
//   SAR_t = SAR_{t-1} + af * (EP - SAR_{t-1})
//
// `af` starts at `accel` and grows by `accel` every time a new EP is set,
// capped at `max_accel`.  When price crosses the SAR the trend flips: SAR
// resets to the prior EP, EP to the current bar's extreme, `af` to `accel`.
//
// Seeded on the second candle: uptrend if close_1 >= close_0, with SAR at the
// first bar's low (high for a downtrend).
// =============================================================================

use crate::market_data::Candle;

/// Element `i` belongs to candle `i + 1`.
pub fn calculate_psar(candles: &[Candle], accel: f64, max_accel: f64) -> Vec<f64> {
    if candles.len() < 2 || !(accel > 0.0 && accel <= max_accel) {
        return Vec::new();
    }

    let (first, second) = (&candles[0], &candles[1]);
    let mut uptrend = second.close >= first.close;
    let mut af = accel;
    let (mut sar, mut ep) = if uptrend {
        (first.low, first.high.max(second.high))
    } else {
        (first.high, first.low.min(second.low))
    };

    let mut out = Vec::with_capacity(candles.len() - 1);
    out.push(sar);

    for i in 2..candles.len() {
        let bar = &candles[i];
        let (prev, prev2) = (&candles[i - 1], &candles[i - 2]);

        sar += af * (ep - sar);

        if uptrend {
            // The SAR may not rise into the prior two lows.
            sar = sar.min(prev.low).min(prev2.low);
            if bar.low < sar {
                uptrend = false;
                sar = ep;
                ep = bar.low;
                af = accel;
            } else if bar.high > ep {
                ep = bar.high;
                af = (af + accel).min(max_accel);
            }
        } else {
            sar = sar.max(prev.high).max(prev2.high);
            if bar.high > sar {
                uptrend = true;
                sar = ep;
                ep = bar.high;
                af = accel;
            } else if bar.low < ep {
                ep = bar.low;
                af = (af + accel).min(max_accel);
            }
        }

        out.push(sar);
    }

    out
}
