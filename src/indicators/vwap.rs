// =============================================================================
// VWAP — cumulative volume-weighted average price
// =============================================================================

use crate::market_data::Candle;

/// `Σ(typical × volume) / Σ volume` from the first candle, one value per
/// candle.  A bar without volume counts as volume 1.  While the cumulative
/// volume is zero the value is NaN and is dropped by the caller.
pub fn calculate_vwap(candles: &[Candle]) -> Vec<f64> {
    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;

    candles
        .iter()
        .map(|c| {
            let vol = c.effective_volume();
            cum_pv += c.typical_price() * vol;
            cum_vol += vol;
            if cum_vol > 0.0 {
                cum_pv / cum_vol
            } else {
                f64::NAN
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(high: f64, low: f64, close: f64, volume: Option<u64>) -> Candle {
        Candle { time: 1, open: close, high, low, close, volume }
    }

    #[test]
    fn vwap_weights_by_volume() {
        // typical prices 10 and 20
        let candles = [bar(11.0, 9.0, 10.0, Some(1)), bar(21.0, 19.0, 20.0, Some(3))];
        let vwap = calculate_vwap(&candles);
        assert!((vwap[0] - 10.0).abs() < 1e-12);
        assert!((vwap[1] - 17.5).abs() < 1e-12);
    }

    #[test]
    fn missing_volume_counts_as_one() {
        let candles = [bar(11.0, 9.0, 10.0, None), bar(21.0, 19.0, 20.0, None)];
        let vwap = calculate_vwap(&candles);
        assert!((vwap[1] - 15.0).abs() < 1e-12);
    }

    #[test]
    fn zero_volume_prefix_is_nan() {
        let candles = [bar(11.0, 9.0, 10.0, Some(0)), bar(21.0, 19.0, 20.0, Some(2))];
        let vwap = calculate_vwap(&candles);
        assert!(vwap[0].is_nan());
        assert!((vwap[1] - 20.0).abs() < 1e-12);
    }
}
