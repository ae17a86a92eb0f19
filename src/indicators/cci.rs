// =============================================================================
// Commodity Channel Index (CCI)
// =============================================================================
//
//   tp  = (high + low + close) / 3
//   CCI = (tp - SMA(tp, n)) / (0.015 * MAD(tp, n))
//
// MAD is the mean absolute deviation from the window mean.  A window with no
// deviation yields 0.
// =============================================================================

use crate::market_data::Candle;

const LAMBERT: f64 = 0.015;

pub fn calculate_cci(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period {
        return Vec::new();
    }

    let typical: Vec<f64> = candles.iter().map(Candle::typical_price).collect();
    let period_f = period as f64;

    typical
        .windows(period)
        .map(|w| {
            let mean = w.iter().sum::<f64>() / period_f;
            let mad = w.iter().map(|x| (x - mean).abs()).sum::<f64>() / period_f;
            if mad > 0.0 {
                (w[w.len() - 1] - mean) / (LAMBERT * mad)
            } else {
                0.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(tp: f64) -> Candle {
        Candle { time: 1, open: tp, high: tp, low: tp, close: tp, volume: None }
    }

    #[test]
    fn cci_hand_computed() {
        // tp 1, 2, 3: mean 2, MAD 2/3 => (3 - 2) / (0.015 * 2/3) = 100
        let cci = calculate_cci(&[bar(1.0), bar(2.0), bar(3.0)], 3);
        assert_eq!(cci.len(), 1);
        assert!((cci[0] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn cci_flat_is_zero() {
        let cci = calculate_cci(&vec![bar(5.0); 25], 20);
        assert_eq!(cci.len(), 6);
        assert!(cci.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn cci_short_input() {
        assert!(calculate_cci(&[bar(1.0)], 20).is_empty());
    }
}
