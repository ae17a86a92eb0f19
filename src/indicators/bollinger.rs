// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ), where σ is the population standard deviation
// over the same window.
// =============================================================================

use super::sma::calculate_sma;

/// Three equally long band series, aligned to the tail of the input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Calculate Bollinger Bands over `closes` for every full window.
pub fn calculate_bollinger(closes: &[f64], period: usize, num_std: f64) -> BollingerBands {
    let middle = calculate_sma(closes, period);
    if middle.is_empty() {
        return BollingerBands::default();
    }

    let period_f = period as f64;
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());

    for (window, &mean) in closes.windows(period).zip(middle.iter()) {
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period_f;
        let std_dev = variance.sqrt();
        upper.push(mean + num_std * std_dev);
        lower.push(mean - num_std * std_dev);
    }

    BollingerBands { upper, middle, lower }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bollinger_basic() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let bb = calculate_bollinger(&closes, 20, 2.0);
        assert_eq!(bb.middle.len(), 1);
        assert!(bb.upper[0] > bb.middle[0]);
        assert!(bb.lower[0] < bb.middle[0]);
    }

    #[test]
    fn bollinger_population_sigma() {
        // [2, 4, 4, 4, 5, 5, 7, 9]: mean 5, population σ 2
        let closes = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let bb = calculate_bollinger(&closes, 8, 2.0);
        assert!((bb.middle[0] - 5.0).abs() < 1e-12);
        assert!((bb.upper[0] - 9.0).abs() < 1e-12);
        assert!((bb.lower[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn bollinger_insufficient_data() {
        let bb = calculate_bollinger(&[1.0, 2.0, 3.0], 20, 2.0);
        assert!(bb.middle.is_empty() && bb.upper.is_empty() && bb.lower.is_empty());
    }

    #[test]
    fn bollinger_flat() {
        let bb = calculate_bollinger(&[100.0; 25], 20, 2.0);
        assert_eq!(bb.upper.len(), 6);
        assert!(bb.upper.iter().zip(&bb.lower).all(|(u, l)| (u - l).abs() < 1e-10));
    }
}
