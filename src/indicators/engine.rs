// =============================================================================
// Indicator Engine — active indicator set over the candle series
// =============================================================================
//
// Every active indicator is a typed `IndicatorSpec`.  Outputs are rebuilt in
// full from the current series on every committed change; nothing is carried
// between recomputations.  Each output line is aligned to the tail of the
// series: the warm-up span is omitted, never zero-filled.
//
// Hidden indicators stay in the active set but are not computed until they
// are made visible again.
// =============================================================================

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::{atr, bollinger, cci, ema, macd, mfi, obv, psar, rsi, sma, stochastic, vwap};
use crate::market_data::Candle;

// =============================================================================
// IndicatorSpec
// =============================================================================

/// Indicator type plus its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorSpec {
    Sma { period: usize },
    Ema { period: usize },
    Rsi { period: usize },
    Bollinger { period: usize, k: f64 },
    Macd { fast: usize, slow: usize, signal: usize },
    Stochastic { period: usize, smooth_k: usize, smooth_d: usize },
    Atr { period: usize },
    Vwap,
    ParabolicSar { accel: f64, max_accel: f64 },
    Mfi { period: usize },
    Obv,
    Cci { period: usize },
}

impl IndicatorSpec {
    /// Reject parameter combinations the calculations cannot honour.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Sma { period }
            | Self::Ema { period }
            | Self::Rsi { period }
            | Self::Atr { period }
            | Self::Mfi { period }
            | Self::Cci { period } => ensure!(period >= 1, "period must be at least 1"),
            Self::Bollinger { period, k } => {
                ensure!(period >= 1, "period must be at least 1");
                ensure!(k.is_finite() && k >= 0.0, "band width k must be a non-negative number");
            }
            Self::Macd { fast, slow, signal } => {
                ensure!(fast >= 1 && slow >= 1 && signal >= 1, "MACD periods must be at least 1");
                ensure!(fast < slow, "MACD fast period must be shorter than slow period");
            }
            Self::Stochastic { period, smooth_k, smooth_d } => {
                ensure!(
                    period >= 1 && smooth_k >= 1 && smooth_d >= 1,
                    "stochastic periods must be at least 1"
                );
            }
            Self::ParabolicSar { accel, max_accel } => {
                ensure!(
                    accel.is_finite() && max_accel.is_finite() && accel > 0.0 && accel <= max_accel,
                    "SAR requires 0 < accel <= max_accel"
                );
            }
            Self::Vwap | Self::Obv => {}
        }
        Ok(())
    }

    /// Short display label, e.g. `SMA(20)`.
    pub fn label(&self) -> String {
        match self {
            Self::Sma { period } => format!("SMA({period})"),
            Self::Ema { period } => format!("EMA({period})"),
            Self::Rsi { period } => format!("RSI({period})"),
            Self::Bollinger { period, k } => format!("BB({period},{k})"),
            Self::Macd { fast, slow, signal } => format!("MACD({fast},{slow},{signal})"),
            Self::Stochastic { period, smooth_k, smooth_d } => {
                format!("STOCH({period},{smooth_k},{smooth_d})")
            }
            Self::Atr { period } => format!("ATR({period})"),
            Self::Vwap => "VWAP".to_string(),
            Self::ParabolicSar { accel, max_accel } => format!("SAR({accel},{max_accel})"),
            Self::Mfi { period } => format!("MFI({period})"),
            Self::Obv => "OBV".to_string(),
            Self::Cci { period } => format!("CCI({period})"),
        }
    }

    /// Compute every output line of this indicator over `candles`.
    pub fn compute(&self, candles: &[Candle]) -> Vec<IndicatorLine> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let times: Vec<i64> = candles.iter().map(|c| c.time).collect();
        let line = |name: &str, values: Vec<f64>| IndicatorLine::aligned(name, &times, &values);

        match *self {
            Self::Sma { period } => vec![line("sma", sma::calculate_sma(&closes, period))],
            Self::Ema { period } => vec![line("ema", ema::calculate_ema(&closes, period))],
            Self::Rsi { period } => vec![line("rsi", rsi::calculate_rsi(&closes, period))],
            Self::Bollinger { period, k } => {
                let bands = bollinger::calculate_bollinger(&closes, period, k);
                vec![
                    line("upper", bands.upper),
                    line("middle", bands.middle),
                    line("lower", bands.lower),
                ]
            }
            Self::Macd { fast, slow, signal } => {
                let lines = macd::calculate_macd(&closes, fast, slow, signal);
                vec![
                    line("macd", lines.macd),
                    line("signal", lines.signal),
                    line("histogram", lines.histogram),
                ]
            }
            Self::Stochastic { period, smooth_k, smooth_d } => {
                let lines = stochastic::calculate_stochastic(candles, period, smooth_k, smooth_d);
                vec![line("k", lines.k), line("d", lines.d)]
            }
            Self::Atr { period } => vec![line("atr", atr::calculate_atr(candles, period))],
            Self::Vwap => vec![line("vwap", vwap::calculate_vwap(candles))],
            Self::ParabolicSar { accel, max_accel } => {
                vec![line("sar", psar::calculate_psar(candles, accel, max_accel))]
            }
            Self::Mfi { period } => vec![line("mfi", mfi::calculate_mfi(candles, period))],
            Self::Obv => vec![line("obv", obv::calculate_obv(candles))],
            Self::Cci { period } => vec![line("cci", cci::calculate_cci(candles, period))],
        }
    }
}

// =============================================================================
// Output types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub time: i64,
    pub value: f64,
}

/// One named output series, e.g. MACD's `signal`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorLine {
    pub name: String,
    pub points: Vec<IndicatorPoint>,
}

impl IndicatorLine {
    /// Pair `values` with the last `values.len()` entries of `times`.
    /// Non-finite values are dropped.
    fn aligned(name: &str, times: &[i64], values: &[f64]) -> Self {
        let start = times.len().saturating_sub(values.len());
        let points = times[start..]
            .iter()
            .zip(values)
            .filter(|(_, v)| v.is_finite())
            .map(|(&time, &value)| IndicatorPoint { time, value })
            .collect();
        Self {
            name: name.to_string(),
            points,
        }
    }
}

/// Published view of one active indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSeries {
    pub id: Uuid,
    pub label: String,
    pub spec: IndicatorSpec,
    pub visible: bool,
    pub lines: Vec<IndicatorLine>,
}

// =============================================================================
// IndicatorEngine
// =============================================================================

struct ActiveIndicator {
    id: Uuid,
    spec: IndicatorSpec,
    visible: bool,
    lines: Vec<IndicatorLine>,
}

impl ActiveIndicator {
    fn recompute(&mut self, candles: &[Candle]) {
        self.lines = if self.visible {
            self.spec.compute(candles)
        } else {
            Vec::new()
        };
    }
}

/// The set of active indicators, in activation order.
#[derive(Default)]
pub struct IndicatorEngine {
    active: Vec<ActiveIndicator>,
}

impl IndicatorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate `spec`, computing it immediately.  Activating a spec that is
    /// already active returns the existing id.
    pub fn activate(&mut self, spec: IndicatorSpec, candles: &[Candle]) -> Result<Uuid> {
        spec.validate()
            .with_context(|| format!("invalid indicator {}", spec.label()))?;

        if let Some(existing) = self.active.iter().find(|a| a.spec == spec) {
            debug!(id = %existing.id, label = %spec.label(), "indicator already active");
            return Ok(existing.id);
        }

        let mut entry = ActiveIndicator {
            id: Uuid::new_v4(),
            spec,
            visible: true,
            lines: Vec::new(),
        };
        entry.recompute(candles);
        info!(id = %entry.id, label = %entry.spec.label(), "indicator activated");
        let id = entry.id;
        self.active.push(entry);
        Ok(id)
    }

    pub fn deactivate(&mut self, id: Uuid) -> bool {
        let before = self.active.len();
        self.active.retain(|a| a.id != id);
        let removed = self.active.len() != before;
        if removed {
            info!(id = %id, "indicator deactivated");
        }
        removed
    }

    /// Replace the parameters of `id`.  The old output is discarded and the
    /// new one built from scratch.  When `spec` is already active under
    /// another id, `id` is dropped in favour of it and that id is returned.
    pub fn update(&mut self, id: Uuid, spec: IndicatorSpec, candles: &[Candle]) -> Result<Uuid> {
        spec.validate()
            .with_context(|| format!("invalid indicator {}", spec.label()))?;

        let Some(pos) = self.active.iter().position(|a| a.id == id) else {
            anyhow::bail!("indicator {id} is not active");
        };

        if let Some(other) = self.active.iter().find(|a| a.id != id && a.spec == spec) {
            let other_id = other.id;
            self.active.remove(pos);
            debug!(id = %id, merged_into = %other_id, "indicator update matched an active spec");
            return Ok(other_id);
        }

        let entry = &mut self.active[pos];
        entry.spec = spec;
        entry.lines.clear();
        entry.recompute(candles);
        info!(id = %id, label = %entry.spec.label(), "indicator updated");
        Ok(id)
    }

    /// Show or hide `id`; showing recomputes it.
    pub fn set_visible(&mut self, id: Uuid, visible: bool, candles: &[Candle]) -> bool {
        match self.active.iter_mut().find(|a| a.id == id) {
            Some(entry) => {
                entry.visible = visible;
                entry.recompute(candles);
                true
            }
            None => false,
        }
    }

    /// Rebuild every visible indicator from `candles`.
    pub fn recompute_all(&mut self, candles: &[Candle]) {
        for entry in &mut self.active {
            entry.recompute(candles);
        }
    }

    pub fn snapshot(&self) -> Vec<IndicatorSeries> {
        self.active
            .iter()
            .map(|a| IndicatorSeries {
                id: a.id,
                label: a.spec.label(),
                spec: a.spec.clone(),
                visible: a.visible,
                lines: a.lines.clone(),
            })
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000;

    fn flat_series(n: usize, close: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                time: T0 + i as i64 * 60,
                open: close,
                high: close,
                low: close,
                close,
                volume: Some(10),
            })
            .collect()
    }

    fn wavy_series(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let c = 100.0 + (i as f64 * 0.4).sin() * 3.0;
                Candle {
                    time: T0 + i as i64 * 60,
                    open: c - 0.2,
                    high: c + 1.0,
                    low: c - 1.0,
                    close: c,
                    volume: Some(100 + i as u64),
                }
            })
            .collect()
    }

    #[test]
    fn sma20_over_25_flat_candles() {
        let candles = flat_series(25, 100.0);
        let mut engine = IndicatorEngine::new();
        engine.activate(IndicatorSpec::Sma { period: 20 }, &candles).unwrap();

        let snap = engine.snapshot();
        let points = &snap[0].lines[0].points;
        assert_eq!(points.len(), 6);
        assert!(points.iter().all(|p| p.value == 100.0));
        assert_eq!(points[0].time, candles[19].time);
        assert_eq!(points[5].time, candles[24].time);
    }

    #[test]
    fn every_indicator_is_tail_aligned() {
        let candles = wavy_series(80);
        let specs = vec![
            IndicatorSpec::Sma { period: 10 },
            IndicatorSpec::Ema { period: 10 },
            IndicatorSpec::Rsi { period: 14 },
            IndicatorSpec::Bollinger { period: 20, k: 2.0 },
            IndicatorSpec::Macd { fast: 12, slow: 26, signal: 9 },
            IndicatorSpec::Stochastic { period: 14, smooth_k: 3, smooth_d: 3 },
            IndicatorSpec::Atr { period: 14 },
            IndicatorSpec::Vwap,
            IndicatorSpec::ParabolicSar { accel: 0.02, max_accel: 0.2 },
            IndicatorSpec::Mfi { period: 14 },
            IndicatorSpec::Obv,
            IndicatorSpec::Cci { period: 20 },
        ];
        let last_time = candles.last().unwrap().time;

        for spec in specs {
            for line in spec.compute(&candles) {
                assert!(!line.points.is_empty(), "{} {} empty", spec.label(), line.name);
                assert_eq!(line.points.last().unwrap().time, last_time);
                assert!(line.points.windows(2).all(|w| w[1].time - w[0].time == 60));
                assert!(line.points.iter().all(|p| p.value.is_finite()));
            }
        }
    }

    #[test]
    fn warmup_lengths() {
        let candles = wavy_series(50);
        let len = |spec: IndicatorSpec| spec.compute(&candles)[0].points.len();
        assert_eq!(len(IndicatorSpec::Rsi { period: 14 }), 36);
        assert_eq!(len(IndicatorSpec::Mfi { period: 14 }), 36);
        assert_eq!(len(IndicatorSpec::Atr { period: 14 }), 37);
        assert_eq!(len(IndicatorSpec::ParabolicSar { accel: 0.02, max_accel: 0.2 }), 49);
        assert_eq!(len(IndicatorSpec::Obv), 50);
    }

    #[test]
    fn duplicate_activation_returns_same_id() {
        let candles = flat_series(30, 10.0);
        let mut engine = IndicatorEngine::new();
        let a = engine.activate(IndicatorSpec::Ema { period: 9 }, &candles).unwrap();
        let b = engine.activate(IndicatorSpec::Ema { period: 9 }, &candles).unwrap();
        let c = engine.activate(IndicatorSpec::Ema { period: 10 }, &candles).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn invalid_specs_are_rejected() {
        let mut engine = IndicatorEngine::new();
        let bad = [
            IndicatorSpec::Sma { period: 0 },
            IndicatorSpec::Macd { fast: 26, slow: 12, signal: 9 },
            IndicatorSpec::Bollinger { period: 20, k: -1.0 },
            IndicatorSpec::ParabolicSar { accel: 0.5, max_accel: 0.2 },
            IndicatorSpec::Stochastic { period: 14, smooth_k: 0, smooth_d: 3 },
        ];
        for spec in bad {
            assert!(engine.activate(spec, &[]).is_err());
        }
        assert!(engine.is_empty());
    }

    #[test]
    fn update_rebuilds_with_new_params() {
        let candles = flat_series(30, 10.0);
        let mut engine = IndicatorEngine::new();
        let id = engine.activate(IndicatorSpec::Sma { period: 20 }, &candles).unwrap();
        let same = engine.update(id, IndicatorSpec::Sma { period: 5 }, &candles).unwrap();
        assert_eq!(same, id);
        let snap = engine.snapshot();
        assert_eq!(snap[0].lines[0].points.len(), 26);
        assert_eq!(snap[0].label, "SMA(5)");

        assert!(engine.update(Uuid::new_v4(), IndicatorSpec::Obv, &candles).is_err());
    }

    #[test]
    fn update_onto_existing_spec_merges() {
        let candles = flat_series(30, 10.0);
        let mut engine = IndicatorEngine::new();
        let a = engine.activate(IndicatorSpec::Sma { period: 20 }, &candles).unwrap();
        let b = engine.activate(IndicatorSpec::Sma { period: 5 }, &candles).unwrap();
        assert_eq!(engine.update(b, IndicatorSpec::Sma { period: 20 }, &candles).unwrap(), a);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn hidden_indicators_are_not_computed() {
        let candles = flat_series(30, 10.0);
        let mut engine = IndicatorEngine::new();
        let id = engine.activate(IndicatorSpec::Obv, &candles).unwrap();
        assert!(engine.set_visible(id, false, &candles));
        engine.recompute_all(&candles);
        assert!(engine.snapshot()[0].lines.is_empty());

        assert!(engine.set_visible(id, true, &candles));
        assert_eq!(engine.snapshot()[0].lines[0].points.len(), 30);
        assert!(!engine.set_visible(Uuid::new_v4(), true, &candles));
    }

    #[test]
    fn recompute_follows_series() {
        let mut candles = flat_series(20, 100.0);
        let mut engine = IndicatorEngine::new();
        engine.activate(IndicatorSpec::Sma { period: 20 }, &candles).unwrap();
        assert_eq!(engine.snapshot()[0].lines[0].points.len(), 1);

        candles.push(Candle { time: T0 + 20 * 60, ..candles[0] });
        engine.recompute_all(&candles);
        assert_eq!(engine.snapshot()[0].lines[0].points.len(), 2);
    }

    #[test]
    fn deactivate_removes() {
        let mut engine = IndicatorEngine::new();
        let id = engine.activate(IndicatorSpec::Vwap, &[]).unwrap();
        assert!(engine.deactivate(id));
        assert!(!engine.deactivate(id));
        assert!(engine.is_empty());
    }

    #[test]
    fn spec_json_shape() {
        let spec: IndicatorSpec =
            serde_json::from_str(r#"{"kind":"parabolic_sar","accel":0.02,"max_accel":0.2}"#).unwrap();
        assert_eq!(spec, IndicatorSpec::ParabolicSar { accel: 0.02, max_accel: 0.2 });
        let json = serde_json::to_value(IndicatorSpec::Vwap).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "vwap" }));
    }
}
