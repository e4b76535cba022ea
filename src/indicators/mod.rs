//! Technical indicator engine
//!
//! Pure, deterministic computations over a price series. No I/O, no clock,
//! no randomness; the same series always yields bit-identical output.

use crate::error::AgentError;
use crate::models::{IndicatorSnapshot, PriceSeries, Signal, SignalLabel};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Threshold table for signal derivation.
///
/// Every constant is a named, overridable field rather than a magic number
/// inside the scoring logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalThresholds {
    /// RSI above this reads as overbought
    pub rsi_overbought: f64,
    /// RSI below this reads as oversold
    pub rsi_oversold: f64,
    /// Momentum (%) at which the momentum component saturates to ±1
    pub momentum_saturation: f64,
    pub momentum_weight: f64,
    pub rsi_weight: f64,
    /// Volatility (%) above which the strength is damped
    pub high_volatility: f64,
    pub volatility_damping: f64,
    /// |strength| at or below this is labeled neutral
    pub neutral_band: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            momentum_saturation: 10.0,
            momentum_weight: 0.6,
            rsi_weight: 0.4,
            high_volatility: 30.0,
            volatility_damping: 0.8,
            neutral_band: 0.1,
        }
    }
}

/// Lookback configuration for the indicator engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    /// RSI lookback in periods (common values: 14, 9)
    pub rsi_period: usize,
    /// Momentum window in observations
    pub momentum_period: usize,
    /// Volatility window in observations
    pub volatility_period: usize,
    /// Moving average window lengths, in observations
    pub ma_windows: Vec<u32>,
    pub thresholds: SignalThresholds,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            momentum_period: 20,
            volatility_period: 20,
            ma_windows: vec![20, 50],
            thresholds: SignalThresholds::default(),
        }
    }
}

impl IndicatorConfig {
    /// Minimum series length for a complete snapshot.
    ///
    /// Moving averages are excluded on purpose: windows the series cannot
    /// support are omitted from the snapshot map instead of failing the
    /// whole computation.
    pub fn min_required(&self) -> usize {
        (self.rsi_period + 1)
            .max(self.momentum_period)
            .max(self.volatility_period)
    }
}

/// Relative Strength Index over the trailing window, [0, 100].
///
/// RSI > 70: overbought. RSI < 30: oversold. With no losses in the window
/// the reading is exactly 100 (maximal bullish) rather than a division
/// error.
pub fn rsi(closes: &[f64], period: usize) -> Result<f64> {
    if closes.len() < period + 1 {
        return Err(AgentError::InsufficientData {
            required: period + 1,
            available: closes.len(),
        });
    }

    let window = &closes[closes.len() - (period + 1)..];

    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for pair in window.windows(2) {
        let delta = pair[1] - pair[0];
        if delta >= 0.0 {
            gain_sum += delta;
        } else {
            loss_sum += -delta;
        }
    }

    let avg_gain = gain_sum / period as f64;
    let avg_loss = loss_sum / period as f64;

    if avg_loss == 0.0 {
        return Ok(100.0);
    }

    let rs = avg_gain / avg_loss;
    Ok(100.0 - (100.0 / (1.0 + rs)))
}

/// Sample standard deviation of day-over-day percent returns, ×100.
///
/// High volatility means elevated hedging risk downstream.
pub fn volatility(closes: &[f64], period: usize) -> Result<f64> {
    if closes.len() < period {
        return Err(AgentError::InsufficientData {
            required: period,
            available: closes.len(),
        });
    }

    let window = &closes[closes.len() - period..];
    let returns: Vec<f64> = window
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) / pair[0])
        .collect();

    if returns.len() < 2 {
        return Err(AgentError::InsufficientData {
            required: 3,
            available: closes.len(),
        });
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance = returns
        .iter()
        .map(|r| (r - mean).powi(2))
        .sum::<f64>()
        / (returns.len() - 1) as f64;

    Ok(variance.sqrt() * 100.0)
}

/// Percent price change across the trailing window of `period` observations
pub fn momentum(closes: &[f64], period: usize) -> Result<f64> {
    if closes.len() < period {
        return Err(AgentError::InsufficientData {
            required: period,
            available: closes.len(),
        });
    }

    let current = closes[closes.len() - 1];
    let past = closes[closes.len() - period];
    Ok((current - past) / past * 100.0)
}

/// Arithmetic mean of the trailing `window` closes; `None` when the series
/// is shorter than the window
pub fn moving_average(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window {
        return None;
    }
    let tail = &closes[closes.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// Combine RSI, momentum, and volatility into a label plus a strength in
/// [-1, 1] via the threshold table.
pub fn derive_signal(
    rsi: f64,
    momentum: f64,
    volatility: f64,
    thresholds: &SignalThresholds,
) -> Signal {
    let momentum_component =
        (momentum / thresholds.momentum_saturation).clamp(-1.0, 1.0);

    let rsi_component = if rsi > thresholds.rsi_overbought {
        -((rsi - thresholds.rsi_overbought) / (100.0 - thresholds.rsi_overbought))
    } else if rsi < thresholds.rsi_oversold {
        (thresholds.rsi_oversold - rsi) / thresholds.rsi_oversold
    } else {
        0.0
    };

    let mut strength = (thresholds.momentum_weight * momentum_component
        + thresholds.rsi_weight * rsi_component)
        .clamp(-1.0, 1.0);

    if volatility > thresholds.high_volatility {
        strength *= thresholds.volatility_damping;
    }

    let label = if strength > thresholds.neutral_band {
        SignalLabel::Bullish
    } else if strength < -thresholds.neutral_band {
        SignalLabel::Bearish
    } else {
        SignalLabel::Neutral
    };

    Signal { label, strength }
}

/// Full technical analysis for one symbol.
///
/// Fails with `InsufficientData` when the series is shorter than
/// `config.min_required()`; never returns a partially populated snapshot.
pub fn compute_indicators(
    symbol: &str,
    series: &PriceSeries,
    config: &IndicatorConfig,
) -> Result<IndicatorSnapshot> {
    let required = config.min_required();
    if series.len() < required {
        return Err(AgentError::InsufficientData {
            required,
            available: series.len(),
        });
    }

    let closes = series.closes();

    let rsi_value = rsi(&closes, config.rsi_period)?;
    let volatility_value = volatility(&closes, config.volatility_period)?;
    let momentum_value = momentum(&closes, config.momentum_period)?;

    let mut moving_averages = BTreeMap::new();
    for &window in &config.ma_windows {
        if let Some(value) = moving_average(&closes, window as usize) {
            moving_averages.insert(window, value);
        }
    }

    let signal = derive_signal(
        rsi_value,
        momentum_value,
        volatility_value,
        &config.thresholds,
    );

    Ok(IndicatorSnapshot {
        symbol: symbol.to_string(),
        rsi: rsi_value,
        volatility: volatility_value,
        momentum: momentum_value,
        moving_averages,
        signal,
    })
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PricePoint;
    use chrono::NaiveDate;

    fn series_from_closes(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                date: start + chrono::Days::new(i as u64),
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 1_000_000,
            })
            .collect();
        PriceSeries::new(points).unwrap()
    }

    #[test]
    fn test_rsi_within_bounds() {
        let data: Vec<f64> = (0..40)
            .map(|i| 100.0 + (i as f64 * 0.5).sin() * 5.0)
            .collect();
        let value = rsi(&data, 14).unwrap();
        assert!((0.0..=100.0).contains(&value));
    }

    #[test]
    fn test_rsi_all_gains_is_exactly_100() {
        let data: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let value = rsi(&data, 14).unwrap();
        assert_eq!(value, 100.0);
    }

    #[test]
    fn test_rsi_all_losses_is_zero() {
        let data: Vec<f64> = (0..20).map(|i| 200.0 - i as f64).collect();
        let value = rsi(&data, 14).unwrap();
        assert!(value.abs() < 1e-10);
    }

    #[test]
    fn test_volatility_non_negative() {
        let data: Vec<f64> = (0..30)
            .map(|i| 100.0 + (i as f64 * 0.7).cos() * 3.0)
            .collect();
        let value = volatility(&data, 20).unwrap();
        assert!(value >= 0.0);
    }

    #[test]
    fn test_volatility_flat_series_is_zero() {
        let data = vec![100.0; 25];
        let value = volatility(&data, 20).unwrap();
        assert!(value.abs() < 1e-10);
    }

    #[test]
    fn test_momentum_sign() {
        let rising: Vec<f64> = (0..25).map(|i| 100.0 + i as f64).collect();
        assert!(momentum(&rising, 20).unwrap() > 0.0);

        let falling: Vec<f64> = (0..25).map(|i| 200.0 - i as f64).collect();
        assert!(momentum(&falling, 20).unwrap() < 0.0);
    }

    #[test]
    fn test_moving_average_omitted_when_short() {
        let data = vec![10.0, 20.0, 30.0];
        assert_eq!(moving_average(&data, 3), Some(20.0));
        assert_eq!(moving_average(&data, 4), None);
    }

    #[test]
    fn test_snapshot_rejects_short_series() {
        let series = series_from_closes(
            &(0..13).map(|i| 100.0 + i as f64).collect::<Vec<_>>(),
        );
        let result = compute_indicators("AAPL", &series, &IndicatorConfig::default());
        assert!(matches!(
            result,
            Err(AgentError::InsufficientData { required: 20, available: 13 })
        ));
    }

    #[test]
    fn test_twenty_rising_days_is_maximal_bullish() {
        // 100, 101, ..., 119: unit increments, no losses anywhere
        let series = series_from_closes(
            &(0..20).map(|i| 100.0 + i as f64).collect::<Vec<_>>(),
        );
        let snapshot =
            compute_indicators("AAPL", &series, &IndicatorConfig::default()).unwrap();

        assert_eq!(snapshot.rsi, 100.0);
        assert!(snapshot.momentum > 0.0);
        assert_eq!(snapshot.signal.label, SignalLabel::Bullish);
        // 20-observation window supports the 20-day MA but not the 50-day
        assert!(snapshot.moving_averages.contains_key(&20));
        assert!(!snapshot.moving_averages.contains_key(&50));
    }

    #[test]
    fn test_twenty_falling_days_is_bearish() {
        let series = series_from_closes(
            &(0..20).map(|i| 200.0 - i as f64).collect::<Vec<_>>(),
        );
        let snapshot =
            compute_indicators("TSLA", &series, &IndicatorConfig::default()).unwrap();
        assert_eq!(snapshot.signal.label, SignalLabel::Bearish);
        assert!(snapshot.signal.strength < 0.0);
    }

    #[test]
    fn test_flat_series_reads_as_no_loss_no_momentum() {
        let series = series_from_closes(&vec![100.0; 30]);
        let snapshot =
            compute_indicators("MSFT", &series, &IndicatorConfig::default()).unwrap();
        // no losses in the window reads as RSI 100 by the avg_loss == 0 rule
        assert_eq!(snapshot.rsi, 100.0);
        assert_eq!(snapshot.momentum, 0.0);
        assert!(snapshot.volatility.abs() < 1e-10);
    }

    #[test]
    fn test_mid_range_readings_are_neutral() {
        let signal = derive_signal(50.0, 0.5, 12.0, &SignalThresholds::default());
        assert_eq!(signal.label, SignalLabel::Neutral);
    }

    #[test]
    fn test_deterministic_recomputation() {
        let series = series_from_closes(
            &(0..60)
                .map(|i| 100.0 + (i as f64 * 0.3).sin() * 8.0)
                .collect::<Vec<_>>(),
        );
        let config = IndicatorConfig::default();

        let first = compute_indicators("NVDA", &series, &config).unwrap();
        let second = compute_indicators("NVDA", &series, &config).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_high_volatility_damps_strength() {
        let calm = derive_signal(50.0, 8.0, 10.0, &SignalThresholds::default());
        let choppy = derive_signal(50.0, 8.0, 45.0, &SignalThresholds::default());
        assert!(choppy.strength.abs() < calm.strength.abs());
    }
}
