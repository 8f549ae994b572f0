//! Forecasting capability
//!
//! The trained model is external; the engine only builds its feature vector
//! and asks for a predicted forward return. A NaN prediction means "no
//! opinion" and the stock is skipped.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::fundamentals::Fundamentals;
use crate::indicators::{closes, latest, rsi, sma_last, tail, true_range, volumes};
use crate::PriceBar;

/// Bars needed for the slowest feature (200-day SMA)
pub const MIN_FEATURE_BARS: usize = 200;

/// Model inputs: orthogonal technical factors plus fundamentals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub rsi_14: f64,
    /// 50-day SMA over 200-day SMA
    pub sma_ratio: f64,
    /// 14-day ATR as a fraction of the close
    pub atr_pct: f64,
    /// Today's volume over the 20-day average
    pub relative_volume: f64,
    pub trailing_pe: f64,
    pub return_on_equity: f64,
    pub debt_to_equity: f64,
}

impl FeatureVector {
    pub fn as_array(&self) -> [f64; 7] {
        [
            self.rsi_14,
            self.sma_ratio,
            self.atr_pct,
            self.relative_volume,
            self.trailing_pe,
            self.return_on_equity,
            self.debt_to_equity,
        ]
    }
}

/// Predicts the forward return (as a fraction) for a feature vector
pub trait Forecaster: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> f64;
}

impl<F> Forecaster for F
where
    F: Fn(&FeatureVector) -> f64 + Send + Sync,
{
    fn predict(&self, features: &FeatureVector) -> f64 {
        self(features)
    }
}

/// Build the feature vector from an observable window, `None` if any input is
/// missing or not finite
pub fn extract_features(bars: &[PriceBar], fundamentals: &Fundamentals) -> Option<FeatureVector> {
    if bars.len() < MIN_FEATURE_BARS {
        return None;
    }
    let window = tail(bars, MIN_FEATURE_BARS + 1);
    let close = closes(window);
    let volume = volumes(window);
    let last_close = *close.last()?;
    if last_close <= 0.0 {
        return None;
    }

    let rsi_14 = latest(&rsi(tail(&close, 15), 14))?;
    let sma_ratio = sma_last(&close, 50)? / sma_last(&close, 200)?;

    let ranges = true_range(tail(window, 15));
    let atr_14 = ranges.get(1..)?.iter().sum::<f64>() / 14.0;
    let atr_pct = atr_14 / last_close;

    let avg_volume = sma_last(&volume, 20)?;
    let relative_volume = if avg_volume > 0.0 {
        *volume.last()? / avg_volume
    } else {
        return None;
    };

    let features = FeatureVector {
        rsi_14,
        sma_ratio,
        atr_pct,
        relative_volume,
        trailing_pe: fundamentals.trailing_pe,
        return_on_equity: fundamentals.return_on_equity,
        debt_to_equity: fundamentals.debt_to_equity,
    };

    features
        .as_array()
        .iter()
        .all(|v| v.is_finite())
        .then_some(features)
}

/// Linear scoring model exported from the training pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearForecaster {
    pub intercept: f64,
    /// Weights in [`FeatureVector::as_array`] order
    pub weights: [f64; 7],
}

impl LinearForecaster {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path.as_ref()).context("Failed to read model file")?;
        serde_json::from_str(&contents).context("Failed to parse model JSON")
    }
}

impl Forecaster for LinearForecaster {
    fn predict(&self, features: &FeatureVector) -> f64 {
        self.intercept
            + self
                .weights
                .iter()
                .zip(features.as_array())
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Symbol;
    use chrono::{Duration, NaiveDate};

    fn fundamentals() -> Fundamentals {
        Fundamentals {
            return_on_equity: 0.2,
            debt_to_equity: 0.5,
            market_cap: 1e11,
            trailing_pe: 20.0,
            book_value: 100.0,
        }
    }

    fn uptrend(n: usize) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
        (0..n)
            .map(|i| {
                let c = 100.0 + i as f64;
                PriceBar::new_unchecked(
                    Symbol::new("X"),
                    start + Duration::days(i as i64),
                    c,
                    c + 1.0,
                    c - 1.0,
                    c,
                    if i + 1 == n { 2000.0 } else { 1000.0 },
                )
            })
            .collect()
    }

    #[test]
    fn test_features_need_200_bars() {
        assert!(extract_features(&uptrend(199), &fundamentals()).is_none());
        assert!(extract_features(&uptrend(200), &fundamentals()).is_some());
    }

    #[test]
    fn test_feature_values() {
        let features = extract_features(&uptrend(260), &fundamentals()).unwrap();

        assert_eq!(features.rsi_14, 100.0);
        assert!(features.sma_ratio > 1.0);
        // True range is 2.0 every day
        assert!((features.atr_pct - 2.0 / 359.0).abs() < 1e-9);
        assert!((features.relative_volume - 2000.0 / 1050.0).abs() < 1e-9);
        assert_eq!(features.trailing_pe, 20.0);
    }

    #[test]
    fn test_linear_forecaster() {
        let model = LinearForecaster {
            intercept: 0.001,
            weights: [0.0, 0.01, 0.0, 0.0, 0.0, 0.0, 0.0],
        };
        let features = extract_features(&uptrend(260), &fundamentals()).unwrap();
        let expected = 0.001 + 0.01 * features.sma_ratio;
        assert!((model.predict(&features) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_closure_forecaster() {
        let forecaster = |f: &FeatureVector| f.rsi_14 / 1000.0;
        let features = extract_features(&uptrend(260), &fundamentals()).unwrap();
        assert!((forecaster.predict(&features) - 0.1).abs() < 1e-12);
    }
}
