//! Macro regime filter
//!
//! Classifies the market from the benchmark index trend, its annualized
//! volatility and the operator-supplied inflation print.

use crate::config::RegimeConfig;
use crate::indicators::{annualized_volatility, closes, sma_last, tail};
use crate::{PriceBar, RegimeSignal};

#[derive(Debug, Clone, Default)]
pub struct RegimeFilter {
    config: RegimeConfig,
}

impl RegimeFilter {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    /// Classify the regime from the trailing `time_frame` benchmark bars.
    ///
    /// Inflation above the threshold forces BEARISH regardless of trend.
    pub fn detect_regime(
        &self,
        benchmark_history: &[PriceBar],
        inflation: f64,
        time_frame: usize,
    ) -> RegimeSignal {
        if time_frame == 0 || benchmark_history.len() < time_frame {
            return RegimeSignal::Neutral;
        }

        let all_closes = closes(tail(benchmark_history, time_frame));
        let current = match all_closes.last() {
            Some(&c) => c,
            None => return RegimeSignal::Neutral,
        };
        let sma = match sma_last(&all_closes, time_frame) {
            Some(v) => v,
            None => return RegimeSignal::Neutral,
        };

        let uptrend = current > sma;
        let high_vol = annualized_volatility(&all_closes)
            .map(|v| v > self.config.high_volatility)
            .unwrap_or(false);
        let high_inflation = inflation > self.config.high_inflation_pct;

        if high_inflation || (!uptrend && high_vol) {
            RegimeSignal::Bearish
        } else if uptrend && !high_vol {
            RegimeSignal::Bullish
        } else {
            RegimeSignal::Neutral
        }
    }

    /// Regime using the configured window and inflation print
    pub fn current_regime(&self, benchmark_history: &[PriceBar]) -> RegimeSignal {
        self.detect_regime(
            benchmark_history,
            self.config.inflation_pct,
            self.config.sma_window,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Symbol;
    use chrono::{Duration, NaiveDate};

    fn series(f: impl Fn(usize) -> f64, n: usize) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        (0..n)
            .map(|i| {
                let c = f(i);
                PriceBar::new_unchecked(
                    Symbol::new("NIFTY50"),
                    start + Duration::days(i as i64),
                    c,
                    c * 1.005,
                    c * 0.995,
                    c,
                    1e6,
                )
            })
            .collect()
    }

    #[test]
    fn test_insufficient_history_is_neutral() {
        let filter = RegimeFilter::default();
        let history = series(|i| 100.0 + i as f64, 150);
        assert_eq!(filter.detect_regime(&history, 2.0, 200), RegimeSignal::Neutral);
    }

    #[test]
    fn test_steady_uptrend_is_bullish() {
        let filter = RegimeFilter::default();
        let history = series(|i| 10_000.0 + 10.0 * i as f64, 250);
        assert_eq!(filter.detect_regime(&history, 3.0, 200), RegimeSignal::Bullish);
    }

    #[test]
    fn test_inflation_overrides_trend() {
        let filter = RegimeFilter::default();
        let history = series(|i| 10_000.0 + 10.0 * i as f64, 250);
        assert_eq!(filter.detect_regime(&history, 4.5, 200), RegimeSignal::Bearish);
        // Threshold is strict
        assert_eq!(filter.detect_regime(&history, 4.0, 200), RegimeSignal::Bullish);
    }

    #[test]
    fn test_volatile_downtrend_is_bearish() {
        let filter = RegimeFilter::default();
        // Falling with +-4% alternating swings
        let history = series(
            |i| {
                let base = 10_000.0 - 15.0 * i as f64;
                if i % 2 == 0 { base * 1.04 } else { base * 0.96 }
            },
            250,
        );
        assert_eq!(filter.detect_regime(&history, 2.0, 200), RegimeSignal::Bearish);
    }

    #[test]
    fn test_quiet_downtrend_is_neutral() {
        let filter = RegimeFilter::default();
        let history = series(|i| 10_000.0 - 5.0 * i as f64, 250);
        assert_eq!(filter.detect_regime(&history, 2.0, 200), RegimeSignal::Neutral);
    }
}
