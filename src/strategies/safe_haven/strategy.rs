//! Safe Haven Strategy
//!
//! Inclusion: close > SMA(trend_period) (when enabled) and a defined volatility
//! Ranking: lowest annualized volatility first
//! Weights: 1 / volatility

use crate::indicators::{annualized_volatility, closes, sma_last, tail};
use crate::strategies::{
    allocate, score_candidates, signal_window, HistoryView, ScoredCandidate, Sizing, Strategy,
    StrategyError, StrategyFamily,
};
use crate::{Allocation, PriceBar, Signal, Symbol};

use super::config::SafeHavenConfig;

pub struct SafeHavenStrategy {
    id: String,
    config: SafeHavenConfig,
}

impl SafeHavenStrategy {
    pub fn new(config: SafeHavenConfig) -> Result<Self, StrategyError> {
        if config.volatility_lookback < 3 || config.top_k == 0 {
            return Err(StrategyError::InvalidParams(
                "safe_haven needs volatility_lookback >= 3 and top_k > 0".to_string(),
            ));
        }
        Ok(Self {
            id: config.variant_id(),
            config,
        })
    }

    fn in_uptrend(&self, close: &[f64]) -> Option<bool> {
        if self.config.trend_period == 0 {
            return Some(true);
        }
        let sma = sma_last(close, self.config.trend_period)?;
        Some(*close.last()? > sma)
    }

    fn volatility(&self, bars: &[PriceBar]) -> Option<f64> {
        let window = tail(bars, self.config.volatility_lookback + 1);
        if window.len() < self.config.volatility_lookback + 1 {
            return None;
        }
        annualized_volatility(&closes(window)).filter(|v| *v > 0.0)
    }

    fn candidate(&self, symbol: &Symbol, bars: &[PriceBar]) -> Option<ScoredCandidate> {
        let close = closes(tail(bars, self.config.trend_period.max(1)));
        if !self.in_uptrend(&close)? {
            return None;
        }
        let volatility = self.volatility(bars)?;
        Some(ScoredCandidate {
            symbol: symbol.clone(),
            score: -volatility,
            volatility,
        })
    }
}

impl Strategy for SafeHavenStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn family(&self) -> StrategyFamily {
        StrategyFamily::SafeHaven
    }

    fn calculate_allocation(
        &self,
        candidates: &[Symbol],
        history: &HistoryView<'_>,
    ) -> Result<Allocation, StrategyError> {
        let scored = score_candidates(candidates, history, |symbol, bars| {
            self.candidate(symbol, bars)
        });
        Ok(allocate(scored, self.config.top_k, Sizing::InverseVolatility))
    }

    fn get_signal(&self, _symbol: &Symbol, history: &[PriceBar], index: usize) -> Signal {
        let window = signal_window(history, index);
        let close = closes(tail(window, self.config.trend_period.max(1)));
        match self.in_uptrend(&close) {
            Some(true) if self.volatility(window).is_some() => Signal::Buy,
            Some(false) => Signal::Sell,
            _ => Signal::Hold,
        }
    }
}
