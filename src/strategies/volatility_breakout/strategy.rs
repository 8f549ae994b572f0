//! Volatility Breakout Strategy
//!
//! Inclusion: last close > highest high of the previous `lookback` bars
//! Score: (close - channel high) / ATR

use crate::risk::RiskEngine;
use crate::strategies::{
    allocate, score_candidates, signal_window, HistoryView, ScoredCandidate, Strategy,
    StrategyError, StrategyFamily,
};
use crate::{Allocation, PriceBar, Signal, Symbol};

use super::config::VolatilityBreakoutConfig;

pub struct VolatilityBreakoutStrategy {
    id: String,
    config: VolatilityBreakoutConfig,
    risk: RiskEngine,
}

impl VolatilityBreakoutStrategy {
    pub fn new(config: VolatilityBreakoutConfig) -> Result<Self, StrategyError> {
        if config.lookback == 0 || config.atr_period == 0 || config.top_k == 0 {
            return Err(StrategyError::InvalidParams(
                "volatility_breakout needs lookback, atr_period and top_k > 0".to_string(),
            ));
        }
        Ok(Self {
            id: config.variant_id(),
            config,
            risk: RiskEngine::default(),
        })
    }

    /// Highest high and lowest low of the `lookback` bars before the last one
    fn channel(&self, bars: &[PriceBar]) -> Option<(f64, f64)> {
        if bars.len() < self.config.lookback + 1 {
            return None;
        }
        let end = bars.len() - 1;
        let prior = &bars[end - self.config.lookback..end];
        let high = prior.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = prior.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        Some((high, low))
    }

    fn breakout_strength(&self, bars: &[PriceBar]) -> Option<f64> {
        let (high, _) = self.channel(bars)?;
        let close = bars.last()?.close;
        if close <= high {
            return None;
        }
        let atr = self.risk.calculate_atr(bars, self.config.atr_period);
        if atr <= 0.0 {
            return None;
        }
        Some((close - high) / atr)
    }
}

impl Strategy for VolatilityBreakoutStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn family(&self) -> StrategyFamily {
        StrategyFamily::VolatilityBreakout
    }

    fn calculate_allocation(
        &self,
        candidates: &[Symbol],
        history: &HistoryView<'_>,
    ) -> Result<Allocation, StrategyError> {
        let scored = score_candidates(candidates, history, |symbol, bars| {
            self.breakout_strength(bars)
                .map(|score| ScoredCandidate::new(symbol.clone(), score))
        });
        Ok(allocate(scored, self.config.top_k, self.config.sizing))
    }

    fn get_signal(&self, _symbol: &Symbol, history: &[PriceBar], index: usize) -> Signal {
        let window = signal_window(history, index);
        let close = match window.last() {
            Some(bar) => bar.close,
            None => return Signal::Hold,
        };
        match self.channel(window) {
            Some((high, _)) if close > high => Signal::Buy,
            Some((_, low)) if close < low => Signal::Sell,
            _ => Signal::Hold,
        }
    }
}
