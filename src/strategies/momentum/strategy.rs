//! Momentum Strategy
//!
//! Inclusion: close > SMA(sma_period)
//! Score: close / SMA - 1 (distance above trend)

use crate::indicators::{closes, sma_last, tail};
use crate::strategies::{
    allocate, score_candidates, signal_window, HistoryView, ScoredCandidate, Strategy,
    StrategyError, StrategyFamily,
};
use crate::{Allocation, PriceBar, Signal, Symbol};

use super::config::MomentumConfig;

pub struct MomentumStrategy {
    id: String,
    config: MomentumConfig,
}

impl MomentumStrategy {
    pub fn new(config: MomentumConfig) -> Result<Self, StrategyError> {
        if config.sma_period == 0 || config.top_k == 0 {
            return Err(StrategyError::InvalidParams(
                "momentum needs sma_period > 0 and top_k > 0".to_string(),
            ));
        }
        Ok(Self {
            id: config.variant_id(),
            config,
        })
    }

    /// Distance of the last close above its SMA, `None` below or on the line
    fn trend_strength(&self, bars: &[PriceBar]) -> Option<f64> {
        let close = closes(tail(bars, self.config.sma_period));
        let sma = sma_last(&close, self.config.sma_period)?;
        let last = *close.last()?;
        if sma <= 0.0 || last <= sma {
            return None;
        }
        Some(last / sma - 1.0)
    }
}

impl Strategy for MomentumStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn family(&self) -> StrategyFamily {
        StrategyFamily::Momentum
    }

    fn calculate_allocation(
        &self,
        candidates: &[Symbol],
        history: &HistoryView<'_>,
    ) -> Result<Allocation, StrategyError> {
        let scored = score_candidates(candidates, history, |symbol, bars| {
            self.trend_strength(bars)
                .map(|score| ScoredCandidate::new(symbol.clone(), score))
        });
        Ok(allocate(scored, self.config.top_k, self.config.sizing))
    }

    fn get_signal(&self, _symbol: &Symbol, history: &[PriceBar], index: usize) -> Signal {
        let window = signal_window(history, index);
        let close = closes(tail(window, self.config.sma_period));
        match (sma_last(&close, self.config.sma_period), close.last()) {
            (Some(sma), Some(&last)) if last > sma => Signal::Buy,
            (Some(sma), Some(&last)) if last < sma => Signal::Sell,
            _ => Signal::Hold,
        }
    }
}
