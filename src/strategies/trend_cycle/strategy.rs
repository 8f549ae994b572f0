//! Trend Cycle Strategy
//!
//! Inclusion: MACD histogram (line - signal) > 0
//! Score: histogram / close

use crate::indicators::{closes, latest, macd, tail};
use crate::strategies::{
    allocate, score_candidates, signal_window, HistoryView, ScoredCandidate, Strategy,
    StrategyError, StrategyFamily,
};
use crate::{Allocation, PriceBar, Signal, Symbol};

use super::config::TrendCycleConfig;

pub struct TrendCycleStrategy {
    id: String,
    config: TrendCycleConfig,
}

impl TrendCycleStrategy {
    pub fn new(config: TrendCycleConfig) -> Result<Self, StrategyError> {
        if config.fast == 0 || config.signal == 0 || config.fast >= config.slow || config.top_k == 0 {
            return Err(StrategyError::InvalidParams(format!(
                "trend_cycle needs 0 < fast < slow, signal > 0: {:?}",
                config
            )));
        }
        Ok(Self {
            id: config.variant_id(),
            config,
        })
    }

    fn histogram(&self, bars: &[PriceBar]) -> Option<(f64, f64)> {
        let close = closes(tail(bars, self.config.window_len()));
        let (line, signal) = macd(&close, self.config.fast, self.config.slow, self.config.signal);
        let hist = latest(&line)? - latest(&signal)?;
        Some((hist, *close.last()?))
    }
}

impl Strategy for TrendCycleStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn family(&self) -> StrategyFamily {
        StrategyFamily::TrendCycle
    }

    fn calculate_allocation(
        &self,
        candidates: &[Symbol],
        history: &HistoryView<'_>,
    ) -> Result<Allocation, StrategyError> {
        let scored = score_candidates(candidates, history, |symbol, bars| {
            let (hist, close) = self.histogram(bars)?;
            (hist > 0.0 && close > 0.0).then(|| ScoredCandidate::new(symbol.clone(), hist / close))
        });
        Ok(allocate(scored, self.config.top_k, self.config.sizing))
    }

    fn get_signal(&self, _symbol: &Symbol, history: &[PriceBar], index: usize) -> Signal {
        match self.histogram(signal_window(history, index)) {
            Some((hist, _)) if hist > 0.0 => Signal::Buy,
            Some((hist, _)) if hist < 0.0 => Signal::Sell,
            _ => Signal::Hold,
        }
    }
}
