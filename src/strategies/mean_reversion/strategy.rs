//! Mean Reversion Strategy
//!
//! RSI mode: include if RSI < oversold, score = (oversold - RSI) / oversold
//! Bollinger mode: include if close < lower band, score = (lower - close) / middle

use crate::indicators::{bollinger_last, closes, latest, rsi, tail};
use crate::strategies::{
    allocate, score_candidates, signal_window, HistoryView, ScoredCandidate, Strategy,
    StrategyError, StrategyFamily,
};
use crate::{Allocation, PriceBar, Signal, Symbol};

use super::config::{MeanReversionConfig, ReversionMode};

pub struct MeanReversionStrategy {
    id: String,
    config: MeanReversionConfig,
}

impl MeanReversionStrategy {
    pub fn new(config: MeanReversionConfig) -> Result<Self, StrategyError> {
        let valid = match config.mode {
            ReversionMode::Rsi => {
                config.rsi_period > 0 && config.oversold > 0.0 && config.oversold < config.overbought
            }
            ReversionMode::Bollinger => config.bb_period > 1 && config.bb_std > 0.0,
        };
        if !valid || config.top_k == 0 {
            return Err(StrategyError::InvalidParams(format!(
                "mean_reversion parameters out of range: {:?}",
                config
            )));
        }
        Ok(Self {
            id: config.variant_id(),
            config,
        })
    }

    fn latest_rsi(&self, bars: &[PriceBar]) -> Option<f64> {
        let close = closes(tail(bars, self.config.rsi_period + 1));
        latest(&rsi(&close, self.config.rsi_period))
    }

    fn bands(&self, bars: &[PriceBar]) -> Option<(f64, f64, f64, f64)> {
        let close = closes(tail(bars, self.config.bb_period));
        let (upper, middle, lower) =
            bollinger_last(&close, self.config.bb_period, self.config.bb_std)?;
        Some((upper, middle, lower, *close.last()?))
    }

    fn oversold_score(&self, bars: &[PriceBar]) -> Option<f64> {
        match self.config.mode {
            ReversionMode::Rsi => {
                let value = self.latest_rsi(bars)?;
                (value < self.config.oversold)
                    .then(|| (self.config.oversold - value) / self.config.oversold)
            }
            ReversionMode::Bollinger => {
                let (_, middle, lower, close) = self.bands(bars)?;
                (close < lower && middle > 0.0).then(|| (lower - close) / middle)
            }
        }
    }
}

impl Strategy for MeanReversionStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn family(&self) -> StrategyFamily {
        StrategyFamily::MeanReversion
    }

    fn calculate_allocation(
        &self,
        candidates: &[Symbol],
        history: &HistoryView<'_>,
    ) -> Result<Allocation, StrategyError> {
        let scored = score_candidates(candidates, history, |symbol, bars| {
            self.oversold_score(bars)
                .map(|score| ScoredCandidate::new(symbol.clone(), score))
        });
        Ok(allocate(scored, self.config.top_k, self.config.sizing))
    }

    fn get_signal(&self, _symbol: &Symbol, history: &[PriceBar], index: usize) -> Signal {
        let window = signal_window(history, index);
        match self.config.mode {
            ReversionMode::Rsi => match self.latest_rsi(window) {
                Some(v) if v < self.config.oversold => Signal::Buy,
                Some(v) if v > self.config.overbought => Signal::Sell,
                _ => Signal::Hold,
            },
            ReversionMode::Bollinger => match self.bands(window) {
                Some((_, _, lower, close)) if close < lower => Signal::Buy,
                Some((upper, _, _, close)) if close > upper => Signal::Sell,
                _ => Signal::Hold,
            },
        }
    }
}
