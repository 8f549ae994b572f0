//! Volume Confirmation Strategy
//!
//! VPT mode: include if VPT > SMA(VPT) and close > SMA(close);
//!   score = close / SMA - 1
//! RelativeVolume mode: include if close > previous close and
//!   volume / SMA(volume) >= volume_multiple; score = relative volume

use crate::indicators::{closes, sma_last, tail, volume_price_trend, volumes};
use crate::strategies::{
    allocate, score_candidates, signal_window, HistoryView, ScoredCandidate, Strategy,
    StrategyError, StrategyFamily,
};
use crate::{Allocation, PriceBar, Signal, Symbol};

use super::config::{VolumeConfirmationConfig, VolumeMode};

pub struct VolumeConfirmationStrategy {
    id: String,
    config: VolumeConfirmationConfig,
}

impl VolumeConfirmationStrategy {
    pub fn new(config: VolumeConfirmationConfig) -> Result<Self, StrategyError> {
        if config.period < 2 || config.top_k == 0 || config.volume_multiple <= 0.0 {
            return Err(StrategyError::InvalidParams(
                "volume_confirmation needs period >= 2, top_k > 0, volume_multiple > 0".to_string(),
            ));
        }
        Ok(Self {
            id: config.variant_id(),
            config,
        })
    }

    /// Signed strength: positive when volume confirms an advance, negative
    /// when it confirms a decline
    fn confirmation(&self, bars: &[PriceBar]) -> Option<f64> {
        let period = self.config.period;
        match self.config.mode {
            VolumeMode::Vpt => {
                // VPT of the window plus one bar so the first change is counted
                let window = tail(bars, period + 1);
                if window.len() < period + 1 {
                    return None;
                }
                let vpt = volume_price_trend(window);
                let vpt_avg = sma_last(&vpt, period)?;
                let close = closes(window);
                let sma = sma_last(&close, period)?;
                let last = *close.last()?;
                let last_vpt = *vpt.last()?;
                if sma <= 0.0 {
                    return None;
                }
                let confirmed = (last > sma && last_vpt > vpt_avg) || (last < sma && last_vpt < vpt_avg);
                confirmed.then(|| last / sma - 1.0)
            }
            VolumeMode::RelativeVolume => {
                let window = tail(bars, period);
                if window.len() < period {
                    return None;
                }
                let avg_volume = sma_last(&volumes(window), period)?;
                let last = window.last()?;
                let prev = &window[window.len() - 2];
                if avg_volume <= 0.0 {
                    return None;
                }
                let relative = last.volume / avg_volume;
                if relative < self.config.volume_multiple {
                    return None;
                }
                if last.close > prev.close {
                    Some(relative)
                } else if last.close < prev.close {
                    Some(-relative)
                } else {
                    None
                }
            }
        }
    }
}

impl Strategy for VolumeConfirmationStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn family(&self) -> StrategyFamily {
        StrategyFamily::VolumeConfirmation
    }

    fn calculate_allocation(
        &self,
        candidates: &[Symbol],
        history: &HistoryView<'_>,
    ) -> Result<Allocation, StrategyError> {
        let scored = score_candidates(candidates, history, |symbol, bars| {
            self.confirmation(bars)
                .filter(|score| *score > 0.0)
                .map(|score| ScoredCandidate::new(symbol.clone(), score))
        });
        Ok(allocate(scored, self.config.top_k, self.config.sizing))
    }

    fn get_signal(&self, _symbol: &Symbol, history: &[PriceBar], index: usize) -> Signal {
        match self.confirmation(signal_window(history, index)) {
            Some(score) if score > 0.0 => Signal::Buy,
            Some(score) if score < 0.0 => Signal::Sell,
            _ => Signal::Hold,
        }
    }
}
