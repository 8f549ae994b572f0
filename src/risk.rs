//! Risk management framework
//!
//! Volatility-adaptive trailing stops, turbulence detection, sector
//! concentration caps and a confidence-weighted position sizer.
//!
//! All values are currency-agnostic: equity and prices only need to share a
//! denomination.

use std::collections::BTreeMap;

use crate::config::RiskConfig;
use crate::indicators::true_range;
use crate::{Allocation, PriceBar, SectorMap, Signal, Symbol};

/// Candidate trade handed to the position sizer
#[derive(Debug, Clone)]
pub struct TradeSignal {
    pub symbol: Symbol,
    pub signal: Signal,
    /// Model or strategy conviction, 1.0 = neutral
    pub confidence: f64,
    pub price: f64,
}

/// Sized buy produced by [`RiskEngine::apply_risk_management`]
#[derive(Debug, Clone, PartialEq)]
pub struct SizedPosition {
    pub symbol: Symbol,
    pub amount: f64,
    pub quantity: f64,
}

/// Stop-loss state for one holding on one day
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopAssessment {
    pub atr: f64,
    pub is_volatile: bool,
    pub stop_price: f64,
}

/// Risk engine configured from [`RiskConfig`]
#[derive(Debug, Clone)]
pub struct RiskEngine {
    config: RiskConfig,
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Average true range over the trailing `period` bars of `history`.
    ///
    /// Needs `period + 1` bars so every range has a previous close; returns 0.0
    /// otherwise.
    pub fn calculate_atr(&self, history: &[PriceBar], period: usize) -> f64 {
        if period == 0 || history.len() < period + 1 {
            return 0.0;
        }
        let window = &history[history.len() - (period + 1)..];
        let ranges = true_range(window);
        ranges[1..].iter().sum::<f64>() / period as f64
    }

    /// True if enough of the recent daily closes moved sharply either way
    pub fn is_volatile(&self, history: &[PriceBar]) -> bool {
        let lookback = self.config.volatile_lookback;
        if history.len() < 2 || lookback == 0 {
            return false;
        }
        let window = &history[history.len().saturating_sub(lookback + 1)..];
        let big_moves = window
            .windows(2)
            .filter(|w| w[0].close > 0.0)
            .filter(|w| ((w[1].close - w[0].close) / w[0].close).abs() > self.config.volatile_move_pct)
            .count();
        big_moves >= self.config.volatile_day_count
    }

    /// Trailing stop below `peak`, never looser than the hard floor
    pub fn calculate_atr_stop_price(
        &self,
        peak: f64,
        atr: f64,
        multiplier: f64,
        is_volatile: bool,
    ) -> f64 {
        let floor = peak * (1.0 - self.config.max_trailing_loss_pct);
        if atr <= 0.0 || !atr.is_finite() {
            return floor;
        }
        let effective = if is_volatile {
            self.config.volatile_stop_multiplier
        } else {
            multiplier
        };
        (peak - atr * effective).max(floor).min(peak)
    }

    /// ATR, turbulence and stop price for a holding from its observable window
    pub fn assess_stop(&self, history: &[PriceBar], peak: f64) -> StopAssessment {
        let atr = self.calculate_atr(history, self.config.atr_period);
        let is_volatile = self.is_volatile(history);
        let stop_price =
            self.calculate_atr_stop_price(peak, atr, self.config.stop_atr_multiplier, is_volatile);
        StopAssessment {
            atr,
            is_volatile,
            stop_price,
        }
    }

    /// Confidence-weighted sizing of buy signals under per-stock and total caps.
    ///
    /// Allocation stops at the first signal that would push total exposure over
    /// the cap; later signals are not considered.
    ///
    /// This sizes per-symbol `get_signal` output for order-driven callers.
    /// The allocation backtest never calls it: there, weights come from
    /// `calculate_allocation` and exposure is bounded by the sector cap.
    pub fn apply_risk_management(
        &self,
        signals: &[TradeSignal],
        total_equity: f64,
        is_bear_market: bool,
    ) -> Vec<SizedPosition> {
        let (position_cap, exposure_cap) = if is_bear_market {
            (self.config.bear_max_position_pct, self.config.bear_max_exposure_pct)
        } else {
            (self.config.max_position_pct, self.config.max_exposure_pct)
        };
        let max_exposure = total_equity * exposure_cap;
        let base_amount = total_equity * position_cap;

        let mut sized = Vec::new();
        let mut exposure = 0.0;

        for signal in signals.iter().filter(|s| s.signal == Signal::Buy) {
            if signal.price <= 0.0 || !signal.price.is_finite() {
                continue;
            }
            let confidence = if signal.confidence.is_finite() {
                signal.confidence.clamp(0.5, 1.5)
            } else {
                1.0
            };
            let amount = base_amount * confidence;
            if exposure + amount > max_exposure {
                tracing::debug!(
                    symbol = %signal.symbol,
                    exposure,
                    max_exposure,
                    "Exposure cap reached"
                );
                break;
            }
            exposure += amount;
            sized.push(SizedPosition {
                symbol: signal.symbol.clone(),
                amount,
                quantity: amount / signal.price,
            });
        }

        sized
    }

    /// Scale each sector down proportionally so its total weight is at most `cap`
    pub fn cap_sector_exposure(
        &self,
        weights: &Allocation,
        sectors: &SectorMap,
        cap: f64,
    ) -> Allocation {
        let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
        for (symbol, weight) in weights {
            *totals.entry(sectors.sector_of(symbol)).or_default() += weight;
        }

        weights
            .iter()
            .map(|(symbol, &weight)| {
                let total = totals[sectors.sector_of(symbol)];
                let scaled = if total > cap && total > 0.0 {
                    weight * cap / total
                } else {
                    weight
                };
                (symbol.clone(), scaled)
            })
            .collect()
    }
}
