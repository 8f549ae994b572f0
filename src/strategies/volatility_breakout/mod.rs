//! Volatility Breakout Strategy
//!
//! Entry on a close above the prior N-day high (Donchian channel), ranked by
//! breakout size in ATR units.

mod config;
mod strategy;

pub use config::VolatilityBreakoutConfig;
pub use strategy::VolatilityBreakoutStrategy;

use super::{parse_params, Strategy, StrategyDeps};
use anyhow::Result;

/// Create strategy from parameters (called by registry)
pub fn create(params: &serde_json::Value, _deps: &StrategyDeps) -> Result<Box<dyn Strategy>> {
    let config: VolatilityBreakoutConfig = parse_params(params)
        .map_err(|e| anyhow::anyhow!("volatility_breakout: {}", e))?;
    Ok(Box::new(VolatilityBreakoutStrategy::new(config)?))
}
