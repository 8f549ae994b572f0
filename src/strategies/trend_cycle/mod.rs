//! Trend Cycle Strategy
//!
//! MACD histogram above zero marks the up-leg of the cycle.

mod config;
mod strategy;

pub use config::TrendCycleConfig;
pub use strategy::TrendCycleStrategy;

use super::{parse_params, Strategy, StrategyDeps};
use anyhow::Result;

/// Create strategy from parameters (called by registry)
pub fn create(params: &serde_json::Value, _deps: &StrategyDeps) -> Result<Box<dyn Strategy>> {
    let config: TrendCycleConfig = parse_params(params)
        .map_err(|e| anyhow::anyhow!("trend_cycle: {}", e))?;
    Ok(Box::new(TrendCycleStrategy::new(config)?))
}
