//! Mean Reversion Strategy
//!
//! Buys oversold stocks, either by RSI or by a close under the lower
//! Bollinger band.

mod config;
mod strategy;

pub use config::{MeanReversionConfig, ReversionMode};
pub use strategy::MeanReversionStrategy;

use super::{parse_params, Strategy, StrategyDeps};
use anyhow::Result;

/// Create strategy from parameters (called by registry)
pub fn create(params: &serde_json::Value, _deps: &StrategyDeps) -> Result<Box<dyn Strategy>> {
    let config: MeanReversionConfig = parse_params(params)
        .map_err(|e| anyhow::anyhow!("mean_reversion: {}", e))?;
    Ok(Box::new(MeanReversionStrategy::new(config)?))
}
