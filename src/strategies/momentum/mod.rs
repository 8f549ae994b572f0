//! Momentum Strategy
//!
//! Holds stocks trading above their own moving average, weighted by how far
//! above the trend line they are.

mod config;
mod strategy;

pub use config::MomentumConfig;
pub use strategy::MomentumStrategy;

use super::{parse_params, Strategy, StrategyDeps};
use anyhow::Result;

/// Create strategy from parameters (called by registry)
pub fn create(params: &serde_json::Value, _deps: &StrategyDeps) -> Result<Box<dyn Strategy>> {
    let config: MomentumConfig = parse_params(params)
        .map_err(|e| anyhow::anyhow!("momentum: {}", e))?;
    Ok(Box::new(MomentumStrategy::new(config)?))
}
