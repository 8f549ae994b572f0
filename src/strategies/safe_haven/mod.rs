//! Safe Haven Strategy
//!
//! Defensive basket: the least volatile stocks still in an uptrend,
//! inverse-volatility weighted.

mod config;
mod strategy;

pub use config::SafeHavenConfig;
pub use strategy::SafeHavenStrategy;

use super::{parse_params, Strategy, StrategyDeps};
use anyhow::Result;

/// Create strategy from parameters (called by registry)
pub fn create(params: &serde_json::Value, _deps: &StrategyDeps) -> Result<Box<dyn Strategy>> {
    let config: SafeHavenConfig = parse_params(params)
        .map_err(|e| anyhow::anyhow!("safe_haven: {}", e))?;
    Ok(Box::new(SafeHavenStrategy::new(config)?))
}
