//! Volume Confirmation Strategy
//!
//! Price strength only counts when volume backs it, measured either by the
//! Volume Price Trend or by relative volume.

mod config;
mod strategy;

pub use config::{VolumeConfirmationConfig, VolumeMode};
pub use strategy::VolumeConfirmationStrategy;

use super::{parse_params, Strategy, StrategyDeps};
use anyhow::Result;

/// Create strategy from parameters (called by registry)
pub fn create(params: &serde_json::Value, _deps: &StrategyDeps) -> Result<Box<dyn Strategy>> {
    let config: VolumeConfirmationConfig = parse_params(params)
        .map_err(|e| anyhow::anyhow!("volume_confirmation: {}", e))?;
    Ok(Box::new(VolumeConfirmationStrategy::new(config)?))
}
