//! Multi-Factor ML Strategy
//!
//! Ranks stocks by the forecaster's predicted forward return over technical
//! and fundamental features. Needs both a fundamentals provider and a
//! forecaster; stocks missing either input are skipped, never defaulted.

mod config;
mod strategy;

pub use config::MultiFactorMlConfig;
pub use strategy::MultiFactorMlStrategy;

use super::{parse_params, Strategy, StrategyDeps, StrategyError};
use anyhow::Result;

/// Create strategy from parameters (called by registry)
pub fn create(params: &serde_json::Value, deps: &StrategyDeps) -> Result<Box<dyn Strategy>> {
    let mut config: MultiFactorMlConfig = if params.is_null() {
        MultiFactorMlConfig::from_ml(&deps.ml)
    } else {
        parse_params(params).map_err(|e| anyhow::anyhow!("multi_factor_ml: {}", e))?
    };
    config.max_concurrency = config.max_concurrency.max(1);

    let missing = |dependency| StrategyError::MissingDependency {
        strategy: config.variant_id(),
        dependency,
    };
    let fundamentals = deps
        .fundamentals
        .clone()
        .ok_or_else(|| missing("a fundamentals provider"))?;
    let forecaster = deps
        .forecaster
        .clone()
        .ok_or_else(|| missing("a forecaster"))?;

    Ok(Box::new(MultiFactorMlStrategy::new(
        config,
        fundamentals,
        forecaster,
        deps.clock.clone(),
    )?))
}
