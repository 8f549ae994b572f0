//! Equity Allocation Strategies
//!
//! A deterministic simulation engine for daily equity allocation strategies:
//! look-ahead-free backtesting with regime gating, trailing stops, sector caps
//! and realistic execution costs, plus a walk-forward tournament that ranks
//! strategy variants by fee-adjusted alpha.

pub mod backtest;
pub mod config;
pub mod data;
pub mod forecast;
pub mod fundamentals;
pub mod indicators;
pub mod rebalancer;
pub mod regime;
pub mod risk;
pub mod slippage;
pub mod strategies;
pub mod tournament;
pub mod types;

pub use config::Config;
pub use strategies::Strategy;
pub use types::*;
