//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files. Every policy
//! constant of the engine lives here so it can be tuned without a rebuild.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub trading: TradingConfig,
    pub execution: ExecutionConfig,
    pub risk: RiskConfig,
    pub regime: RegimeConfig,
    pub backtest: BacktestConfig,
    pub tournament: TournamentConfig,
    pub ml: MlConfig,
    pub quality: QualityConfig,
    /// Strategy used by the single-run `backtest` command.
    /// Must carry a `name` key matching a registered strategy family.
    pub strategy: serde_json::Value,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Pull operator-supplied macro inputs from the environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(inflation) = std::env::var("CPI_INFLATION_PCT") {
            self.regime.inflation_pct = inflation
                .trim()
                .parse()
                .context("CPI_INFLATION_PCT must be a number")?;
        }
        Ok(())
    }

    /// Strategy family name from the strategy section
    pub fn strategy_name(&self) -> Option<&str> {
        self.strategy.get("name").and_then(|v| v.as_str())
    }
}

/// Capital and goal configuration
///
/// The engine is currency-agnostic: `initial_cash` and price data only need
/// to share a denomination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub initial_cash: f64,
    /// Return (in percent) a strategy must reach to earn the tournament bonus
    pub target_return_pct: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        TradingConfig {
            initial_cash: 100_000.0,
            target_return_pct: 15.0,
        }
    }
}

/// Trade execution costs and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub commission_pct: f64,
    /// Trades smaller than this (in currency) are not worth the fees
    pub min_trade_value: f64,
    /// Allocation changes below this fraction of the portfolio are ignored
    pub min_alloc_change_pct: f64,
    /// Slippage used for deterministic (tournament) runs
    pub fixed_slippage_pct: f64,
    pub min_slippage_pct: f64,
    pub max_slippage_pct: f64,
    /// Seed for stochastic slippage; `None` draws from entropy
    pub slippage_seed: Option<u64>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_pct: 0.001,
            min_trade_value: 500.0,
            min_alloc_change_pct: 0.005,
            fixed_slippage_pct: 0.002,
            min_slippage_pct: 0.001,
            max_slippage_pct: 0.003,
            slippage_seed: None,
        }
    }
}

/// Stop-loss, concentration and sizing limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub atr_period: usize,
    pub stop_atr_multiplier: f64,
    /// Tighter multiplier used when the stock is turbulent
    pub volatile_stop_multiplier: f64,
    /// Hard floor of the trailing stop as a fraction below the peak
    pub max_trailing_loss_pct: f64,
    /// Daily close move that counts as turbulent
    pub volatile_move_pct: f64,
    pub volatile_day_count: usize,
    pub volatile_lookback: usize,
    /// Maximum aggregate weight of any one sector
    pub sector_cap: f64,
    /// Stocks quoted at or below this price are never bought
    pub min_price: f64,
    pub max_position_pct: f64,
    pub bear_max_position_pct: f64,
    pub max_exposure_pct: f64,
    pub bear_max_exposure_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            atr_period: 14,
            stop_atr_multiplier: 2.0,
            volatile_stop_multiplier: 1.5,
            max_trailing_loss_pct: 0.07,
            volatile_move_pct: 0.02,
            volatile_day_count: 2,
            volatile_lookback: 5,
            sector_cap: 0.30,
            min_price: 50.0,
            max_position_pct: 0.10,
            bear_max_position_pct: 0.05,
            max_exposure_pct: 1.0,
            bear_max_exposure_pct: 0.5,
        }
    }
}

/// Macro regime classification thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub sma_window: usize,
    /// Annualized benchmark volatility above which the market is turbulent
    pub high_volatility: f64,
    pub high_inflation_pct: f64,
    /// Latest CPI inflation, supplied by the operator
    pub inflation_pct: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        RegimeConfig {
            sma_window: 200,
            high_volatility: 0.20,
            high_inflation_pct: 4.0,
            inflation_pct: 0.0,
        }
    }
}

/// Backtest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// First simulated day index when a benchmark drives the regime filter
    pub warmup_with_benchmark: usize,
    pub warmup_without_benchmark: usize,
    pub data_dir: String,
    pub benchmark_symbol: Option<String>,
    pub sector_file: Option<String>,
    pub fundamentals_file: Option<String>,
    pub model_file: Option<String>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            warmup_with_benchmark: 200,
            warmup_without_benchmark: 20,
            data_dir: "data".to_string(),
            benchmark_symbol: Some("NIFTY50".to_string()),
            sector_file: None,
            fundamentals_file: None,
            model_file: None,
        }
    }
}

/// Walk-forward tournament policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentConfig {
    /// Fraction of the calendar used as the training prefix
    pub train_ratio: f64,
    /// Fee drag per trade, in percentage points of alpha
    pub fee_per_trade_pct: f64,
    pub sharpe_cap: f64,
    pub sharpe_weight: f64,
    pub target_bonus: f64,
    /// Challenger must beat `ml_alpha * multiplier` when ML alpha is positive
    pub sticky_alpha_multiplier: f64,
    /// Challenger must beat `ml_alpha + margin` when ML alpha is non-positive
    pub sticky_alpha_margin: f64,
    pub max_workers: usize,
    /// Strategy currently controlling the live portfolio
    pub active_strategy: Option<String>,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        TournamentConfig {
            train_ratio: 0.8,
            fee_per_trade_pct: 0.4,
            sharpe_cap: 3.0,
            sharpe_weight: 10.0,
            target_bonus: 20.0,
            sticky_alpha_multiplier: 1.5,
            sticky_alpha_margin: 2.0,
            max_workers: 4,
            active_strategy: None,
        }
    }
}

/// Multi-factor ML strategy settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MlConfig {
    pub top_k: usize,
    /// Predicted return must exceed the round-trip slippage + commission drag
    pub breakeven_return: f64,
    pub max_concurrency: usize,
    pub fundamentals_ttl_secs: i64,
}

impl Default for MlConfig {
    fn default() -> Self {
        MlConfig {
            top_k: 10,
            breakeven_return: 0.004,
            max_concurrency: 8,
            fundamentals_ttl_secs: 86_400,
        }
    }
}

/// Fundamentals gate applied to the universe before a tournament
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub min_return_on_equity: f64,
    pub max_debt_to_equity: f64,
    pub min_market_cap: f64,
    pub max_trailing_pe: f64,
    pub require_positive_book_value: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        QualityConfig {
            min_return_on_equity: 0.10,
            max_debt_to_equity: 2.0,
            min_market_cap: 0.0,
            max_trailing_pe: 80.0,
            require_positive_book_value: true,
        }
    }
}
