//! Core data types used across the simulation engine

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Holdings below this quantity are treated as closed
pub const QUANTITY_EPSILON: f64 = 0.001;

/// Sector bucket for symbols missing from the sector map
pub const DEFAULT_SECTOR: &str = "OTHER";

/// Validation errors for price bar data
#[derive(Debug, Error)]
pub enum PriceBarValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// Daily OHLCV bar for one symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBar {
    pub symbol: Symbol,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// Create a new bar with validation
    pub fn new(
        symbol: Symbol,
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, PriceBarValidationError> {
        let bar = Self::new_unchecked(symbol, date, open, high, low, close, volume);
        bar.validate()?;
        Ok(bar)
    }

    /// Create a bar without validation (for trusted sources or synthetic data)
    pub fn new_unchecked(
        symbol: Symbol,
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            symbol,
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Validate the bar data
    pub fn validate(&self) -> Result<(), PriceBarValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(PriceBarValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(PriceBarValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(PriceBarValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(PriceBarValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(PriceBarValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Ticker symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into every bar, holding, allocation and trade intent, so
/// a clone must not allocate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// Single-symbol diagnostic signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Macro market regime derived from the benchmark index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegimeSignal {
    Bullish,
    Bearish,
    Neutral,
}

/// Price history per symbol, ascending by date with unique dates
pub type MarketData = BTreeMap<Symbol, Vec<PriceBar>>;

/// Target portfolio weights by symbol
pub type Allocation = BTreeMap<Symbol, f64>;

/// Open position in one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub symbol: Symbol,
    pub quantity: f64,
    /// Volume-weighted cost basis
    pub average_price: f64,
    /// Peak price since entry, drives the trailing stop
    pub highest_price: f64,
}

impl Holding {
    pub fn new(symbol: Symbol, quantity: f64, price: f64) -> Self {
        Self {
            symbol,
            quantity,
            average_price: price,
            highest_price: price,
        }
    }

    /// Add to the position, recomputing the weighted average cost
    pub fn add(&mut self, quantity: f64, price: f64) {
        let total = self.quantity + quantity;
        if total > 0.0 {
            self.average_price = (self.quantity * self.average_price + quantity * price) / total;
        }
        self.quantity = total;
        self.highest_price = self.highest_price.max(price);
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn is_closed(&self) -> bool {
        self.quantity < QUANTITY_EPSILON
    }
}

/// One executed rebalance event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    pub date: Option<NaiveDate>,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: f64,
    pub quoted_price: f64,
    /// Fill price after slippage
    pub executed_price: f64,
    pub gross_amount: f64,
    pub commission: f64,
    /// Cash received (sell) or spent (buy), commission included
    pub net_amount: f64,
    pub reason: String,
}

/// Sector tag per symbol; unknown symbols fall into [`DEFAULT_SECTOR`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectorMap(HashMap<Symbol, String>);

impl SectorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: Symbol, sector: impl Into<String>) {
        self.0.insert(symbol, sector.into());
    }

    pub fn sector_of(&self, symbol: &Symbol) -> &str {
        self.0
            .get(symbol)
            .map(String::as_str)
            .unwrap_or(DEFAULT_SECTOR)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Symbol, String)> for SectorMap {
    fn from_iter<I: IntoIterator<Item = (Symbol, String)>>(iter: I) -> Self {
        SectorMap(iter.into_iter().collect())
    }
}

/// Outcome of one backtest run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_id: String,
    pub return_pct: f64,
    /// Fraction of trades that were winning sells, in [0, 1]
    pub win_rate: f64,
    pub final_value: f64,
    pub benchmark_return: f64,
    /// `return_pct - benchmark_return`
    pub alpha: f64,
    /// Peak-to-trough decline in percent
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub total_trades: usize,
}

impl BacktestResult {
    /// Result for a run that never got past warm-up
    pub fn neutral(strategy_id: impl Into<String>, initial_cash: f64) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            final_value: initial_cash,
            ..Default::default()
        }
    }
}
