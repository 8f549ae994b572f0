//! Allocation Strategies Module
//!
//! Strategies turn a point-in-time view of history into target portfolio
//! weights:
//! - `Strategy` trait every family implements
//! - `HistoryView`, the causality boundary (a strategy never sees a bar past
//!   its symbol's cursor)
//! - shared top-K selection and weighting
//! - a registry keyed by family name, and the tournament roster

pub mod cash;
pub mod mean_reversion;
pub mod momentum;
pub mod multi_factor_ml;
pub mod roster;
pub mod safe_haven;
pub mod trend_cycle;
pub mod volatility_breakout;
pub mod volume_confirmation;

use anyhow::Result;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock, RwLock};
use thiserror::Error;

use crate::config::MlConfig;
use crate::forecast::Forecaster;
use crate::fundamentals::{Clock, FundamentalsProvider, SystemClock};
use crate::{Allocation, MarketData, PriceBar, Signal, Symbol};

pub use roster::default_roster;

// =============================================================================
// Strategy Trait
// =============================================================================

/// Strategy family, used for registry lookup and tournament policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyFamily {
    Momentum,
    MeanReversion,
    VolatilityBreakout,
    VolumeConfirmation,
    TrendCycle,
    SafeHaven,
    MultiFactorMl,
    Cash,
}

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("strategy {strategy} requires {dependency}")]
    MissingDependency {
        strategy: String,
        dependency: &'static str,
    },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("worker pool unavailable: {0}")]
    WorkerPool(String),

    #[error("strategy {strategy} failed: {reason}")]
    Failed { strategy: String, reason: String },
}

/// Allocation strategy contract.
///
/// Implementations are shared across tournament workers, so any scratch
/// state must live inside a single call.
pub trait Strategy: Send + Sync {
    /// Variant identifier, unique within a roster
    fn id(&self) -> &str;

    fn family(&self) -> StrategyFamily;

    /// Target weights for the day, computed only from `history`.
    /// An empty map means all cash.
    fn calculate_allocation(
        &self,
        candidates: &[Symbol],
        history: &HistoryView<'_>,
    ) -> Result<Allocation, StrategyError>;

    /// Diagnostic signal for one symbol using bars up to and including `index`
    fn get_signal(&self, symbol: &Symbol, history: &[PriceBar], index: usize) -> Signal;

    /// Called once before a backtest's first day. Strategies holding caches
    /// drop them here so nothing carries over between runs.
    fn begin_run(&self) {}
}

// =============================================================================
// History View
// =============================================================================

/// Number of visible bars per symbol
pub type Cursors = BTreeMap<Symbol, usize>;

/// Cursors exposing every bar (for diagnostics and tests)
pub fn cursors_at_end(data: &MarketData) -> Cursors {
    data.iter()
        .map(|(symbol, bars)| (symbol.clone(), bars.len()))
        .collect()
}

/// Read-only window over the shared price history.
///
/// Each symbol's window is `bars[..cursor]`; the backtester sets cursors so
/// that only bars strictly before the trading day are visible.
#[derive(Clone, Copy)]
pub struct HistoryView<'a> {
    data: &'a MarketData,
    cursors: &'a Cursors,
}

impl<'a> HistoryView<'a> {
    pub fn new(data: &'a MarketData, cursors: &'a Cursors) -> Self {
        Self { data, cursors }
    }

    pub fn cursor(&self, symbol: &Symbol) -> usize {
        self.cursors.get(symbol).copied().unwrap_or(0)
    }

    /// Visible bars of `symbol`, empty if unknown
    pub fn window(&self, symbol: &Symbol) -> &'a [PriceBar] {
        match self.data.get(symbol) {
            Some(bars) => &bars[..self.cursor(symbol).min(bars.len())],
            None => &[],
        }
    }
}

/// Bars up to and including `index`, clamped to the series
pub(crate) fn signal_window(history: &[PriceBar], index: usize) -> &[PriceBar] {
    if history.is_empty() {
        return history;
    }
    &history[..=index.min(history.len() - 1)]
}

// =============================================================================
// Selection + Weighting
// =============================================================================

/// How selected candidates are weighted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sizing {
    /// Weight proportional to score (signal-proportional sizing)
    Proportional,
    Equal,
    /// Weight proportional to 1 / volatility
    InverseVolatility,
}

impl Sizing {
    pub fn label(&self) -> &'static str {
        match self {
            Sizing::Proportional => "prop",
            Sizing::Equal => "equal",
            Sizing::InverseVolatility => "invvol",
        }
    }
}

/// Candidate that passed a strategy's inclusion threshold
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub symbol: Symbol,
    pub score: f64,
    /// Annualized volatility, only needed for inverse-volatility sizing
    pub volatility: f64,
}

impl ScoredCandidate {
    pub fn new(symbol: Symbol, score: f64) -> Self {
        Self {
            symbol,
            score,
            volatility: 0.0,
        }
    }
}

/// Sort by score (descending, ties by symbol), keep the top `top_k`
pub fn select_top(mut scored: Vec<ScoredCandidate>, top_k: usize) -> Vec<ScoredCandidate> {
    scored.retain(|c| c.score.is_finite());
    scored.sort_by(|a, b| {
        OrderedFloat(b.score)
            .cmp(&OrderedFloat(a.score))
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    scored.truncate(top_k);
    scored
}

/// Select the top `top_k` candidates and normalize their weights to sum to 1
pub fn allocate(scored: Vec<ScoredCandidate>, top_k: usize, sizing: Sizing) -> Allocation {
    let selected = select_top(scored, top_k);
    if selected.is_empty() {
        return Allocation::new();
    }

    let raw: Vec<f64> = match sizing {
        Sizing::Proportional => selected.iter().map(|c| c.score.max(0.0)).collect(),
        Sizing::Equal => vec![1.0; selected.len()],
        Sizing::InverseVolatility => selected
            .iter()
            .map(|c| {
                if c.volatility > 0.0 && c.volatility.is_finite() {
                    1.0 / c.volatility
                } else {
                    0.0
                }
            })
            .collect(),
    };

    let total: f64 = raw.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        // degenerate scores: fall back to equal weight
        let weight = 1.0 / selected.len() as f64;
        return selected.into_iter().map(|c| (c.symbol, weight)).collect();
    }

    selected
        .into_iter()
        .zip(raw)
        .filter(|(_, w)| *w > 0.0)
        .map(|(c, w)| (c.symbol, w / total))
        .collect()
}

/// Score every candidate with a visible window using `score_fn`
pub(crate) fn score_candidates<F>(
    candidates: &[Symbol],
    history: &HistoryView<'_>,
    score_fn: F,
) -> Vec<ScoredCandidate>
where
    F: Fn(&Symbol, &[PriceBar]) -> Option<ScoredCandidate>,
{
    candidates
        .iter()
        .filter_map(|symbol| {
            let window = history.window(symbol);
            if window.is_empty() {
                return None;
            }
            score_fn(symbol, window)
        })
        .collect()
}

// =============================================================================
// Strategy Registry
// =============================================================================

/// External capabilities some strategies depend on.
///
/// `fundamentals` is the raw source. Strategies that memoize it build their
/// own cache on `clock`, one per strategy instance.
#[derive(Clone)]
pub struct StrategyDeps {
    pub fundamentals: Option<Arc<dyn FundamentalsProvider>>,
    pub forecaster: Option<Arc<dyn Forecaster>>,
    pub ml: MlConfig,
    pub clock: Arc<dyn Clock>,
}

impl Default for StrategyDeps {
    fn default() -> Self {
        Self {
            fundamentals: None,
            forecaster: None,
            ml: MlConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Factory function type for creating strategies from JSON parameters
pub type StrategyFactory = fn(&serde_json::Value, &StrategyDeps) -> Result<Box<dyn Strategy>>;

static REGISTRY: OnceLock<RwLock<HashMap<&'static str, StrategyFactory>>> = OnceLock::new();

fn get_registry() -> &'static RwLock<HashMap<&'static str, StrategyFactory>> {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert("momentum", momentum::create as StrategyFactory);
        map.insert("mean_reversion", mean_reversion::create as StrategyFactory);
        map.insert(
            "volatility_breakout",
            volatility_breakout::create as StrategyFactory,
        );
        map.insert(
            "volume_confirmation",
            volume_confirmation::create as StrategyFactory,
        );
        map.insert("trend_cycle", trend_cycle::create as StrategyFactory);
        map.insert("safe_haven", safe_haven::create as StrategyFactory);
        map.insert("multi_factor_ml", multi_factor_ml::create as StrategyFactory);
        map.insert("cash", cash::create as StrategyFactory);
        RwLock::new(map)
    })
}

/// Create a strategy by family name
pub fn create_strategy(
    name: &str,
    params: &serde_json::Value,
    deps: &StrategyDeps,
) -> Result<Box<dyn Strategy>> {
    let registry = get_registry()
        .read()
        .map_err(|_| anyhow::anyhow!("strategy registry lock poisoned"))?;

    let factory = registry.get(name).ok_or_else(|| {
        let mut available: Vec<_> = registry.keys().copied().collect();
        available.sort_unstable();
        anyhow::anyhow!(
            "Unknown strategy: '{}'. Available: {}",
            name,
            available.join(", ")
        )
    })?;

    factory(params, deps)
}

/// Registered family names, sorted
pub fn available_strategies() -> Vec<&'static str> {
    let mut names: Vec<_> = get_registry()
        .read()
        .map(|r| r.keys().copied().collect())
        .unwrap_or_default();
    names.sort_unstable();
    names
}

/// Register a new strategy family (for plugins or testing)
pub fn register_strategy(name: &'static str, factory: StrategyFactory) {
    if let Ok(mut registry) = get_registry().write() {
        registry.insert(name, factory);
    }
}

/// Deserialize a strategy config, treating `null` as "all defaults"
pub(crate) fn parse_params<T>(params: &serde_json::Value) -> Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params.clone())
        .map_err(|e| anyhow::anyhow!("Failed to parse strategy config: {}", e))
}
