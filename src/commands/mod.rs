//! CLI command implementations

pub mod backtest;
pub mod roster;
pub mod tournament;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use equity_strategies::data::{self, Universe};
use equity_strategies::forecast::LinearForecaster;
use equity_strategies::fundamentals::{FundamentalsProvider, QualityFilter, SystemClock};
use equity_strategies::strategies::StrategyDeps;
use equity_strategies::{Config, SectorMap, Symbol};

/// Everything a command needs besides the config
pub struct Inputs {
    pub universe: Universe,
    pub sectors: SectorMap,
    pub deps: StrategyDeps,
}

/// Load price data, sectors and the optional ML capabilities named in the config
pub fn load_inputs(config: &Config) -> Result<Inputs> {
    info!("Loading data from: {}", config.backtest.data_dir);
    let mut universe = data::load_universe(
        &config.backtest.data_dir,
        config.backtest.benchmark_symbol.as_deref(),
    )?;

    let sectors = match &config.backtest.sector_file {
        Some(path) => data::load_sector_map(path)
            .with_context(|| format!("Failed to load sectors from {}", path))?,
        None => SectorMap::new(),
    };

    let deps = build_deps(config)?;
    if let Some(provider) = &deps.fundamentals {
        apply_quality_filter(config, &mut universe, provider.as_ref());
    }

    Ok(Inputs {
        universe,
        sectors,
        deps,
    })
}

/// Wire the fundamentals provider and forecaster if configured
pub fn build_deps(config: &Config) -> Result<StrategyDeps> {
    let fundamentals: Option<Arc<dyn FundamentalsProvider>> = match &config.backtest.fundamentals_file {
        Some(path) => {
            let snapshot = data::load_fundamentals(path)
                .with_context(|| format!("Failed to load fundamentals from {}", path))?;
            Some(Arc::new(snapshot))
        }
        None => None,
    };

    let forecaster = match &config.backtest.model_file {
        Some(path) if Path::new(path).exists() => {
            let model = LinearForecaster::from_file(path)
                .with_context(|| format!("Failed to load model from {}", path))?;
            info!("Loaded forecaster from {}", path);
            Some(Arc::new(model) as Arc<dyn equity_strategies::forecast::Forecaster>)
        }
        Some(path) => {
            tracing::warn!("Model file {} not found, ML strategy disabled", path);
            None
        }
        None => None,
    };

    Ok(StrategyDeps {
        fundamentals,
        forecaster,
        ml: config.ml.clone(),
        clock: Arc::new(SystemClock),
    })
}

/// Drop stocks whose fundamentals fail the quality gate
pub fn apply_quality_filter(config: &Config, universe: &mut Universe, provider: &dyn FundamentalsProvider) {
    let filter = QualityFilter::new(config.quality.clone());
    let symbols: Vec<Symbol> = universe.stocks.keys().cloned().collect();
    let keep = filter.filter(&symbols, provider);
    let before = universe.stocks.len();
    universe.stocks.retain(|symbol, _| keep.contains(symbol));
    info!(
        "Quality filter kept {} of {} symbols",
        universe.stocks.len(),
        before
    );
}

pub fn parse_date_arg(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("Invalid date: {}", raw))
}
