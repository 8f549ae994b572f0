//! Data loading
//!
//! Price history, benchmark, sector tags and fundamentals snapshots from CSV
//! files. Price files live in one directory, one `{SYMBOL}.csv` per symbol
//! with a `date,open,high,low,close,volume` header.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::fundamentals::{Fundamentals, StaticFundamentals};
use crate::{MarketData, PriceBar, SectorMap, Symbol};

// =============================================================================
// CSV Price Loading
// =============================================================================

fn parse_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    // Accept "2024-01-02" and "2024-01-02 00:00:00" / RFC 3339 stamps
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d-%m-%Y"))
        .context(format!("Failed to parse date: {}", raw))
}

fn parse_field(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64> {
    record
        .get(index)
        .context(format!("Missing {} column", name))?
        .trim()
        .parse()
        .context(format!("Failed to parse {}", name))
}

/// Load daily bars for one symbol.
///
/// Bars failing OHLCV validation are skipped with a warning. The result is
/// sorted by date with duplicate dates collapsed to the last row.
pub fn load_csv(path: impl AsRef<Path>, symbol: &Symbol) -> Result<Vec<PriceBar>> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("Failed to open CSV file")?;

    let mut bars = Vec::new();
    let mut rejected = 0usize;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let date = parse_date(record.get(0).context("Missing date column")?)?;
        let open = parse_field(&record, 1, "open")?;
        let high = parse_field(&record, 2, "high")?;
        let low = parse_field(&record, 3, "low")?;
        let close = parse_field(&record, 4, "close")?;
        let volume = parse_field(&record, 5, "volume")?;

        match PriceBar::new(symbol.clone(), date, open, high, low, close, volume) {
            Ok(bar) => bars.push(bar),
            Err(e) => {
                rejected += 1;
                tracing::debug!(symbol = %symbol, %date, error = %e, "Rejected bar");
            }
        }
    }

    if rejected > 0 {
        warn!(symbol = %symbol, rejected, "Skipped invalid bars");
    }

    bars.sort_by_key(|b| b.date);
    let before = bars.len();
    // dedup_by keeps the first of a run; reverse so the last row wins
    bars.reverse();
    bars.dedup_by_key(|b| b.date);
    bars.reverse();
    if bars.len() < before {
        warn!(symbol = %symbol, duplicates = before - bars.len(), "Collapsed duplicate dates");
    }

    Ok(bars)
}

/// Universe price history plus the benchmark series
#[derive(Debug, Clone, Default)]
pub struct Universe {
    pub stocks: MarketData,
    pub benchmark: Option<Vec<PriceBar>>,
}

/// Load every `*.csv` under `data_dir`; the file named after
/// `benchmark_symbol` becomes the benchmark
pub fn load_universe(data_dir: impl AsRef<Path>, benchmark_symbol: Option<&str>) -> Result<Universe> {
    let data_dir = data_dir.as_ref();
    let mut paths: Vec<_> = std::fs::read_dir(data_dir)
        .context(format!("Failed to read data directory {}", data_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")))
        .collect();
    paths.sort();

    let mut universe = Universe::default();

    for path in paths {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let symbol = Symbol::new(stem);
        let bars = load_csv(&path, &symbol).context(format!("Failed to load data for {}", symbol))?;
        if bars.is_empty() {
            warn!("No usable bars in {}", path.display());
            continue;
        }

        if benchmark_symbol.is_some_and(|b| b.eq_ignore_ascii_case(stem)) {
            info!("Loaded {} benchmark bars for {}", bars.len(), symbol);
            universe.benchmark = Some(bars);
        } else {
            tracing::debug!("Loaded {} bars for {}", bars.len(), symbol);
            universe.stocks.insert(symbol, bars);
        }
    }

    if universe.stocks.is_empty() {
        anyhow::bail!("No price data found in {}", data_dir.display());
    }
    if let (Some(name), None) = (benchmark_symbol, &universe.benchmark) {
        warn!("Benchmark {} not found, regime filter disabled", name);
    }

    info!("Loaded {} symbols", universe.stocks.len());
    Ok(universe)
}

// =============================================================================
// Sector Map + Fundamentals
// =============================================================================

#[derive(Debug, Deserialize)]
struct SectorRow {
    symbol: String,
    sector: String,
}

/// Load `symbol,sector` rows
pub fn load_sector_map(path: impl AsRef<Path>) -> Result<SectorMap> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("Failed to open sector file")?;
    let mut sectors = SectorMap::new();
    for (row_idx, row) in reader.deserialize::<SectorRow>().enumerate() {
        let row = row.context(format!("Failed to read sector row {}", row_idx + 1))?;
        sectors.insert(Symbol::new(row.symbol.trim()), row.sector.trim());
    }
    info!("Loaded sectors for {} symbols", sectors.len());
    Ok(sectors)
}

#[derive(Debug, Deserialize)]
struct FundamentalsRow {
    symbol: String,
    return_on_equity: Option<f64>,
    debt_to_equity: Option<f64>,
    market_cap: Option<f64>,
    trailing_pe: Option<f64>,
    book_value: Option<f64>,
}

impl FundamentalsRow {
    fn complete(&self) -> Option<Fundamentals> {
        Some(Fundamentals {
            return_on_equity: self.return_on_equity?,
            debt_to_equity: self.debt_to_equity?,
            market_cap: self.market_cap?,
            trailing_pe: self.trailing_pe?,
            book_value: self.book_value?,
        })
    }
}

/// Load a fundamentals snapshot; rows with any blank field are left out
/// rather than filled with defaults
pub fn load_fundamentals(path: impl AsRef<Path>) -> Result<StaticFundamentals> {
    let mut reader =
        csv::Reader::from_path(path.as_ref()).context("Failed to open fundamentals file")?;
    let mut entries = HashMap::new();
    let mut incomplete = 0usize;

    for (row_idx, row) in reader.deserialize::<FundamentalsRow>().enumerate() {
        let row = row.context(format!("Failed to read fundamentals row {}", row_idx + 1))?;
        match row.complete() {
            Some(f) => {
                entries.insert(Symbol::new(row.symbol.trim()), f);
            }
            None => incomplete += 1,
        }
    }

    if incomplete > 0 {
        warn!(incomplete, "Fundamentals rows with missing fields were skipped");
    }
    info!("Loaded fundamentals for {} symbols", entries.len());
    Ok(StaticFundamentals::new(entries))
}

// =============================================================================
// Data Validation
// =============================================================================

/// Validate a bar series for ordering and OHLCV consistency
pub fn validate_bars(bars: &[PriceBar]) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if bars.is_empty() {
        errors.push("No bars provided".to_string());
        return ValidationResult { errors, warnings };
    }

    for (i, bar) in bars.iter().enumerate() {
        if let Err(e) = bar.validate() {
            errors.push(format!("Bar {} ({}): {}", i, bar.date, e));
        }
        if i > 0 && bar.date <= bars[i - 1].date {
            errors.push(format!("Bar {}: dates not strictly ascending", i));
        }
        if i > 0 && (bar.date - bars[i - 1].date).num_days() > 10 {
            warnings.push(format!("Bar {}: gap of more than 10 days before {}", i, bar.date));
        }
    }

    ValidationResult { errors, warnings }
}

/// Result of data validation
#[derive(Debug)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
