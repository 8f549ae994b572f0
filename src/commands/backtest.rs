//! Backtest command implementation

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use equity_strategies::backtest::Backtester;
use equity_strategies::strategies::create_strategy;
use equity_strategies::{Config, TradeIntent};

use super::{load_inputs, parse_date_arg};

pub struct BacktestArgs {
    pub config_path: String,
    pub strategy_override: Option<String>,
    pub capital_override: Option<f64>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub deterministic: bool,
    pub trades_out: Option<PathBuf>,
}

pub fn run(args: BacktestArgs) -> Result<()> {
    info!("Starting backtest");

    // Load configuration
    let mut config = Config::from_file(&args.config_path)?;
    info!("Loaded configuration from: {}", args.config_path);

    // Apply overrides
    if let Some(strategy) = args.strategy_override {
        info!("Overriding strategy to: {}", strategy);
        if !config.strategy.is_object() {
            config.strategy = serde_json::json!({});
        }
        config.strategy["name"] = serde_json::Value::String(strategy);
    }

    if let Some(capital) = args.capital_override {
        info!("Overriding initial cash to: {:.2}", capital);
        config.trading.initial_cash = capital;
    }

    let start = args.start.as_deref().map(parse_date_arg).transpose()?;
    let end = args.end.as_deref().map(parse_date_arg).transpose()?;

    let inputs = load_inputs(&config)?;
    info!("Loaded data for {} symbols", inputs.universe.stocks.len());

    // Create strategy based on config
    let name = config
        .strategy_name()
        .context("Config has no strategy name; set strategy.name or pass --strategy")?
        .to_string();
    info!("Creating strategy: {}", name);
    let strategy = create_strategy(&name, &config.strategy, &inputs.deps)?;
    debug!("Strategy variant: {}", strategy.id());

    let backtester = Backtester::new(&config)
        .with_sectors(inputs.sectors)
        .with_window(start, end)
        .with_deterministic_slippage(args.deterministic);

    info!("Running backtest...");
    let report = backtester.run(
        strategy.as_ref(),
        &inputs.universe.stocks,
        inputs.universe.benchmark.as_deref(),
    )?;
    let result = &report.result;

    let fees: f64 = report.trades.iter().map(|t| t.commission).sum();
    let stop_exits = report
        .trades
        .iter()
        .filter(|t| t.reason == equity_strategies::backtest::STOP_LOSS_REASON)
        .count();

    // Print results
    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS: {}", result.strategy_id);
    println!("{}", "=".repeat(60));
    println!("Initial Cash:       {:.2}", backtester.initial_cash());
    println!("Final Value:        {:.2}", result.final_value);
    println!("Total Return:       {:.2}%", result.return_pct);
    println!("Benchmark Return:   {:.2}%", result.benchmark_return);
    println!("Alpha:              {:.2}%", result.alpha);
    println!("Sharpe Ratio:       {:.2}", result.sharpe_ratio);
    println!("Max Drawdown:       {:.2}%", result.max_drawdown);
    println!("Win Rate:           {:.2}%", result.win_rate * 100.0);
    println!("Total Trades:       {}", result.total_trades);
    println!("Stop-Loss Exits:    {}", stop_exits);
    println!("Commission Paid:    {:.2}", fees);
    if let (Some(first), Some(last)) = (report.equity_curve.first(), report.equity_curve.last()) {
        println!("Period:             {} to {}", first.date, last.date);
    }
    println!("{}", "=".repeat(60));

    if let Some(path) = args.trades_out {
        write_trades(&path, &report.trades)?;
        println!("Trade log written to {}", path.display());
    }

    info!("Backtest completed successfully");

    Ok(())
}

fn write_trades(path: &Path, trades: &[TradeIntent]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for trade in trades {
        writer.serialize(trade)?;
    }
    writer.flush()?;
    Ok(())
}
