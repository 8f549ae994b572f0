//! Tournament command implementation

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::info;

use equity_strategies::strategies::default_roster;
use equity_strategies::tournament::{Tournament, TournamentOutcome};
use equity_strategies::Config;

use super::load_inputs;

pub fn run(
    config_path: String,
    capital_override: Option<f64>,
    target_override: Option<f64>,
    active_override: Option<String>,
    top: usize,
    output: Option<PathBuf>,
) -> Result<()> {
    info!("Starting tournament");

    let config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let inputs = load_inputs(&config)?;
    let roster = default_roster(&inputs.deps)?;
    info!("Roster: {} strategy variants", roster.len());

    let pb = ProgressBar::new(roster.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}] ✓ {msg}")
            .map_err(|e| anyhow::anyhow!("Invalid progress template: {}", e))?
            .progress_chars("█░ "),
    );
    pb.set_message("backtesting");

    let mut tournament = Tournament::new(&config)
        .with_sectors(inputs.sectors)
        .with_progress(pb);
    if let Some(capital) = capital_override {
        info!("Overriding initial cash to: {:.2}", capital);
        tournament = tournament.with_initial_cash(capital);
    }
    if let Some(target) = target_override {
        info!("Overriding target return to: {:.2}%", target);
        tournament = tournament.with_target_return(target);
    }
    if active_override.is_some() {
        tournament = tournament.with_active_strategy(active_override);
    }

    let outcome = tournament.evaluate(
        &roster,
        &inputs.universe.stocks,
        inputs.universe.benchmark.as_deref(),
    )?;

    print_outcome(&outcome, top);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&outcome)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Full results written to {}", path.display());
    }

    info!("Tournament completed successfully");
    Ok(())
}

fn print_outcome(outcome: &TournamentOutcome, top: usize) {
    let display_count = top.min(outcome.ranked.len());
    println!("\n{}", "=".repeat(100));
    match outcome.split_date {
        Some(split) => println!("TOP {} STRATEGIES (test window from {})", display_count, split),
        None => println!("TOP {} STRATEGIES", display_count),
    }
    println!("{}", "=".repeat(100));
    println!(
        "{:<4} {:<40} {:>8} {:>9} {:>8} {:>7} {:>8} {:>6}",
        "Rank", "Strategy", "Score", "Return%", "Alpha%", "Sharpe", "MaxDD%", "Trades"
    );
    println!("{}", "-".repeat(100));

    for r in outcome.ranked.iter().take(top) {
        println!(
            "{:<4} {:<40} {:>8.2} {:>9.2} {:>8.2} {:>7.2} {:>8.2} {:>6}",
            r.rank,
            r.strategy_id,
            r.score,
            r.result.return_pct,
            r.result.alpha,
            r.result.sharpe_ratio,
            r.result.max_drawdown,
            r.result.total_trades
        );
    }
    println!("{}", "=".repeat(100));

    if !outcome.failures.is_empty() {
        println!("\nFailed candidates:");
        for failure in &outcome.failures {
            println!("  {:<40} {}", failure.strategy_id, failure.reason);
        }
    }
    if outcome.cancelled {
        println!("\nTournament was cancelled before every candidate ran");
    }

    match &outcome.selected {
        Some(id) if outcome.anchor_retained => {
            println!("\nSelected: {} (active ML strategy retained, no challenger beat it by the margin)", id)
        }
        Some(id) => println!("\nSelected: {}", id),
        None => println!("\nNo strategy selected"),
    }
}
