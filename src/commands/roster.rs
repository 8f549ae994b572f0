//! Roster command implementation

use anyhow::Result;
use tracing::info;

use equity_strategies::strategies::{available_strategies, default_roster};
use equity_strategies::Config;

use super::build_deps;

pub fn run(config_path: String) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    info!("Loaded configuration from: {}", config_path);

    let deps = build_deps(&config)?;
    let roster = default_roster(&deps)?;

    println!("\n{}", "=".repeat(60));
    println!("TOURNAMENT ROSTER ({} variants)", roster.len());
    println!("{}", "=".repeat(60));
    for strategy in &roster {
        println!("{:<44} {:?}", strategy.id(), strategy.family());
    }
    println!("{}", "-".repeat(60));
    println!("Registered families: {}", available_strategies().join(", "));

    Ok(())
}
