//! Equity strategies - main entry point
//!
//! This binary provides three subcommands:
//! - backtest: Run one strategy over the configured universe
//! - tournament: Rank the strategy roster on a walk-forward split
//! - roster: List the strategy variants the tournament evaluates

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "equity-strategies")]
#[command(about = "Equity allocation strategies with look-ahead-free backtests and walk-forward tournaments", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a single strategy backtest
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Strategy family (overrides the config's strategy name)
        #[arg(short, long)]
        strategy: Option<String>,

        /// Initial cash
        #[arg(long)]
        capital: Option<f64>,

        /// Evaluation window start (YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Evaluation window end (YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Use fixed slippage instead of stochastic draws
        #[arg(long)]
        deterministic: bool,

        /// Write the trade log to this CSV file
        #[arg(long)]
        trades_out: Option<PathBuf>,
    },

    /// Rank the strategy roster on the walk-forward test window
    Tournament {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Initial cash
        #[arg(long)]
        capital: Option<f64>,

        /// Return target (percent) for the score bonus
        #[arg(long)]
        target: Option<f64>,

        /// Strategy currently controlling the portfolio (sticky anchor)
        #[arg(long)]
        active: Option<String>,

        /// Number of ranked results to show
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Write the full outcome as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the tournament roster
    Roster {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // Tournament: keep the console clean for the progress bar
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
    }
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Backtest { .. } => ("backtest", false),
        Commands::Tournament { .. } => ("tournament", true),
        Commands::Roster { .. } => ("roster", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Backtest {
            config,
            strategy,
            capital,
            start,
            end,
            deterministic,
            trades_out,
        } => commands::backtest::run(commands::backtest::BacktestArgs {
            config_path: config,
            strategy_override: strategy,
            capital_override: capital,
            start,
            end,
            deterministic,
            trades_out,
        }),

        Commands::Tournament {
            config,
            capital,
            target,
            active,
            top,
            output,
        } => commands::tournament::run(config, capital, target, active, top, output),

        Commands::Roster { config } => commands::roster::run(config),
    }
}
