mod commands;
mod config;
mod input;
mod output;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::backtest::BacktestArgs;
use commands::compare::CompareArgs;
use commands::metrics::MetricsArgs;
use commands::scenarios::ScenariosArgs;
use commands::stress::StressArgs;
use commands::var::VarArgs;
use output::OutputFormat;

/// Portfolio Value-at-Risk and stress testing
#[derive(Parser)]
#[command(
    name = "riskctl",
    version,
    about = "Portfolio Value-at-Risk, Expected Shortfall and factor stress tests",
    long_about = "Computes VaR and CVaR by the parametric, historical and Monte Carlo \
                  methods from positions and price history, and applies macro-factor \
                  stress scenarios with per-asset and per-factor attribution."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Engine configuration file (.toml or .json)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log pipeline steps to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Value-at-Risk and Expected Shortfall by one method
    Var(VarArgs),
    /// Run all three VaR methods on the same data
    Compare(CompareArgs),
    /// Apply stress scenarios to positions
    Stress(StressArgs),
    /// List the built-in stress scenarios
    Scenarios(ScenariosArgs),
    /// Return, volatility, Sharpe, Sortino and drawdown of a return series
    Metrics(MetricsArgs),
    /// Replay current weights over price history with periodic rebalancing
    Backtest(BacktestArgs),
    /// Print version information
    Version,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> =
        config::load(cli.config.as_deref()).and_then(|cfg| match cli.command {
            Commands::Var(args) => commands::var::run_var(args, cfg),
            Commands::Compare(args) => commands::compare::run_compare(args, cfg),
            Commands::Stress(args) => commands::stress::run_stress(args, cfg),
            Commands::Scenarios(args) => commands::scenarios::run_scenarios(args),
            Commands::Metrics(args) => commands::metrics::run_metrics(args),
            Commands::Backtest(args) => commands::backtest::run_backtest(args, cfg),
            Commands::Version => Ok(serde_json::json!({
                "name": "riskctl",
                "version": env!("CARGO_PKG_VERSION"),
            })),
        });

    match result {
        Ok(value) => {
            cli.output.print(&value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
