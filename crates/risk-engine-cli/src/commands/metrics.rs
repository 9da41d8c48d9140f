use clap::Args;
use serde_json::Value;

use risk_engine_core::portfolio::{calculate_performance_metrics, PerformanceInput};

use crate::input;

/// Arguments for performance metrics
#[derive(Args)]
pub struct MetricsArgs {
    /// Input file, .json or .toml (returns, optional benchmark_returns)
    #[arg(long)]
    pub input: Option<String>,

    /// Comma-separated periodic returns (e.g. "0.01,-0.004,0.007")
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub returns: Option<Vec<f64>>,

    /// Annualised risk-free rate
    #[arg(long)]
    pub risk_free_rate: Option<f64>,

    /// Return observations per year
    #[arg(long)]
    pub periods_per_year: Option<u32>,
}

pub fn run_metrics(args: MetricsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut metrics_input: PerformanceInput = match args.returns {
        Some(returns) => PerformanceInput {
            returns,
            risk_free_rate: 0.0,
            periods_per_year: 252,
            benchmark_returns: None,
        },
        None => input::read_input(args.input.as_deref(), "performance metrics")?,
    };
    if let Some(rf) = args.risk_free_rate {
        metrics_input.risk_free_rate = rf;
    }
    if let Some(p) = args.periods_per_year {
        metrics_input.periods_per_year = p;
    }
    let result = calculate_performance_metrics(&metrics_input)?;
    Ok(serde_json::to_value(result)?)
}
