use clap::{Args, ValueEnum};
use serde_json::Value;

use risk_engine_core::config::RiskConfig;
use risk_engine_core::portfolio::RebalanceFrequency;
use risk_engine_core::service::InlineBacktestRequest;

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RebalanceArg {
    None,
    Monthly,
    Quarterly,
    Yearly,
}

impl From<RebalanceArg> for RebalanceFrequency {
    fn from(r: RebalanceArg) -> Self {
        match r {
            RebalanceArg::None => RebalanceFrequency::None,
            RebalanceArg::Monthly => RebalanceFrequency::Monthly,
            RebalanceArg::Quarterly => RebalanceFrequency::Quarterly,
            RebalanceArg::Yearly => RebalanceFrequency::Yearly,
        }
    }
}

/// Arguments for a historical backtest; flags win over the input file.
#[derive(Args)]
pub struct BacktestArgs {
    /// Input file, .json or .toml (positions, prices, optional backtest fields)
    #[arg(long)]
    pub input: Option<String>,

    /// When drifted holdings are reset to their starting weights
    #[arg(long)]
    pub rebalance: Option<RebalanceArg>,

    /// Symbol in the price history to compare against
    #[arg(long)]
    pub benchmark: Option<String>,

    /// Annualised risk-free rate for Sharpe and Sortino
    #[arg(long)]
    pub risk_free_rate: Option<f64>,

    /// Years of price history to replay
    #[arg(long)]
    pub lookback_years: Option<u32>,
}

pub fn run_backtest(args: BacktestArgs, config: RiskConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let mut inline: InlineBacktestRequest = input::read_input(args.input.as_deref(), "backtest")?;
    inline.rebalance = args.rebalance.map(Into::into).or(inline.rebalance);
    inline.benchmark = args.benchmark.or(inline.benchmark);
    inline.risk_free_rate = args.risk_free_rate.or(inline.risk_free_rate);
    inline.lookback_years = args.lookback_years.or(inline.lookback_years);

    let request = inline.request();
    let result = inline.into_service(config)?.backtest(&request)?;
    Ok(serde_json::to_value(result)?)
}
