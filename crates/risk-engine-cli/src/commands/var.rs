use clap::{Args, ValueEnum};
use serde_json::Value;

use risk_engine_core::config::{InnovationDistribution, RiskConfig};
use risk_engine_core::service::{InlineRiskRequest, InlineRiskService, RiskCalculationRequest};
use risk_engine_core::var::VarMethod;

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum MethodArg {
    Parametric,
    Historical,
    MonteCarlo,
}

impl From<MethodArg> for VarMethod {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Parametric => VarMethod::Parametric,
            MethodArg::Historical => VarMethod::Historical,
            MethodArg::MonteCarlo => VarMethod::MonteCarlo,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DistributionArg {
    Normal,
    StudentT,
}

impl From<DistributionArg> for InnovationDistribution {
    fn from(d: DistributionArg) -> Self {
        match d {
            DistributionArg::Normal => InnovationDistribution::Normal,
            DistributionArg::StudentT => InnovationDistribution::StudentT,
        }
    }
}

/// Request fields shared by `var` and `compare`; flags win over the input file.
#[derive(Args, Debug)]
pub struct RequestFlags {
    /// Input file, .json or .toml (positions, prices, optional request fields)
    #[arg(long)]
    pub input: Option<String>,

    /// One-sided confidence level, e.g. 0.95
    #[arg(long)]
    pub confidence: Option<f64>,

    /// Horizon in trading days
    #[arg(long)]
    pub horizon: Option<u32>,

    /// Years of price history to use
    #[arg(long)]
    pub lookback_years: Option<u32>,

    /// Monte Carlo simulation count
    #[arg(long)]
    pub simulations: Option<u32>,

    /// Return distribution for parametric and Monte Carlo VaR
    #[arg(long)]
    pub distribution: Option<DistributionArg>,

    /// Student-t degrees of freedom
    #[arg(long)]
    pub df: Option<f64>,

    /// Random seed for reproducible Monte Carlo runs
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Arguments for a single-method VaR calculation
#[derive(Args)]
pub struct VarArgs {
    /// VaR method (defaults to the input file's, then parametric)
    #[arg(long)]
    pub method: Option<MethodArg>,

    #[command(flatten)]
    pub request: RequestFlags,
}

/// Load the input and let the flags override its request fields.
pub(crate) fn prepare(
    flags: &RequestFlags,
    method: Option<MethodArg>,
    config: RiskConfig,
) -> Result<(InlineRiskService, RiskCalculationRequest), Box<dyn std::error::Error>> {
    let mut inline: InlineRiskRequest = input::read_input(flags.input.as_deref(), "VaR calculation")?;

    if let Some(m) = method {
        inline.method = Some(m.into());
    }
    inline.confidence_level = flags.confidence.or(inline.confidence_level);
    inline.horizon_days = flags.horizon.or(inline.horizon_days);
    inline.lookback_years = flags.lookback_years.or(inline.lookback_years);
    inline.num_simulations = flags.simulations.or(inline.num_simulations);
    inline.distribution = flags.distribution.map(Into::into).or(inline.distribution);
    inline.degrees_of_freedom = flags.df.or(inline.degrees_of_freedom);
    inline.seed = flags.seed.or(inline.seed);

    let request = inline.request();
    Ok((inline.into_service(config)?, request))
}

pub fn run_var(args: VarArgs, config: RiskConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let (service, request) = prepare(&args.request, args.method, config)?;
    let result = service.calculate(&request)?;
    Ok(serde_json::to_value(result)?)
}
