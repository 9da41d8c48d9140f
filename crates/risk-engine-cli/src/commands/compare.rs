use clap::Args;
use serde_json::Value;

use risk_engine_core::config::RiskConfig;

use super::var::{prepare, RequestFlags};

/// Arguments for a side-by-side comparison of all VaR methods
#[derive(Args)]
pub struct CompareArgs {
    #[command(flatten)]
    pub request: RequestFlags,
}

pub fn run_compare(args: CompareArgs, config: RiskConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let (service, request) = prepare(&args.request, None, config)?;
    let result = service.compare_methods(&request)?;
    Ok(serde_json::to_value(result)?)
}
