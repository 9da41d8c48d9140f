use clap::Args;
use serde_json::Value;

use risk_engine_core::stress::{preset, preset_scenarios};

/// Arguments for listing built-in scenarios
#[derive(Args)]
pub struct ScenariosArgs {
    /// Show a single scenario by name
    #[arg(long, allow_hyphen_values = true)]
    pub name: Option<String>,
}

pub fn run_scenarios(args: ScenariosArgs) -> Result<Value, Box<dyn std::error::Error>> {
    match args.name {
        Some(name) => {
            let scenario = preset(&name).ok_or_else(|| format!("Unknown scenario '{}'", name))?;
            Ok(serde_json::json!({ "result": scenario }))
        }
        None => Ok(serde_json::json!({ "result": preset_scenarios() })),
    }
}
