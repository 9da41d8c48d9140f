use clap::Args;
use serde::Deserialize;
use serde_json::Value;

use risk_engine_core::config::RiskConfig;
use risk_engine_core::returns::InMemoryMarketData;
use risk_engine_core::service::{InMemoryPortfolios, RiskService, StressTestRequest};
use risk_engine_core::stress::{
    preset, preset_scenarios, SensitivityTable, StressScenario, StressScenarioEngine,
};
use risk_engine_core::Position;

use crate::input;

/// Portfolio id the input positions are filed under.
const PORTFOLIO_ID: &str = "input";

/// Arguments for stress testing
#[derive(Args)]
pub struct StressArgs {
    /// Input file, .json or .toml (positions, optional scenarios and sensitivities)
    #[arg(long)]
    pub input: Option<String>,

    /// Built-in scenario by name; repeat for several
    #[arg(long = "scenario", allow_hyphen_values = true)]
    pub scenarios: Vec<String>,

    /// Run every built-in scenario
    #[arg(long, conflicts_with = "scenarios")]
    pub all_presets: bool,
}

#[derive(Debug, Deserialize)]
pub struct StressInput {
    pub positions: Vec<Position>,
    #[serde(default)]
    pub scenario: Option<StressScenario>,
    #[serde(default)]
    pub scenarios: Vec<StressScenario>,
    /// Overrides of the built-in sector betas, durations and fallbacks
    #[serde(default)]
    pub sensitivities: Option<SensitivityTable>,
}

pub fn run_stress(args: StressArgs, config: RiskConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let input: StressInput = input::read_input(args.input.as_deref(), "stress test")?;

    let mut scenarios: Vec<StressScenario> = input.scenario.into_iter().chain(input.scenarios).collect();
    for name in &args.scenarios {
        let found = preset(name).ok_or_else(|| {
            let known: Vec<String> = preset_scenarios().into_iter().map(|s| s.name).collect();
            format!("Unknown scenario '{}'. Built-in scenarios: {}", name, known.join(", "))
        })?;
        scenarios.push(found);
    }
    if args.all_presets {
        scenarios.extend(preset_scenarios());
    }

    let mut service = RiskService::new(
        InMemoryMarketData::default(),
        InMemoryPortfolios::new().with_portfolio(PORTFOLIO_ID, input.positions),
        config,
    )?;
    if let Some(table) = input.sensitivities {
        service = service.with_stress_engine(StressScenarioEngine::new(table));
    }

    match scenarios.len() {
        0 => Err("No scenario given: use --scenario <name>, --all-presets, or a scenario in the input".into()),
        1 => {
            let request = StressTestRequest {
                portfolio_id: PORTFOLIO_ID.into(),
                scenario: scenarios.remove(0),
            };
            Ok(serde_json::to_value(service.stress_test(&request)?)?)
        }
        _ => Ok(serde_json::to_value(service.stress_test_many(PORTFOLIO_ID, &scenarios)?)?),
    }
}
