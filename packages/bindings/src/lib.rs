use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use risk_engine_core::config::RiskConfig;
use risk_engine_core::portfolio::{calculate_performance_metrics, PerformanceInput};
use risk_engine_core::service::{InlineBacktestRequest, InlineRiskRequest};
use risk_engine_core::stress::{
    preset_scenarios, SensitivityTable, StressScenario, StressScenarioEngine,
};
use risk_engine_core::Position;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// Engine configuration from an optional JSON document; `None` means defaults.
fn parse_config(config_json: Option<String>) -> NapiResult<RiskConfig> {
    let config = match config_json {
        Some(json) => serde_json::from_str::<RiskConfig>(&json).map_err(to_napi_error)?,
        None => RiskConfig::default(),
    };
    config.validate().map_err(to_napi_error)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Value-at-Risk
// ---------------------------------------------------------------------------

#[napi]
pub fn calculate_var(input_json: String, config_json: Option<String>) -> NapiResult<String> {
    let inline: InlineRiskRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let request = inline.request();
    let service = inline
        .into_service(parse_config(config_json)?)
        .map_err(to_napi_error)?;
    let output = service.calculate(&request).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn compare_var_methods(input_json: String, config_json: Option<String>) -> NapiResult<String> {
    let inline: InlineRiskRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let request = inline.request();
    let service = inline
        .into_service(parse_config(config_json)?)
        .map_err(to_napi_error)?;
    let output = service.compare_methods(&request).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Stress testing
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct StressInput {
    positions: Vec<Position>,
    #[serde(default)]
    scenario: Option<StressScenario>,
    #[serde(default)]
    scenarios: Vec<StressScenario>,
    #[serde(default)]
    sensitivities: Option<SensitivityTable>,
}

/// One `scenario` returns a single result; `scenarios` a multi-scenario summary.
#[napi]
pub fn run_stress_test(input_json: String) -> NapiResult<String> {
    let input: StressInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let engine = StressScenarioEngine::new(input.sensitivities.unwrap_or_default());
    match (input.scenario, input.scenarios.is_empty()) {
        (Some(scenario), true) => {
            let output = engine.run(&scenario, &input.positions).map_err(to_napi_error)?;
            serde_json::to_string(&output).map_err(to_napi_error)
        }
        (scenario, _) => {
            let scenarios: Vec<StressScenario> = scenario.into_iter().chain(input.scenarios).collect();
            let output = engine
                .run_many(&scenarios, &input.positions)
                .map_err(to_napi_error)?;
            serde_json::to_string(&output).map_err(to_napi_error)
        }
    }
}

#[napi]
pub fn stress_scenario_presets() -> NapiResult<String> {
    serde_json::to_string(&preset_scenarios()).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Performance
// ---------------------------------------------------------------------------

/// Replay positions over `prices` with optional rebalancing and benchmark.
#[napi]
pub fn run_backtest(input_json: String, config_json: Option<String>) -> NapiResult<String> {
    let inline: InlineBacktestRequest = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let request = inline.request();
    let service = inline
        .into_service(parse_config(config_json)?)
        .map_err(to_napi_error)?;
    let output = service.backtest(&request).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn performance_metrics(input_json: String) -> NapiResult<String> {
    let input: PerformanceInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = calculate_performance_metrics(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
