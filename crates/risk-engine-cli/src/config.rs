use risk_engine_core::config::{HorizonScaling, InnovationDistribution, RiskConfig};
use tracing::debug;

use crate::input::file::read_document;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Defaults, then the TOML or JSON file if given, then `RISK_ENGINE_*` variables.
pub fn load(path: Option<&str>) -> CliResult<RiskConfig> {
    let mut config = match path {
        Some(p) => read_document::<RiskConfig>(p, "engine configuration")?,
        None => RiskConfig::default(),
    };
    apply_env(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;
    debug!(
        file = path.unwrap_or("<defaults>"),
        trading_days = config.returns.trading_days_per_year,
        simulations = config.monte_carlo.num_simulations,
        "configuration loaded"
    );
    Ok(config)
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> CliResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| format!("{} has invalid value '{}'", key, raw).into())
}

/// Apply environment overrides read through `lookup`.
pub fn apply_env(
    config: &mut RiskConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> CliResult<()> {
    if let Some(v) = lookup("RISK_ENGINE_TRADING_DAYS") {
        config.returns.trading_days_per_year = parse("RISK_ENGINE_TRADING_DAYS", &v)?;
    }
    if let Some(v) = lookup("RISK_ENGINE_MIN_OBSERVATIONS") {
        config.returns.min_observations = parse("RISK_ENGINE_MIN_OBSERVATIONS", &v)?;
    }
    if let Some(v) = lookup("RISK_ENGINE_NUM_SIMULATIONS") {
        config.monte_carlo.num_simulations = parse("RISK_ENGINE_NUM_SIMULATIONS", &v)?;
    }
    if let Some(v) = lookup("RISK_ENGINE_DEGREES_OF_FREEDOM") {
        config.monte_carlo.degrees_of_freedom = parse("RISK_ENGINE_DEGREES_OF_FREEDOM", &v)?;
    }
    if let Some(v) = lookup("RISK_ENGINE_DISTRIBUTION") {
        config.monte_carlo.distribution = match v.trim().to_lowercase().as_str() {
            "normal" => InnovationDistribution::Normal,
            "student_t" | "student-t" | "t" => InnovationDistribution::StudentT,
            other => return Err(format!("RISK_ENGINE_DISTRIBUTION has invalid value '{}'", other).into()),
        };
    }
    if let Some(v) = lookup("RISK_ENGINE_HORIZON_SCALING") {
        config.historical.horizon_scaling = match v.trim().to_lowercase().as_str() {
            "sqrt_time" => HorizonScaling::SqrtTime,
            "overlapping_windows" => HorizonScaling::OverlappingWindows,
            other => return Err(format!("RISK_ENGINE_HORIZON_SCALING has invalid value '{}'", other).into()),
        };
    }
    if let Some(v) = lookup("RISK_ENGINE_MAX_CALCULATION_MS") {
        config.limits.max_calculation_ms = Some(parse("RISK_ENGINE_MAX_CALCULATION_MS", &v)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_toml_sections_merge_with_defaults() {
        let cfg: RiskConfig = toml::from_str(
            r#"
            [monte_carlo]
            num_simulations = 20000

            [historical]
            horizon_scaling = "overlapping_windows"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.monte_carlo.num_simulations, 20_000);
        assert_eq!(cfg.historical.horizon_scaling, HorizonScaling::OverlappingWindows);
        assert_eq!(cfg.returns.trading_days_per_year, 252);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RISK_ENGINE_NUM_SIMULATIONS", "50000"),
            ("RISK_ENGINE_DISTRIBUTION", "student-t"),
            ("RISK_ENGINE_MAX_CALCULATION_MS", "1500"),
        ]
        .into_iter()
        .collect();
        let mut cfg = RiskConfig::default();
        apply_env(&mut cfg, |k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.monte_carlo.num_simulations, 50_000);
        assert_eq!(cfg.monte_carlo.distribution, InnovationDistribution::StudentT);
        assert_eq!(cfg.limits.max_calculation_ms, Some(1500));
    }

    #[test]
    fn test_bad_env_value_is_an_error() {
        let mut cfg = RiskConfig::default();
        let err = apply_env(&mut cfg, |k| {
            (k == "RISK_ENGINE_TRADING_DAYS").then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("RISK_ENGINE_TRADING_DAYS"));
    }
}
