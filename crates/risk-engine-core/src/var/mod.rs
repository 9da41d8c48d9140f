pub mod covariance;
pub mod historical;
pub mod parametric;
pub mod stats;

#[cfg(feature = "monte_carlo")]
pub mod monte_carlo;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{HorizonScaling, InnovationDistribution};
use crate::error::RiskEngineError;
use crate::RiskEngineResult;

pub use historical::HistoricalVarEngine;
pub use parametric::{ComponentVar, ParametricVarEngine};
pub use stats::ReturnMoments;

#[cfg(feature = "monte_carlo")]
pub use monte_carlo::{MonteCarloOptions, MonteCarloVarEngine};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarMethod {
    Parametric,
    Historical,
    MonteCarlo,
}

impl VarMethod {
    pub const ALL: [VarMethod; 3] = [
        VarMethod::Parametric,
        VarMethod::Historical,
        VarMethod::MonteCarlo,
    ];
}

impl fmt::Display for VarMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VarMethod::Parametric => "parametric",
            VarMethod::Historical => "historical",
            VarMethod::MonteCarlo => "monte_carlo",
        };
        f.write_str(name)
    }
}

/// Confidence and horizon shared by every VaR method.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarParameters {
    /// One-sided confidence level α, strictly between 0 and 1
    pub confidence_level: f64,
    /// Horizon in trading days, at least 1
    pub horizon_days: u32,
}

impl VarParameters {
    pub fn new(confidence_level: f64, horizon_days: u32) -> Self {
        Self {
            confidence_level,
            horizon_days,
        }
    }

    pub fn validate(&self) -> RiskEngineResult<()> {
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(RiskEngineError::invalid(
                "confidence_level",
                "Confidence level must be between 0 and 1 (exclusive)",
            ));
        }
        if self.horizon_days == 0 {
            return Err(RiskEngineError::invalid(
                "horizon_days",
                "Horizon must be at least one day",
            ));
        }
        Ok(())
    }

    pub(crate) fn horizon(&self) -> f64 {
        self.horizon_days as f64
    }
}

impl Default for VarParameters {
    fn default() -> Self {
        Self::new(0.95, 1)
    }
}

/// Method-specific diagnostics attached to a [`RiskResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VarDiagnostics {
    Parametric {
        moments: ReturnMoments,
        #[serde(default)]
        distribution: InnovationDistribution,
        /// Student-t degrees of freedom; absent for the normal model
        #[serde(default, skip_serializing_if = "Option::is_none")]
        degrees_of_freedom: Option<f64>,
        /// Loss quantile in standard deviations of the fitted distribution
        z_score: f64,
        /// Per-asset decomposition of the volatility term, when available
        #[serde(default, skip_serializing_if = "Option::is_none")]
        component_var: Option<Vec<ComponentVar>>,
    },
    Historical {
        moments: ReturnMoments,
        horizon_scaling: HorizonScaling,
        /// Horizon-scaled scenarios the quantile was taken over
        scenarios: usize,
        tail_observations: usize,
        worst_return: f64,
        best_return: f64,
    },
    MonteCarlo(SimulationDiagnostics),
}

/// Diagnostics of a Monte Carlo run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationDiagnostics {
    pub num_simulations: u32,
    pub distribution: InnovationDistribution,
    /// Student-t degrees of freedom; absent for normal innovations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degrees_of_freedom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Moments of the simulated horizon portfolio returns
    pub simulated: ReturnMoments,
    /// Whether the covariance diagonal had to be regularized
    pub regularized: bool,
    pub average_correlation: Option<f64>,
    pub portfolio_volatility_annual: f64,
    pub asset_volatilities_annual: Vec<AssetVolatility>,
    pub loss_distribution: LossDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetVolatility {
    pub symbol: String,
    pub volatility: f64,
}

/// Simulated currency losses (positive = loss).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossDistribution {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

/// Outcome of one VaR calculation. Losses are positive numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskResult {
    pub method: VarMethod,
    pub confidence_level: f64,
    pub horizon_days: u32,
    pub var_amount: f64,
    pub var_percentage: f64,
    pub cvar_amount: f64,
    pub cvar_percentage: f64,
    pub portfolio_value: f64,
    /// Historical return observations used
    pub observations: usize,
    pub diagnostics: VarDiagnostics,
}

impl RiskResult {
    pub(crate) fn new(
        method: VarMethod,
        params: &VarParameters,
        portfolio_value: f64,
        var_percentage: f64,
        cvar_percentage: f64,
        observations: usize,
        diagnostics: VarDiagnostics,
    ) -> Self {
        Self {
            method,
            confidence_level: params.confidence_level,
            horizon_days: params.horizon_days,
            var_amount: var_percentage * portfolio_value,
            var_percentage,
            cvar_amount: cvar_percentage * portfolio_value,
            cvar_percentage,
            portfolio_value,
            observations,
            diagnostics,
        }
    }
}

/// Reject return series too short for the engine, or containing non-finite values.
pub(crate) fn check_series(returns: &[f64], min_observations: usize, context: &str) -> RiskEngineResult<()> {
    let required = min_observations.max(2);
    if returns.len() < required {
        return Err(RiskEngineError::insufficient(context, required, returns.len()));
    }
    if returns.iter().any(|r| !r.is_finite()) {
        return Err(RiskEngineError::invalid("returns", "returns must be finite"));
    }
    Ok(())
}

pub(crate) fn check_portfolio_value(portfolio_value: f64) -> RiskEngineResult<()> {
    if !(portfolio_value.is_finite() && portfolio_value > 0.0) {
        return Err(RiskEngineError::DegenerateWeights(format!(
            "portfolio value {} must be positive",
            portfolio_value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameters_validation() {
        assert!(VarParameters::new(0.95, 1).validate().is_ok());
        assert!(VarParameters::new(1.0, 1).validate().is_err());
        assert!(VarParameters::new(0.0, 1).validate().is_err());
        assert!(VarParameters::new(f64::NAN, 1).validate().is_err());
        assert!(VarParameters::new(0.99, 0).validate().is_err());
    }

    #[test]
    fn test_method_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&VarMethod::MonteCarlo).unwrap(),
            "\"monte_carlo\""
        );
        assert_eq!(VarMethod::MonteCarlo.to_string(), "monte_carlo");
    }

    #[test]
    fn test_short_series_is_insufficient() {
        assert!(matches!(
            check_series(&[], 30, "portfolio returns"),
            Err(RiskEngineError::InsufficientData { required: 30, available: 0, .. })
        ));
        assert!(check_series(&[0.01, f64::NAN], 2, "x").is_err());
    }
}
