use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal, StudentsT};
use std::time::Instant;
use tracing::debug;

use super::covariance::{mat_vec, quadratic_form, sample_covariance};
use super::stats::ReturnMoments;
use super::{check_portfolio_value, check_series, RiskResult, VarDiagnostics, VarMethod, VarParameters};
use crate::config::{InnovationDistribution, RiskConfig};
use crate::error::RiskEngineError;
use crate::portfolio::{portfolio_returns, PortfolioWeights};
use crate::returns::ReturnMatrix;
use crate::types::*;
use crate::RiskEngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One asset's share of the parametric volatility term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentVar {
    pub symbol: String,
    pub weight: f64,
    /// ∂VaR/∂w_i as a fraction of portfolio value
    pub marginal_var: f64,
    /// Currency amount; components sum to z·σ_p·√h·V
    pub component_var: f64,
    pub contribution_pct: f64,
}

/// Variance-covariance VaR under normal or Student-t returns.
#[derive(Debug, Clone)]
pub struct ParametricVarEngine {
    min_observations: usize,
    distribution: InnovationDistribution,
    /// Fixed Student-t degrees of freedom; estimated from kurtosis when absent
    degrees_of_freedom: Option<f64>,
}

/// Bounds on degrees of freedom estimated from sample kurtosis.
const MIN_ESTIMATED_DF: f64 = 4.1;
const MAX_ESTIMATED_DF: f64 = 30.0;

impl Default for ParametricVarEngine {
    fn default() -> Self {
        Self::from_config(&RiskConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl ParametricVarEngine {
    pub fn new(min_observations: usize) -> Self {
        Self {
            min_observations,
            distribution: InnovationDistribution::Normal,
            degrees_of_freedom: None,
        }
    }

    /// Switch the return model; `degrees_of_freedom` only applies to Student-t.
    pub fn with_distribution(
        mut self,
        distribution: InnovationDistribution,
        degrees_of_freedom: Option<f64>,
    ) -> Self {
        self.distribution = distribution;
        self.degrees_of_freedom = degrees_of_freedom;
        self
    }

    pub fn from_config(config: &RiskConfig) -> Self {
        Self::new(config.returns.min_observations)
    }

    /// VaR of a weighted portfolio, with component VaR per asset.
    pub fn calculate(
        &self,
        matrix: &ReturnMatrix,
        weights: &PortfolioWeights,
        params: &VarParameters,
    ) -> RiskEngineResult<ComputationOutput<RiskResult>> {
        let start = Instant::now();
        params.validate()?;
        let portfolio = portfolio_returns(matrix, weights)?;
        let value = weights.total_value_f64();
        let (mut result, mut warnings, z) = self.estimate(&portfolio.returns, value, params)?;

        let components = component_var(matrix, &portfolio.weights, z, params.horizon(), value);
        if components.is_none() {
            warnings.push("Portfolio variance is zero: component VaR not reported".into());
        }
        if let VarDiagnostics::Parametric { component_var, .. } = &mut result.diagnostics {
            *component_var = components;
        }

        let elapsed = start.elapsed().as_micros() as u64;
        Ok(wrap(result, params, warnings, elapsed))
    }

    /// VaR of a bare portfolio return series.
    pub fn calculate_from_returns(
        &self,
        returns: &[f64],
        portfolio_value: f64,
        params: &VarParameters,
    ) -> RiskEngineResult<ComputationOutput<RiskResult>> {
        let start = Instant::now();
        params.validate()?;
        let (result, warnings, _) = self.estimate(returns, portfolio_value, params)?;
        let elapsed = start.elapsed().as_micros() as u64;
        Ok(wrap(result, params, warnings, elapsed))
    }

    fn estimate(
        &self,
        returns: &[f64],
        portfolio_value: f64,
        params: &VarParameters,
    ) -> RiskEngineResult<(RiskResult, Vec<String>, f64)> {
        check_series(returns, self.min_observations, "parametric VaR return series")?;
        check_portfolio_value(portfolio_value)?;

        let moments = ReturnMoments::of(returns);
        // Normality warnings only concern the normal model
        let mut warnings = match self.distribution {
            InnovationDistribution::Normal => moments.normality_warnings(),
            InnovationDistribution::StudentT => Vec::new(),
        };
        if moments.std_dev == 0.0 {
            warnings.push("Return series has zero volatility".into());
        }

        let tail = match self.distribution {
            InnovationDistribution::Normal => normal_tail(moments.mean, moments.std_dev, params)?,
            InnovationDistribution::StudentT => {
                let df = match self.degrees_of_freedom {
                    Some(df) => df,
                    None => {
                        let df = estimate_degrees_of_freedom(moments.kurtosis);
                        warnings.push(format!(
                            "Student-t degrees of freedom estimated from excess kurtosis {:.2}: {:.2}",
                            moments.kurtosis, df
                        ));
                        df
                    }
                };
                student_t_tail(moments.mean, moments.std_dev, df, params)?
            }
        };
        debug!(
            z = tail.z,
            df = ?tail.degrees_of_freedom,
            mean = moments.mean,
            std_dev = moments.std_dev,
            var_pct = tail.var_pct,
            "parametric VaR"
        );

        let result = RiskResult::new(
            VarMethod::Parametric,
            params,
            portfolio_value,
            tail.var_pct,
            tail.cvar_pct,
            returns.len(),
            VarDiagnostics::Parametric {
                moments,
                distribution: self.distribution,
                degrees_of_freedom: tail.degrees_of_freedom,
                z_score: tail.z,
                component_var: None,
            },
        );
        Ok((result, warnings, tail.z))
    }
}

// ---------------------------------------------------------------------------
// Internal logic
// ---------------------------------------------------------------------------

struct ParametricTail {
    /// Loss quantile in standard deviations
    z: f64,
    var_pct: f64,
    cvar_pct: f64,
    degrees_of_freedom: Option<f64>,
}

fn standard_normal() -> RiskEngineResult<Normal> {
    Normal::new(0.0, 1.0).map_err(|e| RiskEngineError::invalid("distribution", e.to_string()))
}

/// VaR = z·σ·√h − μ·h; CVaR = σ·√h·φ(z)/(1−α) − μ·h.
fn normal_tail(mean: f64, std_dev: f64, params: &VarParameters) -> RiskEngineResult<ParametricTail> {
    let normal = standard_normal()?;
    let alpha = params.confidence_level;
    let z = normal.inverse_cdf(alpha);
    let h = params.horizon();
    let sigma_h = std_dev * h.sqrt();
    let drift = mean * h;
    Ok(ParametricTail {
        z,
        var_pct: z * sigma_h - drift,
        cvar_pct: sigma_h * normal.pdf(z) / (1.0 - alpha) - drift,
        degrees_of_freedom: None,
    })
}

/// Student-t rescaled to the sample variance, so σ keeps its meaning.
///
/// With t = T⁻¹(α; ν) and k = √((ν−2)/ν):
/// VaR = k·t·σ·√h − μ·h; CVaR = k·f(t)·(ν + t²)/((ν−1)(1−α))·σ·√h − μ·h.
fn student_t_tail(
    mean: f64,
    std_dev: f64,
    df: f64,
    params: &VarParameters,
) -> RiskEngineResult<ParametricTail> {
    if !(df.is_finite() && df > 2.0) {
        return Err(RiskEngineError::invalid(
            "degrees_of_freedom",
            format!("Student-t needs more than 2 degrees of freedom for a finite variance, got {}", df),
        ));
    }
    let t_dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| RiskEngineError::invalid("degrees_of_freedom", e.to_string()))?;
    let alpha = params.confidence_level;
    let t = t_dist.inverse_cdf(alpha);
    let k = ((df - 2.0) / df).sqrt();
    let h = params.horizon();
    let sigma_h = std_dev * h.sqrt();
    let drift = mean * h;
    let shortfall = k * t_dist.pdf(t) * (df + t * t) / ((df - 1.0) * (1.0 - alpha));
    Ok(ParametricTail {
        z: k * t,
        var_pct: k * t * sigma_h - drift,
        cvar_pct: shortfall * sigma_h - drift,
        degrees_of_freedom: Some(df),
    })
}

/// Method of moments: excess kurtosis of Student-t is 6/(ν−4).
///
/// Thin or normal tails map to the upper bound.
fn estimate_degrees_of_freedom(excess_kurtosis: f64) -> f64 {
    if excess_kurtosis > 0.0 {
        (4.0 + 6.0 / excess_kurtosis).clamp(MIN_ESTIMATED_DF, MAX_ESTIMATED_DF)
    } else {
        MAX_ESTIMATED_DF
    }
}

/// Euler allocation of the volatility term across assets.
fn component_var(
    matrix: &ReturnMatrix,
    weights: &[f64],
    z: f64,
    horizon: f64,
    portfolio_value: f64,
) -> Option<Vec<ComponentVar>> {
    let cov = sample_covariance(matrix.columns());
    let sigma_p = quadratic_form(weights, &cov).sqrt();
    if sigma_p.is_nan() || sigma_p <= 0.0 {
        return None;
    }
    let scale = z * horizon.sqrt();
    let total = sigma_p * scale * portfolio_value;
    let sigma_w = mat_vec(&cov, weights);

    Some(
        matrix
            .symbols()
            .iter()
            .zip(weights)
            .zip(sigma_w)
            .map(|((symbol, w), sw)| {
                let marginal_var = sw / sigma_p * scale;
                let component = w * marginal_var * portfolio_value;
                ComponentVar {
                    symbol: symbol.clone(),
                    weight: *w,
                    marginal_var,
                    component_var: component,
                    contribution_pct: if total != 0.0 { component / total } else { 0.0 },
                }
            })
            .collect(),
    )
}

fn wrap(
    result: RiskResult,
    params: &VarParameters,
    warnings: Vec<String>,
    elapsed: u64,
) -> ComputationOutput<RiskResult> {
    let (distribution, degrees_of_freedom) = match &result.diagnostics {
        VarDiagnostics::Parametric {
            distribution,
            degrees_of_freedom,
            ..
        } => (*distribution, *degrees_of_freedom),
        _ => (InnovationDistribution::Normal, None),
    };
    with_metadata_f64(
        "Parametric (variance-covariance) VaR and Expected Shortfall",
        &serde_json::json!({
            "distribution": distribution,
            "degrees_of_freedom": degrees_of_freedom,
            "student_t_scaling": "rescaled to unit variance",
            "confidence_level": params.confidence_level,
            "horizon_days": params.horizon_days,
            "horizon_scaling": "sigma * sqrt(horizon), mean * horizon (iid approximation)",
            "std_dev": "sample (n - 1)",
        }),
        warnings,
        elapsed,
        result,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
