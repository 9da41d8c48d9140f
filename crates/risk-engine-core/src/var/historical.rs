use std::time::Instant;
use tracing::debug;

use super::stats::{empirical_tail, sorted_copy, ReturnMoments};
use super::{check_portfolio_value, check_series, RiskResult, VarDiagnostics, VarMethod, VarParameters};
use crate::config::{HorizonScaling, RiskConfig};
use crate::error::RiskEngineError;
use crate::portfolio::{portfolio_returns, PortfolioWeights};
use crate::returns::ReturnMatrix;
use crate::types::*;
use crate::RiskEngineResult;

/// Empirical-quantile VaR over realized portfolio returns.
#[derive(Debug, Clone)]
pub struct HistoricalVarEngine {
    min_observations: usize,
    horizon_scaling: HorizonScaling,
}

impl Default for HistoricalVarEngine {
    fn default() -> Self {
        Self::from_config(&RiskConfig::default())
    }
}

impl HistoricalVarEngine {
    pub fn new(min_observations: usize, horizon_scaling: HorizonScaling) -> Self {
        Self {
            min_observations,
            horizon_scaling,
        }
    }

    pub fn from_config(config: &RiskConfig) -> Self {
        Self::new(config.returns.min_observations, config.historical.horizon_scaling)
    }

    pub fn calculate(
        &self,
        matrix: &ReturnMatrix,
        weights: &PortfolioWeights,
        params: &VarParameters,
    ) -> RiskEngineResult<ComputationOutput<RiskResult>> {
        let start = Instant::now();
        params.validate()?;
        let portfolio = portfolio_returns(matrix, weights)?;
        let (result, warnings) = self.estimate(&portfolio.returns, weights.total_value_f64(), params)?;
        let elapsed = start.elapsed().as_micros() as u64;
        Ok(self.wrap(result, params, warnings, elapsed))
    }

    pub fn calculate_from_returns(
        &self,
        returns: &[f64],
        portfolio_value: f64,
        params: &VarParameters,
    ) -> RiskEngineResult<ComputationOutput<RiskResult>> {
        let start = Instant::now();
        params.validate()?;
        let (result, warnings) = self.estimate(returns, portfolio_value, params)?;
        let elapsed = start.elapsed().as_micros() as u64;
        Ok(self.wrap(result, params, warnings, elapsed))
    }

    fn estimate(
        &self,
        returns: &[f64],
        portfolio_value: f64,
        params: &VarParameters,
    ) -> RiskEngineResult<(RiskResult, Vec<String>)> {
        check_series(returns, self.min_observations, "historical VaR return series")?;
        check_portfolio_value(portfolio_value)?;
        let mut warnings = Vec::new();

        let scenarios = horizon_returns(returns, params.horizon_days, self.horizon_scaling)?;
        if self.horizon_scaling == HorizonScaling::OverlappingWindows
            && scenarios.len() < self.min_observations
        {
            return Err(RiskEngineError::insufficient(
                format!("overlapping {}-day return windows", params.horizon_days),
                self.min_observations,
                scenarios.len(),
            ));
        }

        let sorted = sorted_copy(&scenarios);
        let tail = empirical_tail(&sorted, params.confidence_level);
        if let Some(w) = thin_tail_warning(tail.tail_observations, params.confidence_level) {
            warnings.push(w);
        }
        debug!(
            scenarios = sorted.len(),
            tail = tail.tail_observations,
            var_pct = tail.var,
            "historical VaR"
        );

        let worst_return = sorted.first().copied().unwrap_or(0.0);
        let best_return = sorted.last().copied().unwrap_or(0.0);
        let result = RiskResult::new(
            VarMethod::Historical,
            params,
            portfolio_value,
            tail.var,
            tail.cvar,
            returns.len(),
            VarDiagnostics::Historical {
                moments: ReturnMoments::of(returns),
                horizon_scaling: self.horizon_scaling,
                scenarios: sorted.len(),
                tail_observations: tail.tail_observations,
                worst_return,
                best_return,
            },
        );
        Ok((result, warnings))
    }

    fn wrap(
        &self,
        result: RiskResult,
        params: &VarParameters,
        warnings: Vec<String>,
        elapsed: u64,
    ) -> ComputationOutput<RiskResult> {
        let scaling = match self.horizon_scaling {
            HorizonScaling::SqrtTime => "one-day returns scaled by sqrt(horizon) (iid approximation)",
            HorizonScaling::OverlappingWindows => "compounded overlapping horizon-length windows",
        };
        with_metadata_f64(
            "Historical simulation VaR and Expected Shortfall",
            &serde_json::json!({
                "confidence_level": params.confidence_level,
                "horizon_days": params.horizon_days,
                "horizon_scaling": scaling,
                "quantile": "linear interpolation between order statistics",
                "expected_shortfall": "mean of returns at or below the VaR quantile",
            }),
            warnings,
            elapsed,
            result,
        )
    }
}

/// Scenario returns over the requested horizon.
fn horizon_returns(
    returns: &[f64],
    horizon_days: u32,
    scaling: HorizonScaling,
) -> RiskEngineResult<Vec<f64>> {
    let h = horizon_days as usize;
    if h <= 1 {
        return Ok(returns.to_vec());
    }
    match scaling {
        HorizonScaling::SqrtTime => {
            let factor = (h as f64).sqrt();
            Ok(returns.iter().map(|r| r * factor).collect())
        }
        HorizonScaling::OverlappingWindows => {
            if returns.len() < h {
                return Err(RiskEngineError::insufficient(
                    format!("overlapping {}-day return windows", h),
                    h,
                    returns.len(),
                ));
            }
            Ok(returns
                .windows(h)
                .map(|w| w.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0)
                .collect())
        }
    }
}

/// Flags tails too thin for a mean; wording follows the `empirical_tail` fallback.
fn thin_tail_warning(tail_observations: usize, confidence_level: f64) -> Option<String> {
    let tail_pct = (1.0 - confidence_level) * 100.0;
    match tail_observations {
        0 => Some(format!("No scenario in the {:.1}% tail: CVaR equals VaR", tail_pct)),
        1 => Some(format!(
            "Only 1 scenario in the {:.1}% tail: CVaR equals the single worst return",
            tail_pct
        )),
        _ => None,
    }
}
