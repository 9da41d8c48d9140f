use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::RiskEngineError;
use crate::stats::{covariance, mean, sample_std, sample_variance};
use crate::types::*;
use crate::RiskEngineResult;

fn default_periods_per_year() -> u32 {
    252
}

/// Input for portfolio performance metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceInput {
    /// Periodic portfolio returns (as decimals)
    pub returns: Vec<f64>,
    /// Annualised risk-free rate
    #[serde(default)]
    pub risk_free_rate: f64,
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: u32,
    /// Benchmark returns on the same observation dates, for beta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark_returns: Option<Vec<f64>>,
}

/// Output of portfolio performance metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceOutput {
    pub observations: usize,
    /// Mean periodic return compounded over a year
    pub annualised_return: f64,
    pub annualised_volatility: f64,
    pub sharpe_ratio: f64,
    /// `None` when there is no downside dispersion
    pub sortino_ratio: Option<f64>,
    /// Annualised standard deviation of negative returns
    pub downside_deviation: f64,
    /// Largest peak-to-trough decline, as a positive fraction
    pub max_drawdown: f64,
    pub beta: Option<f64>,
}

/// Annualised return, volatility, Sharpe, Sortino, drawdown and beta.
pub fn calculate_performance_metrics(
    input: &PerformanceInput,
) -> RiskEngineResult<ComputationOutput<PerformanceOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let n = input.returns.len();
    if n < 2 {
        return Err(RiskEngineError::insufficient(
            "performance metrics",
            2,
            n,
        ));
    }
    if input.returns.iter().any(|r| !r.is_finite()) {
        return Err(RiskEngineError::invalid("returns", "returns must be finite"));
    }
    if input.periods_per_year == 0 {
        return Err(RiskEngineError::invalid(
            "periods_per_year",
            "must be positive",
        ));
    }

    let periods = input.periods_per_year as f64;
    let mean_return = mean(&input.returns);
    let annualised_return = (1.0 + mean_return).powf(periods) - 1.0;
    let annualised_volatility = sample_std(&input.returns) * periods.sqrt();
    let excess = annualised_return - input.risk_free_rate;

    let sharpe_ratio = if annualised_volatility > 0.0 {
        excess / annualised_volatility
    } else {
        warnings.push("Zero volatility: Sharpe ratio reported as 0".into());
        0.0
    };

    let downside: Vec<f64> = input.returns.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_deviation = if downside.len() >= 2 {
        sample_std(&downside) * periods.sqrt()
    } else {
        0.0
    };
    let sortino_ratio = if downside_deviation > 0.0 {
        Some(excess / downside_deviation)
    } else {
        warnings.push("No downside dispersion: Sortino ratio undefined".into());
        None
    };

    let beta = match &input.benchmark_returns {
        Some(bench) => {
            if bench.len() != n {
                return Err(RiskEngineError::invalid(
                    "benchmark_returns",
                    format!("{} benchmark returns for {} portfolio returns", bench.len(), n),
                ));
            }
            let var_b = sample_variance(bench);
            if var_b > 0.0 {
                Some(covariance(&input.returns, bench) / var_b)
            } else {
                warnings.push("Benchmark has zero variance: beta undefined".into());
                None
            }
        }
        None => None,
    };

    let output = PerformanceOutput {
        observations: n,
        annualised_return,
        annualised_volatility,
        sharpe_ratio,
        sortino_ratio,
        downside_deviation,
        max_drawdown: max_drawdown(&input.returns),
        beta,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Portfolio Performance Metrics (Return, Volatility, Sharpe, Sortino, Drawdown, Beta)",
        &serde_json::json!({
            "observations": n,
            "periods_per_year": input.periods_per_year,
            "risk_free_rate": input.risk_free_rate,
            "annualisation": "geometric (1 + mean)^periods - 1",
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn max_drawdown(returns: &[f64]) -> f64 {
    let mut cumulative = 1.0;
    let mut peak = 1.0;
    let mut max_dd: f64 = 0.0;
    for r in returns {
        cumulative *= 1.0 + r;
        if cumulative > peak {
            peak = cumulative;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - cumulative) / peak);
        }
    }
    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_returns() -> Vec<f64> {
        vec![
            0.012, -0.008, 0.005, 0.010, -0.015, 0.007, 0.003, -0.004, 0.009, -0.002,
        ]
    }

    #[test]
    fn test_basic_metrics() {
        let out = calculate_performance_metrics(&PerformanceInput {
            returns: sample_returns(),
            risk_free_rate: 0.02,
            periods_per_year: 252,
            benchmark_returns: None,
        })
        .unwrap()
        .result;
        assert_eq!(out.observations, 10);
        assert!(out.annualised_volatility > 0.0);
        assert!(out.downside_deviation > 0.0);
        assert!(out.sortino_ratio.is_some());
        assert!(out.beta.is_none());
    }

    #[test]
    fn test_max_drawdown() {
        // 1.10 → 0.88 → 0.924 → 0.7854: trough 0.7854 vs peak 1.10
        let dd = max_drawdown(&[0.10, -0.20, 0.05, -0.15]);
        assert!((dd - (1.0 - 0.7854 / 1.10)).abs() < 1e-12, "drawdown {}", dd);
    }

    #[test]
    fn test_beta_of_scaled_benchmark() {
        let bench = sample_returns();
        let port: Vec<f64> = bench.iter().map(|r| 1.5 * r).collect();
        let out = calculate_performance_metrics(&PerformanceInput {
            returns: port,
            risk_free_rate: 0.0,
            periods_per_year: 252,
            benchmark_returns: Some(bench),
        })
        .unwrap()
        .result;
        let beta = out.beta.unwrap();
        assert!((beta - 1.5).abs() < 1e-12, "beta {}", beta);
    }

    #[test]
    fn test_no_downside_leaves_sortino_undefined() {
        let out = calculate_performance_metrics(&PerformanceInput {
            returns: vec![0.01, 0.02, 0.005],
            risk_free_rate: 0.0,
            periods_per_year: 252,
            benchmark_returns: None,
        })
        .unwrap();
        assert!(out.result.sortino_ratio.is_none());
        assert!(!out.warnings.is_empty());
    }

    #[test]
    fn test_rejects_short_and_mismatched_input() {
        assert!(calculate_performance_metrics(&PerformanceInput {
            returns: vec![0.01],
            risk_free_rate: 0.0,
            periods_per_year: 252,
            benchmark_returns: None,
        })
        .is_err());
        assert!(calculate_performance_metrics(&PerformanceInput {
            returns: sample_returns(),
            risk_free_rate: 0.0,
            periods_per_year: 252,
            benchmark_returns: Some(vec![0.01]),
        })
        .is_err());
    }
}
