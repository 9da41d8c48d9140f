use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Normal, StudentsT};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::covariance::{average_correlation, cholesky_regularized, quadratic_form, sample_covariance, Matrix};
use super::stats::{empirical_tail, quantile_sorted, sorted_copy, ReturnMoments};
use super::{
    check_portfolio_value, check_series, AssetVolatility, LossDistribution, RiskResult,
    SimulationDiagnostics, VarDiagnostics, VarMethod, VarParameters,
};
use crate::config::{InnovationDistribution, MonteCarloConfig, RiskConfig};
use crate::error::RiskEngineError;
use crate::portfolio::{portfolio_returns, PortfolioWeights};
use crate::returns::ReturnMatrix;
use crate::stats::mean;
use crate::types::*;
use crate::RiskEngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Per-request overrides of the configured simulation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonteCarloOptions {
    /// Clamped into the configured [min, max] range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_simulations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<InnovationDistribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degrees_of_freedom: Option<f64>,
    /// Fixing the seed makes results bit-identical across runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Correlated Monte Carlo VaR over the full asset covariance matrix.
#[derive(Debug, Clone)]
pub struct MonteCarloVarEngine {
    config: MonteCarloConfig,
    min_observations: usize,
    periods_per_year: f64,
    time_limit: Option<Duration>,
}

impl Default for MonteCarloVarEngine {
    fn default() -> Self {
        Self::from_config(&RiskConfig::default())
    }
}

/// Standardized (unit-variance) innovation sampler.
#[derive(Debug, Clone)]
enum Innovation {
    Normal(Normal),
    StudentT { dist: StudentsT, scale: f64 },
}

impl Innovation {
    fn new(distribution: InnovationDistribution, df: f64) -> RiskEngineResult<Self> {
        match distribution {
            InnovationDistribution::Normal => Normal::new(0.0, 1.0)
                .map(Innovation::Normal)
                .map_err(|e| RiskEngineError::invalid("distribution", format!("Invalid Normal parameters: {e}"))),
            InnovationDistribution::StudentT => {
                if df.is_nan() || df <= 2.0 {
                    return Err(RiskEngineError::invalid(
                        "degrees_of_freedom",
                        "Student-t degrees of freedom must exceed 2 for a finite variance",
                    ));
                }
                let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| {
                    RiskEngineError::invalid("distribution", format!("Invalid Student-t parameters: {e}"))
                })?;
                // Raw t variance is df / (df - 2)
                Ok(Innovation::StudentT {
                    dist,
                    scale: ((df - 2.0) / df).sqrt(),
                })
            }
        }
    }

    fn draw(&self, rng: &mut StdRng) -> f64 {
        match self {
            Innovation::Normal(n) => rng.sample(n),
            Innovation::StudentT { dist, scale } => rng.sample(dist) * scale,
        }
    }
}

/// Everything a batch needs to turn independent shocks into portfolio returns.
struct SimulationModel {
    lower: Matrix,
    /// Horizon-scaled mean returns
    drift: Vec<f64>,
    /// sqrt(horizon)
    shock_scale: f64,
    weights: Vec<f64>,
    innovation: Innovation,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl MonteCarloVarEngine {
    pub fn new(config: MonteCarloConfig, min_observations: usize, periods_per_year: u32) -> Self {
        Self {
            config,
            min_observations,
            periods_per_year: periods_per_year as f64,
            time_limit: None,
        }
    }

    pub fn from_config(config: &RiskConfig) -> Self {
        Self::new(
            config.monte_carlo.clone(),
            config.returns.min_observations,
            config.returns.trading_days_per_year,
        )
        .with_time_limit(config.limits.max_calculation_ms.map(Duration::from_millis))
    }

    /// Abort with `Timeout` once a run exceeds `limit`; checked between batches.
    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    pub fn calculate(
        &self,
        matrix: &ReturnMatrix,
        weights: &PortfolioWeights,
        params: &VarParameters,
        options: &MonteCarloOptions,
    ) -> RiskEngineResult<ComputationOutput<RiskResult>> {
        let aligned = portfolio_returns(matrix, weights)?.weights;
        self.run(
            matrix.symbols(),
            matrix.columns(),
            aligned,
            weights.total_value_f64(),
            params,
            options,
        )
    }

    /// Simulate a single return series as a one-asset portfolio.
    pub fn calculate_from_returns(
        &self,
        returns: &[f64],
        portfolio_value: f64,
        params: &VarParameters,
        options: &MonteCarloOptions,
    ) -> RiskEngineResult<ComputationOutput<RiskResult>> {
        self.run(
            &["PORTFOLIO".to_string()],
            &[returns.to_vec()],
            vec![1.0],
            portfolio_value,
            params,
            options,
        )
    }

    fn run(
        &self,
        symbols: &[String],
        columns: &[Vec<f64>],
        weights: Vec<f64>,
        portfolio_value: f64,
        params: &VarParameters,
        options: &MonteCarloOptions,
    ) -> RiskEngineResult<ComputationOutput<RiskResult>> {
        let start = Instant::now();
        let mut warnings: Vec<String> = Vec::new();

        params.validate()?;
        check_portfolio_value(portfolio_value)?;
        for col in columns {
            check_series(col, self.min_observations, "Monte Carlo return history")?;
        }
        let n_obs = columns.first().map_or(0, Vec::len);

        let requested = options.num_simulations.unwrap_or(self.config.num_simulations);
        let (num_simulations, clamp_warning) = self.config.clamp_simulations(requested);
        if let Some(w) = clamp_warning {
            warn!(requested, num_simulations, "simulation count clamped");
            warnings.push(w);
        }
        let distribution = options.distribution.unwrap_or(self.config.distribution);
        let df = options.degrees_of_freedom.unwrap_or(self.config.degrees_of_freedom);
        let innovation = Innovation::new(distribution, df)?;

        // Step 1: moments of the joint history
        let means: Vec<f64> = columns.iter().map(|c| mean(c)).collect();
        let cov = sample_covariance(columns);

        // Step 2: L·Lᵀ = Σ, one regularized retry
        let factor = cholesky_regularized(&cov, self.config.regularization_epsilon)?;
        if factor.regularized {
            warnings.push(format!(
                "Covariance matrix was not positive definite; diagonal regularized by {:e}",
                self.config.regularization_epsilon
            ));
        }

        let h = params.horizon();
        let model = SimulationModel {
            lower: factor.lower,
            drift: means.iter().map(|m| m * h).collect(),
            shock_scale: h.sqrt(),
            weights,
            innovation,
        };

        // Steps 3-5: seeded batches, independent of thread scheduling
        let batch_size = self.config.batch_size.max(1);
        let n_batches = (num_simulations as usize).div_ceil(batch_size);
        let mut master = match options.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let batch_seeds: Vec<u64> = (0..n_batches).map(|_| master.gen()).collect();

        let mut simulated = vec![0.0_f64; num_simulations as usize];
        simulated
            .par_chunks_mut(batch_size)
            .zip(batch_seeds.par_iter())
            .try_for_each(|(chunk, seed)| {
                self.check_deadline(start)?;
                simulate_batch(chunk, *seed, &model);
                Ok::<(), RiskEngineError>(())
            })?;
        debug!(
            num_simulations,
            batches = n_batches,
            assets = symbols.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Monte Carlo simulation complete"
        );

        // Step 6: empirical tail of the simulated distribution
        let sorted = sorted_copy(&simulated);
        let tail = empirical_tail(&sorted, params.confidence_level);

        let annualise = self.periods_per_year.sqrt();
        let diagnostics = SimulationDiagnostics {
            num_simulations,
            distribution,
            degrees_of_freedom: match distribution {
                InnovationDistribution::StudentT => Some(df),
                InnovationDistribution::Normal => None,
            },
            seed: options.seed,
            simulated: ReturnMoments::of(&simulated),
            regularized: factor.regularized,
            average_correlation: average_correlation(&cov),
            portfolio_volatility_annual: quadratic_form(&model.weights, &cov).max(0.0).sqrt() * annualise,
            asset_volatilities_annual: symbols
                .iter()
                .enumerate()
                .map(|(i, s)| AssetVolatility {
                    symbol: s.clone(),
                    volatility: cov[i][i].max(0.0).sqrt() * annualise,
                })
                .collect(),
            loss_distribution: loss_distribution(&sorted, portfolio_value),
        };

        let result = RiskResult::new(
            VarMethod::MonteCarlo,
            params,
            portfolio_value,
            tail.var,
            tail.cvar,
            n_obs,
            VarDiagnostics::MonteCarlo(diagnostics),
        );

        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata_f64(
            "Monte Carlo VaR and Expected Shortfall (Cholesky-correlated shocks)",
            &serde_json::json!({
                "num_simulations": num_simulations,
                "distribution": distribution,
                "degrees_of_freedom": df,
                "seed": options.seed,
                "confidence_level": params.confidence_level,
                "horizon_days": params.horizon_days,
                "model": "r = mu * h + L z * sqrt(h), z standardized to unit variance",
                "covariance": "sample (n - 1)",
            }),
            warnings,
            elapsed,
            result,
        ))
    }

    fn check_deadline(&self, start: Instant) -> RiskEngineResult<()> {
        if let Some(limit) = self.time_limit {
            let elapsed = start.elapsed();
            if elapsed >= limit {
                return Err(RiskEngineError::Timeout {
                    elapsed_ms: elapsed.as_millis() as u64,
                    limit_ms: limit.as_millis() as u64,
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Internal logic
// ---------------------------------------------------------------------------

fn simulate_batch(out: &mut [f64], seed: u64, model: &SimulationModel) {
    let mut rng = StdRng::seed_from_u64(seed);
    let k = model.drift.len();
    let mut z = vec![0.0; k];
    for slot in out.iter_mut() {
        for zi in z.iter_mut() {
            *zi = model.innovation.draw(&mut rng);
        }
        let mut portfolio = 0.0;
        for i in 0..k {
            let correlated: f64 = (0..=i).map(|j| model.lower[i][j] * z[j]).sum();
            let asset_return = model.drift[i] + model.shock_scale * correlated;
            portfolio += model.weights[i] * asset_return;
        }
        *slot = portfolio;
    }
}

fn loss_distribution(sorted_returns: &[f64], portfolio_value: f64) -> LossDistribution {
    let worst = sorted_returns.first().copied().unwrap_or(0.0);
    let best = sorted_returns.last().copied().unwrap_or(0.0);
    LossDistribution {
        min: -best * portfolio_value,
        max: -worst * portfolio_value,
        mean: -mean(sorted_returns) * portfolio_value,
        median: -quantile_sorted(sorted_returns, 0.5) * portfolio_value,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::portfolio_weights;
    use crate::var::ParametricVarEngine;
    use chrono::{Duration as Days, NaiveDate};
    use rust_decimal_macros::dec;

    const SEED: u64 = 42;

    fn equity(symbol: &str, quantity: rust_decimal::Decimal) -> Position {
        Position {
            symbol: symbol.into(),
            quantity,
            price: dec!(100),
            asset_class: AssetClass::Equity,
            sector: None,
            beta: None,
            duration: None,
            spread_duration: None,
        }
    }

    fn column(n: usize, freq: f64, amp: f64, drift: f64) -> Vec<f64> {
        (0..n)
            .map(|i| drift + amp * ((i as f64) * freq).sin())
            .collect()
    }

    fn matrix(symbols: &[&str], columns: Vec<Vec<f64>>) -> ReturnMatrix {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let n = columns[0].len();
        ReturnMatrix::new(
            (0..n).map(|i| start + Days::days(i as i64)).collect(),
            symbols.iter().map(|s| s.to_string()).collect(),
            columns,
        )
        .unwrap()
    }

    fn two_asset() -> (ReturnMatrix, PortfolioWeights) {
        let a = column(120, 1.1, 0.02, 0.0004);
        let b: Vec<f64> = a
            .iter()
            .enumerate()
            .map(|(i, x)| 0.5 * x + 0.008 * ((i as f64) * 2.3).cos())
            .collect();
        let m = matrix(&["AAPL", "MSFT"], vec![a, b]);
        let w = portfolio_weights(&[equity("AAPL", dec!(60)), equity("MSFT", dec!(40))]).unwrap();
        (m, w)
    }

    fn seeded(n: u32) -> MonteCarloOptions {
        MonteCarloOptions {
            num_simulations: Some(n),
            seed: Some(SEED),
            ..MonteCarloOptions::default()
        }
    }

    #[test]
    fn test_seeded_runs_are_bit_identical() {
        let (m, w) = two_asset();
        let engine = MonteCarloVarEngine::default();
        let params = VarParameters::new(0.99, 1);
        let a = engine.calculate(&m, &w, &params, &seeded(20_000)).unwrap().result;
        let b = engine.calculate(&m, &w, &params, &seeded(20_000)).unwrap().result;
        assert_eq!(a.var_percentage.to_bits(), b.var_percentage.to_bits());
        assert_eq!(a.cvar_percentage.to_bits(), b.cvar_percentage.to_bits());

        let other = MonteCarloOptions {
            seed: Some(SEED + 1),
            ..seeded(20_000)
        };
        let c = engine.calculate(&m, &w, &params, &other).unwrap().result;
        assert_ne!(a.var_percentage, c.var_percentage);
    }

    #[test]
    fn test_simulated_moments_match_inputs() {
        let (m, w) = two_asset();
        let out = MonteCarloVarEngine::default()
            .calculate(&m, &w, &VarParameters::new(0.95, 1), &seeded(50_000))
            .unwrap();
        let cov = sample_covariance(m.columns());
        let weights = w.aligned_to(m.symbols()).unwrap();
        let target_std = quadratic_form(&weights, &cov).sqrt();
        let target_mean: f64 = m
            .columns()
            .iter()
            .zip(&weights)
            .map(|(c, wi)| wi * mean(c))
            .sum();
        let VarDiagnostics::MonteCarlo(diag) = &out.result.diagnostics else {
            panic!("expected Monte Carlo diagnostics");
        };
        assert!(
            (diag.simulated.std_dev / target_std - 1.0).abs() < 0.03,
            "simulated std {} vs {}",
            diag.simulated.std_dev,
            target_std
        );
        assert!((diag.simulated.mean - target_mean).abs() < 0.05 * target_std);
        assert_eq!(diag.num_simulations, 50_000);
        assert!(diag.average_correlation.unwrap() > 0.5);
        assert_eq!(diag.asset_volatilities_annual.len(), 2);
        assert!(diag.loss_distribution.max >= diag.loss_distribution.min);
        assert!(!diag.regularized);
    }

    #[test]
    fn test_normal_simulation_close_to_parametric() {
        let (m, w) = two_asset();
        let params = VarParameters::new(0.95, 1);
        let mc = MonteCarloVarEngine::default()
            .calculate(&m, &w, &params, &seeded(50_000))
            .unwrap()
            .result;
        let pv = ParametricVarEngine::default().calculate(&m, &w, &params).unwrap().result;
        let rel = (mc.var_percentage / pv.var_percentage - 1.0).abs();
        assert!(rel < 0.05, "MC {} vs parametric {}", mc.var_percentage, pv.var_percentage);
    }

    #[test]
    fn test_student_t_is_unit_variance_and_fat_tailed() {
        let (m, w) = two_asset();
        let params = VarParameters::new(0.99, 1);
        let engine = MonteCarloVarEngine::default();
        let t_opts = MonteCarloOptions {
            distribution: Some(InnovationDistribution::StudentT),
            degrees_of_freedom: Some(5.0),
            ..seeded(100_000)
        };
        let t = engine.calculate(&m, &w, &params, &t_opts).unwrap().result;
        let n = engine.calculate(&m, &w, &params, &seeded(100_000)).unwrap().result;
        let (VarDiagnostics::MonteCarlo(td), VarDiagnostics::MonteCarlo(nd)) = (&t.diagnostics, &n.diagnostics) else {
            panic!("expected Monte Carlo diagnostics");
        };
        assert!((td.simulated.std_dev / nd.simulated.std_dev - 1.0).abs() < 0.05);
        assert!(td.simulated.kurtosis > 1.0, "t kurtosis {}", td.simulated.kurtosis);
        assert!(nd.simulated.kurtosis.abs() < 0.2, "normal kurtosis {}", nd.simulated.kurtosis);
        assert_eq!(td.degrees_of_freedom, Some(5.0));
        assert_eq!(nd.degrees_of_freedom, None);
    }

    #[test]
    fn test_single_asset_matrix_matches_series() {
        let col = column(90, 0.8, 0.015, 0.0002);
        let m = matrix(&["AAPL"], vec![col.clone()]);
        let w = portfolio_weights(&[equity("AAPL", dec!(100))]).unwrap();
        let params = VarParameters::new(0.95, 10);
        let engine = MonteCarloVarEngine::default();
        let a = engine.calculate(&m, &w, &params, &seeded(10_000)).unwrap().result;
        let b = engine
            .calculate_from_returns(&col, w.total_value_f64(), &params, &seeded(10_000))
            .unwrap()
            .result;
        assert_eq!(a.var_percentage.to_bits(), b.var_percentage.to_bits());
        assert_eq!(a.cvar_percentage.to_bits(), b.cvar_percentage.to_bits());
        let VarDiagnostics::MonteCarlo(diag) = &a.diagnostics else {
            panic!("expected Monte Carlo diagnostics");
        };
        assert!(diag.average_correlation.is_none());
    }

    #[test]
    fn test_simulation_count_is_clamped() {
        let (m, w) = two_asset();
        let out = MonteCarloVarEngine::default()
            .calculate(&m, &w, &VarParameters::default(), &seeded(10))
            .unwrap();
        let VarDiagnostics::MonteCarlo(diag) = &out.result.diagnostics else {
            panic!("expected Monte Carlo diagnostics");
        };
        assert_eq!(diag.num_simulations, 10_000);
        assert!(out.warnings.iter().any(|w| w.contains("below minimum")));
    }

    #[test]
    fn test_flat_asset_triggers_regularization() {
        let a = column(60, 1.1, 0.02, 0.0);
        let m = matrix(&["AAPL", "CASHLIKE"], vec![a, vec![0.0; 60]]);
        let w = portfolio_weights(&[equity("AAPL", dec!(50)), equity("CASHLIKE", dec!(50))]).unwrap();
        let out = MonteCarloVarEngine::default()
            .calculate(&m, &w, &VarParameters::default(), &seeded(10_000))
            .unwrap();
        let VarDiagnostics::MonteCarlo(diag) = &out.result.diagnostics else {
            panic!("expected Monte Carlo diagnostics");
        };
        assert!(diag.regularized);
        assert!(out.warnings.iter().any(|w| w.contains("regularized")));
    }

    #[test]
    fn test_timeout_is_reported() {
        let (m, w) = two_asset();
        let engine = MonteCarloVarEngine::default().with_time_limit(Some(Duration::ZERO));
        let err = engine
            .calculate(&m, &w, &VarParameters::default(), &seeded(10_000))
            .unwrap_err();
        assert!(matches!(err, RiskEngineError::Timeout { limit_ms: 0, .. }));
    }

    #[test]
    fn test_rejects_low_degrees_of_freedom() {
        let (m, w) = two_asset();
        let opts = MonteCarloOptions {
            distribution: Some(InnovationDistribution::StudentT),
            degrees_of_freedom: Some(2.0),
            ..seeded(10_000)
        };
        assert!(matches!(
            MonteCarloVarEngine::default().calculate(&m, &w, &VarParameters::default(), &opts),
            Err(RiskEngineError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_empty_history_is_insufficient() {
        assert!(matches!(
            MonteCarloVarEngine::default().calculate_from_returns(
                &[],
                1_000.0,
                &VarParameters::default(),
                &seeded(10_000)
            ),
            Err(RiskEngineError::InsufficientData { .. })
        ));
    }
}
