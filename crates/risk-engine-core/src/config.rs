//! Engine configuration.
//!
//! Every knob has a default matching production behaviour, so an empty TOML
//! document (or `RiskConfig::default()`) is a valid configuration. Callers that
//! load configuration from files must call [`RiskConfig::validate`] before use.

use serde::{Deserialize, Serialize};

use crate::error::RiskEngineError;
use crate::RiskEngineResult;

/// How periodic returns are derived from consecutive closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMethod {
    /// p_t / p_{t-1} - 1
    #[default]
    Simple,
    /// ln(p_t / p_{t-1})
    Log,
}

/// How single-period historical returns are stretched to a multi-day horizon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizonScaling {
    /// Multiply each one-period return by sqrt(horizon). An iid approximation,
    /// not exact for autocorrelated returns.
    #[default]
    SqrtTime,
    /// Compound every overlapping window of `horizon` consecutive returns.
    OverlappingWindows,
}

/// Return distribution for Monte Carlo shocks and the parametric model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InnovationDistribution {
    #[default]
    Normal,
    /// Student-t rescaled to unit variance
    StudentT,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReturnConfig {
    pub method: ReturnMethod,
    pub trading_days_per_year: u32,
    /// Hard floor on aligned observations, regardless of lookback
    pub min_observations: usize,
    /// Share of the nominal lookback window that must be present
    pub min_history_coverage: f64,
    pub min_lookback_years: u32,
    pub max_lookback_years: u32,
}

impl Default for ReturnConfig {
    fn default() -> Self {
        Self {
            method: ReturnMethod::Simple,
            trading_days_per_year: 252,
            min_observations: 30,
            min_history_coverage: 0.8,
            min_lookback_years: 1,
            max_lookback_years: 20,
        }
    }
}

impl ReturnConfig {
    /// Nominal number of returns in a lookback window (252 × years).
    pub fn window_len(&self, lookback_years: u32) -> usize {
        self.trading_days_per_year as usize * lookback_years as usize
    }

    /// Minimum aligned returns required for a lookback window.
    pub fn required_observations(&self, lookback_years: u32) -> usize {
        let nominal = self.window_len(lookback_years) as f64 * self.min_history_coverage;
        (nominal.ceil() as usize).max(self.min_observations)
    }

    /// Clamp a requested lookback into the supported range, returning a
    /// warning when the request was adjusted.
    pub fn clamp_lookback(&self, lookback_years: u32) -> (u32, Option<String>) {
        if lookback_years < self.min_lookback_years {
            (
                self.min_lookback_years,
                Some(format!(
                    "Lookback of {} year(s) below minimum; using {} year(s)",
                    lookback_years, self.min_lookback_years
                )),
            )
        } else if lookback_years > self.max_lookback_years {
            (
                self.max_lookback_years,
                Some(format!(
                    "Lookback of {} years above maximum; using {} years",
                    lookback_years, self.max_lookback_years
                )),
            )
        } else {
            (lookback_years, None)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalConfig {
    pub horizon_scaling: HorizonScaling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub num_simulations: u32,
    pub min_simulations: u32,
    pub max_simulations: u32,
    pub distribution: InnovationDistribution,
    pub degrees_of_freedom: f64,
    /// Added to the covariance diagonal on the single Cholesky retry
    pub regularization_epsilon: f64,
    /// Draws per parallel batch; each batch owns a seeded RNG
    pub batch_size: usize,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            num_simulations: 10_000,
            min_simulations: 10_000,
            max_simulations: 500_000,
            distribution: InnovationDistribution::Normal,
            degrees_of_freedom: 5.0,
            regularization_epsilon: 1e-8,
            batch_size: 2_048,
        }
    }
}

impl MonteCarloConfig {
    /// Clamp a requested simulation count into `[min, max]`.
    pub fn clamp_simulations(&self, requested: u32) -> (u32, Option<String>) {
        if requested < self.min_simulations {
            (
                self.min_simulations,
                Some(format!(
                    "{} simulations below minimum; using {}",
                    requested, self.min_simulations
                )),
            )
        } else if requested > self.max_simulations {
            (
                self.max_simulations,
                Some(format!(
                    "{} simulations above maximum; using {}",
                    requested, self.max_simulations
                )),
            )
        } else {
            (requested, None)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Wall-clock bound for a single calculation; `None` disables the check
    pub max_calculation_ms: Option<u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_calculation_ms: Some(60_000),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub returns: ReturnConfig,
    pub historical: HistoricalConfig,
    pub monte_carlo: MonteCarloConfig,
    pub limits: LimitsConfig,
}

impl RiskConfig {
    pub fn validate(&self) -> RiskEngineResult<()> {
        let r = &self.returns;
        if r.trading_days_per_year == 0 {
            return Err(RiskEngineError::invalid(
                "returns.trading_days_per_year",
                "must be positive",
            ));
        }
        if r.min_observations < 3 {
            return Err(RiskEngineError::invalid(
                "returns.min_observations",
                "hard floor must be at least 3 observations",
            ));
        }
        if !(r.min_history_coverage > 0.0 && r.min_history_coverage <= 1.0) {
            return Err(RiskEngineError::invalid(
                "returns.min_history_coverage",
                "must be in (0, 1]",
            ));
        }
        if r.min_lookback_years == 0 || r.min_lookback_years > r.max_lookback_years {
            return Err(RiskEngineError::invalid(
                "returns.min_lookback_years",
                "must be at least 1 and not exceed max_lookback_years",
            ));
        }

        let mc = &self.monte_carlo;
        if mc.min_simulations == 0 || mc.min_simulations > mc.max_simulations {
            return Err(RiskEngineError::invalid(
                "monte_carlo.min_simulations",
                "must be positive and not exceed max_simulations",
            ));
        }
        if mc.num_simulations < mc.min_simulations || mc.num_simulations > mc.max_simulations {
            return Err(RiskEngineError::invalid(
                "monte_carlo.num_simulations",
                format!(
                    "default must lie within [{}, {}]",
                    mc.min_simulations, mc.max_simulations
                ),
            ));
        }
        if mc.degrees_of_freedom.is_nan() || mc.degrees_of_freedom <= 2.0 {
            return Err(RiskEngineError::invalid(
                "monte_carlo.degrees_of_freedom",
                "must exceed 2 for a finite variance",
            ));
        }
        if mc.regularization_epsilon.is_nan() || mc.regularization_epsilon <= 0.0 {
            return Err(RiskEngineError::invalid(
                "monte_carlo.regularization_epsilon",
                "must be positive",
            ));
        }
        if mc.batch_size == 0 {
            return Err(RiskEngineError::invalid(
                "monte_carlo.batch_size",
                "must be positive",
            ));
        }

        if self.limits.max_calculation_ms == Some(0) {
            return Err(RiskEngineError::invalid(
                "limits.max_calculation_ms",
                "must be positive when set",
            ));
        }
        Ok(())
    }
}
