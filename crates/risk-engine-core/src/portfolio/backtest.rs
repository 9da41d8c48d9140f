use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::performance::{calculate_performance_metrics, PerformanceInput, PerformanceOutput};
use super::weighting::PortfolioWeights;
use crate::error::RiskEngineError;
use crate::returns::ReturnMatrix;
use crate::types::*;
use crate::RiskEngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// When drifted holdings are reset to their target weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
    /// Buy and hold: weights drift with prices
    #[default]
    None,
    Monthly,
    Quarterly,
    Yearly,
}

impl RebalanceFrequency {
    /// True when `date` is the last observation of its period, given the next one.
    fn ends_period(self, date: NaiveDate, next: NaiveDate) -> bool {
        match self {
            RebalanceFrequency::None => false,
            RebalanceFrequency::Monthly => (date.year(), date.month()) != (next.year(), next.month()),
            RebalanceFrequency::Quarterly => {
                (date.year(), date.month0() / 3) != (next.year(), next.month0() / 3)
            }
            RebalanceFrequency::Yearly => date.year() != next.year(),
        }
    }
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebalanceFrequency::None => "none",
            RebalanceFrequency::Monthly => "monthly",
            RebalanceFrequency::Quarterly => "quarterly",
            RebalanceFrequency::Yearly => "yearly",
        };
        f.write_str(name)
    }
}

/// Settings of one historical simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestOptions {
    pub rebalance: RebalanceFrequency,
    /// Annualised risk-free rate for Sharpe and Sortino
    pub risk_free_rate: f64,
    pub periods_per_year: u32,
    /// Portfolio value before the first return
    pub starting_value: f64,
}

impl Default for BacktestOptions {
    fn default() -> Self {
        Self {
            rebalance: RebalanceFrequency::None,
            risk_free_rate: 0.0,
            periods_per_year: 252,
            starting_value: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatedValue {
    pub date: NaiveDate,
    pub value: f64,
}

/// Buy-and-hold growth of a benchmark over the same dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub symbol: String,
    pub total_return: f64,
    pub cagr: f64,
    /// Portfolio CAGR minus benchmark CAGR
    pub relative_cagr: f64,
    pub equity_curve: Vec<DatedValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub rebalance: RebalanceFrequency,
    pub observations: usize,
    pub rebalances: usize,
    pub starting_value: f64,
    pub ending_value: f64,
    pub total_return: f64,
    /// Compound annual growth over `observations / periods_per_year` years
    pub cagr: f64,
    /// CAGR over maximum drawdown; `None` without a drawdown
    pub calmar_ratio: Option<f64>,
    /// Calendar-year returns, each measured from the previous year's close
    pub annual_returns: BTreeMap<i32, f64>,
    pub metrics: PerformanceOutput,
    pub equity_curve: Vec<DatedValue>,
    /// Equity over its running peak minus one (zero or negative)
    pub drawdown: Vec<DatedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<BenchmarkComparison>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Replay `matrix` against target `weights`, rebalancing on period ends.
///
/// Holdings drift with their own returns between rebalances. A rebalance
/// happens after the close of the last observation in each period, so the
/// final observation never triggers one. `benchmark` returns must share the
/// matrix dates.
pub fn run_backtest(
    matrix: &ReturnMatrix,
    weights: &PortfolioWeights,
    options: &BacktestOptions,
    benchmark: Option<(&str, &[f64])>,
) -> RiskEngineResult<ComputationOutput<BacktestResult>> {
    let start = Instant::now();
    let n = matrix.n_obs();
    if n < 2 {
        return Err(RiskEngineError::insufficient("backtest return history", 2, n));
    }
    if !(options.starting_value.is_finite() && options.starting_value > 0.0) {
        return Err(RiskEngineError::invalid(
            "starting_value",
            "starting value must be positive",
        ));
    }
    if options.periods_per_year == 0 {
        return Err(RiskEngineError::invalid("periods_per_year", "must be positive"));
    }
    let target = weights.aligned_to(matrix.symbols())?;
    let dates = matrix.dates();

    let (equity, rebalances) = simulate(matrix, &target, options)?;
    let returns = period_returns(options.starting_value, &equity);

    let bench_returns = match benchmark {
        Some((symbol, series)) if series.len() != n => {
            return Err(RiskEngineError::invalid(
                "benchmark",
                format!("{} returns for '{}' against {} portfolio returns", series.len(), symbol, n),
            ));
        }
        Some((_, series)) => Some(series.to_vec()),
        None => None,
    };
    let metrics_out = calculate_performance_metrics(&PerformanceInput {
        returns,
        risk_free_rate: options.risk_free_rate,
        periods_per_year: options.periods_per_year,
        benchmark_returns: bench_returns,
    })?;
    let mut warnings = metrics_out.warnings;
    let metrics = metrics_out.result;

    let years = n as f64 / options.periods_per_year as f64;
    let ending_value = equity[n - 1];
    let total_return = ending_value / options.starting_value - 1.0;
    let cagr = annualise(total_return, years);
    let calmar_ratio = (metrics.max_drawdown > 0.0).then(|| cagr / metrics.max_drawdown);
    if calmar_ratio.is_none() {
        warnings.push("No drawdown over the backtest: Calmar ratio undefined".into());
    }
    if years < 1.0 {
        warnings.push(format!(
            "Backtest covers {:.2} year(s): CAGR extrapolates a partial year",
            years
        ));
    }

    let benchmark = match benchmark {
        Some((symbol, series)) => {
            let curve = compound(options.starting_value, series);
            let bench_total = curve[n - 1] / options.starting_value - 1.0;
            let bench_cagr = annualise(bench_total, years);
            Some(BenchmarkComparison {
                symbol: symbol.to_string(),
                total_return: bench_total,
                cagr: bench_cagr,
                relative_cagr: cagr - bench_cagr,
                equity_curve: dated(dates, &curve),
            })
        }
        None => None,
    };

    debug!(
        observations = n,
        rebalances,
        rebalance = %options.rebalance,
        total_return,
        "backtest complete"
    );

    let result = BacktestResult {
        rebalance: options.rebalance,
        observations: n,
        rebalances,
        starting_value: options.starting_value,
        ending_value,
        total_return,
        cagr,
        calmar_ratio,
        annual_returns: annual_returns(dates, options.starting_value, &equity),
        metrics,
        drawdown: dated(dates, &drawdowns(options.starting_value, &equity)),
        equity_curve: dated(dates, &equity),
        benchmark,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Historical portfolio backtest with periodic rebalancing to target weights",
        &serde_json::json!({
            "rebalance": options.rebalance,
            "rebalance_timing": "after the close of the last observation in each period",
            "periods_per_year": options.periods_per_year,
            "risk_free_rate": options.risk_free_rate,
            "cagr": "(ending / starting)^(periods_per_year / observations) - 1",
        }),
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Internal logic
// ---------------------------------------------------------------------------

/// Portfolio value after each observation, and the number of rebalances.
fn simulate(
    matrix: &ReturnMatrix,
    target: &[f64],
    options: &BacktestOptions,
) -> RiskEngineResult<(Vec<f64>, usize)> {
    let dates = matrix.dates();
    let columns = matrix.columns();
    let n = matrix.n_obs();
    let mut sleeves: Vec<f64> = target.iter().map(|w| w * options.starting_value).collect();
    let mut equity = Vec::with_capacity(n);
    let mut rebalances = 0;

    for t in 0..n {
        for (sleeve, column) in sleeves.iter_mut().zip(columns) {
            *sleeve *= 1.0 + column[t];
        }
        let value: f64 = sleeves.iter().sum();
        if !(value.is_finite() && value > 0.0) {
            return Err(RiskEngineError::DegenerateWeights(format!(
                "portfolio value fell to {} on {}",
                value, dates[t]
            )));
        }
        equity.push(value);

        if t + 1 < n && options.rebalance.ends_period(dates[t], dates[t + 1]) {
            for (sleeve, w) in sleeves.iter_mut().zip(target) {
                *sleeve = w * value;
            }
            rebalances += 1;
        }
    }
    Ok((equity, rebalances))
}

fn period_returns(starting_value: f64, equity: &[f64]) -> Vec<f64> {
    std::iter::once(starting_value)
        .chain(equity.iter().copied())
        .collect::<Vec<f64>>()
        .windows(2)
        .map(|pair| pair[1] / pair[0] - 1.0)
        .collect()
}

fn compound(starting_value: f64, returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(starting_value, |value, r| {
            *value *= 1.0 + r;
            Some(*value)
        })
        .collect()
}

fn annualise(total_return: f64, years: f64) -> f64 {
    (1.0 + total_return).powf(1.0 / years) - 1.0
}

fn drawdowns(starting_value: f64, equity: &[f64]) -> Vec<f64> {
    let mut peak = starting_value;
    equity
        .iter()
        .map(|value| {
            peak = peak.max(*value);
            value / peak - 1.0
        })
        .collect()
}

fn annual_returns(dates: &[NaiveDate], starting_value: f64, equity: &[f64]) -> BTreeMap<i32, f64> {
    let mut year_end: BTreeMap<i32, f64> = BTreeMap::new();
    for (date, value) in dates.iter().zip(equity) {
        year_end.insert(date.year(), *value);
    }
    let mut base = starting_value;
    year_end
        .into_iter()
        .map(|(year, close)| {
            let r = close / base - 1.0;
            base = close;
            (year, r)
        })
        .collect()
}

fn dated(dates: &[NaiveDate], values: &[f64]) -> Vec<DatedValue> {
    dates
        .iter()
        .zip(values)
        .map(|(date, value)| DatedValue {
            date: *date,
            value: *value,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
