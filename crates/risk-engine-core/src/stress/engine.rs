use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::factors::{StressFactor, StressScenario};
use super::sensitivity::SensitivityTable;
use crate::error::RiskEngineError;
use crate::types::*;
use crate::RiskEngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Stress outcome for one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetStressImpact {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub current_price: Money,
    pub stressed_price: Money,
    pub current_value: Money,
    pub stressed_value: Money,
    /// Stressed value minus current value
    pub impact: Money,
    /// Fractional price move (−0.25 = −25%)
    pub impact_pct: Decimal,
    /// Share of the portfolio's current value
    pub weight: Decimal,
    /// Impact divided by total portfolio value
    pub contribution_to_portfolio_pct: Decimal,
    /// Relevant factors only; irrelevant factors are absent
    pub sensitivities: BTreeMap<StressFactor, Decimal>,
    /// Relevant factors only; sums to `impact`
    pub factor_contributions: BTreeMap<StressFactor, Money>,
}

/// Impacts rolled up by asset class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetClassImpact {
    pub asset_class: AssetClass,
    pub positions: usize,
    pub current_value: Money,
    pub stressed_value: Money,
    pub impact: Money,
    /// Impact relative to the class's own current value (zero when that is zero)
    pub impact_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressRiskMetrics {
    /// Herfindahl index of gross position weights
    pub concentration_hhi: Decimal,
    pub diversification: Decimal,
    /// Share of positions moved by more than 0.1%
    pub coverage: Decimal,
    /// 5th percentile of per-asset percentage impacts
    pub tail_risk_pct: Decimal,
}

/// Full result of applying one scenario to a portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressResult {
    pub scenario: StressScenario,
    pub assets: Vec<AssetStressImpact>,
    pub total_current_value: Money,
    pub total_stressed_value: Money,
    pub total_impact: Money,
    pub total_impact_pct: Decimal,
    pub asset_class_impacts: Vec<AssetClassImpact>,
    /// Σ of each factor's contributions across all positions
    pub factor_attribution: BTreeMap<StressFactor, Money>,
    pub risk_metrics: StressRiskMetrics,
}

/// Several scenarios against the same portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressTestOutput {
    pub scenario_results: Vec<StressResult>,
    /// Name of the scenario with the most negative total impact
    pub worst_case: String,
    pub worst_case_impact: Money,
    pub worst_case_impact_pct: Decimal,
    pub average_impact: Money,
    pub average_impact_pct: Decimal,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Applies factor shocks to positions through a [`SensitivityTable`].
#[derive(Debug, Clone, Default)]
pub struct StressScenarioEngine {
    table: SensitivityTable,
}

impl StressScenarioEngine {
    pub fn new(table: SensitivityTable) -> Self {
        Self { table }
    }

    /// Apply one scenario to the portfolio.
    pub fn run(
        &self,
        scenario: &StressScenario,
        positions: &[Position],
    ) -> RiskEngineResult<ComputationOutput<StressResult>> {
        let start = Instant::now();
        let mut warnings = Vec::new();
        let result = self.evaluate(scenario, positions, &mut warnings)?;
        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata(
            "Factor stress test (sensitivity-based revaluation)",
            &self.assumptions(scenario, positions.len()),
            warnings,
            elapsed,
            result,
        ))
    }

    /// Apply every scenario and report the worst case and average impact.
    pub fn run_many(
        &self,
        scenarios: &[StressScenario],
        positions: &[Position],
    ) -> RiskEngineResult<ComputationOutput<StressTestOutput>> {
        let start = Instant::now();
        if scenarios.is_empty() {
            return Err(RiskEngineError::insufficient("stress scenarios", 1, 0));
        }

        let mut warnings = Vec::new();
        let scenario_results = scenarios
            .iter()
            .map(|s| {
                let mut scenario_warnings = Vec::new();
                let r = self.evaluate(s, positions, &mut scenario_warnings)?;
                warnings.extend(scenario_warnings.into_iter().map(|w| format!("{}: {}", s.name, w)));
                Ok(r)
            })
            .collect::<RiskEngineResult<Vec<_>>>()?;

        let worst = scenario_results
            .iter()
            .min_by(|a, b| a.total_impact.cmp(&b.total_impact))
            .ok_or_else(|| RiskEngineError::insufficient("stress scenarios", 1, 0))?;
        let n = Decimal::from(scenario_results.len() as u64);
        let average_impact = scenario_results.iter().map(|r| r.total_impact).sum::<Decimal>() / n;
        let average_impact_pct =
            scenario_results.iter().map(|r| r.total_impact_pct).sum::<Decimal>() / n;

        let output = StressTestOutput {
            worst_case: worst.scenario.name.clone(),
            worst_case_impact: worst.total_impact,
            worst_case_impact_pct: worst.total_impact_pct,
            average_impact,
            average_impact_pct,
            scenario_results,
        };

        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata(
            "Multi-scenario factor stress test",
            &serde_json::json!({
                "num_positions": positions.len(),
                "num_scenarios": scenarios.len(),
                "shock_units": "percent for equity/fx/commodity/volatility, basis points for rates/credit",
            }),
            warnings,
            elapsed,
            output,
        ))
    }

    fn assumptions(&self, scenario: &StressScenario, positions: usize) -> serde_json::Value {
        serde_json::json!({
            "scenario": scenario.name,
            "num_positions": positions,
            "shock_units": "percent for equity/fx/commodity/volatility, basis points for rates/credit",
            "impact_model": "linear: impact = sum(normalized shock x sensitivity) x current value",
            "default_beta": self.table.default_beta,
            "default_duration": self.table.default_duration,
        })
    }

    // -----------------------------------------------------------------------
    // Internal logic
    // -----------------------------------------------------------------------

    fn evaluate(
        &self,
        scenario: &StressScenario,
        positions: &[Position],
        warnings: &mut Vec<String>,
    ) -> RiskEngineResult<StressResult> {
        validate_positions(positions)?;
        let total_current_value: Money = positions.iter().map(Position::market_value).sum();
        if total_current_value.is_zero() {
            return Err(RiskEngineError::DegenerateWeights(
                "total portfolio value is zero".into(),
            ));
        }
        if scenario.shocks.is_flat() {
            warnings.push(format!("Scenario '{}' shocks no factor", scenario.name));
        }

        let mut assets: Vec<AssetStressImpact> = positions
            .iter()
            .map(|p| self.stress_position(scenario, p))
            .collect();

        let total_impact: Money = assets.iter().map(|a| a.impact).sum();
        let total_stressed_value = total_current_value + total_impact;
        let total_impact_pct = total_impact / total_current_value;

        for a in &mut assets {
            a.weight = a.current_value / total_current_value;
            a.contribution_to_portfolio_pct = a.impact / total_current_value;
            if a.stressed_price < Decimal::ZERO {
                warn!(symbol = %a.symbol, "stressed price is negative");
                warnings.push(format!(
                    "{}: shock of {:.2}% drives the stressed price below zero",
                    a.symbol,
                    a.impact_pct * dec!(100)
                ));
            }
        }

        let mut factor_attribution: BTreeMap<StressFactor, Money> = BTreeMap::new();
        for a in &assets {
            for (factor, contribution) in &a.factor_contributions {
                *factor_attribution.entry(*factor).or_default() += *contribution;
            }
        }

        debug!(
            scenario = %scenario.name,
            positions = assets.len(),
            %total_impact,
            "stress scenario evaluated"
        );

        Ok(StressResult {
            scenario: scenario.clone(),
            asset_class_impacts: asset_class_impacts(&assets),
            risk_metrics: risk_metrics(&assets),
            assets,
            total_current_value,
            total_stressed_value,
            total_impact,
            total_impact_pct,
            factor_attribution,
        })
    }

    /// Per-position revaluation; portfolio-relative fields are filled in by the caller.
    fn stress_position(&self, scenario: &StressScenario, position: &Position) -> AssetStressImpact {
        let current_value = position.market_value();
        let sensitivities = self.table.sensitivities(position);

        let mut impact_pct = Decimal::ZERO;
        let mut factor_contributions = BTreeMap::new();
        for (factor, sensitivity) in &sensitivities {
            let move_pct = scenario.shocks.normalized(*factor) * *sensitivity;
            impact_pct += move_pct;
            factor_contributions.insert(*factor, move_pct * current_value);
        }
        let impact: Money = factor_contributions.values().copied().sum();

        AssetStressImpact {
            symbol: position.symbol.clone(),
            asset_class: position.asset_class,
            current_price: position.price,
            stressed_price: position.price * (Decimal::ONE + impact_pct),
            current_value,
            stressed_value: current_value + impact,
            impact,
            impact_pct,
            weight: Decimal::ZERO,
            contribution_to_portfolio_pct: Decimal::ZERO,
            sensitivities,
            factor_contributions,
        }
    }
}

fn validate_positions(positions: &[Position]) -> RiskEngineResult<()> {
    if positions.is_empty() {
        return Err(RiskEngineError::DegenerateWeights(
            "portfolio has no positions".into(),
        ));
    }
    let mut seen = BTreeSet::new();
    for p in positions {
        if !seen.insert(p.symbol.as_str()) {
            return Err(RiskEngineError::invalid(
                "positions",
                format!("duplicate symbol '{}'", p.symbol),
            ));
        }
        if p.price <= Decimal::ZERO {
            return Err(RiskEngineError::invalid(
                "price",
                format!("price for '{}' must be positive", p.symbol),
            ));
        }
    }
    Ok(())
}

fn asset_class_impacts(assets: &[AssetStressImpact]) -> Vec<AssetClassImpact> {
    let mut by_class: BTreeMap<AssetClass, AssetClassImpact> = BTreeMap::new();
    for a in assets {
        let entry = by_class.entry(a.asset_class).or_insert_with(|| AssetClassImpact {
            asset_class: a.asset_class,
            positions: 0,
            current_value: Decimal::ZERO,
            stressed_value: Decimal::ZERO,
            impact: Decimal::ZERO,
            impact_pct: Decimal::ZERO,
        });
        entry.positions += 1;
        entry.current_value += a.current_value;
        entry.stressed_value += a.stressed_value;
        entry.impact += a.impact;
    }
    by_class
        .into_values()
        .map(|mut c| {
            if !c.current_value.is_zero() {
                c.impact_pct = c.impact / c.current_value;
            }
            c
        })
        .collect()
}

fn risk_metrics(assets: &[AssetStressImpact]) -> StressRiskMetrics {
    let gross: Money = assets.iter().map(|a| a.current_value.abs()).sum();
    let concentration_hhi = if gross.is_zero() {
        Decimal::ZERO
    } else {
        assets
            .iter()
            .map(|a| {
                let w = a.current_value.abs() / gross;
                w * w
            })
            .sum()
    };

    let n = Decimal::from(assets.len() as u64);
    let moved = assets.iter().filter(|a| a.impact_pct.abs() > dec!(0.001)).count();
    let coverage = if assets.is_empty() {
        Decimal::ZERO
    } else {
        Decimal::from(moved as u64) / n
    };

    let mut pcts: Vec<Decimal> = assets.iter().map(|a| a.impact_pct).collect();
    pcts.sort();

    StressRiskMetrics {
        concentration_hhi,
        diversification: Decimal::ONE - concentration_hhi,
        coverage,
        tail_risk_pct: percentile_sorted(&pcts, dec!(0.05)),
    }
}

/// Linear-interpolated percentile of an ascending slice.
fn percentile_sorted(sorted: &[Decimal], p: Decimal) -> Decimal {
    match sorted.len() {
        0 => Decimal::ZERO,
        1 => sorted[0],
        n => {
            let pos = p * Decimal::from((n - 1) as u64);
            let lower = pos.floor();
            let frac = pos - lower;
            let i = lower.to_usize().unwrap_or(0).min(n - 1);
            let j = (i + 1).min(n - 1);
            sorted[i] + (sorted[j] - sorted[i]) * frac
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
