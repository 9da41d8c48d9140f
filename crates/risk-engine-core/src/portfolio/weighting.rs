use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RiskEngineError;
use crate::returns::ReturnMatrix;
use crate::types::*;
use crate::RiskEngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Weight vector derived from current position values.
///
/// Weights are `market_value / total_value` in position order and sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioWeights {
    pub symbols: Vec<String>,
    pub market_values: Vec<Money>,
    pub weights: Vec<f64>,
    pub total_value: Money,
}

impl PortfolioWeights {
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn weight_of(&self, symbol: &str) -> Option<f64> {
        self.symbols
            .iter()
            .position(|s| s == symbol)
            .map(|i| self.weights[i])
    }

    pub fn total_value_f64(&self) -> f64 {
        to_f64(self.total_value)
    }

    /// Weights reordered to follow `symbols`.
    ///
    /// Every requested symbol must be weighted and every weighted symbol must
    /// be requested, otherwise part of the portfolio would silently drop out.
    pub fn aligned_to(&self, symbols: &[String]) -> RiskEngineResult<Vec<f64>> {
        if symbols.len() != self.symbols.len() {
            return Err(RiskEngineError::invalid(
                "symbols",
                format!(
                    "{} return columns for {} weighted positions",
                    symbols.len(),
                    self.symbols.len()
                ),
            ));
        }
        symbols
            .iter()
            .map(|s| {
                self.weight_of(s).ok_or_else(|| {
                    RiskEngineError::invalid(
                        "symbols",
                        format!("return column '{}' has no portfolio weight", s),
                    )
                })
            })
            .collect()
    }
}

/// Portfolio return series plus the weights that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioReturns {
    pub returns: Vec<f64>,
    /// Weights in return-matrix column order
    pub weights: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Weights from the prices carried on each position.
pub fn portfolio_weights(positions: &[Position]) -> RiskEngineResult<PortfolioWeights> {
    portfolio_weights_at(positions, &BTreeMap::new())
}

/// Weights using `current_prices` where available, falling back to each
/// position's own price.
pub fn portfolio_weights_at(
    positions: &[Position],
    current_prices: &BTreeMap<String, Money>,
) -> RiskEngineResult<PortfolioWeights> {
    if positions.is_empty() {
        return Err(RiskEngineError::DegenerateWeights(
            "portfolio has no positions".into(),
        ));
    }

    let mut seen = BTreeSet::new();
    let mut symbols = Vec::with_capacity(positions.len());
    let mut market_values = Vec::with_capacity(positions.len());
    for pos in positions {
        if !seen.insert(pos.symbol.as_str()) {
            return Err(RiskEngineError::invalid(
                "positions",
                format!("duplicate symbol '{}'", pos.symbol),
            ));
        }
        let price = current_prices.get(&pos.symbol).copied().unwrap_or(pos.price);
        if price <= Decimal::ZERO {
            return Err(RiskEngineError::invalid(
                "price",
                format!("price for '{}' must be positive", pos.symbol),
            ));
        }
        symbols.push(pos.symbol.clone());
        market_values.push(pos.quantity * price);
    }

    let total_value: Money = market_values.iter().copied().sum();
    if total_value.is_zero() {
        return Err(RiskEngineError::DegenerateWeights(
            "total portfolio value is zero".into(),
        ));
    }
    if total_value < Decimal::ZERO {
        return Err(RiskEngineError::DegenerateWeights(format!(
            "net portfolio value {} is negative; loss percentages are undefined for a net short book",
            total_value
        )));
    }

    let weights = market_values.iter().map(|mv| to_f64(*mv / total_value)).collect();
    debug!(positions = positions.len(), %total_value, "computed portfolio weights");

    Ok(PortfolioWeights {
        symbols,
        market_values,
        weights,
        total_value,
    })
}

/// Weighted portfolio return per observation.
///
/// A one-column matrix yields the asset's own series unchanged.
pub fn portfolio_returns(
    matrix: &ReturnMatrix,
    weights: &PortfolioWeights,
) -> RiskEngineResult<PortfolioReturns> {
    let aligned = weights.aligned_to(matrix.symbols())?;

    if matrix.is_single_asset() {
        let column = matrix
            .column(0)
            .ok_or_else(|| RiskEngineError::invalid("returns", "missing return column"))?;
        return Ok(PortfolioReturns {
            returns: column.to_vec(),
            weights: aligned,
        });
    }

    let returns = weighted_sum(matrix.columns(), &aligned, matrix.n_obs());
    Ok(PortfolioReturns {
        returns,
        weights: aligned,
    })
}

// ---------------------------------------------------------------------------
// Internal logic
// ---------------------------------------------------------------------------

/// Row-wise Σ w_i r_i over column-major data. Always `n_obs` long.
pub(crate) fn weighted_sum(columns: &[Vec<f64>], weights: &[f64], n_obs: usize) -> Vec<f64> {
    let mut out = vec![0.0; n_obs];
    for (col, w) in columns.iter().zip(weights) {
        for (acc, r) in out.iter_mut().zip(col) {
            *acc += w * r;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
