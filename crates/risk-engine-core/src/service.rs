//! Request façade tying the collaborators to the engines.
//!
//! A [`RiskService`] resolves a portfolio id to positions, fetches price
//! history, builds the aligned return matrix and dispatches to the requested
//! VaR engine or the backtester. Stress tests only need the positions.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{InnovationDistribution, RiskConfig};
use crate::error::RiskEngineError;
use crate::portfolio::{
    portfolio_weights, run_backtest, BacktestOptions, BacktestResult, PortfolioWeights, RebalanceFrequency,
};
use crate::returns::{
    InMemoryMarketData, MarketDataProvider, PriceHistory, ReturnMatrix, ReturnSeriesBuilder,
};
use crate::stress::{StressResult, StressScenario, StressScenarioEngine, StressTestOutput};
use crate::types::*;
use crate::var::{
    HistoricalVarEngine, MonteCarloOptions, MonteCarloVarEngine, ParametricVarEngine, RiskResult,
    VarMethod, VarParameters,
};
use crate::RiskEngineResult;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Read-only access to the positions held in a portfolio.
pub trait PositionSource {
    fn positions(&self, portfolio_id: &str) -> RiskEngineResult<Vec<Position>>;
}

impl<T: PositionSource + ?Sized> PositionSource for &T {
    fn positions(&self, portfolio_id: &str) -> RiskEngineResult<Vec<Position>> {
        (**self).positions(portfolio_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryPortfolios {
    portfolios: BTreeMap<String, Vec<Position>>,
}

impl InMemoryPortfolios {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, portfolio_id: impl Into<String>, positions: Vec<Position>) {
        self.portfolios.insert(portfolio_id.into(), positions);
    }

    pub fn with_portfolio(mut self, portfolio_id: impl Into<String>, positions: Vec<Position>) -> Self {
        self.insert(portfolio_id, positions);
        self
    }
}

impl PositionSource for InMemoryPortfolios {
    fn positions(&self, portfolio_id: &str) -> RiskEngineResult<Vec<Position>> {
        self.portfolios
            .get(portfolio_id)
            .cloned()
            .ok_or_else(|| RiskEngineError::DataSource(format!("unknown portfolio '{}'", portfolio_id)))
    }
}

// ---------------------------------------------------------------------------
// Requests and outputs
// ---------------------------------------------------------------------------

fn default_confidence() -> f64 {
    0.95
}

fn default_horizon() -> u32 {
    1
}

fn default_lookback() -> u32 {
    5
}

/// A VaR calculation for one stored portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCalculationRequest {
    pub portfolio_id: String,
    pub method: VarMethod,
    #[serde(default = "default_confidence")]
    pub confidence_level: f64,
    #[serde(default = "default_horizon")]
    pub horizon_days: u32,
    /// Clamped into the configured lookback range
    #[serde(default = "default_lookback")]
    pub lookback_years: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_simulations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<InnovationDistribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degrees_of_freedom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl RiskCalculationRequest {
    pub fn new(portfolio_id: impl Into<String>, method: VarMethod) -> Self {
        Self {
            portfolio_id: portfolio_id.into(),
            method,
            confidence_level: default_confidence(),
            horizon_days: default_horizon(),
            lookback_years: default_lookback(),
            num_simulations: None,
            distribution: None,
            degrees_of_freedom: None,
            seed: None,
        }
    }

    pub fn parameters(&self) -> VarParameters {
        VarParameters::new(self.confidence_level, self.horizon_days)
    }

    pub fn monte_carlo_options(&self) -> MonteCarloOptions {
        MonteCarloOptions {
            num_simulations: self.num_simulations,
            distribution: self.distribution,
            degrees_of_freedom: self.degrees_of_freedom,
            seed: self.seed,
        }
    }
}

/// A request that carries its own positions and price history.
///
/// Every request field is optional and falls back to the
/// [`RiskCalculationRequest`] defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineRiskRequest {
    pub positions: Vec<Position>,
    pub prices: PriceHistory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<VarMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizon_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_simulations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<InnovationDistribution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degrees_of_freedom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Service over the in-memory collaborators of an [`InlineRiskRequest`].
pub type InlineRiskService = RiskService<InMemoryMarketData, InMemoryPortfolios>;

impl InlineRiskRequest {
    pub const PORTFOLIO_ID: &'static str = "inline";

    pub fn request(&self) -> RiskCalculationRequest {
        let base = RiskCalculationRequest::new(
            Self::PORTFOLIO_ID,
            self.method.unwrap_or(VarMethod::Parametric),
        );
        RiskCalculationRequest {
            confidence_level: self.confidence_level.unwrap_or(base.confidence_level),
            horizon_days: self.horizon_days.unwrap_or(base.horizon_days),
            lookback_years: self.lookback_years.unwrap_or(base.lookback_years),
            num_simulations: self.num_simulations,
            distribution: self.distribution,
            degrees_of_freedom: self.degrees_of_freedom,
            seed: self.seed,
            ..base
        }
    }

    pub fn into_service(self, config: RiskConfig) -> RiskEngineResult<InlineRiskService> {
        inline_service(self.positions, self.prices, config)
    }
}

fn inline_service(
    positions: Vec<Position>,
    prices: PriceHistory,
    config: RiskConfig,
) -> RiskEngineResult<InlineRiskService> {
    RiskService::new(
        InMemoryMarketData::new(prices),
        InMemoryPortfolios::new().with_portfolio(InlineRiskRequest::PORTFOLIO_ID, positions),
        config,
    )
}

/// A historical replay of one stored portfolio's current weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub portfolio_id: String,
    #[serde(default)]
    pub rebalance: RebalanceFrequency,
    /// Clamped into the configured lookback range
    #[serde(default = "default_lookback")]
    pub lookback_years: u32,
    #[serde(default)]
    pub risk_free_rate: f64,
    /// Symbol replayed buy-and-hold alongside the portfolio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<String>,
}

impl BacktestRequest {
    pub fn new(portfolio_id: impl Into<String>) -> Self {
        Self {
            portfolio_id: portfolio_id.into(),
            rebalance: RebalanceFrequency::None,
            lookback_years: default_lookback(),
            risk_free_rate: 0.0,
            benchmark: None,
        }
    }
}

/// A backtest that carries its own positions and price history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineBacktestRequest {
    pub positions: Vec<Position>,
    pub prices: PriceHistory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rebalance: Option<RebalanceFrequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_free_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<String>,
}

impl InlineBacktestRequest {
    pub fn request(&self) -> BacktestRequest {
        let base = BacktestRequest::new(InlineRiskRequest::PORTFOLIO_ID);
        BacktestRequest {
            rebalance: self.rebalance.unwrap_or(base.rebalance),
            lookback_years: self.lookback_years.unwrap_or(base.lookback_years),
            risk_free_rate: self.risk_free_rate.unwrap_or(base.risk_free_rate),
            benchmark: self.benchmark.clone(),
            ..base
        }
    }

    pub fn into_service(self, config: RiskConfig) -> RiskEngineResult<InlineRiskService> {
        inline_service(self.positions, self.prices, config)
    }
}

/// A stress test of one stored portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressTestRequest {
    pub portfolio_id: String,
    pub scenario: StressScenario,
}

/// All three methods on the same data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarComparison {
    pub results: Vec<RiskResult>,
    pub lowest: VarMethod,
    pub highest: VarMethod,
    /// Highest minus lowest VaR amount
    pub var_spread: f64,
    /// Spread relative to the lowest VaR amount; absent when that is zero
    pub var_spread_ratio: Option<f64>,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Front door for VaR and stress requests.
pub struct RiskService<M, P> {
    market_data: M,
    portfolios: P,
    config: RiskConfig,
    stress: StressScenarioEngine,
}

/// Inputs shared by every VaR method for one request.
struct PreparedPortfolio {
    weights: PortfolioWeights,
    matrix: ReturnMatrix,
    warnings: Vec<String>,
}

impl<M: MarketDataProvider, P: PositionSource> RiskService<M, P> {
    pub fn new(market_data: M, portfolios: P, config: RiskConfig) -> RiskEngineResult<Self> {
        config.validate()?;
        Ok(Self {
            market_data,
            portfolios,
            config,
            stress: StressScenarioEngine::default(),
        })
    }

    pub fn with_stress_engine(mut self, stress: StressScenarioEngine) -> Self {
        self.stress = stress;
        self
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn calculate(
        &self,
        request: &RiskCalculationRequest,
    ) -> RiskEngineResult<ComputationOutput<RiskResult>> {
        info!(
            portfolio = %request.portfolio_id,
            method = %request.method,
            confidence = request.confidence_level,
            horizon = request.horizon_days,
            "VaR calculation requested"
        );
        let params = request.parameters();
        params.validate()?;
        let prepared = self.prepare(&request.portfolio_id, request.lookback_years, None)?;
        let mut out = self.run_method(request.method, request, &prepared)?;
        let mut warnings = prepared.warnings;
        warnings.append(&mut out.warnings);
        out.warnings = warnings;
        Ok(out)
    }

    /// Run every method over the same return matrix.
    pub fn compare_methods(
        &self,
        request: &RiskCalculationRequest,
    ) -> RiskEngineResult<ComputationOutput<VarComparison>> {
        let start = Instant::now();
        info!(portfolio = %request.portfolio_id, "VaR method comparison requested");
        let params = request.parameters();
        params.validate()?;
        let prepared = self.prepare(&request.portfolio_id, request.lookback_years, None)?;

        let mut warnings = prepared.warnings.clone();
        let mut results = Vec::with_capacity(VarMethod::ALL.len());
        for method in VarMethod::ALL {
            let out = self.run_method(method, request, &prepared)?;
            warnings.extend(out.warnings.into_iter().map(|w| format!("{}: {}", method, w)));
            results.push(out.result);
        }

        let lowest = results
            .iter()
            .min_by(|a, b| a.var_amount.total_cmp(&b.var_amount))
            .ok_or_else(|| RiskEngineError::insufficient("VaR results", 1, 0))?;
        let highest = results
            .iter()
            .max_by(|a, b| a.var_amount.total_cmp(&b.var_amount))
            .ok_or_else(|| RiskEngineError::insufficient("VaR results", 1, 0))?;
        let var_spread = highest.var_amount - lowest.var_amount;
        let var_spread_ratio = (lowest.var_amount != 0.0).then(|| var_spread / lowest.var_amount.abs());

        let comparison = VarComparison {
            lowest: lowest.method,
            highest: highest.method,
            var_spread,
            var_spread_ratio,
            results,
        };

        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata_f64(
            "VaR method comparison: parametric, historical and Monte Carlo on one return matrix",
            &serde_json::json!({
                "confidence_level": params.confidence_level,
                "horizon_days": params.horizon_days,
                "observations": prepared.matrix.n_obs(),
                "assets": prepared.matrix.n_assets(),
            }),
            warnings,
            elapsed,
            comparison,
        ))
    }

    pub fn stress_test(
        &self,
        request: &StressTestRequest,
    ) -> RiskEngineResult<ComputationOutput<StressResult>> {
        info!(
            portfolio = %request.portfolio_id,
            scenario = %request.scenario.name,
            "stress test requested"
        );
        let positions = self.portfolios.positions(&request.portfolio_id)?;
        self.stress.run(&request.scenario, &positions)
    }

    /// Several scenarios against one stored portfolio.
    pub fn stress_test_many(
        &self,
        portfolio_id: &str,
        scenarios: &[StressScenario],
    ) -> RiskEngineResult<ComputationOutput<StressTestOutput>> {
        info!(portfolio = %portfolio_id, scenarios = scenarios.len(), "stress tests requested");
        let positions = self.portfolios.positions(portfolio_id)?;
        self.stress.run_many(scenarios, &positions)
    }

    /// Replay the portfolio's current weights over its price history.
    pub fn backtest(&self, request: &BacktestRequest) -> RiskEngineResult<ComputationOutput<BacktestResult>> {
        info!(
            portfolio = %request.portfolio_id,
            rebalance = %request.rebalance,
            benchmark = ?request.benchmark,
            "backtest requested"
        );
        let prepared = self.prepare(
            &request.portfolio_id,
            request.lookback_years,
            request.benchmark.as_deref(),
        )?;
        let holdings = prepared.matrix.select(&prepared.weights.symbols)?;
        let benchmark = match request.benchmark.as_deref() {
            Some(symbol) => Some((
                symbol,
                prepared
                    .matrix
                    .column_by_symbol(symbol)
                    .ok_or_else(|| RiskEngineError::UnknownSymbol(symbol.to_string()))?,
            )),
            None => None,
        };
        let options = BacktestOptions {
            rebalance: request.rebalance,
            risk_free_rate: request.risk_free_rate,
            periods_per_year: self.config.returns.trading_days_per_year,
            starting_value: prepared.weights.total_value_f64(),
        };

        let mut out = run_backtest(&holdings, &prepared.weights, &options, benchmark)?;
        let mut warnings = prepared.warnings;
        warnings.append(&mut out.warnings);
        out.warnings = warnings;
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Internal logic
    // -----------------------------------------------------------------------

    /// Weights and aligned returns; an unheld `extra` symbol adds a column.
    fn prepare(
        &self,
        portfolio_id: &str,
        lookback_years: u32,
        extra: Option<&str>,
    ) -> RiskEngineResult<PreparedPortfolio> {
        let mut warnings = Vec::new();
        let (years, clamp_warning) = self.config.returns.clamp_lookback(lookback_years);
        if let Some(w) = clamp_warning {
            warn!(requested = lookback_years, years, "lookback clamped");
            warnings.push(w);
        }

        let positions = self.portfolios.positions(portfolio_id)?;
        let weights = portfolio_weights(&positions)?;
        let mut symbols = weights.symbols.clone();
        if let Some(symbol) = extra {
            if !symbols.iter().any(|s| s == symbol) {
                symbols.push(symbol.to_string());
            }
        }
        let history = self.market_data.price_history(&symbols, years)?;
        let matrix = ReturnSeriesBuilder::new(self.config.returns.clone())
            .lookback_years(years)
            .build(&history, &symbols)?;

        Ok(PreparedPortfolio {
            weights,
            matrix,
            warnings,
        })
    }

    fn run_method(
        &self,
        method: VarMethod,
        request: &RiskCalculationRequest,
        prepared: &PreparedPortfolio,
    ) -> RiskEngineResult<ComputationOutput<RiskResult>> {
        let params = request.parameters();
        let (matrix, weights) = (&prepared.matrix, &prepared.weights);
        match method {
            VarMethod::Parametric => ParametricVarEngine::from_config(&self.config)
                .with_distribution(request.distribution.unwrap_or_default(), request.degrees_of_freedom)
                .calculate(matrix, weights, &params),
            VarMethod::Historical => {
                HistoricalVarEngine::from_config(&self.config).calculate(matrix, weights, &params)
            }
            VarMethod::MonteCarlo => MonteCarloVarEngine::from_config(&self.config).calculate(
                matrix,
                weights,
                &params,
                &request.monte_carlo_options(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::{InMemoryMarketData, PriceHistory, PricePoint};
    use crate::stress::{preset, FactorShocks, StressFactor};
    use chrono::{Duration, NaiveDate};
    use rust_decimal_macros::dec;

    fn prices(n: usize, start_price: f64, freq: f64, amp: f64) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut close = start_price;
        (0..n)
            .map(|i| {
                if i > 0 {
                    close *= 1.0 + 0.0003 + amp * ((i as f64) * freq).sin();
                }
                PricePoint {
                    date: start + Duration::days(i as i64),
                    close,
                }
            })
            .collect()
    }

    fn position(symbol: &str, qty: rust_decimal::Decimal, class: AssetClass) -> Position {
        Position {
            symbol: symbol.into(),
            quantity: qty,
            price: dec!(100),
            asset_class: class,
            sector: None,
            beta: None,
            duration: None,
            spread_duration: None,
        }
    }

    fn config() -> RiskConfig {
        let mut cfg = RiskConfig::default();
        cfg.returns.trading_days_per_year = 60;
        cfg.monte_carlo.num_simulations = 2_000;
        cfg.monte_carlo.min_simulations = 1_000;
        cfg.monte_carlo.max_simulations = 5_000;
        cfg
    }

    fn service() -> RiskService<InMemoryMarketData, InMemoryPortfolios> {
        let history = PriceHistory::new()
            .with_series("AAPL", prices(100, 175.5, 1.3, 0.015))
            .with_series("AGG", prices(100, 98.0, 0.7, 0.004));
        let portfolios = InMemoryPortfolios::new()
            .with_portfolio(
                "mixed",
                vec![
                    position("AAPL", dec!(100), AssetClass::Equity),
                    position("AGG", dec!(50), AssetClass::Bond),
                ],
            )
            .with_portfolio("solo", vec![position("AAPL", dec!(100), AssetClass::Equity)])
            .with_portfolio("ghost", vec![position("NOPE", dec!(1), AssetClass::Equity)]);
        RiskService::new(InMemoryMarketData::new(history), portfolios, config()).unwrap()
    }

    fn request(id: &str, method: VarMethod) -> RiskCalculationRequest {
        RiskCalculationRequest {
            lookback_years: 1,
            seed: Some(7),
            ..RiskCalculationRequest::new(id, method)
        }
    }

    #[test]
    fn test_each_method_runs_on_stored_portfolio() {
        let svc = service();
        for method in VarMethod::ALL {
            let out = svc.calculate(&request("mixed", method)).unwrap();
            assert_eq!(out.result.method, method);
            assert!(out.result.var_amount > 0.0, "{} VaR should be positive", method);
            assert!(out.result.cvar_amount >= out.result.var_amount - 1e-9);
            assert_eq!(out.result.portfolio_value, 15_000.0);
            assert_eq!(out.result.observations, 60);
        }
    }

    #[test]
    fn test_single_asset_portfolio() {
        let out = service().calculate(&request("solo", VarMethod::Historical)).unwrap();
        assert_eq!(out.result.portfolio_value, 10_000.0);
    }

    #[test]
    fn test_lookback_clamp_is_reported() {
        let mut req = request("mixed", VarMethod::Parametric);
        req.lookback_years = 0;
        let out = service().calculate(&req).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("Lookback")));
    }

    #[test]
    fn test_simulation_clamp_is_reported() {
        let mut req = request("mixed", VarMethod::MonteCarlo);
        req.num_simulations = Some(10);
        let out = service().calculate(&req).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("simulations below minimum")));
    }

    #[test]
    fn test_collaborator_failures_surface() {
        let svc = service();
        assert!(matches!(
            svc.calculate(&request("missing", VarMethod::Parametric)),
            Err(RiskEngineError::DataSource(_))
        ));
        assert!(matches!(
            svc.calculate(&request("ghost", VarMethod::Parametric)),
            Err(RiskEngineError::UnknownSymbol(s)) if s == "NOPE"
        ));
        let mut long = request("mixed", VarMethod::Parametric);
        long.lookback_years = 3;
        // 99 returns against 3 × 60 × 0.8 = 144 required
        assert!(matches!(
            svc.calculate(&long),
            Err(RiskEngineError::InsufficientData { required: 144, .. })
        ));
    }

    #[test]
    fn test_compare_methods() {
        let out = service().compare_methods(&request("mixed", VarMethod::Parametric)).unwrap();
        let cmp = &out.result;
        assert_eq!(cmp.results.len(), 3);
        let amounts: Vec<f64> = cmp.results.iter().map(|r| r.var_amount).collect();
        let max = amounts.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = amounts.iter().cloned().fold(f64::INFINITY, f64::min);
        assert!((cmp.var_spread - (max - min)).abs() < 1e-9);
        assert!(cmp.var_spread >= 0.0);
    }

    #[test]
    fn test_stress_request() {
        let svc = service();
        let out = svc
            .stress_test(&StressTestRequest {
                portfolio_id: "mixed".into(),
                scenario: preset("Market decline -25%").unwrap(),
            })
            .unwrap();
        // Only the equity leg moves: -25% of 10,000
        assert_eq!(out.result.total_impact, dec!(-2500));

        let scenarios = vec![
            preset("GFC 2008").unwrap(),
            StressScenario::new("Mild", FactorShocks::default().with(StressFactor::Equity, dec!(-2))),
        ];
        let many = svc.stress_test_many("mixed", &scenarios).unwrap();
        assert_eq!(many.result.worst_case, "GFC 2008");
    }

    #[test]
    fn test_inline_request_defaults_and_overrides() {
        let inline: InlineRiskRequest = serde_json::from_str(
            r#"{"positions": [{"symbol": "AAPL", "quantity": 10, "price": "100"}],
                "prices": {"AAPL": []}, "method": "historical", "seed": 9}"#,
        )
        .unwrap();
        let req = inline.request();
        assert_eq!(req.method, VarMethod::Historical);
        assert_eq!(req.confidence_level, 0.95);
        assert_eq!(req.lookback_years, 5);
        assert_eq!(req.seed, Some(9));
        assert_eq!(req.portfolio_id, InlineRiskRequest::PORTFOLIO_ID);

        // An empty series surfaces as missing history, never a zero VaR
        let svc = inline.into_service(config()).unwrap();
        assert!(matches!(
            svc.calculate(&req),
            Err(RiskEngineError::InsufficientData { available: 0, .. })
        ));
    }

    #[test]
    fn test_symbol_without_recent_history_is_insufficient_data() {
        let dated = |start: NaiveDate| -> Vec<PricePoint> {
            prices(400, 50.0, 0.9, 0.01)
                .into_iter()
                .enumerate()
                .map(|(i, p)| PricePoint {
                    date: start + Duration::days(i as i64),
                    close: p.close,
                })
                .collect()
        };
        let history = PriceHistory::new()
            .with_series("OLD", dated(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()))
            .with_series("NEW", dated(NaiveDate::from_ymd_opt(2023, 6, 1).unwrap()));
        let svc = RiskService::new(
            InMemoryMarketData::new(history),
            InMemoryPortfolios::new().with_portfolio(
                "stale",
                vec![
                    position("OLD", dec!(10), AssetClass::Equity),
                    position("NEW", dec!(10), AssetClass::Equity),
                ],
            ),
            config(),
        )
        .unwrap();
        match svc.calculate(&request("stale", VarMethod::Parametric)) {
            Err(RiskEngineError::InsufficientData {
                context,
                required,
                available,
            }) => {
                assert!(context.contains("OLD"), "context: {}", context);
                assert_eq!(required, 48);
                assert_eq!(available, 0);
            }
            other => panic!("expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_student_t_parametric_request() {
        let mut req = request("mixed", VarMethod::Parametric);
        req.distribution = Some(InnovationDistribution::StudentT);
        req.degrees_of_freedom = Some(5.0);
        let out = service().calculate(&req).unwrap();
        match out.result.diagnostics {
            crate::var::VarDiagnostics::Parametric {
                distribution,
                degrees_of_freedom,
                ..
            } => {
                assert_eq!(distribution, InnovationDistribution::StudentT);
                assert_eq!(degrees_of_freedom, Some(5.0));
            }
            other => panic!("unexpected diagnostics {:?}", other),
        }
    }

    #[test]
    fn test_backtest_with_benchmark() {
        let svc = service();
        let mut req = BacktestRequest::new("solo");
        req.lookback_years = 1;
        req.rebalance = RebalanceFrequency::Monthly;
        req.benchmark = Some("AGG".into());
        let out = svc.backtest(&req).unwrap().result;
        assert_eq!(out.observations, 60);
        assert_eq!(out.starting_value, 10_000.0);
        assert_eq!(out.equity_curve.len(), 60);
        let bench = out.benchmark.unwrap();
        assert_eq!(bench.symbol, "AGG");
        assert!((bench.relative_cagr - (out.cagr - bench.cagr)).abs() < 1e-12);

        // Benchmark already held: no extra column, still compared
        let mut held = BacktestRequest::new("mixed");
        held.lookback_years = 1;
        held.benchmark = Some("AAPL".into());
        let out = svc.backtest(&held).unwrap().result;
        assert_eq!(out.benchmark.unwrap().symbol, "AAPL");

        held.benchmark = Some("NOPE".into());
        assert!(matches!(svc.backtest(&held), Err(RiskEngineError::UnknownSymbol(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = config();
        cfg.monte_carlo.batch_size = 0;
        let result = RiskService::new(
            InMemoryMarketData::default(),
            InMemoryPortfolios::new(),
            cfg,
        );
        assert!(result.is_err());
    }
}
