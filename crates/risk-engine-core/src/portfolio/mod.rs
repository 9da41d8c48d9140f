pub mod backtest;
pub mod performance;
pub mod weighting;

pub use backtest::{
    run_backtest, BacktestOptions, BacktestResult, BenchmarkComparison, DatedValue, RebalanceFrequency,
};
pub use performance::{calculate_performance_metrics, PerformanceInput, PerformanceOutput};
pub use weighting::{
    portfolio_returns, portfolio_weights, portfolio_weights_at, PortfolioReturns, PortfolioWeights,
};
