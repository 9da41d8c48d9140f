pub mod backtest;
pub mod compare;
pub mod metrics;
pub mod scenarios;
pub mod stress;
pub mod var;
