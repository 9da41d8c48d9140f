pub mod config;
pub mod error;
pub mod stats;
pub mod types;

#[cfg(feature = "returns")]
pub mod returns;

#[cfg(feature = "portfolio")]
pub mod portfolio;

#[cfg(feature = "var")]
pub mod var;

#[cfg(feature = "stress")]
pub mod stress;

#[cfg(feature = "service")]
pub mod service;

pub use error::RiskEngineError;
pub use types::*;

/// Standard result type for all risk-engine operations
pub type RiskEngineResult<T> = Result<T, RiskEngineError>;
