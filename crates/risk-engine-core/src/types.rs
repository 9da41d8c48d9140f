use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Broad asset class of a held position. Drives stress sensitivity lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    #[default]
    Equity,
    Bond,
    Commodity,
    Currency,
    Cash,
    Alternative,
    RealEstate,
}

impl AssetClass {
    pub const ALL: [AssetClass; 7] = [
        AssetClass::Equity,
        AssetClass::Bond,
        AssetClass::Commodity,
        AssetClass::Currency,
        AssetClass::Cash,
        AssetClass::Alternative,
        AssetClass::RealEstate,
    ];
}

/// A single holding in a portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Ticker, unique within the portfolio
    pub symbol: String,
    /// Units held; negative for short positions
    pub quantity: Decimal,
    /// Current price per unit (must be positive)
    pub price: Money,
    #[serde(default)]
    pub asset_class: AssetClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    /// Equity beta (or pass-through for commodity/fx positions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<Decimal>,
    /// Modified duration in years (bonds, real estate)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Decimal>,
    /// Credit spread duration in years; falls back to a fraction of `duration`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spread_duration: Option<Decimal>,
}

impl Position {
    /// Market value = quantity × price.
    pub fn market_value(&self) -> Money {
        self.quantity * self.price
    }
}

/// Lossy conversion used at the Decimal → f64 boundary of the statistical engines.
pub(crate) fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap decimal computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    envelope(methodology, assumptions, warnings, elapsed_us, "rust_decimal_128bit", result)
}

/// Helper to wrap floating-point (statistical) computation results with metadata
pub fn with_metadata_f64<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    envelope(methodology, assumptions, warnings, elapsed_us, "ieee754_f64", result)
}

fn envelope<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    precision: &str,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: precision.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_market_value_short_position() {
        let pos: Position = serde_json::from_str(
            r#"{"symbol": "TSLA", "quantity": -10, "price": "250.00"}"#,
        )
        .unwrap();
        assert_eq!(pos.asset_class, AssetClass::Equity);
        assert_eq!(pos.market_value(), dec!(-2500.00));
    }

    #[test]
    fn test_asset_class_snake_case() {
        let class: AssetClass = serde_json::from_str("\"real_estate\"").unwrap();
        assert_eq!(class, AssetClass::RealEstate);
    }

    #[test]
    fn test_metadata_precision() {
        let out = with_metadata_f64("test", &serde_json::json!({}), vec![], 1, 0.5_f64);
        assert_eq!(out.metadata.precision, "ieee754_f64");
        let out = with_metadata("test", &serde_json::json!({}), vec![], 1, dec!(0.5));
        assert_eq!(out.metadata.precision, "rust_decimal_128bit");
    }
}
