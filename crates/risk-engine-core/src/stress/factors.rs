use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Closed set of macro factors a scenario can shock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressFactor {
    Equity,
    Rates,
    Credit,
    Fx,
    Commodity,
    Volatility,
}

/// How a factor's shock is quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShockUnit {
    /// -25 means a 25% fall
    Percent,
    /// +100 means a one percentage point rise
    BasisPoints,
}

impl StressFactor {
    pub const ALL: [StressFactor; 6] = [
        StressFactor::Equity,
        StressFactor::Rates,
        StressFactor::Credit,
        StressFactor::Fx,
        StressFactor::Commodity,
        StressFactor::Volatility,
    ];

    pub fn unit(&self) -> ShockUnit {
        match self {
            StressFactor::Rates | StressFactor::Credit => ShockUnit::BasisPoints,
            _ => ShockUnit::Percent,
        }
    }

    /// Quoted shock → decimal move (−25 % → −0.25, +100 bp → 0.01).
    pub fn normalize(&self, shock: Decimal) -> Decimal {
        match self.unit() {
            ShockUnit::Percent => shock / dec!(100),
            ShockUnit::BasisPoints => shock / dec!(10000),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StressFactor::Equity => "equity",
            StressFactor::Rates => "rates",
            StressFactor::Credit => "credit",
            StressFactor::Fx => "fx",
            StressFactor::Commodity => "commodity",
            StressFactor::Volatility => "volatility",
        }
    }
}

impl fmt::Display for StressFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quoted shock for every factor. Missing factors are unshocked (0).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorShocks {
    /// Equity index move, percent
    pub equity: Decimal,
    /// Rate move, basis points
    pub rates: Decimal,
    /// Credit spread move, basis points
    pub credit: Decimal,
    /// FX move against the base currency, percent
    pub fx: Decimal,
    /// Commodity index move, percent
    pub commodity: Decimal,
    /// Implied volatility move, percent
    pub volatility: Decimal,
}

impl FactorShocks {
    pub fn get(&self, factor: StressFactor) -> Decimal {
        match factor {
            StressFactor::Equity => self.equity,
            StressFactor::Rates => self.rates,
            StressFactor::Credit => self.credit,
            StressFactor::Fx => self.fx,
            StressFactor::Commodity => self.commodity,
            StressFactor::Volatility => self.volatility,
        }
    }

    pub fn with(mut self, factor: StressFactor, shock: Decimal) -> Self {
        let slot = match factor {
            StressFactor::Equity => &mut self.equity,
            StressFactor::Rates => &mut self.rates,
            StressFactor::Credit => &mut self.credit,
            StressFactor::Fx => &mut self.fx,
            StressFactor::Commodity => &mut self.commodity,
            StressFactor::Volatility => &mut self.volatility,
        };
        *slot = shock;
        self
    }

    /// Normalized decimal move for `factor`.
    pub fn normalized(&self, factor: StressFactor) -> Decimal {
        factor.normalize(self.get(factor))
    }

    pub fn is_flat(&self) -> bool {
        StressFactor::ALL.iter().all(|f| self.get(*f).is_zero())
    }
}

/// Whether the scenario replays a real episode or is hypothetical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioType {
    Historical,
    #[default]
    Hypothetical,
}

/// A named set of factor shocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StressScenario {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub scenario_type: ScenarioType,
    #[serde(default)]
    pub shocks: FactorShocks,
}

impl StressScenario {
    pub fn new(name: impl Into<String>, shocks: FactorShocks) -> Self {
        Self {
            name: name.into(),
            description: None,
            scenario_type: ScenarioType::Hypothetical,
            shocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(StressFactor::Equity.normalize(dec!(-25)), dec!(-0.25));
        assert_eq!(StressFactor::Rates.normalize(dec!(100)), dec!(0.01));
        assert_eq!(StressFactor::Credit.normalize(dec!(50)), dec!(0.005));
        assert_eq!(StressFactor::Volatility.normalize(dec!(50)), dec!(0.5));
    }

    #[test]
    fn test_partial_shocks_default_to_zero() {
        let scenario: StressScenario =
            serde_json::from_str(r#"{"name": "Custom", "shocks": {"equity": "-10", "rates": 25}}"#)
                .unwrap();
        assert_eq!(scenario.shocks.get(StressFactor::Equity), dec!(-10));
        assert_eq!(scenario.shocks.get(StressFactor::Rates), dec!(25));
        assert!(scenario.shocks.get(StressFactor::Volatility).is_zero());
        assert_eq!(scenario.scenario_type, ScenarioType::Hypothetical);
    }

    #[test]
    fn test_unknown_factor_key_is_ignored() {
        let shocks: FactorShocks =
            serde_json::from_str(r#"{"equity": -5, "inflation": 300}"#).unwrap();
        assert_eq!(shocks, FactorShocks::default().with(StressFactor::Equity, dec!(-5)));
    }

    #[test]
    fn test_flat_scenario() {
        assert!(FactorShocks::default().is_flat());
        assert!(!FactorShocks::default().with(StressFactor::Fx, dec!(1)).is_flat());
    }
}
