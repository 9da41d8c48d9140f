//! Asset-class → factor relevance and per-position sensitivity coefficients.
//!
//! A sensitivity is the fractional price move per unit of normalized factor
//! move: an equity with beta 1.2 has equity sensitivity 1.2, a bond with
//! duration 7 has rates sensitivity −7.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::factors::StressFactor;
use crate::types::{AssetClass, Position};

/// Immutable lookup tables used by the stress engine.
///
/// Deserializes field by field over the defaults, so a partial document only
/// replaces what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityTable {
    relevant: BTreeMap<AssetClass, Vec<StressFactor>>,
    /// Fixed coefficients that take precedence over the built-in rules
    overrides: BTreeMap<AssetClass, BTreeMap<StressFactor, Decimal>>,
    /// Lower-cased sector name → default equity beta
    sector_betas: BTreeMap<String, Decimal>,
    pub default_beta: Decimal,
    pub default_duration: Decimal,
    /// Spread duration as a share of modified duration when not given
    pub spread_duration_ratio: Decimal,
    /// Commodity and FX pass-through when no beta is given
    pub pass_through: Decimal,
    pub alternative_equity_beta: Decimal,
    pub alternative_spread_duration: Decimal,
    pub alternative_volatility: Decimal,
    pub real_estate_equity_beta: Decimal,
    pub real_estate_duration: Decimal,
}

impl Default for SensitivityTable {
    fn default() -> Self {
        use StressFactor::*;
        let relevant = BTreeMap::from([
            (AssetClass::Equity, vec![Equity]),
            (AssetClass::Bond, vec![Rates, Credit]),
            (AssetClass::Commodity, vec![Commodity]),
            (AssetClass::Currency, vec![Fx]),
            (AssetClass::Cash, vec![]),
            (AssetClass::Alternative, vec![Equity, Credit, Volatility]),
            (AssetClass::RealEstate, vec![Equity, Rates]),
        ]);
        let sector_betas = [
            ("technology", dec!(1.3)),
            ("healthcare", dec!(0.9)),
            ("financial", dec!(1.4)),
            ("consumer discretionary", dec!(1.6)),
            ("consumer staples", dec!(0.7)),
            ("energy", dec!(1.2)),
            ("materials", dec!(1.1)),
            ("industrials", dec!(1.0)),
            ("utilities", dec!(0.6)),
            ("real estate", dec!(1.0)),
            ("telecommunications", dec!(0.8)),
            ("diversified", dec!(1.0)),
        ]
        .into_iter()
        .map(|(s, b)| (s.to_string(), b))
        .collect();

        Self {
            relevant,
            overrides: BTreeMap::new(),
            sector_betas,
            default_beta: Decimal::ONE,
            default_duration: dec!(5),
            spread_duration_ratio: dec!(0.5),
            pass_through: Decimal::ONE,
            alternative_equity_beta: dec!(0.4),
            alternative_spread_duration: dec!(2),
            alternative_volatility: dec!(-0.05),
            real_estate_equity_beta: dec!(0.6),
            real_estate_duration: dec!(3),
        }
    }
}

impl SensitivityTable {
    /// Factors that move positions of `class`, in a stable order.
    pub fn relevant_factors(&self, class: AssetClass) -> &[StressFactor] {
        self.relevant.get(&class).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_relevant(&self, class: AssetClass, factor: StressFactor) -> bool {
        self.relevant_factors(class).contains(&factor)
    }

    /// Replace the relevant-factor set for one asset class.
    pub fn with_relevant_factors(mut self, class: AssetClass, factors: Vec<StressFactor>) -> Self {
        let mut factors = factors;
        factors.sort();
        factors.dedup();
        self.relevant.insert(class, factors);
        self
    }

    /// Pin the coefficient for one (class, factor) pair.
    pub fn with_override(mut self, class: AssetClass, factor: StressFactor, sensitivity: Decimal) -> Self {
        self.overrides.entry(class).or_default().insert(factor, sensitivity);
        self
    }

    pub fn with_sector_beta(mut self, sector: &str, beta: Decimal) -> Self {
        self.sector_betas.insert(sector.trim().to_lowercase(), beta);
        self
    }

    pub fn sector_beta(&self, sector: &str) -> Option<Decimal> {
        self.sector_betas.get(&sector.trim().to_lowercase()).copied()
    }

    /// Explicit beta, else sector default, else the table default.
    pub fn equity_beta(&self, position: &Position) -> Decimal {
        position
            .beta
            .or_else(|| position.sector.as_deref().and_then(|s| self.sector_beta(s)))
            .unwrap_or(self.default_beta)
    }

    /// Sensitivities for every factor relevant to the position's class.
    pub fn sensitivities(&self, position: &Position) -> BTreeMap<StressFactor, Decimal> {
        self.relevant_factors(position.asset_class)
            .iter()
            .map(|f| (*f, self.coefficient(position, *f)))
            .collect()
    }

    fn coefficient(&self, position: &Position, factor: StressFactor) -> Decimal {
        let class = position.asset_class;
        if let Some(fixed) = self.overrides.get(&class).and_then(|m| m.get(&factor)) {
            return *fixed;
        }
        let duration = position.duration.unwrap_or(self.default_duration);
        match (class, factor) {
            (AssetClass::Equity, StressFactor::Equity) => self.equity_beta(position),
            (AssetClass::Bond, StressFactor::Rates) => -duration,
            (AssetClass::Bond, StressFactor::Credit) => {
                -position
                    .spread_duration
                    .unwrap_or(duration * self.spread_duration_ratio)
            }
            (AssetClass::Commodity, StressFactor::Commodity) | (AssetClass::Currency, StressFactor::Fx) => {
                position.beta.unwrap_or(self.pass_through)
            }
            (AssetClass::Alternative, StressFactor::Equity) => {
                position.beta.unwrap_or(self.alternative_equity_beta)
            }
            (AssetClass::Alternative, StressFactor::Credit) => {
                -position
                    .spread_duration
                    .unwrap_or(self.alternative_spread_duration)
            }
            (AssetClass::Alternative, StressFactor::Volatility) => self.alternative_volatility,
            (AssetClass::RealEstate, StressFactor::Equity) => {
                position.beta.unwrap_or(self.real_estate_equity_beta)
            }
            (AssetClass::RealEstate, StressFactor::Rates) => {
                -position.duration.unwrap_or(self.real_estate_duration)
            }
            // Made relevant by a custom table without a coefficient
            _ => Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(class: AssetClass) -> Position {
        Position {
            symbol: "X".into(),
            quantity: dec!(1),
            price: dec!(100),
            asset_class: class,
            sector: None,
            beta: None,
            duration: None,
            spread_duration: None,
        }
    }

    #[test]
    fn test_volatility_only_for_alternatives() {
        let table = SensitivityTable::default();
        for class in AssetClass::ALL {
            let has_vol = table.is_relevant(class, StressFactor::Volatility);
            assert_eq!(has_vol, class == AssetClass::Alternative, "{:?}", class);
        }
        assert!(table.relevant_factors(AssetClass::Cash).is_empty());
    }

    #[test]
    fn test_equity_beta_resolution() {
        let table = SensitivityTable::default();
        let mut p = position(AssetClass::Equity);
        assert_eq!(table.equity_beta(&p), dec!(1));
        p.sector = Some("Technology".into());
        assert_eq!(table.equity_beta(&p), dec!(1.3));
        p.beta = Some(dec!(0.8));
        assert_eq!(table.equity_beta(&p), dec!(0.8));
    }

    #[test]
    fn test_bond_sensitivities() {
        let table = SensitivityTable::default();
        let mut p = position(AssetClass::Bond);
        let s = table.sensitivities(&p);
        assert_eq!(s[&StressFactor::Rates], dec!(-5));
        assert_eq!(s[&StressFactor::Credit], dec!(-2.5));
        assert!(!s.contains_key(&StressFactor::Equity));

        p.duration = Some(dec!(7));
        p.spread_duration = Some(dec!(4));
        let s = table.sensitivities(&p);
        assert_eq!(s[&StressFactor::Rates], dec!(-7));
        assert_eq!(s[&StressFactor::Credit], dec!(-4));
    }

    #[test]
    fn test_custom_table_substitution() {
        let table = SensitivityTable::default()
            .with_relevant_factors(AssetClass::Equity, vec![StressFactor::Equity, StressFactor::Fx])
            .with_override(AssetClass::Equity, StressFactor::Fx, dec!(0.3));
        let s = table.sensitivities(&position(AssetClass::Equity));
        assert_eq!(s.len(), 2);
        assert_eq!(s[&StressFactor::Fx], dec!(0.3));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let table: SensitivityTable =
            serde_json::from_str(r#"{"default_beta": "1.5", "sector_betas": {"energy": "2"}}"#).unwrap();
        assert_eq!(table.default_beta, dec!(1.5));
        assert_eq!(table.sector_beta("Energy"), Some(dec!(2)));
        assert_eq!(table.sector_beta("technology"), None);
        assert!(table.is_relevant(AssetClass::Bond, StressFactor::Credit));
    }
}
