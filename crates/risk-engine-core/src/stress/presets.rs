use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::factors::{FactorShocks, ScenarioType, StressScenario};

// ---------------------------------------------------------------------------
// Built-in scenarios
// ---------------------------------------------------------------------------

fn scenario(
    name: &str,
    description: &str,
    scenario_type: ScenarioType,
    shocks: FactorShocks,
) -> StressScenario {
    StressScenario {
        name: name.into(),
        description: Some(description.into()),
        scenario_type,
        shocks,
    }
}

fn shocks(equity: Decimal, rates: Decimal, credit: Decimal, commodity: Decimal) -> FactorShocks {
    FactorShocks {
        equity,
        rates,
        credit,
        commodity,
        ..FactorShocks::default()
    }
}

/// Canonical historical episodes and hypothetical shocks.
pub fn preset_scenarios() -> Vec<StressScenario> {
    use ScenarioType::*;
    vec![
        scenario(
            "Market decline -25%",
            "Broad equity sell-off with no move in rates or spreads",
            Hypothetical,
            shocks(dec!(-25), Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
        ),
        scenario(
            "GFC 2008",
            "Global financial crisis, Sep 2008 to Mar 2009",
            Historical,
            FactorShocks {
                volatility: dec!(150),
                ..shocks(dec!(-38), dec!(-200), dec!(400), dec!(-35))
            },
        ),
        scenario(
            "COVID March 2020",
            "Pandemic crash, Feb 19 to Mar 23 2020",
            Historical,
            FactorShocks {
                volatility: dec!(200),
                ..shocks(dec!(-34), dec!(-100), dec!(300), dec!(-20))
            },
        ),
        scenario(
            "Taper Tantrum 2013",
            "Bond sell-off after Fed tapering guidance, May to Jun 2013",
            Historical,
            shocks(dec!(-6), dec!(100), dec!(50), Decimal::ZERO),
        ),
        scenario(
            "Dot-Com 2000",
            "Technology bubble unwind, Mar 2000 to Oct 2002",
            Historical,
            shocks(dec!(-49), dec!(-300), Decimal::ZERO, Decimal::ZERO),
        ),
        scenario(
            "Euro Crisis 2011",
            "European sovereign debt crisis, Jul to Oct 2011",
            Historical,
            FactorShocks {
                fx: dec!(-8),
                ..shocks(dec!(-22), dec!(100), dec!(200), Decimal::ZERO)
            },
        ),
        scenario(
            "Rate shock +200bp",
            "Parallel 200bp rise in rates with modest spread widening",
            Hypothetical,
            shocks(dec!(-5), dec!(200), dec!(25), Decimal::ZERO),
        ),
        scenario(
            "Stagflation",
            "Rising rates and commodities with falling equities",
            Hypothetical,
            FactorShocks {
                fx: dec!(-5),
                volatility: dec!(40),
                ..shocks(dec!(-20), dec!(300), dec!(200), dec!(40))
            },
        ),
    ]
}

/// Case-insensitive lookup by name.
pub fn preset(name: &str) -> Option<StressScenario> {
    let wanted = name.trim();
    preset_scenarios()
        .into_iter()
        .find(|s| s.name.eq_ignore_ascii_case(wanted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stress::StressFactor;

    #[test]
    fn test_presets_are_named_uniquely() {
        let all = preset_scenarios();
        assert_eq!(all.len(), 8);
        let mut names: Vec<_> = all.iter().map(|s| s.name.to_lowercase()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), all.len());
        assert!(all.iter().all(|s| !s.shocks.is_flat()));
    }

    #[test]
    fn test_lookup() {
        let gfc = preset("gfc 2008").unwrap();
        assert_eq!(gfc.scenario_type, ScenarioType::Historical);
        assert_eq!(gfc.shocks.get(StressFactor::Credit), dec!(400));
        assert_eq!(
            preset("Market decline -25%").unwrap().shocks.normalized(StressFactor::Equity),
            dec!(-0.25)
        );
        assert!(preset("Alien invasion").is_none());
    }
}
