use std::collections::BTreeMap;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::RiskEngineResult;

/// One adjusted close observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Normalized price table: symbol → chronologically ordered closes.
///
/// This is the single shape every market-data source is mapped into, whether it
/// was asked for one symbol or many.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceHistory {
    series: BTreeMap<String, Vec<PricePoint>>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) the series for a symbol. Points are sorted by date.
    pub fn insert(&mut self, symbol: impl Into<String>, mut points: Vec<PricePoint>) {
        points.sort_by_key(|p| p.date);
        self.series.insert(symbol.into(), points);
    }

    pub fn with_series(mut self, symbol: impl Into<String>, points: Vec<PricePoint>) -> Self {
        self.insert(symbol, points);
        self
    }

    pub fn get(&self, symbol: &str) -> Option<&[PricePoint]> {
        self.series.get(symbol).map(Vec::as_slice)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Latest observation date across all series.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.series
            .values()
            .filter_map(|points| points.last().map(|p| p.date))
            .max()
    }
}

/// Source of historical closes for a set of symbols.
///
/// Implementations omit symbols they know nothing about, which the return
/// builder reports as `UnknownSymbol`. A known symbol with no closes inside the
/// lookback stays present with an empty series and is reported as
/// `InsufficientData`.
pub trait MarketDataProvider {
    fn price_history(&self, symbols: &[String], lookback_years: u32) -> RiskEngineResult<PriceHistory>;
}

impl<T: MarketDataProvider + ?Sized> MarketDataProvider for &T {
    fn price_history(&self, symbols: &[String], lookback_years: u32) -> RiskEngineResult<PriceHistory> {
        (**self).price_history(symbols, lookback_years)
    }
}

/// Provider backed by a preloaded price table (CLI input files, tests).
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketData {
    history: PriceHistory,
}

impl InMemoryMarketData {
    pub fn new(history: PriceHistory) -> Self {
        Self { history }
    }
}

impl MarketDataProvider for InMemoryMarketData {
    fn price_history(&self, symbols: &[String], lookback_years: u32) -> RiskEngineResult<PriceHistory> {
        let cutoff = self
            .history
            .last_date()
            .and_then(|last| last.checked_sub_months(Months::new(12 * lookback_years)));

        let mut out = PriceHistory::new();
        for symbol in symbols {
            if let Some(points) = self.history.get(symbol) {
                let window: Vec<PricePoint> = points
                    .iter()
                    .filter(|p| cutoff.map_or(true, |c| p.date >= c))
                    .copied()
                    .collect();
                out.insert(symbol.clone(), window);
            }
        }
        Ok(out)
    }
}
