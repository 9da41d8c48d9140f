use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use super::provider::PriceHistory;
use crate::config::{ReturnConfig, ReturnMethod};
use crate::error::RiskEngineError;
use crate::RiskEngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Aligned, symbol-ordered periodic returns.
///
/// Always column-major with one column per requested symbol, so a single
/// symbol is a one-column matrix rather than a bare series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnMatrix {
    /// Date of the closing price that ends each return period
    dates: Vec<NaiveDate>,
    symbols: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl ReturnMatrix {
    /// Build a matrix from pre-computed return columns.
    ///
    /// Every column must be as long as `dates`, and there must be exactly one
    /// column per symbol.
    pub fn new(
        dates: Vec<NaiveDate>,
        symbols: Vec<String>,
        columns: Vec<Vec<f64>>,
    ) -> RiskEngineResult<Self> {
        if symbols.is_empty() {
            return Err(RiskEngineError::invalid(
                "symbols",
                "return matrix needs at least one symbol",
            ));
        }
        if symbols.len() != columns.len() {
            return Err(RiskEngineError::invalid(
                "columns",
                format!("{} symbols but {} return columns", symbols.len(), columns.len()),
            ));
        }
        if let Some((i, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != dates.len()) {
            return Err(RiskEngineError::invalid(
                "columns",
                format!(
                    "column for '{}' has {} returns but the date index has {}",
                    symbols[i],
                    col.len(),
                    dates.len()
                ),
            ));
        }
        Ok(Self {
            dates,
            symbols,
            columns,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn n_obs(&self) -> usize {
        self.dates.len()
    }

    pub fn n_assets(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_single_asset(&self) -> bool {
        self.symbols.len() == 1
    }

    pub fn column(&self, index: usize) -> Option<&[f64]> {
        self.columns.get(index).map(Vec::as_slice)
    }

    pub fn column_by_symbol(&self, symbol: &str) -> Option<&[f64]> {
        self.symbols
            .iter()
            .position(|s| s == symbol)
            .and_then(|i| self.column(i))
    }

    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Sub-matrix over `symbols`, in the order given, on the same dates.
    pub fn select(&self, symbols: &[String]) -> RiskEngineResult<ReturnMatrix> {
        let columns = symbols
            .iter()
            .map(|symbol| {
                self.column_by_symbol(symbol)
                    .map(<[f64]>::to_vec)
                    .ok_or_else(|| RiskEngineError::UnknownSymbol(symbol.clone()))
            })
            .collect::<RiskEngineResult<Vec<_>>>()?;
        ReturnMatrix::new(self.dates.clone(), symbols.to_vec(), columns)
    }
}

/// Turns raw price history into an aligned [`ReturnMatrix`].
#[derive(Debug, Clone)]
pub struct ReturnSeriesBuilder {
    config: ReturnConfig,
    lookback_years: u32,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl ReturnSeriesBuilder {
    pub fn new(config: ReturnConfig) -> Self {
        Self {
            lookback_years: config.min_lookback_years.max(1),
            config,
        }
    }

    pub fn lookback_years(mut self, years: u32) -> Self {
        self.lookback_years = years;
        self
    }

    pub fn method(mut self, method: ReturnMethod) -> Self {
        self.config.method = method;
        self
    }

    /// Minimum aligned returns this builder will accept.
    pub fn required_observations(&self) -> usize {
        self.config.required_observations(self.lookback_years)
    }

    /// Align `symbols` on their common dates and compute returns.
    ///
    /// Columns follow the order of `symbols`. Only the most recent
    /// `trading_days_per_year × lookback_years` returns are kept.
    pub fn build(&self, history: &PriceHistory, symbols: &[String]) -> RiskEngineResult<ReturnMatrix> {
        if symbols.is_empty() {
            return Err(RiskEngineError::invalid(
                "symbols",
                "at least one symbol is required",
            ));
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = symbols.iter().find(|s| !seen.insert(s.as_str())) {
            return Err(RiskEngineError::invalid(
                "symbols",
                format!("symbol '{}' requested more than once", dup),
            ));
        }

        let closes = symbols
            .iter()
            .map(|symbol| closes_by_date(history, symbol))
            .collect::<RiskEngineResult<Vec<_>>>()?;

        // A listed symbol with no closes in the window has too little history
        if let Some(pos) = closes.iter().position(BTreeMap::is_empty) {
            return Err(RiskEngineError::insufficient(
                format!(
                    "price history for '{}' within {} year(s)",
                    symbols[pos], self.lookback_years
                ),
                self.required_observations().max(1),
                0,
            ));
        }

        let common = common_dates(&closes);
        debug!(
            symbols = symbols.len(),
            aligned_dates = common.len(),
            "aligned price history"
        );

        let price_rows = common.len();
        let n_returns = price_rows.saturating_sub(1);
        let keep = n_returns.min(self.config.window_len(self.lookback_years));
        let required = self.required_observations().max(1);
        if keep < required {
            return Err(RiskEngineError::insufficient(
                format!(
                    "aligned history for {} over {} year(s)",
                    symbols.join(", "),
                    self.lookback_years
                ),
                required,
                keep,
            ));
        }

        // Last `keep + 1` aligned closes produce `keep` returns
        let dates_window = &common[price_rows - keep - 1..];
        let columns = closes
            .iter()
            .map(|series| {
                dates_window
                    .windows(2)
                    .map(|pair| {
                        let prev = series[&pair[0]];
                        let curr = series[&pair[1]];
                        periodic_return(prev, curr, self.config.method)
                    })
                    .collect::<Vec<f64>>()
            })
            .collect();

        ReturnMatrix::new(dates_window[1..].to_vec(), symbols.to_vec(), columns)
    }
}

// ---------------------------------------------------------------------------
// Internal logic
// ---------------------------------------------------------------------------

/// Missing symbols are unknown; a present but empty series yields an empty map.
fn closes_by_date(history: &PriceHistory, symbol: &str) -> RiskEngineResult<BTreeMap<NaiveDate, f64>> {
    let points = history
        .get(symbol)
        .ok_or_else(|| RiskEngineError::UnknownSymbol(symbol.to_string()))?;
    let mut out = BTreeMap::new();
    for p in points {
        if !p.close.is_finite() || p.close <= 0.0 {
            return Err(RiskEngineError::invalid(
                "close",
                format!("{} on {} has non-positive close {}", symbol, p.date, p.close),
            ));
        }
        out.insert(p.date, p.close);
    }
    Ok(out)
}

/// Inner join of the date indexes, chronological.
fn common_dates(closes: &[BTreeMap<NaiveDate, f64>]) -> Vec<NaiveDate> {
    let Some((first, rest)) = closes.split_first() else {
        return Vec::new();
    };
    first
        .keys()
        .filter(|d| rest.iter().all(|series| series.contains_key(*d)))
        .copied()
        .collect()
}

fn periodic_return(prev: f64, curr: f64, method: ReturnMethod) -> f64 {
    match method {
        ReturnMethod::Simple => curr / prev - 1.0,
        ReturnMethod::Log => (curr / prev).ln(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::returns::PricePoint;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn small_config() -> ReturnConfig {
        // window 40 per year, 32 required with 0.8 coverage
        ReturnConfig {
            trading_days_per_year: 40,
            ..ReturnConfig::default()
        }
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn series(n: usize, offset_days: i64, phase: f64) -> Vec<PricePoint> {
        (0..n)
            .map(|i| PricePoint {
                date: start() + Duration::days(i as i64 + offset_days),
                close: 100.0 * (1.0 + 0.02 * ((i as f64) * 0.7 + phase).sin()),
            })
            .collect()
    }

    fn syms(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_symbol_is_one_column_matrix() {
        let history = PriceHistory::new().with_series("AAPL", series(60, 0, 0.0));
        let m = ReturnSeriesBuilder::new(small_config())
            .build(&history, &syms(&["AAPL"]))
            .unwrap();
        assert_eq!(m.n_assets(), 1);
        assert!(m.is_single_asset());
        assert_eq!(m.columns().len(), 1);
        assert_eq!(m.column(0).unwrap().len(), m.n_obs());
        assert_eq!(m.n_obs(), 40);
    }

    #[test]
    fn test_ragged_histories_inner_join() {
        // MSFT starts 10 days later, so 50 common closes, 49 returns
        let history = PriceHistory::new()
            .with_series("AAPL", series(60, 0, 0.0))
            .with_series("MSFT", series(50, 10, 1.0));
        let m = ReturnSeriesBuilder::new(ReturnConfig {
            trading_days_per_year: 100,
            min_history_coverage: 0.4,
            ..ReturnConfig::default()
        })
        .build(&history, &syms(&["MSFT", "AAPL"]))
        .unwrap();
        assert_eq!(m.symbols(), &syms(&["MSFT", "AAPL"])[..]);
        assert_eq!(m.n_obs(), 49);
        assert_eq!(m.dates()[0], start() + Duration::days(11));
        assert!(m.dates().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_simple_and_log_returns() {
        let points: Vec<PricePoint> = (0..40)
            .map(|i| PricePoint {
                date: start() + Duration::days(i),
                close: if i % 2 == 0 { 100.0 } else { 110.0 },
            })
            .collect();
        let history = PriceHistory::new().with_series("X", points);
        let simple = ReturnSeriesBuilder::new(small_config())
            .build(&history, &syms(&["X"]))
            .unwrap();
        let first = simple.column(0).unwrap()[0];
        assert!((first - 0.10).abs() < 1e-12, "expected 10% up-move, got {}", first);

        let log = ReturnSeriesBuilder::new(small_config())
            .method(ReturnMethod::Log)
            .build(&history, &syms(&["X"]))
            .unwrap();
        let first = log.column(0).unwrap()[0];
        assert!((first - 1.1_f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_keeps_most_recent_window() {
        let history = PriceHistory::new().with_series("AAPL", series(200, 0, 0.0));
        let m = ReturnSeriesBuilder::new(small_config())
            .lookback_years(2)
            .build(&history, &syms(&["AAPL"]))
            .unwrap();
        assert_eq!(m.n_obs(), 80);
        assert_eq!(*m.dates().last().unwrap(), start() + Duration::days(199));
    }

    #[test]
    fn test_empty_alignment_is_insufficient_data() {
        // Disjoint date ranges: zero rows after alignment
        let history = PriceHistory::new()
            .with_series("AAPL", series(40, 0, 0.0))
            .with_series("MSFT", series(40, 100, 0.0));
        let err = ReturnSeriesBuilder::new(small_config())
            .build(&history, &syms(&["AAPL", "MSFT"]))
            .unwrap_err();
        match err {
            RiskEngineError::InsufficientData {
                required, available, ..
            } => {
                assert_eq!(required, 32);
                assert_eq!(available, 0);
            }
            other => panic!("expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_below_hard_floor_is_rejected() {
        let history = PriceHistory::new().with_series("AAPL", series(20, 0, 0.0));
        let err = ReturnSeriesBuilder::new(small_config())
            .build(&history, &syms(&["AAPL"]))
            .unwrap_err();
        assert!(matches!(err, RiskEngineError::InsufficientData { .. }));
    }

    #[test]
    fn test_unknown_symbol() {
        let history = PriceHistory::new().with_series("AAPL", series(60, 0, 0.0));
        let builder = ReturnSeriesBuilder::new(small_config());
        match builder.build(&history, &syms(&["AAPL", "NOPE"])) {
            Err(RiskEngineError::UnknownSymbol(s)) => assert_eq!(s, "NOPE"),
            other => panic!("expected UnknownSymbol, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_series_is_insufficient_not_unknown() {
        let history = PriceHistory::new()
            .with_series("AAPL", series(60, 0, 0.0))
            .with_series("EMPTY", vec![]);
        let builder = ReturnSeriesBuilder::new(small_config());
        match builder.build(&history, &syms(&["AAPL", "EMPTY"])) {
            Err(RiskEngineError::InsufficientData {
                context,
                required,
                available,
            }) => {
                assert!(context.contains("EMPTY"), "context: {}", context);
                assert_eq!(required, 32);
                assert_eq!(available, 0);
            }
            other => panic!("expected InsufficientData, got {:?}", other),
        }
    }

    #[test]
    fn test_select_reorders_and_rejects_unknown_columns() {
        let history = PriceHistory::new()
            .with_series("AAPL", series(60, 0, 0.0))
            .with_series("MSFT", series(60, 0, 1.0));
        let m = ReturnSeriesBuilder::new(small_config())
            .build(&history, &syms(&["AAPL", "MSFT"]))
            .unwrap();
        let sub = m.select(&syms(&["MSFT"])).unwrap();
        assert_eq!(sub.symbols(), &syms(&["MSFT"])[..]);
        assert_eq!(sub.column(0), m.column_by_symbol("MSFT"));
        assert_eq!(sub.dates(), m.dates());
        assert!(matches!(
            m.select(&syms(&["NOPE"])),
            Err(RiskEngineError::UnknownSymbol(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_symbols_and_bad_prices() {
        let mut bad = series(60, 0, 0.0);
        bad[5].close = 0.0;
        let history = PriceHistory::new()
            .with_series("AAPL", series(60, 0, 0.0))
            .with_series("BAD", bad);
        let builder = ReturnSeriesBuilder::new(small_config());
        assert!(matches!(
            builder.build(&history, &syms(&["AAPL", "AAPL"])),
            Err(RiskEngineError::InvalidInput { .. })
        ));
        assert!(matches!(
            builder.build(&history, &syms(&["BAD"])),
            Err(RiskEngineError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_matrix_rejects_ragged_columns() {
        let dates = vec![start(), start() + Duration::days(1)];
        let err = ReturnMatrix::new(dates, syms(&["A", "B"]), vec![vec![0.1, 0.2], vec![0.1]]);
        assert!(err.is_err());
    }
}
