pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use clap::ValueEnum;
use serde_json::Value;

/// Rendering of a command's JSON envelope on stdout.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

impl OutputFormat {
    pub fn print(self, value: &Value) {
        match self {
            OutputFormat::Json => json::print_json(value),
            OutputFormat::Table => table::print_table(value),
            OutputFormat::Csv => csv_out::print_csv(value),
            OutputFormat::Minimal => minimal::print_minimal(value),
        }
    }
}

/// Row-shaped arrays inside a result, in display order.
pub(crate) const ROW_ARRAYS: [&str; 5] = [
    "results",
    "scenario_results",
    "assets",
    "asset_class_impacts",
    "component_var",
];

/// Dated `{date, value}` series; summarised in tables, written as rows in CSV.
pub(crate) const SERIES_ARRAYS: [&str; 2] = ["equity_curve", "drawdown"];

pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// "N points, first date .. last date (last value)".
pub(crate) fn series_summary(points: &[Value]) -> String {
    let date = |p: Option<&Value>| p.and_then(|p| p.get("date")).map(scalar_text).unwrap_or_default();
    match points.last() {
        None => "0 points".to_string(),
        Some(last) => format!(
            "{} points, {} .. {} ({})",
            points.len(),
            date(points.first()),
            date(Some(last)),
            last.get("value").map(scalar_text).unwrap_or_default()
        ),
    }
}
