use serde_json::Value;

use super::scalar_text;

/// Headline figure of each command, in priority order.
const PRIORITY_KEYS: [&str; 8] = [
    "var_amount",
    "total_impact",
    "worst_case",
    "var_spread",
    "ending_value",
    "sharpe_ratio",
    "version",
    "name",
];

/// Print just the key answer value from the output.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Value::Object(map) = result_obj {
        for key in PRIORITY_KEYS {
            if let Some(val) = map.get(key).filter(|v| !v.is_null()) {
                println!("{}", scalar_text(val));
                return;
            }
        }
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, scalar_text(val));
            return;
        }
    }

    if let Value::Array(items) = result_obj {
        for item in items {
            match item.get("name") {
                Some(name) => println!("{}", scalar_text(name)),
                None => println!("{}", scalar_text(item)),
            }
        }
        return;
    }
    println!("{}", scalar_text(result_obj));
}
