use serde::de::DeserializeOwned;
use std::io::{self, Read};

/// Deserialize `what` from piped stdin.
///
/// `None` when stdin is a terminal or carries only whitespace.
pub fn read_stdin<T: DeserializeOwned>(what: &str) -> Result<Option<T>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let parsed = serde_json::from_str(trimmed)
        .map_err(|e| format!("Failed to parse {} from stdin: {}", what, e))?;
    Ok(Some(parsed))
}
