pub mod file;
pub mod stdin;

use serde::de::DeserializeOwned;

/// Deserialize from `--input <file>` (JSON or TOML) if given, otherwise from
/// piped JSON on stdin.
pub fn read_input<T: DeserializeOwned>(
    path: Option<&str>,
    what: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        file::read_document(path, what)
    } else if let Some(parsed) = stdin::read_stdin(what)? {
        Ok(parsed)
    } else {
        Err(format!("--input <file> or JSON on stdin required for {}", what).into())
    }
}
