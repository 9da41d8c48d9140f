use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

type InputResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Document syntax, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Json,
    Toml,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> InputResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(DocumentKind::Json),
            Some("toml") => Ok(DocumentKind::Toml),
            _ => Err(format!(
                "Unsupported input '{}': expected a .json or .toml file",
                path.display()
            )
            .into()),
        }
    }

    fn parse<T: DeserializeOwned>(self, contents: &str) -> Result<T, String> {
        match self {
            DocumentKind::Json => serde_json::from_str(contents).map_err(|e| e.to_string()),
            DocumentKind::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
        }
    }
}

/// Read `what` (positions and prices, a config, ...) from a JSON or TOML file.
pub fn read_document<T: DeserializeOwned>(path: &str, what: &str) -> InputResult<T> {
    let resolved = resolve_path(path, what)?;
    let kind = DocumentKind::from_path(&resolved)?;
    let contents = fs::read_to_string(&resolved)
        .map_err(|e| format!("Cannot read {} from '{}': {}", what, resolved.display(), e))?;
    kind.parse(&contents)
        .map_err(|e| format!("Invalid {} in '{}': {}", what, resolved.display(), e).into())
}

fn resolve_path(path: &str, what: &str) -> InputResult<PathBuf> {
    let p = Path::new(path);
    let resolved = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };
    if !resolved.is_file() {
        return Err(format!("No {} file at {}", what, resolved.display()).into());
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Request {
        confidence_level: f64,
        symbols: Vec<String>,
    }

    fn write_temp(name: &str, contents: &str) -> String {
        let path = std::env::temp_dir().join(format!("riskctl-{}-{}", std::process::id(), name));
        fs::write(&path, contents).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_json_and_toml_documents_parse_alike() {
        let json = write_temp("req.json", r#"{"confidence_level": 0.99, "symbols": ["AAPL"]}"#);
        let toml = write_temp("req.toml", "confidence_level = 0.99\nsymbols = [\"AAPL\"]\n");
        let expected = Request {
            confidence_level: 0.99,
            symbols: vec!["AAPL".into()],
        };
        assert_eq!(read_document::<Request>(&json, "request").unwrap(), expected);
        assert_eq!(read_document::<Request>(&toml, "request").unwrap(), expected);
    }

    #[test]
    fn test_errors_name_the_document() {
        let csv = write_temp("prices.csv", "date,close\n");
        let err = read_document::<Request>(&csv, "VaR calculation").unwrap_err();
        assert!(err.to_string().contains(".json or .toml"), "{}", err);

        let bad = write_temp("bad.json", r#"{"confidence_level": "high"}"#);
        let err = read_document::<Request>(&bad, "VaR calculation").unwrap_err();
        assert!(err.to_string().starts_with("Invalid VaR calculation in"), "{}", err);

        let err = read_document::<Request>("/nonexistent/req.json", "stress test").unwrap_err();
        assert!(err.to_string().starts_with("No stress test file at"), "{}", err);
    }
}
