use thiserror::Error;

/// Top-level error type shared by the companion crates.
///
/// Subsystem crates define their own error enums and convert into this one
/// where a failure has to cross a crate boundary (configuration loading,
/// the binary's composition root).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompanionError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Dialogue error: {0}")]
    Dialogue(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for CompanionError {
    fn from(err: toml::de::Error) -> Self {
        CompanionError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CompanionError {
    fn from(err: toml::ser::Error) -> Self {
        CompanionError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CompanionError {
    fn from(err: serde_json::Error) -> Self {
        CompanionError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for companion operations.
pub type Result<T> = std::result::Result<T, CompanionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CompanionError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_error_display_variants() {
        let cases: Vec<(CompanionError, &str)> = vec![
            (
                CompanionError::Storage("quota exceeded".to_string()),
                "Storage error: quota exceeded",
            ),
            (
                CompanionError::Generation("timed out".to_string()),
                "Generation error: timed out",
            ),
            (
                CompanionError::Dialogue("bad stage".to_string()),
                "Dialogue error: bad stage",
            ),
            (
                CompanionError::Serialization("invalid json".to_string()),
                "Serialization error: invalid json",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CompanionError = io_err.into();
        assert!(matches!(err, CompanionError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let converted: CompanionError = err.unwrap_err().into();
        assert!(matches!(converted, CompanionError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let converted: CompanionError = err.unwrap_err().into();
        assert!(matches!(converted, CompanionError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let parsed: serde_json::Value = serde_json::from_str("{\"ok\":true}")?;
            Ok(parsed["ok"].to_string())
        }

        assert_eq!(inner().unwrap(), "true");
    }
}
