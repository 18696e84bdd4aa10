//! Error types for the engine.
//!
//! Formula-level problems are values (see [`crate::formula::value::CellError`]),
//! dispatch problems are [`crate::commands::CancelledReason`]s. The types here
//! cover everything that is a genuine Rust error: bad settings, bad persisted
//! data and malformed formula text at the compile boundary.

use thiserror::Error;

/// Errors surfaced by the engine's fallible entry points.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("unsupported settings file: {0}")]
    UnsupportedSettingsFile(String),

    #[error("invalid cell address '{0}'")]
    InvalidAddress(String),

    #[error("invalid workbook data: {0}")]
    InvalidWorkbook(String),

    #[error("unsupported workbook version {found} (expected at most {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Tokenizer or parser failure.
///
/// `position` is the byte offset in the formula text where the problem was
/// detected.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} (at {position})")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("Unexpected character '#'", 3);
        assert_eq!(err.to_string(), "Unexpected character '#' (at 3)");
    }

    #[test]
    fn test_engine_error_from_json() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: EngineError = bad.unwrap_err().into();
        assert!(err.to_string().starts_with("JSON error"));
    }
}
