// Engine settings
// Loaded from a JSON or TOML document supplied by the host

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{EngineError, Result};

/// Locale used to read and display numbers and formula argument lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Locale {
    /// Decimal separator in number literals ('.' or ',')
    pub decimal_separator: char,

    /// Function argument separator (',' or ';')
    pub argument_separator: char,

    /// Digit grouping separator used when formatting
    pub thousands_separator: char,
}

impl Default for Locale {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            argument_separator: ',',
            thousands_separator: ',',
        }
    }
}

impl Locale {
    /// The locale formulas are stored in.
    pub fn canonical() -> Self {
        Self::default()
    }

    /// Common continental-European locale: `1,5` and `SUM(A1;A2)`.
    pub fn comma_decimal() -> Self {
        Self {
            decimal_separator: ',',
            argument_separator: ';',
            thousands_separator: '.',
        }
    }

    pub fn is_canonical(&self) -> bool {
        self.decimal_separator == '.' && self.argument_separator == ','
    }

    fn validate(&self) -> Result<()> {
        if self.decimal_separator == self.argument_separator {
            return Err(EngineError::InvalidSettings(format!(
                "decimal separator and argument separator are both '{}'",
                self.decimal_separator
            )));
        }
        if !matches!(self.decimal_separator, '.' | ',') {
            return Err(EngineError::InvalidSettings(format!(
                "unsupported decimal separator '{}'",
                self.decimal_separator
            )));
        }
        if !matches!(self.argument_separator, ',' | ';') {
            return Err(EngineError::InvalidSettings(format!(
                "unsupported argument separator '{}'",
                self.argument_separator
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Display locale
    pub locale: Locale,

    /// Row count of sheets created without explicit dimensions
    pub default_rows: usize,

    /// Column count of sheets created without explicit dimensions
    pub default_cols: usize,

    /// Maximum number of local revisions kept for undo
    pub max_history: usize,

    /// Cells evaluated per step by chunked jobs
    pub job_chunk_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            default_rows: 100,
            default_cols: 26,
            max_history: 100,
            job_chunk_size: 500,
        }
    }
}

impl EngineSettings {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from disk, picking the format from the file extension.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            _ => Err(EngineError::UnsupportedSettingsFile(
                path.display().to_string(),
            )),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.locale.validate()?;
        if self.default_rows == 0 || self.default_cols == 0 {
            return Err(EngineError::InvalidSettings(
                "default sheet dimensions must be non-zero".to_string(),
            ));
        }
        if self.job_chunk_size == 0 {
            return Err(EngineError::InvalidSettings(
                "job_chunk_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = EngineSettings::default();
        assert_eq!(s.max_history, 100);
        assert!(s.locale.is_canonical());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let s = EngineSettings::from_json_str(r#"{"max_history": 5}"#).unwrap();
        assert_eq!(s.max_history, 5);
        assert_eq!(s.default_rows, 100);
    }

    #[test]
    fn test_toml_locale() {
        let text = r#"
default_cols = 10

[locale]
decimal_separator = ","
argument_separator = ";"
thousands_separator = "."
"#;
        let s = EngineSettings::from_toml_str(text).unwrap();
        assert_eq!(s.default_cols, 10);
        assert_eq!(s.locale, Locale::comma_decimal());
    }

    #[test]
    fn test_conflicting_separators_rejected() {
        let text = r#"{"locale": {"decimal_separator": ",", "argument_separator": ","}}"#;
        let err = EngineSettings::from_json_str(text).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSettings(_)));
    }

    #[test]
    fn test_unknown_extension() {
        let err = EngineSettings::load(Path::new("/nonexistent/settings.yaml")).unwrap_err();
        // Reading fails first for a missing file
        assert!(matches!(err, EngineError::Io(_)));
    }
}
