use serde::{Deserialize, Serialize};

use super::formula::compiler::FormulaCell;
use super::formula::value::{parse_number_literal, Value};

/// Horizontal text alignment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// Cell style. Only set fields are persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(default, rename_all = "camelCase")]
pub struct Style {
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub bold: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub italic: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub underline: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub strikethrough: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub align: Option<Alignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
}

impl Style {
    pub fn is_default(&self) -> bool {
        self == &Style::default()
    }
}

/// What a cell holds.
#[derive(Debug, Clone)]
pub enum CellContent {
    /// Plain input and the value it reads as
    Literal { text: String, value: Value },
    Formula(FormulaCell),
}

#[derive(Debug, Clone)]
pub struct Cell {
    pub content: CellContent,
    pub style: Option<Style>,
    /// Number format pattern, e.g. `#,##0.00`
    pub format: Option<String>,
}

impl Cell {
    pub fn literal(text: &str) -> Self {
        Self {
            content: CellContent::Literal {
                text: text.to_string(),
                value: parse_literal(text),
            },
            style: None,
            format: None,
        }
    }

    /// Content as typed (canonical locale).
    pub fn text(&self) -> &str {
        match &self.content {
            CellContent::Literal { text, .. } => text,
            CellContent::Formula(f) => f.text(),
        }
    }

    pub fn formula(&self) -> Option<&FormulaCell> {
        match &self.content {
            CellContent::Formula(f) => Some(f),
            CellContent::Literal { .. } => None,
        }
    }

    pub fn is_formula(&self) -> bool {
        self.formula().is_some()
    }

    /// A cell with nothing left in it is dropped from its sheet.
    pub fn is_removable(&self) -> bool {
        self.text().is_empty() && self.style.is_none() && self.format.is_none()
    }
}

/// Whether text is formula input.
pub fn is_formula_text(text: &str) -> bool {
    text.starts_with('=')
}

/// Value of non-formula input: numbers (including `12%`), booleans, text.
pub fn parse_literal(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Empty;
    }
    if let Some(n) = parse_number_literal(trimmed) {
        return Value::Number(n);
    }
    if trimmed.eq_ignore_ascii_case("TRUE") {
        return Value::Boolean(true);
    }
    if trimmed.eq_ignore_ascii_case("FALSE") {
        return Value::Boolean(false);
    }
    Value::Text(text.to_string())
}

/// Type of an evaluated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellValueKind {
    Empty,
    Number,
    Text,
    Boolean,
    Error,
}

/// Read-only view of a cell after evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedCell {
    pub value: Value,
    pub kind: CellValueKind,
    /// Error message, for error values
    pub error: Option<String>,
    pub formatted_value: String,
}

impl EvaluatedCell {
    pub fn new(value: Value, formatted_value: String) -> Self {
        let kind = match &value {
            Value::Empty => CellValueKind::Empty,
            Value::Number(_) => CellValueKind::Number,
            Value::Text(_) => CellValueKind::Text,
            Value::Boolean(_) => CellValueKind::Boolean,
            Value::Error(_) => CellValueKind::Error,
        };
        let error = value.as_error().map(|e| e.message.clone());
        Self {
            value,
            kind,
            error,
            formatted_value,
        }
    }

    pub fn empty() -> Self {
        Self::new(Value::Empty, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literal() {
        assert_eq!(parse_literal("42"), Value::Number(42.0));
        assert_eq!(parse_literal("12%"), Value::Number(0.12));
        assert_eq!(parse_literal("true"), Value::Boolean(true));
        assert_eq!(parse_literal("hello"), Value::Text("hello".into()));
        assert_eq!(parse_literal(""), Value::Empty);
    }

    #[test]
    fn test_removable_cell() {
        let mut cell = Cell::literal("");
        assert!(cell.is_removable());
        cell.style = Some(Style {
            bold: true,
            ..Style::default()
        });
        assert!(!cell.is_removable());
    }

    #[test]
    fn test_style_serializes_only_set_fields() {
        let style = Style {
            italic: true,
            fill_color: Some("#ff0000".into()),
            ..Style::default()
        };
        let json = serde_json::to_string(&style).unwrap();
        assert_eq!(json, r##"{"italic":true,"fillColor":"#ff0000"}"##);
        assert!(Style::default().is_default());
    }

    #[test]
    fn test_evaluated_cell_kind() {
        let cell = EvaluatedCell::new(Value::Number(1.0), "1".into());
        assert_eq!(cell.kind, CellValueKind::Number);
        assert!(cell.error.is_none());
    }
}
