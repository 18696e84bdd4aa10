// Formula values: scalars, arrays and the error taxonomy

use std::cmp::Ordering;

/// Error categories a formula can evaluate to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Tokenizer or parser failure
    BadExpression,
    /// Unresolvable reference (deleted sheet, removed rows, outside the sheet)
    Ref,
    /// Circular dependency
    Cycle,
    DivisionByZero,
    /// Type coercion failure or wrong arguments
    Value,
    NotAvailable,
    /// Array result blocked by existing content
    Spread,
    /// Unknown function or name
    Name,
    /// External value requested but not delivered yet
    Loading,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::BadExpression => "#BAD_EXPR",
            ErrorKind::Ref => "#REF",
            ErrorKind::Cycle => "#CYCLE",
            ErrorKind::DivisionByZero => "#DIV/0",
            ErrorKind::Value => "#VALUE",
            ErrorKind::NotAvailable => "#N/A",
            ErrorKind::Spread => "#SPREAD",
            ErrorKind::Name => "#NAME?",
            ErrorKind::Loading => "Loading...",
        }
    }
}

/// An error value with a human-readable explanation.
#[derive(Debug, Clone, PartialEq)]
pub struct CellError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CellError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn bad_expression(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadExpression, message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Ref, message)
    }

    pub fn cycle() -> Self {
        Self::new(ErrorKind::Cycle, "Circular reference")
    }

    pub fn div_zero() -> Self {
        Self::new(ErrorKind::DivisionByZero, "Division by zero")
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Value, message)
    }

    pub fn not_available(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotAvailable, message)
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl std::fmt::Display for CellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind.code())
    }
}

// =============================================================================
// Value: the scalar primitive for all cell values
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(CellError),
}

impl Value {
    /// Arithmetic coercion: booleans are 1/0, blanks 0, numeric text parses.
    pub fn to_number(&self) -> Result<f64, CellError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Empty => Ok(0.0),
            Value::Text(s) if s.trim().is_empty() => Ok(0.0),
            Value::Text(s) => parse_number_literal(s.trim()).ok_or_else(|| {
                CellError::value(format!("The value \"{}\" cannot be read as a number", s))
            }),
            Value::Error(e) => Err(e.clone()),
        }
    }

    /// Text coercion: blanks are "", booleans TRUE/FALSE.
    pub fn to_text(&self) -> Result<String, CellError> {
        match self {
            Value::Error(e) => Err(e.clone()),
            other => Ok(other.display_text()),
        }
    }

    pub fn to_bool(&self) -> Result<bool, CellError> {
        match self {
            Value::Boolean(b) => Ok(*b),
            Value::Number(n) => Ok(*n != 0.0),
            Value::Empty => Ok(false),
            Value::Text(s) => match s.to_uppercase().as_str() {
                "TRUE" => Ok(true),
                "FALSE" => Ok(false),
                _ => Err(CellError::value(format!(
                    "The value \"{}\" cannot be read as a boolean",
                    s
                ))),
            },
            Value::Error(e) => Err(e.clone()),
        }
    }

    /// Unformatted textual rendering; errors render as their code.
    pub fn display_text(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Number(n) => format_general(*n),
            Value::Text(s) => s.clone(),
            Value::Boolean(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
            Value::Error(e) => e.code().to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn as_error(&self) -> Option<&CellError> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        if n.is_finite() {
            Value::Number(n)
        } else {
            Value::Error(CellError::value("Result is not a finite number"))
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<CellError> for Value {
    fn from(e: CellError) -> Self {
        Value::Error(e)
    }
}

/// Parse a canonical number literal (`.` decimal), including `50%`.
pub fn parse_number_literal(s: &str) -> Option<f64> {
    if let Some(stripped) = s.strip_suffix('%') {
        return parse_number_literal(stripped.trim_end()).map(|n| n / 100.0);
    }
    // Rust accepts "inf"/"nan"; spreadsheets don't
    if !s.chars().any(|c| c.is_ascii_digit())
        || s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E')
    {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// General number display: integers without decimals, others with up to
/// ten significant decimals and no trailing zeros.
pub fn format_general(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    if n.abs() >= 1e15 || (n != 0.0 && n.abs() < 1e-9) {
        return format!("{:E}", n);
    }
    let s = format!("{:.10}", n);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Spreadsheet comparison.
///
/// Blanks take the neutral value of the other side's type. Mixed types order
/// numbers < text < booleans. Text compares case-insensitively.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Number(_) => 0,
            Value::Text(_) => 1,
            Value::Boolean(_) => 2,
            Value::Empty | Value::Error(_) => 3,
        }
    }
    match (a, b) {
        (Value::Empty, Value::Empty) => Ordering::Equal,
        (Value::Error(_), _) | (_, Value::Error(_)) => rank(a).cmp(&rank(b)),
        (Value::Empty, other) => compare_values(&neutral_for(other), other),
        (other, Value::Empty) => compare_values(other, &neutral_for(other)),
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Text(x), Value::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn neutral_for(v: &Value) -> Value {
    match v {
        Value::Number(_) => Value::Number(0.0),
        Value::Text(_) => Value::Text(String::new()),
        Value::Boolean(_) => Value::Boolean(false),
        _ => Value::Empty,
    }
}

// =============================================================================
// Array2D: 2D grid of Values (dense storage, row-major)
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Array2D {
    data: Vec<Value>,
    rows: usize,
    cols: usize,
}

impl Array2D {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![Value::Empty; rows * cols],
            rows,
            cols,
        }
    }

    pub fn from_rows(data: Vec<Vec<Value>>) -> Self {
        let rows = data.len();
        let cols = data.iter().map(Vec::len).max().unwrap_or(0);
        let mut flat = Vec::with_capacity(rows * cols);
        for row in data {
            let len = row.len();
            flat.extend(row);
            // Ragged input is padded with blanks
            flat.extend(std::iter::repeat(Value::Empty).take(cols.saturating_sub(len)));
        }
        Self { data: flat, rows, cols }
    }

    pub fn column(values: Vec<Value>) -> Self {
        let rows = values.len();
        Self {
            data: values,
            rows,
            cols: 1,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Value> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col)
        } else {
            None
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: Value) {
        if row < self.rows && col < self.cols {
            self.data[row * self.cols + col] = value;
        }
    }

    pub fn top_left(&self) -> Value {
        self.get(0, 0).cloned().unwrap_or(Value::Empty)
    }

    pub fn is_scalar(&self) -> bool {
        self.rows == 1 && self.cols == 1
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Values in row-major order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.data.iter()
    }

    pub fn row(&self, row: usize) -> Option<&[Value]> {
        if row >= self.rows {
            return None;
        }
        let start = row * self.cols;
        self.data.get(start..start + self.cols)
    }
}

// =============================================================================
// EvalResult: the result of evaluating an expression (scalar or array)
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum EvalResult {
    Scalar(Value),
    Array(Array2D),
}

impl EvalResult {
    pub fn error(e: CellError) -> Self {
        EvalResult::Scalar(Value::Error(e))
    }

    /// Collapse to a single value. 1x1 arrays unwrap; larger arrays are a
    /// `#VALUE` error in scalar context.
    pub fn into_scalar(self) -> Value {
        match self {
            EvalResult::Scalar(v) => v,
            EvalResult::Array(arr) if arr.is_scalar() => arr.top_left(),
            EvalResult::Array(_) => {
                Value::Error(CellError::value("Expected a single value, got a range"))
            }
        }
    }

    pub fn into_array(self) -> Array2D {
        match self {
            EvalResult::Array(arr) => arr,
            EvalResult::Scalar(v) => Array2D::from_rows(vec![vec![v]]),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, EvalResult::Scalar(Value::Error(_)))
    }

    pub fn dimensions(&self) -> (usize, usize) {
        match self {
            EvalResult::Array(arr) => (arr.rows(), arr.cols()),
            EvalResult::Scalar(_) => (1, 1),
        }
    }
}

impl From<Value> for EvalResult {
    fn from(v: Value) -> Self {
        EvalResult::Scalar(v)
    }
}

impl From<f64> for EvalResult {
    fn from(n: f64) -> Self {
        EvalResult::Scalar(n.into())
    }
}

impl From<bool> for EvalResult {
    fn from(b: bool) -> Self {
        EvalResult::Scalar(Value::Boolean(b))
    }
}

impl From<String> for EvalResult {
    fn from(s: String) -> Self {
        EvalResult::Scalar(Value::Text(s))
    }
}

impl From<CellError> for EvalResult {
    fn from(e: CellError) -> Self {
        EvalResult::Scalar(Value::Error(e))
    }
}

impl From<Array2D> for EvalResult {
    fn from(arr: Array2D) -> Self {
        EvalResult::Array(arr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorKind::DivisionByZero.code(), "#DIV/0");
        assert_eq!(ErrorKind::Name.code(), "#NAME?");
        assert_eq!(CellError::cycle().to_string(), "#CYCLE");
    }

    #[test]
    fn test_number_coercion() {
        assert_eq!(Value::Boolean(true).to_number(), Ok(1.0));
        assert_eq!(Value::Empty.to_number(), Ok(0.0));
        assert_eq!(Value::Text("4".into()).to_number(), Ok(4.0));
        assert_eq!(Value::Text("50%".into()).to_number(), Ok(0.5));
        let err = Value::Text("abc".into()).to_number().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
        assert!(Value::Text("inf".into()).to_number().is_err());
    }

    #[test]
    fn test_text_coercion() {
        assert_eq!(Value::Empty.to_text().unwrap(), "");
        assert_eq!(Value::Number(3.0).to_text().unwrap(), "3");
        assert_eq!(Value::Number(0.1 + 0.2).to_text().unwrap(), "0.3");
        assert_eq!(Value::Boolean(false).to_text().unwrap(), "FALSE");
    }

    #[test]
    fn test_text_greater_than_number() {
        let t = Value::Text("1".into());
        let n = Value::Number(1000.0);
        assert_eq!(compare_values(&t, &n), Ordering::Greater);
        assert_eq!(compare_values(&Value::Boolean(false), &t), Ordering::Greater);
    }

    #[test]
    fn test_text_compare_is_lexicographic() {
        let a = Value::Text("4".into());
        let b = Value::Text("12".into());
        assert_eq!(compare_values(&a, &b), Ordering::Greater);
        assert_eq!(
            compare_values(&Value::Text("abc".into()), &Value::Text("ABC".into())),
            Ordering::Equal
        );
    }

    #[test]
    fn test_blank_compares_as_neutral() {
        assert_eq!(compare_values(&Value::Empty, &Value::Number(0.0)), Ordering::Equal);
        assert_eq!(compare_values(&Value::Empty, &Value::Text("".into())), Ordering::Equal);
        assert_eq!(compare_values(&Value::Empty, &Value::Number(-1.0)), Ordering::Greater);
    }

    #[test]
    fn test_array_scalar_context() {
        let single = EvalResult::Array(Array2D::from_rows(vec![vec![Value::Number(2.0)]]));
        assert_eq!(single.into_scalar(), Value::Number(2.0));
        let wide = EvalResult::Array(Array2D::new(1, 2));
        assert_eq!(
            wide.into_scalar().as_error().map(|e| e.kind),
            Some(ErrorKind::Value)
        );
    }

    #[test]
    fn test_from_rows_pads_ragged() {
        let arr = Array2D::from_rows(vec![
            vec![Value::Number(1.0), Value::Number(2.0)],
            vec![Value::Number(3.0)],
        ]);
        assert_eq!(arr.get(1, 1), Some(&Value::Empty));
    }

    #[test]
    fn test_from_rows_widens_to_longest_row() {
        let arr = Array2D::from_rows(vec![
            vec![Value::Number(1.0)],
            vec![Value::Number(2.0), Value::Number(3.0)],
            vec![Value::Number(4.0)],
        ]);
        assert_eq!(arr.cols(), 2);
        assert_eq!(arr.row(0), Some(&[Value::Number(1.0), Value::Empty][..]));
        assert_eq!(arr.row(1), Some(&[Value::Number(2.0), Value::Number(3.0)][..]));
        assert_eq!(arr.get(2, 0), Some(&Value::Number(4.0)));
    }

    #[test]
    fn test_row_out_of_range_is_none() {
        let arr = Array2D::column(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(arr.row(1), Some(&[Value::Number(2.0)][..]));
        assert_eq!(arr.row(2), None);
        assert_eq!(Array2D::new(0, 0).row(0), None);
    }

    #[test]
    fn test_non_finite_number_is_error() {
        assert!(Value::from(f64::INFINITY).is_error());
    }
}
