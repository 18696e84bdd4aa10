// Array-producing functions. Their results spread from the formula cell.

use ordered_float::OrderedFloat;
use rustc_hash::FxHashSet;

use super::{try_value, FunctionDefinition, FunctionRegistry, ParamType};
use crate::formula::value::{Array2D, CellError, EvalResult, Value};

/// Upper bound on generated array cells.
const MAX_ARRAY_CELLS: usize = 1_000_000;

pub(super) fn register(r: &mut FunctionRegistry) {
    r.register(FunctionDefinition::range(
        "SEQUENCE",
        1,
        vec![ParamType::Number, ParamType::Number, ParamType::Number, ParamType::Number],
        |args, _| {
            let rows = try_value!(args[0].number()).trunc();
            let cols = match args.get(1) {
                Some(a) => try_value!(a.number()).trunc(),
                None => 1.0,
            };
            let start = match args.get(2) {
                Some(a) => try_value!(a.number()),
                None => 1.0,
            };
            let step = match args.get(3) {
                Some(a) => try_value!(a.number()),
                None => 1.0,
            };
            if rows < 1.0 || cols < 1.0 {
                return CellError::value("SEQUENCE needs at least one row and column").into();
            }
            let (rows, cols) = (rows as usize, cols as usize);
            if rows.saturating_mul(cols) > MAX_ARRAY_CELLS {
                return CellError::value("SEQUENCE result is too large").into();
            }
            let mut arr = Array2D::new(rows, cols);
            for r in 0..rows {
                for c in 0..cols {
                    let i = (r * cols + c) as f64;
                    arr.set(r, c, Value::Number(start + i * step));
                }
            }
            EvalResult::Array(arr)
        },
    ));

    r.register(FunctionDefinition::fixed("TRANSPOSE", vec![ParamType::Any], |args, _| {
        let src = args[0].array();
        let mut arr = Array2D::new(src.cols(), src.rows());
        for r in 0..src.rows() {
            for c in 0..src.cols() {
                if let Some(v) = src.get(r, c) {
                    arr.set(c, r, v.clone());
                }
            }
        }
        EvalResult::Array(arr)
    }));

    // Distinct rows, first occurrence wins. Text keys are case-insensitive.
    r.register(FunctionDefinition::fixed("UNIQUE", vec![ParamType::Range], |args, _| {
        let src = args[0].array();
        let mut seen = FxHashSet::default();
        let mut rows = Vec::new();
        for r in 0..src.rows() {
            let Some(row) = src.row(r) else {
                continue;
            };
            if let Some(e) = row.iter().find_map(|v| v.as_error()) {
                return e.clone().into();
            }
            let key: Vec<RowKey> = row.iter().map(RowKey::of).collect();
            if seen.insert(key) {
                rows.push(row.to_vec());
            }
        }
        EvalResult::Array(Array2D::from_rows(rows))
    }));
}

#[derive(Debug, PartialEq, Eq, Hash)]
enum RowKey {
    Empty,
    Number(OrderedFloat<f64>),
    Text(String),
    Boolean(bool),
}

impl RowKey {
    fn of(v: &Value) -> Self {
        match v {
            Value::Number(n) => RowKey::Number(OrderedFloat(*n)),
            Value::Text(s) => RowKey::Text(s.to_lowercase()),
            Value::Boolean(b) => RowKey::Boolean(*b),
            // Errors were rejected before keying
            Value::Empty | Value::Error(_) => RowKey::Empty,
        }
    }
}
