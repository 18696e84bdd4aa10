// Lookup functions

use std::cmp::Ordering;

use super::{try_value, FunctionDefinition, FunctionRegistry, ParamType};
use crate::formula::value::{compare_values, CellError, EvalResult, Value};

pub(super) fn register(r: &mut FunctionRegistry) {
    r.register(FunctionDefinition::range(
        "VLOOKUP",
        3,
        vec![ParamType::Any, ParamType::Range, ParamType::Number, ParamType::Logical],
        |args, _| {
            let key = args[0].value();
            if let Value::Error(e) = &key {
                return e.clone().into();
            }
            let table = args[1].array();
            let index = try_value!(args[2].number()).trunc();
            if index < 1.0 || index as usize > table.cols() {
                return CellError::value(format!(
                    "VLOOKUP column index {} is out of the range's {} columns",
                    index,
                    table.cols()
                ))
                .into();
            }
            let sorted = match args.get(3) {
                Some(a) => try_value!(a.boolean()),
                None => true,
            };
            let first_col: Vec<Value> =
                (0..table.rows()).map(|r| table.get(r, 0).cloned().unwrap_or_default()).collect();
            let found = if sorted {
                approximate_match(&key, &first_col)
            } else {
                exact_match(&key, &first_col)
            };
            match found {
                Some(row) => EvalResult::from(table.get(row, index as usize - 1).cloned().unwrap_or_default()),
                None => not_found("VLOOKUP", &key).into(),
            }
        },
    ));

    r.register(FunctionDefinition::range(
        "MATCH",
        2,
        vec![ParamType::Any, ParamType::Range, ParamType::Number],
        |args, _| {
            let key = args[0].value();
            if let Value::Error(e) = &key {
                return e.clone().into();
            }
            let range = args[1].array();
            if range.rows() > 1 && range.cols() > 1 {
                return CellError::value("MATCH expects a single row or column").into();
            }
            let values: Vec<Value> = range.values().cloned().collect();
            let mode = match args.get(2) {
                Some(a) => try_value!(a.number()),
                None => 1.0,
            };
            let found = if mode == 0.0 {
                exact_match(&key, &values)
            } else if mode > 0.0 {
                approximate_match(&key, &values)
            } else {
                descending_match(&key, &values)
            };
            match found {
                Some(i) => EvalResult::from((i + 1) as f64),
                None => not_found("MATCH", &key).into(),
            }
        },
    ));

    r.register(FunctionDefinition::range(
        "INDEX",
        2,
        vec![ParamType::Range, ParamType::Number, ParamType::Number],
        |args, _| {
            let range = args[0].array();
            let mut row = try_value!(args[1].number()).trunc() as usize;
            let mut col = match args.get(2) {
                Some(a) => try_value!(a.number()).trunc() as usize,
                None => 1,
            };
            // A single row indexed with one argument is walked along its columns
            if args.len() == 2 && range.rows() == 1 {
                col = row;
                row = 1;
            }
            if row == 0 || col == 0 {
                return CellError::value("INDEX positions start at 1").into();
            }
            match range.get(row - 1, col - 1) {
                Some(v) => EvalResult::from(v.clone()),
                None => CellError::reference("Index out of range").into(),
            }
        },
    ));
}

fn not_found(function: &str, key: &Value) -> CellError {
    CellError::not_available(format!(
        "Did not find value '{}' in {} evaluation",
        key.display_text(),
        function
    ))
}

fn exact_match(key: &Value, values: &[Value]) -> Option<usize> {
    values
        .iter()
        .position(|v| !v.is_empty() && compare_values(v, key) == Ordering::Equal && same_type(v, key))
}

fn same_type(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

/// Last position whose value is <= key, assuming ascending order.
fn approximate_match(key: &Value, values: &[Value]) -> Option<usize> {
    let mut lo = 0usize;
    let mut hi = values.len();
    let mut found = None;
    while lo < hi {
        let mid = (lo + hi) / 2;
        let v = &values[mid];
        if v.is_empty() || !same_type(v, key) {
            // Skip cells of another type by scanning linearly from here
            return linear_approximate(key, values);
        }
        match compare_values(v, key) {
            Ordering::Greater => hi = mid,
            _ => {
                found = Some(mid);
                lo = mid + 1;
            }
        }
    }
    found
}

fn linear_approximate(key: &Value, values: &[Value]) -> Option<usize> {
    let mut found = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_empty() || !same_type(v, key) {
            continue;
        }
        if compare_values(v, key) == Ordering::Greater {
            break;
        }
        found = Some(i);
    }
    found
}

/// Last position whose value is >= key, assuming descending order.
fn descending_match(key: &Value, values: &[Value]) -> Option<usize> {
    let mut found = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_empty() || !same_type(v, key) {
            continue;
        }
        if compare_values(v, key) == Ordering::Less {
            break;
        }
        found = Some(i);
    }
    found
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Arg;
    use crate::formula::value::{Array2D, ErrorKind, Value};

    fn table() -> Arg {
        Arg::Range(Array2D::from_rows(vec![
            vec![Value::Number(1.0), Value::Text("one".into())],
            vec![Value::Number(2.0), Value::Text("two".into())],
            vec![Value::Number(4.0), Value::Text("four".into())],
        ]))
    }

    #[test]
    fn test_vlookup_exact() {
        let v = scalar(call("VLOOKUP", vec![n(2.0), table(), n(2.0), Arg::Value(Value::Boolean(false))]));
        assert_eq!(v, Value::Text("two".into()));
        let v = scalar(call("VLOOKUP", vec![n(3.0), table(), n(2.0), Arg::Value(Value::Boolean(false))]));
        assert_eq!(v.as_error().map(|e| e.kind), Some(ErrorKind::NotAvailable));
    }

    #[test]
    fn test_vlookup_sorted_takes_previous_row() {
        let v = scalar(call("VLOOKUP", vec![n(3.0), table(), n(2.0)]));
        assert_eq!(v, Value::Text("two".into()));
    }

    #[test]
    fn test_vlookup_bad_column() {
        let v = scalar(call("VLOOKUP", vec![n(1.0), table(), n(3.0)]));
        assert_eq!(v.as_error().map(|e| e.kind), Some(ErrorKind::Value));
    }

    #[test]
    fn test_match_modes() {
        assert_eq!(scalar(call("MATCH", vec![n(4.0), col(&[1.0, 2.0, 4.0]), n(0.0)])), Value::Number(3.0));
        assert_eq!(scalar(call("MATCH", vec![n(3.0), col(&[1.0, 2.0, 4.0])])), Value::Number(2.0));
        assert_eq!(scalar(call("MATCH", vec![n(3.0), col(&[9.0, 5.0, 2.0]), n(-1.0)])), Value::Number(2.0));
    }

    #[test]
    fn test_index() {
        assert_eq!(scalar(call("INDEX", vec![table(), n(3.0), n(2.0)])), Value::Text("four".into()));
        let v = scalar(call("INDEX", vec![table(), n(9.0), n(1.0)]));
        assert_eq!(v.as_error().map(|e| e.kind), Some(ErrorKind::Ref));
    }
}
