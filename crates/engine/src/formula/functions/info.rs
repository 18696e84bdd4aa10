// Information functions

use super::{Arg, FunctionDefinition, FunctionRegistry, ParamType};
use crate::formula::value::{CellError, EvalResult, Value};

pub(super) fn register(r: &mut FunctionRegistry) {
    let is = |name: &str, test: fn(&Value) -> bool| {
        FunctionDefinition::fixed(name, vec![ParamType::Any], move |args, _| {
            EvalResult::from(test(&scalar_of(&args[0])))
        })
    };
    r.register(is("ISBLANK", Value::is_empty));
    r.register(is("ISERROR", Value::is_error));
    r.register(is("ISNUMBER", |v| matches!(v, Value::Number(_))));
    r.register(is("ISTEXT", |v| matches!(v, Value::Text(_))));

    r.register(FunctionDefinition::fixed("NA", vec![], |_, _| {
        CellError::not_available("Value not available").into()
    }));
}

// ISxxx look at the first cell of a range
fn scalar_of(arg: &Arg) -> Value {
    match arg {
        Arg::Value(v) => v.clone(),
        Arg::Range(arr) => arr.top_left(),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::Arg;
    use crate::formula::value::{CellError, ErrorKind, Value};

    #[test]
    fn test_is_functions() {
        assert_eq!(scalar(call("ISBLANK", vec![Arg::Value(Value::Empty)])), Value::Boolean(true));
        assert_eq!(scalar(call("ISNUMBER", vec![n(1.0)])), Value::Boolean(true));
        assert_eq!(scalar(call("ISTEXT", vec![n(1.0)])), Value::Boolean(false));
        let err = Arg::Value(Value::Error(CellError::div_zero()));
        assert_eq!(scalar(call("ISERROR", vec![err])), Value::Boolean(true));
    }

    #[test]
    fn test_na() {
        let v = scalar(call("NA", vec![]));
        assert_eq!(v.as_error().map(|e| e.kind), Some(ErrorKind::NotAvailable));
    }
}
