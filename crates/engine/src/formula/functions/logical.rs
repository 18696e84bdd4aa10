// Logical functions

use super::{flatten, try_value, FunctionDefinition, FunctionRegistry, ParamType};
use crate::formula::value::{CellError, EvalResult, Value};

pub(super) fn register(r: &mut FunctionRegistry) {
    // IF only evaluates the branch it returns
    r.register(FunctionDefinition::lazy("IF", 2, 3, |args, _| {
        let cond = try_value!(args[0]().into_scalar().to_bool());
        if cond {
            args[1]()
        } else {
            match args.get(2) {
                Some(branch) => branch(),
                None => EvalResult::from(false),
            }
        }
    }));

    r.register(FunctionDefinition::lazy("IFERROR", 2, 2, |args, _| {
        let value = args[0]();
        if value.is_error() {
            args[1]()
        } else {
            value
        }
    }));

    r.register(FunctionDefinition::variadic("AND", 1, ParamType::Any, |args, _| {
        let bools = try_value!(logical_values(&flatten(args)));
        EvalResult::from(bools.iter().all(|b| *b))
    }));

    r.register(FunctionDefinition::variadic("OR", 1, ParamType::Any, |args, _| {
        let bools = try_value!(logical_values(&flatten(args)));
        EvalResult::from(bools.iter().any(|b| *b))
    }));

    r.register(FunctionDefinition::fixed("NOT", vec![ParamType::Logical], |args, _| {
        EvalResult::from(!try_value!(args[0].boolean()))
    }));
}

/// Blanks are skipped; an argument list with nothing logical is an error.
fn logical_values(values: &[Value]) -> Result<Vec<bool>, CellError> {
    let bools = values
        .iter()
        .filter(|v| !v.is_empty())
        .map(|v| v.to_bool())
        .collect::<Result<Vec<_>, _>>()?;
    if bools.is_empty() {
        return Err(CellError::value("No logical values to evaluate"));
    }
    Ok(bools)
}
