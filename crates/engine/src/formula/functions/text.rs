// Text functions

use super::{flatten, try_value, Arg, CallEnv, FunctionDefinition, FunctionRegistry, ParamType};
use crate::formula::value::{CellError, EvalResult};

fn concat(args: &[Arg], _: &CallEnv<'_>) -> EvalResult {
    let mut out = String::new();
    for v in flatten(args) {
        out.push_str(&try_value!(v.to_text()));
    }
    EvalResult::from(out)
}

pub(super) fn register(r: &mut FunctionRegistry) {
    r.register(FunctionDefinition::variadic("CONCAT", 1, ParamType::Any, concat));
    r.register(FunctionDefinition::variadic("CONCATENATE", 1, ParamType::Any, concat));

    r.register(FunctionDefinition::fixed("LEN", vec![ParamType::Text], |args, _| {
        EvalResult::from(try_value!(args[0].text()).chars().count() as f64)
    }));

    r.register(FunctionDefinition::fixed("UPPER", vec![ParamType::Text], |args, _| {
        EvalResult::from(try_value!(args[0].text()).to_uppercase())
    }));

    r.register(FunctionDefinition::fixed("LOWER", vec![ParamType::Text], |args, _| {
        EvalResult::from(try_value!(args[0].text()).to_lowercase())
    }));

    r.register(FunctionDefinition::range(
        "LEFT",
        1,
        vec![ParamType::Text, ParamType::Number],
        |args, _| {
            let s = try_value!(args[0].text());
            let count = try_value!(char_count(args.get(1).map(|a| a.number())));
            EvalResult::from(s.chars().take(count).collect::<String>())
        },
    ));

    r.register(FunctionDefinition::range(
        "RIGHT",
        1,
        vec![ParamType::Text, ParamType::Number],
        |args, _| {
            let s = try_value!(args[0].text());
            let count = try_value!(char_count(args.get(1).map(|a| a.number())));
            let len = s.chars().count();
            EvalResult::from(s.chars().skip(len.saturating_sub(count)).collect::<String>())
        },
    ));

    // Collapses inner runs of spaces too
    r.register(FunctionDefinition::fixed("TRIM", vec![ParamType::Text], |args, _| {
        let s = try_value!(args[0].text());
        EvalResult::from(s.split_whitespace().collect::<Vec<_>>().join(" "))
    }));
}

fn char_count(arg: Option<Result<f64, CellError>>) -> Result<usize, CellError> {
    let n = match arg {
        Some(n) => n?,
        None => 1.0,
    };
    if n < 0.0 {
        return Err(CellError::value("Character count cannot be negative"));
    }
    Ok(n.trunc() as usize)
}
