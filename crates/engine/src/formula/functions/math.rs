// Math and aggregate functions

use super::{collect_numbers, flatten, try_value, Arg, FunctionDefinition, FunctionRegistry, ParamType};
use crate::formula::value::{CellError, EvalResult, Value};

pub(super) fn register(r: &mut FunctionRegistry) {
    r.register(FunctionDefinition::variadic("SUM", 1, ParamType::Any, |args, _| {
        let nums = try_value!(collect_numbers(args));
        EvalResult::from(nums.iter().sum::<f64>())
    }));

    r.register(FunctionDefinition::variadic("AVERAGE", 1, ParamType::Any, |args, _| {
        let nums = try_value!(collect_numbers(args));
        if nums.is_empty() {
            return CellError::div_zero().into();
        }
        EvalResult::from(nums.iter().sum::<f64>() / nums.len() as f64)
    }));

    r.register(FunctionDefinition::variadic("MIN", 1, ParamType::Any, |args, _| {
        let nums = try_value!(collect_numbers(args));
        EvalResult::from(nums.into_iter().reduce(f64::min).unwrap_or(0.0))
    }));

    r.register(FunctionDefinition::variadic("MAX", 1, ParamType::Any, |args, _| {
        let nums = try_value!(collect_numbers(args));
        EvalResult::from(nums.into_iter().reduce(f64::max).unwrap_or(0.0))
    }));

    r.register(FunctionDefinition::variadic("PRODUCT", 1, ParamType::Any, |args, _| {
        let nums = try_value!(collect_numbers(args));
        if nums.is_empty() {
            return EvalResult::from(0.0);
        }
        EvalResult::from(nums.iter().product::<f64>())
    }));

    // COUNT never fails: errors and non-numeric text are just not counted
    r.register(FunctionDefinition::variadic("COUNT", 1, ParamType::Any, |args, _| {
        let count = args
            .iter()
            .map(|arg| match arg {
                Arg::Value(Value::Number(_)) => 1,
                Arg::Value(Value::Text(s)) => usize::from(Value::Text(s.clone()).to_number().is_ok()),
                Arg::Value(_) => 0,
                Arg::Range(arr) => arr.values().filter(|v| matches!(v, Value::Number(_))).count(),
            })
            .sum::<usize>();
        EvalResult::from(count as f64)
    }));

    r.register(FunctionDefinition::variadic("COUNTA", 1, ParamType::Any, |args, _| {
        let count = flatten(args).iter().filter(|v| !v.is_empty()).count();
        EvalResult::from(count as f64)
    }));

    r.register(FunctionDefinition::fixed("ABS", vec![ParamType::Number], |args, _| {
        EvalResult::from(try_value!(args[0].number()).abs())
    }));

    r.register(FunctionDefinition::range(
        "ROUND",
        1,
        vec![ParamType::Number, ParamType::Number],
        |args, _| {
            let n = try_value!(args[0].number());
            let digits = match args.get(1) {
                Some(a) => try_value!(a.number()).trunc() as i32,
                None => 0,
            };
            EvalResult::from(round_half_away(n, digits))
        },
    ));

    r.register(FunctionDefinition::fixed("INT", vec![ParamType::Number], |args, _| {
        EvalResult::from(try_value!(args[0].number()).floor())
    }));

    r.register(FunctionDefinition::fixed(
        "MOD",
        vec![ParamType::Number, ParamType::Number],
        |args, _| {
            let n = try_value!(args[0].number());
            let d = try_value!(args[1].number());
            if d == 0.0 {
                return CellError::div_zero().into();
            }
            // Result takes the sign of the divisor
            EvalResult::from(n - d * (n / d).floor())
        },
    ));

    r.register(FunctionDefinition::fixed(
        "POWER",
        vec![ParamType::Number, ParamType::Number],
        |args, _| {
            let base = try_value!(args[0].number());
            let exp = try_value!(args[1].number());
            power(base, exp)
        },
    ));

    r.register(FunctionDefinition::fixed("SQRT", vec![ParamType::Number], |args, _| {
        let n = try_value!(args[0].number());
        if n < 0.0 {
            return CellError::value("SQRT of a negative number").into();
        }
        EvalResult::from(n.sqrt())
    }));
}

fn round_half_away(n: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    let scaled = n * factor;
    let rounded = scaled.abs().round() * scaled.signum();
    rounded / factor
}

/// `^` and POWER share the same rules.
pub(crate) fn power(base: f64, exp: f64) -> EvalResult {
    if base == 0.0 && exp < 0.0 {
        return CellError::div_zero().into();
    }
    if base < 0.0 && exp.fract() != 0.0 {
        return CellError::value("Fractional power of a negative number").into();
    }
    EvalResult::from(base.powf(exp))
}
