//! Function table.
//!
//! Every entry declares its arity and parameter types. Arguments are checked
//! and coerced at call time, so a body only ever sees the types it asked for:
//! a wrong argument count or an uncoercible value is a `#VALUE` result, an
//! unknown name is `#NAME?`. Functions can be registered at any time, also
//! after formulas using them were compiled.

mod array;
mod external;
mod info;
mod logical;
mod lookup;
mod math;
mod text;

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::cell_id::CellId;
use crate::services::ExternalDataCache;

use super::value::{Array2D, CellError, ErrorKind, EvalResult, Value};

pub use external::currency_rate_key;
pub(crate) use math::power;

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Passed through untouched (scalar, error or range)
    Any,
    Number,
    Logical,
    Text,
    /// Must be a reference or array
    Range,
}

/// An evaluated argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Value(Value),
    Range(Array2D),
}

impl Arg {
    /// Scalar view. Callers only use this on parameters declared with a
    /// scalar type, which are already unwrapped.
    pub fn value(&self) -> Value {
        match self {
            Arg::Value(v) => v.clone(),
            Arg::Range(arr) => arr.top_left(),
        }
    }

    pub fn number(&self) -> Result<f64, CellError> {
        self.value().to_number()
    }

    pub fn text(&self) -> Result<String, CellError> {
        self.value().to_text()
    }

    pub fn boolean(&self) -> Result<bool, CellError> {
        self.value().to_bool()
    }

    /// Array view; scalars become 1x1.
    pub fn array(&self) -> Array2D {
        match self {
            Arg::Range(arr) => arr.clone(),
            Arg::Value(v) => Array2D::from_rows(vec![vec![v.clone()]]),
        }
    }
}

impl From<EvalResult> for Arg {
    fn from(result: EvalResult) -> Self {
        match result {
            EvalResult::Scalar(v) => Arg::Value(v),
            EvalResult::Array(arr) => Arg::Range(arr),
        }
    }
}

/// What a function body can see besides its arguments.
pub struct CallEnv<'a> {
    pub external: &'a ExternalDataCache,
    /// The formula cell being evaluated (none for ad-hoc evaluation)
    pub cell: Option<&'a CellId>,
}

/// Deferred argument handed to lazy functions.
pub type LazyArg<'a> = &'a dyn Fn() -> EvalResult;

pub type EagerFn = dyn Fn(&[Arg], &CallEnv<'_>) -> EvalResult;
pub type LazyFn = dyn Fn(&[LazyArg<'_>], &CallEnv<'_>) -> EvalResult;

#[derive(Clone)]
pub enum FunctionImpl {
    /// All arguments evaluated before the call (AND/OR included)
    Eager(Rc<EagerFn>),
    /// Arguments evaluated on demand (IF, IFERROR)
    Lazy(Rc<LazyFn>),
}

#[derive(Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub min_args: usize,
    pub max_args: Option<usize>,
    pub params: Vec<ParamType>,
    /// Type of every argument past `params`
    pub variadic: Option<ParamType>,
    pub eval: FunctionImpl,
}

impl std::fmt::Debug for FunctionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionDefinition")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .finish()
    }
}

impl FunctionDefinition {
    /// Fixed number of arguments.
    pub fn fixed<F>(name: &str, params: Vec<ParamType>, eval: F) -> Self
    where
        F: Fn(&[Arg], &CallEnv<'_>) -> EvalResult + 'static,
    {
        let n = params.len();
        Self {
            name: name.to_uppercase(),
            min_args: n,
            max_args: Some(n),
            params,
            variadic: None,
            eval: FunctionImpl::Eager(Rc::new(eval)),
        }
    }

    /// Between `min` and `params.len()` arguments.
    pub fn range<F>(name: &str, min: usize, params: Vec<ParamType>, eval: F) -> Self
    where
        F: Fn(&[Arg], &CallEnv<'_>) -> EvalResult + 'static,
    {
        let max = params.len();
        Self {
            name: name.to_uppercase(),
            min_args: min,
            max_args: Some(max),
            params,
            variadic: None,
            eval: FunctionImpl::Eager(Rc::new(eval)),
        }
    }

    /// At least `min` arguments, all of type `variadic`.
    pub fn variadic<F>(name: &str, min: usize, variadic: ParamType, eval: F) -> Self
    where
        F: Fn(&[Arg], &CallEnv<'_>) -> EvalResult + 'static,
    {
        Self {
            name: name.to_uppercase(),
            min_args: min,
            max_args: None,
            params: Vec::new(),
            variadic: Some(variadic),
            eval: FunctionImpl::Eager(Rc::new(eval)),
        }
    }

    /// Between `min` and `max` deferred arguments.
    pub fn lazy<F>(name: &str, min: usize, max: usize, eval: F) -> Self
    where
        F: Fn(&[LazyArg<'_>], &CallEnv<'_>) -> EvalResult + 'static,
    {
        Self {
            name: name.to_uppercase(),
            min_args: min,
            max_args: Some(max),
            params: vec![ParamType::Any; max],
            variadic: None,
            eval: FunctionImpl::Lazy(Rc::new(eval)),
        }
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self.eval, FunctionImpl::Lazy(_))
    }

    pub fn validate_arg_count(&self, provided: usize) -> Result<(), CellError> {
        let too_few = provided < self.min_args;
        let too_many = self.max_args.is_some_and(|max| provided > max);
        if too_few || too_many {
            return Err(CellError::value(format!(
                "Invalid number of arguments for the {} function. Expected {}, but got {} arguments.",
                self.name,
                self.expected_args_label(),
                provided
            )));
        }
        Ok(())
    }

    fn expected_args_label(&self) -> String {
        match self.max_args {
            Some(max) if max == self.min_args => format!("{}", self.min_args),
            Some(max) => format!("{} to {}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        }
    }

    fn param_type(&self, index: usize) -> ParamType {
        self.params
            .get(index)
            .copied()
            .or(self.variadic)
            .unwrap_or(ParamType::Any)
    }

    /// Check and coerce arguments, then run an eager body.
    pub fn call(&self, args: Vec<Arg>, env: &CallEnv<'_>) -> EvalResult {
        let FunctionImpl::Eager(eval) = &self.eval else {
            return EvalResult::error(CellError::value(format!(
                "{} expects deferred arguments",
                self.name
            )));
        };
        if let Err(e) = self.validate_arg_count(args.len()) {
            return EvalResult::error(e);
        }
        let mut checked = Vec::with_capacity(args.len());
        for (i, arg) in args.into_iter().enumerate() {
            match coerce_arg(&self.name, i, self.param_type(i), arg) {
                Ok(arg) => checked.push(arg),
                Err(e) => return EvalResult::error(e),
            }
        }
        eval(&checked, env)
    }
}

fn coerce_arg(name: &str, index: usize, ty: ParamType, arg: Arg) -> Result<Arg, CellError> {
    let scalar = |arg: Arg| -> Result<Value, CellError> {
        match arg {
            Arg::Value(v) => Ok(v),
            Arg::Range(arr) if arr.is_scalar() => Ok(arr.top_left()),
            Arg::Range(_) => Err(CellError::value(format!(
                "Function {} expects a single value as argument {}, got a range",
                name,
                index + 1
            ))),
        }
    };
    match ty {
        ParamType::Any => Ok(arg),
        ParamType::Range => match arg {
            Arg::Range(_) => Ok(arg),
            Arg::Value(Value::Error(e)) => Err(e),
            Arg::Value(_) => Err(CellError::value(format!(
                "Function {} expects a range as argument {}",
                name,
                index + 1
            ))),
        },
        ParamType::Number => Ok(Arg::Value(Value::Number(scalar(arg)?.to_number()?))),
        ParamType::Text => Ok(Arg::Value(Value::Text(scalar(arg)?.to_text()?))),
        ParamType::Logical => Ok(Arg::Value(Value::Boolean(scalar(arg)?.to_bool()?))),
    }
}

/// Name-keyed function table.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: FxHashMap<String, Rc<FunctionDefinition>>,
}

impl FunctionRegistry {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every built-in function.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        math::register(&mut registry);
        logical::register(&mut registry);
        text::register(&mut registry);
        info::register(&mut registry);
        lookup::register(&mut registry);
        array::register(&mut registry);
        external::register(&mut registry);
        registry
    }

    /// Add or replace a function.
    pub fn register(&mut self, def: FunctionDefinition) {
        self.functions.insert(def.name.to_uppercase(), Rc::new(def));
    }

    pub fn get(&self, name: &str) -> Option<Rc<FunctionDefinition>> {
        self.functions.get(&name.to_uppercase()).cloned()
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(&name.to_uppercase())
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.len())
            .finish()
    }
}

pub(crate) fn unknown_function(name: &str) -> CellError {
    CellError::new(ErrorKind::Name, format!("Unknown function: \"{}\"", name))
}

// =============================================================================
// Helpers shared by the function modules
// =============================================================================

/// Numbers for aggregate functions. Scalar arguments are coerced (bad text
/// is `#VALUE`), ranges contribute only their numbers. Errors propagate.
pub(crate) fn collect_numbers(args: &[Arg]) -> Result<Vec<f64>, CellError> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Arg::Value(Value::Empty) => {}
            Arg::Value(v) => out.push(v.to_number()?),
            Arg::Range(arr) => {
                for v in arr.values() {
                    match v {
                        Value::Number(n) => out.push(*n),
                        Value::Error(e) => return Err(e.clone()),
                        _ => {}
                    }
                }
            }
        }
    }
    Ok(out)
}

/// Every value of every argument, ranges flattened row-major.
pub(crate) fn flatten(args: &[Arg]) -> Vec<Value> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Arg::Value(v) => out.push(v.clone()),
            Arg::Range(arr) => out.extend(arr.values().cloned()),
        }
    }
    out
}

/// Unwrap a `Result` inside a function body, returning the error as the
/// function result.
macro_rules! try_value {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(err) => return crate::formula::value::EvalResult::error(err),
        }
    };
}
pub(crate) use try_value;


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let r = FunctionRegistry::with_builtins();
        for name in ["SUM", "IF", "VLOOKUP", "SEQUENCE", "CURRENCY.RATE", "sum"] {
            assert!(r.has_function(name), "{} missing", name);
        }
    }

    #[test]
    fn test_wrong_arity_is_value_error() {
        let result = scalar(call("ABS", vec![]));
        let err = result.as_error().unwrap();
        assert_eq!(err.kind, ErrorKind::Value);
        assert!(err.message.contains("Expected 1"));
    }

    #[test]
    fn test_range_for_scalar_param_is_value_error() {
        let result = scalar(call("ABS", vec![col(&[1.0, 2.0])]));
        assert_eq!(result.as_error().map(|e| e.kind), Some(ErrorKind::Value));
    }

    #[test]
    fn test_number_param_coerces_text() {
        assert_eq!(scalar(call("ABS", vec![t("-3")])), Value::Number(3.0));
    }

    #[test]
    fn test_custom_registration() {
        let mut r = FunctionRegistry::new();
        r.register(FunctionDefinition::fixed("double", vec![ParamType::Number], |args, _| {
            EvalResult::from(try_value!(args[0].number()) * 2.0)
        }));
        let def = r.get("DOUBLE").unwrap();
        let external = ExternalDataCache::new();
        let env = CallEnv { external: &external, cell: None };
        assert_eq!(def.call(vec![n(4.0)], &env).into_scalar(), Value::Number(8.0));
    }

    #[test]
    fn test_collect_numbers_skips_text_in_ranges() {
        let arr = Array2D::column(vec![Value::Number(1.0), Value::Text("x".into()), Value::Empty]);
        assert_eq!(collect_numbers(&[Arg::Range(arr)]).unwrap(), vec![1.0]);
        assert!(collect_numbers(&[t("x")]).is_err());
    }
}
