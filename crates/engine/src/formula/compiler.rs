//! Formula compiler.
//!
//! A formula is compiled once per *normalized* text: tokens joined by a
//! single space whatever whitespace separated them, symbols upper-cased and
//! every reference replaced by a positional `|n|` placeholder. `=A1+1` in one cell and `= B7 + 1` in another share the same
//! [`CompiledFormula`]; what differs per cell is the list of references
//! bound to the placeholders, kept on the [`FormulaCell`].
//!
//! The compiled program is a tree of closures. Evaluating it never touches
//! the AST again; references are read through a [`FormulaContext`].

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::cell_id::CellId;
use crate::services::ExternalDataCache;
use crate::settings::Locale;

use super::functions::{power, unknown_function, Arg, CallEnv, FunctionImpl, FunctionRegistry};
use super::parser::{parse, Ast, Op, UnaryOp};
use super::references::RangeRef;
use super::tokenizer::{tokenize, Token, TokenKind};
use super::value::{compare_values, CellError, ErrorKind, EvalResult, Value};

/// What a running formula can read.
pub trait FormulaContext {
    /// Value of the formula's `index`-th reference: a scalar for a single
    /// cell, an array for a range, `#REF` when it does not resolve.
    fn reference(&self, index: usize) -> EvalResult;

    /// Bounding range of several references joined with `:`.
    fn range_union(&self, indexes: &[usize]) -> EvalResult;

    fn functions(&self) -> &FunctionRegistry;

    fn external(&self) -> &ExternalDataCache;

    /// The cell being evaluated, if any.
    fn current_cell(&self) -> Option<&CellId>;
}

type Node = Box<dyn Fn(&dyn FormulaContext) -> EvalResult>;

/// A formula shape, shared by every cell with the same normalized text.
pub struct CompiledFormula {
    pub normalized: String,
    /// Tree with `|n|` reference placeholders; `None` when parsing failed
    pub ast: Option<Ast>,
    pub reference_count: usize,
    program: Node,
}

impl CompiledFormula {
    pub fn execute(&self, ctx: &dyn FormulaContext) -> EvalResult {
        (self.program)(ctx)
    }

    pub fn is_bad_expression(&self) -> bool {
        self.ast.is_none()
    }

    fn failed(normalized: String, reference_count: usize, message: String) -> Self {
        let error = CellError::bad_expression(message);
        Self {
            normalized,
            ast: None,
            reference_count,
            program: Box::new(move |_| EvalResult::error(error.clone())),
        }
    }
}

impl std::fmt::Debug for CompiledFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFormula")
            .field("normalized", &self.normalized)
            .field("ast", &self.ast)
            .field("reference_count", &self.reference_count)
            .finish()
    }
}

/// Formula content of one cell.
#[derive(Debug, Clone)]
pub struct FormulaCell {
    pub compiled: Rc<CompiledFormula>,
    /// Tokens of `text`, empty when the text could not be tokenized
    pub tokens: Vec<Token>,
    /// Bound references, in placeholder order
    pub dependencies: Vec<RangeRef>,
    text: String,
}

impl FormulaCell {
    /// Canonical formula text, as stored.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Formula text with each reference replaced by the matching entry of
    /// `dependencies`. Used after references were adapted.
    pub fn render_with(&self, dependencies: &[RangeRef]) -> String {
        if self.tokens.is_empty() {
            return self.text.clone();
        }
        let mut out = String::with_capacity(self.text.len());
        let mut index = 0;
        for token in &self.tokens {
            if token.kind == TokenKind::Reference {
                match dependencies.get(index) {
                    Some(dep) => out.push_str(&dep.to_xc()),
                    None => out.push_str(&token.value),
                }
                index += 1;
            } else {
                out.push_str(&token.value);
            }
        }
        out
    }
}

/// Normalized-text keyed cache of compiled formulas.
#[derive(Debug, Default)]
pub struct FormulaCompiler {
    cache: FxHashMap<String, Rc<CompiledFormula>>,
    /// Text that failed to tokenize, keyed by raw text
    untokenizable: FxHashMap<String, Rc<CompiledFormula>>,
}

impl FormulaCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile canonical formula text for a cell.
    pub fn compile_cell(&mut self, text: &str) -> FormulaCell {
        match tokenize(text, &Locale::canonical()) {
            Ok(tokens) => {
                let dependencies = tokens
                    .iter()
                    .filter(|t| t.kind == TokenKind::Reference)
                    .map(|t| RangeRef::parse(&t.value))
                    .collect();
                let compiled = self.compile_tokens(&tokens);
                FormulaCell {
                    compiled,
                    tokens,
                    dependencies,
                    text: text.to_string(),
                }
            }
            Err(e) => {
                let compiled = self
                    .untokenizable
                    .entry(text.to_string())
                    .or_insert_with(|| {
                        Rc::new(CompiledFormula::failed(text.to_string(), 0, e.to_string()))
                    })
                    .clone();
                FormulaCell {
                    compiled,
                    tokens: Vec::new(),
                    dependencies: Vec::new(),
                    text: text.to_string(),
                }
            }
        }
    }

    /// Compile canonical formula text, discarding the per-cell part.
    pub fn compile(&mut self, text: &str) -> Rc<CompiledFormula> {
        self.compile_cell(text).compiled
    }

    fn compile_tokens(&mut self, tokens: &[Token]) -> Rc<CompiledFormula> {
        let normalized = normalize(tokens);
        if let Some(hit) = self.cache.get(&normalized) {
            return hit.clone();
        }
        let reference_count = tokens.iter().filter(|t| t.kind == TokenKind::Reference).count();
        let compiled = match parse(tokens) {
            Ok(ast) => {
                let mut next = 0;
                let ast = with_placeholders(ast, &mut next);
                let program = compile_node(&ast);
                CompiledFormula {
                    normalized: normalized.clone(),
                    ast: Some(ast),
                    reference_count,
                    program,
                }
            }
            Err(e) => CompiledFormula::failed(normalized.clone(), reference_count, e.to_string()),
        };
        log::trace!("compiled formula {}", normalized);
        let compiled = Rc::new(compiled);
        self.cache.insert(normalized, compiled.clone());
        compiled
    }

    /// Number of distinct compiled shapes.
    pub fn len(&self) -> usize {
        self.cache.len() + self.untokenizable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.untokenizable.clear();
    }
}

/// Cache key of a token stream. Significant tokens are joined by one space
/// so that whitespace which splits tokens (`1 2` vs `12`) stays visible.
pub fn normalize(tokens: &[Token]) -> String {
    let mut parts = Vec::with_capacity(tokens.len());
    let mut index = 0;
    for token in tokens {
        match token.kind {
            TokenKind::Space => {}
            TokenKind::Reference => {
                parts.push(placeholder(index));
                index += 1;
            }
            TokenKind::Symbol | TokenKind::Boolean => parts.push(token.value.to_uppercase()),
            _ => parts.push(token.canonical_text()),
        }
    }
    parts.join(" ")
}

fn placeholder(index: usize) -> String {
    format!("|{}|", index)
}

fn placeholder_index(text: &str) -> Option<usize> {
    text.strip_prefix('|')?.strip_suffix('|')?.parse().ok()
}

/// Replace reference texts by placeholders (in evaluation order) and
/// upper-case bare symbols.
fn with_placeholders(ast: Ast, next: &mut usize) -> Ast {
    match ast {
        Ast::Reference(_) => {
            let p = placeholder(*next);
            *next += 1;
            Ast::Reference(p)
        }
        Ast::Symbol(s) => Ast::Symbol(s.to_uppercase()),
        Ast::Operation { op, left, right } => {
            let left = with_placeholders(*left, next);
            let right = with_placeholders(*right, next);
            Ast::Operation {
                op,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        Ast::Unary { op, operand } => Ast::Unary {
            op,
            operand: Box::new(with_placeholders(*operand, next)),
        },
        Ast::Funcall { name, args } => Ast::Funcall {
            name,
            args: args.into_iter().map(|a| with_placeholders(a, next)).collect(),
        },
        other => other,
    }
}

// =============================================================================
// Code generation
// =============================================================================

fn compile_node(ast: &Ast) -> Node {
    match ast {
        Ast::Number(n) => {
            let n = *n;
            Box::new(move |_| EvalResult::from(n))
        }
        Ast::String(s) => {
            let s = s.clone();
            Box::new(move |_| EvalResult::from(s.clone()))
        }
        Ast::Boolean(b) => {
            let b = *b;
            Box::new(move |_| EvalResult::from(b))
        }
        Ast::Symbol(s) => {
            let error = CellError::new(ErrorKind::Name, format!("Invalid formula: unknown name {}", s));
            Box::new(move |_| EvalResult::error(error.clone()))
        }
        Ast::Reference(text) => match placeholder_index(text) {
            Some(index) => Box::new(move |ctx| ctx.reference(index)),
            None => {
                let error = CellError::reference("Invalid reference");
                Box::new(move |_| EvalResult::error(error.clone()))
            }
        },
        Ast::Operation { op: Op::Range, .. } => {
            let mut indexes = Vec::new();
            collect_range_indexes(ast, &mut indexes);
            Box::new(move |ctx| ctx.range_union(&indexes))
        }
        Ast::Operation { op, left, right } => {
            let op = *op;
            let left = compile_node(left);
            let right = compile_node(right);
            Box::new(move |ctx| binary(op, left(ctx), right(ctx)))
        }
        Ast::Unary { op, operand } => {
            let op = *op;
            let operand = compile_node(operand);
            Box::new(move |ctx| unary(op, operand(ctx)))
        }
        Ast::Funcall { name, args } => {
            let name = name.clone();
            let args: Vec<Node> = args.iter().map(compile_node).collect();
            Box::new(move |ctx| call_function(&name, &args, ctx))
        }
    }
}

fn collect_range_indexes(ast: &Ast, out: &mut Vec<usize>) {
    match ast {
        Ast::Reference(text) => out.extend(placeholder_index(text)),
        Ast::Operation { left, right, .. } => {
            collect_range_indexes(left, out);
            collect_range_indexes(right, out);
        }
        _ => {}
    }
}

fn call_function(name: &str, args: &[Node], ctx: &dyn FormulaContext) -> EvalResult {
    let Some(def) = ctx.functions().get(name) else {
        return unknown_function(name).into();
    };
    let env = CallEnv {
        external: ctx.external(),
        cell: ctx.current_cell(),
    };
    match &def.eval {
        FunctionImpl::Lazy(eval) => {
            if let Err(e) = def.validate_arg_count(args.len()) {
                return e.into();
            }
            let thunks: Vec<Box<dyn Fn() -> EvalResult + '_>> = args
                .iter()
                .map(|node| Box::new(move || node(ctx)) as Box<dyn Fn() -> EvalResult + '_>)
                .collect();
            let lazy: Vec<&dyn Fn() -> EvalResult> = thunks.iter().map(|t| t.as_ref()).collect();
            eval(&lazy, &env)
        }
        FunctionImpl::Eager(_) => {
            let values = args.iter().map(|node| Arg::from(node(ctx))).collect();
            def.call(values, &env)
        }
    }
}

fn binary(op: Op, left: EvalResult, right: EvalResult) -> EvalResult {
    let a = left.into_scalar();
    if let Value::Error(e) = &a {
        return e.clone().into();
    }
    let b = right.into_scalar();
    if let Value::Error(e) = &b {
        return e.clone().into();
    }
    match binary_value(op, &a, &b) {
        Ok(v) => EvalResult::from(v),
        Err(e) => e.into(),
    }
}

fn binary_value(op: Op, a: &Value, b: &Value) -> Result<Value, CellError> {
    use std::cmp::Ordering;
    let cmp = || compare_values(a, b);
    Ok(match op {
        Op::Add => Value::from(a.to_number()? + b.to_number()?),
        Op::Sub => Value::from(a.to_number()? - b.to_number()?),
        Op::Mul => Value::from(a.to_number()? * b.to_number()?),
        Op::Div => {
            let (x, y) = (a.to_number()?, b.to_number()?);
            if y == 0.0 {
                return Err(CellError::div_zero());
            }
            Value::from(x / y)
        }
        Op::Pow => match power(a.to_number()?, b.to_number()?).into_scalar() {
            Value::Error(e) => return Err(e),
            v => v,
        },
        Op::Concat => Value::Text(a.to_text()? + &b.to_text()?),
        Op::Eq => Value::Boolean(cmp() == Ordering::Equal),
        Op::NotEq => Value::Boolean(cmp() != Ordering::Equal),
        Op::Lt => Value::Boolean(cmp() == Ordering::Less),
        Op::Gt => Value::Boolean(cmp() == Ordering::Greater),
        Op::LtEq => Value::Boolean(cmp() != Ordering::Greater),
        Op::GtEq => Value::Boolean(cmp() != Ordering::Less),
        // Handled by the range node
        Op::Range => return Err(CellError::value("Unexpected range operator")),
    })
}

fn unary(op: UnaryOp, operand: EvalResult) -> EvalResult {
    let v = operand.into_scalar();
    match op {
        UnaryOp::Plus => EvalResult::from(v),
        UnaryOp::Percent => match v.to_number() {
            Ok(n) => EvalResult::from(n / 100.0),
            Err(e) => e.into(),
        },
    }
}
