// Formula parser - Pratt (binding power) parser over the token stream
// Supports: numbers, strings, booleans, references, function calls,
// arithmetic (+ - * / ^), comparison (= <> < > <= >=), concatenation (&),
// postfix percent and unary plus/minus

use crate::error::ParseError;
use crate::settings::Locale;

use super::tokenizer::{tokenize, Token, TokenKind};

/// Formula syntax tree. Owned by the compiled-formula cache, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Number(f64),
    String(String),
    Boolean(bool),
    /// Bare identifier that is not a function call
    Symbol(String),
    /// Reference text as written (`A1`, `Sheet2!$A:$B`, `#REF`)
    Reference(String),
    Operation {
        op: Op,
        left: Box<Ast>,
        right: Box<Ast>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Ast>,
    },
    Funcall {
        name: String,
        args: Vec<Ast>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    // String
    Concat,
    // Comparison
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    /// `:` between two references the tokenizer could not fuse
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Percent,
}

impl Op {
    fn from_symbol(s: &str) -> Option<Op> {
        Some(match s {
            "+" => Op::Add,
            "-" => Op::Sub,
            "*" => Op::Mul,
            "/" => Op::Div,
            "^" => Op::Pow,
            "&" => Op::Concat,
            "=" => Op::Eq,
            "<>" => Op::NotEq,
            "<" => Op::Lt,
            ">" => Op::Gt,
            "<=" => Op::LtEq,
            ">=" => Op::GtEq,
            ":" => Op::Range,
            _ => return None,
        })
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Pow => "^",
            Op::Concat => "&",
            Op::Eq => "=",
            Op::NotEq => "<>",
            Op::Lt => "<",
            Op::Gt => ">",
            Op::LtEq => "<=",
            Op::GtEq => ">=",
            Op::Range => ":",
        }
    }

    /// (left, right) binding power. All binary operators are left-associative.
    fn binding_power(&self) -> (u8, u8) {
        match self {
            Op::Eq | Op::NotEq | Op::Lt | Op::Gt | Op::LtEq | Op::GtEq => (10, 11),
            Op::Concat => (20, 21),
            Op::Add | Op::Sub => (30, 31),
            Op::Mul | Op::Div => (40, 41),
            Op::Pow => (50, 51),
            Op::Range => (80, 81),
        }
    }
}

const PERCENT_BP: u8 = 55;
const PREFIX_BP: u8 = 60;
const ATOM_BP: u8 = 100;

/// Tokenize (canonical locale) and parse formula text.
pub fn parse_formula(text: &str) -> Result<Ast, ParseError> {
    let tokens = tokenize(text, &Locale::canonical())?;
    parse(&tokens)
}

/// Parse a token stream. Space tokens are skipped and a leading `=` is
/// consumed as the formula marker.
pub fn parse(tokens: &[Token]) -> Result<Ast, ParseError> {
    let mut significant: Vec<&Token> = tokens.iter().filter(|t| t.kind != TokenKind::Space).collect();
    if significant
        .first()
        .is_some_and(|t| t.kind == TokenKind::Operator && t.value == "=")
    {
        significant.remove(0);
    }
    let end = tokens.last().map(|t| t.end).unwrap_or(0);
    if significant.is_empty() {
        return Err(ParseError::new("Invalid formula", end));
    }
    let mut parser = Parser {
        tokens: significant,
        pos: 0,
        end,
    };
    let ast = parser.expression(0)?;
    if let Some(extra) = parser.peek() {
        return Err(ParseError::new(
            format!("Unexpected token '{}'", extra.value),
            extra.start,
        ));
    }
    Ok(ast)
}

struct Parser<'a> {
    tokens: Vec<&'a Token>,
    pos: usize,
    /// Offset reported for errors at end of input
    end: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<&'a Token, ParseError> {
        match self.next() {
            Some(t) if t.kind == kind => Ok(t),
            Some(t) => Err(ParseError::new(
                format!("Expected {} but found '{}'", what, t.value),
                t.start,
            )),
            None => Err(ParseError::new(format!("Missing {}", what), self.end)),
        }
    }

    fn expression(&mut self, min_bp: u8) -> Result<Ast, ParseError> {
        let mut lhs = self.prefix()?;

        while let Some(token) = self.peek() {
            if token.kind != TokenKind::Operator {
                break;
            }
            if token.value == "%" {
                if PERCENT_BP < min_bp {
                    break;
                }
                self.next();
                lhs = Ast::Unary {
                    op: UnaryOp::Percent,
                    operand: Box::new(lhs),
                };
                continue;
            }
            let op = Op::from_symbol(&token.value).ok_or_else(|| {
                ParseError::new(format!("Unknown operator '{}'", token.value), token.start)
            })?;
            let (l_bp, r_bp) = op.binding_power();
            if l_bp < min_bp {
                break;
            }
            self.next();
            let rhs = self.expression(r_bp)?;
            if op == Op::Range && !(is_reference(&lhs) && is_reference(&rhs)) {
                return Err(ParseError::new(
                    "Range operator expects references on both sides",
                    token.start,
                ));
            }
            lhs = Ast::Operation {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Ast, ParseError> {
        let Some(token) = self.next() else {
            return Err(ParseError::new("Unexpected end of formula", self.end));
        };
        match token.kind {
            TokenKind::Number => {
                let canonical = token.canonical_text();
                canonical
                    .parse::<f64>()
                    .map(Ast::Number)
                    .map_err(|_| ParseError::new(format!("Invalid number '{}'", token.value), token.start))
            }
            TokenKind::String => Ok(Ast::String(unescape_string(&token.value))),
            TokenKind::Boolean => Ok(Ast::Boolean(token.value.eq_ignore_ascii_case("TRUE"))),
            TokenKind::Reference => Ok(Ast::Reference(token.value.clone())),
            TokenKind::Symbol => {
                if self.peek().is_some_and(|t| t.kind == TokenKind::LeftParen) {
                    self.next();
                    let args = self.arguments()?;
                    Ok(Ast::Funcall {
                        name: token.value.to_ascii_uppercase(),
                        args,
                    })
                } else {
                    Ok(Ast::Symbol(token.value.clone()))
                }
            }
            TokenKind::LeftParen => {
                let inner = self.expression(0)?;
                self.expect(TokenKind::RightParen, "closing parenthesis")?;
                Ok(inner)
            }
            TokenKind::Operator if token.value == "-" => {
                let operand = self.expression(PREFIX_BP)?;
                Ok(Ast::Operation {
                    op: Op::Sub,
                    left: Box::new(Ast::Number(0.0)),
                    right: Box::new(operand),
                })
            }
            TokenKind::Operator if token.value == "+" => {
                let operand = self.expression(PREFIX_BP)?;
                Ok(Ast::Unary {
                    op: UnaryOp::Plus,
                    operand: Box::new(operand),
                })
            }
            _ => Err(ParseError::new(
                format!("Unexpected token '{}'", token.value),
                token.start,
            )),
        }
    }

    /// Arguments after the opening parenthesis, through the closing one.
    fn arguments(&mut self) -> Result<Vec<Ast>, ParseError> {
        let mut args = Vec::new();
        if self.peek().is_some_and(|t| t.kind == TokenKind::RightParen) {
            self.next();
            return Ok(args);
        }
        loop {
            if let Some(t) = self.peek() {
                if matches!(t.kind, TokenKind::Comma | TokenKind::RightParen) {
                    return Err(ParseError::new("Empty argument", t.start));
                }
            }
            args.push(self.expression(0)?);
            match self.next() {
                Some(t) if t.kind == TokenKind::Comma => continue,
                Some(t) if t.kind == TokenKind::RightParen => return Ok(args),
                Some(t) => {
                    return Err(ParseError::new(
                        format!("Expected ',' or ')' but found '{}'", t.value),
                        t.start,
                    ))
                }
                None => return Err(ParseError::new("Missing closing parenthesis", self.end)),
            }
        }
    }
}

fn is_reference(ast: &Ast) -> bool {
    matches!(ast, Ast::Reference(_))
        || matches!(ast, Ast::Operation { op: Op::Range, .. })
}

/// Strip quotes and resolve backslash escapes.
fn unescape_string(raw: &str) -> String {
    let inner = &raw[1..raw.len().saturating_sub(1).max(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl Ast {
    /// Serialize back to formula text (with the leading `=`), adding only
    /// the parentheses precedence requires.
    pub fn to_formula(&self) -> String {
        let mut out = String::from("=");
        self.write(&mut out);
        out
    }

    fn precedence(&self) -> u8 {
        match self {
            Ast::Operation { op, .. } => op.binding_power().0,
            Ast::Unary { op: UnaryOp::Percent, .. } => PERCENT_BP,
            Ast::Unary { op: UnaryOp::Plus, .. } => PREFIX_BP,
            _ => ATOM_BP,
        }
    }

    fn write_child(&self, out: &mut String, min_prec: u8) {
        if self.precedence() < min_prec {
            out.push('(');
            self.write(out);
            out.push(')');
        } else {
            self.write(out);
        }
    }

    fn write(&self, out: &mut String) {
        match self {
            // Shortest text that parses back to the same f64
            Ast::Number(n) => out.push_str(&n.to_string()),
            Ast::String(s) => {
                out.push('"');
                out.push_str(&s.replace('\\', "\\\\").replace('"', "\\\""));
                out.push('"');
            }
            Ast::Boolean(b) => out.push_str(if *b { "TRUE" } else { "FALSE" }),
            Ast::Symbol(s) | Ast::Reference(s) => out.push_str(s),
            Ast::Operation { op, left, right } => {
                let (l_bp, r_bp) = op.binding_power();
                left.write_child(out, l_bp);
                out.push_str(op.symbol());
                right.write_child(out, r_bp);
            }
            Ast::Unary { op: UnaryOp::Plus, operand } => {
                out.push('+');
                operand.write_child(out, PREFIX_BP);
            }
            Ast::Unary { op: UnaryOp::Percent, operand } => {
                operand.write_child(out, PERCENT_BP);
                out.push('%');
            }
            Ast::Funcall { name, args } => {
                out.push_str(name);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    arg.write(out);
                }
                out.push(')');
            }
        }
    }

    /// Reference texts in evaluation order.
    pub fn references(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a str>) {
        match self {
            Ast::Reference(r) => refs.push(r),
            Ast::Operation { left, right, .. } => {
                left.collect_references(refs);
                right.collect_references(refs);
            }
            Ast::Unary { operand, .. } => operand.collect_references(refs),
            Ast::Funcall { args, .. } => {
                for arg in args {
                    arg.collect_references(refs);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(text: &str) -> Ast {
        parse_formula(text).unwrap()
    }

    fn num(n: f64) -> Box<Ast> {
        Box::new(Ast::Number(n))
    }

    #[test]
    fn test_mul_binds_tighter_than_add() {
        assert_eq!(
            p("=2+3*4"),
            Ast::Operation {
                op: Op::Add,
                left: num(2.0),
                right: Box::new(Ast::Operation {
                    op: Op::Mul,
                    left: num(3.0),
                    right: num(4.0),
                }),
            }
        );
    }

    #[test]
    fn test_subtraction_is_left_associative() {
        assert_eq!(p("=1-2-3").to_formula(), "=1-2-3");
        assert_eq!(p("=1-(2-3)").to_formula(), "=1-(2-3)");
    }

    #[test]
    fn test_unary_minus_is_zero_minus_operand() {
        assert_eq!(
            p("=-A1"),
            Ast::Operation {
                op: Op::Sub,
                left: num(0.0),
                right: Box::new(Ast::Reference("A1".into())),
            }
        );
    }

    #[test]
    fn test_unary_minus_binds_tighter_than_power() {
        // (-2)^2
        assert_eq!(p("=-2^2").to_formula(), "=(0-2)^2");
    }

    #[test]
    fn test_comparison_lowest() {
        let ast = p("=\"4\" > 1 & 2");
        let Ast::Operation { op, right, .. } = ast else {
            panic!("expected operation");
        };
        assert_eq!(op, Op::Gt);
        assert!(matches!(*right, Ast::Operation { op: Op::Concat, .. }));
    }

    #[test]
    fn test_funcall() {
        assert_eq!(
            p("=sum(A1:A3, 2)"),
            Ast::Funcall {
                name: "SUM".into(),
                args: vec![Ast::Reference("A1:A3".into()), Ast::Number(2.0)],
            }
        );
        assert_eq!(p("=NOW()"), Ast::Funcall { name: "NOW".into(), args: vec![] });
    }

    #[test]
    fn test_unknown_function_still_parses() {
        assert!(matches!(p("=NOPE(1)"), Ast::Funcall { .. }));
    }

    #[test]
    fn test_percent_and_unary_plus() {
        // Prefix operators bind tighter than the percent postfix
        assert_eq!(
            p("=+50%"),
            Ast::Unary {
                op: UnaryOp::Percent,
                operand: Box::new(Ast::Unary {
                    op: UnaryOp::Plus,
                    operand: num(50.0),
                }),
            }
        );
        assert_eq!(p("=+50%").to_formula(), "=+50%");
    }

    #[test]
    fn test_string_unescape() {
        assert_eq!(p(r#"="a\"b""#), Ast::String("a\"b".into()));
        assert_eq!(p(r#"="a\"b""#).to_formula(), r#"="a\"b""#);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_formula("=(1+2").is_err());
        assert!(parse_formula("=1+2)").is_err());
        assert!(parse_formula("=1 2").is_err());
        assert!(parse_formula("=SUM(1,,2)").is_err());
        assert!(parse_formula("=SUM(1,)").is_err());
        assert!(parse_formula("=").is_err());
        assert!(parse_formula("=*2").is_err());
    }

    #[test]
    fn test_range_fallback() {
        // Mismatched full reference: A:1 is not a reference on either side
        assert!(parse_formula("=A:1").is_err());
        let ast = p("=Sheet1!A1:Sheet1!B2");
        assert!(matches!(ast, Ast::Operation { op: Op::Range, .. }));
    }

    #[test]
    fn test_references_in_order() {
        let ast = p("=IF(A1>B2, SUM(C1:C3), -D4)");
        assert_eq!(ast.references(), vec!["A1", "B2", "C1:C3", "D4"]);
    }

    #[test]
    fn test_deterministic() {
        let tokens = tokenize("=A1*(2+B2)/SUM(C1:C9)", &Locale::default()).unwrap();
        assert_eq!(parse(&tokens).unwrap(), parse(&tokens).unwrap());
    }

    #[test]
    fn test_roundtrip_text() {
        for f in ["=A1+B2*C3", "=(A1+B2)*C3", "=SUM(A1:A3,2)&\"x\"", "=2^3^2", "=A1%", "=TRUE"] {
            assert_eq!(p(f).to_formula(), f, "roundtrip of {}", f);
        }
    }

    #[test]
    fn test_number_literals_keep_full_precision() {
        for f in ["=0.12345678901234", "=123456789.987654321", "=0.000000000001", "=1e20+0.1"] {
            let ast = p(f);
            assert_eq!(p(&ast.to_formula()), ast, "reparse of {}", f);
        }
        assert_eq!(p("=0.12345678901234").to_formula(), "=0.12345678901234");
    }
}
