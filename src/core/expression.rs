//! # Expression
//!
//! A small, side-effect free expression language for deferred (`eval <expr>`)
//! configuration values.
//!
//! Supports:
//! - Literals: integers, floats, quoted strings, `True`/`False`/`None`
//!   (and the YAML spellings `true`/`false`/`null`)
//! - Lists: `[a, b, c]` and tuples `(a, b)`, both evaluating to a list
//! - Arithmetic: `+`, `-`, `*`, `/`, `//`, `%`, `**` and unary `+`/`-`
//! - Variable references by bare name, indexing with `x[i]`
//! - A fixed set of builtins: `range`, `len`, `str`, `int`, `float`, `min`,
//!   `max`, `sum`
//!
//! Does NOT support attribute access, assignment, comprehensions, or anything
//! that reaches the filesystem or other processes.

use crate::models::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

/// Upper bound on the length of lists built by `range()` or repetition.
const MAX_SEQUENCE_LEN: usize = 1 << 24;

/// Upper bound on the nesting depth of a parsed expression.
const MAX_NESTING: usize = 256;

/// Errors raised while parsing or evaluating an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("syntax error at position {pos}: {message}")]
    Syntax { pos: usize, message: String },
    #[error("name '{0}' is not defined")]
    UndefinedVariable(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("{function}() takes {expected} argument(s) ({found} given)")]
    Arity {
        function: &'static str,
        expected: &'static str,
        found: usize,
    },
    #[error("unsupported operand types for {op}: '{left}' and '{right}'")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("bad operand type for {op}: '{kind}'")]
    BadOperand { op: &'static str, kind: &'static str },
    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in {0}")]
    Overflow(&'static str),
    #[error("cannot convert '{value}' to {target}")]
    Conversion { value: String, target: &'static str },
    #[error("sequence of length {0} exceeds the limit of {max} elements", max = MAX_SEQUENCE_LEN)]
    TooLarge(u128),
    #[error("{0}")]
    InvalidArgument(String),
}

type Result<T> = std::result::Result<T, ExprError>;

// --- AST ---

/// A parsed expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    List(Vec<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }
}

/// Read-only name lookup used during evaluation.
pub trait Scope {
    fn lookup(&self, name: &str) -> Option<&Value>;
}

impl Scope for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// A scope with no names in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn lookup(&self, _name: &str) -> Option<&Value> {
        None
    }
}

impl Expr {
    fn binary(op: BinaryOp, left: Self, right: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Evaluates the expression against `scope`.
    pub fn eval(&self, scope: &dyn Scope) -> Result<Value> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Var(name) => scope
                .lookup(name)
                .cloned()
                .ok_or_else(|| ExprError::UndefinedVariable(name.clone())),
            Self::List(items) => items
                .iter()
                .map(|item| item.eval(scope))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Self::Unary { op, operand } => unary(*op, operand.eval(scope)?),
            Self::Binary { op, left, right } => binary(*op, left.eval(scope)?, right.eval(scope)?),
            Self::Index { target, index } => index_value(target.eval(scope)?, index.eval(scope)?),
            Self::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| arg.eval(scope))
                    .collect::<Result<Vec<_>>>()?;
                call_builtin(name, args)
            }
        }
    }
}

// --- PARSER ---

/// Parses an expression string into an `Expr`.
pub fn parse(input: &str) -> Result<Expr> {
    let mut parser = Parser::new(input);
    let expr = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(expr)
}

/// Parses and evaluates `input` in one step.
pub fn evaluate(input: &str, scope: &dyn Scope) -> Result<Value> {
    parse(input)?.eval(scope)
}

/// Recursive descent parser. Precedence, lowest first:
/// additive, multiplicative, unary, power, postfix (indexing), primary.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0, depth: 0 }
    }

    /// Goes one level deeper into the tree being built.
    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn rest(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or("")
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start_matches([' ', '\t', '\n', '\r']);
        self.pos += rest.len() - trimmed.len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.rest().chars().next()
    }

    /// Consumes `token` if it is next in the input.
    fn eat(&mut self, token: &str) -> bool {
        self.skip_whitespace();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", token)))
        }
    }

    fn expect_end(&mut self) -> Result<()> {
        self.skip_whitespace();
        if self.rest().is_empty() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected trailing input '{}'", self.rest())))
        }
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            pos: self.pos,
            message: message.into(),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        let outer = self.depth;
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat("+") {
                BinaryOp::Add
            } else if self.eat("-") {
                BinaryOp::Sub
            } else {
                break;
            };
            // Each operator nests the left operand one level deeper.
            self.descend()?;
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
        self.depth = outer;
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let outer = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            // `//` must be tried before `/`.
            let op = if self.eat("//") {
                BinaryOp::FloorDiv
            } else if self.eat("*") {
                BinaryOp::Mul
            } else if self.eat("/") {
                BinaryOp::Div
            } else if self.eat("%") {
                BinaryOp::Mod
            } else {
                break;
            };
            self.descend()?;
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
        self.depth = outer;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        self.descend()?;
        let result = self.parse_signed();
        self.depth -= 1;
        result
    }

    fn parse_signed(&mut self) -> Result<Expr> {
        let op = if self.eat("-") {
            UnaryOp::Neg
        } else if self.eat("+") {
            UnaryOp::Pos
        } else {
            return self.parse_power();
        };
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// `**` binds tighter than unary minus on its left and is right-associative:
    /// `-2**2 == -4`, `2**-1 == 0.5`, `2**3**2 == 512`.
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_postfix()?;
        if self.eat("**") {
            let exponent = self.parse_unary()?;
            return Ok(Expr::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let outer = self.depth;
        let mut expr = self.parse_primary()?;
        while self.eat("[") {
            self.descend()?;
            let index = self.parse_expr()?;
            self.expect("]")?;
            expr = Expr::Index {
                target: Box::new(expr),
                index: Box::new(index),
            };
        }
        self.depth = outer;
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                if self.eat(")") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.parse_expr()?;
                if self.eat(",") {
                    // A tuple; evaluated as a list.
                    let mut items = vec![first];
                    items.extend(self.parse_sequence(")")?);
                    return Ok(Expr::List(items));
                }
                self.expect(")")?;
                Ok(first)
            }
            Some('[') => {
                self.pos += 1;
                Ok(Expr::List(self.parse_sequence("]")?))
            }
            Some(quote @ ('\'' | '"')) => self.parse_string(quote),
            Some(c) if c.is_ascii_digit() => self.parse_number(),
            Some('.') if self.rest().chars().nth(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.parse_number()
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let name = self.parse_identifier();
                match name.as_str() {
                    "True" | "true" => return Ok(Expr::Literal(Value::Bool(true))),
                    "False" | "false" => return Ok(Expr::Literal(Value::Bool(false))),
                    "None" | "null" => return Ok(Expr::Literal(Value::Null)),
                    _ => {}
                }
                if self.eat("(") {
                    let args = self.parse_sequence(")")?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Some(c) => Err(self.error(format!("unexpected character '{}'", c))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    /// Parses comma separated expressions up to and including `close`.
    /// A trailing comma is allowed.
    fn parse_sequence(&mut self, close: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                break;
            }
            items.push(self.parse_expr()?);
            if !self.eat(",") {
                self.expect(close)?;
                break;
            }
        }
        Ok(items)
    }

    fn parse_identifier(&mut self) -> String {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        self.pos += len;
        rest.get(..len).unwrap_or("").to_string()
    }

    fn parse_number(&mut self) -> Result<Expr> {
        let rest = self.rest();
        let bytes = rest.as_bytes();
        let mut end = scan_digits(bytes, 0);
        let mut is_float = false;

        if bytes.get(end) == Some(&b'.') {
            is_float = true;
            end = scan_digits(bytes, end + 1);
        }
        if matches!(bytes.get(end), Some(b'e' | b'E')) {
            let mut exp_start = end + 1;
            if matches!(bytes.get(exp_start), Some(b'+' | b'-')) {
                exp_start += 1;
            }
            let exp_end = scan_digits(bytes, exp_start);
            if exp_end > exp_start {
                is_float = true;
                end = exp_end;
            }
        }

        let text: String = rest.get(..end).unwrap_or("").replace('_', "");
        let literal = if is_float {
            text.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| self.error(format!("invalid float literal '{}'", text)))?
        } else {
            text.parse::<i64>()
                .map(Value::Int)
                .map_err(|_| self.error(format!("integer literal '{}' is out of range", text)))?
        };
        self.pos += end;
        Ok(Expr::Literal(literal))
    }

    fn parse_string(&mut self, quote: char) -> Result<Expr> {
        let start = self.pos;
        let mut out = String::new();
        let mut chars = self.rest().char_indices().skip(1);
        while let Some((offset, c)) = chars.next() {
            match c {
                '\\' => {
                    let (_, escaped) = chars
                        .next()
                        .ok_or_else(|| self.error("unterminated string literal"))?;
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                }
                c if c == quote => {
                    self.pos = start + offset + c.len_utf8();
                    return Ok(Expr::Literal(Value::Str(out)));
                }
                c => out.push(c),
            }
        }
        Err(self.error("unterminated string literal"))
    }
}

/// Returns the index just past a run of ASCII digits and underscores.
fn scan_digits(bytes: &[u8], from: usize) -> usize {
    let mut end = from;
    while bytes
        .get(end)
        .is_some_and(|b| b.is_ascii_digit() || *b == b'_')
    {
        end += 1;
    }
    end
}

// --- EVALUATION ---

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn to_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(x) => x,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Int(i) => Value::Int(i),
            Self::Float(x) => Value::Float(x),
        }
    }
}

fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::Int(i) => Some(Num::Int(*i)),
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::Float(x) => Some(Num::Float(*x)),
        _ => None,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn unary(op: UnaryOp, operand: Value) -> Result<Value> {
    let symbol = match op {
        UnaryOp::Neg => "unary -",
        UnaryOp::Pos => "unary +",
    };
    let num = as_num(&operand).ok_or(ExprError::BadOperand {
        op: symbol,
        kind: operand.kind(),
    })?;
    match (op, num) {
        (UnaryOp::Pos, n) => Ok(n.into_value()),
        (UnaryOp::Neg, Num::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or(ExprError::Overflow("negation")),
        (UnaryOp::Neg, Num::Float(x)) => Ok(Value::Float(-x)),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value> {
    match (op, &left, &right) {
        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{}{}", a, b))),
        (BinaryOp::Add, Value::List(a), Value::List(b)) => {
            let total = elements(a) + elements(b);
            if total > MAX_SEQUENCE_LEN as u128 {
                return Err(ExprError::TooLarge(total));
            }
            let mut items = a.clone();
            items.extend(b.iter().cloned());
            return Ok(Value::List(items));
        }
        (BinaryOp::Mul, Value::Str(s), Value::Int(n)) | (BinaryOp::Mul, Value::Int(n), Value::Str(s)) => {
            let count = repeat_count(*n, s.len() as u128)?;
            return Ok(Value::Str(s.repeat(count)));
        }
        (BinaryOp::Mul, Value::List(items), Value::Int(n))
        | (BinaryOp::Mul, Value::Int(n), Value::List(items)) => {
            let count = repeat_count(*n, elements(items))?;
            let mut out = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                out.extend(items.iter().cloned());
            }
            return Ok(Value::List(out));
        }
        _ => {}
    }

    match (as_num(&left), as_num(&right)) {
        (Some(Num::Int(a)), Some(Num::Int(b))) => int_arithmetic(op, a, b),
        (Some(a), Some(b)) => float_arithmetic(op, a.to_f64(), b.to_f64()),
        _ => Err(ExprError::TypeMismatch {
            op: op.symbol(),
            left: left.kind(),
            right: right.kind(),
        }),
    }
}

/// Validates a repetition count; non-positive counts repeat zero times.
/// `unit_len` is the size of one copy, nested elements included.
fn repeat_count(n: i64, unit_len: u128) -> Result<usize> {
    let count = usize::try_from(n.max(0)).map_err(|_| ExprError::Overflow("repetition"))?;
    let total = unit_len.saturating_mul(count as u128);
    if total > MAX_SEQUENCE_LEN as u128 {
        return Err(ExprError::TooLarge(total));
    }
    Ok(count)
}

/// Counts the values held by `items`, including the elements of nested lists.
fn elements(items: &[Value]) -> u128 {
    items
        .iter()
        .map(|item| match item {
            Value::List(inner) => 1 + elements(inner),
            _ => 1,
        })
        .sum()
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<Value> {
    let checked = |result: Option<i64>, what: &'static str| {
        result.map(Value::Int).ok_or(ExprError::Overflow(what))
    };
    match op {
        BinaryOp::Add => checked(a.checked_add(b), "addition"),
        BinaryOp::Sub => checked(a.checked_sub(b), "subtraction"),
        BinaryOp::Mul => checked(a.checked_mul(b), "multiplication"),
        BinaryOp::Div => {
            if b == 0 {
                return Err(ExprError::DivisionByZero);
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(ExprError::DivisionByZero);
            }
            let quotient = a.checked_div(b).ok_or(ExprError::Overflow("division"))?;
            // Round toward negative infinity.
            if a % b != 0 && ((a < 0) != (b < 0)) {
                checked(quotient.checked_sub(1), "division")
            } else {
                Ok(Value::Int(quotient))
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(ExprError::DivisionByZero);
            }
            let rem = a.checked_rem(b).ok_or(ExprError::Overflow("modulo"))?;
            // The result takes the sign of the divisor.
            if rem != 0 && ((rem < 0) != (b < 0)) {
                checked(rem.checked_add(b), "modulo")
            } else {
                Ok(Value::Int(rem))
            }
        }
        BinaryOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(ExprError::DivisionByZero);
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exponent = u32::try_from(b).map_err(|_| ExprError::Overflow("exponentiation"))?;
            checked(a.checked_pow(exponent), "exponentiation")
        }
    }
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => {
            return Err(ExprError::DivisionByZero);
        }
        BinaryOp::Pow if a == 0.0 && b < 0.0 => return Err(ExprError::DivisionByZero),
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod => a - b * (a / b).floor(),
        BinaryOp::Pow => a.powf(b),
    };
    Ok(Value::Float(result))
}

fn index_value(target: Value, index: Value) -> Result<Value> {
    let raw = as_int(&index).ok_or(ExprError::BadOperand {
        op: "index",
        kind: index.kind(),
    })?;
    match target {
        Value::List(items) => {
            let pos = normalize_index(raw, items.len())?;
            items
                .into_iter()
                .nth(pos)
                .ok_or(ExprError::IndexOutOfRange { index: raw, len: 0 })
        }
        Value::Str(s) => {
            let len = s.chars().count();
            let pos = normalize_index(raw, len)?;
            s.chars()
                .nth(pos)
                .map(|c| Value::Str(c.to_string()))
                .ok_or(ExprError::IndexOutOfRange { index: raw, len })
        }
        other => Err(ExprError::BadOperand {
            op: "index",
            kind: other.kind(),
        }),
    }
}

/// Maps a possibly negative index onto `0..len`.
fn normalize_index(index: i64, len: usize) -> Result<usize> {
    let out_of_range = ExprError::IndexOutOfRange { index, len };
    let signed_len = i64::try_from(len).map_err(|_| out_of_range.clone())?;
    let pos = if index < 0 { index + signed_len } else { index };
    if pos < 0 || pos >= signed_len {
        return Err(out_of_range);
    }
    usize::try_from(pos).map_err(|_| out_of_range)
}

// --- BUILTINS ---

fn call_builtin(name: &str, args: Vec<Value>) -> Result<Value> {
    match name {
        "range" => builtin_range(&args),
        "len" => match single("len", args)? {
            Value::List(items) => len_value(items.len()),
            Value::Str(s) => len_value(s.chars().count()),
            other => Err(ExprError::BadOperand {
                op: "len()",
                kind: other.kind(),
            }),
        },
        "str" => Ok(Value::Str(single("str", args)?.to_string())),
        "int" => builtin_int(single("int", args)?),
        "float" => builtin_float(single("float", args)?),
        "min" => extremum("min", args, Ordering::Less),
        "max" => extremum("max", args, Ordering::Greater),
        "sum" => builtin_sum(args),
        _ => Err(ExprError::UnknownFunction(name.to_string())),
    }
}

fn single(function: &'static str, args: Vec<Value>) -> Result<Value> {
    let found = args.len();
    let mut iter = args.into_iter();
    match (iter.next(), iter.next()) {
        (Some(value), None) => Ok(value),
        _ => Err(ExprError::Arity {
            function,
            expected: "1",
            found,
        }),
    }
}

fn len_value(len: usize) -> Result<Value> {
    i64::try_from(len)
        .map(Value::Int)
        .map_err(|_| ExprError::Overflow("len()"))
}

fn builtin_range(args: &[Value]) -> Result<Value> {
    let ints = args
        .iter()
        .map(|arg| {
            as_int(arg).ok_or(ExprError::BadOperand {
                op: "range()",
                kind: arg.kind(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(ExprError::Arity {
                function: "range",
                expected: "1 to 3",
                found: args.len(),
            });
        }
    };
    if step == 0 {
        return Err(ExprError::InvalidArgument(
            "range() step must not be zero".to_string(),
        ));
    }

    let span = i128::from(stop) - i128::from(start);
    let step_wide = i128::from(step);
    let len = if (step > 0 && span > 0) || (step < 0 && span < 0) {
        (span.abs() + step_wide.abs() - 1) / step_wide.abs()
    } else {
        0
    };
    if len > MAX_SEQUENCE_LEN as i128 {
        return Err(ExprError::TooLarge(len.unsigned_abs()));
    }

    let items = std::iter::successors(Some(start), |current| current.checked_add(step))
        .take_while(|current| if step > 0 { *current < stop } else { *current > stop })
        .map(Value::Int)
        .collect();
    Ok(Value::List(items))
}

#[allow(clippy::cast_possible_truncation)]
fn builtin_int(value: Value) -> Result<Value> {
    match value {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        // The bounds check makes the truncating cast exact.
        Value::Float(x) if x.is_finite() && x.trunc() >= i64::MIN as f64 && x.trunc() < i64::MAX as f64 => {
            Ok(Value::Int(x.trunc() as i64))
        }
        Value::Str(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| ExprError::Conversion {
            value: s,
            target: "int",
        }),
        other => Err(ExprError::Conversion {
            value: other.to_string(),
            target: "int",
        }),
    }
}

fn builtin_float(value: Value) -> Result<Value> {
    if let Some(num) = as_num(&value) {
        return Ok(Value::Float(num.to_f64()));
    }
    match value {
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| ExprError::Conversion {
                value: s,
                target: "float",
            }),
        other => Err(ExprError::Conversion {
            value: other.to_string(),
            target: "float",
        }),
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => match (as_num(a), as_num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => Ok(x.cmp(&y)),
            (Some(x), Some(y)) => Ok(x.to_f64().partial_cmp(&y.to_f64()).unwrap_or(Ordering::Equal)),
            _ => Err(ExprError::TypeMismatch {
                op: "comparison",
                left: a.kind(),
                right: b.kind(),
            }),
        },
    }
}

/// `min`/`max`: either a single list argument or two or more values.
/// Ties keep the first candidate.
fn extremum(function: &'static str, args: Vec<Value>, wanted: Ordering) -> Result<Value> {
    let candidates = match <[Value; 1]>::try_from(args) {
        Ok([Value::List(items)]) => items,
        Ok([other]) => {
            return Err(ExprError::BadOperand {
                op: function,
                kind: other.kind(),
            });
        }
        Err(args) if args.is_empty() => {
            return Err(ExprError::Arity {
                function,
                expected: "at least 1",
                found: 0,
            });
        }
        Err(args) => args,
    };

    let mut iter = candidates.into_iter();
    let mut best = iter.next().ok_or_else(|| {
        ExprError::InvalidArgument(format!("{}() arg is an empty sequence", function))
    })?;
    for candidate in iter {
        if compare(&candidate, &best)? == wanted {
            best = candidate;
        }
    }
    Ok(best)
}

fn builtin_sum(args: Vec<Value>) -> Result<Value> {
    let found = args.len();
    let mut iter = args.into_iter();
    let (items, start) = match (iter.next(), iter.next(), iter.next()) {
        (Some(Value::List(items)), start, None) => (items, start.unwrap_or(Value::Int(0))),
        (Some(other), _, None) => {
            return Err(ExprError::BadOperand {
                op: "sum()",
                kind: other.kind(),
            });
        }
        _ => {
            return Err(ExprError::Arity {
                function: "sum",
                expected: "1 or 2",
                found,
            });
        }
    };
    items
        .into_iter()
        .try_fold(start, |acc, item| binary(BinaryOp::Add, acc, item))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expr: &str) -> Value {
        evaluate(expr, &EmptyScope).expect("eval should succeed")
    }

    fn ints(values: &[i64]) -> Value {
        Value::List(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_literals() {
        assert_eq!(eval("42"), Value::Int(42));
        assert_eq!(eval("1_000"), Value::Int(1000));
        assert_eq!(eval("2.5"), Value::Float(2.5));
        assert_eq!(eval("1e3"), Value::Float(1000.0));
        assert_eq!(eval(".5"), Value::Float(0.5));
        assert_eq!(eval("'it\\'s'"), Value::Str("it's".to_string()));
        assert_eq!(eval("\"a b\""), Value::Str("a b".to_string()));
        assert_eq!(eval("True"), Value::Bool(true));
        assert_eq!(eval("None"), Value::Null);
    }

    #[test]
    fn test_precedence_and_grouping() {
        assert_eq!(eval("2 + 3 * 4"), Value::Int(14));
        assert_eq!(eval("(2 + 3) * 4"), Value::Int(20));
        assert_eq!(eval("10 - 6 / 2"), Value::Float(7.0));
        assert_eq!(eval("-2 ** 2"), Value::Int(-4));
        assert_eq!(eval("2 ** 3 ** 2"), Value::Int(512));
        assert_eq!(eval("2 ** -1"), Value::Float(0.5));
    }

    #[test]
    fn test_floor_division_and_modulo_round_toward_negative_infinity() {
        assert_eq!(eval("7 // 2"), Value::Int(3));
        assert_eq!(eval("-7 // 2"), Value::Int(-4));
        assert_eq!(eval("-7 % 3"), Value::Int(2));
        assert_eq!(eval("7 % -3"), Value::Int(-2));
        assert_eq!(eval("7.5 // 2"), Value::Float(3.0));
    }

    #[test]
    fn test_lists_and_sequences() {
        assert_eq!(eval("[1, 2, 3,]"), ints(&[1, 2, 3]));
        assert_eq!(eval("[1] + [2]"), ints(&[1, 2]));
        assert_eq!(eval("[0] * 3"), ints(&[0, 0, 0]));
        assert_eq!(eval("(1, 2)"), ints(&[1, 2]));
        assert_eq!(eval("'ab' * 2"), Value::Str("abab".to_string()));
        assert_eq!(eval("[1, 2, 3][-1]"), Value::Int(3));
        assert_eq!(eval("'abc'[1]"), Value::Str("b".to_string()));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval("range(3)"), ints(&[0, 1, 2]));
        assert_eq!(eval("range(1, 7, 2)"), ints(&[1, 3, 5]));
        assert_eq!(eval("range(3, 0, -1)"), ints(&[3, 2, 1]));
        assert_eq!(eval("range(5, 1)"), ints(&[]));
        assert_eq!(eval("len([1, 2])"), Value::Int(2));
        assert_eq!(eval("str(3) + 'x'"), Value::Str("3x".to_string()));
        assert_eq!(eval("str(1 > 0)"), Value::Str("True".to_string()));
        assert_eq!(eval("str(None)"), Value::Str("None".to_string()));
        assert_eq!(eval("int('12') + int(2.9)"), Value::Int(14));
        assert_eq!(eval("float(1)"), Value::Float(1.0));
        assert_eq!(eval("max([3, 9, 1])"), Value::Int(9));
        assert_eq!(eval("min(4, 2.5)"), Value::Float(2.5));
        assert_eq!(eval("sum(range(5))"), Value::Int(10));
    }

    #[test]
    fn test_variables_are_read_from_scope() {
        let mut scope = HashMap::new();
        scope.insert("n".to_string(), Value::Int(4));
        scope.insert("names".to_string(), Value::List(vec![Value::Str("a".to_string())]));
        assert_eq!(evaluate("n * 2", &scope).unwrap(), Value::Int(8));
        assert_eq!(evaluate("names + ['b']", &scope).unwrap().to_string(), "[a, b]");
        assert_eq!(
            evaluate("missing + 1", &scope).unwrap_err(),
            ExprError::UndefinedVariable("missing".to_string())
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(evaluate("1 / 0", &EmptyScope).unwrap_err(), ExprError::DivisionByZero);
        assert!(matches!(
            evaluate("9223372036854775807 + 1", &EmptyScope),
            Err(ExprError::Overflow("addition"))
        ));
        assert!(matches!(
            evaluate("'a' - 1", &EmptyScope),
            Err(ExprError::TypeMismatch { op: "-", .. })
        ));
        assert!(matches!(
            evaluate("[1][5]", &EmptyScope),
            Err(ExprError::IndexOutOfRange { index: 5, len: 1 })
        ));
        assert!(matches!(
            evaluate("range(0, 5, 0)", &EmptyScope),
            Err(ExprError::InvalidArgument(_))
        ));
        assert!(matches!(
            evaluate("range(100000000000)", &EmptyScope),
            Err(ExprError::TooLarge(_))
        ));
        assert!(matches!(evaluate("(1 + 2", &EmptyScope), Err(ExprError::Syntax { .. })));
        assert!(matches!(evaluate("1 2", &EmptyScope), Err(ExprError::Syntax { pos: 2, .. })));
        assert!(matches!(evaluate("'open", &EmptyScope), Err(ExprError::Syntax { .. })));
    }

    #[test]
    fn test_zero_to_a_negative_power_is_division_by_zero() {
        assert_eq!(evaluate("0 ** -1", &EmptyScope).unwrap_err(), ExprError::DivisionByZero);
        assert_eq!(evaluate("0.0 ** -2", &EmptyScope).unwrap_err(), ExprError::DivisionByZero);
        assert_eq!(eval("0 ** 0"), Value::Int(1));
    }

    #[test]
    fn test_nested_repetition_is_bounded() {
        // Each copy holds 5001 values, though it is one element of the outer list.
        assert!(matches!(
            evaluate("[[0] * 5000] * 5000", &EmptyScope),
            Err(ExprError::TooLarge(25_005_000))
        ));
        assert_eq!(eval("[[1, 2]] * 2"), Value::List(vec![ints(&[1, 2]), ints(&[1, 2])]));
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_error() {
        let deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(matches!(parse(&deep), Err(ExprError::Syntax { .. })));

        let lists = format!("{}1{}", "[".repeat(10_000), "]".repeat(10_000));
        assert!(matches!(parse(&lists), Err(ExprError::Syntax { .. })));

        let signs = format!("{}1", "-".repeat(10_000));
        assert!(matches!(parse(&signs), Err(ExprError::Syntax { .. })));

        let chain = format!("1{}", " + 1".repeat(10_000));
        assert!(matches!(parse(&chain), Err(ExprError::Syntax { .. })));

        let indexes = format!("x{}", "[0".repeat(10_000));
        assert!(matches!(parse(&indexes), Err(ExprError::Syntax { .. })));
    }

    #[test]
    fn test_moderate_nesting_still_parses() {
        let nested = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(eval(&nested), Value::Int(1));
        let chain = format!("1{}", " + 1".repeat(100));
        assert_eq!(eval(&chain), Value::Int(101));
    }

    #[test]
    fn test_no_escape_hatches() {
        for source in ["__import__('os')", "open('/etc/passwd')", "exec('1')", "eval('1')"] {
            assert!(
                matches!(evaluate(source, &EmptyScope), Err(ExprError::UnknownFunction(_))),
                "{} should be rejected",
                source
            );
        }
        assert!(matches!(
            evaluate("x.y", &EmptyScope),
            Err(ExprError::Syntax { .. })
        ));
    }
}
