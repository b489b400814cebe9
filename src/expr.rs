//! Deferred expressions over earlier field values.
//!
//! A [`Placeholder`] is built while a schema is being declared, when the values it
//! refers to do not exist yet. It is evaluated later, once per parse or build pass,
//! against the [`ResolutionContext`] holding the fields committed so far.
//!
//! Combinators are plain methods (`add`, `mul`, `equals`, ...) that return a new
//! expression; nothing is evaluated until [`Placeholder::resolve`].
//!
//! ```
//! use bytelayout::{Placeholder, ResolutionContext, Value};
//!
//! let area = Placeholder::field("width").mul(Placeholder::field("height"));
//! let mut ctx = ResolutionContext::default();
//! ctx.set("width", Value::U16(3));
//! ctx.set("height", Value::U16(4));
//! assert_eq!(area.resolve(&ctx).unwrap(), Value::U64(12));
//! ```

use crate::context::ResolutionContext;
use crate::error::CodecError;
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// A lazily evaluated value: a literal, a reference to an earlier field, or a
/// combination of those.
#[derive(Debug, Clone, PartialEq)]
pub enum Placeholder {
    Literal(Value),
    Field(String),
    Unary(UnaryOp, Box<Placeholder>),
    Binary(BinaryOp, Box<Placeholder>, Box<Placeholder>),
}

impl Placeholder {
    pub fn field(name: impl Into<String>) -> Self {
        Placeholder::Field(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Placeholder::Literal(value.into())
    }

    fn binary(self, op: BinaryOp, rhs: impl Into<Placeholder>) -> Self {
        Placeholder::Binary(op, Box::new(self), Box::new(rhs.into()))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(self, rhs: impl Into<Placeholder>) -> Self {
        self.binary(BinaryOp::Add, rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, rhs: impl Into<Placeholder>) -> Self {
        self.binary(BinaryOp::Sub, rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(self, rhs: impl Into<Placeholder>) -> Self {
        self.binary(BinaryOp::Mul, rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn div(self, rhs: impl Into<Placeholder>) -> Self {
        self.binary(BinaryOp::Div, rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn rem(self, rhs: impl Into<Placeholder>) -> Self {
        self.binary(BinaryOp::Rem, rhs)
    }

    pub fn equals(self, rhs: impl Into<Placeholder>) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    pub fn not_equals(self, rhs: impl Into<Placeholder>) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }

    pub fn less_than(self, rhs: impl Into<Placeholder>) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    pub fn less_equal(self, rhs: impl Into<Placeholder>) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    pub fn greater_than(self, rhs: impl Into<Placeholder>) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    pub fn greater_equal(self, rhs: impl Into<Placeholder>) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    pub fn and(self, rhs: impl Into<Placeholder>) -> Self {
        self.binary(BinaryOp::And, rhs)
    }

    pub fn or(self, rhs: impl Into<Placeholder>) -> Self {
        self.binary(BinaryOp::Or, rhs)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Placeholder::Unary(UnaryOp::Not, Box::new(self))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn neg(self) -> Self {
        Placeholder::Unary(UnaryOp::Neg, Box::new(self))
    }

    /// Field names this expression reads, in first-seen order.
    pub fn references(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Placeholder::Literal(_) => {}
            Placeholder::Field(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Placeholder::Unary(_, e) => e.collect_references(out),
            Placeholder::Binary(_, l, r) => {
                l.collect_references(out);
                r.collect_references(out);
            }
        }
    }

    /// Evaluate against the fields committed so far. Never mutates `ctx`.
    pub fn resolve(&self, ctx: &ResolutionContext) -> Result<Value, CodecError> {
        match self {
            Placeholder::Literal(v) => Ok(v.clone()),
            Placeholder::Field(name) => ctx
                .get(name)
                .cloned()
                .ok_or_else(|| CodecError::UnresolvedReference(name.clone())),
            Placeholder::Unary(op, e) => {
                let v = e.resolve(ctx)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&v, self)?)),
                    UnaryOp::Neg => {
                        let x = integer(&v, self)?;
                        from_i128(-x, self)
                    }
                }
            }
            Placeholder::Binary(op, l, r) => {
                let lhs = l.resolve(ctx)?;
                match op {
                    BinaryOp::And => {
                        if !truthy(&lhs, self)? {
                            return Ok(Value::Bool(false));
                        }
                        Ok(Value::Bool(truthy(&r.resolve(ctx)?, self)?))
                    }
                    BinaryOp::Or => {
                        if truthy(&lhs, self)? {
                            return Ok(Value::Bool(true));
                        }
                        Ok(Value::Bool(truthy(&r.resolve(ctx)?, self)?))
                    }
                    _ => {
                        let rhs = r.resolve(ctx)?;
                        self.apply(*op, &lhs, &rhs)
                    }
                }
            }
        }
    }

    /// Resolve to a non-negative size or count.
    pub fn resolve_usize(&self, ctx: &ResolutionContext) -> Result<usize, CodecError> {
        let v = self.resolve(ctx)?;
        v.as_u64()
            .filter(|_| v.is_integer() && !matches!(v, Value::Bool(_)))
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| CodecError::InvalidExpression(format!("{} is not a valid size ({})", self, v)))
    }

    fn apply(&self, op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, CodecError> {
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                let a = integer(lhs, self)?;
                let b = integer(rhs, self)?;
                let r = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    BinaryOp::Mul => a.checked_mul(b),
                    BinaryOp::Div => a.checked_div(b),
                    _ => a.checked_rem(b),
                };
                let r = r.ok_or_else(|| {
                    CodecError::InvalidExpression(format!("{}: overflow or division by zero", self))
                })?;
                from_i128(r, self)
            }
            BinaryOp::Eq => Ok(Value::Bool(compare(lhs, rhs).map_or(lhs == rhs, |o| o == Ordering::Equal))),
            BinaryOp::Ne => Ok(Value::Bool(compare(lhs, rhs).map_or(lhs != rhs, |o| o != Ordering::Equal))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ord = compare(lhs, rhs).ok_or_else(|| {
                    CodecError::InvalidExpression(format!("{}: cannot order {} and {}", self, lhs.kind(), rhs.kind()))
                })?;
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ord == Ordering::Less,
                    BinaryOp::Le => ord != Ordering::Greater,
                    BinaryOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                }))
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit ops handled in resolve"),
        }
    }
}

fn as_i128(v: &Value) -> Option<i128> {
    if !v.is_integer() {
        return None;
    }
    v.as_u64().map(i128::from).or_else(|| v.as_i64().map(i128::from))
}

fn integer(v: &Value, expr: &Placeholder) -> Result<i128, CodecError> {
    as_i128(v).ok_or_else(|| {
        CodecError::InvalidExpression(format!("{}: expected an integer, found {}", expr, v.kind()))
    })
}

fn truthy(v: &Value, expr: &Placeholder) -> Result<bool, CodecError> {
    v.as_bool().ok_or_else(|| {
        CodecError::InvalidExpression(format!("{}: expected a boolean, found {}", expr, v.kind()))
    })
}

/// Non-negative results are unsigned, negative ones signed.
fn from_i128(x: i128, expr: &Placeholder) -> Result<Value, CodecError> {
    if x >= 0 {
        u64::try_from(x).map(Value::U64)
    } else {
        i64::try_from(x).map(Value::I64)
    }
    .map_err(|_| CodecError::InvalidExpression(format!("{}: result out of range", expr)))
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_i128(lhs), as_i128(rhs)) {
        return Some(a.cmp(&b));
    }
    let a = lhs.as_f64().or_else(|| as_i128(lhs).map(|x| x as f64))?;
    let b = rhs.as_f64().or_else(|| as_i128(rhs).map(|x| x as f64))?;
    a.partial_cmp(&b)
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::Literal(v) => write!(f, "{}", v),
            Placeholder::Field(name) => write!(f, "{}", name),
            Placeholder::Unary(UnaryOp::Neg, e) => write!(f, "-{}", e),
            Placeholder::Unary(UnaryOp::Not, e) => write!(f, "!{}", e),
            Placeholder::Binary(op, l, r) => write!(f, "({} {} {})", l, op.symbol(), r),
        }
    }
}

impl From<Value> for Placeholder {
    fn from(v: Value) -> Self {
        Placeholder::Literal(v)
    }
}

impl From<&Placeholder> for Placeholder {
    fn from(p: &Placeholder) -> Self {
        p.clone()
    }
}

impl From<usize> for Placeholder {
    fn from(n: usize) -> Self {
        Placeholder::Literal(Value::U64(n as u64))
    }
}

macro_rules! literal_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Placeholder {
            fn from(x: $t) -> Self {
                Placeholder::Literal(Value::from(x))
            }
        })*
    };
}

literal_from!(u8, u16, u32, u64, i32, i64, bool);
