//! Dynamically typed scalar values and comparison operators
//!
//! State values, event params and action params are all [`Value`]s. All
//! comparisons are total: comparing values of incompatible types simply does
//! not match, it never fails.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A dynamically typed scalar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// The type tag of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Bool,
    Int,
    Float,
    String,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::String => "string",
        };
        f.write_str(name)
    }
}

impl Value {
    /// The type tag of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
        }
    }

    /// Numeric view of the value, if it is an int or a float
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Best-effort conversion to another type
    ///
    /// Returns `None` when the value has no sensible representation in the
    /// target type (e.g. `"abc"` as an int, or `2.5` as an int).
    pub fn convert(&self, target: ValueType) -> Option<Value> {
        if self.value_type() == target {
            return Some(self.clone());
        }

        match (self, target) {
            (Value::Bool(b), ValueType::Int) => Some(Value::Int(i64::from(*b))),
            (Value::Bool(b), ValueType::Float) => Some(Value::Float(if *b { 1.0 } else { 0.0 })),
            (Value::Int(i), ValueType::Bool) => Some(Value::Bool(*i != 0)),
            (Value::Int(i), ValueType::Float) => Some(Value::Float(*i as f64)),
            (Value::Float(f), ValueType::Int) => float_to_int(*f).map(Value::Int),
            (Value::Float(_), ValueType::Bool) => None,
            (Value::String(s), ValueType::Bool) => parse_bool(s).map(Value::Bool),
            (Value::String(s), ValueType::Int) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().and_then(float_to_int))
                    .map(Value::Int)
            }
            (Value::String(s), ValueType::Float) => s.trim().parse::<f64>().ok().map(Value::Float),
            (other, ValueType::String) => Some(Value::String(other.to_string())),
            _ => None,
        }
    }
}

fn float_to_int(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Comparison applied between an actual value and a target value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueOperator {
    #[default]
    Equals,
    NotEquals,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
}

impl ValueOperator {
    /// Whether the operator only makes sense for ordered (numeric) values
    pub fn is_ordering(&self) -> bool {
        !matches!(self, ValueOperator::Equals | ValueOperator::NotEquals)
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            ValueOperator::Equals => ordering == Ordering::Equal,
            ValueOperator::NotEquals => ordering != Ordering::Equal,
            ValueOperator::GreaterThan => ordering == Ordering::Greater,
            ValueOperator::GreaterOrEqual => ordering != Ordering::Less,
            ValueOperator::LessThan => ordering == Ordering::Less,
            ValueOperator::LessOrEqual => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for ValueOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            ValueOperator::Equals => "==",
            ValueOperator::NotEquals => "!=",
            ValueOperator::GreaterThan => ">",
            ValueOperator::GreaterOrEqual => ">=",
            ValueOperator::LessThan => "<",
            ValueOperator::LessOrEqual => "<=",
        };
        f.write_str(symbol)
    }
}

/// Combinator of a state evaluator node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateOperator {
    #[default]
    And,
    Or,
}

/// Compare `actual` against `target` using `op`
///
/// Numbers compare with numbers and numeric strings as `f64`. Other values of
/// different types are coerced to the type of `actual` first. If that fails
/// the comparison does not match.
pub fn compare(actual: &Value, op: ValueOperator, target: &Value) -> bool {
    match (actual, target) {
        (Value::Int(a), Value::Int(b)) => op.accepts(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            compare_f64(actual.as_f64(), op, target.as_f64())
        }
        (Value::Int(_) | Value::Float(_), Value::String(s)) => {
            compare_f64(actual.as_f64(), op, parse_f64(s))
        }
        (Value::String(s), Value::Int(_) | Value::Float(_)) => {
            compare_f64(parse_f64(s), op, target.as_f64())
        }
        (Value::Bool(a), Value::Bool(b)) => equality_only(a == b, op),
        (Value::String(a), Value::String(b)) => equality_only(a == b, op),
        _ => match target.convert(actual.value_type()) {
            Some(coerced) if coerced.value_type() == actual.value_type() => {
                compare(actual, op, &coerced)
            }
            _ => false,
        },
    }
}

fn compare_f64(actual: Option<f64>, op: ValueOperator, target: Option<f64>) -> bool {
    match (actual, target) {
        (Some(a), Some(b)) => a.partial_cmp(&b).is_some_and(|o| op.accepts(o)),
        _ => false,
    }
}

fn parse_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

fn equality_only(equal: bool, op: ValueOperator) -> bool {
    match op {
        ValueOperator::Equals => equal,
        ValueOperator::NotEquals => !equal,
        _ => false,
    }
}
