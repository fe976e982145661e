//! Runtime values and the numeric tower.
//!
//! Every value the interpreter manipulates is one of the [`Value`] variants.
//! Numeric variants are totally ordered by [`Rank`]; binary arithmetic lifts
//! both operands to the wider rank with [`Value::promote`] before computing.

use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};
use std::fmt;

/// Map storage. Iteration follows insertion order.
pub type ValueMap = IndexMap<String, Value>;

/// A dynamically typed runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The undefined sentinel: produced by soft reads of unbound names and by `nil`.
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    F32(f32),
    F64(f64),
    BigInt(BigInt),
    BigFloat(BigDecimal),
    Str(String),
    Seq(Vec<Value>),
    Map(ValueMap),
}

/// Width of a numeric tag. Declaration order is promotion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    Bool,
    Int,
    Uint,
    F32,
    F64,
    BigInt,
    BigFloat,
}

impl Rank {
    pub fn is_float(self) -> bool {
        matches!(self, Rank::F32 | Rank::F64 | Rank::BigFloat)
    }
}

impl Value {
    /// Script-visible kind name, as used by `kind()` and the `is` operator.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::F32(_) => "float32",
            Value::F64(_) => "float",
            Value::BigInt(_) => "bigi",
            Value::BigFloat(_) => "bigf",
            Value::Str(_) => "string",
            Value::Seq(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Numeric rank, or `None` for non-numeric tags.
    pub fn rank(&self) -> Option<Rank> {
        Some(match self {
            Value::Bool(_) => Rank::Bool,
            Value::Int(_) => Rank::Int,
            Value::Uint(_) => Rank::Uint,
            Value::F32(_) => Rank::F32,
            Value::F64(_) => Rank::F64,
            Value::BigInt(_) => Rank::BigInt,
            Value::BigFloat(_) => Rank::BigFloat,
            Value::Nil | Value::Str(_) | Value::Seq(_) | Value::Map(_) => return None,
        })
    }

    pub fn is_numeric(&self) -> bool {
        self.rank().is_some_and(|r| r != Rank::Bool)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integral view of a numeric value, truncating floats.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            Value::Uint(u) => i64::try_from(*u).ok(),
            Value::F32(f) => f.is_finite().then(|| *f as i64),
            Value::F64(f) => f.is_finite().then(|| *f as i64),
            Value::BigInt(b) => b.to_i64(),
            Value::BigFloat(d) => d.to_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Uint(u) => Some(*u as f64),
            Value::F32(f) => Some(f64::from(*f)),
            Value::F64(f) => Some(*f),
            Value::BigInt(b) => b.to_f64(),
            Value::BigFloat(d) => d.to_f64(),
            _ => None,
        }
    }

    pub fn to_bigint(&self) -> Option<BigInt> {
        match self {
            Value::Bool(b) => Some(BigInt::from(u8::from(*b))),
            Value::Int(i) => Some(BigInt::from(*i)),
            Value::Uint(u) => Some(BigInt::from(*u)),
            Value::F32(f) => BigInt::from_f32(f.trunc()),
            Value::F64(f) => BigInt::from_f64(f.trunc()),
            Value::BigInt(b) => Some(b.clone()),
            Value::BigFloat(d) => Some(d.with_scale(0).into_bigint_and_exponent().0),
            _ => None,
        }
    }

    pub fn to_bigfloat(&self) -> Option<BigDecimal> {
        match self {
            Value::Bool(b) => Some(BigDecimal::from(u8::from(*b))),
            Value::Int(i) => Some(BigDecimal::from(*i)),
            Value::Uint(u) => Some(BigDecimal::from(*u)),
            Value::F32(f) => BigDecimal::from_f32(*f),
            Value::F64(f) => BigDecimal::from_f64(*f),
            Value::BigInt(b) => Some(BigDecimal::from(b.clone())),
            Value::BigFloat(d) => Some(d.clone()),
            _ => None,
        }
    }

    /// Convert a numeric value to the given rank.
    ///
    /// Returns `None` when the value has no exact-enough representation at that
    /// rank (a negative number as `Uint`, a non-finite float as a big number).
    pub fn promote(&self, to: Rank) -> Option<Value> {
        let from = self.rank()?;
        if from == to {
            return Some(self.clone());
        }
        Some(match to {
            Rank::Bool => return None,
            Rank::Int => Value::Int(self.as_i64()?),
            Rank::Uint => match self {
                Value::Bool(b) => Value::Uint(u64::from(*b)),
                Value::Int(i) => Value::Uint(u64::try_from(*i).ok()?),
                _ => return None,
            },
            Rank::F32 => Value::F32(self.as_f64()? as f32),
            Rank::F64 => Value::F64(self.as_f64()?),
            Rank::BigInt => Value::BigInt(self.to_bigint()?),
            Rank::BigFloat => Value::BigFloat(self.to_bigfloat()?),
        })
    }

    /// Collapse a big integer back to `Int` when it fits.
    pub fn normalize_bigint(b: BigInt) -> Value {
        match b.to_i64() {
            Some(i) => Value::Int(i),
            None => Value::BigInt(b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Uint(u) => write!(f, "{u}"),
            Value::F32(x) => write!(f, "{x}"),
            Value::F64(x) => write!(f, "{x}"),
            Value::BigInt(b) => write!(f, "{b}"),
            Value::BigFloat(d) => write!(f, "{}", d.normalized()),
            Value::Str(s) => f.write_str(s),
            Value::Seq(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("map[")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                f.write_str("]")
            }
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

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::Uint(u)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::F64(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Seq(items)
    }
}
