//! Operators over the numeric tower.
//!
//! Binary arithmetic lifts both operands to a shared [`Rank`] before
//! computing. Fixed-width results that overflow are recomputed as `BigInt`;
//! they never wrap. Comparison follows the same lifting rule and refuses to
//! order values of unrelated kinds.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};
use std::cmp::Ordering;
use za_lexer::TokenKind;
use za_types::{Rank, Value};

use crate::error::{EvalError, EvalResult};

/// Longest sequence a `..` range may build.
pub const MAX_RANGE_LEN: u64 = 1 << 24;

/// Largest left shift accepted.
const MAX_SHIFT: u64 = 1 << 16;

/// Largest integer exponent `**` accepts once a result outgrows 64 bits.
pub const MAX_POW_EXPONENT: u32 = 1 << 16;

/// Binary operators that produce a new value from two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn from_token(kind: TokenKind) -> Option<Self> {
        Some(match kind {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Rem,
            TokenKind::Power => BinOp::Pow,
            TokenKind::Amp => BinOp::BitAnd,
            TokenKind::Pipe => BinOp::BitOr,
            TokenKind::Caret => BinOp::BitXor,
            TokenKind::Shl => BinOp::Shl,
            TokenKind::Shr => BinOp::Shr,
            _ => return None,
        })
    }

    /// Operator applied by a compound assignment token (`+=` → `Add`).
    pub fn from_compound(kind: TokenKind) -> Option<Self> {
        Some(match kind {
            TokenKind::PlusAssign => BinOp::Add,
            TokenKind::MinusAssign => BinOp::Sub,
            TokenKind::StarAssign => BinOp::Mul,
            TokenKind::SlashAssign => BinOp::Div,
            TokenKind::PercentAssign => BinOp::Rem,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Pow => "**",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        }
    }

    fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr
        )
    }
}

fn mismatch(op: BinOp, l: &Value, r: &Value) -> EvalError {
    EvalError::type_mismatch(format!(
        "cannot apply '{}' to {} and {}",
        op.symbol(),
        l.kind_name(),
        r.kind_name()
    ))
}

// ═══════════════════════════════════════════════════════════════════════════
// Promotion
// ═══════════════════════════════════════════════════════════════════════════

/// Rank two numeric operands meet at. `Bool` is lifted to at least `Int`, and
/// a float meeting a `BigInt` widens to `BigFloat`.
pub fn common_rank(l: Rank, r: Rank) -> Rank {
    let hi = l.max(r).max(Rank::Int);
    if hi == Rank::BigInt && (l.is_float() || r.is_float()) {
        Rank::BigFloat
    } else {
        hi
    }
}

/// Both operands at their common rank. When a value has no representation at
/// that rank (a negative `Int` as `Uint`), the pair widens to arbitrary
/// precision instead.
fn unify(l: &Value, r: &Value) -> Option<(Value, Value)> {
    let rank = common_rank(l.rank()?, r.rank()?);
    let fallbacks: &[Rank] = if rank.is_float() {
        &[Rank::BigFloat]
    } else {
        &[Rank::BigInt, Rank::BigFloat]
    };
    std::iter::once(rank)
        .chain(fallbacks.iter().copied())
        .find_map(|target| Some((l.promote(target)?, r.promote(target)?)))
}

// ═══════════════════════════════════════════════════════════════════════════
// Arithmetic
// ═══════════════════════════════════════════════════════════════════════════

/// Apply a binary operator.
///
/// `+` concatenates when either side is a string, appends sequences and
/// merges maps (right side wins on key clashes).
pub fn binary(op: BinOp, l: &Value, r: &Value) -> EvalResult<Value> {
    if op == BinOp::Add {
        match (l, r) {
            (Value::Str(_), _) | (_, Value::Str(_)) => {
                return Ok(Value::Str(format!("{l}{r}")));
            }
            (Value::Seq(a), Value::Seq(b)) => {
                return Ok(Value::Seq(a.iter().chain(b).cloned().collect()));
            }
            (Value::Map(a), Value::Map(b)) => {
                let mut merged = a.clone();
                merged.extend(b.iter().map(|(k, v)| (k.clone(), v.clone())));
                return Ok(Value::Map(merged));
            }
            _ => {}
        }
    }
    let (a, b) = unify(l, r).ok_or_else(|| mismatch(op, l, r))?;
    if op.is_bitwise() {
        return bitwise(op, a, b).ok_or_else(|| mismatch(op, l, r))?;
    }
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => int_op(op, x, y),
        (Value::Uint(x), Value::Uint(y)) => uint_op(op, x, y),
        (Value::F32(x), Value::F32(y)) => {
            float_op(op, f64::from(x), f64::from(y)).map(|v| Value::F32(v as f32))
        }
        (Value::F64(x), Value::F64(y)) => float_op(op, x, y).map(Value::F64),
        (Value::BigInt(x), Value::BigInt(y)) => big_op(op, x, y),
        (Value::BigFloat(x), Value::BigFloat(y)) => bigf_op(op, x, y),
        _ => Err(mismatch(op, l, r)),
    }
}

fn int_op(op: BinOp, x: i64, y: i64) -> EvalResult<Value> {
    let checked = match op {
        BinOp::Add => x.checked_add(y),
        BinOp::Sub => x.checked_sub(y),
        BinOp::Mul => x.checked_mul(y),
        BinOp::Div | BinOp::Rem if y == 0 => return Err(EvalError::DivisionByZero),
        BinOp::Div => x.checked_div(y),
        BinOp::Rem => x.checked_rem(y),
        BinOp::Pow if y < 0 => return Ok(Value::F64((x as f64).powf(y as f64))),
        BinOp::Pow => u32::try_from(y).ok().and_then(|e| x.checked_pow(e)),
        _ => None,
    };
    match checked {
        Some(v) => Ok(Value::Int(v)),
        None => big_op(op, BigInt::from(x), BigInt::from(y)),
    }
}

fn uint_op(op: BinOp, x: u64, y: u64) -> EvalResult<Value> {
    let checked = match op {
        BinOp::Add => x.checked_add(y),
        BinOp::Sub => x.checked_sub(y),
        BinOp::Mul => x.checked_mul(y),
        BinOp::Div | BinOp::Rem if y == 0 => return Err(EvalError::DivisionByZero),
        BinOp::Div => Some(x / y),
        BinOp::Rem => Some(x % y),
        BinOp::Pow => u32::try_from(y).ok().and_then(|e| x.checked_pow(e)),
        _ => None,
    };
    match checked {
        Some(v) => Ok(Value::Uint(v)),
        None => big_op(op, BigInt::from(x), BigInt::from(y)),
    }
}

fn float_op(op: BinOp, x: f64, y: f64) -> EvalResult<f64> {
    match op {
        BinOp::Add => Ok(x + y),
        BinOp::Sub => Ok(x - y),
        BinOp::Mul => Ok(x * y),
        BinOp::Div | BinOp::Rem if y == 0.0 => Err(EvalError::DivisionByZero),
        BinOp::Div => Ok(x / y),
        BinOp::Rem => Ok(x % y),
        BinOp::Pow => Ok(x.powf(y)),
        _ => Err(EvalError::type_mismatch(format!(
            "'{}' needs integer operands",
            op.symbol()
        ))),
    }
}

fn big_op(op: BinOp, x: BigInt, y: BigInt) -> EvalResult<Value> {
    Ok(Value::BigInt(match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div | BinOp::Rem if y.is_zero() => return Err(EvalError::DivisionByZero),
        BinOp::Div => x / y,
        BinOp::Rem => x % y,
        BinOp::Pow if y.is_negative() => {
            let (Some(b), Some(e)) = (x.to_f64(), y.to_f64()) else {
                return Err(EvalError::type_mismatch("exponent out of range"));
            };
            return Ok(Value::F64(b.powf(e)));
        }
        BinOp::Pow => {
            let e = y
                .to_u32()
                .filter(|&e| e <= MAX_POW_EXPONENT)
                .ok_or_else(|| {
                    EvalError::type_mismatch(format!(
                        "exponent {y} is above the limit of {MAX_POW_EXPONENT}"
                    ))
                })?;
            x.pow(e)
        }
        _ => {
            return Err(EvalError::type_mismatch(format!(
                "'{}' is not an arithmetic operator",
                op.symbol()
            )))
        }
    }))
}

fn bigf_op(op: BinOp, x: BigDecimal, y: BigDecimal) -> EvalResult<Value> {
    Ok(Value::BigFloat(match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div | BinOp::Rem if y.is_zero() => return Err(EvalError::DivisionByZero),
        BinOp::Div => x / y,
        BinOp::Rem => x % y,
        BinOp::Pow => return bigf_pow(x, y),
        _ => {
            return Err(EvalError::type_mismatch(format!(
                "'{}' needs integer operands",
                op.symbol()
            )))
        }
    }))
}

fn bigf_pow(x: BigDecimal, y: BigDecimal) -> EvalResult<Value> {
    let integral = y.with_scale(0) == y;
    match y.to_i64() {
        Some(e) if integral && e.unsigned_abs() <= 4096 => {
            let mut result = BigDecimal::from(1);
            let mut base = x;
            let mut n = e.unsigned_abs();
            while n > 0 {
                if n & 1 == 1 {
                    result = result * &base;
                }
                base = &base * &base;
                n >>= 1;
            }
            if e < 0 {
                if result.is_zero() {
                    return Err(EvalError::DivisionByZero);
                }
                result = BigDecimal::from(1) / result;
            }
            Ok(Value::BigFloat(result))
        }
        _ => {
            let (Some(b), Some(e)) = (x.to_f64(), y.to_f64()) else {
                return Err(EvalError::type_mismatch("exponent out of range"));
            };
            BigDecimal::from_f64(b.powf(e))
                .map(Value::BigFloat)
                .ok_or_else(|| EvalError::type_mismatch("power result is not finite"))
        }
    }
}

/// Bitwise operators and shifts; `None` when an operand is a float.
fn bitwise(op: BinOp, a: Value, b: Value) -> Option<EvalResult<Value>> {
    let shift = |y: &Value| -> EvalResult<u64> {
        match y.to_bigint().and_then(|n| n.to_u64()) {
            Some(n) if n <= MAX_SHIFT => Ok(n),
            _ => Err(EvalError::type_mismatch(format!("invalid shift count {y}"))),
        }
    };
    Some(match (a, b) {
        (Value::Int(x), Value::Int(y)) => match op {
            BinOp::BitAnd => Ok(Value::Int(x & y)),
            BinOp::BitOr => Ok(Value::Int(x | y)),
            BinOp::BitXor => Ok(Value::Int(x ^ y)),
            BinOp::Shl => shift(&Value::Int(y))
                .map(|n| Value::normalize_bigint(BigInt::from(x) << n)),
            _ => shift(&Value::Int(y)).map(|n| Value::Int(x >> n.min(63))),
        },
        (Value::Uint(x), Value::Uint(y)) => match op {
            BinOp::BitAnd => Ok(Value::Uint(x & y)),
            BinOp::BitOr => Ok(Value::Uint(x | y)),
            BinOp::BitXor => Ok(Value::Uint(x ^ y)),
            BinOp::Shl => shift(&Value::Uint(y)).map(|n| {
                let wide = BigInt::from(x) << n;
                wide.to_u64().map_or(Value::BigInt(wide), Value::Uint)
            }),
            _ => shift(&Value::Uint(y))
                .map(|n| Value::Uint(x.checked_shr(n as u32).unwrap_or(0))),
        },
        (Value::BigInt(x), Value::BigInt(y)) => match op {
            BinOp::BitAnd => Ok(Value::BigInt(x & y)),
            BinOp::BitOr => Ok(Value::BigInt(x | y)),
            BinOp::BitXor => Ok(Value::BigInt(x ^ y)),
            BinOp::Shl => shift(&Value::BigInt(y)).map(|n| Value::BigInt(x << n)),
            _ => shift(&Value::BigInt(y)).map(|n| Value::BigInt(x >> n)),
        },
        _ => return None,
    })
}

/// Unary minus.
pub fn negate(v: &Value) -> EvalResult<Value> {
    Ok(match v {
        Value::Int(i) => i
            .checked_neg()
            .map_or_else(|| Value::BigInt(-BigInt::from(*i)), Value::Int),
        Value::Uint(u) => Value::normalize_bigint(-BigInt::from(*u)),
        Value::F32(f) => Value::F32(-f),
        Value::F64(f) => Value::F64(-f),
        Value::BigInt(b) => Value::BigInt(-b.clone()),
        Value::BigFloat(d) => Value::BigFloat(-d.clone()),
        other => {
            return Err(EvalError::type_mismatch(format!(
                "cannot negate {}",
                other.kind_name()
            )))
        }
    })
}

/// A value used as a condition. Only booleans qualify.
pub fn truthy(v: &Value) -> EvalResult<bool> {
    v.as_bool().ok_or_else(|| {
        EvalError::type_mismatch(format!("condition must be bool, got {}", v.kind_name()))
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Comparison
// ═══════════════════════════════════════════════════════════════════════════

/// Order two values. Strings order lexically; numbers after promotion.
pub fn compare(l: &Value, r: &Value) -> EvalResult<Ordering> {
    let refuse = || {
        EvalError::type_mismatch(format!(
            "cannot compare {} with {}",
            l.kind_name(),
            r.kind_name()
        ))
    };
    if let (Value::Str(a), Value::Str(b)) = (l, r) {
        return Ok(a.cmp(b));
    }
    let (a, b) = unify(l, r).ok_or_else(refuse)?;
    let ord = match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Uint(x), Value::Uint(y)) => Some(x.cmp(y)),
        (Value::F32(x), Value::F32(y)) => x.partial_cmp(y),
        (Value::F64(x), Value::F64(y)) => x.partial_cmp(y),
        (Value::BigInt(x), Value::BigInt(y)) => Some(x.cmp(y)),
        (Value::BigFloat(x), Value::BigFloat(y)) => Some(x.cmp(y)),
        _ => None,
    };
    ord.ok_or_else(refuse)
}

/// `==` semantics. `nil` equals only `nil`; other unrelated kinds are refused.
pub fn equals(l: &Value, r: &Value) -> EvalResult<bool> {
    Ok(match (l, r) {
        (Value::Nil, Value::Nil) => true,
        (Value::Nil, _) | (_, Value::Nil) => false,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Seq(a), Value::Seq(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| loosely_equal(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(k, v)| b.get(k).is_some_and(|w| loosely_equal(v, w)))
        }
        _ if l.is_numeric() && r.is_numeric() => compare(l, r)? == Ordering::Equal,
        _ => {
            return Err(EvalError::type_mismatch(format!(
                "cannot compare {} with {}",
                l.kind_name(),
                r.kind_name()
            )))
        }
    })
}

/// Equality that treats unrelated kinds as unequal instead of failing.
pub fn loosely_equal(l: &Value, r: &Value) -> bool {
    equals(l, r).unwrap_or(false)
}

/// `item in container`.
pub fn contains(container: &Value, item: &Value) -> EvalResult<bool> {
    match container {
        Value::Seq(items) => Ok(items.iter().any(|v| loosely_equal(v, item))),
        Value::Map(map) => Ok(map.contains_key(&key_string(item))),
        Value::Str(s) => Ok(s.contains(&item.to_string())),
        other => Err(EvalError::type_mismatch(format!(
            "cannot search in {}",
            other.kind_name()
        ))),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Aggregates
// ═══════════════════════════════════════════════════════════════════════════

/// Map key for a value: strings as-is, everything else by display form.
pub fn key_string(v: &Value) -> String {
    match v {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Integral position for indexing; floats are refused.
pub fn to_index(v: &Value) -> EvalResult<i64> {
    match v.rank() {
        Some(r) if !r.is_float() => v
            .as_i64()
            .ok_or_else(|| EvalError::IndexOutOfRange(v.to_string())),
        _ => Err(EvalError::type_mismatch(format!(
            "index must be an integer, got {}",
            v.kind_name()
        ))),
    }
}

fn position(i: i64, len: usize) -> EvalResult<usize> {
    usize::try_from(i)
        .ok()
        .filter(|&p| p < len)
        .ok_or_else(|| EvalError::IndexOutOfRange(format!("index {i} of length {len}")))
}

/// `container[key]`. A missing map key reads as `nil`.
pub fn index(container: &Value, key: &Value) -> EvalResult<Value> {
    match container {
        Value::Seq(items) => Ok(items[position(to_index(key)?, items.len())?].clone()),
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let p = position(to_index(key)?, chars.len())?;
            Ok(Value::Str(chars[p].to_string()))
        }
        Value::Map(map) => Ok(map.get(&key_string(key)).cloned().unwrap_or(Value::Nil)),
        other => Err(EvalError::type_mismatch(format!(
            "cannot index {}",
            other.kind_name()
        ))),
    }
}

/// `container[from:to]` over sequences and strings; bounds default to the ends.
pub fn slice(container: &Value, from: Option<i64>, to: Option<i64>) -> EvalResult<Value> {
    let bounds = |len: usize| -> EvalResult<(usize, usize)> {
        let lo = from.unwrap_or(0);
        let hi = to.unwrap_or(len as i64);
        if lo < 0 || hi < lo || hi > len as i64 {
            return Err(EvalError::IndexOutOfRange(format!(
                "slice [{lo}:{hi}] of length {len}"
            )));
        }
        Ok((lo as usize, hi as usize))
    };
    match container {
        Value::Seq(items) => {
            let (lo, hi) = bounds(items.len())?;
            Ok(Value::Seq(items[lo..hi].to_vec()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (lo, hi) = bounds(chars.len())?;
            Ok(Value::Str(chars[lo..hi].iter().collect()))
        }
        other => Err(EvalError::type_mismatch(format!(
            "cannot slice {}",
            other.kind_name()
        ))),
    }
}

/// `a .. b`: inclusive integer sequence, counting down when `a > b`.
pub fn range(from: &Value, to: &Value) -> EvalResult<Value> {
    let (lo, hi) = (to_index(from)?, to_index(to)?);
    if lo.abs_diff(hi) >= MAX_RANGE_LEN {
        return Err(EvalError::IndexOutOfRange(format!(
            "range {lo}..{hi} is too long"
        )));
    }
    let items = if lo <= hi {
        (lo..=hi).map(Value::Int).collect()
    } else {
        (hi..=lo).rev().map(Value::Int).collect()
    };
    Ok(Value::Seq(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn add(l: Value, r: Value) -> Value {
        binary(BinOp::Add, &l, &r).unwrap()
    }

    #[test]
    fn test_common_rank() {
        assert_eq!(common_rank(Rank::Bool, Rank::Bool), Rank::Int);
        assert_eq!(common_rank(Rank::Int, Rank::F32), Rank::F32);
        assert_eq!(common_rank(Rank::F64, Rank::BigInt), Rank::BigFloat);
        assert_eq!(common_rank(Rank::Uint, Rank::BigInt), Rank::BigInt);
    }

    #[test]
    fn test_overflow_promotes_to_bigint() {
        let v = add(Value::Int(i64::MAX), Value::Int(1));
        assert_eq!(v, Value::BigInt(BigInt::from(i64::MAX) + 1));
        let v = binary(BinOp::Mul, &Value::Uint(u64::MAX), &Value::Uint(2)).unwrap();
        assert_eq!(v.kind_name(), "bigi");
    }

    #[test]
    fn test_uint_meets_negative_int() {
        assert_eq!(add(Value::Uint(5), Value::Int(-7)), Value::BigInt(BigInt::from(-2)));
        assert_eq!(
            binary(BinOp::Sub, &Value::Uint(1), &Value::Uint(2)).unwrap(),
            Value::BigInt(BigInt::from(-1))
        );
    }

    #[test]
    fn test_mixed_float_and_int() {
        assert_eq!(add(Value::Int(1), Value::F64(0.5)), Value::F64(1.5));
        assert_eq!(add(Value::F32(1.5), Value::Int(1)), Value::F32(2.5));
        let v = add(Value::BigInt(BigInt::from(1)), Value::F64(0.5));
        assert_eq!(v, Value::BigFloat(BigDecimal::from_str("1.5").unwrap()));
    }

    #[test]
    fn test_integer_division_truncates() {
        assert_eq!(binary(BinOp::Div, &Value::Int(7), &Value::Int(2)).unwrap(), Value::Int(3));
        assert_eq!(binary(BinOp::Div, &Value::Int(-7), &Value::Int(2)).unwrap(), Value::Int(-3));
        assert_eq!(binary(BinOp::Rem, &Value::Int(7), &Value::Int(3)).unwrap(), Value::Int(1));
    }

    #[test]
    fn test_division_by_zero_for_every_tag() {
        let zeros = [
            Value::Int(0),
            Value::Uint(0),
            Value::F32(0.0),
            Value::F64(0.0),
            Value::BigInt(BigInt::from(0)),
            Value::BigFloat(BigDecimal::from(0)),
        ];
        for z in &zeros {
            let err = binary(BinOp::Div, &z.clone(), z).unwrap_err();
            assert!(matches!(err, EvalError::DivisionByZero), "{z:?}");
        }
    }

    #[test]
    fn test_power() {
        assert_eq!(binary(BinOp::Pow, &Value::Int(2), &Value::Int(10)).unwrap(), Value::Int(1024));
        assert_eq!(
            binary(BinOp::Pow, &Value::Int(2), &Value::Int(64)).unwrap(),
            Value::BigInt(BigInt::from(1u128 << 64))
        );
        assert_eq!(binary(BinOp::Pow, &Value::Int(2), &Value::Int(-1)).unwrap(), Value::F64(0.5));
    }

    #[test]
    fn test_power_exponent_is_capped() {
        let limit = i64::from(MAX_POW_EXPONENT);
        assert!(matches!(
            binary(BinOp::Pow, &Value::Int(3), &Value::Int(limit)).unwrap(),
            Value::BigInt(_)
        ));
        let err = binary(BinOp::Pow, &Value::Int(3), &Value::Int(20_000_000)).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch(_)), "{err}");
        assert!(binary(BinOp::Pow, &Value::Uint(2), &Value::Uint(4_000_000_000)).is_err());
        assert_eq!(
            binary(BinOp::Pow, &Value::Int(1), &Value::Int(20_000_000)).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(add(Value::from("n="), Value::Int(4)), Value::from("n=4"));
        assert_eq!(add(Value::Int(4), Value::from("!")), Value::from("4!"));
    }

    #[test]
    fn test_sequence_and_map_addition() {
        assert_eq!(
            add(Value::Seq(vec![Value::Int(1)]), Value::Seq(vec![Value::Int(2)])),
            Value::Seq(vec![Value::Int(1), Value::Int(2)])
        );
        let mut a = za_types::ValueMap::new();
        a.insert("x".into(), Value::Int(1));
        let mut b = za_types::ValueMap::new();
        b.insert("x".into(), Value::Int(2));
        b.insert("y".into(), Value::Int(3));
        let Value::Map(m) = add(Value::Map(a), Value::Map(b)) else {
            panic!("expected map");
        };
        assert_eq!(m.get("x"), Some(&Value::Int(2)));
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(binary(BinOp::BitAnd, &Value::Int(6), &Value::Int(3)).unwrap(), Value::Int(2));
        assert_eq!(binary(BinOp::Shl, &Value::Int(1), &Value::Int(4)).unwrap(), Value::Int(16));
        assert_eq!(
            binary(BinOp::Shl, &Value::Int(1), &Value::Int(70)).unwrap(),
            Value::BigInt(BigInt::from(1) << 70u32)
        );
        assert!(binary(BinOp::BitOr, &Value::F64(1.0), &Value::Int(1)).is_err());
    }

    #[test]
    fn test_negate_min_int() {
        assert_eq!(
            negate(&Value::Int(i64::MIN)).unwrap(),
            Value::BigInt(-BigInt::from(i64::MIN))
        );
        assert!(negate(&Value::from("x")).is_err());
    }

    #[test]
    fn test_compare_mixed_numbers() {
        assert_eq!(compare(&Value::Int(2), &Value::F64(2.5)).unwrap(), Ordering::Less);
        assert_eq!(
            compare(&Value::Uint(u64::MAX), &Value::Int(-1)).unwrap(),
            Ordering::Greater
        );
        assert_eq!(compare(&Value::from("a"), &Value::from("b")).unwrap(), Ordering::Less);
    }

    #[test]
    fn test_string_number_comparison_is_refused() {
        let err = compare(&Value::from("1"), &Value::Int(1)).unwrap_err();
        assert!(matches!(err, EvalError::TypeMismatch(_)));
        assert!(equals(&Value::from("1"), &Value::Int(1)).is_err());
    }

    #[test]
    fn test_nil_equality() {
        assert!(equals(&Value::Nil, &Value::Nil).unwrap());
        assert!(!equals(&Value::Nil, &Value::Int(0)).unwrap());
        assert!(equals(&Value::Int(3), &Value::F64(3.0)).unwrap());
    }

    #[test]
    fn test_index_and_slice() {
        let s = Value::Seq(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
        assert_eq!(index(&s, &Value::Int(1)).unwrap(), Value::Int(20));
        assert!(matches!(
            index(&s, &Value::Int(3)),
            Err(EvalError::IndexOutOfRange(_))
        ));
        assert_eq!(
            slice(&s, Some(1), None).unwrap(),
            Value::Seq(vec![Value::Int(20), Value::Int(30)])
        );
        assert_eq!(index(&Value::from("héllo"), &Value::Int(1)).unwrap(), Value::from("é"));
        assert_eq!(slice(&Value::from("hello"), None, Some(2)).unwrap(), Value::from("he"));
    }

    #[test]
    fn test_range_is_inclusive() {
        assert_eq!(
            range(&Value::Int(1), &Value::Int(3)).unwrap(),
            Value::Seq(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        assert_eq!(
            range(&Value::Int(2), &Value::Int(0)).unwrap(),
            Value::Seq(vec![Value::Int(2), Value::Int(1), Value::Int(0)])
        );
    }

    #[test]
    fn test_membership() {
        let s = Value::Seq(vec![Value::Int(1), Value::from("a")]);
        assert!(contains(&s, &Value::from("a")).unwrap());
        assert!(!contains(&s, &Value::Int(2)).unwrap());
        assert!(contains(&Value::from("haystack"), &Value::from("st")).unwrap());
    }
}
