//! Builtin functions: conversions, introspection, arithmetic helpers and the
//! host bridges (`input`, `system`, `eval`).
//!
//! User-defined functions shadow builtins of the same name; the engine only
//! falls back here when no function space matches.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Signed;
use std::str::FromStr;
use za_parser::SpaceId;
use za_types::{Rank, Value};

use crate::error::{EvalError, EvalResult};
use crate::host::Hosts;
use crate::ops::{self, BinOp};

/// Names answered by [`call`].
pub const BUILTINS: &[&str] = &[
    "abs", "bigf", "bigi", "bool", "eval", "float", "input", "int", "keys", "kind", "len", "sqr",
    "sqrt", "string", "system", "uint",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Call builtin `name`, or return `None` when no builtin has that name.
pub fn call(
    name: &str,
    args: Vec<Value>,
    hosts: &mut Hosts,
    scope: SpaceId,
) -> Option<EvalResult<Value>> {
    if !is_builtin(name) {
        return None;
    }
    Some(dispatch(name, args, hosts, scope))
}

fn dispatch(name: &str, args: Vec<Value>, hosts: &mut Hosts, scope: SpaceId) -> EvalResult<Value> {
    let arg = single(name, args)?;
    match name {
        "len" => len(&arg),
        "kind" => Ok(Value::from(arg.kind_name())),
        "keys" => keys(&arg),
        "int" => to_int(&arg),
        "uint" => to_uint(&arg),
        "float" => to_float(&arg),
        "bigi" => to_bigi(&arg),
        "bigf" => to_bigf(&arg),
        "bool" => to_bool(&arg),
        "string" => Ok(Value::Str(arg.to_string())),
        "sqr" => ops::binary(BinOp::Mul, &arg, &arg),
        "sqrt" => sqrt(&arg),
        "abs" => abs(&arg),
        "input" => input(&arg, hosts),
        "system" => system(&arg, hosts),
        "eval" => {
            let source = text_arg(name, &arg)?;
            hosts
                .subexpr
                .evaluate(source, scope)
                .map_err(EvalError::Host)
        }
        _ => Err(EvalError::UndefinedFunction(name.to_string())),
    }
}

/// Every builtin takes exactly one argument.
fn single(name: &str, args: Vec<Value>) -> EvalResult<Value> {
    let got = args.len();
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(v), None) => Ok(v),
        _ => Err(EvalError::ArityMismatch {
            name: name.to_string(),
            expected: 1,
            got,
        }),
    }
}

fn text_arg<'v>(name: &str, v: &'v Value) -> EvalResult<&'v str> {
    v.as_str().ok_or_else(|| {
        EvalError::type_mismatch(format!("{name}() expects a string, got {}", v.kind_name()))
    })
}

fn not_convertible(v: &Value, to: &str) -> EvalError {
    EvalError::type_mismatch(format!("cannot convert {} '{v}' to {to}", v.kind_name()))
}

// ══════════════════════════════════════════════════════════════════════════
// Introspection
// ══════════════════════════════════════════════════════════════════════════

fn len(v: &Value) -> EvalResult<Value> {
    let n = match v {
        Value::Str(s) => s.chars().count(),
        Value::Seq(items) => items.len(),
        Value::Map(map) => map.len(),
        other => {
            return Err(EvalError::type_mismatch(format!(
                "len() of {}",
                other.kind_name()
            )))
        }
    };
    Ok(Value::Int(n as i64))
}

/// Map keys in insertion order, or the indices of a sequence.
fn keys(v: &Value) -> EvalResult<Value> {
    match v {
        Value::Map(map) => Ok(Value::Seq(map.keys().map(|k| Value::from(k.as_str())).collect())),
        Value::Seq(items) => Ok(Value::Seq((0..items.len() as i64).map(Value::Int).collect())),
        other => Err(EvalError::type_mismatch(format!(
            "keys() of {}",
            other.kind_name()
        ))),
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Conversions
// ══════════════════════════════════════════════════════════════════════════

fn to_int(v: &Value) -> EvalResult<Value> {
    match v {
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| not_convertible(v, "int")),
        _ => v.promote(Rank::Int).ok_or_else(|| not_convertible(v, "int")),
    }
}

fn to_uint(v: &Value) -> EvalResult<Value> {
    match v {
        Value::Str(s) => s
            .trim()
            .parse::<u64>()
            .map(Value::Uint)
            .map_err(|_| not_convertible(v, "uint")),
        Value::F32(_) | Value::F64(_) | Value::BigInt(_) | Value::BigFloat(_) => v
            .as_i64()
            .and_then(|i| u64::try_from(i).ok())
            .map(Value::Uint)
            .ok_or_else(|| not_convertible(v, "uint")),
        _ => v.promote(Rank::Uint).ok_or_else(|| not_convertible(v, "uint")),
    }
}

fn to_float(v: &Value) -> EvalResult<Value> {
    match v {
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::F64)
            .map_err(|_| not_convertible(v, "float")),
        _ => v.as_f64().map(Value::F64).ok_or_else(|| not_convertible(v, "float")),
    }
}

fn to_bigi(v: &Value) -> EvalResult<Value> {
    match v {
        Value::Str(s) => BigInt::from_str(s.trim())
            .map(Value::BigInt)
            .map_err(|_| not_convertible(v, "bigi")),
        _ => v
            .to_bigint()
            .map(Value::BigInt)
            .ok_or_else(|| not_convertible(v, "bigi")),
    }
}

fn to_bigf(v: &Value) -> EvalResult<Value> {
    match v {
        Value::Str(s) => BigDecimal::from_str(s.trim())
            .map(Value::BigFloat)
            .map_err(|_| not_convertible(v, "bigf")),
        _ => v
            .to_bigfloat()
            .map(Value::BigFloat)
            .ok_or_else(|| not_convertible(v, "bigf")),
    }
}

fn to_bool(v: &Value) -> EvalResult<Value> {
    match v {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(not_convertible(v, "bool")),
        },
        _ if v.is_numeric() => Ok(Value::Bool(v.as_f64().is_some_and(|f| f != 0.0))),
        _ => Err(not_convertible(v, "bool")),
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Arithmetic helpers
// ══════════════════════════════════════════════════════════════════════════

fn sqrt(v: &Value) -> EvalResult<Value> {
    let negative = || EvalError::type_mismatch(format!("sqrt() of negative value {v}"));
    match v {
        Value::BigInt(_) | Value::BigFloat(_) => {
            let d = v.to_bigfloat().ok_or_else(|| not_convertible(v, "bigf"))?;
            d.sqrt().map(Value::BigFloat).ok_or_else(negative)
        }
        _ if v.is_numeric() => {
            let f = v.as_f64().ok_or_else(|| not_convertible(v, "float"))?;
            if f < 0.0 {
                return Err(negative());
            }
            Ok(Value::F64(f.sqrt()))
        }
        other => Err(EvalError::type_mismatch(format!(
            "sqrt() of {}",
            other.kind_name()
        ))),
    }
}

fn abs(v: &Value) -> EvalResult<Value> {
    Ok(match v {
        Value::Int(i) => match i.checked_abs() {
            Some(a) => Value::Int(a),
            None => Value::BigInt(BigInt::from(*i).abs()),
        },
        Value::Uint(u) => Value::Uint(*u),
        Value::F32(f) => Value::F32(f.abs()),
        Value::F64(f) => Value::F64(f.abs()),
        Value::BigInt(b) => Value::BigInt(b.abs()),
        Value::BigFloat(d) => Value::BigFloat(d.abs()),
        other => {
            return Err(EvalError::type_mismatch(format!(
                "abs() of {}",
                other.kind_name()
            )))
        }
    })
}

// ══════════════════════════════════════════════════════════════════════════
// Host bridges
// ══════════════════════════════════════════════════════════════════════════

/// Run a shell command and return its stdout without the trailing newline.
/// `input(prompt)`: one console line, or `nil` at end of input.
fn input(v: &Value, hosts: &mut Hosts) -> EvalResult<Value> {
    let prompt = text_arg("input", v)?;
    let read = hosts.console.read_line(prompt).map_err(EvalError::Host)?;
    if read.interrupted {
        return Err(EvalError::Host("input interrupted".into()));
    }
    if read.eof {
        return Ok(Value::Nil);
    }
    Ok(Value::Str(read.line))
}

fn system(v: &Value, hosts: &mut Hosts) -> EvalResult<Value> {
    let command = text_arg("system", v)?;
    let out = hosts.coprocess.run(command).map_err(EvalError::Host)?;
    let text = out.stdout.strip_suffix('\n').unwrap_or(&out.stdout);
    Ok(Value::from(text))
}
