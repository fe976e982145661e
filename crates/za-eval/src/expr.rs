//! Precedence-climbing expression evaluator.
//!
//! Parsing and evaluation are interleaved: each operator is applied as soon as
//! its right operand has been read. The side of a short-circuit operator or
//! ternary that is not taken is still parsed, in skip mode, so the cursor
//! lands in the right place without reading variables or calling functions.

use za_lexer::{Lexer, Token, TokenKind};
use za_types::{SourceFile, Value, ValueMap};

use crate::error::{EvalError, EvalResult};
use crate::ops::{self, BinOp};

/// How reads of unbound names behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarMode {
    /// Unbound names are an error.
    #[default]
    Strict,
    /// Unbound names read as `nil`.
    Soft,
}

/// What the evaluator needs from the running program.
pub trait Env {
    fn lookup(&self, name: &str) -> Option<Value>;

    /// `name[key]` or `name.key`, read where the variable lives. `None` when
    /// `name` is unbound.
    fn lookup_element(&self, name: &str, key: &Value) -> Option<EvalResult<Value>> {
        self.lookup(name).map(|container| ops::index(&container, key))
    }

    fn assign(&mut self, name: &str, value: Value) -> EvalResult<()>;
    fn call_function(&mut self, name: &str, args: Vec<Value>) -> EvalResult<Value>;
}

/// Binding strength of `kind` in infix position; `0` ends an expression.
pub fn infix_precedence(kind: TokenKind) -> u8 {
    use TokenKind::*;
    match kind {
        Assign => 5,
        Or | PipePipe | And | AmpAmp => 15,
        Pipe => 19,
        Amp | Caret => 20,
        Shl | Shr => 21,
        Question => 23,
        EqEq | BangEq | Less | Greater | LessEq | GreaterEq | Is => 25,
        In => 26,
        DotDot => 29,
        Plus | Minus => 31,
        Star | Slash | Percent => 35,
        Power => 37,
        PlusPlus | MinusMinus | LBracket => 45,
        Dot => 61,
        LParen => 100,
        _ => 0,
    }
}

const PREFIX_NOT: u8 = 24;
const PREFIX_MINUS: u8 = 40;

/// Evaluate a whole token span.
pub fn evaluate<E: Env + ?Sized>(
    env: &mut E,
    tokens: &[Token],
    mode: VarMode,
) -> EvalResult<Value> {
    let (value, next) = crush(env, tokens, 0, mode)?;
    match tokens.get(next) {
        Some(extra) => Err(EvalError::Syntax(format!("unexpected '{}'", extra.text))),
        None => Ok(value),
    }
}

/// Evaluate the expression starting at `start` and stop at the first token
/// that cannot continue it (`,`, a closing bracket, `:`, a keyword such as
/// `to`, or the end). Returns the value and the index of that token.
pub fn crush<E: Env + ?Sized>(
    env: &mut E,
    tokens: &[Token],
    start: usize,
    mode: VarMode,
) -> EvalResult<(Value, usize)> {
    let mut ev = Evaluator {
        tokens,
        pos: start,
        env,
        mode,
    };
    let value = ev.expr(0, true)?;
    Ok((value, ev.pos))
}

/// Evaluate a comma-separated list spanning all of `tokens`.
pub fn evaluate_list<E: Env + ?Sized>(
    env: &mut E,
    tokens: &[Token],
    mode: VarMode,
) -> EvalResult<Vec<Value>> {
    let mut values = Vec::new();
    let mut pos = 0;
    while pos < tokens.len() {
        let (value, next) = crush(env, tokens, pos, mode)?;
        values.push(value);
        match tokens.get(next) {
            None => break,
            Some(t) if t.kind == TokenKind::Comma => pos = next + 1,
            Some(t) => return Err(EvalError::Syntax(format!("unexpected '{}'", t.text))),
        }
    }
    Ok(values)
}

/// Lex `source` and evaluate it as one expression.
pub fn evaluate_str<E: Env + ?Sized>(
    env: &mut E,
    source: &str,
    mode: VarMode,
) -> EvalResult<Value> {
    let sf = SourceFile::new("expression", source);
    let lexed = Lexer::new(&sf).lex();
    if let Some(first) = lexed.errors.first() {
        return Err(EvalError::Syntax(first.message.clone()));
    }
    let tokens: Vec<Token> = lexed
        .tokens
        .into_iter()
        .filter(|t| !matches!(t.kind, TokenKind::Eol | TokenKind::Eof))
        .collect();
    evaluate(env, &tokens, mode)
}

struct Evaluator<'t, 'e, E: Env + ?Sized> {
    tokens: &'t [Token],
    pos: usize,
    env: &'e mut E,
    mode: VarMode,
}

impl<'t, E: Env + ?Sized> Evaluator<'t, '_, E> {
    fn peek_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).map(|t| t.kind)
    }

    fn next(&mut self) -> EvalResult<&'t Token> {
        let tokens = self.tokens;
        let tok = tokens
            .get(self.pos)
            .ok_or_else(|| EvalError::Syntax("unexpected end of expression".into()))?;
        self.pos += 1;
        Ok(tok)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> EvalResult<()> {
        if self.eat(kind) {
            return Ok(());
        }
        let found = self
            .tokens
            .get(self.pos)
            .map_or_else(|| "end of expression".to_string(), |t| format!("'{}'", t.text));
        Err(EvalError::Syntax(format!("expected '{kind}', found {found}")))
    }

    // ── Operators ─────────────────────────────────────────────────────────────

    fn expr(&mut self, min: u8, live: bool) -> EvalResult<Value> {
        let (mut left, mut lvalue) = self.prefix(live)?;
        let tokens = self.tokens;
        while let Some(tok) = tokens.get(self.pos) {
            let prec = infix_precedence(tok.kind);
            if prec <= min {
                break;
            }
            self.pos += 1;
            let name = lvalue.take();
            left = match tok.kind {
                TokenKind::Assign => {
                    return Err(EvalError::Syntax(
                        "assignment is not allowed inside an expression".into(),
                    ))
                }
                TokenKind::And | TokenKind::AmpAmp => {
                    let l = live && ops::truthy(&left)?;
                    let r = self.expr(prec, l)?;
                    match (live, l) {
                        (false, _) => Value::Nil,
                        (true, false) => Value::Bool(false),
                        (true, true) => Value::Bool(ops::truthy(&r)?),
                    }
                }
                TokenKind::Or | TokenKind::PipePipe => {
                    let l = live && ops::truthy(&left)?;
                    let r = self.expr(prec, live && !l)?;
                    match (live, l) {
                        (false, _) => Value::Nil,
                        (true, true) => Value::Bool(true),
                        (true, false) => Value::Bool(ops::truthy(&r)?),
                    }
                }
                TokenKind::Question => {
                    let cond = live && ops::truthy(&left)?;
                    let then = self.expr(0, live && cond)?;
                    self.expect(TokenKind::Colon)?;
                    let otherwise = self.expr(prec - 1, live && !cond)?;
                    if cond {
                        then
                    } else {
                        otherwise
                    }
                }
                TokenKind::Is => self.kind_test(&left, live)?,
                TokenKind::In => {
                    let r = self.expr(prec, live)?;
                    if live {
                        Value::Bool(ops::contains(&r, &left)?)
                    } else {
                        Value::Nil
                    }
                }
                TokenKind::DotDot => {
                    let r = self.expr(prec, live)?;
                    if live {
                        ops::range(&left, &r)?
                    } else {
                        Value::Nil
                    }
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let name = name.ok_or_else(|| {
                        EvalError::Syntax(format!("'{}' needs a variable", tok.text))
                    })?;
                    if live {
                        let op = if tok.kind == TokenKind::PlusPlus {
                            BinOp::Add
                        } else {
                            BinOp::Sub
                        };
                        let updated = ops::binary(op, &left, &Value::Int(1))?;
                        self.env.assign(&name, updated)?;
                    }
                    left
                }
                TokenKind::LBracket => self.subscript(&left, live)?,
                TokenKind::Dot => {
                    let field = self.next()?;
                    if field.kind != TokenKind::Identifier {
                        return Err(EvalError::Syntax(format!(
                            "expected field name after '.', found '{}'",
                            field.text
                        )));
                    }
                    let key = Value::Str(field.text.clone());
                    if live {
                        ops::index(&left, &key)?
                    } else {
                        Value::Nil
                    }
                }
                TokenKind::LParen => {
                    return Err(EvalError::Syntax(format!(
                        "{} is not callable",
                        left.kind_name()
                    )))
                }
                kind if is_comparison(kind) => {
                    let r = self.expr(prec, live)?;
                    if live {
                        Value::Bool(compare_with(kind, &left, &r)?)
                    } else {
                        Value::Nil
                    }
                }
                kind => {
                    let op = BinOp::from_token(kind).ok_or_else(|| {
                        EvalError::Syntax(format!("unexpected '{}'", tok.text))
                    })?;
                    // `**` groups to the right
                    let r = if op == BinOp::Pow {
                        self.expr(prec - 1, live)?
                    } else {
                        self.expr(prec, live)?
                    };
                    if live {
                        ops::binary(op, &left, &r)?
                    } else {
                        Value::Nil
                    }
                }
            };
        }
        Ok(left)
    }

    /// Operand plus, for a bare identifier, its name (the target of `++`/`--`).
    fn prefix(&mut self, live: bool) -> EvalResult<(Value, Option<String>)> {
        let tok = self.next()?;
        let value = match tok.kind {
            TokenKind::IntLit
            | TokenKind::FloatLit
            | TokenKind::BigIntLit
            | TokenKind::BigFloatLit
            | TokenKind::StringLit
            | TokenKind::True
            | TokenKind::False => tok.value.clone().unwrap_or(Value::Nil),
            TokenKind::Nil => Value::Nil,
            TokenKind::Identifier => {
                if self.eat(TokenKind::LParen) {
                    let args = self.list(TokenKind::RParen, live)?;
                    if live {
                        self.env.call_function(&tok.text, args)?
                    } else {
                        Value::Nil
                    }
                } else if let Some(value) = self.element_read(&tok.text, live)? {
                    value
                } else {
                    let value = if live { self.read(&tok.text)? } else { Value::Nil };
                    return Ok((value, Some(tok.text.clone())));
                }
            }
            TokenKind::KwMap if self.eat(TokenKind::LParen) => {
                self.map_literal(TokenKind::RParen, live)?
            }
            kind if kind.is_type_name() && self.eat(TokenKind::LParen) => {
                let args = self.list(TokenKind::RParen, live)?;
                if live {
                    self.env.call_function(&tok.text.to_lowercase(), args)?
                } else {
                    Value::Nil
                }
            }
            TokenKind::LParen => {
                let v = self.expr(0, live)?;
                self.expect(TokenKind::RParen)?;
                v
            }
            TokenKind::LBracket => Value::Seq(self.list(TokenKind::RBracket, live)?),
            TokenKind::LBrace => self.map_literal(TokenKind::RBrace, live)?,
            TokenKind::Minus => {
                let v = self.expr(PREFIX_MINUS, live)?;
                if live {
                    ops::negate(&v)?
                } else {
                    Value::Nil
                }
            }
            TokenKind::Plus => {
                let v = self.expr(PREFIX_MINUS, live)?;
                if live && !v.is_numeric() {
                    return Err(EvalError::type_mismatch(format!(
                        "unary '+' on {}",
                        v.kind_name()
                    )));
                }
                v
            }
            TokenKind::Not | TokenKind::Bang => {
                let v = self.expr(PREFIX_NOT, live)?;
                if live {
                    Value::Bool(!ops::truthy(&v)?)
                } else {
                    Value::Nil
                }
            }
            TokenKind::Error => {
                return Err(EvalError::Syntax(format!("bad token '{}'", tok.text)))
            }
            _ => return Err(EvalError::Syntax(format!("unexpected '{}'", tok.text))),
        };
        Ok((value, None))
    }

    fn read(&self, name: &str) -> EvalResult<Value> {
        match (self.env.lookup(name), self.mode) {
            (Some(v), _) => Ok(v),
            (None, VarMode::Soft) => Ok(Value::Nil),
            (None, VarMode::Strict) => Err(EvalError::UndefinedVariable(name.to_string())),
        }
    }

    /// `name[i]` or `name.field` directly after an identifier, read without
    /// copying the aggregate out. `None` when neither follows; slices take
    /// the general path.
    fn element_read(&mut self, name: &str, live: bool) -> EvalResult<Option<Value>> {
        let key = match self.peek_kind() {
            Some(TokenKind::LBracket) if self.plain_index_follows() => {
                self.pos += 1;
                let key = self.expr(0, live)?;
                self.expect(TokenKind::RBracket)?;
                key
            }
            Some(TokenKind::Dot) => match self.tokens.get(self.pos + 1) {
                Some(field) if field.kind == TokenKind::Identifier => {
                    self.pos += 2;
                    Value::Str(field.text.clone())
                }
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };
        if !live {
            return Ok(Some(Value::Nil));
        }
        match self.env.lookup_element(name, &key) {
            Some(result) => result.map(Some),
            None => {
                let container = self.read(name)?;
                ops::index(&container, &key).map(Some)
            }
        }
    }

    /// Whether the `[` at the cursor encloses an index rather than a slice.
    fn plain_index_follows(&self) -> bool {
        let mut depth = 0usize;
        for tok in &self.tokens[self.pos..] {
            match tok.kind {
                TokenKind::LBracket | TokenKind::LParen | TokenKind::LBrace => depth += 1,
                TokenKind::RBracket | TokenKind::RParen | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return true;
                    }
                }
                TokenKind::Colon | TokenKind::Question if depth == 1 => return false,
                _ => {}
            }
        }
        false
    }

    /// Comma-separated expressions up to and including `close`.
    fn list(&mut self, close: TokenKind, live: bool) -> EvalResult<Vec<Value>> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expr(0, live)?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(TokenKind::Comma)?;
        }
    }

    /// `key: value, ...` up to and including `close`. A bare identifier key is
    /// taken literally.
    fn map_literal(&mut self, close: TokenKind, live: bool) -> EvalResult<Value> {
        let mut map = ValueMap::new();
        if self.eat(close) {
            return Ok(Value::Map(map));
        }
        loop {
            let literal_key = match self.tokens.get(self.pos..self.pos + 2) {
                Some([k, c]) if k.kind == TokenKind::Identifier && c.kind == TokenKind::Colon => {
                    Some(k.text.clone())
                }
                _ => None,
            };
            let key = match literal_key {
                Some(k) => {
                    self.pos += 1;
                    k
                }
                None => ops::key_string(&self.expr(0, live)?),
            };
            self.expect(TokenKind::Colon)?;
            let value = self.expr(0, live)?;
            map.insert(key, value);
            if self.eat(close) {
                return Ok(Value::Map(map));
            }
            self.expect(TokenKind::Comma)?;
        }
    }

    /// After `[`: an index `[i]` or a slice `[a:b]`, `[:b]`, `[a:]`.
    fn subscript(&mut self, target: &Value, live: bool) -> EvalResult<Value> {
        let from = if self.peek_kind() == Some(TokenKind::Colon) {
            None
        } else {
            Some(self.expr(0, live)?)
        };
        if self.eat(TokenKind::Colon) {
            let to = if self.peek_kind() == Some(TokenKind::RBracket) {
                None
            } else {
                Some(self.expr(0, live)?)
            };
            self.expect(TokenKind::RBracket)?;
            if !live {
                return Ok(Value::Nil);
            }
            let from = from.as_ref().map(ops::to_index).transpose()?;
            let to = to.as_ref().map(ops::to_index).transpose()?;
            return ops::slice(target, from, to);
        }
        self.expect(TokenKind::RBracket)?;
        let key = from.ok_or_else(|| EvalError::Syntax("empty index".into()))?;
        if live {
            ops::index(target, &key)
        } else {
            Ok(Value::Nil)
        }
    }

    /// After `is`: a type keyword (`int`, `string`, `map`, `nil`, ...).
    fn kind_test(&mut self, value: &Value, live: bool) -> EvalResult<Value> {
        let tok = self.next()?;
        if !tok.kind.is_type_name() {
            return Err(EvalError::Syntax(format!(
                "expected a type name after 'is', found '{}'",
                tok.text
            )));
        }
        if !live {
            return Ok(Value::Nil);
        }
        Ok(Value::Bool(kind_matches(value, tok.kind)))
    }
}

fn is_comparison(kind: TokenKind) -> bool {
    use TokenKind::*;
    matches!(kind, EqEq | BangEq | Less | Greater | LessEq | GreaterEq)
}

fn compare_with(kind: TokenKind, l: &Value, r: &Value) -> EvalResult<bool> {
    use std::cmp::Ordering::*;
    Ok(match kind {
        TokenKind::EqEq => ops::equals(l, r)?,
        TokenKind::BangEq => !ops::equals(l, r)?,
        TokenKind::Less => ops::compare(l, r)? == Less,
        TokenKind::Greater => ops::compare(l, r)? == Greater,
        TokenKind::LessEq => ops::compare(l, r)? != Greater,
        _ => ops::compare(l, r)? != Less,
    })
}

/// Whether `value` belongs to the kind named by a type keyword.
pub fn kind_matches(value: &Value, kind: TokenKind) -> bool {
    match kind {
        TokenKind::KwAny => true,
        TokenKind::KwInt => matches!(value, Value::Int(_)),
        TokenKind::KwUint => matches!(value, Value::Uint(_)),
        TokenKind::KwFloat => matches!(value, Value::F32(_) | Value::F64(_)),
        TokenKind::KwBigi => matches!(value, Value::BigInt(_)),
        TokenKind::KwBigf => matches!(value, Value::BigFloat(_)),
        TokenKind::KwString => matches!(value, Value::Str(_)),
        TokenKind::KwBool => matches!(value, Value::Bool(_)),
        TokenKind::KwArray => matches!(value, Value::Seq(_)),
        TokenKind::KwMap => matches!(value, Value::Map(_)),
        TokenKind::Nil => matches!(value, Value::Nil),
        _ => false,
    }
}
