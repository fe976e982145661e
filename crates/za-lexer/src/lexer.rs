//! Core Za lexer. Converts source text to tokens one at a time.
//!
//! Features:
//! - Newlines and `;` are emitted as tokens and flagged as statement ends
//! - `#` and `//` line comments are skipped
//! - Numeric literals: decimal, `0x`/`0o`/`0b`, `_` separators, `f` and `n` suffixes
//! - `"..."` strings decode escapes; `'...'` and `` `...` `` are kept verbatim
//! - A `-` glued to a digit is a negative literal unless the previous token ends an operand
//! - Never aborts: bad input becomes a [`TokenKind::Error`] token plus a diagnostic

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use std::str::FromStr;
use tracing::warn;
use za_types::{ErrorCode, ErrorList, SourceFile, Span, Value, ZaError};

use crate::token::{Token, TokenKind};

/// One step of the lexer: the token, where the next scan starts, and whether
/// the token ended a statement or the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexed {
    pub token: Token,
    pub next: usize,
    pub eol: bool,
    pub eof: bool,
}

/// Result of lexing a whole input: tokens + any diagnostics.
pub struct LexResult {
    /// The token stream (always ends with [`TokenKind::Eof`]).
    pub tokens: Vec<Token>,
    pub errors: ErrorList,
}

/// The Za lexer.
pub struct Lexer<'src> {
    source: &'src [u8],
    text: &'src str,
    source_file: &'src SourceFile,
    pos: usize,
    line: u32,
    col: u32,
    /// Kind of the most recently produced token.
    prev: TokenKind,
    errors: ErrorList,
}

impl<'src> Lexer<'src> {
    pub fn new(source_file: &'src SourceFile) -> Self {
        Self::resume(source_file, 0, 1, TokenKind::Eol)
    }

    /// Start scanning part-way through an input: at byte `start`, on 1-based
    /// `line`, with `prev` as the kind of the token before `start`. A `start`
    /// inside a multi-byte character moves back to that character's first byte.
    pub fn resume(source_file: &'src SourceFile, start: usize, line: u32, prev: TokenKind) -> Self {
        let text = source_file.source.as_str();
        let mut start = start.min(text.len());
        while !text.is_char_boundary(start) {
            start -= 1;
        }
        let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
        Self {
            source: text.as_bytes(),
            text,
            source_file,
            pos: start,
            line,
            col: (text[line_start..start].chars().count() + 1) as u32,
            prev,
            errors: ErrorList::empty(),
        }
    }

    /// Lex the entire input.
    pub fn lex(mut self) -> LexResult {
        let mut tokens = Vec::new();
        loop {
            let step = self.next_token();
            tokens.push(step.token);
            if step.eof {
                break;
            }
        }
        LexResult {
            tokens,
            errors: self.errors,
        }
    }

    /// Diagnostics collected so far.
    pub fn errors(&self) -> &ErrorList {
        &self.errors
    }

    /// Current 1-based line.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> Lexed {
        let token = self.scan();
        self.prev = token.kind;
        let eol = matches!(token.kind, TokenKind::Eol | TokenKind::Semicolon);
        let eof = token.kind == TokenKind::Eof;
        Lexed {
            token,
            next: self.pos,
            eol,
            eof,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Character-level helpers
    // ─────────────────────────────────────────────────────────────

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.col = 1;
        } else if ch & 0xC0 != 0x80 {
            // continuation bytes of a UTF-8 sequence do not start a column
            self.col += 1;
        }
        Some(ch)
    }

    fn span_from(&self, start_line: u32, start_col: u32) -> Span {
        Span::new(start_line, start_col, self.line, self.col.saturating_sub(1).max(1))
    }

    fn lexeme(&self, start: usize) -> &'src str {
        &self.text[start..self.pos]
    }

    fn error_token(
        &mut self,
        code: ErrorCode,
        message: impl Into<String>,
        start: usize,
        span: Span,
    ) -> Token {
        let message = message.into();
        warn!(line = span.start_line, col = span.start_col, "{message}");
        let source_line = self.source_file.line(span.start_line).unwrap_or("").to_string();
        self.errors.push_error(ZaError::new(
            self.source_file.name.clone(),
            code,
            message,
            span,
            source_line,
        ));
        Token::new(TokenKind::Error, self.lexeme(start), span)
    }

    // ─────────────────────────────────────────────────────────────
    // Whitespace & comments
    // ─────────────────────────────────────────────────────────────

    /// Skip spaces, tabs and carriage returns (not newlines).
    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\r') = self.peek() {
            self.advance();
        }
    }

    /// Skip a `#` or `//` comment up to (not including) the newline.
    fn skip_comment(&mut self) -> bool {
        let is_comment = match self.peek() {
            Some(b'#') => true,
            Some(b'/') => self.peek_at(1) == Some(b'/'),
            _ => false,
        };
        if is_comment {
            while let Some(ch) = self.peek() {
                if ch == b'\n' {
                    break;
                }
                self.advance();
            }
        }
        is_comment
    }

    // ─────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────

    fn scan(&mut self) -> Token {
        loop {
            self.skip_whitespace();
            if !self.skip_comment() {
                break;
            }
        }

        let start = self.pos;
        let start_line = self.line;
        let start_col = self.col;

        let Some(ch) = self.advance() else {
            return Token::new(TokenKind::Eof, "", Span::point(self.line, self.col));
        };

        match ch {
            b'\n' => Token::new(TokenKind::Eol, "\n", Span::point(start_line, start_col)),

            b'"' => self.scan_string(start, start_line, start_col),
            b'\'' | b'`' => self.scan_verbatim(ch, start, start_line, start_col),

            b'0'..=b'9' => self.scan_number(start, start_line, start_col),
            b'-' if matches!(self.peek(), Some(b'0'..=b'9')) && !self.prev.ends_operand() => {
                self.advance();
                self.scan_number(start, start_line, start_col)
            }

            b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'@' | b'$' => {
                self.scan_identifier(start, start_line, start_col)
            }

            _ => self.scan_operator(ch, start, start_line, start_col),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Operators & punctuation
    // ─────────────────────────────────────────────────────────────

    fn scan_operator(&mut self, ch: u8, start: usize, start_line: u32, start_col: u32) -> Token {
        use TokenKind::*;

        let next = self.peek();
        let two = match (ch, next) {
            (b'.', Some(b'.')) if self.peek_at(1) == Some(b'.') => {
                self.advance();
                self.advance();
                return Token::new(Ellipsis, "...", self.span_from(start_line, start_col));
            }
            (b'*', Some(b'*')) => Some(Power),
            (b'+', Some(b'+')) => Some(PlusPlus),
            (b'-', Some(b'-')) => Some(MinusMinus),
            (b'=', Some(b'=')) => Some(EqEq),
            (b'!', Some(b'=')) => Some(BangEq),
            (b'<', Some(b'=')) => Some(LessEq),
            (b'>', Some(b'=')) => Some(GreaterEq),
            (b'<', Some(b'<')) => Some(Shl),
            (b'>', Some(b'>')) => Some(Shr),
            (b'&', Some(b'&')) => Some(AmpAmp),
            (b'|', Some(b'|')) => Some(PipePipe),
            (b'.', Some(b'.')) => Some(DotDot),
            (b'+', Some(b'=')) => Some(PlusAssign),
            (b'-', Some(b'=')) => Some(MinusAssign),
            (b'*', Some(b'=')) => Some(StarAssign),
            (b'/', Some(b'=')) => Some(SlashAssign),
            (b'%', Some(b'=')) => Some(PercentAssign),
            (b'-', Some(b'>')) => Some(Arrow),
            _ => None,
        };
        if let Some(kind) = two {
            self.advance();
            return Token::new(kind, self.lexeme(start), self.span_from(start_line, start_col));
        }

        let kind = match ch {
            b'+' => Plus,
            b'-' => Minus,
            b'*' => Star,
            b'/' => Slash,
            b'%' => Percent,
            b'^' => Caret,
            b'!' => Bang,
            b'?' => Question,
            b':' => Colon,
            b'=' => Assign,
            b'<' => Less,
            b'>' => Greater,
            b'&' => Amp,
            b'|' => Pipe,
            b'.' => Dot,
            b'~' => Tilde,
            b',' => Comma,
            b';' => Semicolon,
            b'(' => LParen,
            b')' => RParen,
            b'[' => LBracket,
            b']' => RBracket,
            b'{' => LBrace,
            b'}' => RBrace,
            _ => {
                // swallow the rest of a multi-byte character so the error names it whole
                while matches!(self.peek(), Some(b) if b & 0xC0 == 0x80) {
                    self.advance();
                }
                let span = self.span_from(start_line, start_col);
                let text = self.lexeme(start);
                return self.error_token(
                    ErrorCode::INVALID_CHARACTER,
                    format!("unexpected character '{text}'"),
                    start,
                    span,
                );
            }
        };
        Token::new(kind, self.lexeme(start), self.span_from(start_line, start_col))
    }

    // ─────────────────────────────────────────────────────────────
    // Number literals
    // ─────────────────────────────────────────────────────────────

    fn eat_digits(&mut self, radix: u32) {
        while let Some(ch) = self.peek() {
            if ch == b'_' || (ch as char).is_digit(radix) {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn scan_number(&mut self, start: usize, start_line: u32, start_col: u32) -> Token {
        // The first digit (and any sign) is already consumed.
        let first = self.source[self.pos - 1];
        let radix = match (first, self.peek()) {
            (b'0', Some(b'x' | b'X')) => Some(16),
            (b'0', Some(b'o' | b'O')) => Some(8),
            (b'0', Some(b'b' | b'B')) => Some(2),
            _ => None,
        };

        if let Some(radix) = radix {
            self.advance();
            let digits_start = self.pos;
            self.eat_digits(radix);
            let negative = self.source[start] == b'-';
            let digits: String = self.text[digits_start..self.pos]
                .chars()
                .filter(|c| *c != '_')
                .collect();
            return self.finish_integer(start, start_line, start_col, &digits, radix, negative);
        }

        self.eat_digits(10);

        let mut is_float = false;
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            is_float = true;
            self.advance();
            self.eat_digits(10);
        }
        if let Some(b'e' | b'E') = self.peek() {
            let sign = usize::from(matches!(self.peek_at(1), Some(b'+' | b'-')));
            if matches!(self.peek_at(1 + sign), Some(b'0'..=b'9')) {
                is_float = true;
                for _ in 0..=sign {
                    self.advance();
                }
                self.eat_digits(10);
            }
        }

        let body_end = self.pos;
        let suffix = match self.peek() {
            Some(b'f' | b'F') => Some(b'f'),
            Some(b'n' | b'N') => Some(b'n'),
            _ => None,
        };
        if suffix.is_some() {
            self.advance();
        }

        if matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.eat_digits(36);
            let span = self.span_from(start_line, start_col);
            let text = self.lexeme(start);
            return self.error_token(
                ErrorCode::MALFORMED_NUMBER,
                format!("malformed number '{text}'"),
                start,
                span,
            );
        }

        let body: String = self.text[start..body_end]
            .chars()
            .filter(|c| *c != '_')
            .collect();
        let span = self.span_from(start_line, start_col);
        let text = self.lexeme(start);

        match suffix {
            Some(b'f') => match body.parse::<f64>() {
                Ok(x) => Token::literal(TokenKind::FloatLit, text, Value::F64(x), span),
                Err(_) => self.error_token(
                    ErrorCode::MALFORMED_NUMBER,
                    format!("malformed float '{text}'"),
                    start,
                    span,
                ),
            },
            Some(_) if is_float => match BigDecimal::from_str(&body) {
                Ok(d) => Token::literal(TokenKind::BigFloatLit, text, Value::BigFloat(d), span),
                Err(_) => self.error_token(
                    ErrorCode::MALFORMED_NUMBER,
                    format!("malformed big float '{text}'"),
                    start,
                    span,
                ),
            },
            Some(_) => match BigInt::from_str(&body) {
                Ok(b) => Token::literal(TokenKind::BigIntLit, text, Value::BigInt(b), span),
                Err(_) => self.error_token(
                    ErrorCode::MALFORMED_NUMBER,
                    format!("malformed big integer '{text}'"),
                    start,
                    span,
                ),
            },
            None if is_float => match body.parse::<f64>() {
                Ok(x) => Token::literal(TokenKind::FloatLit, text, Value::F64(x), span),
                Err(_) => self.error_token(
                    ErrorCode::MALFORMED_NUMBER,
                    format!("malformed float '{text}'"),
                    start,
                    span,
                ),
            },
            None => {
                let negative = body.starts_with('-');
                let digits = body.trim_start_matches('-').to_string();
                self.finish_integer(start, start_line, start_col, &digits, 10, negative)
            }
        }
    }

    /// Build an integer literal, widening to a big integer when 64 bits overflow.
    fn finish_integer(
        &mut self,
        start: usize,
        start_line: u32,
        start_col: u32,
        digits: &str,
        radix: u32,
        negative: bool,
    ) -> Token {
        let span = self.span_from(start_line, start_col);
        let text = self.lexeme(start);
        let Some(magnitude) = BigInt::parse_bytes(digits.as_bytes(), radix) else {
            return self.error_token(
                ErrorCode::MALFORMED_NUMBER,
                format!("malformed integer '{text}'"),
                start,
                span,
            );
        };
        let n = if negative { -magnitude } else { magnitude };
        match Value::normalize_bigint(n) {
            v @ Value::Int(_) => Token::literal(TokenKind::IntLit, text, v, span),
            v => Token::literal(TokenKind::BigIntLit, text, v, span),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Identifiers & keywords
    // ─────────────────────────────────────────────────────────────

    fn scan_identifier(&mut self, start: usize, start_line: u32, start_col: u32) -> Token {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        let text = self.lexeme(start);
        let span = self.span_from(start_line, start_col);
        match TokenKind::from_keyword(text) {
            Some(TokenKind::True) => Token::literal(TokenKind::True, text, Value::Bool(true), span),
            Some(TokenKind::False) => {
                Token::literal(TokenKind::False, text, Value::Bool(false), span)
            }
            Some(kind) => Token::new(kind, text, span),
            None => Token::new(TokenKind::Identifier, text, span),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // String literals
    // ─────────────────────────────────────────────────────────────

    /// Scan a `"` string, decoding escapes.
    fn scan_string(&mut self, start: usize, start_line: u32, start_col: u32) -> Token {
        let mut buf = String::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    let span = self.span_from(start_line, start_col);
                    return self.error_token(
                        ErrorCode::UNTERMINATED_STRING,
                        "unterminated string literal",
                        start,
                        span,
                    );
                }
                Some(b'"') => {
                    self.advance();
                    let span = self.span_from(start_line, start_col);
                    return Token::literal(
                        TokenKind::StringLit,
                        self.lexeme(start),
                        Value::Str(buf),
                        span,
                    );
                }
                Some(b'\\') => {
                    self.advance();
                    match self.advance() {
                        Some(b'n') => buf.push('\n'),
                        Some(b't') => buf.push('\t'),
                        Some(b'r') => buf.push('\r'),
                        Some(b'0') => buf.push('\0'),
                        Some(b'e') => buf.push('\u{1b}'),
                        Some(b'\\') => buf.push('\\'),
                        Some(b'"') => buf.push('"'),
                        Some(b'\'') => buf.push('\''),
                        Some(other) => {
                            buf.push('\\');
                            self.push_char_from(other, &mut buf);
                        }
                        None => {}
                    }
                }
                Some(_) => {
                    let ch = self.advance().unwrap_or(b' ');
                    self.push_char_from(ch, &mut buf);
                }
            }
        }
    }

    /// Scan a `'` or `` ` `` string. No escape decoding; backquoted strings
    /// may span lines.
    fn scan_verbatim(&mut self, quote: u8, start: usize, start_line: u32, start_col: u32) -> Token {
        let body_start = self.pos;
        loop {
            match self.peek() {
                None => break,
                Some(b'\n') if quote != b'`' => break,
                Some(ch) if ch == quote => {
                    let body = self.text[body_start..self.pos].to_string();
                    self.advance();
                    let span = self.span_from(start_line, start_col);
                    return Token::literal(
                        TokenKind::StringLit,
                        self.lexeme(start),
                        Value::Str(body),
                        span,
                    );
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
        let span = self.span_from(start_line, start_col);
        self.error_token(
            ErrorCode::UNTERMINATED_STRING,
            "unterminated string literal",
            start,
            span,
        )
    }

    /// Append the UTF-8 character whose first byte was just consumed.
    fn push_char_from(&mut self, first: u8, buf: &mut String) {
        let begin = self.pos - 1;
        while matches!(self.peek(), Some(b) if b & 0xC0 == 0x80) {
            self.advance();
        }
        match self.text.get(begin..self.pos) {
            Some(s) => buf.push_str(s),
            None => buf.push(first as char),
        }
    }
}
