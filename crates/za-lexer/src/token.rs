//! Token types for the Za lexer.
//!
//! [`TokenKind`] is a closed, data-free tag. The raw lexeme and, for
//! literals, the decoded [`Value`] travel alongside it on [`Token`].

use std::fmt;
use za_types::{Span, Value};

/// Every reserved word, in lower case. Matching is case-insensitive.
pub const ALL_KEYWORDS: &[&str] = &[
    // Statements
    "var", "setglob", "enum", "nop", "exit", "unset", "print", "println", "def", "define",
    "enddef", "end",
    "return", "while", "endwhile", "for", "foreach", "endfor", "continue", "break", "if",
    "else", "endif", "when", "is", "contains", "has", "endwhen", "assert", "test", "endtest",
    "to", "step",
    // Expression words
    "in", "or", "and", "not", "true", "false", "nil",
    // Type names
    "int", "uint", "float", "bigi", "bigf", "string", "bool", "array", "map", "any",
];

// ─────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────

/// One lexical unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// The lexeme exactly as written in the source.
    pub text: String,
    /// Decoded literal value; `Some` exactly for literal kinds.
    pub value: Option<Value>,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            value: None,
            span,
        }
    }

    pub fn literal(kind: TokenKind, text: impl Into<String>, value: Value, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            value: Some(value),
            span,
        }
    }

    pub fn is_keyword(&self) -> bool {
        self.kind.is_keyword()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eol | TokenKind::Eof => write!(f, "{}", self.kind),
            _ => f.write_str(&self.text),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// TokenKind
// ─────────────────────────────────────────────────────────────────────

/// Every token kind in the Za language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // ── Literals ──────────────────────────────────────────────
    /// `42`, `0xff`, `1_000`
    IntLit,
    /// `3.5`, `1e6`, `2f`
    FloatLit,
    /// `12n`, or a decimal integer too wide for 64 bits
    BigIntLit,
    /// `1.5n`
    BigFloatLit,
    /// `"decoded"`, `'verbatim'`, `` `raw` ``
    StringLit,
    Identifier,

    // ── Operators ────────────────────────────────────────────
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// `**`
    Power,
    /// `^` (bitwise xor)
    Caret,
    /// `!`
    Bang,
    Question,
    Colon,
    /// `=`
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    EqEq,
    BangEq,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    /// `&&`
    AmpAmp,
    /// `||`
    PipePipe,
    Amp,
    Pipe,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    PlusPlus,
    MinusMinus,
    /// `..`
    DotDot,
    /// `...`
    Ellipsis,
    Dot,
    Tilde,
    Arrow,

    // ── Punctuation ──────────────────────────────────────────
    Comma,
    Semicolon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    // ── Statement keywords ───────────────────────────────────
    Var,
    /// `setglob` (assignment into the top-level scope)
    SetGlob,
    Enum,
    Nop,
    Exit,
    Unset,
    Print,
    Println,
    /// `def` / `define`
    Def,
    /// `enddef` / `end`
    EndDef,
    Return,
    While,
    EndWhile,
    For,
    Foreach,
    EndFor,
    Continue,
    Break,
    If,
    Else,
    EndIf,
    When,
    Is,
    Contains,
    Has,
    EndWhen,
    Assert,
    Test,
    EndTest,
    To,
    Step,

    // ── Expression keywords ──────────────────────────────────
    In,
    Or,
    And,
    Not,
    True,
    False,
    Nil,

    // ── Type names ───────────────────────────────────────────
    KwInt,
    KwUint,
    KwFloat,
    KwBigi,
    KwBigf,
    KwString,
    KwBool,
    KwArray,
    KwMap,
    KwAny,

    // ── Special ──────────────────────────────────────────────
    Eol,
    Eof,
    /// Invalid input: unrecognised character, unterminated string, bad number.
    Error,
}

impl TokenKind {
    /// Look up a reserved word, ignoring case.
    pub fn from_keyword(word: &str) -> Option<TokenKind> {
        Some(match word.to_ascii_lowercase().as_str() {
            "var" => TokenKind::Var,
            "setglob" => TokenKind::SetGlob,
            "enum" => TokenKind::Enum,
            "nop" => TokenKind::Nop,
            "exit" => TokenKind::Exit,
            "unset" => TokenKind::Unset,
            "print" => TokenKind::Print,
            "println" => TokenKind::Println,
            "def" | "define" => TokenKind::Def,
            "enddef" | "end" => TokenKind::EndDef,
            "return" => TokenKind::Return,
            "while" => TokenKind::While,
            "endwhile" => TokenKind::EndWhile,
            "for" => TokenKind::For,
            "foreach" => TokenKind::Foreach,
            "endfor" => TokenKind::EndFor,
            "continue" => TokenKind::Continue,
            "break" => TokenKind::Break,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "endif" => TokenKind::EndIf,
            "when" => TokenKind::When,
            "is" => TokenKind::Is,
            "contains" => TokenKind::Contains,
            "has" => TokenKind::Has,
            "endwhen" => TokenKind::EndWhen,
            "assert" => TokenKind::Assert,
            "test" => TokenKind::Test,
            "endtest" => TokenKind::EndTest,
            "to" => TokenKind::To,
            "step" => TokenKind::Step,
            "in" => TokenKind::In,
            "or" => TokenKind::Or,
            "and" => TokenKind::And,
            "not" => TokenKind::Not,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "nil" => TokenKind::Nil,
            "int" => TokenKind::KwInt,
            "uint" => TokenKind::KwUint,
            "float" => TokenKind::KwFloat,
            "bigi" => TokenKind::KwBigi,
            "bigf" => TokenKind::KwBigf,
            "string" => TokenKind::KwString,
            "bool" => TokenKind::KwBool,
            "array" => TokenKind::KwArray,
            "map" => TokenKind::KwMap,
            "any" => TokenKind::KwAny,
            _ => return None,
        })
    }

    pub fn is_keyword(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Var
                | SetGlob
                | Enum
                | Nop
                | Exit
                | Unset
                | Print
                | Println
                | Def
                | EndDef
                | Return
                | While
                | EndWhile
                | For
                | Foreach
                | EndFor
                | Continue
                | Break
                | If
                | Else
                | EndIf
                | When
                | Is
                | Contains
                | Has
                | EndWhen
                | Assert
                | Test
                | EndTest
                | To
                | Step
                | In
                | Or
                | And
                | Not
                | True
                | False
                | Nil
        ) || self.is_type_name()
    }

    pub fn is_type_name(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            KwInt | KwUint | KwFloat | KwBigi | KwBigf | KwString | KwBool | KwArray | KwMap
                | KwAny | Nil
        )
    }

    pub fn is_literal(self) -> bool {
        matches!(
            self,
            TokenKind::IntLit
                | TokenKind::FloatLit
                | TokenKind::BigIntLit
                | TokenKind::BigFloatLit
                | TokenKind::StringLit
        )
    }

    /// Whether a token of this kind can be the last token of an operand.
    ///
    /// A `-` directly after such a token is subtraction; anywhere else a `-`
    /// glued to a digit starts a negative literal.
    pub fn ends_operand(self) -> bool {
        self.is_literal()
            || matches!(
                self,
                TokenKind::Identifier
                    | TokenKind::RParen
                    | TokenKind::RBracket
                    | TokenKind::RBrace
                    | TokenKind::True
                    | TokenKind::False
                    | TokenKind::Nil
                    | TokenKind::PlusPlus
                    | TokenKind::MinusMinus
            )
    }

    /// `=` and the compound assignment operators.
    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            TokenKind::Assign
                | TokenKind::PlusAssign
                | TokenKind::MinusAssign
                | TokenKind::StarAssign
                | TokenKind::SlashAssign
                | TokenKind::PercentAssign
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;
        let s = match self {
            IntLit => "integer literal",
            FloatLit => "float literal",
            BigIntLit => "big integer literal",
            BigFloatLit => "big float literal",
            StringLit => "string literal",
            Identifier => "identifier",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            Power => "**",
            Caret => "^",
            Bang => "!",
            Question => "?",
            Colon => ":",
            Assign => "=",
            PlusAssign => "+=",
            MinusAssign => "-=",
            StarAssign => "*=",
            SlashAssign => "/=",
            PercentAssign => "%=",
            EqEq => "==",
            BangEq => "!=",
            Less => "<",
            Greater => ">",
            LessEq => "<=",
            GreaterEq => ">=",
            AmpAmp => "&&",
            PipePipe => "||",
            Amp => "&",
            Pipe => "|",
            Shl => "<<",
            Shr => ">>",
            PlusPlus => "++",
            MinusMinus => "--",
            DotDot => "..",
            Ellipsis => "...",
            Dot => ".",
            Tilde => "~",
            Arrow => "->",
            Comma => ",",
            Semicolon => ";",
            LParen => "(",
            RParen => ")",
            LBracket => "[",
            RBracket => "]",
            LBrace => "{",
            RBrace => "}",
            Var => "var",
            SetGlob => "setglob",
            Enum => "enum",
            Nop => "nop",
            Exit => "exit",
            Unset => "unset",
            Print => "print",
            Println => "println",
            Def => "def",
            EndDef => "enddef",
            Return => "return",
            While => "while",
            EndWhile => "endwhile",
            For => "for",
            Foreach => "foreach",
            EndFor => "endfor",
            Continue => "continue",
            Break => "break",
            If => "if",
            Else => "else",
            EndIf => "endif",
            When => "when",
            Is => "is",
            Contains => "contains",
            Has => "has",
            EndWhen => "endwhen",
            Assert => "assert",
            Test => "test",
            EndTest => "endtest",
            To => "to",
            Step => "step",
            In => "in",
            Or => "or",
            And => "and",
            Not => "not",
            True => "true",
            False => "false",
            Nil => "nil",
            KwInt => "int",
            KwUint => "uint",
            KwFloat => "float",
            KwBigi => "bigi",
            KwBigf => "bigf",
            KwString => "string",
            KwBool => "bool",
            KwArray => "array",
            KwMap => "map",
            KwAny => "any",
            Eol => "end of line",
            Eof => "end of input",
            Error => "invalid token",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_keyword_recognises_all() {
        for &kw in ALL_KEYWORDS {
            assert!(
                TokenKind::from_keyword(kw).is_some(),
                "from_keyword should recognise '{kw}'"
            );
        }
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(TokenKind::from_keyword("ENDIF"), Some(TokenKind::EndIf));
        assert_eq!(TokenKind::from_keyword("Println"), Some(TokenKind::Println));
        assert_eq!(TokenKind::from_keyword("wHiLe"), Some(TokenKind::While));
    }

    #[test]
    fn test_keyword_aliases() {
        assert_eq!(TokenKind::from_keyword("define"), Some(TokenKind::Def));
        assert_eq!(TokenKind::from_keyword("end"), Some(TokenKind::EndDef));
    }

    #[test]
    fn test_from_keyword_rejects_identifiers() {
        for name in ["foo", "endiff", "key_v", "integer", "maps"] {
            assert!(TokenKind::from_keyword(name).is_none(), "{name}");
        }
    }

    #[test]
    fn test_is_keyword_true_for_all() {
        for &kw in ALL_KEYWORDS {
            let kind = TokenKind::from_keyword(kw).unwrap();
            assert!(kind.is_keyword(), "is_keyword should hold for '{kw}'");
        }
    }

    #[test]
    fn test_is_keyword_false_for_non_keywords() {
        for kind in [
            TokenKind::IntLit,
            TokenKind::Identifier,
            TokenKind::Plus,
            TokenKind::Eol,
            TokenKind::Error,
        ] {
            assert!(!kind.is_keyword(), "{kind:?}");
        }
    }

    #[test]
    fn test_ends_operand() {
        assert!(TokenKind::Identifier.ends_operand());
        assert!(TokenKind::RParen.ends_operand());
        assert!(TokenKind::IntLit.ends_operand());
        assert!(!TokenKind::Assign.ends_operand());
        assert!(!TokenKind::LParen.ends_operand());
        assert!(!TokenKind::Print.ends_operand());
    }

    #[test]
    fn test_display_roundtrip_keywords() {
        for &kw in ALL_KEYWORDS {
            if kw == "define" || kw == "end" {
                continue;
            }
            let kind = TokenKind::from_keyword(kw).unwrap();
            assert_eq!(kind.to_string(), kw);
        }
    }

    #[test]
    fn test_token_display_uses_source_text() {
        let tok = Token::literal(
            TokenKind::StringLit,
            "'abc'",
            Value::from("abc"),
            Span::point(1, 1),
        );
        assert_eq!(tok.to_string(), "'abc'");
        let eol = Token::new(TokenKind::Eol, "\n", Span::point(1, 6));
        assert_eq!(eol.to_string(), "end of line");
    }
}
