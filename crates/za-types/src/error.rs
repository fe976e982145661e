use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of diagnostics kept before the rest are only counted.
pub const MAX_ERRORS: usize = 20;

/// Error family, derived from the code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Lexical,
    Syntax,
    Semantic,
    Runtime,
}

/// Numeric error code (E100–E499).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Lexical errors (E100–E199) ──
    pub const INVALID_CHARACTER: Self = Self(100);
    pub const UNTERMINATED_STRING: Self = Self(101);
    pub const MALFORMED_NUMBER: Self = Self(102);

    // ── Syntax errors (E200–E299) ──
    pub const UNEXPECTED_TOKEN: Self = Self(200);
    pub const UNMATCHED_TERMINATOR: Self = Self(201);
    pub const MALFORMED_PHRASE: Self = Self(202);
    pub const UNBALANCED_BRACKETS: Self = Self(203);
    pub const NESTED_DEFINITION: Self = Self(204);
    pub const UNTERMINATED_BLOCK: Self = Self(205);

    // ── Semantic errors (E300–E399) ──
    pub const UNDEFINED_VARIABLE: Self = Self(300);
    pub const UNDEFINED_FUNCTION: Self = Self(301);
    pub const ARITY_MISMATCH: Self = Self(302);
    pub const TYPE_MISMATCH: Self = Self(303);

    // ── Runtime errors (E400–E499) ──
    pub const DIVISION_BY_ZERO: Self = Self(400);
    pub const INDEX_OUT_OF_RANGE: Self = Self(401);
    pub const CALL_DEPTH_EXCEEDED: Self = Self(402);
    pub const LOOP_LIMIT_EXCEEDED: Self = Self(403);
    pub const ASSERTION_FAILED: Self = Self(404);
    pub const HOST_FAILURE: Self = Self(405);

    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=199 => ErrorCategory::Lexical,
            200..=299 => ErrorCategory::Syntax,
            300..=399 => ErrorCategory::Semantic,
            _ => ErrorCategory::Runtime,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lexical => "lexical",
            Self::Syntax => "syntax",
            Self::Semantic => "semantic",
            Self::Runtime => "runtime",
        })
    }
}

/// A structured diagnostic raised while lexing or parsing a function space.
///
/// `file` holds the function-space name the text was being parsed into, so
/// a console can point at the right definition without re-parsing messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZaError {
    pub file: String,
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(flatten)]
    pub span: Span,
    pub source_line: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ZaError {
    pub fn new(
        file: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            code,
            category: code.category(),
            message: message.into(),
            span,
            source_line: source_line.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for ZaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}] {}",
            self.file, self.span, self.code, self.category, self.message
        )
    }
}

impl std::error::Error for ZaError {}

/// Diagnostics gathered over one parse.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorList {
    pub errors: Vec<ZaError>,
    pub total_errors: usize,
}

impl ErrorList {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Record an error; only the first [`MAX_ERRORS`] are stored.
    pub fn push_error(&mut self, error: ZaError) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    pub fn first(&self) -> Option<&ZaError> {
        self.errors.first()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.errors {
            writeln!(f, "{e}")?;
        }
        if self.total_errors > self.errors.len() {
            writeln!(f, "... and {} more", self.total_errors - self.errors.len())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(code: ErrorCode) -> ZaError {
        ZaError::new(
            "main",
            code,
            "unterminated string literal",
            Span::new(3, 5, 3, 12),
            "println \"oops",
        )
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::INVALID_CHARACTER.category(), ErrorCategory::Lexical);
        assert_eq!(ErrorCode::UNMATCHED_TERMINATOR.category(), ErrorCategory::Syntax);
        assert_eq!(ErrorCode::ARITY_MISMATCH.category(), ErrorCategory::Semantic);
        assert_eq!(ErrorCode::DIVISION_BY_ZERO.category(), ErrorCategory::Runtime);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::UNTERMINATED_STRING.to_string(), "E101");
        assert_eq!(ErrorCode::CALL_DEPTH_EXCEEDED.to_string(), "E402");
    }

    #[test]
    fn test_error_display_carries_space_and_position() {
        let err = sample(ErrorCode::UNTERMINATED_STRING);
        assert_eq!(
            err.to_string(),
            "main:3:5: E101 [lexical] unterminated string literal"
        );
    }

    #[test]
    fn test_error_with_suggestion() {
        let err = sample(ErrorCode::UNTERMINATED_STRING).with_suggestion("close the quote");
        assert_eq!(err.suggestion.as_deref(), Some("close the quote"));
    }

    #[test]
    fn test_error_json_round_trip() {
        let err = sample(ErrorCode::UNTERMINATED_STRING);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"category\":\"lexical\""));
        assert!(json.contains("\"line\":3"));
        assert!(!json.contains("suggestion"));
        let back: ZaError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, err.code);
        assert_eq!(back.span, err.span);
    }

    #[test]
    fn test_error_list_caps_stored_errors() {
        let mut list = ErrorList::empty();
        for _ in 0..25 {
            list.push_error(sample(ErrorCode::INVALID_CHARACTER));
        }
        assert_eq!(list.errors.len(), MAX_ERRORS);
        assert_eq!(list.total_errors, 25);
        assert!(list.to_string().ends_with("... and 5 more\n"));
    }

    #[test]
    fn test_error_list_empty() {
        let list = ErrorList::empty();
        assert!(!list.has_errors());
        assert!(list.first().is_none());
    }
}
