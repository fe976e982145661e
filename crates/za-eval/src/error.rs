//! Runtime error types for the Za evaluator.

use thiserror::Error;
use za_types::{ErrorCode, ErrorList, Span, ZaError};

/// Evaluation error: semantic and runtime failures raised while executing
/// phrases, plus the parse failure that stops a run before it starts.
#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("undefined function: {0}")]
    UndefinedFunction(String),
    #[error("'{name}' expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("index out of range: {0}")]
    IndexOutOfRange(String),
    #[error("call depth exceeded (limit {0})")]
    CallDepthExceeded(usize),
    #[error("loop iteration limit exceeded (limit {0})")]
    LoopLimitExceeded(u64),
    /// Block structure that cannot be resolved: `break` outside a loop, an
    /// `if` whose `endif` is missing, and similar.
    #[error("malformed control structure: {0}")]
    Malformed(String),
    /// Expression that does not parse.
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("assertion failed: {0}")]
    AssertionFailed(String),
    /// An external collaborator (console, coprocess, sub-language) failed.
    #[error("host failure: {0}")]
    Host(String),
    #[error("parse failed:\n{0}")]
    Parse(ErrorList),
    /// Location wrapper added once, at the innermost phrase that failed.
    #[error("{space}:{phrase} (line {line}): {source}")]
    At {
        space: String,
        phrase: usize,
        line: u32,
        source: Box<EvalError>,
    },
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;

impl EvalError {
    pub(crate) fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::TypeMismatch(msg.into())
    }

    /// Attach a phrase location unless one is already attached.
    pub fn at(self, space: &str, phrase: usize, line: u32) -> Self {
        match self {
            Self::At { .. } | Self::Parse(_) => self,
            other => Self::At {
                space: space.to_string(),
                phrase,
                line,
                source: Box::new(other),
            },
        }
    }

    /// The error with any location wrapper removed.
    pub fn root(&self) -> &EvalError {
        match self {
            Self::At { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UndefinedVariable(_) => ErrorCode::UNDEFINED_VARIABLE,
            Self::UndefinedFunction(_) => ErrorCode::UNDEFINED_FUNCTION,
            Self::ArityMismatch { .. } => ErrorCode::ARITY_MISMATCH,
            Self::TypeMismatch(_) => ErrorCode::TYPE_MISMATCH,
            Self::DivisionByZero => ErrorCode::DIVISION_BY_ZERO,
            Self::IndexOutOfRange(_) => ErrorCode::INDEX_OUT_OF_RANGE,
            Self::CallDepthExceeded(_) => ErrorCode::CALL_DEPTH_EXCEEDED,
            Self::LoopLimitExceeded(_) => ErrorCode::LOOP_LIMIT_EXCEEDED,
            Self::Malformed(_) => ErrorCode::UNMATCHED_TERMINATOR,
            Self::Syntax(_) => ErrorCode::MALFORMED_PHRASE,
            Self::AssertionFailed(_) => ErrorCode::ASSERTION_FAILED,
            Self::Host(_) => ErrorCode::HOST_FAILURE,
            Self::Parse(list) => list
                .first()
                .map_or(ErrorCode::MALFORMED_PHRASE, |e| e.code),
            Self::At { source, .. } => source.code(),
        }
    }

    /// Structured diagnostic for reporting.
    pub fn diagnostic(&self) -> ZaError {
        match self {
            Self::Parse(list) => match list.first() {
                Some(first) => first.clone(),
                None => ZaError::new("", self.code(), self.to_string(), Span::default(), ""),
            },
            Self::At {
                space,
                line,
                source,
                ..
            } => ZaError::new(
                space.clone(),
                self.code(),
                source.root().to_string(),
                Span::point(*line, 1),
                "",
            ),
            other => ZaError::new("", other.code(), other.to_string(), Span::default(), ""),
        }
    }
}
