//! Shared types for the Za runtime.
//!
//! Source spans, structured diagnostics, and the [`Value`] sum type that
//! flows between the evaluator, the variable tables and host collaborators.

mod error;
mod span;
pub mod value;

pub use error::{ErrorCategory, ErrorCode, ErrorList, ZaError, MAX_ERRORS};
pub use span::{SourceFile, Span};
pub use value::{Rank, Value, ValueMap};

/// Result type for lexing and parsing stages.
pub type Result<T> = std::result::Result<T, ZaError>;
