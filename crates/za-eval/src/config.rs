//! Runtime configuration.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::expr::VarMode;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// Interpreter limits and modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of live call frames.
    pub max_call_depth: usize,
    /// Per-loop iteration ceiling; `0` means unbounded.
    pub max_loop_iterations: u64,
    /// Whether top-level runs read unbound names strictly.
    pub strict_variables: bool,
    /// Whether `test` sections execute.
    pub test_mode: bool,
    /// Only run test groups whose name contains this text.
    pub test_group_filter: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_loop_iterations: 0,
            strict_variables: true,
            test_mode: false,
            test_group_filter: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Apply `ZA_MAX_CALL_DEPTH` and `ZA_MAX_LOOPS` from the environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, get: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = get("ZA_MAX_CALL_DEPTH") {
            match raw.trim().parse() {
                Ok(n) => self.max_call_depth = n,
                Err(_) => warn!(value = %raw, "ignoring invalid ZA_MAX_CALL_DEPTH"),
            }
        }
        if let Some(raw) = get("ZA_MAX_LOOPS") {
            match raw.trim().parse() {
                Ok(n) => self.max_loop_iterations = n,
                Err(_) => warn!(value = %raw, "ignoring invalid ZA_MAX_LOOPS"),
            }
        }
        self
    }

    pub fn var_mode(&self) -> VarMode {
        if self.strict_variables {
            VarMode::Strict
        } else {
            VarMode::Soft
        }
    }

    pub fn runs_group(&self, group: &str) -> bool {
        self.test_group_filter
            .as_deref()
            .map_or(true, |filter| group.contains(filter))
    }
}
