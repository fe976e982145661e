//! Za test runner: `test "name" group "g" [assert fail|continue]` … `endtest`
//! sections.
//!
//! Sections execute in place, sharing the enclosing scope, when the
//! interpreter runs in test mode and the section's group passes the filter.
//! Assertion failures and runtime errors inside a section are recorded here
//! instead of ending the run.

use za_lexer::{Token, TokenKind};

use crate::config::RuntimeConfig;
use crate::engine::Interpreter;
use crate::error::{EvalError, EvalResult};

/// What a failed `assert` does inside a test section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AssertMode {
    /// Record the failure and abandon the rest of the section.
    #[default]
    Fail,
    /// Record the failure and keep going.
    Continue,
}

/// Parsed header of a `test` phrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSection {
    pub name: String,
    pub group: String,
    pub mode: AssertMode,
}

impl TestSection {
    pub fn parse(tokens: &[Token]) -> EvalResult<Self> {
        let malformed = || {
            EvalError::Syntax(
                "expected: test \"name\" [group \"g\"] [assert fail|continue]".into(),
            )
        };
        let mut rest = tokens.iter().skip(1);
        let name = match rest.next() {
            Some(t) if t.kind == TokenKind::StringLit => string_of(t),
            _ => return Err(malformed()),
        };
        let mut section = TestSection {
            name,
            group: String::new(),
            mode: AssertMode::Fail,
        };
        while let Some(t) = rest.next() {
            match t.kind {
                TokenKind::Identifier if t.text.eq_ignore_ascii_case("group") => match rest.next() {
                    Some(g) if g.kind == TokenKind::StringLit => section.group = string_of(g),
                    _ => return Err(malformed()),
                },
                TokenKind::Assert => {
                    section.mode = match rest.next() {
                        Some(m) if m.kind == TokenKind::Continue => AssertMode::Continue,
                        Some(m)
                            if m.kind == TokenKind::Identifier
                                && m.text.eq_ignore_ascii_case("fail") =>
                        {
                            AssertMode::Fail
                        }
                        _ => return Err(malformed()),
                    }
                }
                _ => return Err(malformed()),
            }
        }
        Ok(section)
    }
}

fn string_of(t: &Token) -> String {
    t.value
        .as_ref()
        .and_then(|v| v.as_str())
        .map_or_else(|| t.text.clone(), str::to_string)
}

/// A section currently executing.
#[derive(Debug)]
pub(crate) struct ActiveTest {
    pub(crate) section: TestSection,
    pub(crate) failures: Vec<String>,
}

impl ActiveTest {
    pub(crate) fn new(section: TestSection) -> Self {
        Self {
            section,
            failures: Vec::new(),
        }
    }

    /// Close the section, folding in the error that aborted it, if any.
    pub(crate) fn finish(mut self, aborted_by: Option<&EvalError>) -> TestResult {
        if let Some(e) = aborted_by {
            self.failures.push(match e.root() {
                EvalError::AssertionFailed(msg) => msg.clone(),
                other => other.to_string(),
            });
        }
        TestResult {
            name: self.section.name,
            group: self.section.group,
            passed: self.failures.is_empty(),
            failures: self.failures,
        }
    }
}

/// Result of running a single test section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub name: String,
    pub group: String,
    pub passed: bool,
    /// One entry per failed assertion or aborting error.
    pub failures: Vec<String>,
}

impl std::fmt::Display for TestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.passed {
            write!(f, "  ✓ {}", self.name)
        } else {
            write!(f, "  ✗ {}: {}", self.name, self.failures.join("; "))
        }
    }
}

/// Summary of every section that ran.
#[derive(Debug, Clone, Default)]
pub struct TestRunSummary {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
}

impl TestRunSummary {
    pub fn from_results(results: Vec<TestResult>) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        let failed = results.len() - passed;
        Self {
            results,
            passed,
            failed,
        }
    }
}

impl std::fmt::Display for TestRunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for r in &self.results {
            writeln!(f, "{r}")?;
        }
        writeln!(f, "\n{} passed, {} failed", self.passed, self.failed)
    }
}

/// Run `source` once in test mode and summarise its test sections.
pub fn run_tests(source: &str, config: RuntimeConfig) -> EvalResult<TestRunSummary> {
    let mut interp = Interpreter::new(RuntimeConfig {
        test_mode: true,
        ..config
    });
    interp.run(source)?;
    Ok(interp.take_test_summary())
}
