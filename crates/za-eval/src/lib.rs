//! Za call engine and expression evaluator.
//!
//! Executes phrase lists produced by `za-parser`: dispatches statements,
//! manages call frames and loops, and evaluates expressions over the numeric
//! tower.

pub mod builtins;
pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod host;
pub mod ops;
pub mod test_runner;
pub mod vars;

pub use config::RuntimeConfig;
pub use engine::{
    CallMode, CallOutcome, CallRequest, Flow, Frame, Interpreter, IterCursor, LoopContext,
    LoopKind, RunOutcome, ROOT_SPACE,
};
pub use error::{EvalError, EvalResult};
pub use expr::{crush, evaluate, evaluate_str, Env, VarMode};
pub use host::{
    CaptureConsole, CommandOutput, Console, ConsoleInput, Coprocess, Hosts, NoCoprocess,
    NoSubExpression, ShellCoprocess, StdoutConsole, SubExpression,
};
pub use test_runner::{run_tests, AssertMode, TestResult, TestRunSummary, TestSection};
pub use vars::VariableTable;
