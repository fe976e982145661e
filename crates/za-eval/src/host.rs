//! Host collaborators: where output goes, how `|` commands run, and who
//! evaluates the `eval()` sub-language.

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::process::Command;
use std::sync::Arc;

use parking_lot::Mutex;
use za_parser::SpaceId;
use za_types::Value;

/// One line read back from the console.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleInput {
    /// The line without its terminator.
    pub line: String,
    pub eof: bool,
    pub interrupted: bool,
}

impl ConsoleInput {
    pub fn line(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            ..Self::default()
        }
    }

    pub fn eof() -> Self {
        Self {
            eof: true,
            ..Self::default()
        }
    }
}

/// Sink for `print` / `println` output and source of `input()` lines.
pub trait Console: Send {
    fn write(&mut self, text: &str) -> Result<(), String>;

    /// Show `prompt` and read one line. Consoles without input report EOF.
    fn read_line(&mut self, prompt: &str) -> Result<ConsoleInput, String> {
        self.write(prompt)?;
        Ok(ConsoleInput::eof())
    }
}

/// Captured result of an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub code: i32,
}

/// Runs `| command` pass-through lines and the `system()` builtin.
pub trait Coprocess: Send {
    fn run(&mut self, command: &str) -> Result<CommandOutput, String>;
}

/// Evaluates a sub-language string in the scope of a function space.
pub trait SubExpression: Send {
    fn evaluate(&mut self, source: &str, scope: SpaceId) -> Result<Value, String>;
}

/// The collaborators an interpreter is wired to.
pub struct Hosts {
    pub console: Box<dyn Console>,
    pub coprocess: Box<dyn Coprocess>,
    pub subexpr: Box<dyn SubExpression>,
}

impl Default for Hosts {
    fn default() -> Self {
        Self {
            console: Box::new(StdoutConsole),
            coprocess: Box::new(NoCoprocess),
            subexpr: Box::new(NoSubExpression),
        }
    }
}

impl std::fmt::Debug for Hosts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hosts").finish_non_exhaustive()
    }
}

// ── Consoles ─────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn write(&mut self, text: &str) -> Result<(), String> {
        let mut out = std::io::stdout().lock();
        out.write_all(text.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|e| e.to_string())
    }

    fn read_line(&mut self, prompt: &str) -> Result<ConsoleInput, String> {
        self.write(prompt)?;
        let mut line = String::new();
        let read = std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| e.to_string())?;
        if read == 0 {
            return Ok(ConsoleInput::eof());
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        Ok(ConsoleInput::line(trimmed))
    }
}

/// Collects output in memory and answers `read_line` from queued input.
/// Clones share both buffers, so a test can keep one handle and give the
/// other to the interpreter.
#[derive(Debug, Default, Clone)]
pub struct CaptureConsole {
    buffer: Arc<Mutex<String>>,
    input: Arc<Mutex<VecDeque<ConsoleInput>>>,
}

impl CaptureConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue lines to be returned by `read_line`, in order.
    pub fn with_input<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input
            .lock()
            .extend(lines.into_iter().map(ConsoleInput::line));
        self
    }

    pub fn push_input(&self, input: ConsoleInput) {
        self.input.lock().push_back(input);
    }

    pub fn contents(&self) -> String {
        self.buffer.lock().clone()
    }

    pub fn take(&self) -> String {
        std::mem::take(&mut *self.buffer.lock())
    }
}

impl Console for CaptureConsole {
    fn write(&mut self, text: &str) -> Result<(), String> {
        self.buffer.lock().push_str(text);
        Ok(())
    }

    fn read_line(&mut self, prompt: &str) -> Result<ConsoleInput, String> {
        self.write(prompt)?;
        Ok(self.input.lock().pop_front().unwrap_or_else(ConsoleInput::eof))
    }
}

// ── Coprocesses ──────────────────────────────────────────────

/// Refuses every command.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCoprocess;

impl Coprocess for NoCoprocess {
    fn run(&mut self, command: &str) -> Result<CommandOutput, String> {
        Err(format!("no coprocess available to run '{command}'"))
    }
}

/// Runs commands through `sh -c`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellCoprocess;

impl Coprocess for ShellCoprocess {
    fn run(&mut self, command: &str) -> Result<CommandOutput, String> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .map_err(|e| format!("cannot start '{command}': {e}"))?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            code: output.status.code().unwrap_or(-1),
        })
    }
}

// ── Sub-expression evaluators ────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct NoSubExpression;

impl SubExpression for NoSubExpression {
    fn evaluate(&mut self, _source: &str, _scope: SpaceId) -> Result<Value, String> {
        Err("no sub-expression evaluator configured".to_string())
    }
}
