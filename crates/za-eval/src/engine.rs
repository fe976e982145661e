//! Call engine: executes the phrases of a function space.
//!
//! Each invocation gets a [`Frame`] holding its own [`VariableTable`] and loop
//! stack. Phrases are dispatched on their leading token; control constructs
//! find their matching terminators with [`lookahead`] and run their bodies
//! through a nested [`Interpreter::exec_block`]. Early exits travel back up as
//! a [`Flow`].

use std::collections::HashMap;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use tracing::{debug, instrument, trace};
use za_lexer::{Token, TokenKind};
use za_parser::{
    if_layout, lookahead, when_clauses, FunctionSpace, Lookahead, PhraseParser, SpaceArena,
    SpaceId,
};
use za_types::{Value, ValueMap};

use crate::builtins;
use crate::config::RuntimeConfig;
use crate::error::{EvalError, EvalResult};
use crate::expr::{self, Env, VarMode};
use crate::host::{Coprocess, Console, Hosts, SubExpression};
use crate::ops::{self, BinOp};
use crate::test_runner::{ActiveTest, AssertMode, TestResult, TestRunSummary, TestSection};
use crate::vars::VariableTable;

/// Name of the space top-level input is parsed into.
pub const ROOT_SPACE: &str = "main";

const LOOP_OPENERS: [TokenKind; 2] = [TokenKind::For, TokenKind::Foreach];

// ══════════════════════════════════════════════════════════════════════════
// Calls
// ══════════════════════════════════════════════════════════════════════════

/// How a [`CallRequest`] enters its function space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// Push a fresh frame and run the space from its first phrase.
    Call,
    /// Continue the innermost frame from `start`, keeping its variables.
    Resume,
}

/// Everything needed to enter a function space.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub mode: CallMode,
    /// Space the call is made from; defaults to the current frame's.
    pub caller: Option<SpaceId>,
    pub callee: SpaceId,
    /// Frame to resume; `None` means the innermost one.
    pub base: Option<u64>,
    pub var_mode: VarMode,
    /// First phrase to execute when resuming.
    pub start: usize,
    pub args: Vec<Value>,
    /// Caller variables that receive the returned values, in order.
    pub return_bindings: Vec<String>,
}

impl CallRequest {
    pub fn call(callee: SpaceId, args: Vec<Value>) -> Self {
        Self {
            mode: CallMode::Call,
            caller: None,
            callee,
            base: None,
            var_mode: VarMode::Strict,
            start: 0,
            args,
            return_bindings: Vec::new(),
        }
    }

    pub fn resume(callee: SpaceId, base: Option<u64>, start: usize) -> Self {
        Self {
            mode: CallMode::Resume,
            base,
            start,
            ..Self::call(callee, Vec::new())
        }
    }

    pub fn from(mut self, caller: SpaceId) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn with_var_mode(mut self, mode: VarMode) -> Self {
        self.var_mode = mode;
        self
    }

    pub fn with_return_bindings(mut self, names: Vec<String>) -> Self {
        self.return_bindings = names;
        self
    }
}

/// Early-exit state carried out of a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flow {
    /// The function finished (`return`, `exit`, or the last phrase ran).
    pub end_func: bool,
    /// Loops still to be broken out of.
    pub break_level: usize,
    /// Loops to unwind before continuing the outermost of them.
    pub continue_level: usize,
}

impl Flow {
    pub fn end() -> Self {
        Self {
            end_func: true,
            ..Self::default()
        }
    }

    pub fn breaking(levels: usize) -> Self {
        Self {
            break_level: levels,
            ..Self::default()
        }
    }

    pub fn continuing(levels: usize) -> Self {
        Self {
            continue_level: levels,
            ..Self::default()
        }
    }

    /// Whether the enclosing block must stop.
    pub fn is_signal(&self) -> bool {
        self.end_func || self.break_level > 0 || self.continue_level > 0
    }
}

/// Result of [`Interpreter::call`].
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub flow: Flow,
    pub returned: Vec<Value>,
}

/// Result of [`Interpreter::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Set when the script executed `exit`.
    pub exit_code: Option<i32>,
    /// Values of a top-level `return`.
    pub returned: Vec<Value>,
}

// ══════════════════════════════════════════════════════════════════════════
// Frames and loops
// ══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    While,
    For,
    Foreach,
}

/// Snapshot iterator behind `foreach`, yielding (key, value) pairs: map keys
/// in insertion order, sequence indices, or string character positions.
#[derive(Debug, Clone)]
pub struct IterCursor {
    pairs: std::vec::IntoIter<(Value, Value)>,
}

impl IterCursor {
    pub fn over(source: &Value) -> EvalResult<Self> {
        let pairs: Vec<(Value, Value)> = match source {
            Value::Map(map) => map
                .iter()
                .map(|(k, v)| (Value::from(k.as_str()), v.clone()))
                .collect(),
            Value::Seq(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (Value::Int(i as i64), v.clone()))
                .collect(),
            Value::Str(s) => s
                .chars()
                .enumerate()
                .map(|(i, c)| (Value::Int(i as i64), Value::Str(c.to_string())))
                .collect(),
            other => {
                return Err(EvalError::type_mismatch(format!(
                    "cannot iterate over {}",
                    other.kind_name()
                )))
            }
        };
        Ok(Self {
            pairs: pairs.into_iter(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.pairs.len()
    }
}

impl Iterator for IterCursor {
    type Item = (Value, Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.pairs.next()
    }
}

/// One active loop in a frame.
#[derive(Debug, Clone)]
pub struct LoopContext {
    pub kind: LoopKind,
    /// Phrase index of the loop header.
    pub header: usize,
    /// Phrase index of the matching `endwhile` / `endfor`.
    pub end: usize,
    pub iterations: u64,
    pub cursor: Option<IterCursor>,
}

/// One active invocation of a function space.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Unique id of this invocation.
    pub base: u64,
    pub caller: Option<SpaceId>,
    pub callee: SpaceId,
    /// Phrases being executed, pinned for the life of the frame.
    pub space: Arc<FunctionSpace>,
    pub vars: VariableTable,
    pub loops: Vec<LoopContext>,
    pub var_mode: VarMode,
    /// Values of the last `return`.
    pub returned: Vec<Value>,
    pub return_bindings: Vec<String>,
}

impl Frame {
    fn new(base: u64, callee: SpaceId, space: Arc<FunctionSpace>, var_mode: VarMode) -> Self {
        Self {
            base,
            caller: None,
            callee,
            space,
            vars: VariableTable::new(),
            loops: Vec::new(),
            var_mode,
            returned: Vec::new(),
            return_bindings: Vec::new(),
        }
    }
}

/// What the block walker does after a phrase.
enum Step {
    Next,
    Jump(usize),
    Signal(Flow),
}

/// What a loop does after one pass of its body.
enum LoopStep {
    Again,
    Break,
    Exit(Flow),
}

/// Which table an assignment writes to.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// The innermost frame.
    Local,
    /// The root frame, for `setglob`.
    Global,
}

/// Assignable place on the left of `=`.
enum Target<'t> {
    Name(&'t str),
    Element(&'t str, &'t [Token]),
    Field(&'t str, &'t str),
}

// ══════════════════════════════════════════════════════════════════════════
// Interpreter
// ══════════════════════════════════════════════════════════════════════════

/// A Za interpreter session.
///
/// The root frame persists across [`run`](Interpreter::run) calls, so
/// variables and functions defined by one chunk of input are visible to the
/// next.
pub struct Interpreter {
    /// Function spaces, shared with any parser feeding this session.
    arena: Arc<SpaceArena>,
    config: RuntimeConfig,
    hosts: Hosts,
    /// Frame of the root space; never popped.
    root: Frame,
    /// Frames of user function calls, innermost last.
    stack: Vec<Frame>,
    next_base: u64,
    exit_code: Option<i32>,
    /// Enumerations by name, members in declaration order.
    enums: HashMap<String, ValueMap>,
    /// Test section currently executing.
    test: Option<ActiveTest>,
    results: Vec<TestResult>,
}

impl Interpreter {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_arena(Arc::new(SpaceArena::new()), config)
    }

    pub fn with_arena(arena: Arc<SpaceArena>, config: RuntimeConfig) -> Self {
        let id = arena.declare(ROOT_SPACE);
        let space = arena
            .get(id)
            .unwrap_or_else(|| Arc::new(FunctionSpace::new(id, ROOT_SPACE)));
        let root = Frame::new(0, id, space, config.var_mode());
        Self {
            arena,
            config,
            hosts: Hosts::default(),
            root,
            stack: Vec::new(),
            next_base: 1,
            exit_code: None,
            enums: HashMap::new(),
            test: None,
            results: Vec::new(),
        }
    }

    pub fn with_console(mut self, console: impl Console + 'static) -> Self {
        self.hosts.console = Box::new(console);
        self
    }

    pub fn with_coprocess(mut self, coprocess: impl Coprocess + 'static) -> Self {
        self.hosts.coprocess = Box::new(coprocess);
        self
    }

    pub fn with_subexpression(mut self, subexpr: impl SubExpression + 'static) -> Self {
        self.hosts.subexpr = Box::new(subexpr);
        self
    }

    pub fn arena(&self) -> &Arc<SpaceArena> {
        &self.arena
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Top-level variables.
    pub fn globals(&self) -> &VariableTable {
        &self.root.vars
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.root.vars.get(name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.root.vars.set(name, value);
    }

    /// Live frames, root first.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        std::iter::once(&self.root).chain(&self.stack)
    }

    pub fn depth(&self) -> usize {
        self.stack.len() + 1
    }

    /// Members of enumeration `name`, in declaration order.
    pub fn enumeration(&self, name: &str) -> Option<&ValueMap> {
        self.enums.get(name)
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Results of the test sections run so far.
    pub fn test_results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn take_test_summary(&mut self) -> TestRunSummary {
        TestRunSummary::from_results(std::mem::take(&mut self.results))
    }

    /// Parse `source` onto the end of the root space and execute it.
    ///
    /// A chunk that fails to parse, or that stops inside a bracket or block,
    /// is discarded before anything runs.
    #[instrument(level = "debug", skip_all, fields(bytes = source.len()))]
    pub fn run(&mut self, source: &str) -> EvalResult<RunOutcome> {
        let root = self.root.callee;
        let start = self.arena.get(root).map_or(0, |s| s.phrases.len());
        let outcome = PhraseParser::new(&self.arena).parse(ROOT_SPACE, source, start);
        if !outcome.is_ok() {
            self.arena.update(root, |s| s.phrases.truncate(start));
            return Err(EvalError::Parse(outcome.errors));
        }

        self.exit_code = None;
        self.stack.clear();
        self.root.loops.clear();
        let request = CallRequest::resume(root, Some(self.root.base), start)
            .with_var_mode(self.config.var_mode());
        let outcome = self.call(request)?;
        Ok(RunOutcome {
            exit_code: self.exit_code,
            returned: outcome.returned,
        })
    }

    /// Enter a function space.
    #[instrument(level = "debug", skip_all, fields(callee = request.callee, mode = ?request.mode))]
    pub fn call(&mut self, request: CallRequest) -> EvalResult<CallOutcome> {
        match request.mode {
            CallMode::Call => self.fresh_call(request),
            CallMode::Resume => self.resume(request),
        }
    }

    fn fresh_call(&mut self, request: CallRequest) -> EvalResult<CallOutcome> {
        let space = self.arena.get(request.callee).ok_or_else(|| {
            EvalError::UndefinedFunction(
                self.arena
                    .name_of(request.callee)
                    .unwrap_or_else(|| format!("#{}", request.callee)),
            )
        })?;
        if self.stack.len() >= self.config.max_call_depth {
            return Err(EvalError::CallDepthExceeded(self.config.max_call_depth));
        }
        let vars = bind_arguments(&space, request.args)?;

        let base = self.next_base;
        self.next_base += 1;
        let caller = request.caller.unwrap_or(self.frame().callee);
        debug!(function = %space.name, base, caller, depth = self.depth(), "call");
        let mut frame = Frame::new(base, space.id, Arc::clone(&space), request.var_mode);
        frame.caller = Some(caller);
        frame.vars = vars;
        frame.return_bindings = request.return_bindings;
        self.stack.push(frame);

        let result = self.exec_block(0, space.phrases.len());
        let frame = self.stack.pop();
        result?;
        let Some(frame) = frame else {
            return Err(EvalError::Malformed("call stack underflow".into()));
        };
        debug!(function = %space.name, base, returned = frame.returned.len(), "return");

        let target = self.frame_mut();
        for (name, value) in frame.return_bindings.iter().zip(&frame.returned) {
            target.vars.set(name, value.clone());
        }
        Ok(CallOutcome {
            flow: Flow::end(),
            returned: frame.returned,
        })
    }

    fn resume(&mut self, request: CallRequest) -> EvalResult<CallOutcome> {
        let space = self.arena.get(request.callee).ok_or_else(|| {
            EvalError::UndefinedFunction(format!("#{}", request.callee))
        })?;
        let frame = self.frame_mut();
        if frame.callee != request.callee || request.base.is_some_and(|b| b != frame.base) {
            return Err(EvalError::Malformed(format!(
                "cannot resume frame {:?} of space #{}: it is not the innermost frame",
                request.base, request.callee
            )));
        }
        frame.space = Arc::clone(&space);
        frame.var_mode = request.var_mode;
        frame.returned.clear();

        let flow = self.exec_block(request.start, space.phrases.len())?;
        let returned = std::mem::take(&mut self.frame_mut().returned);
        Ok(CallOutcome { flow, returned })
    }

    fn frame(&self) -> &Frame {
        self.stack.last().unwrap_or(&self.root)
    }

    fn frame_mut(&mut self) -> &mut Frame {
        match self.stack.last_mut() {
            Some(frame) => frame,
            None => &mut self.root,
        }
    }

    fn eval(&mut self, tokens: &[Token]) -> EvalResult<Value> {
        let mode = self.frame().var_mode;
        expr::evaluate(self, tokens, mode)
    }

    fn eval_list(&mut self, tokens: &[Token]) -> EvalResult<Vec<Value>> {
        let mode = self.frame().var_mode;
        expr::evaluate_list(self, tokens, mode)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Block walking
    // ══════════════════════════════════════════════════════════════════════

    /// Execute phrases `start..stop` of the current frame's space.
    pub fn exec_block(&mut self, start: usize, stop: usize) -> EvalResult<Flow> {
        let space = Arc::clone(&self.frame().space);
        let stop = stop.min(space.phrases.len());
        let mut pc = start;
        while pc < stop {
            let phrase = &space.phrases[pc];
            if phrase.blank {
                pc += 1;
                continue;
            }
            trace!(space = %space.name, pc, text = %phrase.text, "phrase");
            let step = self
                .dispatch(&space, pc)
                .map_err(|e| e.at(&space.name, pc, phrase.line()))?;
            if self.exit_code.is_some() {
                return Ok(Flow::end());
            }
            match step {
                Step::Next => pc += 1,
                Step::Jump(to) => pc = to,
                Step::Signal(flow) => return Ok(flow),
            }
        }
        Ok(Flow::default())
    }

    fn dispatch(&mut self, space: &FunctionSpace, pc: usize) -> EvalResult<Step> {
        let tokens = &space.phrases[pc].tokens[..];
        let Some(lead) = tokens.first() else {
            return Ok(Step::Next);
        };
        let rest = &tokens[1..];
        use TokenKind as K;
        match lead.kind {
            K::Nop | K::EndIf | K::EndWhile | K::EndFor | K::EndWhen | K::EndTest => {
                Ok(Step::Next)
            }
            K::Var => self.declare(rest),
            K::SetGlob => self.set_global(rest),
            K::Enum => self.declare_enum(rest),
            K::If => self.exec_if(space, pc, rest),
            K::Else => match lookahead(
                &space.phrases,
                pc,
                1,
                0,
                K::EndIf,
                &[K::If],
                &[K::EndIf],
            ) {
                Lookahead::Found { position, .. } => Ok(Step::Jump(position + 1)),
                _ => Err(EvalError::Malformed("else without endif".into())),
            },
            K::While => self.exec_while(space, pc, rest),
            K::For => self.exec_for(space, pc, rest),
            K::Foreach => self.exec_foreach(space, pc, rest),
            K::When => self.exec_when(space, pc, rest),
            K::Is | K::Has | K::Contains | K::Or => Err(EvalError::Malformed(format!(
                "'{}' outside when",
                lead.text
            ))),
            K::Break => {
                let levels = self.loop_levels("break", rest)?;
                Ok(Step::Signal(Flow::breaking(levels)))
            }
            K::Continue => {
                let levels = self.loop_levels("continue", rest)?;
                Ok(Step::Signal(Flow::continuing(levels)))
            }
            K::Return => {
                let values = self.eval_list(rest)?;
                self.frame_mut().returned = values;
                Ok(Step::Signal(Flow::end()))
            }
            K::Exit => {
                let code = if rest.is_empty() {
                    0
                } else {
                    let v = self.eval(rest)?;
                    i32::try_from(ops::to_index(&v)?).unwrap_or(i32::MAX)
                };
                debug!(code, "exit");
                self.exit_code = Some(code);
                Ok(Step::Signal(Flow::end()))
            }
            K::Print | K::Println => {
                let mut text: String = self
                    .eval_list(rest)?
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                if lead.kind == K::Println {
                    text.push('\n');
                }
                self.hosts.console.write(&text).map_err(EvalError::Host)?;
                Ok(Step::Next)
            }
            K::Unset => self.unset(rest),
            K::Assert => self.exec_assert(&space.phrases[pc].text, lead, rest),
            K::Test => self.exec_test(space, pc, tokens),
            K::Pipe => self.pass_through(&space.phrases[pc].text),
            K::Def | K::EndDef => Err(EvalError::Malformed(format!(
                "'{}' is only valid at the top level",
                lead.text
            ))),
            _ => self.exec_statement(tokens),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Simple statements
    // ══════════════════════════════════════════════════════════════════════

    /// `var a [, b …] [type]`: bind each name to the type's zero value.
    fn declare(&mut self, rest: &[Token]) -> EvalResult<Step> {
        let (names, kind) = match rest.last() {
            Some(t) if t.kind.is_type_name() => (&rest[..rest.len() - 1], Some(t.kind)),
            _ => (rest, None),
        };
        let names = identifier_list("var", names)?;
        let zero = zero_value(kind);
        let frame = self.frame_mut();
        for name in names {
            frame.vars.set(name, zero.clone());
        }
        Ok(Step::Next)
    }

    /// `setglob target = expr`: assign into the root frame from any depth.
    fn set_global(&mut self, rest: &[Token]) -> EvalResult<Step> {
        let Some(at) = assignment_split(rest) else {
            return Err(EvalError::Syntax("expected: setglob name = value".into()));
        };
        self.assign_to(&rest[..at], rest[at].kind, &rest[at + 1..], Scope::Global)?;
        Ok(Step::Next)
    }

    /// `enum name(a, b = 5, c)`: members without a value take the previous
    /// value plus one, counting from 1.
    fn declare_enum(&mut self, rest: &[Token]) -> EvalResult<Step> {
        let malformed =
            || EvalError::Syntax("expected: enum name(member [= constant], ...)".into());
        let (name, members) = match rest {
            [name, open, members @ .., close]
                if name.kind == TokenKind::Identifier
                    && open.kind == TokenKind::LParen
                    && close.kind == TokenKind::RParen
                    && !members.is_empty() =>
            {
                (name.text.as_str(), members)
            }
            _ => return Err(malformed()),
        };

        let mut table = ValueMap::new();
        let mut next = Value::Int(0);
        for member in split_commas(members) {
            let (label, value) = match member {
                [label] if label.kind == TokenKind::Identifier => {
                    if !next.is_numeric() {
                        return Err(EvalError::type_mismatch(format!(
                            "cannot count on from {} value in enum '{name}'",
                            next.kind_name()
                        )));
                    }
                    (label, ops::binary(BinOp::Add, &next, &Value::Int(1))?)
                }
                [label, assign, constant]
                    if label.kind == TokenKind::Identifier
                        && assign.kind == TokenKind::Assign
                        && constant.kind.is_literal() =>
                {
                    (label, constant.value.clone().unwrap_or(Value::Nil))
                }
                _ => return Err(malformed()),
            };
            next = value.clone();
            table.insert(label.text.clone(), value);
        }
        debug!(name, members = table.len(), "enum");
        self.enums.insert(name.to_string(), table);
        Ok(Step::Next)
    }

    fn unset(&mut self, rest: &[Token]) -> EvalResult<Step> {
        for name in identifier_list("unset", rest)? {
            if self.frame_mut().vars.unset(name).is_none() {
                return Err(EvalError::UndefinedVariable(name.to_string()));
            }
        }
        Ok(Step::Next)
    }

    fn exec_assert(&mut self, text: &str, lead: &Token, rest: &[Token]) -> EvalResult<Step> {
        if ops::truthy(&self.eval(rest)?)? {
            return Ok(Step::Next);
        }
        let what = text.get(lead.text.len()..).unwrap_or(text).trim().to_string();
        match self.test.as_mut() {
            Some(active) if active.section.mode == AssertMode::Continue => {
                debug!(test = %active.section.name, assertion = %what, "assertion failed");
                active.failures.push(what);
                Ok(Step::Next)
            }
            _ => Err(EvalError::AssertionFailed(what)),
        }
    }

    /// `| command`: run through the coprocess and print what it wrote.
    fn pass_through(&mut self, text: &str) -> EvalResult<Step> {
        let command = text.trim_start().trim_start_matches('|').trim();
        let out = self.hosts.coprocess.run(command).map_err(EvalError::Host)?;
        debug!(command, code = out.code, "coprocess");
        self.hosts
            .console
            .write(&out.stdout)
            .map_err(EvalError::Host)?;
        Ok(Step::Next)
    }

    /// Assignment, or an expression evaluated for its effects.
    fn exec_statement(&mut self, tokens: &[Token]) -> EvalResult<Step> {
        match assignment_split(tokens) {
            Some(at) => {
                self.assign_to(&tokens[..at], tokens[at].kind, &tokens[at + 1..], Scope::Local)?
            }
            None => {
                self.eval(tokens)?;
            }
        }
        Ok(Step::Next)
    }

    fn assign_to(
        &mut self,
        lhs: &[Token],
        op: TokenKind,
        rhs: &[Token],
        scope: Scope,
    ) -> EvalResult<()> {
        if rhs.is_empty() {
            return Err(EvalError::Syntax("missing value after assignment".into()));
        }
        let value = self.eval(rhs)?;
        let targets = split_commas(lhs)
            .into_iter()
            .map(parse_target)
            .collect::<EvalResult<Vec<_>>>()?;

        if targets.len() > 1 {
            if op != TokenKind::Assign {
                return Err(EvalError::Syntax(
                    "compound assignment takes a single target".into(),
                ));
            }
            let items = match value {
                Value::Seq(items) => items,
                other => {
                    return Err(EvalError::type_mismatch(format!(
                        "cannot unpack {} into {} names",
                        other.kind_name(),
                        targets.len()
                    )))
                }
            };
            let mut items = items.into_iter();
            for target in &targets {
                self.store(target, items.next().unwrap_or(Value::Nil), scope)?;
            }
            return Ok(());
        }

        let Some(target) = targets.first() else {
            return Err(EvalError::Syntax("assignment needs a target".into()));
        };
        let value = match BinOp::from_compound(op) {
            Some(bop) => {
                let current = self.load(target, scope)?;
                ops::binary(bop, &current, &value)?
            }
            None => value,
        };
        self.store(target, value, scope)
    }

    fn vars(&self, scope: Scope) -> &VariableTable {
        match scope {
            Scope::Local => &self.frame().vars,
            Scope::Global => &self.root.vars,
        }
    }

    fn vars_mut(&mut self, scope: Scope) -> &mut VariableTable {
        match scope {
            Scope::Local => &mut self.frame_mut().vars,
            Scope::Global => &mut self.root.vars,
        }
    }

    fn load(&mut self, target: &Target<'_>, scope: Scope) -> EvalResult<Value> {
        match *target {
            Target::Name(name) => self
                .vars(scope)
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UndefinedVariable(name.to_string())),
            Target::Element(name, key) => {
                let key = self.eval(key)?;
                self.vars(scope).get_element(name, &key)
            }
            Target::Field(name, field) => self.vars(scope).get_element(name, &Value::from(field)),
        }
    }

    fn store(&mut self, target: &Target<'_>, value: Value, scope: Scope) -> EvalResult<()> {
        match *target {
            Target::Name(name) => {
                self.vars_mut(scope).set(name, value);
                Ok(())
            }
            Target::Element(name, key) => {
                let key = self.eval(key)?;
                self.vars_mut(scope).set_element(name, &key, value)
            }
            Target::Field(name, field) => {
                self.vars_mut(scope).set_element(name, &Value::from(field), value)
            }
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Conditionals
    // ══════════════════════════════════════════════════════════════════════

    fn exec_if(&mut self, space: &FunctionSpace, pc: usize, cond: &[Token]) -> EvalResult<Step> {
        if ops::truthy(&self.eval(cond)?)? {
            return Ok(Step::Next);
        }
        let layout = if_layout(&space.phrases, pc)
            .ok_or_else(|| EvalError::Malformed("if without endif".into()))?;
        Ok(Step::Jump(layout.else_at.unwrap_or(layout.endif_at) + 1))
    }

    /// `when subject` … `is` / `has` / `contains` / `or` clauses … `endwhen`.
    /// The first matching clause runs; the rest are skipped.
    fn exec_when(&mut self, space: &FunctionSpace, pc: usize, rest: &[Token]) -> EvalResult<Step> {
        let subject = self.eval(rest)?;
        let end = block_end(space, pc, TokenKind::EndWhen, &[TokenKind::When])?;
        let clauses = when_clauses(&space.phrases, pc, end);
        for (i, &at) in clauses.iter().enumerate() {
            let Some((lead, args)) = space.phrases[at].tokens.split_first() else {
                continue;
            };
            let matched = match lead.kind {
                TokenKind::Is => self
                    .eval_list(args)?
                    .iter()
                    .any(|v| ops::loosely_equal(&subject, v)),
                TokenKind::Has => ops::truthy(&self.eval(args)?)?,
                TokenKind::Contains => {
                    let needle = self.eval(args)?;
                    match &subject {
                        Value::Str(s) => s.contains(&needle.to_string()),
                        Value::Seq(_) | Value::Map(_) => ops::contains(&subject, &needle)?,
                        _ => false,
                    }
                }
                _ => true,
            };
            if matched {
                let body_end = clauses.get(i + 1).copied().unwrap_or(end);
                let flow = self.exec_block(at + 1, body_end)?;
                if flow.is_signal() {
                    return Ok(Step::Signal(flow));
                }
                break;
            }
        }
        Ok(Step::Jump(end + 1))
    }

    // ══════════════════════════════════════════════════════════════════════
    // Loops
    // ══════════════════════════════════════════════════════════════════════

    fn exec_while(&mut self, space: &FunctionSpace, pc: usize, cond: &[Token]) -> EvalResult<Step> {
        let end = block_end(space, pc, TokenKind::EndWhile, &[TokenKind::While])?;
        self.enter_loop(LoopKind::While, pc, end, None);
        let result = self.while_passes(cond, pc, end);
        self.leave_loop();
        finish_loop(result, end)
    }

    fn while_passes(&mut self, cond: &[Token], pc: usize, end: usize) -> EvalResult<Option<Flow>> {
        while ops::truthy(&self.eval(cond)?)? {
            match self.pass(pc + 1, end)? {
                LoopStep::Again => {}
                LoopStep::Break => break,
                LoopStep::Exit(flow) => return Ok(Some(flow)),
            }
        }
        Ok(None)
    }

    /// `for i = a to b [step s]`, inclusive of `b`.
    fn exec_for(&mut self, space: &FunctionSpace, pc: usize, rest: &[Token]) -> EvalResult<Step> {
        let end = block_end(space, pc, TokenKind::EndFor, &LOOP_OPENERS)?;
        let header_error =
            || EvalError::Syntax("expected: for name = start to end [step n]".into());
        let name = match rest {
            [n, eq, ..] if n.kind == TokenKind::Identifier && eq.kind == TokenKind::Assign => {
                n.text.as_str()
            }
            _ => return Err(header_error()),
        };
        let mode = self.frame().var_mode;
        let (from, at) = expr::crush(self, rest, 2, mode)?;
        if rest.get(at).map(|t| t.kind) != Some(TokenKind::To) {
            return Err(header_error());
        }
        let (to, at) = expr::crush(self, rest, at + 1, mode)?;
        let step = match rest.get(at).map(|t| t.kind) {
            None => Value::Int(1),
            Some(TokenKind::Step) => {
                let (step, at) = expr::crush(self, rest, at + 1, mode)?;
                if at != rest.len() {
                    return Err(header_error());
                }
                step
            }
            Some(_) => return Err(header_error()),
        };
        let (from, to, step) = (
            ops::to_index(&from)?,
            ops::to_index(&to)?,
            ops::to_index(&step)?,
        );
        if step == 0 {
            return Err(EvalError::Malformed("for step cannot be zero".into()));
        }

        debug!(var = name, from, to, step, "for");
        self.enter_loop(LoopKind::For, pc, end, None);
        let result = self.for_passes(name, (from, to, step), pc, end);
        self.leave_loop();
        finish_loop(result, end)
    }

    fn for_passes(
        &mut self,
        name: &str,
        (from, to, step): (i64, i64, i64),
        pc: usize,
        end: usize,
    ) -> EvalResult<Option<Flow>> {
        let mut i = from;
        while (step > 0 && i <= to) || (step < 0 && i >= to) {
            self.frame_mut().vars.set(name, Value::Int(i));
            match self.pass(pc + 1, end)? {
                LoopStep::Again => {}
                LoopStep::Break => break,
                LoopStep::Exit(flow) => return Ok(Some(flow)),
            }
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
        Ok(None)
    }

    /// `foreach v in expr`: binds `v` to each value and `key_v` to its key.
    fn exec_foreach(
        &mut self,
        space: &FunctionSpace,
        pc: usize,
        rest: &[Token],
    ) -> EvalResult<Step> {
        let end = block_end(space, pc, TokenKind::EndFor, &LOOP_OPENERS)?;
        let name = match rest {
            [n, kw, source @ ..]
                if n.kind == TokenKind::Identifier
                    && kw.kind == TokenKind::In
                    && !source.is_empty() =>
            {
                n.text.as_str()
            }
            _ => {
                return Err(EvalError::Syntax(
                    "expected: foreach name in expression".into(),
                ))
            }
        };
        let source = self.eval(&rest[2..])?;
        let cursor = IterCursor::over(&source)?;
        debug!(var = name, items = cursor.remaining(), "foreach");
        self.enter_loop(LoopKind::Foreach, pc, end, Some(cursor));
        let result = self.foreach_passes(name, pc, end);
        self.leave_loop();
        finish_loop(result, end)
    }

    fn foreach_passes(&mut self, name: &str, pc: usize, end: usize) -> EvalResult<Option<Flow>> {
        let key_name = format!("key_{name}");
        loop {
            let next = self
                .frame_mut()
                .loops
                .last_mut()
                .and_then(|ctx| ctx.cursor.as_mut())
                .and_then(Iterator::next);
            let Some((key, value)) = next else {
                return Ok(None);
            };
            let vars = &mut self.frame_mut().vars;
            vars.set(&key_name, key);
            vars.set(name, value);
            match self.pass(pc + 1, end)? {
                LoopStep::Again => {}
                LoopStep::Break => return Ok(None),
                LoopStep::Exit(flow) => return Ok(Some(flow)),
            }
        }
    }

    fn enter_loop(
        &mut self,
        kind: LoopKind,
        header: usize,
        end: usize,
        cursor: Option<IterCursor>,
    ) {
        self.frame_mut().loops.push(LoopContext {
            kind,
            header,
            end,
            iterations: 0,
            cursor,
        });
    }

    fn leave_loop(&mut self) {
        if let Some(ctx) = self.frame_mut().loops.pop() {
            trace!(kind = ?ctx.kind, header = ctx.header, iterations = ctx.iterations, "loop done");
        }
    }

    /// Run the body of the innermost loop once.
    fn pass(&mut self, body: usize, end: usize) -> EvalResult<LoopStep> {
        let limit = self.config.max_loop_iterations;
        if let Some(ctx) = self.frame_mut().loops.last_mut() {
            ctx.iterations += 1;
            if limit > 0 && ctx.iterations > limit {
                return Err(EvalError::LoopLimitExceeded(limit));
            }
        }
        let flow = self.exec_block(body, end)?;
        Ok(if flow.end_func {
            LoopStep::Exit(flow)
        } else if flow.break_level == 1 {
            LoopStep::Break
        } else if flow.break_level > 1 {
            debug!(remaining = flow.break_level - 1, "break outward");
            LoopStep::Exit(Flow::breaking(flow.break_level - 1))
        } else if flow.continue_level > 1 {
            debug!(remaining = flow.continue_level - 1, "continue outward");
            LoopStep::Exit(Flow::continuing(flow.continue_level - 1))
        } else {
            LoopStep::Again
        })
    }

    /// Levels named by `break [n]` / `continue [n]`, checked against the
    /// loops open in this frame.
    fn loop_levels(&mut self, what: &str, rest: &[Token]) -> EvalResult<usize> {
        let depth = self.frame().loops.len();
        let levels = if rest.is_empty() {
            1
        } else {
            let v = self.eval(rest)?;
            ops::to_index(&v)?
        };
        if depth == 0 {
            return Err(EvalError::Malformed(format!("'{what}' outside a loop")));
        }
        match usize::try_from(levels) {
            Ok(n) if (1..=depth).contains(&n) => Ok(n),
            _ => Err(EvalError::Malformed(format!(
                "'{what} {levels}' with {depth} enclosing loop(s)"
            ))),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Test sections
    // ══════════════════════════════════════════════════════════════════════

    fn exec_test(
        &mut self,
        space: &FunctionSpace,
        pc: usize,
        tokens: &[Token],
    ) -> EvalResult<Step> {
        let end = block_end(space, pc, TokenKind::EndTest, &[TokenKind::Test])?;
        let section = TestSection::parse(tokens)?;
        if !self.config.test_mode || !self.config.runs_group(&section.group) {
            return Ok(Step::Jump(end + 1));
        }
        if self.test.is_some() {
            return Err(EvalError::Malformed("test sections cannot nest".into()));
        }

        debug!(test = %section.name, group = %section.group, "test start");
        self.test = Some(ActiveTest::new(section));
        let loops = self.frame().loops.len();
        let result = self.exec_block(pc + 1, end);
        self.frame_mut().loops.truncate(loops);
        let Some(active) = self.test.take() else {
            return Err(EvalError::Malformed("test section lost".into()));
        };
        let (flow, outcome) = match result {
            Ok(flow) => (flow, active.finish(None)),
            Err(e) => (Flow::default(), active.finish(Some(&e))),
        };
        debug!(test = %outcome.name, passed = outcome.passed, "test end");
        self.results.push(outcome);
        Ok(if flow.is_signal() {
            Step::Signal(flow)
        } else {
            Step::Jump(end + 1)
        })
    }
}

/// Reads resolve in the innermost frame, then the root frame, then the
/// enumerations.
impl Env for Interpreter {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.frame()
            .vars
            .get(name)
            .or_else(|| self.root.vars.get(name))
            .cloned()
            .or_else(|| self.enums.get(name).cloned().map(Value::Map))
    }

    fn lookup_element(&self, name: &str, key: &Value) -> Option<EvalResult<Value>> {
        for vars in [&self.frame().vars, &self.root.vars] {
            if vars.contains(name) {
                return Some(vars.get_element(name, key));
            }
        }
        let members = self.enums.get(name)?;
        Some(Ok(members.get(&ops::key_string(key)).cloned().unwrap_or(Value::Nil)))
    }

    fn assign(&mut self, name: &str, value: Value) -> EvalResult<()> {
        self.frame_mut().vars.set(name, value);
        Ok(())
    }

    /// User functions first, then builtins. Several returned values come back
    /// as a sequence, none as `nil`. The root space is not callable.
    fn call_function(&mut self, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        let scope = self.frame().callee;
        let user = self
            .arena
            .registry()
            .id_of(name)
            .filter(|&id| name != ROOT_SPACE && self.arena.get(id).is_some());
        if let Some(id) = user {
            let request = CallRequest::call(id, args)
                .from(scope)
                .with_var_mode(self.config.var_mode());
            let mut returned = self.call(request)?.returned;
            return Ok(match returned.len() {
                0 => Value::Nil,
                1 => returned.remove(0),
                _ => Value::Seq(returned),
            });
        }
        builtins::call(name, args, &mut self.hosts, scope)
            .unwrap_or_else(|| Err(EvalError::UndefinedFunction(name.to_string())))
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════

fn bind_arguments(space: &FunctionSpace, args: Vec<Value>) -> EvalResult<VariableTable> {
    let declared = space.params.len();
    let fixed = if space.variadic {
        declared.saturating_sub(1)
    } else {
        declared
    };
    let accepted = if space.variadic {
        args.len() >= fixed
    } else {
        args.len() == fixed
    };
    if !accepted {
        return Err(EvalError::ArityMismatch {
            name: space.name.clone(),
            expected: fixed,
            got: args.len(),
        });
    }

    let mut vars = VariableTable::with_capacity(declared);
    let mut args = args.into_iter();
    for name in &space.params[..fixed] {
        vars.set(name, args.next().unwrap_or(Value::Nil));
    }
    if space.variadic {
        if let Some(rest) = space.params.last() {
            vars.set(rest, Value::Seq(args.collect()));
        }
    }
    Ok(vars)
}

/// Position of the terminator closing the block opened at `pc`.
fn block_end(
    space: &FunctionSpace,
    pc: usize,
    term: TokenKind,
    openers: &[TokenKind],
) -> EvalResult<usize> {
    match lookahead(&space.phrases, pc, 0, 0, term, openers, &[term]) {
        Lookahead::Found { position, .. } => Ok(position),
        _ => Err(EvalError::Malformed(format!("missing '{term}'"))),
    }
}

fn finish_loop(result: EvalResult<Option<Flow>>, end: usize) -> EvalResult<Step> {
    Ok(match result? {
        Some(flow) => Step::Signal(flow),
        None => Step::Jump(end + 1),
    })
}

fn zero_value(kind: Option<TokenKind>) -> Value {
    match kind {
        Some(TokenKind::KwInt) => Value::Int(0),
        Some(TokenKind::KwUint) => Value::Uint(0),
        Some(TokenKind::KwFloat) => Value::F64(0.0),
        Some(TokenKind::KwBigi) => Value::BigInt(BigInt::from(0)),
        Some(TokenKind::KwBigf) => Value::BigFloat(BigDecimal::from(0)),
        Some(TokenKind::KwString) => Value::Str(String::new()),
        Some(TokenKind::KwBool) => Value::Bool(false),
        Some(TokenKind::KwArray) => Value::Seq(Vec::new()),
        Some(TokenKind::KwMap) => Value::Map(ValueMap::new()),
        _ => Value::Nil,
    }
}

/// `a, b, c` as names.
fn identifier_list<'t>(what: &str, tokens: &'t [Token]) -> EvalResult<Vec<&'t str>> {
    let names = split_commas(tokens)
        .into_iter()
        .map(|part| match part {
            [t] if t.kind == TokenKind::Identifier => Ok(t.text.as_str()),
            _ => Err(EvalError::Syntax(format!("'{what}' expects variable names"))),
        })
        .collect::<EvalResult<Vec<_>>>()?;
    if names.is_empty() {
        return Err(EvalError::Syntax(format!("'{what}' expects variable names")));
    }
    Ok(names)
}

/// Split on commas outside brackets. An empty input gives no parts.
fn split_commas(tokens: &[Token]) -> Vec<&[Token]> {
    if tokens.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut from = 0;
    for (i, t) in tokens.iter().enumerate() {
        match t.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                depth = depth.saturating_sub(1)
            }
            TokenKind::Comma if depth == 0 => {
                parts.push(&tokens[from..i]);
                from = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&tokens[from..]);
    parts
}

/// Index of the first assignment operator outside brackets.
fn assignment_split(tokens: &[Token]) -> Option<usize> {
    let mut depth = 0usize;
    for (i, t) in tokens.iter().enumerate() {
        match t.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                depth = depth.saturating_sub(1)
            }
            k if depth == 0 && k.is_assignment() => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_target(tokens: &[Token]) -> EvalResult<Target<'_>> {
    use TokenKind::*;
    match tokens {
        [name] if name.kind == Identifier => Ok(Target::Name(&name.text)),
        [name, dot, field]
            if name.kind == Identifier && dot.kind == Dot && field.kind == Identifier =>
        {
            Ok(Target::Field(&name.text, &field.text))
        }
        [name, open, key @ .., close]
            if name.kind == Identifier
                && open.kind == LBracket
                && close.kind == RBracket
                && !key.is_empty() =>
        {
            Ok(Target::Element(&name.text, key))
        }
        _ => {
            let text: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
            Err(EvalError::Syntax(format!(
                "cannot assign to '{}'",
                text.join(" ")
            )))
        }
    }
}
