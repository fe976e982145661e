//! Integration tests for the Za call engine.
//!
//! Scripts are run end to end through `Interpreter::run`:
//! - statement dispatch and block structure
//! - multi-level break / continue
//! - user function calls, arity and depth limits
//! - foreach ordering, when clauses, assignment forms
//! - test sections and host collaborators

use pretty_assertions::assert_eq;
use za_eval::{
    CallRequest, CaptureConsole, CommandOutput, Coprocess, EvalError, Interpreter, RuntimeConfig,
};
use za_types::{Value, ValueMap};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn interpreter(config: RuntimeConfig) -> (Interpreter, CaptureConsole) {
    init_tracing();
    let console = CaptureConsole::new();
    let interp = Interpreter::new(config).with_console(console.clone());
    (interp, console)
}

/// Run `source` with the default configuration (panics on error).
fn run(source: &str) -> Interpreter {
    let (mut interp, _) = interpreter(RuntimeConfig::default());
    if let Err(e) = interp.run(source) {
        panic!("run failed: {e}");
    }
    interp
}

fn run_err(source: &str, config: RuntimeConfig) -> EvalError {
    let (mut interp, _) = interpreter(config);
    interp.run(source).expect_err("script should fail")
}

fn int(i: i64) -> Value {
    Value::Int(i)
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements and conditionals
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn if_else_on_one_line() {
    let interp = run(r#"a = 3; b = a + 4; if b > 5; c = "big"; else; c = "small"; endif"#);
    assert_eq!(interp.get("a"), Some(&int(3)));
    assert_eq!(interp.get("b"), Some(&int(7)));
    assert_eq!(interp.get("c"), Some(&Value::from("big")));
}

#[test]
fn else_branch_and_nested_if() {
    let interp = run(
        r#"
x = 1
if x > 5
    r = "big"
else
    if x == 1
        r = "one"
    else
        r = "small"
    endif
endif
"#,
    );
    assert_eq!(interp.get("r"), Some(&Value::from("one")));
}

#[test]
fn overflow_promotes_to_bigint() {
    let interp = run("x = 9223372036854775807 + 1\nk = kind(x)");
    assert_eq!(interp.get("k"), Some(&Value::from("bigi")));
    assert_eq!(
        interp.get("x").map(ToString::to_string),
        Some("9223372036854775808".to_string())
    );
}

#[test]
fn compound_and_element_assignment() {
    let interp = run(
        r#"
n = 10
n -= 3
n *= 2
s = [1, 2, 3]
s[1] = 9
m.k = "v"
m["j"] = 2
"#,
    );
    assert_eq!(interp.get("n"), Some(&int(14)));
    assert_eq!(interp.get("s"), Some(&Value::Seq(vec![int(1), int(9), int(3)])));
    let mut expected = ValueMap::new();
    expected.insert("k".into(), Value::from("v"));
    expected.insert("j".into(), int(2));
    assert_eq!(interp.get("m"), Some(&Value::Map(expected)));
}

#[test]
fn destructuring_from_multiple_returns() {
    let interp = run(
        r#"
def pair()
    return 1, 2
enddef
a, b, c = pair()
"#,
    );
    assert_eq!(interp.get("a"), Some(&int(1)));
    assert_eq!(interp.get("b"), Some(&int(2)));
    assert_eq!(interp.get("c"), Some(&Value::Nil));
}

#[test]
fn unset_removes_binding() {
    let (mut interp, _) = interpreter(RuntimeConfig::default());
    interp.run("x = 1\nunset x").unwrap();
    assert_eq!(interp.get("x"), None);
    let err = interp.run("y = x").unwrap_err();
    assert!(matches!(err.root(), EvalError::UndefinedVariable(n) if n == "x"));
}

#[test]
fn soft_mode_reads_unbound_as_nil() {
    let config = RuntimeConfig {
        strict_variables: false,
        ..RuntimeConfig::default()
    };
    let (mut interp, _) = interpreter(config);
    interp.run("y = nope").unwrap();
    assert_eq!(interp.get("y"), Some(&Value::Nil));
}

#[test]
fn print_and_println_write_to_console() {
    let (mut interp, console) = interpreter(RuntimeConfig::default());
    interp.run("x = 2\nprint \"x=\", x\nprintln \"!\"").unwrap();
    assert_eq!(console.contents(), "x=2!\n");
}

#[test]
fn exit_stops_the_script() {
    let (mut interp, _) = interpreter(RuntimeConfig::default());
    let outcome = interp.run("a = 1\nexit 3\na = 2").unwrap();
    assert_eq!(outcome.exit_code, Some(3));
    assert_eq!(interp.get("a"), Some(&int(1)));
}

#[test]
fn exit_inside_a_function_stops_everything() {
    let (mut interp, _) = interpreter(RuntimeConfig::default());
    let outcome = interp
        .run("def quit()\n    exit 7\nenddef\nquit()\nafter = true")
        .unwrap();
    assert_eq!(outcome.exit_code, Some(7));
    assert_eq!(interp.get("after"), None);
}

// ══════════════════════════════════════════════════════════════════════════════
// Loops
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn for_counts_inclusive_with_step() {
    let interp = run(
        r#"
up = 0
for i = 1 to 10 step 3
    up += i
endfor
down = ""
for j = 3 to 1 step -1
    down = down + string(j)
endfor
"#,
    );
    assert_eq!(interp.get("up"), Some(&int(1 + 4 + 7 + 10)));
    assert_eq!(interp.get("down"), Some(&Value::from("321")));
}

#[test]
fn break_two_leaves_both_loops() {
    let interp = run(
        r#"
count = 0
for i = 1 to 3
    for j = 1 to 3
        count += 1
        if j == 2
            break 2
        endif
    endfor
endfor
"#,
    );
    assert_eq!(interp.get("count"), Some(&int(2)));
    assert_eq!(interp.get("i"), Some(&int(1)));
}

#[test]
fn continue_two_resumes_outer_loop() {
    let interp = run(
        r#"
count = 0
for i = 1 to 3
    for j = 1 to 3
        if j == 2
            continue 2
        endif
        count += 1
    endfor
endfor
"#,
    );
    assert_eq!(interp.get("count"), Some(&int(3)));
    assert_eq!(interp.get("i"), Some(&int(3)));
}

#[test]
fn while_with_break_and_continue() {
    let interp = run(
        r#"
n = 0
odd = 0
while true
    n += 1
    if n > 9
        break
    endif
    if n % 2 == 0
        continue
    endif
    odd += 1
endwhile
"#,
    );
    assert_eq!(interp.get("odd"), Some(&int(5)));
}

#[test]
fn break_deeper_than_loops_is_malformed() {
    let err = run_err("while true\n    break 2\nendwhile", RuntimeConfig::default());
    assert!(matches!(err.root(), EvalError::Malformed(_)), "{err}");
    let err = run_err("break", RuntimeConfig::default());
    assert!(matches!(err.root(), EvalError::Malformed(_)));
}

#[test]
fn foreach_map_in_insertion_order() {
    let interp = run(
        r#"
m = {z: 1, a: 2, m: 3}
out = ""
foreach v in m
    out = out + key_v + "=" + string(v) + ";"
endfor
"#,
    );
    assert_eq!(interp.get("out"), Some(&Value::from("z=1;a=2;m=3;")));
}

#[test]
fn foreach_over_sequence_and_string() {
    let interp = run(
        r#"
total = 0
foreach x in [5, 6, 7]
    total += x * key_x
endfor
chars = 0
foreach c in "héllo"
    chars += 1
endfor
"#,
    );
    assert_eq!(interp.get("total"), Some(&int(6 + 14)));
    assert_eq!(interp.get("chars"), Some(&int(5)));
    assert_eq!(interp.get("c"), Some(&Value::from("o")));
}

#[test]
fn foreach_iterates_a_snapshot() {
    let interp = run(
        r#"
s = [1, 2]
n = 0
foreach x in s
    s[len(s)] = x
    n += 1
endfor
"#,
    );
    assert_eq!(interp.get("n"), Some(&int(2)));
    assert_eq!(
        interp.get("s"),
        Some(&Value::Seq(vec![int(1), int(2), int(1), int(2)]))
    );
}

#[test]
fn loop_limit_is_enforced() {
    let config = RuntimeConfig {
        max_loop_iterations: 100,
        ..RuntimeConfig::default()
    };
    let err = run_err("while true\n    nop\nendwhile", config);
    assert!(matches!(err.root(), EvalError::LoopLimitExceeded(100)));
}

// ══════════════════════════════════════════════════════════════════════════════
// when
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn when_picks_first_matching_clause() {
    let source = |x: &str| {
        format!(
            r#"
x = {x}
when x
is 1, 2
    r = "small"
has x > 3
    r = "big"
or
    r = "other"
endwhen
"#
        )
    };
    assert_eq!(run(&source("2")).get("r"), Some(&Value::from("small")));
    assert_eq!(run(&source("9")).get("r"), Some(&Value::from("big")));
    assert_eq!(run(&source("3")).get("r"), Some(&Value::from("other")));
}

#[test]
fn when_contains_and_nesting() {
    let interp = run(
        r#"
name = "hello world"
when name
contains "world"
    when 1
    is 1
        inner = true
    endwhen
    r = "found"
or
    r = "missing"
endwhen
"#,
    );
    assert_eq!(interp.get("r"), Some(&Value::from("found")));
    assert_eq!(interp.get("inner"), Some(&Value::Bool(true)));
}

// ══════════════════════════════════════════════════════════════════════════════
// Function calls
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn recursion_uses_separate_tables() {
    let interp = run(
        r#"
r = fib(15)
def fib(n)
    if n < 2
        return n
    endif
    return fib(n - 1) + fib(n - 2)
enddef
"#,
    );
    assert_eq!(interp.get("r"), Some(&int(610)));
    assert_eq!(interp.get("n"), None);
}

#[test]
fn variadic_parameters_collect_extras() {
    let interp = run(
        r#"
def sum(first, rest...)
    t = first
    foreach v in rest
        t += v
    endfor
    return t
enddef
a = sum(1)
b = sum(1, 2, 3)
"#,
    );
    assert_eq!(interp.get("a"), Some(&int(1)));
    assert_eq!(interp.get("b"), Some(&int(6)));
}

#[test]
fn arity_mismatch_leaves_caller_untouched() {
    let (mut interp, _) = interpreter(RuntimeConfig::default());
    interp
        .run("def f(a, b)\n    return a + b\nenddef\nx = 1")
        .unwrap();
    let err = interp.run("x = f(1)").unwrap_err();
    assert!(matches!(
        err.root(),
        EvalError::ArityMismatch { expected: 2, got: 1, .. }
    ));
    assert_eq!(interp.get("x"), Some(&int(1)));
    assert_eq!(interp.depth(), 1);
}

#[test]
fn call_depth_is_limited() {
    let config = RuntimeConfig {
        max_call_depth: 20,
        ..RuntimeConfig::default()
    };
    let (mut interp, _) = interpreter(config);
    let err = interp
        .run("def down(n)\n    return down(n + 1)\nenddef\ndown(0)")
        .unwrap_err();
    assert!(matches!(err.root(), EvalError::CallDepthExceeded(20)));
    assert_eq!(interp.depth(), 1);
    interp.run("ok = true").unwrap();
    assert_eq!(interp.get("ok"), Some(&Value::Bool(true)));
}

#[test]
fn return_bindings_copy_into_caller() {
    let (mut interp, _) = interpreter(RuntimeConfig::default());
    interp
        .run("def split(n)\n    return n / 10, n % 10\nenddef")
        .unwrap();
    let id = interp.arena().registry().id_of("split").unwrap();
    let outcome = interp
        .call(
            CallRequest::call(id, vec![int(42)])
                .with_return_bindings(vec!["tens".into(), "ones".into()]),
        )
        .unwrap();
    assert!(outcome.flow.end_func);
    assert_eq!(outcome.returned, vec![int(4), int(2)]);
    assert_eq!(interp.get("tens"), Some(&int(4)));
    assert_eq!(interp.get("ones"), Some(&int(2)));
}

#[test]
fn user_functions_shadow_builtins() {
    let interp = run("def len(x)\n    return 99\nenddef\nn = len(\"abc\")");
    assert_eq!(interp.get("n"), Some(&int(99)));
}

#[test]
fn unfinished_def_leaves_nothing_callable() {
    let (mut interp, _) = interpreter(RuntimeConfig::default());
    let err = interp.run("def f(a)\nreturn a * 2").unwrap_err();
    assert!(matches!(err, EvalError::Parse(_)));

    let err = interp.run("x = f()").unwrap_err();
    assert!(matches!(err.root(), EvalError::UndefinedFunction(n) if n == "f"));
    let err = interp.run("y = f(1)").unwrap_err();
    assert!(matches!(err.root(), EvalError::UndefinedFunction(n) if n == "f"));
    assert_eq!(interp.get("x"), None);

    interp.run("def f(a)\n    return a * 2\nenddef\ny = f(4)").unwrap();
    assert_eq!(interp.get("y"), Some(&int(8)));
}

#[test]
fn failed_chunk_keeps_the_previous_definition() {
    let (mut interp, _) = interpreter(RuntimeConfig::default());
    interp.run("def f()\n    return 1\nenddef").unwrap();
    assert!(interp.run("def f()\n    return 2\nenddef\nz = (").is_err());
    interp.run("r = f()").unwrap();
    assert_eq!(interp.get("r"), Some(&int(1)));
}

#[test]
fn root_space_is_not_callable() {
    let err = run_err("x = 1\ny = main()", RuntimeConfig::default());
    assert!(matches!(err.root(), EvalError::UndefinedFunction(n) if n == "main"));
}

#[test]
fn undefined_function_is_reported() {
    let err = run_err("nothing_here(1)", RuntimeConfig::default());
    assert!(matches!(err.root(), EvalError::UndefinedFunction(n) if n == "nothing_here"));
}

// ══════════════════════════════════════════════════════════════════════════════
// Globals and enumerations
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn functions_read_top_level_variables() {
    let interp = run(
        r#"
limit = 10
items = [4, 5, 6]
conf = {depth: 3}
def peek(i)
    return limit + items[i] + conf.depth
enddef
r = peek(1)
"#,
    );
    assert_eq!(interp.get("r"), Some(&int(18)));
}

#[test]
fn locals_shadow_top_level_variables() {
    let interp = run(
        r#"
n = 1
def f()
    n = 50
    return n
enddef
r = f()
"#,
    );
    assert_eq!(interp.get("r"), Some(&int(50)));
    assert_eq!(interp.get("n"), Some(&int(1)));
}

#[test]
fn setglob_writes_the_top_level() {
    let interp = run(
        r#"
count = 0
def bump(by)
    setglob count += by
    setglob seen[by] = true
    setglob last = by
enddef
bump(2)
bump(3)
"#,
    );
    assert_eq!(interp.get("count"), Some(&int(5)));
    assert_eq!(interp.get("last"), Some(&int(3)));
    assert_eq!(
        interp.get("seen"),
        Some(&Value::Seq(vec![
            Value::Nil,
            Value::Nil,
            Value::Bool(true),
            Value::Bool(true)
        ]))
    );
}

#[test]
fn setglob_needs_an_assignment() {
    let err = run_err("setglob x", RuntimeConfig::default());
    assert!(matches!(err.root(), EvalError::Syntax(_)), "{err}");
}

#[test]
fn enum_members_count_on_from_the_last_value() {
    let interp = run(
        r#"
enum colour(red, green = 5, blue, grey = -2, black)
def pick()
    return colour.blue
enddef
r = colour.red
g = colour.green
b = pick()
k = colour.black
n = len(colour)
"#,
    );
    assert_eq!(interp.get("r"), Some(&int(1)));
    assert_eq!(interp.get("g"), Some(&int(5)));
    assert_eq!(interp.get("b"), Some(&int(6)));
    assert_eq!(interp.get("k"), Some(&int(-1)));
    assert_eq!(interp.get("n"), Some(&int(5)));
    let members: Vec<_> = interp.enumeration("colour").unwrap().keys().cloned().collect();
    assert_eq!(members, vec!["red", "green", "blue", "grey", "black"]);
}

#[test]
fn enum_cannot_count_on_from_a_string() {
    let err = run_err("enum e(a = \"x\", b)", RuntimeConfig::default());
    assert!(matches!(err.root(), EvalError::TypeMismatch(_)), "{err}");
    let err = run_err("enum e()", RuntimeConfig::default());
    assert!(matches!(err.root(), EvalError::Syntax(_)), "{err}");
}

// ══════════════════════════════════════════════════════════════════════════════
// Sessions and errors
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn runs_share_the_root_scope() {
    let (mut interp, _) = interpreter(RuntimeConfig::default());
    interp.run("a = 1").unwrap();
    interp.run("b = a + 1").unwrap();
    assert_eq!(interp.get("b"), Some(&int(2)));
}

#[test]
fn failed_parse_is_discarded() {
    let (mut interp, _) = interpreter(RuntimeConfig::default());
    interp.run("a = 1").unwrap();
    let err = interp.run("b = (1 +").unwrap_err();
    assert!(matches!(err, EvalError::Parse(_)));
    assert_eq!(interp.get("b"), None);
    interp.run("c = a").unwrap();
    assert_eq!(interp.get("c"), Some(&int(1)));
}

#[test]
fn errors_carry_space_and_line() {
    let err = run_err(
        "def boom()\n    x = 1 / 0\nenddef\nboom()",
        RuntimeConfig::default(),
    );
    assert!(matches!(err.root(), EvalError::DivisionByZero));
    let text = err.to_string();
    assert!(text.starts_with("boom:0 (line 2)"), "{text}");
}

#[test]
fn missing_endwhile_is_reported() {
    let err = run_err("while false\n    nop", RuntimeConfig::default());
    assert!(matches!(err, EvalError::Parse(_) | EvalError::At { .. }), "{err}");
}

// ══════════════════════════════════════════════════════════════════════════════
// Hosts
// ══════════════════════════════════════════════════════════════════════════════

struct Canned;

impl Coprocess for Canned {
    fn run(&mut self, command: &str) -> Result<CommandOutput, String> {
        Ok(CommandOutput {
            stdout: format!("ran {command}\n"),
            code: 0,
        })
    }
}

#[test]
fn pass_through_lines_use_the_coprocess() {
    init_tracing();
    let console = CaptureConsole::new();
    let mut interp = Interpreter::new(RuntimeConfig::default())
        .with_console(console.clone())
        .with_coprocess(Canned);
    interp.run("| ls -l\nout = system(\"date\")").unwrap();
    assert_eq!(console.contents(), "ran ls -l\n");
    assert_eq!(interp.get("out"), Some(&Value::from("ran date")));
}

#[test]
fn pass_through_without_coprocess_fails() {
    let err = run_err("| ls", RuntimeConfig::default());
    assert!(matches!(err.root(), EvalError::Host(_)));
}
