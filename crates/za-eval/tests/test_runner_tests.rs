//! Integration tests for `test` … `endtest` sections.

use pretty_assertions::assert_eq;
use za_eval::{run_tests, EvalError, Interpreter, RuntimeConfig};
use za_types::Value;

const SUITE: &str = r#"
x = 2
test "doubles" group "math"
    assert x * 2 == 4
endtest
test "collects" group "math" assert continue
    assert x == 3
    assert x == 4
    reached = true
endtest
test "stops" group "math"
    assert x == 5
    never = true
endtest
test "console" group "io"
    assert false
endtest
done = true
"#;

#[test]
fn sections_record_results() {
    let summary = run_tests(SUITE, RuntimeConfig::default()).unwrap();
    assert_eq!(summary.results.len(), 4);
    assert_eq!(summary.passed, 1);
    assert_eq!(summary.failed, 3);

    let collects = &summary.results[1];
    assert_eq!(collects.name, "collects");
    assert_eq!(collects.failures, vec!["x == 3", "x == 4"]);

    let stops = &summary.results[2];
    assert_eq!(stops.failures, vec!["x == 5"]);
}

#[test]
fn continue_mode_keeps_running_and_fail_mode_stops() {
    let mut interp = Interpreter::new(RuntimeConfig {
        test_mode: true,
        ..RuntimeConfig::default()
    });
    interp.run(SUITE).unwrap();
    assert_eq!(interp.get("reached"), Some(&Value::Bool(true)));
    assert_eq!(interp.get("never"), None);
    assert_eq!(interp.get("done"), Some(&Value::Bool(true)));
}

#[test]
fn group_filter_selects_sections() {
    let config = RuntimeConfig {
        test_group_filter: Some("io".into()),
        ..RuntimeConfig::default()
    };
    let summary = run_tests(SUITE, config).unwrap();
    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.results[0].name, "console");
    assert!(summary.to_string().contains("0 passed, 1 failed"));
}

#[test]
fn sections_are_skipped_outside_test_mode() {
    let mut interp = Interpreter::new(RuntimeConfig::default());
    interp.run(SUITE).unwrap();
    assert!(interp.test_results().is_empty());
    assert_eq!(interp.get("done"), Some(&Value::Bool(true)));
}

#[test]
fn runtime_errors_fail_the_section_only() {
    let summary = run_tests(
        "test \"divides\"\n    y = 1 / 0\nendtest\nafter = 1",
        RuntimeConfig::default(),
    )
    .unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.results[0].failures, vec!["division by zero"]);
}

#[test]
fn assert_outside_a_section_is_an_error() {
    let mut interp = Interpreter::new(RuntimeConfig::default());
    let err = interp.run("assert 1 == 2").unwrap_err();
    assert!(matches!(err.root(), EvalError::AssertionFailed(msg) if msg == "1 == 2"));
}
