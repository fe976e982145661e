//! Phrase parser tests.
//!
//! Covers: statement splitting, bracket line-joining, blank phrases,
//! def/enddef routing, appending at a start index, and parse diagnostics.

use pretty_assertions::assert_eq;
use za_lexer::TokenKind;
use za_parser::{ParseOutcome, Phrase, PhraseParser, SpaceArena};
use za_types::ErrorCode;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn parse(source: &str) -> (SpaceArena, ParseOutcome) {
    let arena = SpaceArena::new();
    let outcome = PhraseParser::new(&arena).parse("main", source, 0);
    (arena, outcome)
}

/// Parse and return the phrases of `main`, panicking on diagnostics.
fn phrases_ok(source: &str) -> Vec<Phrase> {
    let (arena, outcome) = parse(source);
    if outcome.errors.has_errors() {
        for e in &outcome.errors.errors {
            eprintln!("  ERROR: {} ({})", e.message, e.code);
        }
        panic!("unexpected parse errors (see above)");
    }
    arena.lookup("main").expect("main space").phrases.clone()
}

fn texts(phrases: &[Phrase]) -> Vec<&str> {
    phrases.iter().map(|p| p.text.as_str()).collect()
}

fn error_codes(source: &str) -> Vec<ErrorCode> {
    parse(source).1.errors.errors.iter().map(|e| e.code).collect()
}

// ─────────────────────────────────────────────────────────────────────
// Splitting
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_newline_and_semicolon_end_phrases() {
    let p = phrases_ok("a = 1\nb = 2; c = 3");
    assert_eq!(texts(&p), vec!["a = 1", "b = 2", "c = 3"]);
    assert_eq!(p[0].token_count(), 3);
}

#[test]
fn test_phrase_text_excludes_comments() {
    let p = phrases_ok("x = 1   # note\n");
    assert_eq!(texts(&p), vec!["x = 1"]);
}

#[test]
fn test_newline_inside_brackets_joins_lines() {
    let p = phrases_ok("s = [1,\n  2,\n  3]\nprintln s");
    assert_eq!(p.len(), 2);
    assert_eq!(p[0].leading(), Some(TokenKind::Identifier));
    assert!(p[0].tokens.iter().all(|t| t.kind != TokenKind::Eol));
    assert_eq!(p[1].line(), 4);
}

#[test]
fn test_empty_statements_are_blank_phrases() {
    let p = phrases_ok("nop;;;nop");
    assert_eq!(p.len(), 4);
    assert!(!p[0].blank);
    assert!(p[1].blank && p[2].blank);
    assert!(!p[3].blank);
}

#[test]
fn test_trailing_newline_adds_nothing() {
    assert_eq!(phrases_ok("nop\n").len(), 1);
    assert!(phrases_ok("").is_empty());
}

// ─────────────────────────────────────────────────────────────────────
// Function definitions
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_def_body_goes_to_its_own_space() {
    let (arena, out) = parse("def add(a, b)\n  return a + b\nenddef\nx = add(1, 2)");
    assert!(out.is_ok());
    assert_eq!(out.defined.len(), 1);
    let main = arena.lookup("main").unwrap();
    assert_eq!(texts(&main.phrases), vec!["x = add(1, 2)"]);
    let add = arena.lookup("add").unwrap();
    assert_eq!(add.params, vec!["a", "b"]);
    assert_eq!(texts(&add.phrases), vec!["return a + b"]);
}

#[test]
fn test_redefinition_replaces_body() {
    let arena = SpaceArena::new();
    let parser = PhraseParser::new(&arena);
    parser.parse("main", "def f()\nreturn 1\nenddef", 0);
    parser.parse("main", "def f()\nnop\nreturn 2\nenddef", 0);
    assert_eq!(texts(&arena.lookup("f").unwrap().phrases), vec!["nop", "return 2"]);
}

#[test]
fn test_nested_def_is_rejected() {
    let codes = error_codes("def a()\ndef b()\nenddef\nenddef");
    assert!(codes.contains(&ErrorCode::NESTED_DEFINITION));
}

#[test]
fn test_enddef_without_def() {
    assert_eq!(error_codes("enddef"), vec![ErrorCode::UNMATCHED_TERMINATOR]);
}

#[test]
fn test_missing_enddef_is_unterminated() {
    let (arena, out) = parse("def f()\nreturn 1");
    assert!(out.unterminated);
    assert_eq!(out.errors.first().map(|e| e.code), Some(ErrorCode::UNTERMINATED_BLOCK));
    assert!(arena.lookup("f").is_none());
    assert!(out.defined.is_empty());
}

#[test]
fn test_failed_parse_installs_no_definitions() {
    let arena = SpaceArena::new();
    let parser = PhraseParser::new(&arena);
    assert!(parser.parse("main", "def f(a)\nreturn a\nenddef", 0).is_ok());

    let out = parser.parse("main", "def f()\nreturn 0\nenddef\ndef g()\nx = (", 0);
    assert!(!out.is_ok());
    assert!(out.defined.is_empty());
    assert_eq!(arena.lookup("f").unwrap().params, vec!["a"]);
    assert!(arena.lookup("g").is_none());
    assert!(arena.registry().id_of("g").is_some());
}

// ─────────────────────────────────────────────────────────────────────
// Appending & diagnostics
// ─────────────────────────────────────────────────────────────────────

#[test]
fn test_parse_appends_from_start_index() {
    let arena = SpaceArena::new();
    let parser = PhraseParser::new(&arena);
    let first = parser.parse("main", "a = 1\nb = 2", 0);
    assert_eq!(first.phrase_count, 2);
    let second = parser.parse("main", "c = 3", 2);
    assert_eq!(second.phrase_count, 3);
    let redo = parser.parse("main", "z = 0", 1);
    assert_eq!(redo.phrase_count, 2);
    assert_eq!(texts(&arena.lookup("main").unwrap().phrases), vec!["a = 1", "z = 0"]);
}

#[test]
fn test_bad_word_flag() {
    let (_, out) = parse("x = 1 ¬ 2");
    assert!(out.bad_word);
    assert!(!out.is_ok());
}

#[test]
fn test_open_bracket_is_unterminated() {
    let (_, out) = parse("x = foo(1,");
    assert!(out.unterminated);
}

#[test]
fn test_stray_closing_bracket() {
    assert_eq!(error_codes("x = 1)"), vec![ErrorCode::UNBALANCED_BRACKETS]);
}
