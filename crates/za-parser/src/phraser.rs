//! Phrase parser: splits a token stream into statements.
//!
//! Statements end at a newline or `;` outside brackets; a newline inside
//! `()`, `[]` or `{}` joins the lines. `def name(params)` … `enddef` bodies are
//! routed into their own function space as they are read, so a script can call
//! a function defined further down.
//!
//! Block keywords are checked for balance per function space: a terminator
//! with no matching opener is an error, and so is an opener still unclosed at
//! `enddef` or at the end of input.

use tracing::debug;
use za_lexer::{Lexed, Lexer, Token, TokenKind};
use za_types::{ErrorCode, ErrorList, SourceFile, Span, ZaError};

use crate::registry::SpaceId;
use crate::space::{FunctionSpace, Phrase, SpaceArena};

/// Result of one [`PhraseParser::parse`] call.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    /// The function space the input was appended to.
    pub space: SpaceId,
    /// Phrases in that space after the parse.
    pub phrase_count: usize,
    /// Function spaces filled in by `def` blocks in this input. Empty when
    /// the parse failed: definitions are only installed from a clean parse.
    pub defined: Vec<SpaceId>,
    /// An unrecognised word or character was met.
    pub bad_word: bool,
    /// Input ended inside brackets or a `def` body; more input would complete it.
    pub unterminated: bool,
    pub errors: ErrorList,
}

impl ParseOutcome {
    pub fn is_ok(&self) -> bool {
        !self.bad_word && !self.unterminated && !self.errors.has_errors()
    }
}

/// Splits source text into phrases and stores them in a [`SpaceArena`].
pub struct PhraseParser<'a> {
    arena: &'a SpaceArena,
}

struct OpenDef {
    id: SpaceId,
    name: String,
    params: Vec<String>,
    variadic: bool,
    phrases: Vec<Phrase>,
    blocks: Vec<(TokenKind, Span)>,
    span: Span,
}

/// Per-call parse state.
struct Collector<'a, 's> {
    arena: &'a SpaceArena,
    source_file: &'s SourceFile,
    phrases: Vec<Phrase>,
    /// Open block keywords at the top level.
    blocks: Vec<(TokenKind, Span)>,
    open_def: Option<OpenDef>,
    /// Completed `def` bodies, installed once the whole input is accepted.
    defined: Vec<FunctionSpace>,
    errors: ErrorList,
    bad_word: bool,
    unterminated: bool,
}

impl<'a> PhraseParser<'a> {
    pub fn new(arena: &'a SpaceArena) -> Self {
        Self { arena }
    }

    /// Parse `input` into the function space called `space_name`.
    ///
    /// Phrases are stored from index `start` on; anything the space held at
    /// or past `start` is replaced.
    pub fn parse(&self, space_name: &str, input: &str, start: usize) -> ParseOutcome {
        let space = self.arena.declare(space_name);
        let source_file = SourceFile::new(space_name, input);
        let mut c = Collector {
            arena: self.arena,
            source_file: &source_file,
            phrases: Vec::new(),
            blocks: Vec::new(),
            open_def: None,
            defined: Vec::new(),
            errors: ErrorList::empty(),
            bad_word: false,
            unterminated: false,
        };

        let mut lexer = Lexer::new(&source_file);
        let mut tokens: Vec<Token> = Vec::new();
        let mut depth = 0usize;
        let mut text_start = 0;
        let mut text_end = 0;
        loop {
            let Lexed {
                token,
                next,
                eol,
                eof,
            } = lexer.next_token();
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    if depth == 0 {
                        c.error(
                            ErrorCode::UNBALANCED_BRACKETS,
                            format!("unmatched '{}'", token.text),
                            token.span,
                        );
                    } else {
                        depth -= 1;
                    }
                }
                TokenKind::Error => c.bad_word = true,
                _ => {}
            }

            if eof {
                if depth > 0 {
                    c.unterminated = true;
                    c.error(
                        ErrorCode::UNBALANCED_BRACKETS,
                        "input ended inside brackets",
                        token.span,
                    );
                }
                if !tokens.is_empty() {
                    let text = input[text_start..text_end].trim().to_string();
                    c.emit(std::mem::take(&mut tokens), text, token.span);
                }
                break;
            }
            if eol {
                if depth == 0 {
                    let text = input[text_start..text_end].trim().to_string();
                    c.emit(std::mem::take(&mut tokens), text, token.span);
                    text_start = next;
                    text_end = next;
                    continue;
                }
                if token.kind == TokenKind::Eol {
                    // line continuation inside brackets
                    continue;
                }
            }
            tokens.push(token);
            text_end = next;
        }

        for e in &lexer.errors().errors {
            c.errors.push_error(e.clone());
        }
        let open = std::mem::take(&mut c.blocks);
        if !open.is_empty() {
            c.unterminated = true;
            c.unclosed_blocks(open);
        }
        if let Some(def) = c.open_def.take() {
            c.unterminated = true;
            c.error(
                ErrorCode::UNTERMINATED_BLOCK,
                format!("missing enddef for '{}'", def.name),
                def.span,
            );
        }

        let defined = std::mem::take(&mut c.defined);
        let accepted = !c.bad_word && !c.unterminated && !c.errors.has_errors();
        let defined: Vec<SpaceId> = if accepted {
            defined
                .into_iter()
                .map(|f| {
                    let id = f.id;
                    self.arena.define(f);
                    id
                })
                .collect()
        } else {
            Vec::new()
        };

        let phrases = std::mem::take(&mut c.phrases);
        let phrase_count = self
            .arena
            .update(space, |s| {
                s.phrases.truncate(start);
                s.phrases.extend(phrases);
                s.phrases.len()
            })
            .unwrap_or(0);
        debug!(
            space = space_name,
            phrases = phrase_count,
            defined = defined.len(),
            errors = c.errors.total_errors,
            "parsed"
        );

        ParseOutcome {
            space,
            phrase_count,
            defined,
            bad_word: c.bad_word,
            unterminated: c.unterminated,
            errors: c.errors,
        }
    }
}

impl Collector<'_, '_> {
    fn error(&mut self, code: ErrorCode, message: impl Into<String>, span: Span) {
        let source_line = self
            .source_file
            .line(span.start_line)
            .unwrap_or("")
            .to_string();
        self.errors.push_error(ZaError::new(
            self.source_file.name.clone(),
            code,
            message,
            span,
            source_line,
        ));
    }

    fn sink(&mut self) -> &mut Vec<Phrase> {
        match self.open_def.as_mut() {
            Some(def) => &mut def.phrases,
            None => &mut self.phrases,
        }
    }

    /// Store one finished statement. `end` is the span of its terminator.
    fn emit(&mut self, tokens: Vec<Token>, text: String, end: Span) {
        let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
            self.sink().push(Phrase::blank(end));
            return;
        };
        let span = first.span.merge(last.span);
        match first.kind {
            TokenKind::Def => self.open_definition(&tokens, span),
            TokenKind::EndDef => self.close_definition(span),
            kind => {
                self.check_block(kind, span);
                self.sink().push(Phrase::new(text, tokens, span));
            }
        }
    }

    fn blocks(&mut self) -> &mut Vec<(TokenKind, Span)> {
        match self.open_def.as_mut() {
            Some(def) => &mut def.blocks,
            None => &mut self.blocks,
        }
    }

    fn check_block(&mut self, kind: TokenKind, span: Span) {
        if opens_block(kind) {
            self.blocks().push((kind, span));
            return;
        }
        let Some(openers) = closes_block(kind) else {
            return;
        };
        let top = self.blocks().last().map(|&(open, _)| open);
        match top {
            Some(open) if openers.contains(&open) => {
                self.blocks().pop();
            }
            Some(open) => {
                let msg = format!("'{kind}' does not close the open '{open}'");
                self.error(ErrorCode::UNMATCHED_TERMINATOR, msg, span);
            }
            None => {
                let msg = format!("'{kind}' without a matching opener");
                self.error(ErrorCode::UNMATCHED_TERMINATOR, msg, span);
            }
        }
    }

    fn unclosed_blocks(&mut self, open: Vec<(TokenKind, Span)>) {
        for (kind, span) in open {
            self.error(
                ErrorCode::UNTERMINATED_BLOCK,
                format!("'{kind}' is never closed"),
                span,
            );
        }
    }

    fn open_definition(&mut self, tokens: &[Token], span: Span) {
        if let Some(outer) = &self.open_def {
            let msg = format!("function definition nested inside '{}'", outer.name);
            self.error(ErrorCode::NESTED_DEFINITION, msg, span);
            return;
        }
        let Some((name, params, variadic)) = self.definition_header(tokens, span) else {
            return;
        };
        let id = self.arena.registry().register(&name);
        self.open_def = Some(OpenDef {
            id,
            name,
            params,
            variadic,
            phrases: Vec::new(),
            blocks: Vec::new(),
            span,
        });
    }

    fn close_definition(&mut self, span: Span) {
        let Some(def) = self.open_def.take() else {
            self.error(
                ErrorCode::UNMATCHED_TERMINATOR,
                "enddef without def",
                span,
            );
            return;
        };
        let OpenDef {
            id,
            name,
            params,
            variadic,
            phrases,
            blocks,
            ..
        } = def;
        self.unclosed_blocks(blocks);
        debug!(function = %name, params = params.len(), phrases = phrases.len(), "defined");
        let mut space = FunctionSpace::new(id, name);
        space.params = params;
        space.variadic = variadic;
        space.phrases = phrases;
        self.defined.push(space);
    }

    /// `def name`, `def name()`, `def name(a, b)`, `def name(a, rest...)`,
    /// `def name(...)`.
    fn definition_header(
        &mut self,
        tokens: &[Token],
        span: Span,
    ) -> Option<(String, Vec<String>, bool)> {
        let name = match tokens.get(1) {
            Some(t) if t.kind == TokenKind::Identifier => t.text.clone(),
            _ => {
                self.error(
                    ErrorCode::MALFORMED_PHRASE,
                    "expected function name after 'def'",
                    span,
                );
                return None;
            }
        };
        let rest = &tokens[2..];
        if rest.is_empty() {
            return Some((name, Vec::new(), false));
        }
        let well_formed = rest.len() >= 2
            && rest[0].kind == TokenKind::LParen
            && rest[rest.len() - 1].kind == TokenKind::RParen;
        if !well_formed {
            self.error(
                ErrorCode::MALFORMED_PHRASE,
                format!("malformed parameter list for '{name}'"),
                span,
            );
            return None;
        }

        let mut params = Vec::new();
        let mut variadic = false;
        let mut expect_name = true;
        for t in &rest[1..rest.len() - 1] {
            if variadic {
                self.error(
                    ErrorCode::MALFORMED_PHRASE,
                    format!("'...' must end the parameter list of '{name}'"),
                    t.span,
                );
                return None;
            }
            match t.kind {
                TokenKind::Identifier if expect_name => {
                    params.push(t.text.clone());
                    expect_name = false;
                }
                TokenKind::Comma if !expect_name => expect_name = true,
                TokenKind::Ellipsis => {
                    if expect_name {
                        params.push("args".to_string());
                    }
                    variadic = true;
                }
                _ => {
                    self.error(
                        ErrorCode::MALFORMED_PHRASE,
                        format!("unexpected '{}' in parameter list of '{name}'", t.text),
                        t.span,
                    );
                    return None;
                }
            }
        }
        if expect_name && !params.is_empty() && !variadic {
            self.error(
                ErrorCode::MALFORMED_PHRASE,
                format!("trailing ',' in parameter list of '{name}'"),
                span,
            );
            return None;
        }
        Some((name, params, variadic))
    }
}

fn opens_block(kind: TokenKind) -> bool {
    use TokenKind::*;
    matches!(kind, If | While | For | Foreach | When | Test)
}

/// Openers a terminator may close.
fn closes_block(kind: TokenKind) -> Option<&'static [TokenKind]> {
    use TokenKind::*;
    Some(match kind {
        EndIf => &[If],
        EndWhile => &[While],
        EndFor => &[For, Foreach],
        EndWhen => &[When],
        EndTest => &[Test],
        _ => return None,
    })
}
