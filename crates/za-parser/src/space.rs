//! Phrases and the function-space arena.

use parking_lot::RwLock;
use std::sync::Arc;
use za_lexer::{Token, TokenKind};
use za_types::Span;

use crate::registry::{NameRegistry, SpaceId};

/// One parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    /// Source text of the statement, trimmed.
    pub text: String,
    pub tokens: Vec<Token>,
    pub span: Span,
    /// Set for empty statements (`;;`, blank lines). These keep their slot in
    /// the phrase list but are ignored by block-distance counting.
    pub blank: bool,
}

impl Phrase {
    pub fn new(text: impl Into<String>, tokens: Vec<Token>, span: Span) -> Self {
        let blank = tokens.is_empty();
        Self {
            text: text.into(),
            tokens,
            span,
            blank,
        }
    }

    pub fn blank(span: Span) -> Self {
        Self::new("", Vec::new(), span)
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    /// Kind of the leading token; `None` for blank phrases.
    pub fn leading(&self) -> Option<TokenKind> {
        self.tokens.first().map(|t| t.kind)
    }

    pub fn line(&self) -> u32 {
        self.span.start_line
    }
}

/// One compilation/execution scope: the top-level script or a `def` body.
#[derive(Debug, Clone, Default)]
pub struct FunctionSpace {
    pub id: SpaceId,
    pub name: String,
    pub params: Vec<String>,
    /// Extra call arguments are collected into the last parameter.
    pub variadic: bool,
    pub phrases: Vec<Phrase>,
}

impl FunctionSpace {
    pub fn new(id: SpaceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Owner of every function space, addressed by [`SpaceId`].
///
/// A name may be registered without a space; the space appears once its
/// `def` has been parsed in full and lives until the arena is dropped.
#[derive(Debug, Default)]
pub struct SpaceArena {
    registry: NameRegistry,
    spaces: RwLock<Vec<Option<Arc<FunctionSpace>>>>,
}

impl SpaceArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &NameRegistry {
        &self.registry
    }

    /// Register `name` and make sure a (possibly empty) space exists for it.
    pub fn declare(&self, name: &str) -> SpaceId {
        let id = self.registry.register(name);
        let mut spaces = self.spaces.write();
        let idx = id as usize;
        if spaces.len() <= idx {
            spaces.resize(idx + 1, None);
        }
        if spaces[idx].is_none() {
            spaces[idx] = Some(Arc::new(FunctionSpace::new(id, name)));
        }
        id
    }

    /// Store a finished space under its id, replacing any earlier record.
    pub fn define(&self, space: FunctionSpace) {
        let mut spaces = self.spaces.write();
        let idx = space.id as usize;
        if spaces.len() <= idx {
            spaces.resize(idx + 1, None);
        }
        spaces[idx] = Some(Arc::new(space));
    }

    pub fn get(&self, id: SpaceId) -> Option<Arc<FunctionSpace>> {
        self.spaces.read().get(id as usize).cloned().flatten()
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<FunctionSpace>> {
        self.get(self.registry.id_of(name)?)
    }

    pub fn name_of(&self, id: SpaceId) -> Option<String> {
        self.registry.name_of(id)
    }

    /// Mutate the space stored at `id`.
    ///
    /// Frames already executing hold their own `Arc` and keep seeing the
    /// phrase list they started with.
    pub fn update<R>(&self, id: SpaceId, f: impl FnOnce(&mut FunctionSpace) -> R) -> Option<R> {
        let mut spaces = self.spaces.write();
        let slot = spaces.get_mut(id as usize)?.as_mut()?;
        Some(f(Arc::make_mut(slot)))
    }

    /// Number of function spaces with a record.
    pub fn len(&self) -> usize {
        self.spaces.read().iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
