//! Za phrase parser: turns source text into per-function-space phrase lists
//! and resolves block structure over them.

pub mod lookahead;
pub mod phraser;
pub mod registry;
pub mod space;

pub use lookahead::{if_layout, lookahead, when_clauses, IfLayout, Lookahead};
pub use phraser::{ParseOutcome, PhraseParser};
pub use registry::{NameRegistry, SpaceId};
pub use space::{FunctionSpace, Phrase, SpaceArena};
