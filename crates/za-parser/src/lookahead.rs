//! Block-structure resolution over a phrase list.
//!
//! Control constructs are matched by scanning forward and counting a nesting
//! level: an indenter keyword at the start of a phrase opens a level, a
//! dedenter closes one. Blank phrases are stepped over positionally but do
//! not count towards the reported distance.

use za_lexer::TokenKind;

use crate::space::Phrase;

/// Outcome of a [`lookahead`] scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookahead {
    /// `term` was reached at the target level.
    Found { distance: usize, position: usize },
    /// The nesting level dropped below the target first: the enclosing block
    /// closed at `position` without `term` appearing.
    Closed { distance: usize, position: usize },
    /// Input ran out before the block balanced.
    Exhausted,
}

impl Lookahead {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookahead::Found { .. })
    }

    /// Absolute phrase index of whichever boundary stopped the scan.
    pub fn position(&self) -> Option<usize> {
        match *self {
            Lookahead::Found { position, .. } | Lookahead::Closed { position, .. } => {
                Some(position)
            }
            Lookahead::Exhausted => None,
        }
    }

    /// Non-blank phrases between the start and the boundary.
    pub fn distance(&self) -> Option<usize> {
        match *self {
            Lookahead::Found { distance, .. } | Lookahead::Closed { distance, .. } => {
                Some(distance)
            }
            Lookahead::Exhausted => None,
        }
    }
}

/// Scan `phrases` from `start` (inclusive) for `term` at nesting `end_level`,
/// beginning at nesting `indent`.
pub fn lookahead(
    phrases: &[Phrase],
    start: usize,
    mut indent: i32,
    end_level: i32,
    term: TokenKind,
    indenters: &[TokenKind],
    dedenters: &[TokenKind],
) -> Lookahead {
    let mut distance = 0;
    for (position, phrase) in phrases.iter().enumerate().skip(start) {
        let Some(lead) = phrase.leading() else {
            continue;
        };
        if indenters.contains(&lead) {
            indent += 1;
        }
        if dedenters.contains(&lead) {
            indent -= 1;
        }
        if indent < end_level {
            return Lookahead::Closed { distance, position };
        }
        if indent == end_level && lead == term {
            return Lookahead::Found { distance, position };
        }
        distance += 1;
    }
    Lookahead::Exhausted
}

/// Resolved layout of an `if` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfLayout {
    pub else_at: Option<usize>,
    pub endif_at: usize,
}

/// Locate the `else` (if any) and `endif` belonging to the `if` at `start`.
pub fn if_layout(phrases: &[Phrase], start: usize) -> Option<IfLayout> {
    let ind = [TokenKind::If];
    let ded = [TokenKind::EndIf];
    let end = lookahead(phrases, start, 0, 0, TokenKind::EndIf, &ind, &ded);
    let Lookahead::Found { position: endif_at, .. } = end else {
        return None;
    };
    let else_at = match lookahead(phrases, start, 0, 1, TokenKind::Else, &ind, &ded) {
        Lookahead::Found { position, .. } if position < endif_at => Some(position),
        _ => None,
    };
    Some(IfLayout { else_at, endif_at })
}

/// Clause phrases (`is`, `has`, `contains`, `or`) belonging directly to the
/// `when` at `start`, up to its `endwhen` at `end`.
pub fn when_clauses(phrases: &[Phrase], start: usize, end: usize) -> Vec<usize> {
    let mut level = 0;
    let mut clauses = Vec::new();
    for (position, phrase) in phrases.iter().enumerate().take(end).skip(start + 1) {
        match phrase.leading() {
            Some(TokenKind::When) => level += 1,
            Some(TokenKind::EndWhen) => level -= 1,
            Some(TokenKind::Is | TokenKind::Has | TokenKind::Contains | TokenKind::Or)
                if level == 0 =>
            {
                clauses.push(position)
            }
            _ => {}
        }
    }
    clauses
}
