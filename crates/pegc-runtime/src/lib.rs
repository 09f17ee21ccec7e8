//! The combinator runtime for pegc.
//!
//! Both the bootstrap grammar parser and the parsers emitted by the generator
//! are written against this crate: a byte [`Cursor`] with total backtracking,
//! primitive matchers, and the combinators below. Matchers produce a
//! [`Match`] describing their AST contribution ([`Match::Void`] for tokens
//! that leave no node behind) and always restore the cursor on failure.

mod cursor;

pub use cursor::{decode_utf8, CharProperty, CharSet, Cursor};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FailKind {
    UnexpectedEof,
    UnexpectedChar,
    NoMatches,
}

/// A failure recorded by the cursor: the position it happened at and a
/// snapshot of the rule stack leading there.
#[derive(Clone, Debug)]
pub struct Failure {
    pub pos: u32,
    pub kind: FailKind,
    pub rules: Vec<&'static str>,
}

/// The AST contribution of a matcher.
pub enum Match<N> {
    Void,
    One(N),
    Many(Vec<N>),
}

impl<N> Match<N> {
    pub fn append_into(self, out: &mut Vec<N>) {
        match self {
            Match::Void => {}
            Match::One(node) => out.push(node),
            Match::Many(nodes) => out.extend(nodes),
        }
    }

    pub fn from_children(mut children: Vec<N>) -> Match<N> {
        match children.len() {
            0 => Match::Void,
            1 => Match::One(children.pop().unwrap()),
            _ => Match::Many(children),
        }
    }
}

pub type MatchResult<N> = Result<Match<N>, FailKind>;

/// The backtracking seam. Combinators only ever need to snapshot and restore
/// parser state; the bootstrap parser layers its node arena on top of the
/// cursor position, emitted parsers use the cursor directly.
pub trait Backtrack {
    type Mark: Copy;
    fn mark(&self) -> Self::Mark;
    fn reset(&mut self, mark: Self::Mark);
}

impl Backtrack for Cursor<'_> {
    type Mark = u32;
    fn mark(&self) -> u32 {
        self.mark()
    }
    fn reset(&mut self, mark: u32) {
        self.reset(mark)
    }
}

/// Applies each item in order; fails if any item fails, restoring the state
/// to the entry mark. Contributions are concatenated.
pub fn sequence<P: Backtrack, N>(
    p: &mut P,
    items: &[fn(&mut P) -> MatchResult<N>],
) -> MatchResult<N> {
    let mark = p.mark();
    let mut children = Vec::new();
    for item in items {
        match item(p) {
            Ok(m) => m.append_into(&mut children),
            Err(fail) => {
                p.reset(mark);
                return Err(fail);
            }
        }
    }
    Ok(Match::from_children(children))
}

/// Tries each alternative in order with the state restored before each
/// attempt; the first success wins.
pub fn choice<P: Backtrack, N>(
    p: &mut P,
    alternatives: &[fn(&mut P) -> MatchResult<N>],
) -> MatchResult<N> {
    let mark = p.mark();
    for alternative in alternatives {
        match alternative(p) {
            ok @ Ok(_) => return ok,
            Err(_) => p.reset(mark),
        }
    }
    Err(FailKind::NoMatches)
}

/// Never fails; a failed item contributes nothing.
pub fn optional<P: Backtrack, N>(p: &mut P, item: fn(&mut P) -> MatchResult<N>) -> MatchResult<N> {
    let mark = p.mark();
    match item(p) {
        ok @ Ok(_) => ok,
        Err(_) => {
            p.reset(mark);
            Ok(Match::Void)
        }
    }
}

/// Applies `item` until it fails. Never fails itself.
pub fn repeat<P: Backtrack, N>(p: &mut P, item: fn(&mut P) -> MatchResult<N>) -> MatchResult<N> {
    let mut children = Vec::new();
    loop {
        let mark = p.mark();
        match item(p) {
            Ok(m) => m.append_into(&mut children),
            Err(_) => {
                p.reset(mark);
                break;
            }
        }
    }
    Ok(Match::from_children(children))
}

/// Like [`repeat`], but the first application must succeed.
pub fn repeat_plus<P: Backtrack, N>(
    p: &mut P,
    item: fn(&mut P) -> MatchResult<N>,
) -> MatchResult<N> {
    let mut children = match item(p) {
        Ok(m) => {
            let mut children = Vec::new();
            m.append_into(&mut children);
            children
        }
        Err(fail) => return Err(fail),
    };
    loop {
        let mark = p.mark();
        match item(p) {
            Ok(m) => m.append_into(&mut children),
            Err(_) => {
                p.reset(mark);
                break;
            }
        }
    }
    Ok(Match::from_children(children))
}

/// Succeeds iff `inner` would succeed. Zero-width, contributes nothing.
pub fn and_predicate<P: Backtrack, N>(
    p: &mut P,
    inner: fn(&mut P) -> MatchResult<N>,
) -> MatchResult<N> {
    let mark = p.mark();
    let result = inner(p);
    p.reset(mark);
    match result {
        Ok(_) => Ok(Match::Void),
        Err(fail) => Err(fail),
    }
}

/// Succeeds iff `inner` would fail. Zero-width, contributes nothing.
pub fn not_predicate<P: Backtrack, N>(
    p: &mut P,
    inner: fn(&mut P) -> MatchResult<N>,
) -> MatchResult<N> {
    let mark = p.mark();
    let result = inner(p);
    p.reset(mark);
    match result {
        Ok(_) => Err(FailKind::UnexpectedChar),
        Err(_) => Ok(Match::Void),
    }
}

/// Matches the byte string `bytes` with no AST contribution.
pub fn literal<N>(c: &mut Cursor, bytes: &[u8]) -> MatchResult<N> {
    c.match_bytes(bytes)?;
    Ok(Match::Void)
}

/// Matches one codepoint from `set` with no AST contribution.
pub fn char_class<N>(c: &mut Cursor, set: &CharSet) -> MatchResult<N> {
    c.match_class(set)?;
    Ok(Match::Void)
}

/// Matches any single codepoint with no AST contribution.
pub fn any<N>(c: &mut Cursor) -> MatchResult<N> {
    c.match_any()?;
    Ok(Match::Void)
}

/// Matches one codepoint satisfying `property` with no AST contribution.
pub fn char_property<N>(c: &mut Cursor, property: CharProperty) -> MatchResult<N> {
    c.match_property(property)?;
    Ok(Match::Void)
}

/// The leaf payload of emitted AST nodes.
#[derive(Clone, Debug)]
pub struct Leaf<'a> {
    pub start: u32,
    pub end: u32,
    pub src: &'a [u8],
}

impl<'a> Leaf<'a> {
    pub fn text(&self) -> &'a [u8] {
        &self.src[self.start as usize..self.end as usize]
    }
}

/// The payload of emitted AST nodes that carry children.
#[derive(Clone, Debug)]
pub struct Value<'a, N> {
    pub start: u32,
    pub end: u32,
    pub src: &'a [u8],
    pub children: Vec<N>,
}

impl<'a, N> Value<'a, N> {
    pub fn text(&self) -> &'a [u8] {
        &self.src[self.start as usize..self.end as usize]
    }
}

/// What an emitted `parse` entry point returns when the input is rejected:
/// the furthest position matching reached and the rules that failed there.
#[derive(Clone, Debug)]
pub struct ParseReport {
    pub pos: u32,
    pub expected: Vec<&'static str>,
}

impl Cursor<'_> {
    pub fn report(&self) -> ParseReport {
        let mut expected = Vec::new();
        for failure in self.failures() {
            if let Some(&name) = failure.rules.last() {
                if !expected.contains(&name) {
                    expected.push(name);
                }
            }
        }
        ParseReport {
            pos: self.furthest(),
            expected,
        }
    }
}

impl std::fmt::Display for ParseReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "parse error at byte {}", self.pos)?;
        if !self.expected.is_empty() {
            write!(f, ": expected {}", self.expected.join(" or "))?;
        }
        Ok(())
    }
}
