//! The bootstrap parser for the grammar-description language.
//!
//! One function per production. Each wraps its body in [`GrammarParser::node`],
//! which pushes the rule name for error reporting, snapshots the state, and on
//! success closes a [`Node`] spanning from entry to the current position.
//! Whitespace and `#` comments are consumed trailing each token, never
//! leading; the entry point consumes leading trivia once.

use crate::{Diagnostics, DiagnosticTag, Node, NodeKind, ParsedGrammar, StrSpan};
use pegc_runtime::{
    choice, not_predicate, optional, repeat, repeat_plus, sequence, Backtrack, Cursor, FailKind,
    Match, MatchResult,
};

pub struct GrammarParser<'a> {
    c: Cursor<'a>,
    arena: Vec<Node>,
}

/// A production function, named as `fn` items so they coerce uniformly to
/// this alias when mixed with closures in `sequence`/`choice` item lists.
type Rule = fn(&mut GrammarParser) -> MatchResult<Node>;

impl Backtrack for GrammarParser<'_> {
    type Mark = (u32, u32);

    fn mark(&self) -> (u32, u32) {
        (self.c.mark(), self.arena.len() as u32)
    }

    fn reset(&mut self, (pos, arena_len): (u32, u32)) {
        self.c.reset(pos);
        self.arena.truncate(arena_len as usize);
    }
}

fn is_ident_start(byte: u8) -> bool {
    matches!(byte, b'_' | b':' | b'a'..=b'z' | b'A'..=b'Z')
}

fn is_ident_continue(byte: u8) -> bool {
    matches!(byte, b'_' | b':' | b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9')
}

impl<'a> GrammarParser<'a> {
    pub fn new(src: &'a [u8]) -> GrammarParser<'a> {
        GrammarParser {
            c: Cursor::new(src),
            arena: Vec::new(),
        }
    }

    pub fn cursor(&self) -> &Cursor<'a> {
        &self.c
    }

    fn skip_ws(&mut self) {
        loop {
            match self.c.peek_byte() {
                Some(b' ' | b'\t' | b'\n' | b'\r') => self.c.bump(1),
                Some(b'#') => {
                    self.c.bump(1);
                    while let Some(byte) = self.c.peek_byte() {
                        if byte == b'\n' {
                            break;
                        }
                        self.c.bump(1);
                    }
                }
                _ => break,
            }
        }
    }

    /// Runs `body` as the rule `name`, closing its contributions into a
    /// `kind` node spanning from entry to the current position.
    fn node(
        &mut self,
        name: &'static str,
        kind: NodeKind,
        body: fn(&mut GrammarParser<'a>) -> MatchResult<Node>,
    ) -> MatchResult<Node> {
        let mark = self.mark();
        let start = self.c.pos();
        self.c.push_rule(name);
        let result = body(self);
        self.c.pop_rule();
        match result {
            Ok(m) => {
                let children = self.close(m);
                let span = StrSpan::new(start, self.c.pos());
                Ok(Match::One(Node::new(kind, span, children)))
            }
            Err(fail) => {
                self.reset(mark);
                Err(fail)
            }
        }
    }

    /// Appends pending child nodes to the arena, contiguously, and returns
    /// their range. Grandchildren are already in place, pushed when their own
    /// parent closed.
    fn close(&mut self, m: Match<Node>) -> std::ops::Range<u32> {
        let start = self.arena.len() as u32;
        m.append_into(&mut self.arena);
        start..self.arena.len() as u32
    }

    /// A punctuation token: matches `token`, consumes trailing trivia,
    /// contributes nothing.
    fn punct(&mut self, token: &'static str, name: &'static str) -> MatchResult<Node> {
        self.c.push_rule(name);
        let result = self.c.match_bytes(token.as_bytes());
        self.c.pop_rule();
        result?;
        self.skip_ws();
        Ok(Match::Void)
    }

    /// A keyword token: like [`punct`], but must not be followed by an
    /// identifier-continuation character.
    fn keyword(&mut self, keyword: &'static str, name: &'static str) -> MatchResult<Node> {
        let mark = self.c.mark();
        self.c.push_rule(name);
        let result = 'matched: {
            if let Err(fail) = self.c.match_bytes(keyword.as_bytes()) {
                break 'matched Err(fail);
            }
            if let Some(byte) = self.c.peek_byte() {
                if is_ident_continue(byte) {
                    break 'matched Err(self.c.fail(FailKind::UnexpectedChar));
                }
            }
            Ok(())
        };
        self.c.pop_rule();
        match result {
            Ok(()) => {
                self.skip_ws();
                Ok(Match::Void)
            }
            Err(fail) => {
                self.c.reset(mark);
                Err(fail)
            }
        }
    }

    /// A token that leaves a leaf node behind: attribute markers and the
    /// operator punctuation. The leaf span covers the token text only, not
    /// the trailing trivia.
    fn marker(
        &mut self,
        token: &'static str,
        kind: NodeKind,
        name: &'static str,
    ) -> MatchResult<Node> {
        let start = self.c.pos();
        self.c.push_rule(name);
        let result = self.c.match_bytes(token.as_bytes());
        self.c.pop_rule();
        result?;
        let span = StrSpan::new(start, self.c.pos());
        self.skip_ws();
        Ok(Match::One(Node::leaf(kind, span)))
    }

    /// A raw token inside a literal or class: no trivia is consumed.
    fn raw(&mut self, token: &'static str, name: &'static str) -> MatchResult<Node> {
        self.c.push_rule(name);
        let result = self.c.match_bytes(token.as_bytes());
        self.c.pop_rule();
        result?;
        Ok(Match::Void)
    }

    /// The closing delimiter of a literal or class; trivia follows it.
    fn closing(&mut self, token: &'static str, name: &'static str) -> MatchResult<Node> {
        self.c.push_rule(name);
        let result = self.c.match_bytes(token.as_bytes());
        self.c.pop_rule();
        result?;
        self.skip_ws();
        Ok(Match::Void)
    }

    fn ident(&mut self) -> MatchResult<Node> {
        let start = self.c.pos();
        self.c.push_rule("Ident");
        let result = 'matched: {
            match self.c.peek_byte() {
                Some(byte) if is_ident_start(byte) => self.c.bump(1),
                Some(_) => break 'matched Err(self.c.fail(FailKind::UnexpectedChar)),
                None => break 'matched Err(self.c.fail(FailKind::UnexpectedEof)),
            }
            while let Some(byte) = self.c.peek_byte() {
                if is_ident_continue(byte) {
                    self.c.bump(1);
                } else {
                    break;
                }
            }
            Ok(())
        };
        self.c.pop_rule();
        result?;
        let span = StrSpan::new(start, self.c.pos());
        self.skip_ws();
        Ok(Match::One(Node::leaf(NodeKind::Ident, span)))
    }

    fn expect_eof(&mut self) -> MatchResult<Node> {
        if self.c.is_eof() {
            Ok(Match::Void)
        } else {
            self.c.push_rule("EOF");
            let fail = self.c.fail(FailKind::UnexpectedChar);
            self.c.pop_rule();
            Err(fail)
        }
    }
}

// Grammar <- _ Header Definition* 'END' ';' EOF
pub fn grammar(p: &mut GrammarParser) -> MatchResult<Node> {
    p.node("Grammar", NodeKind::Grammar, |p| {
        p.skip_ws();
        sequence(
            p,
            &[
                header,
                |p| repeat(p, definition),
                |p| p.keyword("END", "END"),
                |p| p.punct(";", "SEMICOLON"),
                |p| p.expect_eof(),
            ],
        )
    })
}

// Header <- 'PEG' Identifier StartExpr
fn header(p: &mut GrammarParser) -> MatchResult<Node> {
    p.node("Header", NodeKind::Header, |p| {
        let items: &[Rule] = &[|p| p.keyword("PEG", "Header"), identifier, start_expr];
        sequence(p, items)
    })
}

// StartExpr <- '(' Expression ')'
fn start_expr(p: &mut GrammarParser) -> MatchResult<Node> {
    p.node("StartExpr", NodeKind::StartExpr, |p| {
        let items: &[Rule] = &[
            |p| p.punct("(", "OPEN"),
            expression,
            |p| p.punct(")", "CLOSE"),
        ];
        sequence(p, items)
    })
}

// Definition <- Attribute? Identifier '<-' Expression ';'
fn definition(p: &mut GrammarParser) -> MatchResult<Node> {
    p.node("Definition", NodeKind::Definition, |p| {
        let items: &[Rule] = &[
            |p| optional(p, attribute),
            identifier,
            |p| p.punct("<-", "IS"),
            expression,
            |p| p.punct(";", "SEMICOLON"),
        ];
        sequence(p, items)
    })
}

// Attribute <- ('void' / 'leaf') ':'
fn attribute(p: &mut GrammarParser) -> MatchResult<Node> {
    p.node("Attribute", NodeKind::Attribute, |p| {
        sequence(
            p,
            &[
                |p| {
                    choice(
                        p,
                        &[
                            |p| p.marker("void", NodeKind::Void, "Attribute"),
                            |p| p.marker("leaf", NodeKind::Leaf, "Attribute"),
                        ],
                    )
                },
                |p| p.punct(":", "COLON"),
            ],
        )
    })
}

// Expression <- Sequence ('/' Sequence)*
fn expression(p: &mut GrammarParser) -> MatchResult<Node> {
    p.node("Expression", NodeKind::Expression, |p| {
        let items: &[Rule] = &[sequence_rule, |p| {
            repeat(p, |p| {
                let items: &[Rule] = &[|p| p.punct("/", "SLASH"), sequence_rule];
                sequence(p, items)
            })
        }];
        sequence(p, items)
    })
}

// Sequence <- Prefix+
fn sequence_rule(p: &mut GrammarParser) -> MatchResult<Node> {
    p.node("Sequence", NodeKind::Sequence, |p| repeat_plus(p, prefix))
}

// Prefix <- ('&' / '!')? Suffix
fn prefix(p: &mut GrammarParser) -> MatchResult<Node> {
    p.node("Prefix", NodeKind::Prefix, |p| {
        let items: &[Rule] = &[
            |p| {
                optional(p, |p| {
                    choice(
                        p,
                        &[
                            |p| p.marker("&", NodeKind::And, "Prefix"),
                            |p| p.marker("!", NodeKind::Not, "Prefix"),
                        ],
                    )
                })
            },
            suffix,
        ];
        sequence(p, items)
    })
}

// Suffix <- Primary ('?' / '*' / '+')?
fn suffix(p: &mut GrammarParser) -> MatchResult<Node> {
    p.node("Suffix", NodeKind::Suffix, |p| {
        sequence(
            p,
            &[primary, |p| {
                optional(p, |p| {
                    choice(
                        p,
                        &[
                            |p| p.marker("?", NodeKind::Question, "Suffix"),
                            |p| p.marker("*", NodeKind::Star, "Suffix"),
                            |p| p.marker("+", NodeKind::Plus, "Suffix"),
                        ],
                    )
                })
            }],
        )
    })
}

// Primary <- Identifier / '(' Expression ')' / Literal / Class / '.'
//
// Identifier is attempted first so that character-property names, which lex
// as identifiers, resolve uniformly through the rule table.
fn primary(p: &mut GrammarParser) -> MatchResult<Node> {
    p.node("Primary", NodeKind::Primary, |p| {
        let items: &[Rule] = &[
            identifier,
            |p| {
                let items: &[Rule] = &[
                    |p| p.punct("(", "OPEN"),
                    expression,
                    |p| p.punct(")", "CLOSE"),
                ];
                sequence(p, items)
            },
            literal,
            class,
            |p| p.marker(".", NodeKind::Dot, "Primary"),
        ];
        choice(p, items)
    })
}

// Identifier <- [_:A-Za-z][_:A-Za-z0-9]*
fn identifier(p: &mut GrammarParser) -> MatchResult<Node> {
    p.node("Identifier", NodeKind::Identifier, |p| p.ident())
}

// Literal <- ['] (!['] Char)* ['] / ["] (!["] Char)* ["]
fn literal(p: &mut GrammarParser) -> MatchResult<Node> {
    p.node("Literal", NodeKind::Literal, |p| {
        choice(
            p,
            &[
                |p| {
                    let items: &[Rule] = &[
                        |p| p.raw("'", "Literal"),
                        |p| {
                            repeat(p, |p| {
                                let items: &[Rule] = &[
                                    |p| not_predicate(p, |p| p.raw("'", "Literal")),
                                    char_rule,
                                ];
                                sequence(p, items)
                            })
                        },
                        |p| p.closing("'", "Literal"),
                    ];
                    sequence(p, items)
                },
                |p| {
                    let items: &[Rule] = &[
                        |p| p.raw("\"", "Literal"),
                        |p| {
                            repeat(p, |p| {
                                let items: &[Rule] = &[
                                    |p| not_predicate(p, |p| p.raw("\"", "Literal")),
                                    char_rule,
                                ];
                                sequence(p, items)
                            })
                        },
                        |p| p.closing("\"", "Literal"),
                    ];
                    sequence(p, items)
                },
            ],
        )
    })
}

// Class <- '[' (!']' Range)* ']'
fn class(p: &mut GrammarParser) -> MatchResult<Node> {
    p.node("Class", NodeKind::Class, |p| {
        sequence(
            p,
            &[
                |p| p.raw("[", "Class"),
                |p| {
                    repeat(p, |p| {
                        let items: &[Rule] =
                            &[|p| not_predicate(p, |p| p.raw("]", "Class")), range];
                        sequence(p, items)
                    })
                },
                |p| p.closing("]", "Class"),
            ],
        )
    })
}

// Range <- Char '-' Char / Char
fn range(p: &mut GrammarParser) -> MatchResult<Node> {
    p.node("Range", NodeKind::Range, |p| {
        let items: &[Rule] = &[
            |p| {
                let items: &[Rule] = &[char_rule, |p| p.raw("-", "Range"), char_rule];
                sequence(p, items)
            },
            char_rule,
        ];
        choice(p, items)
    })
}

// Char <- the escape notations, longest match first, then any non-backslash
// codepoint.
fn char_rule(p: &mut GrammarParser) -> MatchResult<Node> {
    p.node("Char", NodeKind::Char, |p| {
        let items: &[Rule] = &[
            char_special,
            char_octal_full,
            char_octal_part,
            char_unicode,
            char_unescaped,
        ];
        choice(p, items)
    })
}

// '\' [nrt'"\[\]\\-]
fn char_special(p: &mut GrammarParser) -> MatchResult<Node> {
    let start = p.c.pos();
    p.c.match_bytes(b"\\")?;
    match p.c.peek_byte() {
        Some(b'n' | b'r' | b't' | b'\'' | b'"' | b'[' | b']' | b'\\' | b'-') => p.c.bump(1),
        _ => {
            let fail = p.c.fail(FailKind::UnexpectedChar);
            p.c.reset(start);
            return Err(fail);
        }
    }
    let span = StrSpan::new(start, p.c.pos());
    Ok(Match::One(Node::leaf(NodeKind::CharSpecial, span)))
}

// '\' [0-2][0-7][0-7]
fn char_octal_full(p: &mut GrammarParser) -> MatchResult<Node> {
    let start = p.c.pos();
    p.c.match_bytes(b"\\")?;
    let digits = [b'0'..=b'2', b'0'..=b'7', b'0'..=b'7'];
    for accepted in digits {
        match p.c.peek_byte() {
            Some(byte) if accepted.contains(&byte) => p.c.bump(1),
            _ => {
                let fail = p.c.fail(FailKind::UnexpectedChar);
                p.c.reset(start);
                return Err(fail);
            }
        }
    }
    let span = StrSpan::new(start, p.c.pos());
    Ok(Match::One(Node::leaf(NodeKind::CharOctalFull, span)))
}

// '\' [0-7][0-7]?
fn char_octal_part(p: &mut GrammarParser) -> MatchResult<Node> {
    let start = p.c.pos();
    p.c.match_bytes(b"\\")?;
    match p.c.peek_byte() {
        Some(byte) if (b'0'..=b'7').contains(&byte) => p.c.bump(1),
        _ => {
            let fail = p.c.fail(FailKind::UnexpectedChar);
            p.c.reset(start);
            return Err(fail);
        }
    }
    if let Some(byte) = p.c.peek_byte() {
        if (b'0'..=b'7').contains(&byte) {
            p.c.bump(1);
        }
    }
    let span = StrSpan::new(start, p.c.pos());
    Ok(Match::One(Node::leaf(NodeKind::CharOctalPart, span)))
}

// '\u' Hex{1,5}
fn char_unicode(p: &mut GrammarParser) -> MatchResult<Node> {
    let start = p.c.pos();
    p.c.match_bytes(b"\\u")?;
    let mut count = 0;
    while count < 5 {
        match p.c.peek_byte() {
            Some(byte) if (byte as char).is_ascii_hexdigit() => {
                p.c.bump(1);
                count += 1;
            }
            _ => break,
        }
    }
    if count == 0 {
        let fail = p.c.fail(FailKind::UnexpectedChar);
        p.c.reset(start);
        return Err(fail);
    }
    let span = StrSpan::new(start, p.c.pos());
    Ok(Match::One(Node::leaf(NodeKind::CharUnicode, span)))
}

// !'\' AnyUTF8
fn char_unescaped(p: &mut GrammarParser) -> MatchResult<Node> {
    let start = p.c.pos();
    if p.c.peek_byte() == Some(b'\\') {
        return Err(p.c.fail(FailKind::UnexpectedChar));
    }
    p.c.match_any()?;
    let span = StrSpan::new(start, p.c.pos());
    Ok(Match::One(Node::leaf(NodeKind::CharUnescaped, span)))
}

/// Maps a bootstrap rule name to what a reader would expect to see there.
pub fn expectation(rule: &str) -> &'static str {
    match rule {
        "Grammar" | "Header" => "'PEG'",
        "Definition" => "'void', 'leaf' or an identifier",
        "IS" => "'<-'",
        "Attribute" => "'void' or 'leaf'",
        "Expression" | "Sequence" | "Prefix" | "Suffix" | "Primary" => "an expression",
        "Identifier" | "Ident" => "an identifier",
        "Literal" => "a literal",
        "Class" => "a character class",
        "Range" => "a character range",
        "Char" => "a character",
        "StartExpr" | "OPEN" => "'('",
        "CLOSE" => "')'",
        "SEMICOLON" => "';'",
        "COLON" => "':'",
        "SLASH" => "'/'",
        "END" => "'END'",
        "EOF" => "end of input",
        _ => "valid grammar input",
    }
}

pub fn parse_grammar(src: &[u8], diag: &Diagnostics) -> ParsedGrammar {
    let mut p = GrammarParser::new(src);
    match grammar(&mut p) {
        Ok(Match::One(root)) => ParsedGrammar {
            root: Some(root),
            arena: p.arena,
        },
        Ok(_) => unreachable!("the Grammar rule produces exactly one node"),
        Err(_) => {
            let pos = p.c.furthest();
            let mut expected: Vec<&'static str> = Vec::new();
            for failure in p.c.failures() {
                if let Some(&name) = failure.rules.last() {
                    let what = expectation(name);
                    if !expected.contains(&what) {
                        expected.push(what);
                    }
                }
            }
            let message = match expected.is_empty() {
                true => "Unable to parse grammar".to_string(),
                false => format!("Expected {}", expected.join(" or ")),
            };
            let end = u32::min(pos + 1, src.len() as u32);
            diag.error(
                StrSpan::new(pos, end),
                DiagnosticTag::ParseError,
                message,
            );
            ParsedGrammar {
                root: None,
                arena: p.arena,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Diagnostics;

    fn parse(src: &str) -> (ParsedGrammar, Diagnostics) {
        let diag = Diagnostics::new();
        let parsed = parse_grammar(src.as_bytes(), &diag);
        (parsed, diag)
    }

    fn kinds(tree: &ParsedGrammar, node: &Node) -> Vec<NodeKind> {
        tree.children(node).iter().map(|child| child.kind).collect()
    }

    #[test]
    fn trivial_grammar_shape() {
        let (tree, diag) = parse("PEG G (A) A <- \"x\"; END ;");
        assert!(diag.is_empty());
        let root = tree.root.as_ref().unwrap();
        assert_eq!(root.kind, NodeKind::Grammar);
        assert_eq!(kinds(&tree, root), &[NodeKind::Header, NodeKind::Definition]);

        let header = &tree.children(root)[0];
        assert_eq!(
            kinds(&tree, header),
            &[NodeKind::Identifier, NodeKind::StartExpr]
        );

        let definition = &tree.children(root)[1];
        assert_eq!(
            kinds(&tree, definition),
            &[NodeKind::Identifier, NodeKind::Expression]
        );
    }

    #[test]
    fn attributes_and_operators() {
        let src = "PEG G (A) void: WS <- \" \"; leaf: A <- !B C? / &D E* F+ / .; B <- 'b'; END ;";
        let (tree, diag) = parse(src);
        assert!(diag.is_empty(), "{:?}", diag.get());
        let root = tree.root.as_ref().unwrap();
        let definitions = &tree.children(root)[1..];
        assert_eq!(definitions.len(), 3);

        let void_def = &definitions[0];
        assert_eq!(
            kinds(&tree, void_def),
            &[
                NodeKind::Attribute,
                NodeKind::Identifier,
                NodeKind::Expression
            ]
        );
        let attribute = &tree.children(void_def)[0];
        assert_eq!(kinds(&tree, attribute), &[NodeKind::Void]);

        let leaf_def = &definitions[1];
        let attribute = &tree.children(leaf_def)[0];
        assert_eq!(kinds(&tree, attribute), &[NodeKind::Leaf]);

        // A's expression has three alternatives
        let expression = &tree.children(leaf_def)[2];
        assert_eq!(
            kinds(&tree, expression),
            &[NodeKind::Sequence, NodeKind::Sequence, NodeKind::Sequence]
        );

        // first alternative: !B C?
        let first = &tree.children(expression)[0];
        let prefixes = tree.children(first);
        assert_eq!(kinds(&tree, &prefixes[0]), &[NodeKind::Not, NodeKind::Suffix]);
        let suffix = &tree.children(&prefixes[1])[0];
        assert_eq!(kinds(&tree, suffix), &[NodeKind::Primary, NodeKind::Question]);

        // second alternative: &D E* F+
        let second = &tree.children(expression)[1];
        let prefixes = tree.children(second);
        assert_eq!(kinds(&tree, &prefixes[0]), &[NodeKind::And, NodeKind::Suffix]);
        let star = &tree.children(&prefixes[1])[0];
        assert_eq!(kinds(&tree, star), &[NodeKind::Primary, NodeKind::Star]);
        let plus = &tree.children(&prefixes[2])[0];
        assert_eq!(kinds(&tree, plus), &[NodeKind::Primary, NodeKind::Plus]);

        // third alternative: .
        let third = &tree.children(expression)[2];
        let suffix = &tree.children(&tree.children(third)[0])[0];
        let primary = &tree.children(suffix)[0];
        assert_eq!(kinds(&tree, primary), &[NodeKind::Dot]);
    }

    #[test]
    fn literal_chars_and_kinds() {
        let (tree, diag) = parse(r"PEG G (A) A <- '\n\101\12\u41x'; END ;");
        assert!(diag.is_empty(), "{:?}", diag.get());
        let root = tree.root.as_ref().unwrap();
        let definition = &tree.children(root)[1];
        let expression = &tree.children(definition)[1];
        let sequence = &tree.children(expression)[0];
        let prefix = &tree.children(sequence)[0];
        let suffix = &tree.children(prefix)[0];
        let primary = &tree.children(suffix)[0];
        let literal = &tree.children(primary)[0];
        assert_eq!(literal.kind, NodeKind::Literal);

        let char_kinds: Vec<NodeKind> = tree
            .children(literal)
            .iter()
            .map(|char| tree.children(char)[0].kind)
            .collect();
        assert_eq!(
            char_kinds,
            &[
                NodeKind::CharSpecial,
                NodeKind::CharOctalFull,
                NodeKind::CharOctalPart,
                NodeKind::CharUnicode,
                NodeKind::CharUnescaped,
            ]
        );
    }

    #[test]
    fn class_ranges() {
        let (tree, diag) = parse("PEG G (A) A <- [a-c0-9_]; END ;");
        assert!(diag.is_empty());
        let root = tree.root.as_ref().unwrap();
        let definition = &tree.children(root)[1];
        let expression = &tree.children(definition)[1];
        let class = {
            let sequence = &tree.children(expression)[0];
            let prefix = &tree.children(sequence)[0];
            let suffix = &tree.children(prefix)[0];
            let primary = &tree.children(suffix)[0];
            &tree.children(primary)[0]
        };
        assert_eq!(class.kind, NodeKind::Class);
        let ranges = tree.children(class);
        assert_eq!(ranges.len(), 3);
        assert_eq!(tree.children(&ranges[0]).len(), 2);
        assert_eq!(tree.children(&ranges[1]).len(), 2);
        assert_eq!(tree.children(&ranges[2]).len(), 1);
    }

    #[test]
    fn octal_escape_longest_match() {
        // \234 has a leading 2, so all three digits belong to the escape;
        // \834 is not octal at all and 8 lexes as an ordinary character
        let (tree, diag) = parse(r"PEG G (A) A <- '\2347'; END ;");
        assert!(diag.is_empty());
        let leaf_text = tree.leaf_text("PEG G (A) A <- '\\2347'; END ;".as_bytes());
        assert_eq!(leaf_text, b"GAA\\2347");
    }

    #[test]
    fn namespaced_identifier() {
        let (tree, diag) = parse("PEG G (ns:rule) ns:rule <- 'x'; END ;");
        assert!(diag.is_empty());
        let root = tree.root.as_ref().unwrap();
        let header = &tree.children(root)[0];
        let identifier = &tree.children(header)[0];
        let ident = &tree.children(identifier)[0];
        assert_eq!(ident.text(b"PEG G (ns:rule) ns:rule <- 'x'; END ;"), b"G");
        let start_expr = &tree.children(header)[1];
        assert_eq!(start_expr.kind, NodeKind::StartExpr);
    }

    #[test]
    fn comments_are_trivia() {
        let src = "PEG G (A) # the start rule\nA <- 'x'; # a rule\nEND ;";
        let (tree, diag) = parse(src);
        assert!(diag.is_empty());
        assert_eq!(tree.leaf_text(src.as_bytes()), b"GAAx");
    }

    #[test]
    fn leaf_concatenation_round_trip() {
        // leaves are the identifiers, the literal and class characters, and
        // the marker tokens; structural punctuation contributes no nodes
        let src = "PEG G (A)\n  A <- B '+' B;\n  leaf: B <- [0-9]+;\nEND ;";
        let (tree, diag) = parse(src);
        assert!(diag.is_empty());
        assert_eq!(tree.leaf_text(src.as_bytes()), b"GAAB+BleafB09+");
    }

    #[test]
    fn parse_error_reports_expectations() {
        let (tree, diag) = parse("nonsense");
        assert!(tree.root.is_none());
        let diagnostics = diag.get();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].tag, DiagnosticTag::ParseError);
        assert!(diagnostics[0].message.contains("'PEG'"), "{}", diagnostics[0].message);
    }

    #[test]
    fn missing_arrow_reports_is_token() {
        let (tree, diag) = parse("PEG G (A) A 'x'; END ;");
        assert!(tree.root.is_none());
        let diagnostics = diag.get();
        let message = &diagnostics[0].message;
        assert!(message.contains("'<-'"), "{message}");
    }

    #[test]
    fn empty_literal_and_empty_class() {
        let (tree, diag) = parse("PEG G (A) A <- '' []; END ;");
        assert!(diag.is_empty());
        let root = tree.root.as_ref().unwrap();
        let definition = &tree.children(root)[1];
        let expression = &tree.children(definition)[1];
        let sequence = &tree.children(expression)[0];
        let prefixes = tree.children(sequence);
        assert_eq!(prefixes.len(), 2);
        let literal = {
            let suffix = &tree.children(&prefixes[0])[0];
            let primary = &tree.children(suffix)[0];
            &tree.children(primary)[0]
        };
        assert_eq!(literal.kind, NodeKind::Literal);
        assert_eq!(tree.children(literal).len(), 0);
        let class = {
            let suffix = &tree.children(&prefixes[1])[0];
            let primary = &tree.children(suffix)[0];
            &tree.children(primary)[0]
        };
        assert_eq!(class.kind, NodeKind::Class);
        assert_eq!(tree.children(class).len(), 0);
    }

    #[test]
    fn pretty_print_shows_kinds_and_leaf_text() {
        let src = "PEG G (A) A <- 'x'; END ;";
        let (tree, _diag) = parse(src);
        let printed = tree.pretty_print(src.as_bytes());
        assert!(printed.starts_with("Grammar\n  Header\n"), "{printed}");
        assert!(printed.contains("Ident \"G\""), "{printed}");
        assert!(printed.contains("CharUnescaped \"x\""), "{printed}");
    }

    #[test]
    fn rejects_trailing_garbage() {
        let (tree, _diag) = parse("PEG G (A) A <- 'x'; END ; more");
        assert!(tree.root.is_none());
    }
}
