//! Static validation of a parsed grammar: reference resolution, nullability,
//! left recursion, and the greedy-empty restriction.
//!
//! Nullability is computed by a DFS over the expression trees, caching the
//! answer per rule as it completes. Left recursion is detected while the DFS
//! runs: a reference to a rule already on the path is a cycle, and it is an
//! error unless input has provably been consumed since that rule was entered
//! (the `check_lr` flag, cleared behind non-nullable sequence elements and
//! inside zero-width predicates).

use std::collections::BTreeSet;

use cranelift_entity::SecondaryMap;

use pegc::{Diagnostics, DiagnosticTag, Node, NodeKind};
use pegc_runtime::CharProperty;

use crate::grammar::{ident_span, Grammar, RuleHandle};

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum Nullability {
    #[default]
    Unknown,
    No,
    Yes,
}

/// Unwinds the DFS path that detected an unrecoverable error; sibling rules
/// are still checked by the top-level loop.
struct Break;

struct Checker<'g, 't, 'd> {
    grammar: &'g Grammar<'t>,
    diag: &'d Diagnostics,
    accessing: Vec<RuleHandle>,
    accessed: SecondaryMap<RuleHandle, Nullability>,
}

/// Checks the grammar, reporting diagnostics, and returns the set of
/// nullable rule names. The set is ordered so consumers stay deterministic.
pub fn check<'t>(grammar: &Grammar<'t>, diag: &Diagnostics) -> BTreeSet<&'t [u8]> {
    let mut checker = Checker {
        grammar,
        diag,
        accessing: Vec::new(),
        accessed: SecondaryMap::new(),
    };

    _ = checker.descend(grammar.start, true);

    // rules unreachable from the start rule still get validated
    let leftover: Vec<RuleHandle> = grammar.active_rules().map(|(handle, _)| handle).collect();
    for handle in leftover {
        if checker.accessed[handle] == Nullability::Unknown {
            _ = checker.descend(handle, true);
        }
    }

    let mut nullable = BTreeSet::new();
    for (&name, &handle) in &grammar.by_name {
        if checker.accessed[handle] == Nullability::Yes {
            nullable.insert(name);
        }
    }
    log::debug!(
        "checked {} rules, {} nullable",
        grammar.by_name.len(),
        nullable.len()
    );
    nullable
}

impl<'g, 't, 'd> Checker<'g, 't, 'd> {
    fn descend(&mut self, handle: RuleHandle, check_lr: bool) -> Result<bool, Break> {
        self.accessing.push(handle);
        let result = self.expr_nullable(self.grammar.rules[handle].expr, check_lr);
        self.accessing.pop();
        match result {
            Ok(nullable) => {
                self.accessed[handle] = match nullable {
                    true => Nullability::Yes,
                    false => Nullability::No,
                };
                Ok(nullable)
            }
            Err(err) => {
                // don't reanalyze a rule that already failed
                self.accessed[handle] = Nullability::No;
                Err(err)
            }
        }
    }

    fn expr_nullable(&mut self, node: &'t Node, check_lr: bool) -> Result<bool, Break> {
        let children = self.grammar.tree.children(node);
        match node.kind {
            // any nullable alternative makes the choice nullable
            NodeKind::Expression => {
                let mut nullable = false;
                for alternative in children {
                    nullable |= self.expr_nullable(alternative, check_lr)?;
                }
                Ok(nullable)
            }
            // all elements must be nullable; once an element is known to
            // consume input, nothing after it can lead to left recursion
            NodeKind::Sequence => {
                let mut check_lr = check_lr;
                let mut nullable = true;
                for element in children {
                    let element_nullable = self.expr_nullable(element, check_lr)?;
                    nullable &= element_nullable;
                    if !element_nullable {
                        check_lr = false;
                    }
                }
                Ok(nullable)
            }
            NodeKind::Prefix => match children[0].kind {
                NodeKind::And | NodeKind::Not => {
                    _ = self.expr_nullable(&children[1], false)?;
                    Ok(true)
                }
                _ => self.expr_nullable(&children[0], check_lr),
            },
            NodeKind::Suffix => {
                let nullable = self.expr_nullable(&children[0], check_lr)?;
                let Some(operator) = children.get(1) else {
                    return Ok(nullable);
                };
                match operator.kind {
                    NodeKind::Star | NodeKind::Plus => {
                        if nullable {
                            self.diag.error(
                                operator.span,
                                DiagnosticTag::Unnullable,
                                "Greedy matches are not allowed to be empty",
                            );
                        }
                        match operator.kind {
                            NodeKind::Star => Ok(true),
                            _ => Ok(nullable),
                        }
                    }
                    NodeKind::Question => Ok(true),
                    _ => unreachable!(),
                }
            }
            NodeKind::Primary => {
                let child = &children[0];
                match child.kind {
                    NodeKind::Identifier => self.identifier_nullable(child, check_lr),
                    NodeKind::Expression => self.expr_nullable(child, check_lr),
                    // an empty literal accepts the empty string
                    NodeKind::Literal => Ok(self.grammar.tree.children(child).is_empty()),
                    NodeKind::Class | NodeKind::Dot => Ok(false),
                    _ => unreachable!(),
                }
            }
            _ => unreachable!("not an expression node: {:?}", node.kind),
        }
    }

    fn identifier_nullable(&mut self, identifier: &'t Node, check_lr: bool) -> Result<bool, Break> {
        let name_span = ident_span(self.grammar.tree, identifier);
        let name = name_span.as_bytes(self.grammar.src);

        // the character-property predicates are reserved and match exactly
        // one codepoint
        if CharProperty::from_name(name).is_some() {
            return Ok(false);
        }

        let Some(&handle) = self.grammar.by_name.get(name) else {
            self.diag.error(
                name_span,
                DiagnosticTag::UndefinedIdent,
                format!(
                    "Undefined nonterminal '{}'",
                    String::from_utf8_lossy(name)
                ),
            );
            return Ok(false);
        };

        if let Some(position) = self.accessing.iter().position(|&entry| entry == handle) {
            if check_lr {
                let mut path = String::new();
                for &entry in &self.accessing[position..] {
                    path.push_str(&String::from_utf8_lossy(self.grammar.name(entry)));
                    path.push_str(" -> ");
                }
                path.push_str(&String::from_utf8_lossy(self.grammar.name(handle)));
                self.diag.error(
                    name_span,
                    DiagnosticTag::LeftRecursion,
                    format!("Detected left recursion: {path}"),
                );
                return Err(Break);
            }
            // progress was made before re-entry, the cycle consumes input
            return Ok(false);
        }

        match self.accessed[handle] {
            Nullability::Yes => Ok(true),
            Nullability::No => Ok(false),
            Nullability::Unknown => self.descend(handle, check_lr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pegc::{Diagnostic, ParsedGrammar};

    fn run(src: &str) -> (Vec<Diagnostic>, Vec<String>) {
        let diag = Diagnostics::new();
        let tree = ParsedGrammar::new(src.as_bytes(), &diag);
        assert!(diag.is_empty(), "parse failed: {:?}", diag.get());
        let grammar = Grammar::new(src.as_bytes(), &tree).unwrap();
        let nullable = check(&grammar, &diag);
        let nullable = nullable
            .iter()
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect();
        (diag.take(), nullable)
    }

    #[test]
    fn accepts_trivial_grammar() {
        let (diagnostics, nullable) = run("PEG G (A) A <- \"x\"; END ;");
        assert!(diagnostics.is_empty());
        assert!(nullable.is_empty());
    }

    #[test]
    fn direct_left_recursion() {
        let (diagnostics, _) = run("PEG G (A) A <- A \"x\" / \"y\"; END ;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].tag, DiagnosticTag::LeftRecursion);
        assert!(diagnostics[0].message.contains("A -> A"), "{}", diagnostics[0].message);
    }

    #[test]
    fn indirect_left_recursion() {
        let (diagnostics, _) = run("PEG G (A) A <- B; B <- A; END ;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].tag, DiagnosticTag::LeftRecursion);
        assert!(
            diagnostics[0].message.contains("A -> B -> A"),
            "{}",
            diagnostics[0].message
        );
    }

    #[test]
    fn nullable_star_is_rejected() {
        let (diagnostics, nullable) = run("PEG G (A) A <- (B)*; B <- \"x\"?; END ;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].tag, DiagnosticTag::Unnullable);
        assert_eq!(
            diagnostics[0].message,
            "Greedy matches are not allowed to be empty"
        );
        // B itself is fine and nullable
        assert!(nullable.contains(&"B".to_string()));
    }

    #[test]
    fn nullable_plus_is_rejected() {
        let (diagnostics, _) = run("PEG G (A) A <- B+; B <- \"x\"?; END ;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].tag, DiagnosticTag::Unnullable);
    }

    #[test]
    fn undefined_identifier() {
        let (diagnostics, _) = run("PEG G (A) A <- B; END ;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].tag, DiagnosticTag::UndefinedIdent);
        assert!(diagnostics[0].message.contains("'B'"), "{}", diagnostics[0].message);
    }

    #[test]
    fn nullability_rules() {
        let (diagnostics, nullable) = run(
            "PEG G (A) \
             A <- B C; \
             B <- 'x'?; \
             C <- 'y'*; \
             D <- 'z'+; \
             E <- &'q'; \
             F <- !'q'; \
             H <- ''; \
             END ;",
        );
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        for name in ["A", "B", "C", "E", "F", "G", "H"] {
            assert!(nullable.contains(&name.to_string()), "{name} should be nullable");
        }
        assert!(!nullable.contains(&"D".to_string()));
    }

    #[test]
    fn nullable_set_is_sorted() {
        let (_, nullable) = run("PEG G (Z) Z <- 'z'?; A <- 'a'?; M <- 'm'?; END ;");
        let mut sorted = nullable.clone();
        sorted.sort();
        assert_eq!(nullable, sorted);
    }

    #[test]
    fn progress_clears_left_recursion_flag() {
        // A re-enters itself only after consuming 'x', which is plain
        // recursion, not left recursion
        let (diagnostics, _) = run("PEG G (A) A <- 'x' A / 'y'; END ;");
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }

    #[test]
    fn nullable_head_keeps_flag_set() {
        // B? may consume nothing, so the A that follows is still leftmost
        let (diagnostics, _) = run("PEG G (A) A <- B? A 'x' / 'y'; B <- 'b'; END ;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].tag, DiagnosticTag::LeftRecursion);
    }

    #[test]
    fn cycle_inside_predicate_is_accepted() {
        // the reference clears the detection flag inside zero-width
        // predicates; this grammar is accepted
        let (diagnostics, _) = run("PEG G (A) A <- &(A 'x') 'y' / 'z'; END ;");
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }

    #[test]
    fn star_body_is_checked_for_left_recursion() {
        let (diagnostics, _) = run("PEG G (A) A <- (A 'x')* 'y'; END ;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].tag, DiagnosticTag::LeftRecursion);
    }

    #[test]
    fn character_properties_resolve_to_predicates() {
        let (diagnostics, nullable) = run("PEG G (A) A <- alpha digit space; END ;");
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
        assert!(nullable.is_empty());
    }

    #[test]
    fn errors_accumulate_across_rules() {
        let (diagnostics, _) = run("PEG G (A) A <- B C; B <- X; C <- Y; END ;");
        let tags: Vec<DiagnosticTag> = diagnostics.iter().map(|d| d.tag).collect();
        assert_eq!(
            tags,
            &[DiagnosticTag::UndefinedIdent, DiagnosticTag::UndefinedIdent]
        );
    }

    #[test]
    fn unreachable_rules_are_still_checked() {
        let (diagnostics, _) = run("PEG G (A) A <- 'a'; B <- B 'x'; END ;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].tag, DiagnosticTag::LeftRecursion);
        assert!(diagnostics[0].message.contains("B -> B"));
    }

    #[test]
    fn duplicate_definition_uses_last() {
        // the first definition of A would be left-recursive; the second
        // shadows it and is fine
        let (diagnostics, _) = run("PEG G (A) A <- A 'x'; A <- 'x'; END ;");
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }
}
