//! The rule table derived from a parsed grammar tree.

use std::collections::HashMap;

use cranelift_entity::{entity_impl, PrimaryMap};

use pegc::{Node, NodeKind, ParsedGrammar, StrSpan};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct RuleHandle(u32);

entity_impl! { RuleHandle }

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RuleAttribute {
    None,
    Leaf,
    Void,
}

pub struct RuleDef<'t> {
    pub name_span: StrSpan,
    pub expr: &'t Node,
    pub attribute: RuleAttribute,
}

/// Rules in definition order plus a name lookup map. The header's start rule
/// is inserted first under its declared name; duplicate definitions are
/// permitted and the last one wins.
pub struct Grammar<'t> {
    pub src: &'t [u8],
    pub tree: &'t ParsedGrammar,
    pub rules: PrimaryMap<RuleHandle, RuleDef<'t>>,
    pub by_name: HashMap<&'t [u8], RuleHandle>,
    pub start: RuleHandle,
    /// The start expression itself; the emitted `parse` entry point is built
    /// from it directly.
    pub start_expr: &'t Node,
}

impl<'t> Grammar<'t> {
    pub fn new(src: &'t [u8], tree: &'t ParsedGrammar) -> Option<Grammar<'t>> {
        let root = tree.root.as_ref()?;
        debug_assert_eq!(root.kind, NodeKind::Grammar);

        let mut rules = PrimaryMap::new();
        let mut by_name = HashMap::new();

        let children = tree.children(root);
        let header = children.first()?;
        debug_assert_eq!(header.kind, NodeKind::Header);

        let name_span = ident_span(tree, &tree.children(header)[0]);
        let start_expr = {
            let start_expr = &tree.children(header)[1];
            &tree.children(start_expr)[0]
        };
        let start = rules.push(RuleDef {
            name_span,
            expr: start_expr,
            attribute: RuleAttribute::None,
        });
        by_name.insert(name_span.as_bytes(src), start);

        for definition in &children[1..] {
            debug_assert_eq!(definition.kind, NodeKind::Definition);
            let mut attribute = RuleAttribute::None;
            let mut name_span = None;
            let mut expr = None;
            for child in tree.children(definition) {
                match child.kind {
                    NodeKind::Attribute => {
                        attribute = match tree.children(child)[0].kind {
                            NodeKind::Void => RuleAttribute::Void,
                            NodeKind::Leaf => RuleAttribute::Leaf,
                            _ => unreachable!(),
                        };
                    }
                    NodeKind::Identifier => name_span = Some(ident_span(tree, child)),
                    NodeKind::Expression => expr = Some(child),
                    _ => {}
                }
            }
            let (name_span, expr) = (name_span?, expr?);
            let handle = rules.push(RuleDef {
                name_span,
                expr,
                attribute,
            });
            let name = name_span.as_bytes(src);
            if by_name.insert(name, handle).is_some() {
                log::warn!(
                    "rule '{}' is defined more than once, the last definition wins",
                    String::from_utf8_lossy(name)
                );
            }
        }

        Some(Grammar {
            src,
            tree,
            rules,
            by_name,
            start,
            start_expr,
        })
    }

    pub fn name(&self, handle: RuleHandle) -> &'t [u8] {
        self.rules[handle].name_span.as_bytes(self.src)
    }

    /// Whether `handle` is the definition reachable under its own name,
    /// rather than one shadowed by a later duplicate.
    pub fn is_active(&self, handle: RuleHandle) -> bool {
        self.by_name.get(self.name(handle)) == Some(&handle)
    }

    /// Active rules in definition order.
    pub fn active_rules(&self) -> impl Iterator<Item = (RuleHandle, &RuleDef<'t>)> + '_ {
        self.rules
            .iter()
            .filter(|(handle, _)| self.is_active(*handle))
    }
}

/// The span of the `Ident` leaf under an `Identifier` node.
pub fn ident_span(tree: &ParsedGrammar, identifier: &Node) -> StrSpan {
    debug_assert_eq!(identifier.kind, NodeKind::Identifier);
    tree.children(identifier)[0].span
}
