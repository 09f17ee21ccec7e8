//! Emits the generated parser as Rust source.
//!
//! The output is a single file importing `pegc_runtime`: the nullability
//! side table, a sum-typed `Node` with one variant per non-void rule, one
//! parser function per rule, and the `parse` entry point built from the
//! header's start expression. Rule names are mangled into valid Rust
//! identifiers; the original spelling survives in the error-stack tags.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Write;

use cranelift_entity::SecondaryMap;

use pegc::{charval, Node, NodeKind, StrSpan};
use pegc_runtime::CharProperty;

use crate::grammar::{ident_span, Grammar, RuleAttribute, RuleHandle};

#[rustfmt::skip]
const RUST_KEYWORDS: &[&str] = &[
    "as", "break", "const", "continue", "else", "enum", "extern", "false", "fn", "for", "if",
    "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref", "return", "static",
    "struct", "trait", "true", "type", "unsafe", "use", "where", "while", "async", "await", "dyn",
    "abstract", "become", "box", "do", "final", "macro", "override", "priv", "try", "typeof",
    "unsized", "virtual", "yield",
];

/// Keywords the raw-identifier syntax cannot express.
const RAW_FORBIDDEN: &[&str] = &["crate", "self", "super", "Self", "_"];

/// Names the generated file itself brings into scope, including the locals
/// of the emitted function bodies.
#[rustfmt::skip]
const RUNTIME_NAMES: &[&str] = &[
    "and_predicate", "any", "char_class", "char_property", "choice", "literal", "not_predicate",
    "optional", "repeat", "repeat_plus", "sequence", "parse",
    "c", "cursor", "src", "start", "result", "m", "children", "nodes", "node", "fail",
];

/// Emits the complete generated parser for a checked grammar.
pub fn emit(
    grammar: &Grammar,
    nullable: &BTreeSet<&[u8]>,
    source_name: &str,
    out: &mut String,
) {
    let emitter = Emitter::new(grammar);

    emitter.emit_prologue(source_name, out);
    emitter.emit_nullable_table(nullable, out);
    emitter.emit_classes(out);
    emitter.emit_node_type(out);
    emitter.emit_entry_point(out);
    for (handle, _) in grammar.active_rules() {
        emitter.emit_rule(handle, out);
    }

    log::debug!("emitted {} bytes of parser source", out.len());
}

struct Emitter<'g, 't> {
    grammar: &'g Grammar<'t>,
    functions: SecondaryMap<RuleHandle, String>,
    variants: SecondaryMap<RuleHandle, String>,
    /// Character classes in encounter order, identified by their span.
    classes: Vec<(StrSpan, Vec<(u32, u32)>)>,
}

impl<'g, 't> Emitter<'g, 't> {
    fn new(grammar: &'g Grammar<'t>) -> Emitter<'g, 't> {
        let mut functions = SecondaryMap::new();
        let mut variants = SecondaryMap::new();
        let mut used_functions = HashSet::new();
        let mut used_variants = HashSet::new();

        for (handle, def) in grammar.active_rules() {
            let name = grammar.name(handle);
            functions[handle] = mangle_function(name, &mut used_functions);
            if def.attribute != RuleAttribute::Void {
                variants[handle] = mangle_variant(name, &mut used_variants);
            }
        }

        let mut emitter = Emitter {
            grammar,
            functions,
            variants,
            classes: Vec::new(),
        };
        // the entry point always translates the start expression, even when
        // a later duplicate definition shadows the start rule's name and
        // drops its handle from the active set
        emitter.collect_classes(grammar.start_expr);
        let handles: Vec<RuleHandle> = grammar.active_rules().map(|(handle, _)| handle).collect();
        for handle in handles {
            emitter.collect_classes(grammar.rules[handle].expr);
        }
        emitter
    }

    fn collect_classes(&mut self, node: &Node) {
        if node.kind == NodeKind::Class
            && !self.classes.iter().any(|(span, _)| *span == node.span)
        {
            let ranges = self.class_ranges(node);
            self.classes.push((node.span, ranges));
        }
        for child in self.grammar.tree.children(node) {
            self.collect_classes(child);
        }
    }

    fn class_ranges(&self, class: &Node) -> Vec<(u32, u32)> {
        let mut ranges = Vec::new();
        for range in self.grammar.tree.children(class) {
            let chars = self.grammar.tree.children(range);
            let lo = self.decode_char(&chars[0]);
            let hi = match chars.get(1) {
                Some(char) => self.decode_char(char),
                None => lo,
            };
            ranges.push((lo as u32, hi as u32));
        }
        ranges.sort_unstable();
        ranges
    }

    fn decode_char(&self, char_node: &Node) -> char {
        debug_assert_eq!(char_node.kind, NodeKind::Char);
        let leaf = &self.grammar.tree.children(char_node)[0];
        match charval::decode_char(leaf.kind, leaf.text(self.grammar.src)) {
            Some(char) => char,
            None => {
                log::warn!(
                    "escape '{}' denotes no Unicode scalar value",
                    String::from_utf8_lossy(leaf.text(self.grammar.src))
                );
                char::REPLACEMENT_CHARACTER
            }
        }
    }

    fn class_index(&self, span: StrSpan) -> usize {
        self.classes
            .iter()
            .position(|(class_span, _)| *class_span == span)
            .unwrap()
    }

    fn emit_prologue(&self, source_name: &str, out: &mut String) {
        _ = write!(
            out,
            "\
//! This file is generated by pegc from '{source_name}'.
//! Edit the grammar file instead.

#![allow(unused_imports)]

use pegc_runtime::{{
    and_predicate, any, char_class, char_property, choice, literal, not_predicate, optional,
    repeat, repeat_plus, sequence,
}};
use pegc_runtime::{{
    CharProperty, CharSet, Cursor, FailKind, Leaf, Match, MatchResult, ParseReport, Value,
}};

"
        );
    }

    fn emit_nullable_table(&self, nullable: &BTreeSet<&[u8]>, out: &mut String) {
        out.push_str("/// Rules that may match the empty string.\n");
        out.push_str("pub static NULLABLE_RULES: &[&str] = &[");
        for (index, name) in nullable.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            _ = write!(out, "{:?}", String::from_utf8_lossy(name));
        }
        out.push_str("];\n\n");
    }

    fn emit_classes(&self, out: &mut String) {
        for (index, (_, ranges)) in self.classes.iter().enumerate() {
            _ = write!(out, "static CLASS_{index}: CharSet = CharSet::borrowed(&[");
            for (range_index, (lo, hi)) in ranges.iter().enumerate() {
                if range_index > 0 {
                    out.push_str(", ");
                }
                _ = write!(out, "({lo}, {hi})");
            }
            out.push_str("]);\n");
        }
        if !self.classes.is_empty() {
            out.push('\n');
        }
    }

    fn emit_node_type(&self, out: &mut String) {
        out.push_str("pub enum Node<'a> {\n");
        for (handle, def) in self.grammar.active_rules() {
            let payload = match def.attribute {
                RuleAttribute::Void => continue,
                RuleAttribute::Leaf => "Leaf<'a>",
                RuleAttribute::None => "Value<'a, Node<'a>>",
            };
            _ = writeln!(out, "    {}({payload}),", self.variants[handle]);
        }
        out.push_str("}\n\n");

        out.push_str("impl<'a> Node<'a> {\n");
        self.emit_dispatch(out, "start", "u32", "node.start");
        self.emit_dispatch(out, "end", "u32", "node.end");
        self.emit_dispatch(out, "text", "&'a [u8]", "node.text()");
        out.push_str("}\n\n");
    }

    fn emit_dispatch(&self, out: &mut String, method: &str, returns: &str, access: &str) {
        _ = writeln!(out, "    pub fn {method}(&self) -> {returns} {{");
        let mut any_variant = false;
        for (handle, def) in self.grammar.active_rules() {
            if def.attribute == RuleAttribute::Void {
                continue;
            }
            if !any_variant {
                out.push_str("        match self {\n");
                any_variant = true;
            }
            _ = writeln!(
                out,
                "            Node::{}(node) => {access},",
                self.variants[handle]
            );
        }
        match any_variant {
            true => out.push_str("        }\n    }\n"),
            false => out.push_str("        match *self {}\n    }\n"),
        }
    }

    fn emit_entry_point(&self, out: &mut String) {
        out.push_str(
            "pub fn parse(src: &[u8]) -> Result<Vec<Node<'_>>, ParseReport> {\n\
             \x20   let mut cursor = Cursor::new(src);\n\
             \x20   let c = &mut cursor;\n\
             \x20   let result: MatchResult<Node> = ",
        );
        self.translate(self.grammar.start_expr, out);
        out.push_str(
            ";\n\
             \x20   match result {\n\
             \x20       Ok(m) if c.is_eof() => {\n\
             \x20           let mut nodes = Vec::new();\n\
             \x20           m.append_into(&mut nodes);\n\
             \x20           Ok(nodes)\n\
             \x20       }\n\
             \x20       Ok(_) => {\n\
             \x20           c.fail(FailKind::UnexpectedChar);\n\
             \x20           Err(c.report())\n\
             \x20       }\n\
             \x20       Err(_) => Err(c.report()),\n\
             \x20   }\n\
             }\n\n",
        );
    }

    fn emit_rule(&self, handle: RuleHandle, out: &mut String) {
        let def = &self.grammar.rules[handle];
        let function = &self.functions[handle];
        let name = String::from_utf8_lossy(self.grammar.name(handle));

        _ = writeln!(
            out,
            "pub fn {function}<'a>(c: &mut Cursor<'a>) -> MatchResult<Node<'a>> {{"
        );
        out.push_str("    let start = c.mark();\n");
        _ = writeln!(out, "    c.push_rule({name:?});");
        out.push_str("    let result: MatchResult<Node> = ");
        self.translate(def.expr, out);
        out.push_str(";\n    c.pop_rule();\n    match result {\n");
        match def.attribute {
            RuleAttribute::None => {
                out.push_str("        Ok(m) => {\n");
                out.push_str("            let mut children = Vec::new();\n");
                out.push_str("            m.append_into(&mut children);\n");
                _ = writeln!(
                    out,
                    "            Ok(Match::One(Node::{}(Value {{ start, end: c.pos(), src: c.src(), children }})))",
                    self.variants[handle]
                );
                out.push_str("        }\n");
            }
            RuleAttribute::Leaf => {
                _ = writeln!(
                    out,
                    "        Ok(_) => Ok(Match::One(Node::{}(Leaf {{ start, end: c.pos(), src: c.src() }}))),",
                    self.variants[handle]
                );
            }
            RuleAttribute::Void => {
                out.push_str("        Ok(_) => Ok(Match::Void),\n");
            }
        }
        out.push_str(
            "        Err(fail) => {\n\
             \x20           c.reset(start);\n\
             \x20           Err(fail)\n\
             \x20       }\n\
             \x20   }\n\
             }\n\n",
        );
    }

    /// Writes the combinator expression recognizing `node`. Single-child
    /// expressions and sequences collapse to their only child.
    fn translate(&self, node: &Node, out: &mut String) {
        let children = self.grammar.tree.children(node);
        match node.kind {
            NodeKind::Expression => match children.len() {
                1 => self.translate(&children[0], out),
                _ => self.translate_list(children, "choice", out),
            },
            NodeKind::Sequence => match children.len() {
                1 => self.translate(&children[0], out),
                _ => self.translate_list(children, "sequence", out),
            },
            NodeKind::Prefix => match children[0].kind {
                NodeKind::And => self.translate_wrapper("and_predicate", &children[1], out),
                NodeKind::Not => self.translate_wrapper("not_predicate", &children[1], out),
                _ => self.translate(&children[0], out),
            },
            NodeKind::Suffix => match children.get(1).map(|operator| operator.kind) {
                Some(NodeKind::Question) => self.translate_wrapper("optional", &children[0], out),
                Some(NodeKind::Star) => self.translate_wrapper("repeat", &children[0], out),
                Some(NodeKind::Plus) => self.translate_wrapper("repeat_plus", &children[0], out),
                _ => self.translate(&children[0], out),
            },
            NodeKind::Primary => {
                let child = &children[0];
                match child.kind {
                    NodeKind::Identifier => self.translate_identifier(child, out),
                    NodeKind::Expression => self.translate(child, out),
                    NodeKind::Literal => {
                        out.push_str("literal(c, ");
                        write_byte_string(out, &self.literal_bytes(child));
                        out.push(')');
                    }
                    NodeKind::Class => {
                        _ = write!(out, "char_class(c, &CLASS_{})", self.class_index(child.span));
                    }
                    NodeKind::Dot => out.push_str("any(c)"),
                    _ => unreachable!(),
                }
            }
            _ => unreachable!("not an expression node: {:?}", node.kind),
        }
    }

    fn translate_list(&self, children: &[Node], combinator: &str, out: &mut String) {
        _ = write!(out, "{combinator}(c, &[");
        for (index, child) in children.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            out.push_str("|c| ");
            self.translate(child, out);
        }
        out.push_str("])");
    }

    fn translate_wrapper(&self, combinator: &str, operand: &Node, out: &mut String) {
        _ = write!(out, "{combinator}(c, |c| ");
        self.translate(operand, out);
        out.push(')');
    }

    fn translate_identifier(&self, identifier: &Node, out: &mut String) {
        let name_span = ident_span(self.grammar.tree, identifier);
        let name = name_span.as_bytes(self.grammar.src);
        if let Some(property) = CharProperty::from_name(name) {
            _ = write!(out, "char_property(c, CharProperty::{property:?})");
            return;
        }
        let handle = self.grammar.by_name[name];
        _ = write!(out, "{}(c)", self.functions[handle]);
    }

    fn literal_bytes(&self, literal: &Node) -> Vec<u8> {
        let mut text = String::new();
        for char_node in self.grammar.tree.children(literal) {
            text.push(self.decode_char(char_node));
        }
        text.into_bytes()
    }
}

fn write_byte_string(out: &mut String, bytes: &[u8]) {
    out.push_str("b\"");
    for &byte in bytes {
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            _ => _ = write!(out, "\\x{byte:02x}"),
        }
    }
    out.push('"');
}

/// Lowercases the rule name, maps the `:` namespace separator to `__`, and
/// quotes or suffixes names Rust reserves.
fn mangle_function(name: &[u8], used: &mut HashSet<String>) -> String {
    let mut base = String::new();
    for &byte in name {
        match byte {
            b':' => base.push_str("__"),
            other => base.push(other.to_ascii_lowercase() as char),
        }
    }
    if RAW_FORBIDDEN.contains(&base.as_str()) || RUNTIME_NAMES.contains(&base.as_str()) {
        base.push('_');
    } else if RUST_KEYWORDS.contains(&base.as_str()) {
        base = format!("r#{base}");
    }
    uniquify(base, used)
}

fn mangle_variant(name: &[u8], used: &mut HashSet<String>) -> String {
    let mut base = String::new();
    for &byte in name {
        match byte {
            b':' => base.push('_'),
            other => base.push(other as char),
        }
    }
    let mut chars = base.chars();
    if let Some(first) = chars.next() {
        base = first.to_ascii_uppercase().to_string() + chars.as_str();
    }
    // `Self` is reserved even as a raw identifier
    if base == "Self" {
        base.push('_');
    }
    uniquify(base, used)
}

fn uniquify(base: String, used: &mut HashSet<String>) -> String {
    let mut unique = base.clone();
    let mut counter = 2;
    while !used.insert(unique.clone()) {
        unique = format!("{base}_{counter}");
        counter += 1;
    }
    unique
}
