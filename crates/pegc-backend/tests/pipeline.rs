//! End-to-end runs of the generator pipeline: grammar text in, diagnostics
//! or emitted parser source out.

use std::collections::BTreeSet;

use pegc::{Diagnostic, Diagnostics, DiagnosticTag, ParsedGrammar};
use pegc_backend::{check, emit, Grammar};

enum Outcome {
    Generated(String),
    Rejected(Vec<Diagnostic>),
}

fn run(src: &str) -> Outcome {
    let diag = Diagnostics::new();
    let tree = ParsedGrammar::new(src.as_bytes(), &diag);
    let grammar = match Grammar::new(src.as_bytes(), &tree) {
        Some(grammar) => grammar,
        None => return Outcome::Rejected(diag.take()),
    };
    let nullable = check(&grammar, &diag);
    if !diag.is_empty() {
        return Outcome::Rejected(diag.take());
    }
    let mut out = String::new();
    emit(&grammar, &nullable, "pipeline.peg", &mut out);
    Outcome::Generated(out)
}

fn rejected(src: &str) -> Vec<Diagnostic> {
    match run(src) {
        Outcome::Rejected(diagnostics) => diagnostics,
        Outcome::Generated(_) => panic!("grammar was accepted: {src}"),
    }
}

fn generated(src: &str) -> String {
    match run(src) {
        Outcome::Generated(out) => out,
        Outcome::Rejected(diagnostics) => panic!("grammar was rejected: {diagnostics:?}"),
    }
}

#[test]
fn trivial_identity() {
    let out = generated("PEG G (A) A <- \"x\"; END ;");
    assert!(out.contains("pub fn parse(src: &[u8])"));
    assert!(out.contains("literal(c, b\"x\")"));
    // full input consumption is required, so "xx" and "" are rejected by
    // the eof gate in the entry point
    assert!(out.contains("Ok(m) if c.is_eof() =>"));
}

#[test]
fn direct_left_recursion_is_reported() {
    let diagnostics = rejected("PEG G (A) A <- A \"x\" / \"y\"; END ;");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].tag, DiagnosticTag::LeftRecursion);
    assert!(diagnostics[0].message.ends_with("A -> A"), "{}", diagnostics[0].message);
}

#[test]
fn indirect_left_recursion_is_reported() {
    let diagnostics = rejected("PEG G (A) A <- B; B <- A; END ;");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].tag, DiagnosticTag::LeftRecursion);
    assert!(
        diagnostics[0].message.ends_with("A -> B -> A"),
        "{}",
        diagnostics[0].message
    );
}

#[test]
fn nullable_star_is_rejected() {
    let diagnostics = rejected("PEG G (A) A <- (B)*; B <- \"x\"?; END ;");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].tag, DiagnosticTag::Unnullable);
    // the diagnostic points at the star operator
    let src = "PEG G (A) A <- (B)*; B <- \"x\"?; END ;";
    let span = diagnostics[0].span;
    assert_eq!(&src[span.start as usize..span.end as usize], "*");
}

#[test]
fn undefined_identifier_is_reported() {
    let diagnostics = rejected("PEG G (A) A <- B; END ;");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].tag, DiagnosticTag::UndefinedIdent);
    assert!(diagnostics[0].message.contains("'B'"));
}

#[test]
fn character_class_ranges_are_expanded() {
    let out = generated("PEG G (A) A <- [a-c0-9]; END ;");
    assert!(
        out.contains("static CLASS_0: CharSet = CharSet::borrowed(&[(48, 57), (97, 99)]);"),
        "{out}"
    );
}

#[test]
fn parse_errors_carry_expectations() {
    let diagnostics = rejected("PEG");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].tag, DiagnosticTag::ParseError);
    assert!(
        diagnostics[0].message.contains("an identifier"),
        "{}",
        diagnostics[0].message
    );
}

#[test]
fn shadowed_start_rule_keeps_its_start_expression() {
    // the later definition of G wins the name, but the entry point is still
    // built from the header's start expression, class included
    let out = generated("PEG G ([a-z]) G <- 'x'; END ;");
    assert!(
        out.contains("static CLASS_0: CharSet = CharSet::borrowed(&[(97, 122)]);"),
        "{out}"
    );
    assert!(
        out.contains("let result: MatchResult<Node> = char_class(c, &CLASS_0);"),
        "{out}"
    );
    // the surviving definition of G is the one emitted as a rule function
    assert!(out.contains("literal(c, b\"x\")"), "{out}");
}

#[test]
fn output_is_deterministic() {
    let src = "PEG G (Expr) \
               Expr <- Term ('+' Term)*; \
               leaf: Term <- [0-9]+; \
               void: Space <- ' '*; \
               END ;";
    assert_eq!(generated(src), generated(src));
}

#[test]
fn self_description_round_trips() {
    // a fragment of the grammar language described in itself
    let src = "\
PEG Peg (Grammar)
  Grammar    <- Header Definition*;
  Header     <- Identifier Expression;
  Definition <- Identifier Expression;
  Expression <- Sequence Sequence*;
  Sequence   <- Identifier+;
  leaf: Identifier <- [a-z]+;
END ;";
    let diag = Diagnostics::new();
    let tree = ParsedGrammar::new(src.as_bytes(), &diag);
    assert!(diag.is_empty(), "{:?}", diag.get());

    // parser idempotence: leaf spans concatenate to the semantic content,
    // which excludes the structural punctuation and the range dash
    let expected = "PegGrammarGrammarHeaderDefinition*HeaderIdentifierExpression\
                    DefinitionIdentifierExpressionExpressionSequenceSequence*\
                    SequenceIdentifier+leafIdentifieraz+"
        .as_bytes()
        .to_vec();
    assert_eq!(tree.leaf_text(src.as_bytes()), expected);

    let grammar = Grammar::new(src.as_bytes(), &tree).unwrap();
    let nullable = check(&grammar, &diag);
    assert!(diag.is_empty(), "{:?}", diag.get());
    assert_eq!(nullable, BTreeSet::new());

    let mut out = String::new();
    emit(&grammar, &nullable, "peg.peg", &mut out);
    assert!(out.contains("pub fn grammar<'a>"), "{out}");
    assert!(out.contains("Identifier(Leaf<'a>)"), "{out}");
}
