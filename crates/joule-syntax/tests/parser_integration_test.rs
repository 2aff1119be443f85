//! Integration tests for the parser crate.
//!
//! Tests cover the expression grammar, error recovery and losslessness.

use joule_syntax::ast::{AstNode, Expr, SourceFile};
use joule_syntax::{parse, Parse, SyntaxKind, SyntaxNode};

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_ok(source: &str) -> Parse {
    let result = parse(source);
    assert!(
        result.errors().is_empty(),
        "expected no errors, got: {:?}",
        result.errors()
    );
    result
}

fn body(parse: &Parse) -> SyntaxNode {
    SourceFile::cast(parse.syntax_node())
        .and_then(|file| file.body())
        .map(|expr| expr.syntax().clone())
        .expect("document has a body")
}

/// Node kinds in preorder, tokens skipped.
fn node_kinds(node: &SyntaxNode) -> Vec<SyntaxKind> {
    node.descendants().map(|n| n.kind()).collect()
}

fn count_kind(parse: &Parse, kind: SyntaxKind) -> usize {
    parse
        .syntax_node()
        .descendants()
        .filter(|n| n.kind() == kind)
        .count()
}

// ============================================================================
// Well-formed documents
// ============================================================================

#[test]
fn test_parse_realistic_document() {
    let source = r#"
// Service definition
local lib = import 'lib.libsonnet';
local port = 8080;
local service(name, replicas=1) = {
  name: name,
  replicas:: replicas,
  labels+: { app: name },
  [if replicas > 1 then 'ha']: true,
  assert replicas > 0 : 'need at least one replica',
};

{
  web: service('web', replicas=3) + { port: port },
  ports: [p * 2 for p in [port, port + 1] if p != 0],
  byName: { [s.name]: s for s in [self.web] },
  text: |||
    hello
  |||,
  slice: 'abcdef'[1:3],
  nested: lib.helpers.fmt(self.web.name) tailstrict,
  check: std.length(super.items) > 0 && !false,
}
"#;
    let result = parse_ok(source);
    assert_eq!(result.text(), source);
    assert_eq!(count_kind(&result, SyntaxKind::ARRAY_COMP), 1);
    assert_eq!(count_kind(&result, SyntaxKind::OBJECT_COMP), 1);
    assert_eq!(count_kind(&result, SyntaxKind::IMPORT_EXPR), 1);
    assert_eq!(count_kind(&result, SyntaxKind::ASSERT_MEMBER), 1);
}

#[test]
fn test_multiplication_binds_tighter_than_addition() {
    let result = parse_ok("1 + 2 * 3");
    assert_eq!(
        node_kinds(&body(&result)),
        [
            SyntaxKind::BINARY_EXPR,
            SyntaxKind::LITERAL,
            SyntaxKind::BINARY_EXPR,
            SyntaxKind::LITERAL,
            SyntaxKind::LITERAL,
        ]
    );
}

#[test]
fn test_binary_operators_are_left_associative() {
    let result = parse_ok("a - b - c");
    let root = body(&result);
    let lhs = root.first_child().expect("lhs");
    assert_eq!(lhs.kind(), SyntaxKind::BINARY_EXPR);
    assert_eq!(lhs.text(), "a - b");
}

#[test]
fn test_logical_precedence() {
    let result = parse_ok("a || b && c");
    let root = body(&result);
    let rhs = root.children().nth(1).expect("rhs");
    assert_eq!(rhs.kind(), SyntaxKind::BINARY_EXPR);
    assert_eq!(rhs.text(), "b && c");
}

#[test]
fn test_postfix_chain() {
    let result = parse_ok("a.b[0](x) { c: 1 }");
    assert_eq!(
        node_kinds(&body(&result))[..5],
        [
            SyntaxKind::OBJ_EXTEND,
            SyntaxKind::CALL_EXPR,
            SyntaxKind::INDEX_EXPR,
            SyntaxKind::FIELD_ACCESS,
            SyntaxKind::VAR_REF,
        ]
    );
}

#[test]
fn test_unary_binds_tighter_than_binary() {
    let result = parse_ok("-a + b");
    let root = body(&result);
    assert_eq!(root.kind(), SyntaxKind::BINARY_EXPR);
    assert_eq!(root.first_child().map(|n| n.kind()), Some(SyntaxKind::UNARY_EXPR));
}

#[test]
fn test_local_extends_to_the_right() {
    let result = parse_ok("1 + local x = 2; x * 3");
    let root = body(&result);
    assert_eq!(root.kind(), SyntaxKind::BINARY_EXPR);
    let rhs = root.children().nth(1).expect("rhs");
    assert_eq!(rhs.kind(), SyntaxKind::LOCAL_EXPR);
    assert_eq!(rhs.text(), "local x = 2; x * 3");
}

#[test]
fn test_chained_locals_nest() {
    let result = parse_ok("local x = 1; local x = 2; x");
    let root = body(&result);
    assert_eq!(root.kind(), SyntaxKind::LOCAL_EXPR);
    let Some(Expr::Local(inner)) = root.children().find_map(Expr::cast) else {
        panic!("expected nested local");
    };
    assert_eq!(inner.binds().count(), 1);
}

#[test]
fn test_comprehension_kinds() {
    assert_eq!(body(&parse_ok("[x for x in y]")).kind(), SyntaxKind::ARRAY_COMP);
    assert_eq!(body(&parse_ok("[x, y]")).kind(), SyntaxKind::ARRAY);
    assert_eq!(
        body(&parse_ok("{ [k]: 1 for k in ks }")).kind(),
        SyntaxKind::OBJECT_COMP
    );
    assert_eq!(body(&parse_ok("{ k: 1 }")).kind(), SyntaxKind::OBJECT);
}

#[test]
fn test_trivia_is_preserved() {
    let source = "  /* lead */ { a /* mid */ : 1 } # trail\n";
    let result = parse_ok(source);
    assert_eq!(result.text(), source);
}

// ============================================================================
// Error recovery
// ============================================================================

#[test]
fn test_missing_field_value() {
    let result = parse("{ a: , b: 2 }");
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].message, "expected expression");
    assert_eq!(usize::from(result.errors()[0].range.start()), 5);
    assert_eq!(count_kind(&result, SyntaxKind::FIELD), 2);
}

#[test]
fn test_unclosed_array() {
    let result = parse("[1, 2");
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].message, "expected ']'");
    assert_eq!(usize::from(result.errors()[0].range.start()), 5);
    assert_eq!(body(&result).kind(), SyntaxKind::ARRAY);
}

#[test]
fn test_trailing_tokens() {
    let result = parse("1 2");
    assert_eq!(result.errors().len(), 1);
    assert_eq!(
        result.errors()[0].message,
        "unexpected tokens after end of document"
    );
    assert_eq!(count_kind(&result, SyntaxKind::ERROR), 1);
}

#[test]
fn test_empty_document() {
    let result = parse("   ");
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].message, "expected expression");
    assert_eq!(result.text(), "   ");
}

#[test]
fn test_import_requires_string() {
    let result = parse("import x");
    assert!(result
        .errors()
        .iter()
        .any(|e| e.message == "expected string literal after import"));
}

#[test]
fn test_mismatched_closers_stay_lossless() {
    let source = "{ a: ( ] }";
    let result = parse(source);
    assert!(!result.errors().is_empty());
    assert_eq!(result.text(), source);
}

#[test]
fn test_recovery_keeps_later_members() {
    let result = parse("{ a: 1 b: 2, c: 3 }");
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].message, "expected ',' or '}'");
    assert_eq!(count_kind(&result, SyntaxKind::FIELD), 3);
}

#[test]
fn test_errors_are_sorted() {
    let result = parse("{ a: , b: \"open");
    let starts: Vec<_> = result.errors().iter().map(|e| e.range.start()).collect();
    let mut sorted = starts.clone();
    sorted.sort();
    assert_eq!(starts, sorted);
}

#[test]
fn test_garbage_is_lossless() {
    let source = "}}] local ; if then @ é ||| [(";
    let result = parse(source);
    assert!(!result.errors().is_empty());
    assert_eq!(result.text(), source);
}

// ============================================================================
// Nesting limit
// ============================================================================

/// Depth of the deepest node, walked without recursion.
fn tree_depth(parse: &Parse) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0;
    for event in parse.syntax_node().preorder() {
        match event {
            rowan::WalkEvent::Enter(_) => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            rowan::WalkEvent::Leave(_) => depth -= 1,
        }
    }
    deepest
}

fn too_deep_count(parse: &Parse) -> usize {
    parse
        .errors()
        .iter()
        .filter(|e| e.message == "expression nested too deeply")
        .count()
}

#[test]
fn test_deeply_nested_brackets() {
    let source = "[".repeat(100_000);
    let result = parse(&source);
    assert_eq!(result.text(), source);
    assert_eq!(too_deep_count(&result), 1);
    // Every unclosed level reports the same missing ']' once.
    assert_eq!(result.errors().len(), 2);
    assert!(tree_depth(&result) < 1_000);
}

#[test]
fn test_deeply_nested_parens_and_unary() {
    for source in ["(".repeat(100_000), format!("{}1", "-".repeat(100_000))] {
        let result = parse(&source);
        assert_eq!(result.text(), source);
        assert_eq!(too_deep_count(&result), 1, "{}", &source[..8]);
        assert!(tree_depth(&result) < 1_000);
    }
}

#[test]
fn test_long_operator_chain_is_bounded() {
    let source = format!("{}a", "a + ".repeat(100_000));
    let result = parse(&source);
    assert_eq!(result.text(), source);
    assert_eq!(too_deep_count(&result), 1);
    assert!(tree_depth(&result) < 1_000);
}

#[test]
fn test_moderate_nesting_parses_cleanly() {
    let source = format!("{}1{}", "{ a: [".repeat(100), "] }".repeat(100));
    let result = parse_ok(&source);
    assert_eq!(count_kind(&result, SyntaxKind::OBJECT), 100);
    assert_eq!(count_kind(&result, SyntaxKind::ARRAY), 100);
}
