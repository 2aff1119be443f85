//! Property tests for incremental reparsing.
//!
//! Whatever path a reparse takes, the tree and errors it produces must be
//! identical to a fresh parse of the edited text.
//!
//! Run with: cargo test -p joule-syntax --test incremental_test

use joule_syntax::{
    parse, JsonnetParser, ReparseKind, SourceParser, SyntaxKind, TextEdit, TextRange, TextSize,
};
use proptest::prelude::*;

// ============================================================================
// Arbitrary generators
// ============================================================================

const DOCUMENTS: &[&str] = &[
    "local x = 1; local x = 2; x",
    "{ a: 1, b: [1, 2, 3], c: { d: 'e' } }",
    "local f(a, b=2) = a + b; f(1, b=3)",
    "[x * 2 for x in std.range(0, 10) if x % 2 == 0]",
    "{ [k]: v for k in ['a', 'b'] }",
    "local o = { a: 1 } + { b: self.a }; o.b",
    "// comment\n{ /* block */ a: |||\n  text\n|||, b: @'v''s' }",
    "if a then (b + c) else error 'no'",
    "assert x > 0 : 'positive'; { x: x }",
    "{ a: 1, b: ",
    "[1, (2, 3]",
];

const FRAGMENTS: &[&str] = &[
    "", " ", "\n", "a", "xy", "1", "2.5", "{", "}", "[", "]", "(", ")", ",", ":", "::", ";",
    "=", "+", ".", "'", "\"", "local ", "for ", " in ", "if ", "//", "/*", "*/", "|||\n",
    "self", "$", "é", "f(x)", "{ k: v }",
];

fn floor_boundary(text: &str, mut at: usize) -> usize {
    while !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}

fn ceil_boundary(text: &str, mut at: usize) -> usize {
    while !text.is_char_boundary(at) {
        at += 1;
    }
    at
}

fn make_edit(text: &str, at: prop::sample::Index, len: usize, insert: &str) -> TextEdit {
    let start = floor_boundary(text, at.index(text.len() + 1));
    let end = ceil_boundary(text, (start + len).min(text.len()));
    TextEdit::new(
        TextRange::new(TextSize::from(start as u32), TextSize::from(end as u32)),
        insert,
    )
}

fn arb_edits() -> impl Strategy<Value = Vec<(prop::sample::Index, usize, &'static str)>> {
    prop::collection::vec(
        (any::<prop::sample::Index>(), 0usize..6, prop::sample::select(FRAGMENTS)),
        1..8,
    )
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// A chain of single edits, each reparsed from the previous tree.
    #[test]
    fn prop_incremental_equals_full(
        doc in prop::sample::select(DOCUMENTS),
        edits in arb_edits(),
    ) {
        let mut text = doc.to_string();
        let mut current = parse(&text);
        for (at, len, insert) in edits {
            let edit = make_edit(&text, at, len, insert);
            edit.apply(&mut text);
            let (next, _) = current.reparse(&edit, &text);
            prop_assert_eq!(&next, &parse(&text));
            prop_assert_eq!(next.text(), text.clone());
            current = next;
        }
    }

    /// The same edits delivered as one batch.
    #[test]
    fn prop_batched_edits_equal_full(
        doc in prop::sample::select(DOCUMENTS),
        edits in arb_edits(),
    ) {
        let old = parse(doc);
        let mut text = doc.to_string();
        let mut batch = Vec::new();
        for (at, len, insert) in edits {
            let edit = make_edit(&text, at, len, insert);
            edit.apply(&mut text);
            batch.push(edit);
        }
        prop_assert_eq!(JsonnetParser.reparse(&old, &batch, &text), parse(&text));
    }
}

// ============================================================================
// Typing sessions
// ============================================================================

#[test]
fn test_typing_character_by_character() {
    let target = "local conf = { name: 'web', ports: [80, 443] }; conf.ports[0]";
    let mut text = String::new();
    let mut current = parse(&text);
    for (i, c) in target.char_indices() {
        let edit = TextEdit::new(TextRange::empty(TextSize::from(i as u32)), c.to_string());
        edit.apply(&mut text);
        current = current.reparse(&edit, &text).0;
        assert_eq!(current, parse(&text), "diverged after typing {text:?}");
    }
    assert!(current.errors().is_empty());
}

#[test]
fn test_deleting_from_the_middle() {
    let mut text = String::from("{ a: [1, 2, 3], b: { c: (4 + 5) } }");
    let mut current = parse(&text);
    while text.len() > 2 {
        let mid = text.len() / 2;
        let edit = TextEdit::new(
            TextRange::new(TextSize::from(mid as u32 - 1), TextSize::from(mid as u32)),
            "",
        );
        edit.apply(&mut text);
        current = current.reparse(&edit, &text).0;
        assert_eq!(current, parse(&text), "diverged at {text:?}");
    }
}

#[test]
fn test_comment_edit_takes_token_path() {
    let text = "local x = 1; // note\nx";
    let old = parse(text);
    let edit = TextEdit::new(TextRange::new(16.into(), 17.into()), "NOTE");
    let mut new_text = text.to_string();
    edit.apply(&mut new_text);
    let (new, kind) = old.reparse(&edit, &new_text);
    assert_eq!(kind, ReparseKind::Token);
    assert_ne!(new, old);
    assert_eq!(new, parse(&new_text));
}

#[test]
fn test_block_edit_at_nesting_limit_matches_full_parse() {
    // 499 arrays sit just inside the limit; one more level crosses it.
    let text = format!("{}[1]{}", "[".repeat(498), "]".repeat(498));
    let old = parse(&text);
    assert!(old.errors().is_empty());

    let at = TextSize::from(500);
    let edit = TextEdit::new(TextRange::empty(at), ", [2]");
    let mut new_text = text.clone();
    edit.apply(&mut new_text);
    let (new, kind) = old.reparse(&edit, &new_text);
    assert_eq!(kind, ReparseKind::Full);
    assert_eq!(new, parse(&new_text));
    assert!(new
        .errors()
        .iter()
        .any(|e| e.message == "expression nested too deeply"));
}

#[test]
fn test_block_edit_in_shallow_document_stays_incremental() {
    let text = format!("{}[1]{}", "[".repeat(20), "]".repeat(20));
    let old = parse(&text);
    let edit = TextEdit::new(TextRange::empty(TextSize::from(22)), ", [2]");
    let mut new_text = text.clone();
    edit.apply(&mut new_text);
    let (new, kind) = old.reparse(&edit, &new_text);
    assert_eq!(kind, ReparseKind::Block(SyntaxKind::ARRAY));
    assert_eq!(new, parse(&new_text));
}
