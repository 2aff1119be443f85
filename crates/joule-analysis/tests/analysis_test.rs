//! Integration tests for scope building and diagnostics.
//!
//! Run with: cargo test -p joule-analysis --test analysis_test

use joule_analysis::{
    diagnose, Builtins, DiagnosticOptions, ErrorCode, ScopeKind, ScopeTree, SymbolKind,
};
use joule_loader::{Loader, MemoryFileSystem, SearchPaths};
use joule_syntax::{TextEdit, TextRange, TextSize};
use proptest::prelude::*;
use std::path::Path;
use std::sync::Arc;

fn build(source: &str) -> ScopeTree {
    ScopeTree::build(&joule_syntax::parse(source), 1, &Builtins::standard())
}

fn offset_of(source: &str, needle: &str) -> TextSize {
    TextSize::from(source.rfind(needle).unwrap() as u32)
}

fn visible_names(tree: &ScopeTree, at: TextSize) -> Vec<String> {
    tree.visible_at(at)
        .into_iter()
        .map(|id| tree.symbol(id).name.clone())
        .collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_redefinition_resolves_to_latest() {
    let source = "local x = 1; local x = 2; x";
    let tree = build(source);

    let xs: Vec<_> = tree.symbols().filter(|(_, s)| s.name == "x").collect();
    assert_eq!(xs.len(), 2);
    let (first_id, first) = xs[0];
    let (second_id, second) = xs[1];
    assert_eq!(tree.scope(first.scope).kind, ScopeKind::Document);
    assert_eq!(first.scope, second.scope);
    assert!(first.shadowed);
    assert!(!second.shadowed);

    let reference = tree.reference_at(offset_of(source, "x")).unwrap();
    assert_eq!(reference.symbol, Some(second_id));
    assert_ne!(reference.symbol, Some(first_id));
    assert_eq!(second.range, TextRange::new(19.into(), 20.into()));
}

#[test]
fn test_comment_edit_keeps_scopes() {
    let builtins = Builtins::standard();
    let before = "local x = 1; local y = x; { a: y } // settings\n";
    let parse = joule_syntax::parse(before);
    let old = ScopeTree::build(&parse, 1, &builtins);

    let at = offset_of(before, "settings");
    let edit = TextEdit::new(TextRange::empty(at), "s");
    let mut after = before.to_string();
    edit.apply(&mut after);
    let (reparsed, _) = parse.reparse(&edit, &after);
    let new = ScopeTree::build(&reparsed, 2, &builtins);

    assert_ne!(parse, reparsed);
    assert_eq!(new.version(), 2);
    assert!(old.same_content(&new));
}

#[test]
fn test_comment_edit_mid_file_carries_scopes_over() {
    let builtins = Builtins::standard();
    let before = "local x = 1;\n// tuning knobs\nlocal y = x;\n{ a: y, b: std.length([x]) }\n";
    let parse = joule_syntax::parse(before);
    let old = ScopeTree::build(&parse, 1, &builtins);

    let at = offset_of(before, "knobs");
    let edit = TextEdit::new(TextRange::empty(at), "extra ");
    let mut after = before.to_string();
    edit.apply(&mut after);
    let (reparsed, _) = parse.reparse(&edit, &after);
    let fresh = ScopeTree::build(&reparsed, 2, &builtins);

    // Everything after the comment moved.
    assert!(!old.same_content(&fresh));
    let carried = old.carried_over(&parse, &reparsed, 2).unwrap();
    assert_eq!(carried.version(), 2);
    assert!(carried.same_content(&fresh));
}

#[test]
fn test_code_edit_is_not_carried_over() {
    let builtins = Builtins::standard();
    let before = "local x = 1; x";
    let parse = joule_syntax::parse(before);
    let old = ScopeTree::build(&parse, 1, &builtins);

    let renamed = joule_syntax::parse("local xy = 1; x");
    assert!(old.carried_over(&parse, &renamed, 2).is_none());
}

#[test]
fn test_space_between_touching_tokens_is_not_carried_over() {
    let builtins = Builtins::standard();
    let parse = joule_syntax::parse("local x = 1; x+x");
    let old = ScopeTree::build(&parse, 1, &builtins);

    let spaced = joule_syntax::parse("local x = 1; x +x");
    assert!(old.carried_over(&parse, &spaced, 2).is_none());
}

#[test]
fn test_deep_nesting_builds_scopes() {
    let source = "[".repeat(100_000);
    let tree = build(&source);
    let at = tree.scope_at(TextSize::from(50_000));
    assert_eq!(tree.scope(at).kind, ScopeKind::Document);

    let source = format!("local v = 1; {}v", "v + ".repeat(400));
    let tree = build(&source);
    assert_eq!(tree.references().len(), 401);
    assert!(tree.references().iter().all(|r| r.symbol.is_some()));
}

#[test]
fn test_completion_order_inside_nested_scopes() {
    let source = "local top = 1; local f(p) = { local o = 2, field: [ z for z in [p] ] }; f(top)";
    let tree = build(source);
    let at = offset_of(source, "z for");
    let names = visible_names(&tree, at);
    // Fields are reached through `self`, never by name.
    assert_eq!(names, vec!["z", "o", "p", "top", "f", "std"]);
}

#[test]
fn test_completion_hides_shadowed_declarations() {
    let source = "local a = 1; local a = 'two'; local b = a; b";
    let tree = build(source);
    let names = visible_names(&tree, TextSize::of(source));
    assert_eq!(names, vec!["a", "b", "std"]);
    let a = tree.visible_at(TextSize::of(source))[0];
    assert_eq!(tree.symbol(a).value.to_string(), "\"two\"");
}

#[test]
fn test_mutual_imports_one_cycle_each() {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.insert("/w/a.jsonnet", "local b = import 'b.jsonnet'; b");
    fs.insert("/w/b.jsonnet", "local a = import 'a.jsonnet'; a");
    let loader = Loader::new(fs, SearchPaths::default());
    let builtins = Builtins::standard();

    for path in ["/w/a.jsonnet", "/w/b.jsonnet"] {
        let file = loader.load(Path::new(path)).unwrap();
        let imports = loader.resolve_document(Path::new(path), &file.parse);
        let scopes = ScopeTree::build(&file.parse, 1, &builtins);
        let set = diagnose(&file.parse, &scopes, &imports, DiagnosticOptions::default());
        assert_eq!(set.with_code(ErrorCode::CyclicImport).count(), 1, "{path}");
        assert_eq!(set.diagnostics.len(), 1, "{path}: {:?}", set.diagnostics);
    }
}

#[test]
fn test_import_alias_symbols() {
    let tree = build("local k = import 'k.libsonnet', s = importstr 'x.txt'; [k, s]");
    let kinds: Vec<_> = tree
        .symbols()
        .filter(|(_, s)| s.kind != SymbolKind::Builtin)
        .map(|(_, s)| s.kind)
        .collect();
    assert_eq!(kinds, vec![SymbolKind::ImportAlias, SymbolKind::ImportAlias]);
}

#[test]
fn test_malformed_input_still_has_scopes() {
    let source = "local a = 1; { b: a, c: ";
    let tree = build(source);
    assert!(tree.references().iter().all(|r| r.symbol.is_some()));
    assert!(tree.symbols().any(|(_, s)| s.name == "b" && s.kind == SymbolKind::Field));
}

// ============================================================================
// Property tests
// ============================================================================

const NAMES: [&str; 4] = ["a", "b", "c", "d"];

/// A chain of `local` groups; each bind is `(name, referenced name)`.
fn arb_chain() -> impl Strategy<Value = (Vec<Vec<(usize, usize)>>, usize)> {
    (
        prop::collection::vec(prop::collection::vec((0..4usize, 0..4usize), 1..4), 1..5),
        0..4usize,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Lookup finds a name exactly when a manual walk of the chain does, and
    /// always picks the latest visible declaration.
    #[test]
    fn prop_lookup_matches_manual_walk((groups, body) in arb_chain()) {
        let mut source = String::new();
        for group in &groups {
            let binds: Vec<String> = group
                .iter()
                .map(|&(name, value)| format!("{} = {}", NAMES[name], NAMES[value]))
                .collect();
            source.push_str(&format!("local {}; ", binds.join(", ")));
        }
        source.push_str(NAMES[body]);
        let tree = build(&source);

        let mut expected = Vec::new();
        for (i, group) in groups.iter().enumerate() {
            for &(_, value) in group {
                let declared = groups[..=i].iter().flatten().any(|&(n, _)| n == value);
                expected.push((value, declared));
            }
        }
        expected.push((body, groups.iter().flatten().any(|&(n, _)| n == body)));

        prop_assert_eq!(tree.references().len(), expected.len());
        for (reference, &(name, declared)) in tree.references().iter().zip(&expected) {
            prop_assert_eq!(&reference.name, NAMES[name]);
            prop_assert_eq!(reference.symbol.is_some(), declared);
            if let Some(id) = reference.symbol {
                prop_assert_eq!(&tree.symbol(id).name, &reference.name);
                let latest = tree
                    .symbols()
                    .filter(|(_, s)| {
                        s.name == reference.name && s.is_visible_at(reference.range.start())
                    })
                    .map(|(id, _)| id)
                    .last();
                prop_assert_eq!(latest, Some(id));
            }
        }
    }
}
