//! Integration tests for the loader crate.
//!
//! Run with: cargo test -p joule-loader --test loader_test

use joule_loader::{
    ImportStatus, LoadError, Loader, MemoryFileSystem, OsFileSystem, SearchPaths,
};
use proptest::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn memory_loader(files: &[(&str, &str)]) -> (Arc<MemoryFileSystem>, Loader) {
    let fs = Arc::new(MemoryFileSystem::new());
    for (path, text) in files {
        fs.insert(*path, *text);
    }
    let loader = Loader::new(fs.clone(), SearchPaths::new(vec![], Some("/w".into())));
    (fs, loader)
}

fn cycle_count(loader: &Loader, path: &str) -> usize {
    let file = loader.load(Path::new(path)).expect("file loads");
    loader
        .resolve_document(Path::new(path), &file.parse)
        .imports
        .iter()
        .filter(|i| matches!(i.status, ImportStatus::Unresolved(LoadError::CyclicImport { .. })))
        .count()
}

// ============================================================================
// Filesystem-backed loading
// ============================================================================

#[test]
fn test_load_from_disk_with_library_root() {
    let workspace = tempfile::tempdir().unwrap();
    let lib = tempfile::tempdir().unwrap();
    fs::create_dir_all(workspace.path().join("app")).unwrap();
    fs::write(
        workspace.path().join("app/main.jsonnet"),
        "local k = import 'k.libsonnet'; k.deployment('web')",
    )
    .unwrap();
    fs::write(
        lib.path().join("k.libsonnet"),
        "{ deployment(name):: { kind: 'Deployment', name: name } }",
    )
    .unwrap();

    let loader = Loader::new(
        Arc::new(OsFileSystem),
        SearchPaths::new(
            vec![lib.path().to_path_buf()],
            Some(workspace.path().to_path_buf()),
        ),
    );
    let main_path = workspace.path().join("app/main.jsonnet");
    let main = loader.load(&main_path).unwrap();
    let imports = loader.resolve_document(&main_path, &main.parse);

    assert!(imports.is_settled());
    let ImportStatus::Resolved(resolved) = &imports.imports[0].status else {
        panic!("expected resolved, got {:?}", imports.imports[0].status);
    };
    assert_eq!(resolved.path, lib.path().join("k.libsonnet"));
    let target = resolved.file.as_ref().expect("code imports are parsed");
    assert!(target.parse.errors().is_empty());
}

#[test]
fn test_vendor_directory_is_searched_before_workspace_root() {
    let workspace = tempfile::tempdir().unwrap();
    fs::create_dir_all(workspace.path().join("vendor")).unwrap();
    fs::create_dir_all(workspace.path().join("app")).unwrap();
    fs::write(workspace.path().join("vendor/lib.libsonnet"), "{ from: 'vendor' }").unwrap();
    fs::write(workspace.path().join("lib.libsonnet"), "{ from: 'root' }").unwrap();

    let loader = Loader::new(
        Arc::new(OsFileSystem),
        SearchPaths::new(vec![], Some(workspace.path().to_path_buf())),
    );
    let located = loader
        .locate(&workspace.path().join("app/main.jsonnet"), "lib.libsonnet")
        .unwrap();
    assert_eq!(located, workspace.path().join("vendor/lib.libsonnet"));
}

#[test]
fn test_disk_change_is_picked_up_after_notification() {
    let dir = tempfile::tempdir().unwrap();
    let lib = dir.path().join("lib.libsonnet");
    fs::write(&lib, "{ a: 1 }").unwrap();

    let loader = Loader::new(Arc::new(OsFileSystem), SearchPaths::default());
    assert_eq!(&*loader.load(&lib).unwrap().text, "{ a: 1 }");

    fs::write(&lib, "{ b: 2 }").unwrap();
    assert_eq!(&*loader.load(&lib).unwrap().text, "{ a: 1 }");

    loader.file_changed(&lib);
    assert_eq!(&*loader.load(&lib).unwrap().text, "{ b: 2 }");
    assert_eq!(loader.cache().parse_count(), 2);
}

#[test]
fn test_unchanged_content_is_not_reparsed_after_notification() {
    let (fs, loader) = memory_loader(&[("/w/lib.libsonnet", "{ a: 1 }")]);
    let lib = Path::new("/w/lib.libsonnet");
    let first = loader.load(lib).unwrap();

    // The entry is dropped, but identical bytes hash the same.
    fs.insert(lib, "{ a: 1 }");
    loader.file_changed(lib);
    let second = loader.load(lib).unwrap();
    assert_eq!(first.hash, second.hash);
    assert_eq!(loader.cache().parse_count(), 2);

    let third = loader.cache().insert_bytes(lib, b"{ a: 1 }".to_vec()).unwrap();
    assert!(Arc::ptr_eq(&second, &third));
    assert_eq!(loader.cache().parse_count(), 2);
}

// ============================================================================
// Import graph
// ============================================================================

#[test]
fn test_shared_import_is_parsed_once() {
    let (_, loader) = memory_loader(&[
        ("/w/a.jsonnet", "import 'common.libsonnet'"),
        ("/w/b.jsonnet", "import 'common.libsonnet'"),
        ("/w/common.libsonnet", "{ shared: true }"),
    ]);
    for doc in ["/w/a.jsonnet", "/w/b.jsonnet"] {
        let file = loader.load(Path::new(doc)).unwrap();
        assert!(loader.resolve_document(Path::new(doc), &file.parse).is_settled());
    }
    // a, b and common.
    assert_eq!(loader.cache().parse_count(), 3);
    let mut importers = loader.importers_of(Path::new("/w/common.libsonnet"));
    importers.sort();
    assert_eq!(
        importers,
        [PathBuf::from("/w/a.jsonnet"), PathBuf::from("/w/b.jsonnet")]
    );
}

#[test]
fn test_mutual_imports_give_one_cycle_per_document() {
    let (_, loader) = memory_loader(&[
        ("/w/a.jsonnet", "import 'b.jsonnet'"),
        ("/w/b.jsonnet", "import 'a.jsonnet'"),
    ]);
    assert_eq!(cycle_count(&loader, "/w/a.jsonnet"), 1);
    assert_eq!(cycle_count(&loader, "/w/b.jsonnet"), 1);
}

#[test]
fn test_breaking_a_cycle_clears_it() {
    let (fs, loader) = memory_loader(&[
        ("/w/a.jsonnet", "import 'b.jsonnet'"),
        ("/w/b.jsonnet", "import 'a.jsonnet'"),
    ]);
    assert_eq!(cycle_count(&loader, "/w/a.jsonnet"), 1);

    fs.insert("/w/b.jsonnet", "{}");
    loader.file_changed(Path::new("/w/b.jsonnet"));
    assert_eq!(cycle_count(&loader, "/w/a.jsonnet"), 0);
}

#[test]
fn test_unresolved_import_is_reported_not_followed() {
    let (_, loader) = memory_loader(&[("/w/a.jsonnet", "local m = import 'missing.libsonnet'; m")]);
    let file = loader.load(Path::new("/w/a.jsonnet")).unwrap();
    let imports = loader.resolve_document(Path::new("/w/a.jsonnet"), &file.parse);
    let ImportStatus::Unresolved(err) = &imports.imports[0].status else {
        panic!("expected unresolved");
    };
    assert_eq!(err.to_string(), "cannot find import 'missing.libsonnet'");
    assert!(loader.graph().imports(imports.id)[0].target.is_none());
}

// ============================================================================
// Property tests
// ============================================================================

/// Whether `to` is reachable from `from` along `edges` (at least one step).
fn reachable(edges: &[Vec<usize>], from: usize, to: usize) -> bool {
    let mut seen = vec![false; edges.len()];
    let mut stack = edges[from].clone();
    while let Some(n) = stack.pop() {
        if n == to {
            return true;
        }
        if !seen[n] {
            seen[n] = true;
            stack.extend(edges[n].iter().copied());
        }
    }
    false
}

fn arb_graph() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..8).prop_flat_map(|n| prop::collection::vec(prop::collection::vec(0..n, 0..4), n))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Resolution terminates on any import graph, and an edge is reported as
    /// cyclic exactly when its target leads back to its source.
    #[test]
    fn prop_cycle_classification_matches_reachability(edges in arb_graph()) {
        let fs = Arc::new(MemoryFileSystem::new());
        for (i, targets) in edges.iter().enumerate() {
            let text = if targets.is_empty() {
                "{}".to_string()
            } else {
                targets
                    .iter()
                    .map(|t| format!("(import '{t}.jsonnet')"))
                    .collect::<Vec<_>>()
                    .join(" + ")
            };
            fs.insert(format!("/w/{i}.jsonnet"), text);
        }
        let loader = Loader::new(fs, SearchPaths::default());

        for (i, targets) in edges.iter().enumerate() {
            let path = PathBuf::from(format!("/w/{i}.jsonnet"));
            let file = loader.load(&path).unwrap();
            let imports = loader.resolve_document(&path, &file.parse);
            prop_assert_eq!(imports.imports.len(), targets.len());
            for (resolution, &target) in imports.imports.iter().zip(targets) {
                let cyclic = matches!(
                    resolution.status,
                    ImportStatus::Unresolved(LoadError::CyclicImport { .. })
                );
                prop_assert_eq!(cyclic, target == i || reachable(&edges, target, i));
            }
        }
    }
}
