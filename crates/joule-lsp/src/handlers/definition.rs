//! Go-to-definition handler.
//!
//! Supports:
//! - Variables: jumps to the `local`, parameter or `for` declaration
//! - Import aliases: jumps into the imported document, through re-exports
//! - Field access chains (`a.b.c`, `self.x`, `$.x`, `super.x`): jumps to the
//!   key of the field that defines the value
//! - Named arguments: jumps to the callee's parameter
//! - Import paths: jumps to the imported file

use crate::error::EngineError;
use crate::snapshot::Snapshot;
use joule_analysis::{DocModel, Resolver, SymbolId, SymbolKind, ValueDesc};
use joule_syntax::ast::{AstNode, Expr, ImportKind};
use lsp_types::{GotoDefinitionParams, GotoDefinitionResponse, Location};
use std::collections::HashSet;
use std::path::Path;
use std::rc::Rc;

use super::utils::{classify, location, path_to_uri, to_offset, Target};

/// Maximum number of re-exporting documents followed from one alias.
const MAX_HOPS: usize = 16;

/// Handle a go-to-definition request.
pub fn handle_goto_definition(
    snap: &Snapshot,
    params: &GotoDefinitionParams,
) -> Result<Option<GotoDefinitionResponse>, EngineError> {
    snap.checkpoint()?;
    let position = params.text_document_position_params.position;
    let offset = to_offset(&snap.doc.line_index, position);
    let (resolver, doc) = snap.analysis();

    let Some(target) = classify(&doc, offset) else {
        return Ok(None);
    };
    tracing::debug!("Definition for {:?}", target);

    let location = match target {
        Target::Symbol { id, .. } => symbol_definition(snap, &resolver, &doc, id),
        Target::FieldAccess { access, name, .. } => access
            .base()
            .and_then(|base| resolver.field(&doc, &base, &name))
            .and_then(|field| location(snap, &field.doc, field.name_range())),
        Target::FieldKey { range, .. } => location(snap, &doc, range),
        Target::NamedArg { call, name, .. } => call
            .callee()
            .and_then(|callee| resolver.function_of(&doc, &callee))
            .and_then(|function| {
                let param = function.param(&name)?;
                location(snap, &function.doc, param.name()?.text_range())
            }),
        Target::ImportPath { import, .. } => import
            .path()
            .and_then(|path| snap.loader.locate(&snap.doc.path, &path).ok())
            .and_then(|path| file_start(&path)),
        Target::ObjectKeyword { .. } => None,
    };

    snap.checkpoint()?;
    Ok(location.map(GotoDefinitionResponse::Scalar))
}

fn symbol_definition(
    snap: &Snapshot,
    resolver: &Resolver<'_>,
    doc: &Rc<DocModel>,
    id: SymbolId,
) -> Option<Location> {
    let symbol = doc.scopes.symbol(id);
    match symbol.kind {
        SymbolKind::Builtin => None,
        SymbolKind::ImportAlias => follow_import(resolver, doc, id)
            .and_then(|target| file_start(&target.path))
            .or_else(|| location(snap, doc, symbol.range)),
        _ => location(snap, doc, symbol.range),
    }
}

/// The document an import alias finally refers to. A document whose body
/// is just another alias (`local k = import 'k.libsonnet'; k`) is followed
/// to that alias's target.
pub fn follow_import(
    resolver: &Resolver<'_>,
    doc: &Rc<DocModel>,
    id: SymbolId,
) -> Option<Rc<DocModel>> {
    let mut doc = Rc::clone(doc);
    let mut id = id;
    let mut seen = HashSet::new();

    for _ in 0..MAX_HOPS {
        let ValueDesc::Import {
            kind: ImportKind::Code,
            path,
        } = &doc.scopes.symbol(id).value
        else {
            return None;
        };
        let target = resolver.import_document(&doc, path)?;
        if !seen.insert(target.path.clone()) {
            return Some(target);
        }
        match reexported_alias(&target) {
            Some(next) => {
                doc = target;
                id = next;
            }
            None => return Some(target),
        }
    }
    Some(doc)
}

/// The import alias a document's body consists of, if any.
fn reexported_alias(doc: &DocModel) -> Option<SymbolId> {
    let mut body = doc.body()?.unparenthesized()?;
    while let Expr::Local(local) = body {
        body = local.body()?.unparenthesized()?;
    }
    let Expr::VarRef(var) = body else {
        return None;
    };
    let id = doc.scopes.reference(var.range())?.symbol?;
    (doc.scopes.symbol(id).kind == SymbolKind::ImportAlias).then_some(id)
}

fn file_start(path: &Path) -> Option<Location> {
    Some(Location::new(path_to_uri(path)?, lsp_types::Range::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::utils::fixture::{position, snapshot, snapshot_with, text_at};
    use lsp_types::{TextDocumentIdentifier, TextDocumentPositionParams};

    fn definition(snap: &Snapshot, text: &str, needle: &str, nth: usize) -> Option<Location> {
        let params = GotoDefinitionParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier {
                    uri: snap.doc.uri.clone(),
                },
                position: position(text, needle, nth, 0),
            },
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        match handle_goto_definition(snap, &params).unwrap()? {
            GotoDefinitionResponse::Scalar(location) => Some(location),
            _ => None,
        }
    }

    #[test]
    fn test_redefinition_jumps_to_latest() {
        let text = "local x = 1; local x = 2; x";
        let snap = snapshot(text);
        let loc = definition(&snap, text, "x", 2).unwrap();
        assert_eq!(loc.range.start.character, 19);
        assert_eq!(loc.range.end.character, 20);
    }

    #[test]
    fn test_parameter() {
        let text = "local f(a, b) = a + b; f(1, 2)";
        let snap = snapshot(text);
        let loc = definition(&snap, text, "b", 1).unwrap();
        assert_eq!(text_at(text, loc.range), "b");
        assert_eq!(loc.range.start.character, 11);
    }

    #[test]
    fn test_field_chain() {
        let text = "local o = { a: { b: 1 } }; o.a.b";
        let snap = snapshot(text);
        let loc = definition(&snap, text, "b", 1).unwrap();
        assert_eq!(loc.range.start.character, 17);
    }

    #[test]
    fn test_self_field() {
        let text = "{ x: 1, y: self.x }";
        let snap = snapshot(text);
        let loc = definition(&snap, text, "x", 1).unwrap();
        assert_eq!(loc.range.start.character, 2);
    }

    #[test]
    fn test_named_argument() {
        let text = "local f(first, second) = first; f(second=2, first=1)";
        let snap = snapshot(text);
        let loc = definition(&snap, text, "second", 1).unwrap();
        assert_eq!(loc.range.start.character, 15);
    }

    #[test]
    fn test_field_of_import() {
        let files = [("/w/lib.libsonnet", "{\n  name: 'lib',\n}\n")];
        let text = "local lib = import 'lib.libsonnet'; lib.name";
        let snap = snapshot_with(&files, text);
        let loc = definition(&snap, text, "name", 0).unwrap();
        assert_eq!(loc.uri.as_str(), "file:///w/lib.libsonnet");
        assert_eq!(loc.range.start.line, 1);
        assert_eq!(loc.range.start.character, 2);
    }

    #[test]
    fn test_alias_follows_reexports() {
        let files = [
            ("/w/a.libsonnet", "local b = import 'b.libsonnet'; b"),
            ("/w/b.libsonnet", "{ v: 1 }"),
        ];
        let text = "local k = import 'a.libsonnet'; k";
        let snap = snapshot_with(&files, text);
        let loc = definition(&snap, text, "k", 1).unwrap();
        assert_eq!(loc.uri.as_str(), "file:///w/b.libsonnet");
    }

    #[test]
    fn test_alias_cycle_terminates() {
        let files = [
            ("/w/a.libsonnet", "local b = import 'b.libsonnet'; b"),
            ("/w/b.libsonnet", "local a = import 'a.libsonnet'; a"),
        ];
        let text = "local k = import 'a.libsonnet'; k";
        let snap = snapshot_with(&files, text);
        assert!(definition(&snap, text, "k", 1).is_some());
    }

    #[test]
    fn test_import_path() {
        let files = [("/w/lib.libsonnet", "{}")];
        let text = "import 'lib.libsonnet'";
        let snap = snapshot_with(&files, text);
        let loc = definition(&snap, text, "lib", 0).unwrap();
        assert_eq!(loc.uri.as_str(), "file:///w/lib.libsonnet");
    }

    #[test]
    fn test_builtin_and_unknown_have_no_definition() {
        let text = "std.length(nope)";
        let snap = snapshot(text);
        assert!(definition(&snap, text, "std", 0).is_none());
        assert!(definition(&snap, text, "nope", 0).is_none());
    }
}
