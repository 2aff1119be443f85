//! Completion handler for autocompletion.
//!
//! Provides completions for:
//! - Variables visible at the cursor, innermost scope first, declaration
//!   order within a scope, `std` last
//! - Fields after `.` on statically known objects
//! - `std` functions after `std.`

use crate::error::EngineError;
use crate::snapshot::Snapshot;
use joule_analysis::{DocModel, Resolver, SymbolKind, ValueDesc};
use joule_syntax::ast::{self, AstNode, Expr};
use joule_syntax::{SyntaxKind, SyntaxNode, TextSize};
use lsp_types::{
    CompletionItem, CompletionItemKind, CompletionParams, CompletionResponse, Documentation,
};
use std::rc::Rc;

use super::hover::describe_symbol;
use super::utils::to_offset;

/// Handle a completion request.
pub fn handle_completion(
    snap: &Snapshot,
    params: &CompletionParams,
) -> Result<Option<CompletionResponse>, EngineError> {
    snap.checkpoint()?;
    let position = params.text_document_position.position;
    let offset = to_offset(&snap.doc.line_index, position);
    let (resolver, doc) = snap.analysis();

    let items = match dotted_base(&doc.root, offset) {
        Some(base) => member_completions(&resolver, &doc, &base),
        None => scope_completions(&doc, offset),
    };
    tracing::debug!("Completion at {:?}: {} items", offset, items.len());

    snap.checkpoint()?;
    Ok(Some(CompletionResponse::Array(items)))
}

/// The object expression of `base.` or `base.partial` ending at `offset`.
fn dotted_base(root: &SyntaxNode, offset: TextSize) -> Option<Expr> {
    let offset = offset.min(root.text_range().end());
    let token = root.token_at_offset(offset).left_biased()?;
    let access = ast::FieldAccess::cast(token.parent()?)?;
    match token.kind() {
        SyntaxKind::DOT => access.base(),
        SyntaxKind::IDENT if access.field().as_ref() == Some(&token) => access.base(),
        _ => None,
    }
}

fn sort_key(index: usize) -> Option<String> {
    Some(format!("{index:04}"))
}

fn scope_completions(doc: &DocModel, offset: TextSize) -> Vec<CompletionItem> {
    doc.scopes
        .visible_at(offset)
        .into_iter()
        .enumerate()
        .map(|(i, id)| {
            let symbol = doc.scopes.symbol(id);
            let kind = match (&symbol.kind, &symbol.value) {
                (SymbolKind::ImportAlias | SymbolKind::Builtin, _) => CompletionItemKind::MODULE,
                (_, ValueDesc::Function { .. }) => CompletionItemKind::FUNCTION,
                _ => CompletionItemKind::VARIABLE,
            };
            CompletionItem {
                label: symbol.name.clone(),
                kind: Some(kind),
                detail: Some(describe_symbol(symbol)),
                sort_text: sort_key(i),
                ..Default::default()
            }
        })
        .collect()
}

fn member_completions(
    resolver: &Resolver<'_>,
    doc: &Rc<DocModel>,
    base: &Expr,
) -> Vec<CompletionItem> {
    if resolver.is_std(doc, base) {
        return resolver
            .builtins()
            .std_functions()
            .iter()
            .enumerate()
            .map(|(i, function)| CompletionItem {
                label: function.name.to_string(),
                kind: Some(CompletionItemKind::FUNCTION),
                detail: Some(function.signature()),
                documentation: Some(Documentation::String(function.doc.to_string())),
                sort_text: sort_key(i),
                ..Default::default()
            })
            .collect();
    }

    resolver
        .fields(doc, base)
        .into_iter()
        .enumerate()
        .map(|(i, field)| {
            let value = field
                .field
                .value()
                .map_or(ValueDesc::Unknown, |v| ValueDesc::of(&v));
            let (kind, detail) = match field.field.params() {
                Some(params) => (
                    CompletionItemKind::METHOD,
                    Some(format!("{}{}", field.name, params.syntax().text())),
                ),
                None => (CompletionItemKind::FIELD, value.label()),
            };
            CompletionItem {
                label: field.name,
                kind: Some(kind),
                detail,
                sort_text: sort_key(i),
                ..Default::default()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::utils::fixture::{position, snapshot, snapshot_with};
    use crate::handlers::utils::to_position;
    use joule_syntax::LineIndex;
    use lsp_types::{TextDocumentIdentifier, TextDocumentPositionParams};

    fn complete_at(snap: &Snapshot, position: lsp_types::Position) -> Vec<CompletionItem> {
        let params = CompletionParams {
            text_document_position: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier {
                    uri: snap.doc.uri.clone(),
                },
                position,
            },
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
            context: None,
        };
        match handle_completion(snap, &params).unwrap() {
            Some(CompletionResponse::Array(items)) => items,
            _ => Vec::new(),
        }
    }

    fn complete_at_end(text: &str, files: &[(&str, &str)]) -> Vec<String> {
        let snap = snapshot_with(files, text);
        let end = to_position(&LineIndex::new(text), TextSize::of(text));
        complete_at(&snap, end).into_iter().map(|i| i.label).collect()
    }

    #[test]
    fn test_scope_order() {
        let text =
            "local top = 1; local f(p) = { local o = 2, field: [ z for z in [p] ] }; f(top)";
        let snap = snapshot(text);
        let items = complete_at(&snap, position(text, "z for", 0, 0));
        let labels: Vec<_> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["z", "o", "p", "top", "f", "std"]);

        let mut sorted = items.clone();
        sorted.sort_by(|a, b| a.sort_text.cmp(&b.sort_text));
        assert_eq!(sorted, items);
        assert_eq!(items[4].kind, Some(CompletionItemKind::FUNCTION));
        assert_eq!(items[5].kind, Some(CompletionItemKind::MODULE));
    }

    #[test]
    fn test_fields_after_dot() {
        let labels = complete_at_end("local o = { a: 1, b(x): x }; o.", &[]);
        assert_eq!(labels, vec!["a", "b"]);
    }

    #[test]
    fn test_fields_with_prefix() {
        let labels = complete_at_end("local o = { alpha: 1, beta: 2 }; o.al", &[]);
        assert_eq!(labels, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_std_functions() {
        let labels = complete_at_end("std.", &[]);
        assert!(labels.contains(&"length".to_string()));
        assert!(labels.contains(&"manifestJson".to_string()));
    }

    #[test]
    fn test_fields_of_import() {
        let files = [("/w/lib.libsonnet", "{ host: 'h', port: 1 }")];
        let labels = complete_at_end("local lib = import 'lib.libsonnet';\nlib.", &files);
        assert_eq!(labels, vec!["host", "port"]);
    }
}
