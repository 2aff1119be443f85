//! Rename handler.
//!
//! Only variables can be renamed: the declaration and every reference to it
//! in the document. Fields and `std` are not renameable.

use crate::error::EngineError;
use crate::snapshot::Snapshot;
use joule_analysis::{DocModel, SymbolId, SymbolKind};
use joule_syntax::TextRange;
use lsp_types::{
    PrepareRenameResponse, RenameParams, TextDocumentPositionParams, TextEdit, WorkspaceEdit,
};
use std::collections::HashMap;

use super::utils::{classify, is_identifier, to_offset, to_range, Target};

/// The renameable variable under the cursor and the range of its name there.
fn variable_at(
    snap: &Snapshot,
    doc: &DocModel,
    position: lsp_types::Position,
) -> Option<(SymbolId, TextRange)> {
    let offset = to_offset(&snap.doc.line_index, position);
    match classify(doc, offset)? {
        Target::Symbol { id, range } if doc.scopes.symbol(id).kind != SymbolKind::Builtin => {
            Some((id, range))
        }
        _ => None,
    }
}

/// Handle a prepare rename request.
pub fn handle_prepare_rename(
    snap: &Snapshot,
    params: &TextDocumentPositionParams,
) -> Result<Option<PrepareRenameResponse>, EngineError> {
    snap.checkpoint()?;
    let (_, doc) = snap.analysis();
    let response = variable_at(snap, &doc, params.position).map(|(id, range)| {
        PrepareRenameResponse::RangeWithPlaceholder {
            range: to_range(&snap.doc.line_index, range),
            placeholder: doc.scopes.symbol(id).name.clone(),
        }
    });
    Ok(response)
}

/// Handle a rename request.
pub fn handle_rename(
    snap: &Snapshot,
    params: &RenameParams,
) -> Result<Option<WorkspaceEdit>, EngineError> {
    snap.checkpoint()?;
    let new_name = params.new_name.as_str();
    if !is_identifier(new_name) {
        return Err(EngineError::InvalidName(new_name.to_string()));
    }

    let (_, doc) = snap.analysis();
    let Some((id, _)) = variable_at(snap, &doc, params.text_document_position.position) else {
        return Ok(None);
    };

    let index = &snap.doc.line_index;
    let symbol = doc.scopes.symbol(id);
    let edits: Vec<TextEdit> = std::iter::once(symbol.range)
        .chain(doc.scopes.references_to(id).map(|r| r.range))
        .map(|range| TextEdit::new(to_range(index, range), new_name.to_string()))
        .collect();
    tracing::debug!("Renaming {} to {}: {} edits", symbol.name, new_name, edits.len());

    snap.checkpoint()?;
    let mut changes = HashMap::new();
    changes.insert(snap.doc.uri.clone(), edits);
    Ok(Some(WorkspaceEdit::new(changes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::utils::fixture::{position, snapshot};
    use crate::handlers::utils::to_text_range;
    use lsp_types::TextDocumentIdentifier;

    fn rename(
        snap: &Snapshot,
        text: &str,
        needle: &str,
        new_name: &str,
    ) -> Result<Option<WorkspaceEdit>, EngineError> {
        let params = RenameParams {
            text_document_position: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier {
                    uri: snap.doc.uri.clone(),
                },
                position: position(text, needle, 0, 0),
            },
            new_name: new_name.to_string(),
            work_done_progress_params: Default::default(),
        };
        handle_rename(snap, &params)
    }

    fn apply(text: &str, edit: &WorkspaceEdit) -> String {
        let index = joule_syntax::LineIndex::new(text);
        let mut edits: Vec<_> = edit
            .changes
            .as_ref()
            .unwrap()
            .values()
            .flatten()
            .map(|e| {
                let range = to_text_range(&index, e.range);
                (usize::from(range.start()), usize::from(range.end()), e.new_text.clone())
            })
            .collect();
        edits.sort_by_key(|(start, _, _)| std::cmp::Reverse(*start));
        let mut out = text.to_string();
        for (start, end, new_text) in edits {
            out.replace_range(start..end, &new_text);
        }
        out
    }

    #[test]
    fn test_rename_local() {
        let text = "local x = 1; local y = x; [x, { x: x }]";
        let snap = snapshot(text);
        let edit = rename(&snap, text, "x;", "total").unwrap().unwrap();
        assert_eq!(
            apply(text, &edit),
            "local total = 1; local y = total; [total, { x: total }]"
        );
    }

    #[test]
    fn test_rename_parameter_from_declaration() {
        let text = "local f(v) = v * 2; f(v=1)";
        let snap = snapshot(text);
        let edit = rename(&snap, text, "v)", "w").unwrap().unwrap();
        assert_eq!(apply(text, &edit), "local f(w) = w * 2; f(v=1)");
    }

    #[test]
    fn test_invalid_names() {
        let text = "local x = 1; x";
        let snap = snapshot(text);
        assert!(matches!(
            rename(&snap, text, "x", "local"),
            Err(EngineError::InvalidName(_))
        ));
        assert!(matches!(
            rename(&snap, text, "x", "2x"),
            Err(EngineError::InvalidName(_))
        ));
    }

    #[test]
    fn test_prepare_rejects_fields_and_builtins() {
        let text = "{ a: std.length([]) }";
        let snap = snapshot(text);
        for needle in ["a", "std", "length"] {
            let params = TextDocumentPositionParams {
                text_document: TextDocumentIdentifier {
                    uri: snap.doc.uri.clone(),
                },
                position: position(text, needle, 0, 0),
            };
            assert!(handle_prepare_rename(&snap, &params).unwrap().is_none(), "{needle}");
        }
    }

    #[test]
    fn test_prepare_gives_current_name() {
        let text = "local name = 1; name";
        let snap = snapshot(text);
        let params = TextDocumentPositionParams {
            text_document: TextDocumentIdentifier {
                uri: snap.doc.uri.clone(),
            },
            position: position(text, "name", 1, 2),
        };
        match handle_prepare_rename(&snap, &params).unwrap() {
            Some(PrepareRenameResponse::RangeWithPlaceholder { range, placeholder }) => {
                assert_eq!(placeholder, "name");
                assert_eq!(range.start.character, 16);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
