//! Document highlight: the declaration is a write, every use a read.

use crate::error::EngineError;
use crate::snapshot::Snapshot;
use lsp_types::{DocumentHighlight, DocumentHighlightKind, DocumentHighlightParams};

use super::references::occurrences;
use super::utils::{classify, to_offset, to_range};

/// Handle a document highlight request.
pub fn handle_document_highlight(
    snap: &Snapshot,
    params: &DocumentHighlightParams,
) -> Result<Option<Vec<DocumentHighlight>>, EngineError> {
    snap.checkpoint()?;
    let position = params.text_document_position_params.position;
    let offset = to_offset(&snap.doc.line_index, position);
    let (resolver, doc) = snap.analysis();

    let Some(found) = classify(&doc, offset).and_then(|t| occurrences(&resolver, &doc, t)) else {
        return Ok(None);
    };

    let index = &snap.doc.line_index;
    let declaration = found
        .declaration
        .filter(|(decl_doc, _)| decl_doc.path == doc.path)
        .map(|(_, range)| DocumentHighlight {
            range: to_range(index, range),
            kind: Some(DocumentHighlightKind::WRITE),
        });
    let highlights = declaration
        .into_iter()
        .chain(found.references.iter().map(|&range| DocumentHighlight {
            range: to_range(index, range),
            kind: Some(DocumentHighlightKind::READ),
        }))
        .collect();

    snap.checkpoint()?;
    Ok(Some(highlights))
}
