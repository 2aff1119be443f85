//! Inlay hints: structural kinds on binds and reference counts.
//!
//! `local f(a, b) = ...` shows `: function(a, b)` after the name, and every
//! local, parameter and comprehension variable gets `N refs` after its
//! declaration.

use crate::error::EngineError;
use crate::snapshot::Snapshot;
use joule_analysis::{ScopeTree, Symbol, SymbolId, SymbolKind};
use joule_syntax::LineIndex;
use lsp_types::{InlayHint, InlayHintKind, InlayHintLabel, InlayHintParams};

use super::utils::{to_position, to_text_range};

/// Handle an inlay hint request.
pub fn handle_inlay_hints(
    snap: &Snapshot,
    params: &InlayHintParams,
) -> Result<Option<Vec<InlayHint>>, EngineError> {
    snap.checkpoint()?;
    if !snap.config.inlay_hints.enable {
        return Ok(None);
    }
    let range = to_text_range(&snap.doc.line_index, params.range);
    let scopes = snap.scopes();

    let mut hints = Vec::new();
    for (id, symbol) in scopes.symbols() {
        if range.intersect(symbol.range).is_none() {
            continue;
        }
        if let Some(hint) = kind_hint(&snap.doc.line_index, symbol) {
            hints.push(hint);
        }
        if let Some(hint) = reference_hint(&snap.doc.line_index, &scopes, id, symbol) {
            hints.push(hint);
        }
    }
    hints.sort_by_key(|h| (h.position.line, h.position.character));
    tracing::debug!("{} inlay hints", hints.len());

    snap.checkpoint()?;
    Ok(Some(hints))
}

fn kind_hint(index: &LineIndex, symbol: &Symbol) -> Option<InlayHint> {
    if !matches!(symbol.kind, SymbolKind::Local | SymbolKind::ImportAlias) {
        return None;
    }
    let label = symbol.value.label()?;
    Some(InlayHint {
        position: to_position(index, symbol.range.end()),
        label: InlayHintLabel::String(format!(": {label}")),
        kind: Some(InlayHintKind::TYPE),
        text_edits: None,
        tooltip: None,
        padding_left: None,
        padding_right: Some(true),
        data: None,
    })
}

fn reference_hint(
    index: &LineIndex,
    scopes: &ScopeTree,
    id: SymbolId,
    symbol: &Symbol,
) -> Option<InlayHint> {
    if !matches!(
        symbol.kind,
        SymbolKind::Local
            | SymbolKind::Parameter
            | SymbolKind::ForVariable
            | SymbolKind::ImportAlias
    ) {
        return None;
    }
    let count = scopes.references_to(id).count();
    let label = if count == 1 {
        "1 ref".to_string()
    } else {
        format!("{count} refs")
    };
    Some(InlayHint {
        position: to_position(index, symbol.decl_range.end()),
        label: InlayHintLabel::String(label),
        kind: None,
        text_edits: None,
        tooltip: None,
        padding_left: Some(true),
        padding_right: None,
        data: None,
    })
}
