//! Find-references handler.
//!
//! Variables are matched through the scope tree. Fields are matched by
//! resolving every `base.name` access in the document and keeping those that
//! land on the same defining field.

use crate::error::EngineError;
use crate::snapshot::Snapshot;
use joule_analysis::{DocModel, FieldTarget, Resolver, SymbolKind};
use joule_syntax::ast::{self, AstNode};
use joule_syntax::TextRange;
use lsp_types::{Location, ReferenceParams};
use std::rc::Rc;

use super::utils::{classify, location, to_offset, Target};

/// Where a variable or field is declared and used.
#[derive(Debug, Clone)]
pub struct Occurrences {
    /// The declaring document and the range of the declared name. `None` for
    /// builtins.
    pub declaration: Option<(Rc<DocModel>, TextRange)>,
    /// Uses in the queried document, in document order.
    pub references: Vec<TextRange>,
}

/// Collect the occurrences of what `target` names.
pub fn occurrences(
    resolver: &Resolver<'_>,
    doc: &Rc<DocModel>,
    target: Target,
) -> Option<Occurrences> {
    match target {
        Target::Symbol { id, .. } => {
            let symbol = doc.scopes.symbol(id);
            let declaration =
                (symbol.kind != SymbolKind::Builtin).then(|| (Rc::clone(doc), symbol.range));
            let references = doc.scopes.references_to(id).map(|r| r.range).collect();
            Some(Occurrences {
                declaration,
                references,
            })
        }
        Target::FieldAccess { access, name, .. } => {
            let field = resolver.field(doc, &access.base()?, &name)?;
            Some(field_occurrences(resolver, doc, &field))
        }
        Target::FieldKey { field, name, .. } => Some(field_occurrences(
            resolver,
            doc,
            &FieldTarget {
                doc: Rc::clone(doc),
                name,
                field,
            },
        )),
        Target::NamedArg { .. } | Target::ImportPath { .. } | Target::ObjectKeyword { .. } => None,
    }
}

fn field_occurrences(
    resolver: &Resolver<'_>,
    doc: &Rc<DocModel>,
    target: &FieldTarget,
) -> Occurrences {
    let key = (target.doc.path.as_path(), target.name_range());
    let references = doc
        .root
        .descendants()
        .filter_map(ast::FieldAccess::cast)
        .filter_map(|access| {
            let token = access.field()?;
            if token.text() != target.name {
                return None;
            }
            let found = resolver.field(doc, &access.base()?, &target.name)?;
            ((found.doc.path.as_path(), found.name_range()) == key).then(|| token.text_range())
        })
        .collect();
    Occurrences {
        declaration: Some((Rc::clone(&target.doc), target.name_range())),
        references,
    }
}

/// Handle a find-references request.
pub fn handle_references(
    snap: &Snapshot,
    params: &ReferenceParams,
) -> Result<Option<Vec<Location>>, EngineError> {
    snap.checkpoint()?;
    let position = params.text_document_position.position;
    let offset = to_offset(&snap.doc.line_index, position);
    let (resolver, doc) = snap.analysis();

    let Some(found) = classify(&doc, offset).and_then(|t| occurrences(&resolver, &doc, t)) else {
        return Ok(None);
    };

    let mut locations = Vec::new();
    if params.context.include_declaration {
        if let Some((decl_doc, range)) = &found.declaration {
            locations.extend(location(snap, decl_doc, *range));
        }
    }
    locations.extend(
        found
            .references
            .iter()
            .filter_map(|&range| location(snap, &doc, range)),
    );
    tracing::debug!("Found {} references", locations.len());

    snap.checkpoint()?;
    Ok(Some(locations))
}
