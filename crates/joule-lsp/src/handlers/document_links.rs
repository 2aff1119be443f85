//! Document links: import paths that resolve to a file.

use crate::error::EngineError;
use crate::snapshot::Snapshot;
use joule_syntax::ast::import_sites;
use lsp_types::{DocumentLink, DocumentLinkParams};

use super::utils::{path_to_uri, to_range};

/// Handle a document link request.
pub fn handle_document_links(
    snap: &Snapshot,
    _params: &DocumentLinkParams,
) -> Result<Option<Vec<DocumentLink>>, EngineError> {
    snap.checkpoint()?;
    let root = snap.doc.parse.syntax_node();
    let mut links = Vec::new();
    for site in import_sites(&root) {
        snap.token().check()?;
        let Ok(target) = snap.loader.locate(&snap.doc.path, &site.path) else {
            continue;
        };
        links.push(DocumentLink {
            range: to_range(&snap.doc.line_index, site.path_range),
            target: path_to_uri(&target),
            tooltip: Some(target.display().to_string()),
            data: None,
        });
    }
    snap.checkpoint()?;
    Ok(Some(links))
}
