//! Diagnostics: computing a document's set and converting it for the client.

use crate::error::EngineError;
use crate::snapshot::Snapshot;
use crate::vfs::DocumentSnapshot;
use joule_analysis::{diagnose, DiagnosticSet, Severity};
use lsp_types::{
    Diagnostic, DiagnosticRelatedInformation, DiagnosticSeverity, Location, NumberOrString,
};

use super::utils::to_range;

/// Source name shown next to every diagnostic.
pub const SOURCE: &str = "joule";

/// Result of one diagnostics pass.
#[derive(Debug, Clone)]
pub struct DiagnosticsOutcome {
    /// The diagnostics.
    pub set: DiagnosticSet,
    /// The document's import edges differ from the previous pass.
    pub edges_changed: bool,
}

/// Compute the diagnostics of the snapshot's document.
///
/// With `resolve_io` false only cached import information is used, and
/// imports needing the filesystem leave the set pending.
pub fn compute_diagnostics(
    snap: &Snapshot,
    resolve_io: bool,
) -> Result<DiagnosticsOutcome, EngineError> {
    snap.token().check()?;
    let scopes = snap.scopes();

    snap.token().check()?;
    let imports = if resolve_io {
        snap.loader.resolve_document(&snap.doc.path, &snap.doc.parse)
    } else {
        snap.loader
            .resolve_document_cached(&snap.doc.path, &snap.doc.parse)
    };

    let set = diagnose(
        &snap.doc.parse,
        &scopes,
        &imports,
        snap.config.diagnostic_options(),
    );
    Ok(DiagnosticsOutcome {
        set,
        edges_changed: imports.edges_changed,
    })
}

/// Convert a diagnostic set to LSP diagnostics.
pub fn to_lsp_diagnostics(set: &DiagnosticSet, doc: &DocumentSnapshot) -> Vec<Diagnostic> {
    set.diagnostics
        .iter()
        .map(|d| Diagnostic {
            range: to_range(&doc.line_index, d.range),
            severity: Some(match d.severity {
                Severity::Error => DiagnosticSeverity::ERROR,
                Severity::Warning => DiagnosticSeverity::WARNING,
            }),
            code: Some(NumberOrString::String(d.code.code().to_string())),
            source: Some(SOURCE.to_string()),
            message: d.message.clone(),
            related_information: d.related.as_ref().map(|(range, message)| {
                vec![DiagnosticRelatedInformation {
                    location: Location::new(doc.uri.clone(), to_range(&doc.line_index, *range)),
                    message: message.clone(),
                }]
            }),
            tags: None,
            code_description: None,
            data: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::utils::fixture::{snapshot, snapshot_with};

    #[test]
    fn test_conversion() {
        let snap = snapshot("local x = 1;\nlocal x = 2;\ny");
        let outcome = compute_diagnostics(&snap, true).unwrap();
        let diagnostics = to_lsp_diagnostics(&outcome.set, &snap.doc);

        let codes: Vec<_> = diagnostics
            .iter()
            .map(|d| match &d.code {
                Some(NumberOrString::String(code)) => code.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(codes, vec!["J2003", "J2001"]);

        let shadow = &diagnostics[0];
        assert_eq!(shadow.severity, Some(DiagnosticSeverity::WARNING));
        assert_eq!(shadow.range.start.line, 1);
        let related = shadow.related_information.as_ref().unwrap();
        assert_eq!(related[0].location.range.start.line, 0);

        let unknown = &diagnostics[1];
        assert_eq!(unknown.severity, Some(DiagnosticSeverity::ERROR));
        assert_eq!(unknown.source.as_deref(), Some(SOURCE));
        assert_eq!(unknown.message, "unknown variable 'y'");
    }

    #[test]
    fn test_cached_pass_is_pending_until_resolved() {
        let files = [("/w/lib.libsonnet", "{}")];
        let snap = snapshot_with(&files, "import 'lib.libsonnet'");
        // The fixture resolves with IO, so the cache already knows the target.
        let cached = compute_diagnostics(&snap, false).unwrap();
        assert!(!cached.set.pending);
        assert!(cached.set.diagnostics.is_empty());
    }

    #[test]
    fn test_cancelled_pass() {
        let snap = snapshot("1");
        snap.token().cancel();
        assert!(matches!(
            compute_diagnostics(&snap, true),
            Err(EngineError::Cancelled)
        ));
    }
}
