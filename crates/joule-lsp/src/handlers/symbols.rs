//! Document symbols handler for the outline view.
//!
//! Binds, fields, parameters and comprehension variables, nested the way
//! they are nested in the source.

use crate::error::EngineError;
use crate::snapshot::Snapshot;
use joule_analysis::ValueDesc;
use joule_syntax::ast::{self, AstNode};
use joule_syntax::{LineIndex, SyntaxKind, SyntaxNode, SyntaxToken, TextRange};
use lsp_types::{DocumentSymbol, DocumentSymbolParams, DocumentSymbolResponse, SymbolKind};

use super::utils::to_range;

/// Handle a document symbols request.
pub fn handle_document_symbols(
    snap: &Snapshot,
    _params: &DocumentSymbolParams,
) -> Result<Option<DocumentSymbolResponse>, EngineError> {
    snap.checkpoint()?;
    let mut symbols = Vec::new();
    collect(&snap.doc.parse.syntax_node(), &snap.doc.line_index, &mut symbols);
    Ok(Some(DocumentSymbolResponse::Nested(symbols)))
}

fn collect(node: &SyntaxNode, index: &LineIndex, out: &mut Vec<DocumentSymbol>) {
    for child in node.children() {
        let entry = match child.kind() {
            SyntaxKind::BIND => ast::Bind::cast(child.clone()).and_then(|b| bind_entry(&b)),
            SyntaxKind::FIELD => ast::Field::cast(child.clone()).and_then(|f| field_entry(&f)),
            SyntaxKind::PARAM => ast::Param::cast(child.clone())
                .and_then(|p| p.name())
                .map(|name| Entry::new(name, SymbolKind::VARIABLE, Some("parameter".into()))),
            SyntaxKind::FOR_SPEC => ast::ForSpec::cast(child.clone())
                .and_then(|spec| spec.variable())
                .map(|name| Entry::new(name, SymbolKind::VARIABLE, Some("for".into()))),
            _ => None,
        };

        match entry {
            Some(entry) => {
                let mut children = Vec::new();
                collect(&child, index, &mut children);
                out.push(entry.into_symbol(index, &child, children));
            }
            None => collect(&child, index, out),
        }
    }
}

struct Entry {
    name: String,
    selection: TextRange,
    kind: SymbolKind,
    detail: Option<String>,
}

impl Entry {
    fn new(token: SyntaxToken, kind: SymbolKind, detail: Option<String>) -> Self {
        Self {
            name: token.text().to_string(),
            selection: token.text_range(),
            kind,
            detail,
        }
    }

    #[allow(deprecated)]
    fn into_symbol(
        self,
        index: &LineIndex,
        node: &SyntaxNode,
        children: Vec<DocumentSymbol>,
    ) -> DocumentSymbol {
        DocumentSymbol {
            name: self.name,
            detail: self.detail,
            kind: self.kind,
            tags: None,
            deprecated: None,
            range: to_range(index, node.text_range()),
            selection_range: to_range(index, self.selection),
            children: (!children.is_empty()).then_some(children),
        }
    }
}

fn param_names(params: Option<ast::ParamList>) -> Vec<String> {
    params
        .map(|list| {
            list.params()
                .filter_map(|p| Some(p.name()?.text().to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn bind_entry(bind: &ast::Bind) -> Option<Entry> {
    let name = bind.name()?;
    if bind.params().is_some() {
        let detail = format!("function({})", param_names(bind.params()).join(", "));
        return Some(Entry::new(name, SymbolKind::FUNCTION, Some(detail)));
    }
    let value = bind.value().map_or(ValueDesc::Unknown, |v| ValueDesc::of(&v));
    let kind = match value {
        ValueDesc::Import { .. } => SymbolKind::MODULE,
        ValueDesc::Function { .. } => SymbolKind::FUNCTION,
        ValueDesc::Object { .. } => SymbolKind::OBJECT,
        ValueDesc::Array { .. } => SymbolKind::ARRAY,
        _ => SymbolKind::VARIABLE,
    };
    Some(Entry::new(name, kind, value.label()))
}

fn field_entry(field: &ast::Field) -> Option<Entry> {
    let name = field.name()?;
    let token = name.token()?;
    let mut entry = if field.params().is_some() {
        let detail = format!("function({})", param_names(field.params()).join(", "));
        Entry::new(token, SymbolKind::METHOD, Some(detail))
    } else {
        let value = field.value().map_or(ValueDesc::Unknown, |v| ValueDesc::of(&v));
        Entry::new(token, SymbolKind::FIELD, value.label())
    };
    // Quoted keys show their value, not the literal.
    if let Some(text) = name.text() {
        entry.name = text;
    }
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::utils::fixture::snapshot;
    use lsp_types::TextDocumentIdentifier;

    fn outline(text: &str) -> Vec<DocumentSymbol> {
        let snap = snapshot(text);
        let params = DocumentSymbolParams {
            text_document: TextDocumentIdentifier {
                uri: snap.doc.uri.clone(),
            },
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        match handle_document_symbols(&snap, &params).unwrap() {
            Some(DocumentSymbolResponse::Nested(symbols)) => symbols,
            _ => Vec::new(),
        }
    }

    fn names(symbols: &[DocumentSymbol]) -> Vec<&str> {
        symbols.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_nested_outline() {
        let symbols = outline(
            "local lib = import 'lib.libsonnet';\n\
             local f(a) = { x: a };\n\
             { out: [v for v in [1]], m(p):: p, 'quoted key': 1 }",
        );
        assert_eq!(names(&symbols), vec!["lib", "f", "out", "m", "quoted key"]);

        assert_eq!(symbols[0].kind, SymbolKind::MODULE);
        assert_eq!(symbols[0].detail.as_deref(), Some("import \"lib.libsonnet\""));

        assert_eq!(symbols[1].kind, SymbolKind::FUNCTION);
        assert_eq!(symbols[1].detail.as_deref(), Some("function(a)"));
        assert_eq!(names(symbols[1].children.as_ref().unwrap()), vec!["a", "x"]);

        assert_eq!(names(symbols[2].children.as_ref().unwrap()), vec!["v"]);
        assert_eq!(symbols[3].kind, SymbolKind::METHOD);
        assert!(symbols[4].children.is_none());
    }

    #[test]
    fn test_ranges() {
        let symbols = outline("local x = 1;\nx");
        assert_eq!(symbols.len(), 1);
        let x = &symbols[0];
        assert_eq!(x.kind, SymbolKind::VARIABLE);
        assert_eq!(x.detail.as_deref(), Some("number"));
        assert_eq!(x.selection_range.start.character, 6);
        assert_eq!(x.selection_range.end.character, 7);
        assert_eq!(x.range.end.character, 11);
    }

    #[test]
    fn test_computed_field_is_skipped() {
        let symbols = outline("{ [k]: { inner: 1 } for k in ['a'] }");
        assert_eq!(names(&symbols), vec!["inner", "k"]);
    }
}
