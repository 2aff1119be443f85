//! Shared utility functions for LSP handlers.
//!
//! Position and URI conversion, and classification of the syntax under the
//! cursor.

use crate::snapshot::Snapshot;
use joule_analysis::{DocModel, SymbolId, SymbolKind};
use joule_syntax::ast::{self, AstNode, Expr};
use joule_syntax::{LineCol, LineIndex, SyntaxKind, SyntaxNode, SyntaxToken, TextRange, TextSize};
use lsp_types::{Location, Position, Range, Uri};
use std::path::{Path, PathBuf};

/// Convert a URI to a file path.
#[cfg(not(windows))]
pub fn uri_to_path(uri: &Uri) -> Option<PathBuf> {
    uri.as_str()
        .strip_prefix("file://")
        .map(|p| PathBuf::from(percent_decode(p)))
}

/// Convert a URI to a file path (Windows version).
#[cfg(windows)]
pub fn uri_to_path(uri: &Uri) -> Option<PathBuf> {
    uri.as_str()
        .strip_prefix("file://")
        // Handle Windows paths like file:///C:/...
        .map(|p| p.strip_prefix('/').unwrap_or(p))
        .map(|p| PathBuf::from(percent_decode(p)))
}

/// Convert a file path to a `file://` URI.
pub fn path_to_uri(path: &Path) -> Option<Uri> {
    let mut encoded = String::from("file://");
    let path = path.to_string_lossy();
    if !path.starts_with('/') {
        encoded.push('/');
    }
    for c in path.chars() {
        match c {
            ' ' => encoded.push_str("%20"),
            '%' => encoded.push_str("%25"),
            '#' => encoded.push_str("%23"),
            '?' => encoded.push_str("%3F"),
            '\\' => encoded.push('/'),
            c => encoded.push(c),
        }
    }
    encoded.parse().ok()
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Byte offset of an LSP position.
pub fn to_offset(index: &LineIndex, pos: Position) -> TextSize {
    index.offset(LineCol {
        line: pos.line,
        col: pos.character,
    })
}

/// LSP position of a byte offset.
pub fn to_position(index: &LineIndex, offset: TextSize) -> Position {
    let lc = index.line_col(offset);
    Position::new(lc.line, lc.col)
}

/// LSP range of a byte range.
pub fn to_range(index: &LineIndex, range: TextRange) -> Range {
    let (start, end) = index.range(range);
    Range::new(
        Position::new(start.line, start.col),
        Position::new(end.line, end.col),
    )
}

/// Byte range of an LSP range.
pub fn to_text_range(index: &LineIndex, range: Range) -> TextRange {
    let start = to_offset(index, range.start);
    let end = to_offset(index, range.end).max(start);
    TextRange::new(start, end)
}

/// Location of `range` in `doc`, which may be an imported document.
pub fn location(snap: &Snapshot, doc: &DocModel, range: TextRange) -> Option<Location> {
    if doc.path == snap.doc.path {
        return Some(Location::new(
            snap.doc.uri.clone(),
            to_range(&snap.doc.line_index, range),
        ));
    }
    let index = LineIndex::new(&doc.root.text().to_string());
    Some(Location::new(path_to_uri(&doc.path)?, to_range(&index, range)))
}

// ============================================================================
// What is under the cursor
// ============================================================================

const fn token_priority(kind: SyntaxKind) -> u8 {
    match kind {
        SyntaxKind::IDENT => 3,
        SyntaxKind::SELF_KW | SyntaxKind::SUPER_KW | SyntaxKind::DOLLAR => 2,
        k if k.is_string() => 1,
        _ => 0,
    }
}

/// The token at `offset` a query is most likely about. Names win over
/// keywords, keywords over strings; anything else is ignored.
pub fn token_at(root: &SyntaxNode, offset: TextSize) -> Option<SyntaxToken> {
    let offset = offset.min(root.text_range().end());
    root.token_at_offset(offset)
        .max_by_key(|t| token_priority(t.kind()))
        .filter(|t| token_priority(t.kind()) > 0)
}

/// The syntax a position query is about.
#[derive(Debug, Clone)]
pub enum Target {
    /// A variable, at a reference or at its declaration.
    Symbol {
        /// The resolved symbol.
        id: SymbolId,
        /// Range of the name under the cursor.
        range: TextRange,
    },
    /// The field name of `base.name`.
    FieldAccess {
        /// The access expression.
        access: ast::FieldAccess,
        /// Field name.
        name: String,
        /// Range of the name.
        range: TextRange,
    },
    /// The key of an object field.
    FieldKey {
        /// The field.
        field: ast::Field,
        /// Field name.
        name: String,
        /// Range of the key.
        range: TextRange,
    },
    /// The name of a named argument.
    NamedArg {
        /// The call.
        call: ast::CallExpr,
        /// Parameter name.
        name: String,
        /// Range of the name.
        range: TextRange,
    },
    /// The path string of an import.
    ImportPath {
        /// The import expression.
        import: ast::ImportExpr,
        /// Range of the string.
        range: TextRange,
    },
    /// `self`, `super` or `$`.
    ObjectKeyword {
        /// The keyword expression.
        expr: Expr,
        /// Range of the keyword.
        range: TextRange,
    },
}

impl Target {
    /// Range of the token under the cursor.
    pub const fn range(&self) -> TextRange {
        match self {
            Self::Symbol { range, .. }
            | Self::FieldAccess { range, .. }
            | Self::FieldKey { range, .. }
            | Self::NamedArg { range, .. }
            | Self::ImportPath { range, .. }
            | Self::ObjectKeyword { range, .. } => *range,
        }
    }
}

/// The declaration of a variable whose name spans exactly `range`.
pub fn declared_symbol(doc: &DocModel, range: TextRange) -> Option<SymbolId> {
    doc.scopes
        .symbols()
        .find(|(_, s)| {
            s.range == range && !matches!(s.kind, SymbolKind::Field | SymbolKind::Builtin)
        })
        .map(|(id, _)| id)
}

/// Classify the syntax at `offset`.
pub fn classify(doc: &DocModel, offset: TextSize) -> Option<Target> {
    let token = token_at(&doc.root, offset)?;
    let range = token.text_range();
    let parent = token.parent()?;

    match token.kind() {
        SyntaxKind::SELF_KW | SyntaxKind::SUPER_KW | SyntaxKind::DOLLAR => {
            let expr = Expr::cast(parent)?;
            Some(Target::ObjectKeyword { expr, range })
        }
        kind if kind.is_string() => match parent.kind() {
            SyntaxKind::IMPORT_EXPR => Some(Target::ImportPath {
                import: ast::ImportExpr::cast(parent)?,
                range,
            }),
            SyntaxKind::FIELD_NAME => field_key(&parent, range),
            _ => None,
        },
        _ => match parent.kind() {
            SyntaxKind::VAR_REF => {
                let id = doc.scopes.reference(range)?.symbol?;
                Some(Target::Symbol { id, range })
            }
            SyntaxKind::BIND | SyntaxKind::PARAM | SyntaxKind::FOR_SPEC => {
                let id = declared_symbol(doc, range)?;
                Some(Target::Symbol { id, range })
            }
            SyntaxKind::FIELD_ACCESS => {
                let access = ast::FieldAccess::cast(parent)?;
                if access.field()? != token {
                    return None;
                }
                Some(Target::FieldAccess {
                    access,
                    name: token.text().to_string(),
                    range,
                })
            }
            SyntaxKind::FIELD_NAME => field_key(&parent, range),
            SyntaxKind::ARG => {
                let arg = ast::Arg::cast(parent.clone())?;
                if arg.name()? != token {
                    return None;
                }
                let call = parent.ancestors().find_map(ast::CallExpr::cast)?;
                Some(Target::NamedArg {
                    call,
                    name: token.text().to_string(),
                    range,
                })
            }
            _ => None,
        },
    }
}

fn field_key(name_node: &SyntaxNode, range: TextRange) -> Option<Target> {
    let name = ast::FieldName::cast(name_node.clone())?;
    let field = ast::Field::cast(name_node.parent()?)?;
    Some(Target::FieldKey {
        name: name.text()?,
        field,
        range,
    })
}

/// Whether `name` can be written as a Jsonnet variable.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_well = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_well
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !matches!(
            name,
            "assert"
                | "else"
                | "error"
                | "false"
                | "for"
                | "function"
                | "if"
                | "import"
                | "importstr"
                | "importbin"
                | "in"
                | "local"
                | "null"
                | "self"
                | "super"
                | "tailstrict"
                | "then"
                | "true"
        )
}
