//! The diagnostic pipeline.
//!
//! [`diagnose`] gathers every problem of one document version: syntax
//! errors, import failures, unresolved names and declaration problems. All
//! sources are collected before deduplication, so one failing check never
//! hides another.

use joule_loader::{DocumentImports, ImportStatus, LoadError};
use joule_syntax::{Parse, TextRange};
use std::collections::HashSet;
use thiserror::Error;

use crate::scope::{BindingProblem, ScopeTree, SymbolKind};

/// Diagnostic codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    // === Syntax (J0xxx) ===
    /// J0001: The parser could not make sense of the text.
    Syntax,

    // === Imports (J1xxx) ===
    /// J1001: No file matches an import path.
    UnresolvedImport,
    /// J1002: An import leads back to the importing document.
    CyclicImport,
    /// J1003: The import target exists but cannot be read.
    UnreadableImport,

    // === Names (J2xxx) ===
    /// J2001: A variable is not bound in any enclosing scope.
    UnresolvedName,
    /// J2002: Two binds of one `local`, or two parameters, share a name.
    DuplicateBinding,
    /// J2003: A `local` hides a binding from earlier in its chain (warning).
    ShadowedBinding,
    /// J2004: Two fields of one object share a name.
    DuplicateField,
    /// J2005: `self`, `super` or `$` outside of any object.
    ObjectKeywordOutsideObject,
}

impl ErrorCode {
    /// The code string.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Syntax => "J0001",
            Self::UnresolvedImport => "J1001",
            Self::CyclicImport => "J1002",
            Self::UnreadableImport => "J1003",
            Self::UnresolvedName => "J2001",
            Self::DuplicateBinding => "J2002",
            Self::ShadowedBinding => "J2003",
            Self::DuplicateField => "J2004",
            Self::ObjectKeywordOutsideObject => "J2005",
        }
    }

    /// Check if this is a warning rather than an error.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(self, Self::ShadowedBinding)
    }

    /// Get the severity level.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        if self.is_warning() {
            Severity::Warning
        } else {
            Severity::Error
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// The document is wrong.
    Error,
    /// Suspicious but valid.
    Warning,
}

/// One problem in a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("[{code}] {message}")]
pub struct Diagnostic {
    /// Diagnostic code.
    pub code: ErrorCode,
    /// Human readable message.
    pub message: String,
    /// Where the problem is.
    pub range: TextRange,
    /// How bad it is.
    pub severity: Severity,
    /// A second location involved, such as the earlier of two declarations.
    pub related: Option<(TextRange, String)>,
}

impl Diagnostic {
    /// Create a diagnostic with the code's default severity.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>, range: TextRange) -> Self {
        Self {
            code,
            message: message.into(),
            range,
            severity: code.severity(),
            related: None,
        }
    }

    /// Point at a second location.
    #[must_use]
    pub fn with_related(mut self, range: TextRange, message: impl Into<String>) -> Self {
        self.related = Some((range, message.into()));
        self
    }
}

/// The diagnostics of one document version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticSet {
    /// Version the set was computed for.
    pub version: i32,
    /// Diagnostics ordered by position, then code.
    pub diagnostics: Vec<Diagnostic>,
    /// Some imports were not resolved yet; the set is incomplete.
    pub pending: bool,
}

impl DiagnosticSet {
    /// Number of error-severity diagnostics.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    /// Diagnostics with the given code.
    pub fn with_code(&self, code: ErrorCode) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.code == code)
    }
}

/// Which optional checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticOptions {
    /// Report locals that hide an earlier binding of their chain.
    pub shadowing: bool,
}

impl Default for DiagnosticOptions {
    fn default() -> Self {
        Self { shadowing: true }
    }
}

/// Compute the diagnostics of a document from its parse, scopes and imports.
///
/// The version of the result is the version of `scopes`.
#[must_use]
pub fn diagnose(
    parse: &Parse,
    scopes: &ScopeTree,
    imports: &DocumentImports,
    options: DiagnosticOptions,
) -> DiagnosticSet {
    let mut diagnostics = Vec::new();

    for error in parse.errors() {
        diagnostics.push(Diagnostic::new(ErrorCode::Syntax, error.message.clone(), error.range));
    }

    for import in &imports.imports {
        if let ImportStatus::Unresolved(err) = &import.status {
            let code = match err {
                LoadError::NotFound { .. } => ErrorCode::UnresolvedImport,
                LoadError::CyclicImport { .. } => ErrorCode::CyclicImport,
                LoadError::Io { .. } | LoadError::InvalidUtf8 { .. } => ErrorCode::UnreadableImport,
            };
            diagnostics.push(Diagnostic::new(code, err.to_string(), import.site.range));
        }
    }

    for reference in scopes.references() {
        if reference.symbol.is_none() {
            diagnostics.push(Diagnostic::new(
                ErrorCode::UnresolvedName,
                format!("unknown variable '{}'", reference.name),
                reference.range,
            ));
        }
    }

    for problem in scopes.problems() {
        let (code, symbol, previous) = match *problem {
            BindingProblem::Duplicate { symbol, previous } => {
                (ErrorCode::DuplicateBinding, symbol, previous)
            }
            BindingProblem::Shadowed { symbol, previous } => {
                if !options.shadowing {
                    continue;
                }
                (ErrorCode::ShadowedBinding, symbol, previous)
            }
            BindingProblem::DuplicateField { symbol, previous } => {
                (ErrorCode::DuplicateField, symbol, previous)
            }
        };
        let symbol = scopes.symbol(symbol);
        let previous = scopes.symbol(previous);
        let message = match code {
            ErrorCode::ShadowedBinding => format!("'{}' shadows an earlier local", symbol.name),
            ErrorCode::DuplicateField => format!("duplicate field '{}'", symbol.name),
            _ if symbol.kind == SymbolKind::Parameter => {
                format!("duplicate parameter '{}'", symbol.name)
            }
            _ => format!("duplicate local '{}'", symbol.name),
        };
        diagnostics.push(
            Diagnostic::new(code, message, symbol.range)
                .with_related(previous.range, format!("'{}' first declared here", previous.name)),
        );
    }

    for misplaced in scopes.misplaced() {
        diagnostics.push(Diagnostic::new(
            ErrorCode::ObjectKeywordOutsideObject,
            format!("'{}' used outside of an object", misplaced.keyword),
            misplaced.range,
        ));
    }

    let mut seen = HashSet::new();
    diagnostics.retain(|d| seen.insert((d.range, d.code)));
    diagnostics.sort_by_key(|d| (d.range.start(), d.range.end(), d.code));
    tracing::debug!(
        version = scopes.version(),
        count = diagnostics.len(),
        pending = !imports.is_settled(),
        "diagnostics computed"
    );

    DiagnosticSet {
        version: scopes.version(),
        diagnostics,
        pending: !imports.is_settled(),
    }
}
