//! Static analysis of Jsonnet documents.
//!
//! This crate turns a parsed document and its resolved imports into the
//! information editor features need:
//!
//! - A [`ScopeTree`] of lexical scopes and symbols, with every variable
//!   reference resolved
//! - Static field resolution through `self`, `super`, `$`, object
//!   composition, locals and imports ([`Resolver`])
//! - The diagnostic pipeline ([`diagnose`])
//! - The `std` table ([`Builtins`])
//!
//! Nothing here evaluates Jsonnet; values are described by their shape.
//!
//! # Diagnostic codes
//!
//! | Code | Description |
//! |------|-------------|
//! | J0001 | Syntax error |
//! | J1001 | Import not found |
//! | J1002 | Cyclic import |
//! | J1003 | Import cannot be read |
//! | J2001 | Unknown variable |
//! | J2002 | Duplicate local or parameter |
//! | J2003 | Local shadows an earlier one (warning) |
//! | J2004 | Duplicate field |
//! | J2005 | `self`, `super` or `$` outside an object |
//!
//! # Example
//!
//! ```ignore
//! use joule_analysis::{Builtins, ScopeTree};
//!
//! let parse = joule_syntax::parse("local x = 1; local x = 2; x");
//! let scopes = ScopeTree::build(&parse, 1, &Builtins::standard());
//! assert_eq!(scopes.problems().len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod builtins;
mod diagnostics;
mod fields;
mod scope;

pub use builtins::{BuiltinFunction, Builtins};
pub use diagnostics::{
    diagnose, Diagnostic, DiagnosticOptions, DiagnosticSet, ErrorCode, Severity,
};
pub use fields::{
    fields_of, DocModel, FieldTarget, FunctionTarget, ImportLookup, ObjectSource, Resolver,
};
pub use scope::{
    BindingProblem, Misplaced, Reference, Scope, ScopeId, ScopeKind, ScopeTree, Symbol, SymbolId,
    SymbolKind, ValueDesc,
};
