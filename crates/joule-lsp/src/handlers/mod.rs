//! LSP request handlers.
//!
//! Each handler answers one request type against an immutable document
//! snapshot and checks the document version before returning.

pub mod utils;

pub mod completion;
pub mod definition;
pub mod diagnostics;
pub mod document_highlight;
pub mod document_links;
pub mod folding;
pub mod hover;
pub mod inlay_hints;
pub mod references;
pub mod rename;
pub mod symbols;
