//! Language Server Protocol implementation for Jsonnet.
//!
//! This crate provides an LSP server for Jsonnet files, enabling IDE features like:
//! - Diagnostics for syntax errors, unresolved names and broken imports
//! - Autocompletion for variables, fields and `std` functions
//! - Go-to-definition through locals, fields and imports
//! - Hover information
//! - References, highlights and rename
//! - Document symbols, folding ranges and import links
//! - Inlay hints
//!
//! # Architecture
//!
//! The server follows rust-analyzer's architecture:
//! - **Main loop**: Handles LSP messages, applies edits, dispatches requests
//! - **VFS**: Open documents, incrementally reparsed on every edit
//! - **Handlers**: Process LSP requests against immutable snapshots on a
//!   worker pool, failing with `ContentModified` when the document moves on
//!
//! # Example
//!
//! ```ignore
//! let (connection, io_threads) = lsp_server::Connection::stdio();
//! joule_lsp::run_server(&connection)?;
//! io_threads.join()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod main_loop;
pub mod snapshot;
pub mod vfs;

mod server;

pub use config::Config;
pub use error::EngineError;
pub use main_loop::MainLoopState;
pub use server::{run_server, server_capabilities, start_stdio, ServerResult};
pub use snapshot::{CancellationToken, Snapshot};
pub use vfs::{DocumentSnapshot, Vfs};

/// LSP server version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
