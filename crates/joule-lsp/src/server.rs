//! Main LSP server implementation.

use crate::config::{Config, JSONNET_PATH};
use crate::handlers::utils::uri_to_path;
use crate::main_loop::{MainLoopState, Workspace};
use joule_loader::OsFileSystem;
use lsp_server::Connection;
use lsp_types::InitializeParams;
use std::path::PathBuf;
use std::sync::Arc;

/// Result type of the server entry points.
pub type ServerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Capabilities announced in the initialize response.
pub fn server_capabilities() -> lsp_types::ServerCapabilities {
    lsp_types::ServerCapabilities {
        text_document_sync: Some(lsp_types::TextDocumentSyncCapability::Kind(
            lsp_types::TextDocumentSyncKind::INCREMENTAL,
        )),
        completion_provider: Some(lsp_types::CompletionOptions {
            trigger_characters: Some(vec![".".to_string()]),
            ..Default::default()
        }),
        definition_provider: Some(lsp_types::OneOf::Left(true)),
        hover_provider: Some(lsp_types::HoverProviderCapability::Simple(true)),
        references_provider: Some(lsp_types::OneOf::Left(true)),
        document_highlight_provider: Some(lsp_types::OneOf::Left(true)),
        document_symbol_provider: Some(lsp_types::OneOf::Left(true)),
        rename_provider: Some(lsp_types::OneOf::Right(lsp_types::RenameOptions {
            prepare_provider: Some(true),
            work_done_progress_options: Default::default(),
        })),
        document_link_provider: Some(lsp_types::DocumentLinkOptions {
            resolve_provider: Some(false),
            work_done_progress_options: Default::default(),
        }),
        inlay_hint_provider: Some(lsp_types::OneOf::Left(true)),
        folding_range_provider: Some(lsp_types::FoldingRangeProviderCapability::Simple(true)),
        ..Default::default()
    }
}

/// The workspace root announced by the client.
#[allow(deprecated)]
fn workspace_root(params: &InitializeParams) -> Option<PathBuf> {
    params
        .workspace_folders
        .as_ref()
        .and_then(|folders| folders.first())
        .and_then(|folder| uri_to_path(&folder.uri))
        .or_else(|| params.root_uri.as_ref().and_then(uri_to_path))
}

/// Run the initialize handshake and then the main loop on `connection`.
///
/// Returns once the client sends `exit` or disconnects.
///
/// # Errors
///
/// Fails when the handshake breaks down or the worker pool cannot start.
pub fn run_server(connection: &Connection) -> ServerResult {
    let (id, params) = connection.initialize_start()?;
    let init_params: InitializeParams = serde_json::from_value(params)?;

    let config = Config::from_json(init_params.initialization_options.clone());
    let workspace = Workspace {
        root: workspace_root(&init_params),
        env_path: std::env::var(JSONNET_PATH).ok(),
    };
    if let Some(root) = &workspace.root {
        tracing::info!("Workspace root: {}", root.display());
    }

    let init_result = lsp_types::InitializeResult {
        capabilities: server_capabilities(),
        server_info: Some(lsp_types::ServerInfo {
            name: "joule-lsp".to_string(),
            version: Some(crate::VERSION.to_string()),
        }),
    };
    connection.initialize_finish(id, serde_json::to_value(init_result)?)?;
    tracing::info!("LSP initialized successfully");

    let mut state = MainLoopState::new(
        connection.sender.clone(),
        Arc::new(OsFileSystem),
        config,
        workspace,
    )?;
    state.run(&connection.receiver);

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Start the LSP server using stdio transport.
///
/// # Errors
///
/// Fails when the session or the stdio threads fail.
pub fn start_stdio() -> ServerResult {
    tracing::info!("Starting Jsonnet Language Server v{} on stdio", crate::VERSION);

    let (connection, io_threads) = Connection::stdio();
    run_server(&connection)?;

    // Dropping the connection closes the writer thread's channel.
    drop(connection);
    io_threads.join()?;
    Ok(())
}
