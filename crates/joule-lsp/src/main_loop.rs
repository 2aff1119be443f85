//! Main event loop for the LSP server.
//!
//! Follows rust-analyzer's architecture:
//! - Notifications handled synchronously, so the edits of one document are
//!   applied in arrival order
//! - Requests dispatched to the worker pool with immutable snapshots
//! - Diagnostics debounced on the loop thread, then run as one single-slot,
//!   cancellable job per document; results for superseded revisions are
//!   dropped

use crate::config::Config;
use crate::error::EngineError;
use crate::handlers::completion::handle_completion;
use crate::handlers::definition::handle_goto_definition;
use crate::handlers::diagnostics::{compute_diagnostics, to_lsp_diagnostics};
use crate::handlers::document_highlight::handle_document_highlight;
use crate::handlers::document_links::handle_document_links;
use crate::handlers::folding::handle_folding_ranges;
use crate::handlers::hover::handle_hover;
use crate::handlers::inlay_hints::handle_inlay_hints;
use crate::handlers::references::handle_references;
use crate::handlers::rename::{handle_prepare_rename, handle_rename};
use crate::handlers::symbols::handle_document_symbols;
use crate::handlers::utils::uri_to_path;
use crate::snapshot::{CancellationToken, Snapshot};
use crate::vfs::Vfs;
use crossbeam_channel::{Receiver, Sender};
use joule_analysis::{Builtins, DiagnosticSet};
use joule_loader::{FileSystem, Loader};
use joule_syntax::JsonnetParser;
use lsp_server::{ErrorCode, Message, RequestId};
use lsp_types::notification::{
    Cancel, DidChangeConfiguration, DidChangeTextDocument, DidChangeWatchedFiles,
    DidCloseTextDocument, DidOpenTextDocument, Exit, Initialized, Notification,
    PublishDiagnostics,
};
use lsp_types::request::{
    Completion, DocumentHighlightRequest, DocumentLinkRequest, DocumentSymbolRequest,
    FoldingRangeRequest, GotoDefinition, HoverRequest, InlayHintRequest, PrepareRenameRequest,
    References, Rename, Request, Shutdown,
};
use lsp_types::{NumberOrString, PublishDiagnosticsParams, Uri};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of background work, handed back to the main loop.
#[derive(Debug)]
pub enum Task {
    /// A finished request.
    Response(lsp_server::Response),
    /// Diagnostics computed for one document revision.
    Diagnostics {
        /// Document path.
        path: PathBuf,
        /// Revision the set was computed for.
        revision: u64,
        /// The diagnostics.
        set: DiagnosticSet,
    },
    /// A document's imports now point somewhere else.
    ImportsChanged {
        /// Document path.
        path: PathBuf,
    },
}

/// Where the server runs: workspace root and environment.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    /// Workspace root, if the client sent one.
    pub root: Option<PathBuf>,
    /// Value of `JSONNET_PATH`.
    pub env_path: Option<String>,
}

/// State managed by the main loop.
pub struct MainLoopState {
    sender: Sender<Message>,
    vfs: Vfs,
    loader: Arc<Loader>,
    builtins: Arc<Builtins>,
    config: Arc<Config>,
    workspace: Workspace,
    pool: rayon::ThreadPool,
    task_tx: Sender<Task>,
    task_rx: Receiver<Task>,
    /// When each document's next diagnostics job is due.
    due: HashMap<PathBuf, Instant>,
    /// Cancellation token of each document's running diagnostics job.
    jobs: HashMap<PathBuf, CancellationToken>,
    /// Cancellation tokens of requests in flight.
    requests: HashMap<RequestId, CancellationToken>,
    /// Last diagnostics sent per document.
    published: HashMap<Uri, Vec<lsp_types::Diagnostic>>,
    shutdown_requested: bool,
}

impl std::fmt::Debug for MainLoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainLoopState")
            .field("vfs", &self.vfs)
            .field("config", &self.config)
            .field("due", &self.due.len())
            .field("jobs", &self.jobs.len())
            .field("requests", &self.requests.len())
            .field("shutdown_requested", &self.shutdown_requested)
            .finish_non_exhaustive()
    }
}

impl MainLoopState {
    /// Create the state for a session reading imports from `fs`.
    ///
    /// # Errors
    ///
    /// Fails when the worker pool cannot be started.
    pub fn new(
        sender: Sender<Message>,
        fs: Arc<dyn FileSystem>,
        config: Config,
        workspace: Workspace,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("joule-worker-{i}"))
            .build()?;
        let search = config.search_paths(workspace.root.as_deref(), workspace.env_path.as_deref());
        let (task_tx, task_rx) = crossbeam_channel::unbounded();
        Ok(Self {
            sender,
            vfs: Vfs::new(Arc::new(JsonnetParser)),
            loader: Arc::new(Loader::new(fs, search)),
            builtins: Arc::new(Builtins::standard()),
            config: Arc::new(config),
            workspace,
            pool,
            task_tx,
            task_rx,
            due: HashMap::new(),
            jobs: HashMap::new(),
            requests: HashMap::new(),
            published: HashMap::new(),
            shutdown_requested: false,
        })
    }

    /// Process client messages and task results until `exit` arrives or the
    /// client disconnects.
    pub fn run(&mut self, receiver: &Receiver<Message>) {
        tracing::info!("Main loop started");
        let tasks = self.task_rx.clone();
        loop {
            let timer = self
                .due
                .values()
                .min()
                .map_or_else(crossbeam_channel::never, |&at| crossbeam_channel::at(at));
            crossbeam_channel::select! {
                recv(receiver) -> msg => match msg {
                    Ok(msg) => {
                        if !self.handle_message(msg) {
                            break;
                        }
                    }
                    Err(_) => {
                        tracing::info!("Client disconnected");
                        break;
                    }
                },
                recv(tasks) -> task => {
                    if let Ok(task) = task {
                        self.handle_task(task);
                    }
                }
                recv(timer) -> _ => self.spawn_due(),
            }
        }
        self.due.clear();
        for token in self.jobs.values().chain(self.requests.values()) {
            token.cancel();
        }
        tracing::info!("Main loop ended");
    }

    /// Handle one client message. Returns `false` when the loop should end.
    fn handle_message(&mut self, msg: Message) -> bool {
        match msg {
            Message::Request(req) => self.handle_request(req),
            Message::Notification(notif) => {
                if notif.method == Exit::METHOD {
                    tracing::info!("Exit notification received");
                    return false;
                }
                self.handle_notification(notif);
            }
            Message::Response(resp) => {
                tracing::debug!("Client response to {:?}", resp.id);
            }
        }
        true
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Handle an LSP request (expects response).
    fn handle_request(&mut self, req: lsp_server::Request) {
        if self.shutdown_requested {
            self.respond(lsp_server::Response::new_err(
                req.id,
                ErrorCode::InvalidRequest as i32,
                "shutdown already requested".to_string(),
            ));
            return;
        }

        match req.method.as_str() {
            Shutdown::METHOD => {
                tracing::info!("Shutdown requested");
                self.shutdown_requested = true;
                self.respond(lsp_server::Response::new_ok(req.id, ()));
            }
            Completion::METHOD => self.spawn_request::<Completion>(
                req,
                |p| &p.text_document_position.text_document.uri,
                handle_completion,
            ),
            GotoDefinition::METHOD => self.spawn_request::<GotoDefinition>(
                req,
                |p| &p.text_document_position_params.text_document.uri,
                handle_goto_definition,
            ),
            HoverRequest::METHOD => self.spawn_request::<HoverRequest>(
                req,
                |p| &p.text_document_position_params.text_document.uri,
                handle_hover,
            ),
            References::METHOD => self.spawn_request::<References>(
                req,
                |p| &p.text_document_position.text_document.uri,
                handle_references,
            ),
            DocumentHighlightRequest::METHOD => self.spawn_request::<DocumentHighlightRequest>(
                req,
                |p| &p.text_document_position_params.text_document.uri,
                handle_document_highlight,
            ),
            PrepareRenameRequest::METHOD => self.spawn_request::<PrepareRenameRequest>(
                req,
                |p| &p.text_document.uri,
                handle_prepare_rename,
            ),
            Rename::METHOD => self.spawn_request::<Rename>(
                req,
                |p| &p.text_document_position.text_document.uri,
                handle_rename,
            ),
            DocumentSymbolRequest::METHOD => self.spawn_request::<DocumentSymbolRequest>(
                req,
                |p| &p.text_document.uri,
                handle_document_symbols,
            ),
            FoldingRangeRequest::METHOD => self.spawn_request::<FoldingRangeRequest>(
                req,
                |p| &p.text_document.uri,
                handle_folding_ranges,
            ),
            DocumentLinkRequest::METHOD => self.spawn_request::<DocumentLinkRequest>(
                req,
                |p| &p.text_document.uri,
                handle_document_links,
            ),
            InlayHintRequest::METHOD => self.spawn_request::<InlayHintRequest>(
                req,
                |p| &p.text_document.uri,
                handle_inlay_hints,
            ),
            _ => {
                tracing::warn!("Unhandled request: {}", req.method);
                self.respond(lsp_server::Response::new_err(
                    req.id,
                    ErrorCode::MethodNotFound as i32,
                    format!("Unhandled request: {}", req.method),
                ));
            }
        }
    }

    /// Run `handler` on the worker pool against a snapshot of the request's
    /// document.
    fn spawn_request<R>(
        &mut self,
        req: lsp_server::Request,
        uri: fn(&R::Params) -> &Uri,
        handler: fn(&Snapshot, &R::Params) -> Result<R::Result, EngineError>,
    ) where
        R: Request,
        R::Params: DeserializeOwned + Send + 'static,
        R::Result: Serialize,
    {
        let id = req.id;
        let params: R::Params = match serde_json::from_value(req.params) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!("Invalid params for {}: {}", R::METHOD, e);
                self.respond(lsp_server::Response::new_err(
                    id,
                    ErrorCode::InvalidParams as i32,
                    e.to_string(),
                ));
                return;
            }
        };

        let uri = uri(&params);
        let Some(doc) = uri_to_path(uri).and_then(|path| self.vfs.get(&path)) else {
            self.respond(EngineError::UnknownDocument(uri.as_str().to_string()).into_response(id));
            return;
        };
        tracing::debug!(
            "{} for {} at version {} (revision {})",
            R::METHOD,
            uri.as_str(),
            doc.version(),
            doc.revision()
        );

        let token = CancellationToken::new();
        self.requests.insert(id.clone(), token.clone());
        let snap = Snapshot::new(
            doc.snapshot().clone(),
            doc.live_revision(),
            Arc::clone(&self.loader),
            Arc::clone(&self.builtins),
            Arc::clone(&self.config),
            token,
        );
        let tx = self.task_tx.clone();
        self.pool.spawn(move || {
            let response = match handler(&snap, &params) {
                Ok(result) => lsp_server::Response::new_ok(id, result),
                Err(e) => {
                    tracing::debug!("{} failed: {}", R::METHOD, e);
                    e.into_response(id)
                }
            };
            // The loop only stops listening once it is shutting down.
            let _ = tx.send(Task::Response(response));
        });
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Handle an LSP notification. Runs on the loop thread.
    fn handle_notification(&mut self, notif: lsp_server::Notification) {
        match notif.method.as_str() {
            DidOpenTextDocument::METHOD => {
                if let Some(params) = parse_params::<DidOpenTextDocument>(notif) {
                    self.on_did_open(params);
                }
            }
            DidChangeTextDocument::METHOD => {
                if let Some(params) = parse_params::<DidChangeTextDocument>(notif) {
                    self.on_did_change(params);
                }
            }
            DidCloseTextDocument::METHOD => {
                if let Some(params) = parse_params::<DidCloseTextDocument>(notif) {
                    self.on_did_close(&params);
                }
            }
            DidChangeWatchedFiles::METHOD => {
                if let Some(params) = parse_params::<DidChangeWatchedFiles>(notif) {
                    self.on_did_change_watched_files(&params);
                }
            }
            DidChangeConfiguration::METHOD => {
                if let Some(params) = parse_params::<DidChangeConfiguration>(notif) {
                    self.on_did_change_configuration(params);
                }
            }
            Cancel::METHOD => {
                if let Some(params) = parse_params::<Cancel>(notif) {
                    let id = match params.id {
                        NumberOrString::Number(n) => RequestId::from(n),
                        NumberOrString::String(s) => RequestId::from(s),
                    };
                    if let Some(token) = self.requests.get(&id) {
                        tracing::debug!("Cancelling request {:?}", id);
                        token.cancel();
                    }
                }
            }
            Initialized::METHOD => {
                tracing::info!("Client initialized");
                self.register_file_watchers();
            }
            _ => {
                tracing::debug!("Unhandled notification: {}", notif.method);
            }
        }
    }

    fn on_did_open(&mut self, params: lsp_types::DidOpenTextDocumentParams) {
        let doc = params.text_document;
        let Some(path) = uri_to_path(&doc.uri) else {
            tracing::warn!("Ignoring non-file document {}", doc.uri.as_str());
            return;
        };
        tracing::info!("Document opened: {}", doc.uri.as_str());

        let snapshot = self.vfs.open(doc.uri, path.clone(), &doc.text, doc.version);
        self.loader
            .set_overlay(&path, Arc::clone(&snapshot.text), snapshot.parse.clone());
        self.schedule_diagnostics(&path);
        self.schedule_importers(&path);
    }

    fn on_did_change(&mut self, params: lsp_types::DidChangeTextDocumentParams) {
        let Some(path) = uri_to_path(&params.text_document.uri) else {
            return;
        };
        let version = params.text_document.version;
        match self
            .vfs
            .apply_changes(&path, version, &params.content_changes)
        {
            Ok(snapshot) => {
                self.loader
                    .set_overlay(&path, Arc::clone(&snapshot.text), snapshot.parse.clone());
                self.schedule_diagnostics(&path);
                self.schedule_importers(&path);
            }
            Err(e @ EngineError::StaleVersion { .. }) => {
                tracing::warn!("{}; keeping the stored text until a full resync", e);
            }
            Err(e) => {
                tracing::warn!("Change ignored: {}", e);
            }
        }
    }

    fn on_did_close(&mut self, params: &lsp_types::DidCloseTextDocumentParams) {
        let uri = &params.text_document.uri;
        let Some(path) = uri_to_path(uri) else {
            return;
        };
        tracing::info!("Document closed: {}", uri.as_str());

        if !self.vfs.close(&path) {
            return;
        }
        self.loader.remove_overlay(&path);
        self.due.remove(&path);
        if let Some(job) = self.jobs.remove(&path) {
            job.cancel();
        }
        self.published.remove(uri);
        self.send_diagnostics(uri.clone(), None, Vec::new());
        // Importers now see the file on disk.
        self.schedule_importers(&path);
    }

    fn on_did_change_watched_files(&mut self, params: &lsp_types::DidChangeWatchedFilesParams) {
        tracing::info!("Watched files changed: {} files", params.changes.len());
        for change in &params.changes {
            tracing::debug!("File {}: {:?}", change.uri.as_str(), change.typ);
            if let Some(path) = uri_to_path(&change.uri) {
                self.loader.file_changed(&path);
            }
        }
        self.schedule_all();
    }

    fn on_did_change_configuration(&mut self, params: lsp_types::DidChangeConfigurationParams) {
        if params.settings.is_null() {
            return;
        }
        let config = Config::from_json(Some(params.settings));
        tracing::info!("Configuration changed: {:?}", config);
        self.loader.set_search_paths(config.search_paths(
            self.workspace.root.as_deref(),
            self.workspace.env_path.as_deref(),
        ));
        self.config = Arc::new(config);
        self.schedule_all();
    }

    /// Register file watchers with the client.
    fn register_file_watchers(&self) {
        let watchers = ["**/*.jsonnet", "**/*.libsonnet", "**/*.json"]
            .into_iter()
            .map(|pattern| lsp_types::FileSystemWatcher {
                glob_pattern: lsp_types::GlobPattern::String(pattern.to_string()),
                kind: Some(lsp_types::WatchKind::all()),
            })
            .collect();

        let registration = lsp_types::Registration {
            id: "file-watcher".to_string(),
            method: DidChangeWatchedFiles::METHOD.to_string(),
            register_options: serde_json::to_value(
                lsp_types::DidChangeWatchedFilesRegistrationOptions { watchers },
            )
            .ok(),
        };

        let request = lsp_server::Request::new(
            RequestId::from("register-file-watchers".to_string()),
            "client/registerCapability".to_string(),
            lsp_types::RegistrationParams {
                registrations: vec![registration],
            },
        );
        self.send(Message::Request(request));
        tracing::info!("Registered file watchers for Jsonnet sources");
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Queue diagnostics for the open document at `path` and cancel the job
    /// already running for it. The job starts once the document has been
    /// quiet for the debounce delay; every call pushes the deadline back.
    fn schedule_diagnostics(&mut self, path: &Path) {
        let Some(doc) = self.vfs.get(path) else {
            return;
        };
        if let Some(previous) = self.jobs.remove(path) {
            previous.cancel();
        }
        if !self.config.diagnostics.enable {
            let uri = doc.snapshot().uri.clone();
            self.due.remove(path);
            self.publish(uri, None, Vec::new());
            return;
        }

        let debounce = Duration::from_millis(self.config.debounce_ms);
        if debounce.is_zero() {
            self.due.remove(path);
            self.spawn_diagnostics(path);
        } else {
            self.due.insert(path.to_path_buf(), Instant::now() + debounce);
        }
    }

    /// Start the jobs whose deadline has passed.
    fn spawn_due(&mut self) {
        let now = Instant::now();
        let ready: Vec<PathBuf> = self
            .due
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(path, _)| path.clone())
            .collect();
        for path in ready {
            self.due.remove(&path);
            self.spawn_diagnostics(&path);
        }
    }

    /// Run diagnostics of the current revision of `path` on the pool.
    fn spawn_diagnostics(&mut self, path: &Path) {
        let Some(doc) = self.vfs.get(path) else {
            return;
        };
        let token = CancellationToken::new();
        let snap = Snapshot::new(
            doc.snapshot().clone(),
            doc.live_revision(),
            Arc::clone(&self.loader),
            Arc::clone(&self.builtins),
            Arc::clone(&self.config),
            token.clone(),
        );
        tracing::debug!(
            "Diagnostics job for {} at revision {}",
            path.display(),
            snap.doc.revision
        );
        self.jobs.insert(path.to_path_buf(), token);
        let tx = self.task_tx.clone();
        self.pool.spawn(move || diagnostics_job(&snap, &tx));
    }

    /// Re-run diagnostics of the open documents importing `path`.
    fn schedule_importers(&mut self, path: &Path) {
        for importer in self.loader.importers_of(path) {
            if self.vfs.contains(&importer) {
                self.schedule_diagnostics(&importer);
            }
        }
    }

    fn schedule_all(&mut self) {
        let paths: Vec<PathBuf> = self.vfs.paths().cloned().collect();
        for path in paths {
            self.schedule_diagnostics(&path);
        }
    }

    fn handle_task(&mut self, task: Task) {
        match task {
            Task::Response(response) => {
                self.requests.remove(&response.id);
                self.respond(response);
            }
            Task::Diagnostics {
                path,
                revision,
                set,
            } => {
                let Some(doc) = self.vfs.snapshot(&path) else {
                    return;
                };
                if doc.revision != revision {
                    tracing::debug!(
                        "Dropping diagnostics for {} at revision {}, now {}",
                        path.display(),
                        revision,
                        doc.revision
                    );
                    return;
                }
                let diagnostics = to_lsp_diagnostics(&set, &doc);
                self.publish(doc.uri, Some(doc.version), diagnostics);
            }
            Task::ImportsChanged { path } => {
                let others: Vec<PathBuf> = self
                    .vfs
                    .paths()
                    .filter(|p| **p != path)
                    .cloned()
                    .collect();
                for other in others {
                    self.schedule_diagnostics(&other);
                }
            }
        }
    }

    /// Publish unless the client already has exactly these diagnostics.
    fn publish(
        &mut self,
        uri: Uri,
        version: Option<i32>,
        diagnostics: Vec<lsp_types::Diagnostic>,
    ) {
        if self.published.get(&uri) == Some(&diagnostics) {
            tracing::debug!("Diagnostics for {} unchanged", uri.as_str());
            return;
        }
        tracing::debug!(
            "Publishing {} diagnostics for {}",
            diagnostics.len(),
            uri.as_str()
        );
        self.published.insert(uri.clone(), diagnostics.clone());
        self.send_diagnostics(uri, version, diagnostics);
    }

    fn send_diagnostics(
        &self,
        uri: Uri,
        version: Option<i32>,
        diagnostics: Vec<lsp_types::Diagnostic>,
    ) {
        let params = PublishDiagnosticsParams {
            uri,
            diagnostics,
            version,
        };
        let notif = lsp_server::Notification::new(PublishDiagnostics::METHOD.to_string(), params);
        self.send(Message::Notification(notif));
    }

    fn respond(&self, response: lsp_server::Response) {
        self.send(Message::Response(response));
    }

    /// Send a message to the client.
    fn send(&self, msg: Message) {
        if let Err(e) = self.sender.send(msg) {
            tracing::error!("Failed to send message: {}", e);
        }
    }
}

fn parse_params<N>(notif: lsp_server::Notification) -> Option<N::Params>
where
    N: Notification,
    N::Params: DeserializeOwned,
{
    match serde_json::from_value(notif.params) {
        Ok(params) => Some(params),
        Err(e) => {
            tracing::warn!("Invalid params for {}: {}", N::METHOD, e);
            None
        }
    }
}

/// Background diagnostics for one document revision.
///
/// The first pass uses only what the loader already knows; if that leaves
/// imports pending it is sent anyway and followed by a pass that resolves
/// them from the filesystem.
fn diagnostics_job(snap: &Snapshot, tx: &Sender<Task>) {
    let run = || -> Result<(), EngineError> {
        // The job may have waited in the pool behind other work.
        snap.checkpoint()?;
        let path = snap.doc.path.clone();
        let revision = snap.doc.revision;

        let first = compute_diagnostics(snap, false)?;
        let mut edges_changed = first.edges_changed;
        let pending = first.set.pending;
        snap.token().check()?;
        let _ = tx.send(Task::Diagnostics {
            path: path.clone(),
            revision,
            set: first.set,
        });

        if pending {
            let settled = compute_diagnostics(snap, true)?;
            edges_changed |= settled.edges_changed;
            snap.token().check()?;
            let _ = tx.send(Task::Diagnostics {
                path: path.clone(),
                revision,
                set: settled.set,
            });
        }

        if edges_changed {
            let _ = tx.send(Task::ImportsChanged { path });
        }
        Ok(())
    };

    if let Err(e) = run() {
        tracing::debug!("Diagnostics for {} stopped: {}", snap.doc.path.display(), e);
    }
}
