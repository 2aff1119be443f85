//! Immutable world snapshot for request handling.
//!
//! Each request and each background diagnostics job receives a snapshot:
//! one committed document revision plus shared, read-only handles to the
//! loader, the builtin table and the settings. Handlers run on the worker
//! pool without locks and check in at checkpoints, where they learn whether
//! the document moved on or the work was cancelled.

use crate::config::Config;
use crate::error::EngineError;
use crate::vfs::DocumentSnapshot;
use joule_analysis::{Builtins, DocModel, Resolver, ScopeTree};
use joule_loader::Loader;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared between the coordinator and a job.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the job to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`EngineError::Cancelled`] once cancelled.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// An immutable snapshot of the world state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// The document the work is about.
    pub doc: DocumentSnapshot,
    /// Import resolution and cached dependency parses.
    pub loader: Arc<Loader>,
    /// The builtin table.
    pub builtins: Arc<Builtins>,
    /// Settings at dispatch time.
    pub config: Arc<Config>,
    live: Arc<AtomicU64>,
    token: CancellationToken,
}

impl Snapshot {
    /// Create a snapshot. `live` is the document's live revision cell.
    pub fn new(
        doc: DocumentSnapshot,
        live: Arc<AtomicU64>,
        loader: Arc<Loader>,
        builtins: Arc<Builtins>,
        config: Arc<Config>,
        token: CancellationToken,
    ) -> Self {
        Self {
            doc,
            loader,
            builtins,
            config,
            live,
            token,
        }
    }

    /// A snapshot whose document never changes.
    pub fn detached(
        doc: DocumentSnapshot,
        loader: Arc<Loader>,
        builtins: Arc<Builtins>,
        config: Arc<Config>,
    ) -> Self {
        let live = Arc::new(AtomicU64::new(doc.revision));
        Self::new(doc, live, loader, builtins, config, CancellationToken::new())
    }

    /// The document's revision right now.
    pub fn live_revision(&self) -> u64 {
        self.live.load(Ordering::SeqCst)
    }

    /// Fail with [`EngineError::VersionMismatch`] unless the live revision is
    /// `expected`.
    pub fn expect_revision(&self, expected: u64) -> Result<(), EngineError> {
        let actual = self.live_revision();
        if actual == expected {
            Ok(())
        } else {
            Err(EngineError::VersionMismatch { expected, actual })
        }
    }

    /// Stop if the work was cancelled or the document moved past the
    /// snapshot.
    pub fn checkpoint(&self) -> Result<(), EngineError> {
        self.token.check()?;
        self.expect_revision(self.doc.revision)
    }

    /// The cancellation token of this piece of work.
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Scopes of the snapshot's document.
    pub fn scopes(&self) -> Arc<ScopeTree> {
        self.doc.scopes(&self.builtins)
    }

    /// A resolver over the loader's cached parses, with the snapshot's own
    /// document registered in place of any cached copy.
    pub fn analysis(&self) -> (Resolver<'_>, Rc<DocModel>) {
        let resolver = Resolver::new(&self.builtins, self.loader.as_ref());
        let doc = resolver.add_document(DocModel::new(
            self.doc.path.clone(),
            self.doc.parse.syntax_node(),
            self.scopes(),
        ));
        (resolver, doc)
    }
}
