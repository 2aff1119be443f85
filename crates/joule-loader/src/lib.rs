//! Jsonnet import resolution.
//!
//! This crate maps `import` expressions to files, loads and parses the
//! targets, and keeps a graph of which document imports which. It builds on
//! the parser to provide everything the analysis needs to look across file
//! boundaries.
//!
//! # Features
//!
//! - Search through the importer's directory, library roots, `vendor/` and
//!   the workspace root
//! - Filesystem behind a trait, with an in-memory implementation for tests
//! - Open editor buffers shadow the disk
//! - Parse cache keyed by content hash, so shared imports are parsed once
//! - Cycle classification on an arena graph without recursion
//!
//! # Example
//!
//! ```ignore
//! use joule_loader::{Loader, MemoryFileSystem, SearchPaths};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let fs = Arc::new(MemoryFileSystem::new());
//! fs.insert("/w/lib.libsonnet", "{ port: 80 }");
//! let loader = Loader::new(fs, SearchPaths::default());
//! let main = joule_syntax::parse("(import 'lib.libsonnet').port");
//! let imports = loader.resolve_document(Path::new("/w/main.jsonnet"), &main);
//! assert!(imports.is_settled());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod fs;
mod graph;
mod search;

pub use cache::{content_hash, ParseCache, SourceFile};
pub use fs::{FileSystem, FsError, MemoryFileSystem, OsFileSystem};
pub use graph::{DocId, ImportEdge, ImportGraph};
pub use search::{normalize, SearchPaths};

use joule_syntax::ast::{import_sites, ImportKind, ImportSite};
use joule_syntax::Parse;
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Upper bound on the number of files loaded for one import closure.
const MAX_CLOSURE: usize = 512;

/// Why an import could not be used.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// No candidate path exists.
    #[error("cannot find import '{import}'")]
    NotFound {
        /// The path as written in the import.
        import: String,
        /// Every location that was tried, in search order.
        searched: Vec<PathBuf>,
    },

    /// Following the import leads back to the importer.
    #[error("cyclic import: {}", display_cycle(.cycle))]
    CyclicImport {
        /// Files of the cycle, starting and ending at the importer.
        cycle: Vec<PathBuf>,
    },

    /// IO error reading a file.
    #[error("failed to read file {}: {source}", .path.display())]
    Io {
        /// The path that failed to read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The file is not valid UTF-8.
    #[error("{} is not valid UTF-8", .path.display())]
    InvalidUtf8 {
        /// The offending file.
        path: PathBuf,
    },
}

fn display_cycle(cycle: &[PathBuf]) -> String {
    cycle
        .iter()
        .map(|p| {
            p.file_name()
                .map_or_else(|| p.display().to_string(), |n| n.to_string_lossy().into_owned())
        })
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl LoadError {
    fn from_fs(error: FsError, import: &str, searched: Vec<PathBuf>) -> Self {
        match error {
            FsError::NotFound(_) => Self::NotFound {
                import: import.to_string(),
                searched,
            },
            FsError::Io { path, source } => Self::Io {
                path,
                source: Arc::new(source),
            },
        }
    }
}

/// A successfully resolved import.
#[derive(Debug, Clone)]
pub struct ResolvedImport {
    /// Which keyword was used.
    pub kind: ImportKind,
    /// The file the import refers to.
    pub path: PathBuf,
    /// The parsed target. Only `import` targets are parsed.
    pub file: Option<Arc<SourceFile>>,
}

/// Outcome of resolving one import site.
#[derive(Debug, Clone)]
pub enum ImportStatus {
    /// The target was found.
    Resolved(ResolvedImport),
    /// The target cannot be used.
    Unresolved(LoadError),
    /// The answer needs filesystem access that has not happened yet.
    Pending,
}

/// One import site of a document and its outcome.
#[derive(Debug, Clone)]
pub struct ImportResolution {
    /// The import expression.
    pub site: ImportSite,
    /// What it resolved to.
    pub status: ImportStatus,
}

/// The imports of one document.
#[derive(Debug, Clone)]
pub struct DocumentImports {
    /// The document in the import graph.
    pub id: DocId,
    /// Every import site in document order.
    pub imports: Vec<ImportResolution>,
    /// Whether the set of imported documents differs from the previous
    /// resolution.
    pub edges_changed: bool,
}

impl DocumentImports {
    /// Whether no import is waiting for filesystem access.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !self
            .imports
            .iter()
            .any(|i| matches!(i.status, ImportStatus::Pending))
    }

    /// The resolution of the import whose expression spans `range`.
    #[must_use]
    pub fn at(&self, range: joule_syntax::TextRange) -> Option<&ImportResolution> {
        self.imports.iter().find(|i| i.site.range == range)
    }
}

type LocateKey = (PathBuf, String);

/// Jsonnet import loader.
///
/// Shared by every analysis task; all methods take `&self`.
#[derive(Debug)]
pub struct Loader {
    fs: Arc<dyn FileSystem>,
    search: RwLock<SearchPaths>,
    /// Open editor buffers, shadowing the filesystem.
    overlays: RwLock<HashMap<PathBuf, Arc<SourceFile>>>,
    cache: ParseCache,
    /// Memoized search results keyed by importer directory and import path.
    located: RwLock<HashMap<LocateKey, Result<PathBuf, LoadError>>>,
    graph: RwLock<ImportGraph>,
    /// Documents whose outgoing edges reflect the current files.
    fresh: RwLock<HashSet<DocId>>,
}

impl Loader {
    /// Create a loader reading through `fs`.
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, search: SearchPaths) -> Self {
        Self {
            fs,
            search: RwLock::new(search),
            overlays: RwLock::default(),
            cache: ParseCache::new(),
            located: RwLock::default(),
            graph: RwLock::default(),
            fresh: RwLock::default(),
        }
    }

    /// Replace the search paths. Forgets every memoized search.
    pub fn set_search_paths(&self, search: SearchPaths) {
        *self.search.write() = search;
        self.forget_searches();
    }

    /// The current search paths.
    #[must_use]
    pub fn search_paths(&self) -> SearchPaths {
        self.search.read().clone()
    }

    /// The parse cache.
    #[must_use]
    pub const fn cache(&self) -> &ParseCache {
        &self.cache
    }

    /// Read access to the import graph.
    pub fn graph(&self) -> RwLockReadGuard<'_, ImportGraph> {
        self.graph.read()
    }

    /// The graph id of `path`, adding it if needed.
    pub fn doc_id(&self, path: &Path) -> DocId {
        if let Some(id) = self.graph.read().id(path) {
            return id;
        }
        self.graph.write().intern(path)
    }

    /// Use an editor buffer's contents for `path` instead of the disk.
    pub fn set_overlay(&self, path: &Path, text: Arc<str>, parse: Parse) {
        let file = Arc::new(SourceFile::with_parse(path.to_path_buf(), text, parse));
        let added = self
            .overlays
            .write()
            .insert(path.to_path_buf(), file)
            .is_none();
        if added {
            // A buffer for a file that is not on disk can satisfy searches
            // that previously failed.
            self.forget_searches();
        }
    }

    /// Stop shadowing `path`.
    pub fn remove_overlay(&self, path: &Path) {
        if self.overlays.write().remove(path).is_some() {
            self.cache.invalidate(path);
            self.forget_searches();
        }
    }

    /// A file changed on disk (created, modified or deleted).
    pub fn file_changed(&self, path: &Path) {
        tracing::debug!(path = %path.display(), "file changed");
        self.cache.invalidate(path);
        self.forget_searches();
    }

    /// The loaded file at `path` without touching the filesystem.
    #[must_use]
    pub fn peek(&self, path: &Path) -> Option<Arc<SourceFile>> {
        if let Some(file) = self.overlays.read().get(path) {
            return Some(Arc::clone(file));
        }
        self.cache.peek(path)
    }

    /// Load and parse `path`, preferring an open buffer or a cached parse.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::NotFound`], [`LoadError::Io`] or
    /// [`LoadError::InvalidUtf8`] when the file cannot be read.
    pub fn load(&self, path: &Path) -> Result<Arc<SourceFile>, LoadError> {
        if let Some(file) = self.peek(path) {
            return Ok(file);
        }
        let bytes = self.fs.read(path).map_err(|e| {
            LoadError::from_fs(e, &path.display().to_string(), vec![path.to_path_buf()])
        })?;
        self.cache.insert_bytes(path, bytes)
    }

    /// The memoized search result for `import` written in `importer`, or
    /// `None` when answering requires filesystem access.
    #[must_use]
    pub fn locate_cached(
        &self,
        importer: &Path,
        import: &str,
    ) -> Option<Result<PathBuf, LoadError>> {
        let key = locate_key(importer, import);
        if let Some(result) = self.located.read().get(&key) {
            return Some(result.clone());
        }
        let candidates = self.search.read().candidates(importer, import);
        let overlays = self.overlays.read();
        // Only an overlay hit on the first candidate is certain without IO:
        // a later overlay could still be preceded by a file on disk.
        candidates
            .first()
            .filter(|first| overlays.contains_key(*first))
            .map(|first| Ok(first.clone()))
    }

    /// Find the file `import` refers to when written in `importer`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::NotFound`] listing every candidate when none
    /// exists.
    pub fn locate(&self, importer: &Path, import: &str) -> Result<PathBuf, LoadError> {
        let key = locate_key(importer, import);
        if let Some(result) = self.located.read().get(&key) {
            return result.clone();
        }

        let candidates = self.search.read().candidates(importer, import);
        let found = {
            let overlays = self.overlays.read();
            candidates
                .iter()
                .find(|c| overlays.contains_key(*c) || self.fs.exists(c))
                .cloned()
        };
        let result = found.ok_or_else(|| LoadError::NotFound {
            import: import.to_string(),
            searched: candidates,
        });
        self.located.write().insert(key, result.clone());
        result
    }

    /// Resolve every import of the document at `path`, loading targets and
    /// their transitive imports from the filesystem as needed. Records the
    /// document's edges in the import graph.
    pub fn resolve_document(&self, path: &Path, parse: &Parse) -> DocumentImports {
        let sites = import_sites(&parse.syntax_node());
        let located: Vec<Option<Result<PathBuf, LoadError>>> = sites
            .iter()
            .map(|site| {
                let result = self.locate(path, &site.path);
                if site.kind == ImportKind::Code {
                    if let Ok(target) = &result {
                        self.load_closure(target);
                    }
                }
                Some(result)
            })
            .collect();
        self.classify(path, sites, located, true)
    }

    /// Like [`Loader::resolve_document`] but never touches the filesystem;
    /// imports that are not answerable from memory are `Pending`.
    pub fn resolve_document_cached(&self, path: &Path, parse: &Parse) -> DocumentImports {
        let sites = import_sites(&parse.syntax_node());
        let located = sites
            .iter()
            .map(|site| self.locate_cached(path, &site.path))
            .collect();
        self.classify(path, sites, located, false)
    }

    /// Every document that imports `path` directly or indirectly.
    #[must_use]
    pub fn importers_of(&self, path: &Path) -> Vec<PathBuf> {
        let graph = self.graph.read();
        let Some(id) = graph.id(path) else {
            return Vec::new();
        };
        graph
            .transitive_importers(id)
            .into_iter()
            .filter(|&i| i != id)
            .map(|i| graph.path(i).to_path_buf())
            .collect()
    }

    fn classify(
        &self,
        path: &Path,
        sites: Vec<ImportSite>,
        located: Vec<Option<Result<PathBuf, LoadError>>>,
        allow_io: bool,
    ) -> DocumentImports {
        let id = self.doc_id(path);

        let mut edges = Vec::new();
        for (site, result) in sites.iter().zip(&located) {
            if site.kind != ImportKind::Code {
                continue;
            }
            if let Some(result) = result {
                let target = result.as_ref().ok().map(|p| self.doc_id(p));
                edges.push(ImportEdge {
                    range: site.range,
                    target,
                });
            }
        }
        let edges_changed = self.graph.write().set_edges(id, edges);
        if allow_io {
            self.fresh.write().insert(id);
        }

        let imports = sites
            .into_iter()
            .zip(located)
            .map(|(site, result)| {
                let status = match result {
                    None => ImportStatus::Pending,
                    Some(Err(e)) => ImportStatus::Unresolved(e),
                    Some(Ok(target)) => self.status_of(id, &site, target, allow_io),
                };
                ImportResolution { site, status }
            })
            .collect();

        DocumentImports {
            id,
            imports,
            edges_changed,
        }
    }

    fn status_of(
        &self,
        id: DocId,
        site: &ImportSite,
        target: PathBuf,
        allow_io: bool,
    ) -> ImportStatus {
        if site.kind != ImportKind::Code {
            return ImportStatus::Resolved(ResolvedImport {
                kind: site.kind,
                path: target,
                file: None,
            });
        }

        let target_id = self.doc_id(&target);
        {
            let graph = self.graph.read();
            if let Some(cycle) = graph.find_cycle(id, target_id) {
                return ImportStatus::Unresolved(LoadError::CyclicImport {
                    cycle: cycle.into_iter().map(|d| graph.path(d).to_path_buf()).collect(),
                });
            }
        }

        let file = if allow_io {
            self.load(&target)
        } else {
            match self.peek(&target) {
                Some(file) => Ok(file),
                None => return ImportStatus::Pending,
            }
        };
        match file {
            Ok(file) => ImportStatus::Resolved(ResolvedImport {
                kind: site.kind,
                path: target,
                file: Some(file),
            }),
            Err(e) => ImportStatus::Unresolved(e),
        }
    }

    /// Load `root` and everything it imports, recording their edges.
    fn load_closure(&self, root: &Path) {
        let mut visited: HashSet<PathBuf> = HashSet::from([root.to_path_buf()]);
        let mut queue = VecDeque::from([root.to_path_buf()]);

        while let Some(path) = queue.pop_front() {
            let id = self.doc_id(&path);
            if self.fresh.read().contains(&id) {
                let graph = self.graph.read();
                for target in graph.imports(id).iter().filter_map(|e| e.target) {
                    let target = graph.path(target).to_path_buf();
                    if visited.len() < MAX_CLOSURE && visited.insert(target.clone()) {
                        queue.push_back(target);
                    }
                }
                continue;
            }

            let Ok(file) = self.load(&path) else {
                self.graph.write().set_edges(id, Vec::new());
                continue;
            };
            let mut edges = Vec::new();
            for site in import_sites(&file.parse.syntax_node()) {
                if site.kind != ImportKind::Code {
                    continue;
                }
                let target = self.locate(&path, &site.path).ok();
                if let Some(target) = &target {
                    if visited.len() < MAX_CLOSURE && visited.insert(target.clone()) {
                        queue.push_back(target.clone());
                    }
                }
                edges.push(ImportEdge {
                    range: site.range,
                    target: target.map(|t| self.doc_id(&t)),
                });
            }
            self.graph.write().set_edges(id, edges);
            self.fresh.write().insert(id);
        }

        if visited.len() >= MAX_CLOSURE {
            tracing::warn!(
                root = %root.display(),
                "import closure truncated at {MAX_CLOSURE} files"
            );
        }
    }

    fn forget_searches(&self) {
        self.located.write().clear();
        self.fresh.write().clear();
    }
}

fn locate_key(importer: &Path, import: &str) -> LocateKey {
    let dir = importer.parent().map(Path::to_path_buf).unwrap_or_default();
    (dir, import.to_string())
}
