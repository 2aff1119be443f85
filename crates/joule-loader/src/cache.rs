//! Content-hash parse cache.
//!
//! Every file that is loaded as an import target is parsed at most once per
//! distinct content. Entries are keyed by path and remember the sha256 of the
//! text they were parsed from, so a refresh with identical bytes reuses the
//! existing tree.
//!
//! Each entry has its own lock. Loads of different files never wait on each
//! other, and two loads of the same file serialize so the file is parsed once.

use joule_syntax::Parse;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::LoadError;

/// A parsed file.
#[derive(Debug)]
pub struct SourceFile {
    /// Path the file was loaded from.
    pub path: PathBuf,
    /// Source text.
    pub text: Arc<str>,
    /// Syntax tree of `text`.
    pub parse: Parse,
    /// sha256 of `text`.
    pub hash: [u8; 32],
}

impl SourceFile {
    /// Parse `text`.
    #[must_use]
    pub fn new(path: PathBuf, text: Arc<str>) -> Self {
        let parse = joule_syntax::parse(&text);
        Self::with_parse(path, text, parse)
    }

    /// Wrap an existing parse of `text`.
    #[must_use]
    pub fn with_parse(path: PathBuf, text: Arc<str>, parse: Parse) -> Self {
        let hash = content_hash(text.as_bytes());
        Self {
            path,
            text,
            parse,
            hash,
        }
    }
}

/// sha256 of a file's contents.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

type Entry = Arc<RwLock<Option<Arc<SourceFile>>>>;

/// Parsed files keyed by `(path, content hash)`.
#[derive(Debug, Default)]
pub struct ParseCache {
    entries: RwLock<HashMap<PathBuf, Entry>>,
    parses: AtomicUsize,
}

impl ParseCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached file at `path`, if any. Never touches the filesystem.
    #[must_use]
    pub fn peek(&self, path: &Path) -> Option<Arc<SourceFile>> {
        let entry = self.entries.read().get(path).cloned()?;
        let file = entry.read().clone();
        file
    }

    /// Store `bytes` as the contents of `path`, parsing them unless the
    /// cached entry already has the same hash.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::InvalidUtf8`] if `bytes` is not UTF-8.
    pub fn insert_bytes(&self, path: &Path, bytes: Vec<u8>) -> Result<Arc<SourceFile>, LoadError> {
        let hash = content_hash(&bytes);
        let entry = self.entry(path);
        let mut slot = entry.write();
        if let Some(existing) = slot.as_ref() {
            if existing.hash == hash {
                return Ok(Arc::clone(existing));
            }
        }

        let text = String::from_utf8(bytes).map_err(|_| LoadError::InvalidUtf8 {
            path: path.to_path_buf(),
        })?;
        tracing::debug!(path = %path.display(), "parsing import target");
        let parse = joule_syntax::parse(&text);
        self.parses.fetch_add(1, Ordering::Relaxed);
        let file = Arc::new(SourceFile {
            path: path.to_path_buf(),
            text: Arc::from(text),
            parse,
            hash,
        });
        *slot = Some(Arc::clone(&file));
        Ok(file)
    }

    /// Drop the entry for `path`. Returns whether one existed.
    pub fn invalidate(&self, path: &Path) -> bool {
        self.entries.write().remove(path).is_some()
    }

    /// Number of cached files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of parses performed since creation.
    #[must_use]
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }

    fn entry(&self, path: &Path) -> Entry {
        if let Some(entry) = self.entries.read().get(path) {
            return Arc::clone(entry);
        }
        Arc::clone(
            self.entries
                .write()
                .entry(path.to_path_buf())
                .or_default(),
        )
    }
}
