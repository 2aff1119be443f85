//! Filesystem capability.
//!
//! All reads of import targets go through [`FileSystem`] so the resolver can
//! run against the real disk or an in-memory tree in tests.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reading a file.
#[derive(Debug, Error)]
pub enum FsError {
    /// The file does not exist.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Any other IO failure.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// The path that failed to read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Read access to files.
pub trait FileSystem: Send + Sync + fmt::Debug {
    /// Read a file's bytes.
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError>;

    /// Whether `path` names an existing regular file.
    fn exists(&self, path: &Path) -> bool;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        std::fs::read(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                FsError::NotFound(path.to_path_buf())
            } else {
                FsError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// An in-memory file tree.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RwLock<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryFileSystem {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a file.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.files.write().insert(path.into(), contents.into());
    }

    /// Delete a file.
    pub fn remove(&self, path: &Path) {
        self.files.write().remove(path);
    }
}

impl FileSystem for MemoryFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>, FsError> {
        self.files
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_path_buf()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }
}
