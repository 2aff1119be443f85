//! Virtual file system for open documents.
//!
//! The VFS is the syntax store: it owns the text of every open document,
//! applies the editor's edits to it and keeps the syntax tree current through
//! incremental reparsing. Every commit is published as an immutable
//! [`DocumentSnapshot`] stamped with a store-wide revision; scopes are built
//! from it lazily, the first time someone asks, or carried over from the
//! previous commit when only whitespace and comments changed.

use crate::error::EngineError;
use joule_analysis::{Builtins, ScopeTree};
use joule_syntax::{
    LineIndex, NodeOrToken, Parse, SourceParser, TextEdit, TextRange, TextSize,
};
use lsp_types::{Position, TextDocumentContentChangeEvent, Uri};
use ropey::Rope;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Revision stored in a closed document's live cell. Commits are numbered
/// from 1.
const CLOSED: u64 = 0;

/// One committed version of a document.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    /// Document URI.
    pub uri: Uri,
    /// Path on disk.
    pub path: PathBuf,
    /// Version given by the editor. Only echoed back to it.
    pub version: i32,
    /// Commit number, unique across the store. A full-text resync gets a
    /// new one even when the editor repeats its version.
    pub revision: u64,
    /// Full text.
    pub text: Arc<str>,
    /// Syntax tree of `text`.
    pub parse: Parse,
    /// Position conversion for `text`.
    pub line_index: Arc<LineIndex>,
    scopes: Arc<OnceLock<Arc<ScopeTree>>>,
}

impl DocumentSnapshot {
    /// Snapshot of `text` at `version`, as a first commit.
    pub fn new(uri: Uri, path: PathBuf, version: i32, text: Arc<str>, parse: Parse) -> Self {
        let line_index = Arc::new(LineIndex::new(&text));
        Self {
            uri,
            path,
            version,
            revision: 1,
            text,
            parse,
            line_index,
            scopes: Arc::new(OnceLock::new()),
        }
    }

    fn at_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    fn with_scopes(mut self, scopes: ScopeTree) -> Self {
        self.scopes = Arc::new(OnceLock::from(Arc::new(scopes)));
        self
    }

    /// Scopes of this version, built on first use and shared by every clone
    /// of the snapshot.
    pub fn scopes(&self, builtins: &Builtins) -> Arc<ScopeTree> {
        Arc::clone(
            self.scopes
                .get_or_init(|| Arc::new(ScopeTree::build(&self.parse, self.version, builtins))),
        )
    }

    /// Whether scopes were already built.
    pub fn has_scopes(&self) -> bool {
        self.scopes.get().is_some()
    }
}

/// A document in the virtual file system.
#[derive(Debug)]
pub struct Document {
    /// The document content as a rope for efficient editing.
    content: Rope,
    /// The latest commit.
    current: DocumentSnapshot,
    /// The live revision, read by in-flight requests.
    live: Arc<AtomicU64>,
}

impl Document {
    fn new(current: DocumentSnapshot) -> Self {
        Self {
            content: Rope::from_str(&current.text),
            live: Arc::new(AtomicU64::new(current.revision)),
            current,
        }
    }

    /// The editor's version of the document.
    pub const fn version(&self) -> i32 {
        self.current.version
    }

    /// The revision of the latest commit.
    pub const fn revision(&self) -> u64 {
        self.current.revision
    }

    /// The latest committed snapshot.
    pub const fn snapshot(&self) -> &DocumentSnapshot {
        &self.current
    }

    /// Shared cell holding the live revision.
    pub fn live_revision(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.live)
    }

    fn commit(&mut self, current: DocumentSnapshot) {
        self.live.store(current.revision, Ordering::SeqCst);
        self.current = current;
    }
}

/// Virtual file system for managing open documents.
pub struct Vfs {
    parser: Arc<dyn SourceParser>,
    /// Open documents indexed by path.
    documents: HashMap<PathBuf, Document>,
    /// Last revision handed out.
    revision: u64,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("documents", &self.documents)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

impl Vfs {
    /// Create an empty VFS parsing with `parser`.
    pub fn new(parser: Arc<dyn SourceParser>) -> Self {
        Self {
            parser,
            documents: HashMap::new(),
            revision: CLOSED,
        }
    }

    /// Open a document, replacing any earlier state under the same path.
    pub fn open(&mut self, uri: Uri, path: PathBuf, text: &str, version: i32) -> DocumentSnapshot {
        let parse = self.parser.parse(text);
        self.revision += 1;
        let snapshot = DocumentSnapshot::new(uri, path.clone(), version, Arc::from(text), parse)
            .at_revision(self.revision);
        if let Some(old) = self.documents.remove(&path) {
            old.live.store(CLOSED, Ordering::SeqCst);
        }
        self.documents.insert(path, Document::new(snapshot.clone()));
        snapshot
    }

    /// Close a document. Returns whether it was open.
    pub fn close(&mut self, path: &Path) -> bool {
        match self.documents.remove(path) {
            Some(doc) => {
                doc.live.store(CLOSED, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Get a document by path.
    pub fn get(&self, path: &Path) -> Option<&Document> {
        self.documents.get(path)
    }

    /// The latest snapshot of a document.
    pub fn snapshot(&self, path: &Path) -> Option<DocumentSnapshot> {
        self.documents.get(path).map(|d| d.current.clone())
    }

    /// The version of a document.
    pub fn version(&self, path: &Path) -> Option<i32> {
        self.documents.get(path).map(Document::version)
    }

    /// Whether a document is open.
    pub fn contains(&self, path: &Path) -> bool {
        self.documents.contains_key(path)
    }

    /// Get all open document paths.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.documents.keys()
    }

    /// Apply the editor's changes and commit `version` under a new revision.
    ///
    /// Ranged changes must move the document forward: a version not newer
    /// than the stored one fails with [`EngineError::StaleVersion`] and leaves
    /// the document untouched. A change without a range replaces the whole
    /// text and is always accepted.
    pub fn apply_changes(
        &mut self,
        path: &Path,
        version: i32,
        changes: &[TextDocumentContentChangeEvent],
    ) -> Result<DocumentSnapshot, EngineError> {
        let doc = self
            .documents
            .get_mut(path)
            .ok_or_else(|| EngineError::UnknownDocument(path.display().to_string()))?;

        let resync = changes.iter().any(|c| c.range.is_none());
        if !resync && version <= doc.version() {
            return Err(EngineError::StaleVersion {
                path: path.to_path_buf(),
                current: doc.version(),
                found: version,
            });
        }

        let mut edits = Vec::with_capacity(changes.len());
        for change in changes {
            let (start, end) = match change.range {
                Some(range) => {
                    let start = char_index(&doc.content, range.start);
                    let end = char_index(&doc.content, range.end).max(start);
                    (start, end)
                }
                None => (0, doc.content.len_chars()),
            };
            let byte_range = TextRange::new(
                TextSize::from(doc.content.char_to_byte(start) as u32),
                TextSize::from(doc.content.char_to_byte(end) as u32),
            );
            doc.content.remove(start..end);
            doc.content.insert(start, &change.text);
            edits.push(TextEdit::new(byte_range, change.text.clone()));
        }

        let text: Arc<str> = Arc::from(doc.content.to_string());
        let parse = self.parser.reparse(&doc.current.parse, &edits, &text);
        self.revision += 1;
        let mut snapshot = DocumentSnapshot::new(
            doc.current.uri.clone(),
            path.to_path_buf(),
            version,
            text,
            parse,
        )
        .at_revision(self.revision);

        let old = &doc.current;
        let carried = old
            .scopes
            .get()
            .filter(|_| edits.iter().all(|e| touches_only_trivia(&old.parse, e.range)))
            .and_then(|scopes| scopes.carried_over(&old.parse, &snapshot.parse, version));
        let carried_scopes = carried.is_some();
        if let Some(scopes) = carried {
            snapshot = snapshot.with_scopes(scopes);
        }
        tracing::debug!(
            path = %path.display(),
            version,
            revision = snapshot.revision,
            edits = edits.len(),
            carried_scopes,
            "document updated"
        );
        doc.commit(snapshot.clone());
        Ok(snapshot)
    }
}

/// Whether `range` falls inside whitespace or a comment of `parse`. Only
/// decides whether carrying scopes over is worth trying.
fn touches_only_trivia(parse: &Parse, range: TextRange) -> bool {
    let root = parse.syntax_node();
    if !root.text_range().contains_range(range) {
        return false;
    }
    match root.covering_element(range) {
        NodeOrToken::Token(token) => token.kind().is_trivia(),
        NodeOrToken::Node(_) => false,
    }
}

/// Character index of an LSP position, clamped to the document and to the
/// end of its line.
fn char_index(rope: &Rope, pos: Position) -> usize {
    let line = pos.line as usize;
    if line >= rope.len_lines() {
        return rope.len_chars();
    }
    let line_start = rope.line_to_char(line);
    let slice = rope.line(line);
    let mut content_len = slice.len_chars();
    while content_len > 0 && matches!(slice.char(content_len - 1), '\n' | '\r') {
        content_len -= 1;
    }
    let content = slice.slice(..content_len);
    let col = (pos.character as usize).min(content.len_utf16_cu());
    line_start + content.utf16_cu_to_char(col)
}
