//! Errors of the document engine.

use lsp_server::ErrorCode;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of an edit or a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// An incremental edit was based on a version the store no longer has.
    /// The client has to resend the full text.
    #[error("stale edit for {path}: document is at version {current}, edit is for {found}")]
    StaleVersion {
        /// Document path.
        path: PathBuf,
        /// Version held by the store.
        current: i32,
        /// Version carried by the edit.
        found: i32,
    },

    /// The document changed while a query was being answered.
    #[error("document changed: expected revision {expected}, now at {actual}")]
    VersionMismatch {
        /// Revision the query was computed against.
        expected: u64,
        /// The live revision.
        actual: u64,
    },

    /// The document is not open.
    #[error("unknown document: {0}")]
    UnknownDocument(String),

    /// The client cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// A rename target is not a valid identifier.
    #[error("'{0}' is not a valid identifier")]
    InvalidName(String),
}

impl EngineError {
    /// JSON-RPC error code reported to the client.
    #[must_use]
    pub const fn lsp_code(&self) -> ErrorCode {
        match self {
            Self::VersionMismatch { .. } | Self::StaleVersion { .. } => ErrorCode::ContentModified,
            Self::Cancelled => ErrorCode::RequestCanceled,
            Self::UnknownDocument(_) | Self::InvalidName(_) => ErrorCode::InvalidParams,
        }
    }

    /// Convert into an error response for request `id`.
    #[must_use]
    pub fn into_response(self, id: lsp_server::RequestId) -> lsp_server::Response {
        lsp_server::Response::new_err(id, self.lsp_code() as i32, self.to_string())
    }
}
