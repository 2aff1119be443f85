//! Syntax error type.

use rowan::{TextRange, TextSize};

/// A lexical or grammatical error with its location.
///
/// Messages never quote source text, so an error produced by a partial
/// reparse compares equal to the one a full parse would produce.
#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[error("{message}")]
pub struct SyntaxError {
    /// What went wrong.
    pub message: String,
    /// Byte range in the document. Zero-width for missing tokens.
    pub range: TextRange,
}

impl SyntaxError {
    /// Create a new syntax error.
    #[must_use]
    pub fn new(message: impl Into<String>, range: TextRange) -> Self {
        Self {
            message: message.into(),
            range,
        }
    }

    /// The same error moved by `delta` bytes.
    #[must_use]
    pub(crate) fn shifted(mut self, delta: i64) -> Self {
        self.range = shift_range(self.range, delta);
        self
    }
}

/// Move an offset by a signed byte delta.
pub(crate) fn shift_size(size: TextSize, delta: i64) -> TextSize {
    TextSize::from((i64::from(u32::from(size)) + delta).max(0) as u32)
}

/// Move a range by a signed byte delta.
pub(crate) fn shift_range(range: TextRange, delta: i64) -> TextRange {
    TextRange::new(shift_size(range.start(), delta), shift_size(range.end(), delta))
}

/// Order errors by position, keeping insertion order for ties.
pub(crate) fn sort_errors(errors: &mut [SyntaxError]) {
    errors.sort_by_key(|e| (e.range.start(), e.range.end()));
}
