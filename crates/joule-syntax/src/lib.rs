//! Jsonnet parser producing a lossless, error-tolerant syntax tree.
//!
//! This crate turns Jsonnet source text into a rowan green tree that keeps
//! every byte of the input (whitespace and comments included), together with
//! the syntax errors found along the way.
//!
//! # Features
//!
//! - Error recovery: parsing never fails, malformed regions become `ERROR`
//!   nodes and the rest of the document is still structured
//! - Incremental reparsing: an edit rebuilds only the token or delimited
//!   block it touches, sharing the rest of the tree
//! - Typed AST accessors over the untyped tree in [`ast`]
//! - [`LineIndex`] for converting offsets to editor positions
//!
//! # Example
//!
//! ```
//! use joule_syntax::{parse, SyntaxKind};
//!
//! let parse = parse("local x = 1; { a: x }");
//! assert!(parse.errors().is_empty());
//! assert_eq!(parse.syntax_node().kind(), SyntaxKind::SOURCE_FILE);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ast;
mod error;
mod kind;
pub mod lexer;
mod line_index;
mod parser;
mod reparse;

pub use error::SyntaxError;
pub use kind::{JsonnetLanguage, SyntaxElement, SyntaxKind, SyntaxNode, SyntaxToken};
pub use line_index::{LineCol, LineIndex};
pub use reparse::ReparseKind;
pub use rowan::{GreenNode, NodeOrToken, TextRange, TextSize, WalkEvent};

use std::sync::Arc;

/// Result of parsing a document: an immutable tree plus its errors.
///
/// Cheap to clone. The green tree is `Send + Sync`; call
/// [`Parse::syntax_node`] on the thread that walks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parse {
    green: GreenNode,
    errors: Arc<[SyntaxError]>,
}

impl Parse {
    fn new(green: GreenNode, mut errors: Vec<SyntaxError>) -> Self {
        error::sort_errors(&mut errors);
        Self {
            green,
            errors: Arc::from(errors),
        }
    }

    /// The root of the green tree.
    #[must_use]
    pub const fn green(&self) -> &GreenNode {
        &self.green
    }

    /// A cursor over the tree, rooted at `SOURCE_FILE`.
    #[must_use]
    pub fn syntax_node(&self) -> SyntaxNode {
        SyntaxNode::new_root(self.green.clone())
    }

    /// Syntax errors ordered by position.
    #[must_use]
    pub fn errors(&self) -> &[SyntaxError] {
        &self.errors
    }

    /// The source text, rebuilt from the tree.
    #[must_use]
    pub fn text(&self) -> String {
        self.syntax_node().text().to_string()
    }

    /// Apply one edit and parse the result, reusing as much of this tree as
    /// possible. `new_text` is the full document after the edit.
    #[must_use]
    pub fn reparse(&self, edit: &TextEdit, new_text: &str) -> (Self, ReparseKind) {
        reparse::reparse(self, edit, new_text)
    }
}

/// A replacement of a byte range with new text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    /// Range in the text before the edit.
    pub range: TextRange,
    /// Text inserted in place of `range`.
    pub insert: String,
}

impl TextEdit {
    /// Create an edit.
    #[must_use]
    pub fn new(range: TextRange, insert: impl Into<String>) -> Self {
        Self {
            range,
            insert: insert.into(),
        }
    }

    /// Change in document length caused by this edit.
    #[must_use]
    pub fn delta(&self) -> i64 {
        self.insert.len() as i64 - i64::from(u32::from(self.range.len()))
    }

    /// Apply the edit to `text` in place. The range must lie on character
    /// boundaries of `text`.
    pub fn apply(&self, text: &mut String) {
        text.replace_range(std::ops::Range::<usize>::from(self.range), &self.insert);
    }
}

/// Parse a whole document.
#[must_use]
pub fn parse(text: &str) -> Parse {
    let (tokens, lex_errors) = lexer::tokenize(text);
    let mut p = parser::Parser::new(text, &tokens);
    parser::source_file(&mut p);
    let (green, parse_errors) = p.finish();
    let mut errors = lex_errors;
    errors.extend(parse_errors);
    Parse::new(green, errors)
}

/// A parser that can produce and incrementally update syntax trees.
///
/// The document store is written against this trait so the grammar can be
/// swapped in tests.
pub trait SourceParser: Send + Sync {
    /// Parse a whole document.
    fn parse(&self, text: &str) -> Parse;

    /// Apply `edits` in order, starting from `old`. `new_text` is the
    /// document after the last edit. The result must equal
    /// `self.parse(new_text)`.
    fn reparse(&self, old: &Parse, edits: &[TextEdit], new_text: &str) -> Parse;
}

/// The Jsonnet grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonnetParser;

impl SourceParser for JsonnetParser {
    fn parse(&self, text: &str) -> Parse {
        parse(text)
    }

    fn reparse(&self, old: &Parse, edits: &[TextEdit], new_text: &str) -> Parse {
        match edits {
            [edit] => old.reparse(edit, new_text).0,
            _ => {
                // Intermediate texts are rebuilt from the tree so each edit
                // can still be applied incrementally.
                let mut current = old.clone();
                let mut text = old.text();
                for edit in edits {
                    if usize::from(edit.range.end()) > text.len()
                        || !text.is_char_boundary(edit.range.start().into())
                        || !text.is_char_boundary(edit.range.end().into())
                    {
                        return parse(new_text);
                    }
                    edit.apply(&mut text);
                    current = current.reparse(edit, &text).0;
                }
                if text == new_text {
                    current
                } else {
                    parse(new_text)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_lossless() {
        let source = "// header\nlocal x = 1; /* c */ { a: x, b:: [1, 2] }\n";
        assert_eq!(parse(source).text(), source);
    }

    #[test]
    fn test_multiple_edits_match_full_parse() {
        let old_text = "{ a: 1, b: 2 }";
        let old = parse(old_text);
        let edits = [
            TextEdit::new(TextRange::new(5.into(), 6.into()), "10"),
            TextEdit::new(TextRange::new(12.into(), 13.into()), "20"),
        ];
        let new_text = "{ a: 10, b: 20 }";
        let new = JsonnetParser.reparse(&old, &edits, new_text);
        assert_eq!(new, parse(new_text));
    }

    #[test]
    fn test_text_edit_apply() {
        let mut text = String::from("local x = 1; x");
        TextEdit::new(TextRange::new(6.into(), 7.into()), "yy").apply(&mut text);
        assert_eq!(text, "local yy = 1; x");
    }
}
