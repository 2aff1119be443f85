//! Folding ranges: multi-line objects, arrays, comprehensions, functions and
//! block comments.

use crate::error::EngineError;
use crate::snapshot::Snapshot;
use joule_syntax::ast::{self, AstNode};
use joule_syntax::{LineIndex, NodeOrToken, SyntaxKind, SyntaxNode, TextRange};
use lsp_types::{FoldingRange, FoldingRangeKind, FoldingRangeParams};
use std::collections::HashSet;

/// Handle a folding range request.
pub fn handle_folding_ranges(
    snap: &Snapshot,
    _params: &FoldingRangeParams,
) -> Result<Option<Vec<FoldingRange>>, EngineError> {
    snap.checkpoint()?;
    let root = snap.doc.parse.syntax_node();
    Ok(Some(folding_ranges(&root, &snap.doc.line_index)))
}

fn is_foldable(node: &SyntaxNode) -> bool {
    match node.kind() {
        SyntaxKind::OBJECT
        | SyntaxKind::OBJECT_COMP
        | SyntaxKind::ARRAY
        | SyntaxKind::ARRAY_COMP
        | SyntaxKind::FUNCTION_EXPR => true,
        SyntaxKind::BIND => ast::Bind::cast(node.clone()).is_some_and(|b| b.params().is_some()),
        SyntaxKind::FIELD => ast::Field::cast(node.clone()).is_some_and(|f| f.params().is_some()),
        _ => false,
    }
}

/// Folds in document order. When several start on one line only the
/// outermost is kept.
fn folding_ranges(root: &SyntaxNode, index: &LineIndex) -> Vec<FoldingRange> {
    let mut starts = HashSet::new();
    let mut out = Vec::new();
    let mut push = |range: TextRange, kind: Option<FoldingRangeKind>| {
        let start = index.line_col(range.start()).line;
        let end = index.line_col(range.end()).line;
        if end > start && starts.insert(start) {
            out.push(FoldingRange {
                start_line: start,
                start_character: None,
                end_line: end,
                end_character: None,
                kind,
                collapsed_text: None,
            });
        }
    };

    for element in root.descendants_with_tokens() {
        match element {
            NodeOrToken::Node(node) if is_foldable(&node) => {
                push(node.text_range(), Some(FoldingRangeKind::Region));
            }
            NodeOrToken::Token(token) if token.kind() == SyntaxKind::COMMENT => {
                push(token.text_range(), Some(FoldingRangeKind::Comment));
            }
            _ => {}
        }
    }
    out.sort_by_key(|f| f.start_line);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folds(text: &str) -> Vec<(u32, u32, Option<FoldingRangeKind>)> {
        let parse = joule_syntax::parse(text);
        folding_ranges(&parse.syntax_node(), &LineIndex::new(text))
            .into_iter()
            .map(|f| (f.start_line, f.end_line, f.kind))
            .collect()
    }

    #[test]
    fn test_multiline_constructs() {
        let text = "{\n  a: [\n    1,\n  ],\n  f(x)::\n    x,\n  b: { c: 1 },\n}";
        assert_eq!(
            folds(text),
            vec![
                (0, 7, Some(FoldingRangeKind::Region)),
                (1, 3, Some(FoldingRangeKind::Region)),
                (4, 5, Some(FoldingRangeKind::Region)),
            ]
        );
    }

    #[test]
    fn test_comprehension_and_function() {
        let text = "local f = function(x)\n  x;\n[\n  v\n  for v in []\n]";
        let found = folds(text);
        assert!(found.contains(&(0, 1, Some(FoldingRangeKind::Region))));
        assert!(found.contains(&(2, 5, Some(FoldingRangeKind::Region))));
    }

    #[test]
    fn test_block_comment() {
        let text = "/* one\n two */\n1";
        assert_eq!(folds(text), vec![(0, 1, Some(FoldingRangeKind::Comment))]);
    }

    #[test]
    fn test_single_line_is_not_folded() {
        assert!(folds("{ a: [1, 2], b: { c: 3 } }").is_empty());
    }
}
