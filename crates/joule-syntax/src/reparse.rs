//! Incremental reparsing.
//!
//! An edit is first tried as a change inside a single token, then as a
//! change inside the smallest enclosing delimited block. Either way only the
//! affected subtree is rebuilt and the rest of the green tree is shared with
//! the previous version. When neither applies the document is parsed from
//! scratch. In all three cases the result equals a full parse of the new
//! text.

use crate::error::shift_size;
use crate::lexer::{tokenize, Lexeme};
use crate::parser::{self, Parser};
use crate::{Parse, SyntaxError, SyntaxKind, TextEdit};
use crate::SyntaxNode;
use rowan::{GreenToken, NodeOrToken, TextRange};

/// How a reparse was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReparseKind {
    /// A single token was relexed in place.
    Token,
    /// A delimited block of this kind was reparsed on its own.
    Block(SyntaxKind),
    /// The whole document was parsed again.
    Full,
}

pub(crate) fn reparse(old: &Parse, edit: &TextEdit, new_text: &str) -> (Parse, ReparseKind) {
    let old_len = old.green().text_len();
    let expected_len = i64::from(u32::from(old_len)) + edit.delta();
    let fits = edit.range.end() <= old_len && expected_len == new_text.len() as i64;

    if fits {
        if let Some(parse) = reparse_token(old, edit, new_text) {
            return (parse, ReparseKind::Token);
        }
        if let Some((parse, kind)) = reparse_block(old, edit, new_text) {
            return (parse, ReparseKind::Block(kind));
        }
    }
    (crate::parse(new_text), ReparseKind::Full)
}

fn reparse_token(old: &Parse, edit: &TextEdit, new_text: &str) -> Option<Parse> {
    let root = old.syntax_node();
    let NodeOrToken::Token(token) = root.covering_element(edit.range) else {
        return None;
    };
    let kind = token.kind();
    if !matches!(
        kind,
        SyntaxKind::WHITESPACE
            | SyntaxKind::COMMENT
            | SyntaxKind::IDENT
            | SyntaxKind::NUMBER
            | SyntaxKind::STRING
            | SyntaxKind::VERBATIM_STRING
            | SyntaxKind::TEXT_BLOCK
    ) {
        return None;
    }

    // The first and last characters of the token must survive the edit.
    let range = token.text_range();
    if !(range.start() < edit.range.start() && edit.range.end() < range.end()) {
        return None;
    }

    let delta = edit.delta();
    let start = usize::from(range.start());
    let end = usize::from(shift_size(range.end(), delta));
    let text = new_text.get(start..end)?;

    if !lexes_cleanly_as(text, kind) || !lexes_cleanly_as(token.text(), kind) {
        return None;
    }
    if matches!(kind, SyntaxKind::IDENT | SyntaxKind::NUMBER)
        && (joins_word(new_text[..start].chars().next_back())
            || joins_word(new_text[end..].chars().next()))
    {
        return None;
    }

    let green = token.replace_with(GreenToken::new(kind.into(), text));
    let errors = old
        .errors()
        .iter()
        .cloned()
        .map(|mut error| {
            if error.range.start() >= range.end() {
                error.shifted(delta)
            } else {
                if error.range.start() <= range.start() && error.range.end() >= range.end() {
                    error.range =
                        TextRange::new(error.range.start(), shift_size(error.range.end(), delta));
                }
                error
            }
        })
        .collect::<Vec<_>>();
    Some(Parse::new(green, errors))
}

fn reparse_block(old: &Parse, edit: &TextEdit, new_text: &str) -> Option<(Parse, SyntaxKind)> {
    let root = old.syntax_node();
    let covering = match root.covering_element(edit.range) {
        NodeOrToken::Node(node) => node,
        NodeOrToken::Token(token) => token.parent()?,
    };
    let block = covering.ancestors().find(|node| {
        let range = node.text_range();
        node.kind().is_reparsable_block()
            && range.start() < edit.range.start()
            && edit.range.end() < range.end()
    })?;

    // Only blocks that were closed properly are parsed independently of
    // what follows them.
    let opener = block.first_token()?.kind();
    let closer = opener.closer()?;
    if block.last_token()?.kind() != closer {
        return None;
    }

    let range = block.text_range();
    let delta = edit.delta();
    let start = usize::from(range.start());
    let end = usize::from(shift_size(range.end(), delta));
    let text = new_text.get(start..end)?;

    let (tokens, lex_errors) = tokenize(text);
    if !is_single_group(&tokens, opener) {
        return None;
    }

    let mut p = Parser::new(text, &tokens).nested(nesting_bound(&block));
    if !parser::block(&mut p, block.kind()) {
        return None;
    }
    let (green, parse_errors) = p.finish();
    // The bound may overcount, so only a full parse can tell where the limit
    // really hits.
    if parse_errors.iter().any(|e| e.message == parser::TOO_DEEP) {
        return None;
    }
    let new_kind = SyntaxKind::from_raw(green.kind().0)?;

    let offset = i64::from(u32::from(range.start()));
    let mut errors: Vec<SyntaxError> = old
        .errors()
        .iter()
        .filter(|e| e.range.end() <= range.start() || e.range.start() >= range.end())
        .cloned()
        .map(|e| {
            if e.range.start() >= range.end() {
                e.shifted(delta)
            } else {
                e
            }
        })
        .collect();
    errors.extend(
        lex_errors
            .into_iter()
            .chain(parse_errors)
            .map(|e| e.shifted(offset)),
    );

    let green = block.replace_with(green);
    Some((Parse::new(green, errors), new_kind))
}

/// At least the nesting the parser had counted when it entered `block`
/// during a full parse. Operator and postfix links count once per link on
/// their left spine.
fn nesting_bound(block: &SyntaxNode) -> u32 {
    block
        .ancestors()
        .map(|node| {
            let links = std::iter::successors(Some(node), |n| n.first_child())
                .take_while(|n| is_link(n.kind()))
                .count();
            1 + links as u32
        })
        .fold(0, u32::saturating_add)
}

const fn is_link(kind: SyntaxKind) -> bool {
    matches!(
        kind,
        SyntaxKind::BINARY_EXPR
            | SyntaxKind::FIELD_ACCESS
            | SyntaxKind::INDEX_EXPR
            | SyntaxKind::CALL_EXPR
            | SyntaxKind::OBJ_EXTEND
    )
}

fn lexes_cleanly_as(text: &str, kind: SyntaxKind) -> bool {
    let (tokens, errors) = tokenize(text);
    errors.is_empty() && tokens.len() == 1 && tokens[0].kind == kind
}

fn joins_word(c: Option<char>) -> bool {
    c.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// True when `tokens` are one well-nested group opened by `opener` whose
/// matching closer is the final token.
fn is_single_group(tokens: &[Lexeme], opener: SyntaxKind) -> bool {
    let Some(first) = tokens.first() else {
        return false;
    };
    if first.kind != opener {
        return false;
    }
    let mut stack = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if let Some(closer) = token.kind.closer() {
            stack.push(closer);
        } else if token.kind.is_closer() {
            if stack.pop() != Some(token.kind) {
                return false;
            }
            if stack.is_empty() {
                return i + 1 == tokens.len();
            }
        }
    }
    false
}
