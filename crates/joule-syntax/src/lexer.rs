//! Logos-based tokenizer for Jsonnet.
//!
//! The lexer is lossless: every byte of the input ends up in exactly one
//! token, trivia included. Malformed input (unknown characters, unterminated
//! strings and comments) still produces tokens, together with a
//! [`SyntaxError`] describing the problem.

use crate::{SyntaxError, SyntaxKind};
use logos::{Lexer, Logos};
use rowan::{TextRange, TextSize};

/// A token produced by [`tokenize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lexeme {
    /// The token kind.
    pub kind: SyntaxKind,
    /// The byte range of the token in the input.
    pub range: TextRange,
}

impl Lexeme {
    /// The token's text.
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.range]
    }
}

/// Raw tokens recognized by logos.
///
/// `extras` is set by callbacks when a delimited token runs into the end of
/// input before its terminator.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(extras = bool)]
enum RawToken {
    #[regex(r"[ \t\r\n]+")]
    Whitespace,

    #[regex(r"//[^\n]*")]
    #[regex(r"#[^\n]*")]
    #[token("/*", block_comment)]
    Comment,

    #[regex(r"[_a-zA-Z][_a-zA-Z0-9]*")]
    Ident,

    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
    Number,

    #[token("\"", |lex| quoted(lex, b'"'))]
    #[token("'", |lex| quoted(lex, b'\''))]
    String,

    #[token("@\"", |lex| verbatim(lex, b'"'))]
    #[token("@'", |lex| verbatim(lex, b'\''))]
    Verbatim,

    #[token("|||", text_block)]
    TextBlock,

    #[token("assert")]
    Assert,
    #[token("else")]
    Else,
    #[token("error")]
    Error,
    #[token("false")]
    False,
    #[token("for")]
    For,
    #[token("function")]
    Function,
    #[token("if")]
    If,
    #[token("import")]
    Import,
    #[token("importstr")]
    Importstr,
    #[token("importbin")]
    Importbin,
    #[token("in")]
    In,
    #[token("local")]
    Local,
    #[token("null")]
    Null,
    #[token("self")]
    SelfKw,
    #[token("super")]
    Super,
    #[token("tailstrict")]
    Tailstrict,
    #[token("then")]
    Then,
    #[token("true")]
    True,

    #[token("$")]
    Dollar,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBrack,
    #[token("]")]
    RBrack,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("=")]
    Eq,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("&")]
    Amp,
    #[token("&&")]
    AmpAmp,
    #[token("|")]
    Pipe,
    #[token("||")]
    PipePipe,
    #[token("^")]
    Caret,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
}

impl RawToken {
    const fn kind(self) -> SyntaxKind {
        match self {
            Self::Whitespace => SyntaxKind::WHITESPACE,
            Self::Comment => SyntaxKind::COMMENT,
            Self::Ident => SyntaxKind::IDENT,
            Self::Number => SyntaxKind::NUMBER,
            Self::String => SyntaxKind::STRING,
            Self::Verbatim => SyntaxKind::VERBATIM_STRING,
            Self::TextBlock => SyntaxKind::TEXT_BLOCK,
            Self::Assert => SyntaxKind::ASSERT_KW,
            Self::Else => SyntaxKind::ELSE_KW,
            Self::Error => SyntaxKind::ERROR_KW,
            Self::False => SyntaxKind::FALSE_KW,
            Self::For => SyntaxKind::FOR_KW,
            Self::Function => SyntaxKind::FUNCTION_KW,
            Self::If => SyntaxKind::IF_KW,
            Self::Import => SyntaxKind::IMPORT_KW,
            Self::Importstr => SyntaxKind::IMPORTSTR_KW,
            Self::Importbin => SyntaxKind::IMPORTBIN_KW,
            Self::In => SyntaxKind::IN_KW,
            Self::Local => SyntaxKind::LOCAL_KW,
            Self::Null => SyntaxKind::NULL_KW,
            Self::SelfKw => SyntaxKind::SELF_KW,
            Self::Super => SyntaxKind::SUPER_KW,
            Self::Tailstrict => SyntaxKind::TAILSTRICT_KW,
            Self::Then => SyntaxKind::THEN_KW,
            Self::True => SyntaxKind::TRUE_KW,
            Self::Dollar => SyntaxKind::DOLLAR,
            Self::LBrace => SyntaxKind::L_BRACE,
            Self::RBrace => SyntaxKind::R_BRACE,
            Self::LBrack => SyntaxKind::L_BRACK,
            Self::RBrack => SyntaxKind::R_BRACK,
            Self::LParen => SyntaxKind::L_PAREN,
            Self::RParen => SyntaxKind::R_PAREN,
            Self::Comma => SyntaxKind::COMMA,
            Self::Dot => SyntaxKind::DOT,
            Self::Semi => SyntaxKind::SEMI,
            Self::Colon => SyntaxKind::COLON,
            Self::Eq => SyntaxKind::EQ,
            Self::Plus => SyntaxKind::PLUS,
            Self::Minus => SyntaxKind::MINUS,
            Self::Star => SyntaxKind::STAR,
            Self::Slash => SyntaxKind::SLASH,
            Self::Percent => SyntaxKind::PERCENT,
            Self::Bang => SyntaxKind::BANG,
            Self::Tilde => SyntaxKind::TILDE,
            Self::Lt => SyntaxKind::LT,
            Self::Gt => SyntaxKind::GT,
            Self::LtEq => SyntaxKind::LT_EQ,
            Self::GtEq => SyntaxKind::GT_EQ,
            Self::EqEq => SyntaxKind::EQ_EQ,
            Self::BangEq => SyntaxKind::BANG_EQ,
            Self::Amp => SyntaxKind::AMP,
            Self::AmpAmp => SyntaxKind::AMP_AMP,
            Self::Pipe => SyntaxKind::PIPE,
            Self::PipePipe => SyntaxKind::PIPE_PIPE,
            Self::Caret => SyntaxKind::CARET,
            Self::Shl => SyntaxKind::SHL,
            Self::Shr => SyntaxKind::SHR,
        }
    }

    const fn unterminated_message(self) -> &'static str {
        match self {
            Self::Comment => "unterminated block comment",
            Self::TextBlock => "unterminated text block",
            _ => "unterminated string",
        }
    }
}

fn block_comment(lex: &mut Lexer<RawToken>) -> bool {
    let rest = lex.remainder();
    if let Some(end) = rest.find("*/") {
        lex.bump(end + 2);
    } else {
        lex.extras = true;
        lex.bump(rest.len());
    }
    true
}

fn quoted(lex: &mut Lexer<RawToken>, quote: u8) -> bool {
    let bytes = lex.remainder().as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => {
                lex.bump(i + 1);
                return true;
            }
            _ => i += 1,
        }
    }
    lex.extras = true;
    lex.bump(bytes.len());
    true
}

fn verbatim(lex: &mut Lexer<RawToken>, quote: u8) -> bool {
    let bytes = lex.remainder().as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == quote {
            // A doubled quote stands for one literal quote.
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            lex.bump(i + 1);
            return true;
        }
        i += 1;
    }
    lex.extras = true;
    lex.bump(bytes.len());
    true
}

/// A text block ends at the first line consisting of optional indentation
/// followed by `|||`.
fn text_block(lex: &mut Lexer<RawToken>) -> bool {
    let rest = lex.remainder();
    let bytes = rest.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'\n' {
            continue;
        }
        let mut j = i + 1;
        while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\t') {
            j += 1;
        }
        if rest[j..].starts_with("|||") {
            lex.bump(j + 3);
            return true;
        }
    }
    lex.extras = true;
    lex.bump(rest.len());
    true
}

/// Split `source` into tokens.
///
/// Returns the tokens in order (covering the whole input) and the lexical
/// errors found along the way.
pub fn tokenize(source: &str) -> (Vec<Lexeme>, Vec<SyntaxError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut lexer = RawToken::lexer(source);

    loop {
        lexer.extras = false;
        let Some(result) = lexer.next() else { break };
        let span = lexer.span();

        match result {
            Ok(raw) => {
                let range = text_range(span.start, span.end);
                if lexer.extras {
                    errors.push(SyntaxError::new(raw.unterminated_message(), range));
                }
                tokens.push(Lexeme {
                    kind: raw.kind(),
                    range,
                });
            }
            Err(()) => {
                // Never split a multi-byte character between two tokens.
                let mut end = span.end.max(span.start + 1);
                while end < source.len() && !source.is_char_boundary(end) {
                    end += 1;
                }
                if end > span.end {
                    lexer.bump(end - span.end);
                }
                let range = text_range(span.start, end);
                errors.push(SyntaxError::new("unexpected character", range));
                tokens.push(Lexeme {
                    kind: SyntaxKind::ERROR_TOKEN,
                    range,
                });
            }
        }
    }

    (tokens, errors)
}

fn text_range(start: usize, end: usize) -> TextRange {
    TextRange::new(TextSize::from(start as u32), TextSize::from(end as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<SyntaxKind> {
        tokenize(source).0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_tokenize_local_binding() {
        assert_eq!(
            kinds("local x = 1;"),
            vec![
                SyntaxKind::LOCAL_KW,
                SyntaxKind::WHITESPACE,
                SyntaxKind::IDENT,
                SyntaxKind::WHITESPACE,
                SyntaxKind::EQ,
                SyntaxKind::WHITESPACE,
                SyntaxKind::NUMBER,
                SyntaxKind::SEMI,
            ]
        );
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        assert_eq!(kinds("iff"), vec![SyntaxKind::IDENT]);
        assert_eq!(kinds("if"), vec![SyntaxKind::IF_KW]);
        assert_eq!(kinds("importstr"), vec![SyntaxKind::IMPORTSTR_KW]);
    }

    #[test]
    fn test_comments() {
        assert_eq!(kinds("// a\n"), vec![SyntaxKind::COMMENT, SyntaxKind::WHITESPACE]);
        assert_eq!(kinds("# a"), vec![SyntaxKind::COMMENT]);
        assert_eq!(kinds("/* a\n b */x"), vec![SyntaxKind::COMMENT, SyntaxKind::IDENT]);
    }

    #[test]
    fn test_strings() {
        assert_eq!(kinds(r#""a\"b""#), vec![SyntaxKind::STRING]);
        assert_eq!(kinds("'it''s'"), vec![SyntaxKind::STRING, SyntaxKind::STRING]);
        assert_eq!(kinds("@'it''s'"), vec![SyntaxKind::VERBATIM_STRING]);
    }

    #[test]
    fn test_text_block() {
        let source = "|||\n  hello\n  world\n|||";
        let (tokens, errors) = tokenize(source);
        assert!(errors.is_empty());
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, SyntaxKind::TEXT_BLOCK);
        assert_eq!(tokens[0].text(source), source);
    }

    #[test]
    fn test_operators_longest_match() {
        assert_eq!(
            kinds("a<=b&&c"),
            vec![
                SyntaxKind::IDENT,
                SyntaxKind::LT_EQ,
                SyntaxKind::IDENT,
                SyntaxKind::AMP_AMP,
                SyntaxKind::IDENT,
            ]
        );
    }

    #[test]
    fn test_unterminated_string_reports_error() {
        let (tokens, errors) = tokenize("\"abc");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, SyntaxKind::STRING);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "unterminated string");
    }

    #[test]
    fn test_unterminated_block_comment() {
        let (_, errors) = tokenize("/* never closed");
        assert_eq!(errors[0].message, "unterminated block comment");
    }

    #[test]
    fn test_unknown_character_keeps_utf8_boundaries() {
        let source = "a é b";
        let (tokens, errors) = tokenize(source);
        assert_eq!(errors.len(), 1);
        let covered: usize = tokens.iter().map(|t| usize::from(t.range.len())).sum();
        assert_eq!(covered, source.len());
        for token in &tokens {
            let _ = token.text(source);
        }
    }
}
