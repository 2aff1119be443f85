//! Token and node kinds of the Jsonnet syntax tree.

use std::fmt;

macro_rules! syntax_kinds {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        /// Every kind of token and node that can appear in the tree.
        ///
        /// Tokens come first, then the EOF sentinel, then composite nodes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(u16)]
        #[allow(non_camel_case_types, missing_docs)]
        pub enum SyntaxKind {
            $($(#[$meta])* $name),*
        }

        impl SyntaxKind {
            const ALL: &'static [Self] = &[$(Self::$name),*];

            /// Look up a kind by its raw discriminant.
            #[must_use]
            pub fn from_raw(raw: u16) -> Option<Self> {
                Self::ALL.get(usize::from(raw)).copied()
            }
        }
    };
}

syntax_kinds! {
    // Trivia
    WHITESPACE,
    COMMENT,

    // Literals and names
    IDENT,
    NUMBER,
    STRING,
    VERBATIM_STRING,
    TEXT_BLOCK,

    // Keywords
    ASSERT_KW,
    ELSE_KW,
    ERROR_KW,
    FALSE_KW,
    FOR_KW,
    FUNCTION_KW,
    IF_KW,
    IMPORT_KW,
    IMPORTSTR_KW,
    IMPORTBIN_KW,
    IN_KW,
    LOCAL_KW,
    NULL_KW,
    SELF_KW,
    SUPER_KW,
    TAILSTRICT_KW,
    THEN_KW,
    TRUE_KW,

    // Punctuation
    DOLLAR,
    L_BRACE,
    R_BRACE,
    L_BRACK,
    R_BRACK,
    L_PAREN,
    R_PAREN,
    COMMA,
    DOT,
    SEMI,
    COLON,
    EQ,

    // Operators
    PLUS,
    MINUS,
    STAR,
    SLASH,
    PERCENT,
    BANG,
    TILDE,
    LT,
    GT,
    LT_EQ,
    GT_EQ,
    EQ_EQ,
    BANG_EQ,
    AMP,
    AMP_AMP,
    PIPE,
    PIPE_PIPE,
    CARET,
    SHL,
    SHR,

    /// Input the lexer could not recognize.
    ERROR_TOKEN,
    /// End of input. Never stored in a tree.
    EOF,

    // Nodes
    SOURCE_FILE,
    LITERAL,
    VAR_REF,
    SELF_EXPR,
    SUPER_EXPR,
    DOLLAR_EXPR,
    PAREN_EXPR,
    ARRAY,
    ARRAY_COMP,
    OBJECT,
    OBJECT_COMP,
    FIELD,
    FIELD_NAME,
    OBJ_LOCAL,
    ASSERT_MEMBER,
    FOR_SPEC,
    IF_SPEC,
    LOCAL_EXPR,
    BIND,
    PARAM_LIST,
    PARAM,
    FUNCTION_EXPR,
    CALL_EXPR,
    ARG_LIST,
    ARG,
    FIELD_ACCESS,
    INDEX_EXPR,
    OBJ_EXTEND,
    BINARY_EXPR,
    UNARY_EXPR,
    IF_EXPR,
    IMPORT_EXPR,
    ERROR_EXPR,
    ASSERT_EXPR,
    /// Tokens the parser skipped while recovering.
    ERROR,
}

impl SyntaxKind {
    /// Whitespace and comments.
    #[must_use]
    pub const fn is_trivia(self) -> bool {
        matches!(self, Self::WHITESPACE | Self::COMMENT)
    }

    /// Reserved words.
    #[must_use]
    pub const fn is_keyword(self) -> bool {
        (self as u16) >= (Self::ASSERT_KW as u16) && (self as u16) <= (Self::TRUE_KW as u16)
    }

    /// Tokens that denote a string literal.
    #[must_use]
    pub const fn is_string(self) -> bool {
        matches!(self, Self::STRING | Self::VERBATIM_STRING | Self::TEXT_BLOCK)
    }

    /// `{`, `[` and `(`.
    #[must_use]
    pub const fn is_opener(self) -> bool {
        matches!(self, Self::L_BRACE | Self::L_BRACK | Self::L_PAREN)
    }

    /// `}`, `]` and `)`.
    #[must_use]
    pub const fn is_closer(self) -> bool {
        matches!(self, Self::R_BRACE | Self::R_BRACK | Self::R_PAREN)
    }

    /// The closing delimiter matching an opener.
    #[must_use]
    pub const fn closer(self) -> Option<Self> {
        match self {
            Self::L_BRACE => Some(Self::R_BRACE),
            Self::L_BRACK => Some(Self::R_BRACK),
            Self::L_PAREN => Some(Self::R_PAREN),
            _ => None,
        }
    }

    /// Delimited nodes that can be reparsed on their own.
    ///
    /// Each of them starts with an opener and ends with its matching closer,
    /// and is parsed the same way regardless of the surrounding tokens.
    #[must_use]
    pub const fn is_reparsable_block(self) -> bool {
        matches!(
            self,
            Self::OBJECT
                | Self::OBJECT_COMP
                | Self::ARRAY
                | Self::ARRAY_COMP
                | Self::PAREN_EXPR
                | Self::ARG_LIST
                | Self::PARAM_LIST
        )
    }

    /// Human readable description used in error messages.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::WHITESPACE => "whitespace",
            Self::COMMENT => "comment",
            Self::IDENT => "identifier",
            Self::NUMBER => "number",
            Self::STRING | Self::VERBATIM_STRING | Self::TEXT_BLOCK => "string",
            Self::ASSERT_KW => "'assert'",
            Self::ELSE_KW => "'else'",
            Self::ERROR_KW => "'error'",
            Self::FALSE_KW => "'false'",
            Self::FOR_KW => "'for'",
            Self::FUNCTION_KW => "'function'",
            Self::IF_KW => "'if'",
            Self::IMPORT_KW => "'import'",
            Self::IMPORTSTR_KW => "'importstr'",
            Self::IMPORTBIN_KW => "'importbin'",
            Self::IN_KW => "'in'",
            Self::LOCAL_KW => "'local'",
            Self::NULL_KW => "'null'",
            Self::SELF_KW => "'self'",
            Self::SUPER_KW => "'super'",
            Self::TAILSTRICT_KW => "'tailstrict'",
            Self::THEN_KW => "'then'",
            Self::TRUE_KW => "'true'",
            Self::DOLLAR => "'$'",
            Self::L_BRACE => "'{'",
            Self::R_BRACE => "'}'",
            Self::L_BRACK => "'['",
            Self::R_BRACK => "']'",
            Self::L_PAREN => "'('",
            Self::R_PAREN => "')'",
            Self::COMMA => "','",
            Self::DOT => "'.'",
            Self::SEMI => "';'",
            Self::COLON => "':'",
            Self::EQ => "'='",
            Self::PLUS
            | Self::MINUS
            | Self::STAR
            | Self::SLASH
            | Self::PERCENT
            | Self::BANG
            | Self::TILDE
            | Self::LT
            | Self::GT
            | Self::LT_EQ
            | Self::GT_EQ
            | Self::EQ_EQ
            | Self::BANG_EQ
            | Self::AMP
            | Self::AMP_AMP
            | Self::PIPE
            | Self::PIPE_PIPE
            | Self::CARET
            | Self::SHL
            | Self::SHR => "operator",
            Self::ERROR_TOKEN => "invalid token",
            Self::EOF => "end of file",
            _ => "syntax node",
        }
    }
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

impl From<SyntaxKind> for rowan::SyntaxKind {
    fn from(kind: SyntaxKind) -> Self {
        Self(kind as u16)
    }
}

/// Marker type tying rowan's untyped tree to [`SyntaxKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JsonnetLanguage {}

impl rowan::Language for JsonnetLanguage {
    type Kind = SyntaxKind;

    fn kind_from_raw(raw: rowan::SyntaxKind) -> Self::Kind {
        SyntaxKind::from_raw(raw.0).unwrap_or(SyntaxKind::ERROR)
    }

    fn kind_to_raw(kind: Self::Kind) -> rowan::SyntaxKind {
        kind.into()
    }
}

/// A node in the syntax tree, with parent pointers.
pub type SyntaxNode = rowan::SyntaxNode<JsonnetLanguage>;
/// A token (leaf) in the syntax tree.
pub type SyntaxToken = rowan::SyntaxToken<JsonnetLanguage>;
/// Either a node or a token.
pub type SyntaxElement = rowan::SyntaxElement<JsonnetLanguage>;
