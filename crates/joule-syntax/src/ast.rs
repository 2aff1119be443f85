//! Typed views over the untyped syntax tree.
//!
//! Every wrapper is a thin newtype around a [`SyntaxNode`] of one kind.
//! Accessors return `None` for parts that are missing in malformed code.

use crate::{SyntaxKind, SyntaxNode, SyntaxToken, TextRange};

/// A typed view of a syntax node.
pub trait AstNode: Sized {
    /// Wrap `syntax` if it has the right kind.
    fn cast(syntax: SyntaxNode) -> Option<Self>;
    /// The underlying node.
    fn syntax(&self) -> &SyntaxNode;

    /// Range of the node in the document.
    fn range(&self) -> TextRange {
        self.syntax().text_range()
    }
}

macro_rules! ast_node {
    ($($(#[$meta:meta])* $name:ident => $kind:ident,)*) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            syntax: SyntaxNode,
        }

        impl AstNode for $name {
            fn cast(syntax: SyntaxNode) -> Option<Self> {
                (syntax.kind() == SyntaxKind::$kind).then_some(Self { syntax })
            }

            fn syntax(&self) -> &SyntaxNode {
                &self.syntax
            }
        }
    )*};
}

ast_node! {
    /// The document root.
    SourceFile => SOURCE_FILE,
    /// `null`, `true`, `false`, a number or a string.
    Literal => LITERAL,
    /// A reference to a variable.
    VarRef => VAR_REF,
    /// `self`.
    SelfExpr => SELF_EXPR,
    /// `super`.
    SuperExpr => SUPER_EXPR,
    /// `$`.
    DollarExpr => DOLLAR_EXPR,
    /// `( expr )`.
    ParenExpr => PAREN_EXPR,
    /// `[a, b, c]`.
    Array => ARRAY,
    /// `[expr for x in xs]`.
    ArrayComp => ARRAY_COMP,
    /// `{ members }`.
    Object => OBJECT,
    /// `{ [k]: v for k in ks }`.
    ObjectComp => OBJECT_COMP,
    /// An object field.
    Field => FIELD,
    /// The name part of a field.
    FieldName => FIELD_NAME,
    /// `local x = e` inside an object.
    ObjLocal => OBJ_LOCAL,
    /// `assert cond : msg` inside an object.
    AssertMember => ASSERT_MEMBER,
    /// `for x in xs`.
    ForSpec => FOR_SPEC,
    /// `if cond` inside a comprehension.
    IfSpec => IF_SPEC,
    /// `local a = 1, b = 2; body`.
    LocalExpr => LOCAL_EXPR,
    /// One binding of a `local`.
    Bind => BIND,
    /// `(a, b = 1)`.
    ParamList => PARAM_LIST,
    /// One parameter.
    Param => PARAM,
    /// `function(params) body`.
    FunctionExpr => FUNCTION_EXPR,
    /// `f(args)`.
    CallExpr => CALL_EXPR,
    /// `(args)` of a call.
    ArgList => ARG_LIST,
    /// One argument, positional or named.
    Arg => ARG,
    /// `base.field`.
    FieldAccess => FIELD_ACCESS,
    /// `base[index]` or a slice.
    IndexExpr => INDEX_EXPR,
    /// `base { members }`.
    ObjExtend => OBJ_EXTEND,
    /// `lhs op rhs`.
    BinaryExpr => BINARY_EXPR,
    /// `op operand`.
    UnaryExpr => UNARY_EXPR,
    /// `if c then a else b`.
    IfExpr => IF_EXPR,
    /// `import "path"`, `importstr` or `importbin`.
    ImportExpr => IMPORT_EXPR,
    /// `error expr`.
    ErrorExpr => ERROR_EXPR,
    /// `assert cond : msg; body`.
    AssertExpr => ASSERT_EXPR,
}

/// Any expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Expr {
    Literal(Literal),
    VarRef(VarRef),
    SelfExpr(SelfExpr),
    SuperExpr(SuperExpr),
    Dollar(DollarExpr),
    Paren(ParenExpr),
    Array(Array),
    ArrayComp(ArrayComp),
    Object(Object),
    ObjectComp(ObjectComp),
    Local(LocalExpr),
    Function(FunctionExpr),
    Call(CallExpr),
    FieldAccess(FieldAccess),
    Index(IndexExpr),
    ObjExtend(ObjExtend),
    Binary(BinaryExpr),
    Unary(UnaryExpr),
    If(IfExpr),
    Import(ImportExpr),
    Error(ErrorExpr),
    Assert(AssertExpr),
}

impl AstNode for Expr {
    fn cast(syntax: SyntaxNode) -> Option<Self> {
        Some(match syntax.kind() {
            SyntaxKind::LITERAL => Self::Literal(Literal { syntax }),
            SyntaxKind::VAR_REF => Self::VarRef(VarRef { syntax }),
            SyntaxKind::SELF_EXPR => Self::SelfExpr(SelfExpr { syntax }),
            SyntaxKind::SUPER_EXPR => Self::SuperExpr(SuperExpr { syntax }),
            SyntaxKind::DOLLAR_EXPR => Self::Dollar(DollarExpr { syntax }),
            SyntaxKind::PAREN_EXPR => Self::Paren(ParenExpr { syntax }),
            SyntaxKind::ARRAY => Self::Array(Array { syntax }),
            SyntaxKind::ARRAY_COMP => Self::ArrayComp(ArrayComp { syntax }),
            SyntaxKind::OBJECT => Self::Object(Object { syntax }),
            SyntaxKind::OBJECT_COMP => Self::ObjectComp(ObjectComp { syntax }),
            SyntaxKind::LOCAL_EXPR => Self::Local(LocalExpr { syntax }),
            SyntaxKind::FUNCTION_EXPR => Self::Function(FunctionExpr { syntax }),
            SyntaxKind::CALL_EXPR => Self::Call(CallExpr { syntax }),
            SyntaxKind::FIELD_ACCESS => Self::FieldAccess(FieldAccess { syntax }),
            SyntaxKind::INDEX_EXPR => Self::Index(IndexExpr { syntax }),
            SyntaxKind::OBJ_EXTEND => Self::ObjExtend(ObjExtend { syntax }),
            SyntaxKind::BINARY_EXPR => Self::Binary(BinaryExpr { syntax }),
            SyntaxKind::UNARY_EXPR => Self::Unary(UnaryExpr { syntax }),
            SyntaxKind::IF_EXPR => Self::If(IfExpr { syntax }),
            SyntaxKind::IMPORT_EXPR => Self::Import(ImportExpr { syntax }),
            SyntaxKind::ERROR_EXPR => Self::Error(ErrorExpr { syntax }),
            SyntaxKind::ASSERT_EXPR => Self::Assert(AssertExpr { syntax }),
            _ => return None,
        })
    }

    fn syntax(&self) -> &SyntaxNode {
        match self {
            Self::Literal(n) => n.syntax(),
            Self::VarRef(n) => n.syntax(),
            Self::SelfExpr(n) => n.syntax(),
            Self::SuperExpr(n) => n.syntax(),
            Self::Dollar(n) => n.syntax(),
            Self::Paren(n) => n.syntax(),
            Self::Array(n) => n.syntax(),
            Self::ArrayComp(n) => n.syntax(),
            Self::Object(n) => n.syntax(),
            Self::ObjectComp(n) => n.syntax(),
            Self::Local(n) => n.syntax(),
            Self::Function(n) => n.syntax(),
            Self::Call(n) => n.syntax(),
            Self::FieldAccess(n) => n.syntax(),
            Self::Index(n) => n.syntax(),
            Self::ObjExtend(n) => n.syntax(),
            Self::Binary(n) => n.syntax(),
            Self::Unary(n) => n.syntax(),
            Self::If(n) => n.syntax(),
            Self::Import(n) => n.syntax(),
            Self::Error(n) => n.syntax(),
            Self::Assert(n) => n.syntax(),
        }
    }
}

impl Expr {
    /// Strip any number of enclosing parentheses.
    #[must_use]
    pub fn unparenthesized(self) -> Option<Self> {
        let mut expr = self;
        while let Self::Paren(paren) = expr {
            expr = paren.expr()?;
        }
        Some(expr)
    }
}

/// An object member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Member {
    Field(Field),
    Local(ObjLocal),
    Assert(AssertMember),
}

impl AstNode for Member {
    fn cast(syntax: SyntaxNode) -> Option<Self> {
        Some(match syntax.kind() {
            SyntaxKind::FIELD => Self::Field(Field { syntax }),
            SyntaxKind::OBJ_LOCAL => Self::Local(ObjLocal { syntax }),
            SyntaxKind::ASSERT_MEMBER => Self::Assert(AssertMember { syntax }),
            _ => return None,
        })
    }

    fn syntax(&self) -> &SyntaxNode {
        match self {
            Self::Field(n) => n.syntax(),
            Self::Local(n) => n.syntax(),
            Self::Assert(n) => n.syntax(),
        }
    }
}

/// A comprehension clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum CompSpec {
    For(ForSpec),
    If(IfSpec),
}

impl AstNode for CompSpec {
    fn cast(syntax: SyntaxNode) -> Option<Self> {
        Some(match syntax.kind() {
            SyntaxKind::FOR_SPEC => Self::For(ForSpec { syntax }),
            SyntaxKind::IF_SPEC => Self::If(IfSpec { syntax }),
            _ => return None,
        })
    }

    fn syntax(&self) -> &SyntaxNode {
        match self {
            Self::For(n) => n.syntax(),
            Self::If(n) => n.syntax(),
        }
    }
}

// -------------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------------

fn children<N: AstNode>(parent: &SyntaxNode) -> impl Iterator<Item = N> {
    parent.children().filter_map(N::cast)
}

fn child<N: AstNode>(parent: &SyntaxNode) -> Option<N> {
    children(parent).next()
}

fn nth_expr(parent: &SyntaxNode, n: usize) -> Option<Expr> {
    children(parent).nth(n)
}

/// First direct token of the given kind.
fn token(parent: &SyntaxNode, kind: SyntaxKind) -> Option<SyntaxToken> {
    parent
        .children_with_tokens()
        .filter_map(rowan::NodeOrToken::into_token)
        .find(|t| t.kind() == kind)
}

/// First expression child that comes after a direct token of `kind`.
fn expr_after(parent: &SyntaxNode, kind: SyntaxKind) -> Option<Expr> {
    parent
        .children_with_tokens()
        .skip_while(|e| e.kind() != kind)
        .filter_map(rowan::NodeOrToken::into_node)
        .find_map(Expr::cast)
}

/// First expression child that comes before any direct token of `kind`.
fn expr_before(parent: &SyntaxNode, kind: SyntaxKind) -> Option<Expr> {
    parent
        .children_with_tokens()
        .take_while(|e| e.kind() != kind)
        .filter_map(rowan::NodeOrToken::into_node)
        .find_map(Expr::cast)
}

// -------------------------------------------------------------------------
// Accessors
// -------------------------------------------------------------------------

impl SourceFile {
    /// The document's top-level expression.
    pub fn body(&self) -> Option<Expr> {
        child(&self.syntax)
    }
}

/// What a [`Literal`] denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum LiteralKind {
    Null,
    True,
    False,
    Number,
    String,
}

impl Literal {
    /// The literal token.
    pub fn token(&self) -> Option<SyntaxToken> {
        self.syntax
            .children_with_tokens()
            .filter_map(rowan::NodeOrToken::into_token)
            .find(|t| !t.kind().is_trivia())
    }

    /// Kind of value.
    pub fn kind(&self) -> Option<LiteralKind> {
        Some(match self.token()?.kind() {
            SyntaxKind::NULL_KW => LiteralKind::Null,
            SyntaxKind::TRUE_KW => LiteralKind::True,
            SyntaxKind::FALSE_KW => LiteralKind::False,
            SyntaxKind::NUMBER => LiteralKind::Number,
            _ => LiteralKind::String,
        })
    }

    /// The string value with escapes resolved, for string literals.
    pub fn string_value(&self) -> Option<String> {
        let token = self.token()?;
        unescape_string(token.kind(), token.text())
    }
}

impl VarRef {
    /// The referenced name.
    pub fn name(&self) -> Option<SyntaxToken> {
        token(&self.syntax, SyntaxKind::IDENT)
    }
}

impl ParenExpr {
    /// The parenthesized expression.
    pub fn expr(&self) -> Option<Expr> {
        child(&self.syntax)
    }
}

impl Array {
    /// Elements in order.
    pub fn elements(&self) -> impl Iterator<Item = Expr> {
        children(&self.syntax)
    }
}

impl ArrayComp {
    /// The element expression.
    pub fn element(&self) -> Option<Expr> {
        child(&self.syntax)
    }

    /// `for` and `if` clauses in order.
    pub fn specs(&self) -> impl Iterator<Item = CompSpec> {
        children(&self.syntax)
    }
}

impl Object {
    /// Members in order.
    pub fn members(&self) -> impl Iterator<Item = Member> {
        children(&self.syntax)
    }
}

impl ObjectComp {
    /// Members in order (locals and the computed field).
    pub fn members(&self) -> impl Iterator<Item = Member> {
        children(&self.syntax)
    }

    /// `for` and `if` clauses in order.
    pub fn specs(&self) -> impl Iterator<Item = CompSpec> {
        children(&self.syntax)
    }
}

/// Field visibility selected by `:`, `::` or `:::`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// `:`
    Default,
    /// `::`
    Hidden,
    /// `:::`
    Forced,
}

impl Field {
    /// The field name.
    pub fn name(&self) -> Option<FieldName> {
        child(&self.syntax)
    }

    /// Parameters of a method field.
    pub fn params(&self) -> Option<ParamList> {
        child(&self.syntax)
    }

    /// The field value.
    pub fn value(&self) -> Option<Expr> {
        child(&self.syntax)
    }

    /// True for `+:` fields.
    pub fn is_inherited(&self) -> bool {
        token(&self.syntax, SyntaxKind::PLUS).is_some()
    }

    /// Visibility from the number of colons.
    pub fn visibility(&self) -> Visibility {
        let colons = self
            .syntax
            .children_with_tokens()
            .filter(|e| e.kind() == SyntaxKind::COLON)
            .count();
        match colons {
            2 => Visibility::Hidden,
            3 => Visibility::Forced,
            _ => Visibility::Default,
        }
    }
}

impl FieldName {
    /// The identifier or string token naming the field.
    pub fn token(&self) -> Option<SyntaxToken> {
        self.syntax
            .children_with_tokens()
            .filter_map(rowan::NodeOrToken::into_token)
            .find(|t| t.kind() == SyntaxKind::IDENT || t.kind().is_string())
    }

    /// The expression of a computed `[name]`.
    pub fn computed(&self) -> Option<Expr> {
        child(&self.syntax)
    }

    /// The field name when it is known without evaluation.
    pub fn text(&self) -> Option<String> {
        if let Some(token) = self.token() {
            return match token.kind() {
                SyntaxKind::IDENT => Some(token.text().to_string()),
                kind => unescape_string(kind, token.text()),
            };
        }
        match self.computed()?.unparenthesized()? {
            Expr::Literal(lit) => lit.string_value(),
            _ => None,
        }
    }
}

impl ObjLocal {
    /// The binding.
    pub fn bind(&self) -> Option<Bind> {
        child(&self.syntax)
    }
}

impl AssertMember {
    /// The asserted condition.
    pub fn condition(&self) -> Option<Expr> {
        expr_before(&self.syntax, SyntaxKind::COLON)
    }

    /// The optional message.
    pub fn message(&self) -> Option<Expr> {
        expr_after(&self.syntax, SyntaxKind::COLON)
    }
}

impl ForSpec {
    /// The loop variable.
    pub fn variable(&self) -> Option<SyntaxToken> {
        token(&self.syntax, SyntaxKind::IDENT)
    }

    /// The iterated expression.
    pub fn source(&self) -> Option<Expr> {
        child(&self.syntax)
    }
}

impl IfSpec {
    /// The filter condition.
    pub fn condition(&self) -> Option<Expr> {
        child(&self.syntax)
    }
}

impl LocalExpr {
    /// Bindings in order.
    pub fn binds(&self) -> impl Iterator<Item = Bind> {
        children(&self.syntax)
    }

    /// The expression after `;`.
    pub fn body(&self) -> Option<Expr> {
        child(&self.syntax)
    }
}

impl Bind {
    /// The bound name.
    pub fn name(&self) -> Option<SyntaxToken> {
        token(&self.syntax, SyntaxKind::IDENT)
    }

    /// Parameters when the binding is a function.
    pub fn params(&self) -> Option<ParamList> {
        child(&self.syntax)
    }

    /// The bound value (the body for function bindings).
    pub fn value(&self) -> Option<Expr> {
        child(&self.syntax)
    }
}

impl ParamList {
    /// Parameters in order.
    pub fn params(&self) -> impl Iterator<Item = Param> {
        children(&self.syntax)
    }
}

impl Param {
    /// The parameter name.
    pub fn name(&self) -> Option<SyntaxToken> {
        token(&self.syntax, SyntaxKind::IDENT)
    }

    /// The default value.
    pub fn default_value(&self) -> Option<Expr> {
        child(&self.syntax)
    }
}

impl FunctionExpr {
    /// Parameters.
    pub fn params(&self) -> Option<ParamList> {
        child(&self.syntax)
    }

    /// The function body.
    pub fn body(&self) -> Option<Expr> {
        child(&self.syntax)
    }
}

impl CallExpr {
    /// The called expression.
    pub fn callee(&self) -> Option<Expr> {
        child(&self.syntax)
    }

    /// The argument list.
    pub fn arg_list(&self) -> Option<ArgList> {
        child(&self.syntax)
    }
}

impl ArgList {
    /// Arguments in order.
    pub fn args(&self) -> impl Iterator<Item = Arg> {
        children(&self.syntax)
    }
}

impl Arg {
    /// The parameter name of a named argument.
    pub fn name(&self) -> Option<SyntaxToken> {
        token(&self.syntax, SyntaxKind::EQ)?;
        token(&self.syntax, SyntaxKind::IDENT)
    }

    /// The argument value.
    pub fn value(&self) -> Option<Expr> {
        child(&self.syntax)
    }
}

impl FieldAccess {
    /// The object being accessed.
    pub fn base(&self) -> Option<Expr> {
        child(&self.syntax)
    }

    /// The field name after the dot.
    pub fn field(&self) -> Option<SyntaxToken> {
        token(&self.syntax, SyntaxKind::IDENT)
    }
}

impl IndexExpr {
    /// The indexed expression.
    pub fn base(&self) -> Option<Expr> {
        nth_expr(&self.syntax, 0)
    }

    /// The index, for plain (non-slice) indexing.
    pub fn index(&self) -> Option<Expr> {
        if token(&self.syntax, SyntaxKind::COLON).is_some() {
            return None;
        }
        expr_after(&self.syntax, SyntaxKind::L_BRACK)
    }
}

impl ObjExtend {
    /// The object being extended.
    pub fn base(&self) -> Option<Expr> {
        nth_expr(&self.syntax, 0)
    }

    /// The object literal applied on top.
    pub fn object(&self) -> Option<Expr> {
        nth_expr(&self.syntax, 1)
    }
}

impl BinaryExpr {
    /// Left operand.
    pub fn lhs(&self) -> Option<Expr> {
        nth_expr(&self.syntax, 0)
    }

    /// Right operand.
    pub fn rhs(&self) -> Option<Expr> {
        nth_expr(&self.syntax, 1)
    }

    /// The operator token.
    pub fn op(&self) -> Option<SyntaxToken> {
        self.syntax
            .children_with_tokens()
            .filter_map(rowan::NodeOrToken::into_token)
            .find(|t| !t.kind().is_trivia() && t.kind() != SyntaxKind::ERROR_TOKEN)
    }
}

impl UnaryExpr {
    /// The operator token.
    pub fn op(&self) -> Option<SyntaxToken> {
        self.syntax
            .children_with_tokens()
            .filter_map(rowan::NodeOrToken::into_token)
            .find(|t| !t.kind().is_trivia())
    }

    /// The operand.
    pub fn operand(&self) -> Option<Expr> {
        child(&self.syntax)
    }
}

impl IfExpr {
    /// The condition.
    pub fn condition(&self) -> Option<Expr> {
        expr_before(&self.syntax, SyntaxKind::THEN_KW)
    }

    /// The `then` branch.
    pub fn then_branch(&self) -> Option<Expr> {
        let expr = expr_after(&self.syntax, SyntaxKind::THEN_KW)?;
        let else_start = token(&self.syntax, SyntaxKind::ELSE_KW).map(|t| t.text_range().start());
        match else_start {
            Some(start) if expr.range().start() > start => None,
            _ => Some(expr),
        }
    }

    /// The `else` branch.
    pub fn else_branch(&self) -> Option<Expr> {
        expr_after(&self.syntax, SyntaxKind::ELSE_KW)
    }
}

/// Which import keyword was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportKind {
    /// `import`: the file is Jsonnet code.
    Code,
    /// `importstr`: the file's text.
    Str,
    /// `importbin`: the file's bytes.
    Bin,
}

impl ImportKind {
    /// The keyword.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Code => "import",
            Self::Str => "importstr",
            Self::Bin => "importbin",
        }
    }
}

impl ImportExpr {
    /// The import keyword.
    pub fn kind(&self) -> ImportKind {
        match self.syntax.first_token().map(|t| t.kind()) {
            Some(SyntaxKind::IMPORTSTR_KW) => ImportKind::Str,
            Some(SyntaxKind::IMPORTBIN_KW) => ImportKind::Bin,
            _ => ImportKind::Code,
        }
    }

    /// The path string token.
    pub fn path_token(&self) -> Option<SyntaxToken> {
        self.syntax
            .children_with_tokens()
            .filter_map(rowan::NodeOrToken::into_token)
            .find(|t| t.kind().is_string())
    }

    /// The imported path as written, with escapes resolved.
    pub fn path(&self) -> Option<String> {
        let token = self.path_token()?;
        unescape_string(token.kind(), token.text())
    }
}

impl ErrorExpr {
    /// The error value.
    pub fn value(&self) -> Option<Expr> {
        child(&self.syntax)
    }
}

impl AssertExpr {
    /// The asserted condition.
    pub fn condition(&self) -> Option<Expr> {
        let semi = token(&self.syntax, SyntaxKind::SEMI)?;
        expr_before(&self.syntax, SyntaxKind::COLON)
            .filter(|e| e.range().end() <= semi.text_range().start())
    }

    /// The optional message.
    pub fn message(&self) -> Option<Expr> {
        token(&self.syntax, SyntaxKind::COLON)?;
        let expr = expr_after(&self.syntax, SyntaxKind::COLON)?;
        let semi = token(&self.syntax, SyntaxKind::SEMI);
        match semi {
            Some(semi) if expr.range().start() > semi.text_range().start() => None,
            _ => Some(expr),
        }
    }

    /// The expression after `;`.
    pub fn body(&self) -> Option<Expr> {
        expr_after(&self.syntax, SyntaxKind::SEMI)
    }
}

// -------------------------------------------------------------------------
// Strings and imports
// -------------------------------------------------------------------------

/// Resolve the value of a string token.
///
/// Returns `None` for tokens that are not strings or are unterminated.
#[must_use]
pub fn unescape_string(kind: SyntaxKind, text: &str) -> Option<String> {
    match kind {
        SyntaxKind::STRING => {
            let quote = text.chars().next()?;
            let inner = text.strip_prefix(quote)?.strip_suffix(quote)?;
            Some(unescape_quoted(inner))
        }
        SyntaxKind::VERBATIM_STRING => {
            let quote = text.chars().nth(1)?;
            let inner = text[1..].strip_prefix(quote)?.strip_suffix(quote)?;
            let doubled: String = [quote, quote].iter().collect();
            Some(inner.replace(&doubled, &quote.to_string()))
        }
        SyntaxKind::TEXT_BLOCK => text_block_value(text),
        _ => None,
    }
}

fn unescape_quoted(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => out.push(char::REPLACEMENT_CHARACTER),
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Text block value: the common indentation of the first line is removed
/// from every line.
fn text_block_value(text: &str) -> Option<String> {
    let body = text.strip_prefix("|||")?.strip_suffix("|||")?;
    let body = body.strip_prefix('-').unwrap_or(body);
    let chomp = text.starts_with("|||-");
    let (_, body) = body.split_once('\n')?;
    let mut lines: Vec<&str> = body.split('\n').collect();
    // The terminator line only holds indentation.
    lines.pop();
    let indent: String = lines
        .iter()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| *c == ' ' || *c == '\t').collect())
        .unwrap_or_default();
    let mut out = String::new();
    for line in lines {
        out.push_str(line.strip_prefix(indent.as_str()).unwrap_or_else(|| line.trim_start()));
        out.push('\n');
    }
    if chomp {
        out.pop();
    }
    Some(out)
}

/// An import found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportSite {
    /// Which keyword was used.
    pub kind: ImportKind,
    /// The path as written.
    pub path: String,
    /// Range of the whole import expression.
    pub range: TextRange,
    /// Range of the path string.
    pub path_range: TextRange,
}

/// All imports with a literal path, in document order.
#[must_use]
pub fn import_sites(root: &SyntaxNode) -> Vec<ImportSite> {
    root.descendants()
        .filter_map(ImportExpr::cast)
        .filter_map(|import| {
            let token = import.path_token()?;
            Some(ImportSite {
                kind: import.kind(),
                path: import.path()?,
                range: import.range(),
                path_range: token.text_range(),
            })
        })
        .collect()
}
