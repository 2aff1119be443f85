//! Lexical scopes and symbols.
//!
//! A [`ScopeTree`] is built from one version of one document. Scopes live in
//! an arena and point at their parent; symbols record where they were
//! declared and over which spans they are visible, so a name can be looked up
//! at any offset without re-walking the syntax tree.
//!
//! Scope kinds and what they hold:
//!
//! - `Builtin`: the names every document sees (`std`)
//! - `Document`: locals of a `local` chain at the top of the file
//! - `Local`: a `local` expression; a chain `local a = 1; local b = 2; ...`
//!   shares one scope
//! - `Function`: parameters of a function, method field or function bind
//! - `Object`: object locals, plus the object's fixed fields in a separate
//!   table that name lookup never consults
//! - `Comprehension`: `for` variables of an array or object comprehension

use joule_syntax::ast::{
    self, AstNode, CompSpec, Expr, ImportKind, LiteralKind, Member, ParamList,
};
use joule_syntax::{Parse, SyntaxKind, SyntaxNode, SyntaxToken, TextRange, TextSize};
use std::collections::HashSet;
use std::fmt;

use crate::builtins::Builtins;

/// Handle of a scope in a [`ScopeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(u32);

/// Handle of a symbol in a [`ScopeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(u32);

/// What introduced a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ScopeKind {
    Builtin,
    Document,
    Local,
    Function,
    Object,
    Comprehension,
}

/// A lexical scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// What introduced the scope.
    pub kind: ScopeKind,
    /// The enclosing scope.
    pub parent: Option<ScopeId>,
    /// The syntax the scope covers.
    pub range: TextRange,
    symbols: Vec<SymbolId>,
    fields: Vec<SymbolId>,
}

impl Scope {
    /// Bindings in declaration order.
    #[must_use]
    pub fn symbols(&self) -> &[SymbolId] {
        &self.symbols
    }

    /// Fixed fields of an object scope, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[SymbolId] {
        &self.fields
    }
}

/// What kind of declaration a symbol is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    /// `local x = ...`
    Local,
    /// An object field.
    Field,
    /// A function parameter.
    Parameter,
    /// `local x = import '...'`
    ImportAlias,
    /// A name provided by the runtime.
    Builtin,
    /// A comprehension variable.
    ForVariable,
}

impl SymbolKind {
    /// Human readable name.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Field => "field",
            Self::Parameter => "parameter",
            Self::ImportAlias => "import",
            Self::Builtin => "builtin",
            Self::ForVariable => "for variable",
        }
    }
}

/// What can be said about a declared value without evaluating it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueDesc {
    /// A number literal, as written.
    Number(String),
    /// A string literal with escapes resolved.
    String(String),
    /// `true` or `false`.
    Boolean(bool),
    /// `null`.
    Null,
    /// An object; `fields` are its fixed field names.
    Object {
        /// Fixed field names in order.
        fields: Vec<String>,
    },
    /// An array; `len` is known for literals.
    Array {
        /// Number of elements of an array literal.
        len: Option<usize>,
    },
    /// A function.
    Function {
        /// Parameter names.
        params: Vec<String>,
    },
    /// An import expression.
    Import {
        /// Which keyword was used.
        kind: ImportKind,
        /// The path as written.
        path: String,
    },
    /// Anything else.
    Unknown,
}

impl ValueDesc {
    /// Describe an expression.
    #[must_use]
    pub fn of(expr: &Expr) -> Self {
        match expr {
            Expr::Paren(paren) => paren.expr().map_or(Self::Unknown, |e| Self::of(&e)),
            Expr::Literal(lit) => match lit.kind() {
                Some(LiteralKind::Null) => Self::Null,
                Some(LiteralKind::True) => Self::Boolean(true),
                Some(LiteralKind::False) => Self::Boolean(false),
                Some(LiteralKind::Number) => lit
                    .token()
                    .map_or(Self::Unknown, |t| Self::Number(t.text().to_string())),
                Some(LiteralKind::String) => lit.string_value().map_or(Self::Unknown, Self::String),
                None => Self::Unknown,
            },
            Expr::Unary(unary) => {
                let negated = unary.op().is_some_and(|op| op.kind() == SyntaxKind::MINUS);
                match unary.operand().map(|e| Self::of(&e)) {
                    Some(Self::Number(n)) if negated => Self::Number(format!("-{n}")),
                    _ => Self::Unknown,
                }
            }
            Expr::Object(obj) => Self::Object {
                fields: obj
                    .members()
                    .filter_map(|m| match m {
                        Member::Field(f) => f.name()?.text(),
                        _ => None,
                    })
                    .collect(),
            },
            Expr::ObjectComp(_) => Self::Object { fields: Vec::new() },
            Expr::Array(array) => Self::Array {
                len: Some(array.elements().count()),
            },
            Expr::ArrayComp(_) => Self::Array { len: None },
            Expr::Function(func) => Self::function(func.params().as_ref()),
            Expr::Import(import) => import.path().map_or(Self::Unknown, |path| Self::Import {
                kind: import.kind(),
                path,
            }),
            _ => Self::Unknown,
        }
    }

    fn function(params: Option<&ParamList>) -> Self {
        Self::Function {
            params: params
                .into_iter()
                .flat_map(ParamList::params)
                .filter_map(|p| Some(p.name()?.text().to_string()))
                .collect(),
        }
    }

    /// Short structural label, or `None` when nothing is known.
    #[must_use]
    pub fn label(&self) -> Option<String> {
        Some(match self {
            Self::Number(_) => "number".to_string(),
            Self::String(_) => "string".to_string(),
            Self::Boolean(_) => "boolean".to_string(),
            Self::Null => "null".to_string(),
            Self::Object { .. } => "object".to_string(),
            Self::Array { .. } => "array".to_string(),
            Self::Function { params } => format!("function({})", params.join(", ")),
            Self::Import { kind, path } => format!("{} \"{path}\"", kind.keyword()),
            Self::Unknown => return None,
        })
    }
}

impl fmt::Display for ValueDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Null => write!(f, "null"),
            Self::Object { fields } if fields.is_empty() => write!(f, "{{ }}"),
            Self::Object { fields } => write!(f, "{{ {} }}", fields.join(", ")),
            Self::Array { len: Some(1) } => write!(f, "array of 1 element"),
            Self::Array { len: Some(n) } => write!(f, "array of {n} elements"),
            Self::Array { len: None } => write!(f, "array"),
            Self::Function { params } => write!(f, "function({})", params.join(", ")),
            Self::Import { kind, path } => write!(f, "{} {path:?}", kind.keyword()),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A declared name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// The name.
    pub name: String,
    /// Kind of declaration.
    pub kind: SymbolKind,
    /// The declaring scope.
    pub scope: ScopeId,
    /// Range of the name at the declaration.
    pub range: TextRange,
    /// Range of the whole declaring node (bind, parameter, field, `for`).
    pub decl_range: TextRange,
    /// Range of the declared value (the body for function binds).
    pub value_range: Option<TextRange>,
    /// Spans where the name can be referenced.
    pub visible: Vec<TextRange>,
    /// Static description of the value.
    pub value: ValueDesc,
    /// A later declaration of the same name in the same scope hides this one.
    pub shadowed: bool,
}

impl Symbol {
    /// Whether a reference at `offset` can see this symbol.
    #[must_use]
    pub fn is_visible_at(&self, offset: TextSize) -> bool {
        self.kind == SymbolKind::Builtin
            || self.visible.iter().any(|r| r.contains_inclusive(offset))
    }
}

/// A use of a variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Range of the identifier.
    pub range: TextRange,
    /// The referenced name.
    pub name: String,
    /// Scope the reference appears in.
    pub scope: ScopeId,
    /// What it resolves to.
    pub symbol: Option<SymbolId>,
}

/// A problem with how names are declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingProblem {
    /// Two binds of one `local`, two parameters, or two object locals share
    /// a name.
    Duplicate {
        /// The later declaration.
        symbol: SymbolId,
        /// The earlier one.
        previous: SymbolId,
    },
    /// A `local` redeclares a name from earlier in its chain.
    Shadowed {
        /// The later declaration.
        symbol: SymbolId,
        /// The hidden one.
        previous: SymbolId,
    },
    /// Two fixed fields of one object share a name.
    DuplicateField {
        /// The later field.
        symbol: SymbolId,
        /// The earlier one.
        previous: SymbolId,
    },
}

/// `self`, `super` or `$` used outside of any object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Misplaced {
    /// Range of the keyword.
    pub range: TextRange,
    /// The keyword as written.
    pub keyword: &'static str,
}

/// Scopes, symbols and references of one document version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeTree {
    version: i32,
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
    references: Vec<Reference>,
    problems: Vec<BindingProblem>,
    misplaced: Vec<Misplaced>,
}

impl ScopeTree {
    /// Build the scopes of `parse`, tagging them with `version`.
    #[must_use]
    pub fn build(parse: &Parse, version: i32, builtins: &Builtins) -> Self {
        let mut builder = Builder {
            tree: Self {
                version,
                scopes: Vec::new(),
                symbols: Vec::new(),
                references: Vec::new(),
                problems: Vec::new(),
                misplaced: Vec::new(),
            },
            groups: Vec::new(),
            next_group: 0,
            object_depth: 0,
            depth: 0,
        };
        builder.source_file(&parse.syntax_node(), builtins);
        builder.tree
    }

    /// The document version this tree was built from.
    #[must_use]
    pub const fn version(&self) -> i32 {
        self.version
    }

    /// Whether two trees hold the same scopes, symbols, references and
    /// problems, whatever their versions.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.scopes == other.scopes
            && self.symbols == other.symbols
            && self.references == other.references
            && self.problems == other.problems
            && self.misplaced == other.misplaced
    }

    /// This tree moved onto `new`, given that it was built from `old`.
    ///
    /// Works when the two parses differ only in whitespace and comments, so
    /// every range still starts and ends at the same significant tokens.
    /// Returns `None` when anything else changed, or when trivia appeared
    /// between two tokens that used to touch.
    #[must_use]
    pub fn carried_over(&self, old: &Parse, new: &Parse, version: i32) -> Option<Self> {
        let old_tokens: Vec<SyntaxToken> = significant_tokens(old).collect();
        let new_tokens: Vec<SyntaxToken> = significant_tokens(new).collect();
        if old_tokens.len() != new_tokens.len() {
            return None;
        }

        // Old offset of each token edge, and where it went. `None` marks an
        // old offset that split in two.
        let mut edges: Vec<(TextSize, Option<TextSize>)> =
            Vec::with_capacity(old_tokens.len() * 2);
        for (a, b) in old_tokens.iter().zip(&new_tokens) {
            if a.kind() != b.kind() || a.text() != b.text() {
                return None;
            }
            let (a, b) = (a.text_range(), b.text_range());
            for (from, to) in [(a.start(), b.start()), (a.end(), b.end())] {
                match edges.last_mut() {
                    Some((last, mapped)) if *last == from => {
                        if *mapped != Some(to) {
                            *mapped = None;
                        }
                    }
                    _ => edges.push((from, Some(to))),
                }
            }
        }
        let offset = |at: TextSize| {
            let i = edges.binary_search_by_key(&at, |&(from, _)| from).ok()?;
            edges[i].1
        };
        let map = |range: TextRange| {
            Some(TextRange::new(offset(range.start())?, offset(range.end())?))
        };

        let mut tree = self.clone();
        tree.version = version;
        for scope in &mut tree.scopes {
            scope.range = map(scope.range)?;
        }
        for symbol in tree.symbols.iter_mut().filter(|s| s.kind != SymbolKind::Builtin) {
            symbol.range = map(symbol.range)?;
            symbol.decl_range = map(symbol.decl_range)?;
            symbol.value_range = match symbol.value_range {
                Some(range) => Some(map(range)?),
                None => None,
            };
            for range in &mut symbol.visible {
                *range = map(*range)?;
            }
        }
        for reference in &mut tree.references {
            reference.range = map(reference.range)?;
        }
        for misplaced in &mut tree.misplaced {
            misplaced.range = map(misplaced.range)?;
        }
        Some(tree)
    }

    /// The outermost scope, holding the builtins.
    #[must_use]
    pub const fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// A scope by id.
    #[must_use]
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    /// A symbol by id.
    #[must_use]
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    /// All scopes with their ids, outermost first.
    pub fn scopes(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes
            .iter()
            .enumerate()
            .map(|(i, s)| (ScopeId(i as u32), s))
    }

    /// All symbols with their ids, in declaration order.
    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }

    /// Every variable reference in document order.
    #[must_use]
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// Declaration problems in document order.
    #[must_use]
    pub fn problems(&self) -> &[BindingProblem] {
        &self.problems
    }

    /// Uses of `self`, `super` or `$` outside objects.
    #[must_use]
    pub fn misplaced(&self) -> &[Misplaced] {
        &self.misplaced
    }

    /// `scope` followed by its ancestors.
    pub fn chain(&self, scope: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(scope), |&s| self.scope(s).parent)
    }

    /// Look `name` up from `scope` outward as seen from `at`. Within a scope
    /// the latest visible declaration wins.
    #[must_use]
    pub fn resolve_name(&self, scope: ScopeId, name: &str, at: TextSize) -> Option<SymbolId> {
        self.chain(scope).find_map(|s| {
            self.scope(s).symbols.iter().rev().copied().find(|&id| {
                let symbol = self.symbol(id);
                symbol.name == name && symbol.is_visible_at(at)
            })
        })
    }

    /// The innermost scope covering `offset`.
    #[must_use]
    pub fn scope_at(&self, offset: TextSize) -> ScopeId {
        let mut best = self.root();
        for (id, scope) in self.scopes() {
            // Later scopes are nested at least as deep as earlier ones with
            // the same range.
            if scope.range.contains_inclusive(offset)
                && scope.range.len() <= self.scope(best).range.len()
            {
                best = id;
            }
        }
        best
    }

    /// Symbols visible at `offset`: innermost scope first, builtins last,
    /// declaration order within a scope. Hidden declarations are left out.
    #[must_use]
    pub fn visible_at(&self, offset: TextSize) -> Vec<SymbolId> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = Vec::new();
        for scope in self.chain(self.scope_at(offset)) {
            let visible: Vec<SymbolId> = self
                .scope(scope)
                .symbols
                .iter()
                .copied()
                .filter(|&id| self.symbol(id).is_visible_at(offset))
                .collect();
            for (i, &id) in visible.iter().enumerate() {
                let name = self.symbol(id).name.as_str();
                let hidden = visible[i + 1..]
                    .iter()
                    .any(|&later| self.symbol(later).name == name);
                if !hidden && seen.insert(name) {
                    out.push(id);
                }
            }
        }
        out
    }

    /// The reference whose identifier touches `offset`.
    #[must_use]
    pub fn reference_at(&self, offset: TextSize) -> Option<&Reference> {
        self.references
            .iter()
            .find(|r| r.range.contains_inclusive(offset))
    }

    /// The reference spanning exactly `range`.
    #[must_use]
    pub fn reference(&self, range: TextRange) -> Option<&Reference> {
        self.references.iter().find(|r| r.range == range)
    }

    /// The declaration whose name touches `offset`.
    #[must_use]
    pub fn declaration_at(&self, offset: TextSize) -> Option<SymbolId> {
        self.symbols()
            .find(|(_, s)| s.kind != SymbolKind::Builtin && s.range.contains_inclusive(offset))
            .map(|(id, _)| id)
    }

    /// References resolving to `symbol`, in document order.
    pub fn references_to(&self, symbol: SymbolId) -> impl Iterator<Item = &Reference> {
        self.references
            .iter()
            .filter(move |r| r.symbol == Some(symbol))
    }

    /// The object scope of the object literal spanning `range`.
    #[must_use]
    pub fn object_scope(&self, range: TextRange) -> Option<ScopeId> {
        self.scopes()
            .find(|(_, s)| s.kind == ScopeKind::Object && s.range == range)
            .map(|(id, _)| id)
    }
}

// ============================================================================
// Builder
// ============================================================================

struct Decl {
    name: String,
    kind: SymbolKind,
    range: TextRange,
    decl_range: TextRange,
    value_range: Option<TextRange>,
    visible: Vec<TextRange>,
    value: ValueDesc,
}

fn significant_tokens(parse: &Parse) -> impl Iterator<Item = SyntaxToken> {
    parse
        .syntax_node()
        .descendants_with_tokens()
        .filter_map(|element| element.into_token())
        .filter(|token| !token.kind().is_trivia())
}

/// Nesting past which the walk stops descending.
const MAX_DEPTH: usize = 256;

struct Builder {
    tree: ScopeTree,
    /// Declaration group of each symbol: binds of one `local`, parameters of
    /// one list, or locals of one object.
    groups: Vec<u32>,
    next_group: u32,
    object_depth: usize,
    depth: usize,
}

impl Builder {
    fn source_file(&mut self, root: &SyntaxNode, builtins: &Builtins) {
        let body = ast::SourceFile::cast(root.clone()).and_then(|f| f.body());
        // Leading and trailing trivia belong to no scope.
        let range = body
            .as_ref()
            .map_or_else(|| TextRange::empty(0.into()), AstNode::range);
        let builtin = self.new_scope(ScopeKind::Builtin, None, range);
        for name in builtins.root_names() {
            let empty = TextRange::empty(0.into());
            self.declare(
                builtin,
                Decl {
                    name: name.to_string(),
                    kind: SymbolKind::Builtin,
                    range: empty,
                    decl_range: empty,
                    value_range: None,
                    visible: Vec::new(),
                    value: ValueDesc::Object { fields: Vec::new() },
                },
                u32::MAX,
            );
        }

        let document = self.new_scope(ScopeKind::Document, Some(builtin), range);
        if let Some(body) = body {
            self.expr_in(body, document, true);
        }
    }

    fn new_scope(
        &mut self,
        kind: ScopeKind,
        parent: Option<ScopeId>,
        range: TextRange,
    ) -> ScopeId {
        let id = ScopeId(self.tree.scopes.len() as u32);
        self.tree.scopes.push(Scope {
            kind,
            parent,
            range,
            symbols: Vec::new(),
            fields: Vec::new(),
        });
        id
    }

    fn group(&mut self) -> u32 {
        self.next_group += 1;
        self.next_group
    }

    fn declare(&mut self, scope: ScopeId, decl: Decl, group: u32) -> SymbolId {
        let id = SymbolId(self.tree.symbols.len() as u32);
        let previous = self
            .tree
            .scope(scope)
            .symbols
            .iter()
            .rev()
            .copied()
            .find(|&s| self.tree.symbol(s).name == decl.name);

        if let Some(previous) = previous {
            let problem = if self.groups[previous.0 as usize] == group {
                BindingProblem::Duplicate {
                    symbol: id,
                    previous,
                }
            } else {
                BindingProblem::Shadowed {
                    symbol: id,
                    previous,
                }
            };
            self.tree.problems.push(problem);
            for &s in &self.tree.scopes[scope.0 as usize].symbols {
                if self.tree.symbols[s.0 as usize].name == decl.name {
                    self.tree.symbols[s.0 as usize].shadowed = true;
                }
            }
        }

        self.tree.symbols.push(Symbol {
            name: decl.name,
            kind: decl.kind,
            scope,
            range: decl.range,
            decl_range: decl.decl_range,
            value_range: decl.value_range,
            visible: decl.visible,
            value: decl.value,
            shadowed: false,
        });
        self.groups.push(group);
        self.tree.scopes[scope.0 as usize].symbols.push(id);
        id
    }

    fn declare_field(&mut self, scope: ScopeId, field: &ast::Field) {
        let Some(name_node) = field.name() else {
            return;
        };
        let Some(name) = name_node.text() else {
            return;
        };
        let id = SymbolId(self.tree.symbols.len() as u32);
        let previous = self
            .tree
            .scope(scope)
            .fields
            .iter()
            .copied()
            .find(|&s| self.tree.symbol(s).name == name);
        if let Some(previous) = previous {
            self.tree
                .problems
                .push(BindingProblem::DuplicateField { symbol: id, previous });
        }

        let value = match field.params() {
            Some(params) => ValueDesc::function(Some(&params)),
            None => field.value().map_or(ValueDesc::Unknown, |v| ValueDesc::of(&v)),
        };
        self.tree.symbols.push(Symbol {
            name,
            kind: SymbolKind::Field,
            scope,
            range: name_node.range(),
            decl_range: field.range(),
            value_range: field.value().map(|v| v.range()),
            visible: Vec::new(),
            value,
            shadowed: false,
        });
        self.groups.push(0);
        self.tree.scopes[scope.0 as usize].fields.push(id);
    }

    fn declare_bind(
        &mut self,
        scope: ScopeId,
        bind: &ast::Bind,
        visible: Vec<TextRange>,
        group: u32,
    ) {
        let Some(name) = bind.name() else {
            return;
        };
        let value_expr = bind.value();
        let (kind, value) = match bind.params() {
            Some(params) => (SymbolKind::Local, ValueDesc::function(Some(&params))),
            None => {
                let value = value_expr.as_ref().map_or(ValueDesc::Unknown, ValueDesc::of);
                let kind = if matches!(value, ValueDesc::Import { .. }) {
                    SymbolKind::ImportAlias
                } else {
                    SymbolKind::Local
                };
                (kind, value)
            }
        };
        self.declare(
            scope,
            Decl {
                name: name.text().to_string(),
                kind,
                range: name.text_range(),
                decl_range: bind.range(),
                value_range: value_expr.map(|v| v.range()),
                visible,
                value,
            },
            group,
        );
    }

    fn expr(&mut self, expr: Expr, scope: ScopeId) {
        self.expr_in(expr, scope, false);
    }

    /// Walk `expr`. With `chain`, a `local` reuses `scope` instead of
    /// opening its own.
    ///
    /// Operator and postfix chains nest to the left, so their spine is
    /// followed in a loop. What hangs off it is walked afterwards, in source
    /// order.
    fn expr_in(&mut self, expr: Expr, scope: ScopeId, chain: bool) {
        if self.depth >= MAX_DEPTH {
            return;
        }
        self.depth += 1;
        let mut rest: Vec<Expr> = Vec::new();
        let mut expr = expr;
        let mut chain = chain;
        loop {
            let next = match expr {
                Expr::Binary(binary) => {
                    rest.extend(binary.rhs());
                    binary.lhs()
                }
                Expr::FieldAccess(access) => access.base(),
                Expr::Call(call) => {
                    let args: Vec<Expr> = call
                        .arg_list()
                        .into_iter()
                        .flat_map(|l| l.args())
                        .filter_map(|arg| arg.value())
                        .collect();
                    rest.extend(args.into_iter().rev());
                    call.callee()
                }
                Expr::Index(index) => {
                    // Base, then the index and any slice bounds.
                    let mut parts = index.syntax().children().filter_map(Expr::cast);
                    let base = parts.next();
                    let bounds: Vec<Expr> = parts.collect();
                    rest.extend(bounds.into_iter().rev());
                    base
                }
                Expr::ObjExtend(extend) => {
                    rest.extend(extend.object());
                    extend.base()
                }
                other => {
                    self.expr_node(other, scope, chain);
                    break;
                }
            };
            let Some(next) = next else {
                break;
            };
            expr = next;
            chain = false;
        }
        while let Some(expr) = rest.pop() {
            self.expr(expr, scope);
        }
        self.depth -= 1;
    }

    /// Everything but the chain links [`Builder::expr_in`] unrolls.
    fn expr_node(&mut self, expr: Expr, scope: ScopeId, chain: bool) {
        match expr {
            Expr::Local(local) => self.local(&local, scope, chain),
            Expr::Literal(_) | Expr::Import(_) => {}
            Expr::VarRef(var) => self.reference(&var, scope),
            Expr::SelfExpr(e) => self.object_keyword(e.range(), "self"),
            Expr::SuperExpr(e) => self.object_keyword(e.range(), "super"),
            Expr::Dollar(e) => self.object_keyword(e.range(), "$"),
            Expr::Paren(paren) => self.opt(paren.expr(), scope),
            Expr::Array(array) => {
                for element in array.elements() {
                    self.expr(element, scope);
                }
            }
            Expr::ArrayComp(comp) => {
                let specs: Vec<CompSpec> = comp.specs().collect();
                let cscope = self.comprehension(&specs, comp.range(), scope);
                self.opt(comp.element(), cscope);
                self.specs(&specs, cscope);
            }
            Expr::Object(object) => {
                let oscope = self.new_scope(ScopeKind::Object, Some(scope), object.range());
                let members: Vec<Member> = object.members().collect();
                self.members(&members, oscope, scope, object.range());
            }
            Expr::ObjectComp(comp) => {
                let specs: Vec<CompSpec> = comp.specs().collect();
                let cscope = self.comprehension(&specs, comp.range(), scope);
                let oscope = self.new_scope(ScopeKind::Object, Some(cscope), comp.range());
                let members: Vec<Member> = comp.members().collect();
                self.members(&members, oscope, cscope, head(comp.range(), &specs));
                self.specs(&specs, cscope);
            }
            Expr::Function(func) => {
                self.function(func.params(), func.body(), func.range(), scope);
            }
            Expr::Binary(_)
            | Expr::FieldAccess(_)
            | Expr::Call(_)
            | Expr::Index(_)
            | Expr::ObjExtend(_) => self.expr_in(expr, scope, chain),
            Expr::Unary(unary) => self.opt(unary.operand(), scope),
            Expr::If(if_expr) => {
                self.opt(if_expr.condition(), scope);
                self.opt(if_expr.then_branch(), scope);
                self.opt(if_expr.else_branch(), scope);
            }
            Expr::Error(error) => self.opt(error.value(), scope),
            Expr::Assert(assert) => {
                self.opt(assert.condition(), scope);
                self.opt(assert.message(), scope);
                self.opt(assert.body(), scope);
            }
        }
    }

    fn opt(&mut self, expr: Option<Expr>, scope: ScopeId) {
        if let Some(expr) = expr {
            self.expr(expr, scope);
        }
    }

    fn reference(&mut self, var: &ast::VarRef, scope: ScopeId) {
        let Some(name) = var.name() else {
            return;
        };
        let range = name.text_range();
        let symbol = self.tree.resolve_name(scope, name.text(), range.start());
        self.tree.references.push(Reference {
            range,
            name: name.text().to_string(),
            scope,
            symbol,
        });
    }

    fn object_keyword(&mut self, range: TextRange, keyword: &'static str) {
        if self.object_depth == 0 {
            self.tree.misplaced.push(Misplaced { range, keyword });
        }
    }

    fn local(&mut self, local: &ast::LocalExpr, scope: ScopeId, chain: bool) {
        let scope = if chain {
            scope
        } else {
            self.new_scope(ScopeKind::Local, Some(scope), local.range())
        };
        let group = self.group();
        let binds: Vec<ast::Bind> = local.binds().collect();
        for bind in &binds {
            self.declare_bind(scope, bind, vec![local.range()], group);
        }
        for bind in &binds {
            self.bind_value(bind, scope);
        }
        if let Some(body) = local.body() {
            self.expr_in(body, scope, true);
        }
    }

    fn bind_value(&mut self, bind: &ast::Bind, scope: ScopeId) {
        match bind.params() {
            Some(params) => {
                let range = TextRange::new(params.range().start(), bind.range().end());
                self.function(Some(params), bind.value(), range, scope);
            }
            None => self.opt(bind.value(), scope),
        }
    }

    fn function(
        &mut self,
        params: Option<ParamList>,
        body: Option<Expr>,
        range: TextRange,
        scope: ScopeId,
    ) {
        let fscope = self.new_scope(ScopeKind::Function, Some(scope), range);
        let group = self.group();
        let params: Vec<ast::Param> = params.iter().flat_map(ParamList::params).collect();
        for param in &params {
            let Some(name) = param.name() else {
                continue;
            };
            self.declare(
                fscope,
                Decl {
                    name: name.text().to_string(),
                    kind: SymbolKind::Parameter,
                    range: name.text_range(),
                    decl_range: param.range(),
                    value_range: param.default_value().map(|d| d.range()),
                    visible: vec![range],
                    value: ValueDesc::Unknown,
                },
                group,
            );
        }
        // Defaults may refer to any parameter of the same list.
        for param in &params {
            self.opt(param.default_value(), fscope);
        }
        self.opt(body, fscope);
    }

    /// Members of an object literal or object comprehension. Object locals
    /// are visible over `locals_visible`; computed field names are walked in
    /// `key_scope`.
    fn members(
        &mut self,
        members: &[Member],
        oscope: ScopeId,
        key_scope: ScopeId,
        locals_visible: TextRange,
    ) {
        let group = self.group();
        for member in members {
            match member {
                Member::Local(local) => {
                    if let Some(bind) = local.bind() {
                        self.declare_bind(oscope, &bind, vec![locals_visible], group);
                    }
                }
                Member::Field(field) => self.declare_field(oscope, field),
                Member::Assert(_) => {}
            }
        }

        self.object_depth += 1;
        for member in members {
            match member {
                Member::Local(local) => {
                    if let Some(bind) = local.bind() {
                        self.bind_value(&bind, oscope);
                    }
                }
                Member::Field(field) => {
                    if let Some(computed) = field.name().and_then(|n| n.computed()) {
                        self.expr(computed, key_scope);
                    }
                    match field.params() {
                        Some(params) => {
                            let range = TextRange::new(params.range().start(), field.range().end());
                            self.function(Some(params), field.value(), range, oscope);
                        }
                        None => self.opt(field.value(), oscope),
                    }
                }
                Member::Assert(assert) => {
                    self.opt(assert.condition(), oscope);
                    self.opt(assert.message(), oscope);
                }
            }
        }
        self.object_depth -= 1;
    }

    /// Open a comprehension scope and declare its `for` variables. Each is
    /// visible in the comprehension head and after its own clause.
    fn comprehension(&mut self, specs: &[CompSpec], range: TextRange, scope: ScopeId) -> ScopeId {
        let cscope = self.new_scope(ScopeKind::Comprehension, Some(scope), range);
        let head = head(range, specs);
        for spec in specs {
            let CompSpec::For(for_spec) = spec else {
                continue;
            };
            let Some(variable) = for_spec.variable() else {
                continue;
            };
            let group = self.group();
            self.declare(
                cscope,
                Decl {
                    name: variable.text().to_string(),
                    kind: SymbolKind::ForVariable,
                    range: variable.text_range(),
                    decl_range: for_spec.range(),
                    value_range: for_spec.source().map(|s| s.range()),
                    visible: vec![head, TextRange::new(for_spec.range().end(), range.end())],
                    value: ValueDesc::Unknown,
                },
                group,
            );
        }
        cscope
    }

    fn specs(&mut self, specs: &[CompSpec], cscope: ScopeId) {
        for spec in specs {
            match spec {
                CompSpec::For(for_spec) => self.opt(for_spec.source(), cscope),
                CompSpec::If(if_spec) => self.opt(if_spec.condition(), cscope),
            }
        }
    }
}

/// The part of a comprehension before its first clause.
fn head(range: TextRange, specs: &[CompSpec]) -> TextRange {
    let end = specs.first().map_or(range.end(), |s| s.range().start());
    TextRange::new(range.start(), end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(source: &str) -> ScopeTree {
        ScopeTree::build(&joule_syntax::parse(source), 1, &Builtins::standard())
    }

    fn offset(source: &str, needle: &str) -> TextSize {
        TextSize::from(source.rfind(needle).expect("needle in source") as u32)
    }

    fn resolved_name(tree: &ScopeTree, source: &str, needle: &str) -> Option<TextRange> {
        let reference = tree.reference_at(offset(source, needle))?;
        Some(tree.symbol(reference.symbol?).range)
    }

    #[test]
    fn test_outer_scopes_cover_the_body() {
        let tree = build("  // header\n{ a: 1 } // footer\n");
        let body = TextRange::new(12.into(), 20.into());
        assert_eq!(tree.scope(tree.root()).range, body);
        assert_eq!(tree.scope(ScopeId(1)).range, body);

        let empty = build("// nothing\n");
        assert_eq!(empty.scope(empty.root()).range, TextRange::empty(0.into()));
    }

    #[test]
    fn test_shadowed_local_chain() {
        let source = "local x = 1; local x = 2; x";
        let tree = build(source);
        let document = tree.scope(ScopeId(1));
        assert_eq!(document.kind, ScopeKind::Document);
        assert_eq!(document.symbols().len(), 2);

        let first = tree.symbol(document.symbols()[0]);
        let second = tree.symbol(document.symbols()[1]);
        assert!(first.shadowed);
        assert!(!second.shadowed);
        assert_eq!(resolved_name(&tree, source, "x"), Some(second.range));
        assert!(matches!(tree.problems(), [BindingProblem::Shadowed { .. }]));
    }

    #[test]
    fn test_duplicate_in_one_group() {
        let tree = build("local a = 1, a = 2; a");
        assert!(matches!(tree.problems(), [BindingProblem::Duplicate { .. }]));
    }

    #[test]
    fn test_binds_are_mutually_visible() {
        let source = "local even(n) = if n == 0 then true else odd(n - 1), odd(n) = !even(n); even(4)";
        let tree = build(source);
        assert!(tree.references().iter().all(|r| r.symbol.is_some()));
    }

    #[test]
    fn test_later_chain_link_is_not_visible_earlier() {
        let tree = build("local a = b; local b = 1; a");
        let unresolved: Vec<_> = tree
            .references()
            .iter()
            .filter(|r| r.symbol.is_none())
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(unresolved, vec!["b"]);
    }

    #[test]
    fn test_parameters_and_defaults() {
        let source = "local f(x=y, y) = x + y; f(y=1)";
        let tree = build(source);
        assert!(tree.references().iter().all(|r| r.symbol.is_some()));
        let f = tree.symbol(tree.scope(ScopeId(1)).symbols()[0]);
        assert_eq!(
            f.value,
            ValueDesc::Function {
                params: vec!["x".into(), "y".into()]
            }
        );
    }

    #[test]
    fn test_comprehension_variable_visibility() {
        let source = "[x + y for x in [1] for y in [x]]";
        let tree = build(source);
        assert!(tree.references().iter().all(|r| r.symbol.is_some()));

        // A loop variable is not visible in its own source.
        let tree = build("[x for x in x]");
        let unresolved = tree.references().iter().filter(|r| r.symbol.is_none()).count();
        assert_eq!(unresolved, 1);
    }

    #[test]
    fn test_object_comprehension_scopes() {
        let source = "{ local p = 'k', [p + k]: v for k in ['a'] for v in [k] }";
        let tree = build(source);
        let unresolved: Vec<_> = tree
            .references()
            .iter()
            .filter(|r| r.symbol.is_none())
            .map(|r| r.name.as_str())
            .collect();
        // Object locals are not visible in computed field names.
        assert_eq!(unresolved, vec!["p"]);
    }

    #[test]
    fn test_object_locals_and_fields() {
        let source = "{ local a = 1, b: a, b: 2, 'c d': 3 }";
        let tree = build(source);
        let object = tree
            .scopes()
            .find(|(_, s)| s.kind == ScopeKind::Object)
            .map(|(_, s)| s)
            .unwrap();
        let names: Vec<_> = object
            .fields()
            .iter()
            .map(|&id| tree.symbol(id).name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "b", "c d"]);
        assert!(matches!(tree.problems(), [BindingProblem::DuplicateField { .. }]));
        assert!(tree.references().iter().all(|r| r.symbol.is_some()));
    }

    #[test]
    fn test_misplaced_self() {
        let tree = build("local x = self.a; { b: self.c, d: $.e, f(): super.g }");
        assert_eq!(tree.misplaced().len(), 1);
        assert_eq!(tree.misplaced()[0].keyword, "self");
    }

    #[test]
    fn test_import_alias_kind() {
        let tree = build("local k = import 'k.libsonnet'; k");
        let k = tree.symbol(tree.scope(ScopeId(1)).symbols()[0]);
        assert_eq!(k.kind, SymbolKind::ImportAlias);
        assert_eq!(k.value.label().as_deref(), Some("import \"k.libsonnet\""));
    }

    #[test]
    fn test_std_resolves_to_builtin() {
        let tree = build("std.length([])");
        let symbol = tree.references()[0].symbol.unwrap();
        assert_eq!(tree.symbol(symbol).kind, SymbolKind::Builtin);
    }

    #[test]
    fn test_visible_at_order() {
        let source = "local a = 1; local f(p, q) = local inner = 2; inner; f(1, 2)";
        let tree = build(source);
        let at = offset(source, "inner;") + TextSize::from(5);
        let names: Vec<_> = tree
            .visible_at(at)
            .into_iter()
            .map(|id| tree.symbol(id).name.as_str())
            .collect();
        assert_eq!(names, vec!["inner", "p", "q", "a", "f", "std"]);
    }

    #[test]
    fn test_value_descriptions() {
        let tree = build("local n = -2.5, s = 'hi', o = { a: 1, b:: 2 }, l = [1, 2]; n");
        let values: Vec<_> = tree
            .scope(ScopeId(1))
            .symbols()
            .iter()
            .map(|&id| tree.symbol(id).value.to_string())
            .collect();
        assert_eq!(values, vec!["-2.5", "\"hi\"", "{ a, b }", "array of 2 elements"]);
    }
}
