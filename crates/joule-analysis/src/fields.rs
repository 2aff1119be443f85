//! Static object and field resolution.
//!
//! Jsonnet objects are built by composition (`a + b`, `a { }`) and reached
//! through `self`, `$`, `super`, locals, field chains and imports. Without
//! evaluating anything, [`Resolver`] follows these forms back to the object
//! literals that define the fields of an expression.
//!
//! Every walk carries a visited set and a depth bound, so self-referential
//! or mutually recursive definitions terminate.

use joule_loader::{Loader, SourceFile};
use joule_syntax::ast::{self, AstNode, BinaryExpr, Expr, ImportKind, Member, ParamList};
use joule_syntax::{NodeOrToken, Parse, SyntaxKind, SyntaxNode, TextRange};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use crate::builtins::Builtins;
use crate::scope::{ScopeTree, SymbolKind, ValueDesc};

/// Maximum nesting of one resolution walk.
const MAX_DEPTH: usize = 32;

/// Access to already-loaded import targets.
///
/// Implementations must not touch the filesystem: resolution runs while
/// answering queries.
pub trait ImportLookup {
    /// The parsed target of `import` written in `importer`, if known.
    fn import_target(&self, importer: &Path, import: &str) -> Option<Arc<SourceFile>>;
}

impl ImportLookup for Loader {
    fn import_target(&self, importer: &Path, import: &str) -> Option<Arc<SourceFile>> {
        let path = self.locate_cached(importer, import)?.ok()?;
        self.peek(&path)
    }
}

/// One document as seen by the resolver.
#[derive(Debug)]
pub struct DocModel {
    /// Path of the document.
    pub path: PathBuf,
    /// Root of its syntax tree.
    pub root: SyntaxNode,
    /// Its scopes, built from the same tree.
    pub scopes: Arc<ScopeTree>,
}

impl DocModel {
    /// Bundle a tree with its scopes.
    #[must_use]
    pub const fn new(path: PathBuf, root: SyntaxNode, scopes: Arc<ScopeTree>) -> Self {
        Self { path, root, scopes }
    }

    /// Build the scopes of `parse` and bundle them.
    #[must_use]
    pub fn build(path: PathBuf, parse: &Parse, version: i32, builtins: &Builtins) -> Self {
        let scopes = Arc::new(ScopeTree::build(parse, version, builtins));
        Self::new(path, parse.syntax_node(), scopes)
    }

    /// The top-level expression.
    #[must_use]
    pub fn body(&self) -> Option<Expr> {
        ast::SourceFile::cast(self.root.clone())?.body()
    }

    /// The innermost node spanning exactly `range` that `cast` accepts.
    pub fn node_at<N: AstNode>(&self, range: TextRange) -> Option<N> {
        if !self.root.text_range().contains_range(range) {
            return None;
        }
        let start = match self.root.covering_element(range) {
            NodeOrToken::Node(node) => node,
            NodeOrToken::Token(token) => token.parent()?,
        };
        start
            .ancestors()
            .filter(|n| n.text_range() == range)
            .find_map(N::cast)
    }
}

/// Where the fields of an object come from.
#[derive(Debug, Clone)]
pub enum ObjectSource {
    /// An object literal in some document.
    Literal {
        /// The document holding the literal.
        doc: Rc<DocModel>,
        /// The literal.
        object: ast::Object,
    },
    /// The standard library object.
    Std,
}

/// A field found by static resolution.
#[derive(Debug, Clone)]
pub struct FieldTarget {
    /// The document defining the field.
    pub doc: Rc<DocModel>,
    /// The field name.
    pub name: String,
    /// The defining field.
    pub field: ast::Field,
}

impl FieldTarget {
    /// Range of the field name in its document.
    #[must_use]
    pub fn name_range(&self) -> TextRange {
        self.field
            .name()
            .map_or_else(|| self.field.range(), |n| n.range())
    }
}

/// A function found by static resolution.
#[derive(Debug, Clone)]
pub struct FunctionTarget {
    /// The document defining the function.
    pub doc: Rc<DocModel>,
    /// Its parameters.
    pub params: Option<ParamList>,
    /// Its body.
    pub body: Option<Expr>,
}

impl FunctionTarget {
    /// The parameter called `name`.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<ast::Param> {
        self.params
            .as_ref()?
            .params()
            .find(|p| p.name().is_some_and(|n| n.text() == name))
    }
}

#[derive(Default)]
struct Walk {
    visited: HashSet<(PathBuf, TextRange)>,
}

impl Walk {
    fn enter(&mut self, doc: &DocModel, expr: &Expr, depth: usize) -> bool {
        depth <= MAX_DEPTH && self.visited.insert((doc.path.clone(), expr.range()))
    }
}

/// Resolves objects, fields and functions across documents.
///
/// Short-lived: create one per request. Imported documents get their scopes
/// built on first use and kept for the resolver's lifetime.
pub struct Resolver<'a> {
    builtins: &'a Builtins,
    imports: &'a dyn ImportLookup,
    docs: RefCell<HashMap<PathBuf, Rc<DocModel>>>,
}

impl<'a> Resolver<'a> {
    /// A resolver reading import targets from `imports`.
    #[must_use]
    pub fn new(builtins: &'a Builtins, imports: &'a dyn ImportLookup) -> Self {
        Self {
            builtins,
            imports,
            docs: RefCell::new(HashMap::new()),
        }
    }

    /// The builtin table.
    #[must_use]
    pub const fn builtins(&self) -> &'a Builtins {
        self.builtins
    }

    /// Register `doc`, typically the document a request is about. It is used
    /// in place of the cached parse whenever something imports its path.
    pub fn add_document(&self, doc: DocModel) -> Rc<DocModel> {
        let doc = Rc::new(doc);
        self.docs
            .borrow_mut()
            .insert(doc.path.clone(), Rc::clone(&doc));
        doc
    }

    /// The document `import` refers to when written in `doc`.
    pub fn import_document(&self, doc: &DocModel, import: &str) -> Option<Rc<DocModel>> {
        let file = self.imports.import_target(&doc.path, import)?;
        if let Some(known) = self.docs.borrow().get(&file.path) {
            return Some(Rc::clone(known));
        }
        let model = DocModel::build(file.path.clone(), &file.parse, 0, self.builtins);
        Some(self.add_document(model))
    }

    /// Objects whose fields `expr` statically has, earliest first.
    pub fn objects_of(&self, doc: &Rc<DocModel>, expr: &Expr) -> Vec<ObjectSource> {
        let mut out = Vec::new();
        self.collect(doc, expr, 0, &mut Walk::default(), &mut out);
        out
    }

    /// Whether `expr` is (an alias of) the standard library object.
    pub fn is_std(&self, doc: &Rc<DocModel>, expr: &Expr) -> bool {
        self.objects_of(doc, expr)
            .iter()
            .any(|s| matches!(s, ObjectSource::Std))
    }

    /// Fields of `expr`. A later definition of a name replaces an earlier
    /// one but keeps its position.
    pub fn fields(&self, doc: &Rc<DocModel>, expr: &Expr) -> Vec<FieldTarget> {
        fields_of(&self.objects_of(doc, expr))
    }

    /// The field `name` of `expr`.
    pub fn field(&self, doc: &Rc<DocModel>, expr: &Expr, name: &str) -> Option<FieldTarget> {
        self.fields(doc, expr).into_iter().find(|f| f.name == name)
    }

    /// The function `expr` statically refers to.
    pub fn function_of(&self, doc: &Rc<DocModel>, expr: &Expr) -> Option<FunctionTarget> {
        self.function(doc, expr, 0, &mut Walk::default())
    }

    /// Expression defining the symbol referenced at `range`.
    fn referenced_value(&self, doc: &DocModel, range: TextRange) -> Option<Expr> {
        let symbol = doc.scopes.symbol(doc.scopes.reference(range)?.symbol?);
        match symbol.kind {
            SymbolKind::Local | SymbolKind::ImportAlias | SymbolKind::Field => {
                doc.node_at(symbol.value_range?)
            }
            _ => None,
        }
    }

    fn collect(
        &self,
        doc: &Rc<DocModel>,
        expr: &Expr,
        depth: usize,
        walk: &mut Walk,
        out: &mut Vec<ObjectSource>,
    ) {
        if !walk.enter(doc, expr, depth) {
            return;
        }
        let depth = depth + 1;
        match expr {
            Expr::Paren(paren) => {
                if let Some(inner) = paren.expr() {
                    self.collect(doc, &inner, depth, walk, out);
                }
            }
            Expr::Object(object) => out.push(ObjectSource::Literal {
                doc: Rc::clone(doc),
                object: object.clone(),
            }),
            Expr::ObjExtend(extend) => {
                for part in [extend.base(), extend.object()].into_iter().flatten() {
                    self.collect(doc, &part, depth, walk, out);
                }
            }
            Expr::Binary(binary) if is_plus(binary) => {
                for part in [binary.lhs(), binary.rhs()].into_iter().flatten() {
                    self.collect(doc, &part, depth, walk, out);
                }
            }
            Expr::VarRef(var) => {
                let Some(name) = var.name() else {
                    return;
                };
                let range = name.text_range();
                let symbol = doc
                    .scopes
                    .reference(range)
                    .and_then(|r| r.symbol)
                    .map(|id| doc.scopes.symbol(id));
                match symbol {
                    Some(s) if s.kind == SymbolKind::Builtin => {
                        if self.builtins.is_root(&s.name) {
                            out.push(ObjectSource::Std);
                        }
                    }
                    Some(s) if matches!(s.value, ValueDesc::Function { .. }) => {}
                    _ => {
                        if let Some(value) = self.referenced_value(doc, range) {
                            self.collect(doc, &value, depth, walk, out);
                        }
                    }
                }
            }
            Expr::SelfExpr(this) => {
                if let Some(object) = enclosing_object(this.syntax()) {
                    self.collect_composition(doc, object, depth, walk, out);
                }
            }
            Expr::Dollar(dollar) => {
                let outermost = dollar
                    .syntax()
                    .ancestors()
                    .filter(|n| is_object(n.kind()))
                    .last();
                if let Some(object) = outermost {
                    self.collect_composition(doc, object, depth, walk, out);
                }
            }
            Expr::SuperExpr(sup) => {
                if let Some(object) = enclosing_object(sup.syntax()) {
                    self.collect_super(doc, object, depth, walk, out);
                }
            }
            Expr::FieldAccess(access) => {
                if let (Some(base), Some(name)) = (access.base(), access.field()) {
                    self.collect_field(doc, &base, name.text(), depth, walk, out);
                }
            }
            Expr::Index(index) => {
                if let (Some(base), Some(name)) =
                    (index.base(), index.index().and_then(|i| literal_string(&i)))
                {
                    self.collect_field(doc, &base, &name, depth, walk, out);
                }
            }
            Expr::Call(call) => {
                let Some(callee) = call.callee() else {
                    return;
                };
                if let Some(FunctionTarget {
                    doc: fdoc,
                    body: Some(body),
                    ..
                }) = self.function(doc, &callee, depth, walk)
                {
                    self.collect(&fdoc, &body, depth, walk, out);
                }
            }
            Expr::If(if_expr) => {
                for branch in [if_expr.then_branch(), if_expr.else_branch()].into_iter().flatten() {
                    self.collect(doc, &branch, depth, walk, out);
                }
            }
            Expr::Local(local) => {
                if let Some(body) = local.body() {
                    self.collect(doc, &body, depth, walk, out);
                }
            }
            Expr::Assert(assert) => {
                if let Some(body) = assert.body() {
                    self.collect(doc, &body, depth, walk, out);
                }
            }
            Expr::Import(import) if import.kind() == ImportKind::Code => {
                let target = import.path().and_then(|p| self.import_document(doc, &p));
                if let Some(target) = target {
                    if let Some(body) = target.body() {
                        self.collect(&target, &body, depth, walk, out);
                    }
                }
            }
            _ => {}
        }
    }

    /// Objects of the field `name` of `base`. With `+:` the definitions it
    /// extends are included.
    fn collect_field(
        &self,
        doc: &Rc<DocModel>,
        base: &Expr,
        name: &str,
        depth: usize,
        walk: &mut Walk,
        out: &mut Vec<ObjectSource>,
    ) {
        let mut sources = Vec::new();
        self.collect(doc, base, depth, walk, &mut sources);
        let mut definitions: Vec<FieldTarget> = Vec::new();
        for target in all_fields(&sources).into_iter().rev() {
            if target.name != name {
                continue;
            }
            let inherited = target.field.is_inherited();
            definitions.push(target);
            if !inherited {
                break;
            }
        }
        for target in definitions.into_iter().rev() {
            if let Some(value) = target.field.value() {
                self.collect(&target.doc, &value, depth, walk, out);
            }
        }
    }

    /// The whole `+` / `{ }` composition an object literal takes part in.
    fn collect_composition(
        &self,
        doc: &Rc<DocModel>,
        object: SyntaxNode,
        depth: usize,
        walk: &mut Walk,
        out: &mut Vec<ObjectSource>,
    ) {
        let mut top = object;
        while let Some(parent) = top.parent() {
            let composes = match parent.kind() {
                SyntaxKind::OBJ_EXTEND | SyntaxKind::PAREN_EXPR => true,
                SyntaxKind::BINARY_EXPR => {
                    BinaryExpr::cast(parent.clone()).is_some_and(|b| is_plus(&b))
                }
                _ => false,
            };
            if !composes {
                break;
            }
            top = parent;
        }
        if let Some(expr) = Expr::cast(top) {
            self.collect(doc, &expr, depth, walk, out);
        }
    }

    /// Everything composed to the left of an object literal.
    fn collect_super(
        &self,
        doc: &Rc<DocModel>,
        object: SyntaxNode,
        depth: usize,
        walk: &mut Walk,
        out: &mut Vec<ObjectSource>,
    ) {
        let mut lefts = Vec::new();
        let mut current = object;
        while let Some(parent) = current.parent() {
            match parent.kind() {
                SyntaxKind::PAREN_EXPR => {}
                SyntaxKind::OBJ_EXTEND => {
                    if let Some(extend) = ast::ObjExtend::cast(parent.clone()) {
                        if extend.object().is_some_and(|o| o.range() == current.text_range()) {
                            lefts.extend(extend.base());
                        }
                    }
                }
                SyntaxKind::BINARY_EXPR => match BinaryExpr::cast(parent.clone()) {
                    Some(binary) if is_plus(&binary) => {
                        if binary.rhs().is_some_and(|r| r.range() == current.text_range()) {
                            lefts.extend(binary.lhs());
                        }
                    }
                    _ => break,
                },
                _ => break,
            }
            current = parent;
        }
        // Outer compositions come first in field order.
        for left in lefts.into_iter().rev() {
            self.collect(doc, &left, depth, walk, out);
        }
    }

    fn function(
        &self,
        doc: &Rc<DocModel>,
        expr: &Expr,
        depth: usize,
        walk: &mut Walk,
    ) -> Option<FunctionTarget> {
        if !walk.enter(doc, expr, depth) {
            return None;
        }
        let depth = depth + 1;
        match expr {
            Expr::Paren(paren) => self.function(doc, &paren.expr()?, depth, walk),
            Expr::Function(func) => Some(FunctionTarget {
                doc: Rc::clone(doc),
                params: func.params(),
                body: func.body(),
            }),
            Expr::VarRef(var) => {
                let range = var.name()?.text_range();
                let symbol = doc.scopes.symbol(doc.scopes.reference(range)?.symbol?);
                if symbol.kind == SymbolKind::Local {
                    if let Some(bind) = doc.node_at::<ast::Bind>(symbol.decl_range) {
                        if let Some(params) = bind.params() {
                            return Some(FunctionTarget {
                                doc: Rc::clone(doc),
                                params: Some(params),
                                body: bind.value(),
                            });
                        }
                    }
                }
                let value = self.referenced_value(doc, range)?;
                self.function(doc, &value, depth, walk)
            }
            Expr::FieldAccess(access) => {
                let base = access.base()?;
                let name = access.field()?;
                let mut sources = Vec::new();
                self.collect(doc, &base, depth, walk, &mut sources);
                let target = fields_of(&sources)
                    .into_iter()
                    .find(|f| f.name == name.text())?;
                if let Some(params) = target.field.params() {
                    return Some(FunctionTarget {
                        doc: target.doc,
                        params: Some(params),
                        body: target.field.value(),
                    });
                }
                let value = target.field.value()?;
                self.function(&target.doc, &value, depth, walk)
            }
            Expr::Local(local) => self.function(doc, &local.body()?, depth, walk),
            Expr::Import(import) if import.kind() == ImportKind::Code => {
                let target = self.import_document(doc, &import.path()?)?;
                let body = target.body()?;
                self.function(&target, &body, depth, walk)
            }
            _ => None,
        }
    }
}

/// Fields of every source, in order, duplicates included.
fn all_fields(sources: &[ObjectSource]) -> Vec<FieldTarget> {
    let mut out = Vec::new();
    for source in sources {
        let ObjectSource::Literal { doc, object } = source else {
            continue;
        };
        for member in object.members() {
            let Member::Field(field) = member else {
                continue;
            };
            if let Some(name) = field.name().and_then(|n| n.text()) {
                out.push(FieldTarget {
                    doc: Rc::clone(doc),
                    name,
                    field,
                });
            }
        }
    }
    out
}

/// Fields of `sources`, one per name, the last definition winning.
#[must_use]
pub fn fields_of(sources: &[ObjectSource]) -> Vec<FieldTarget> {
    let mut out: Vec<FieldTarget> = Vec::new();
    for target in all_fields(sources) {
        match out.iter_mut().find(|f| f.name == target.name) {
            Some(existing) => *existing = target,
            None => out.push(target),
        }
    }
    out
}

fn is_plus(binary: &BinaryExpr) -> bool {
    binary.op().is_some_and(|op| op.kind() == SyntaxKind::PLUS)
}

const fn is_object(kind: SyntaxKind) -> bool {
    matches!(kind, SyntaxKind::OBJECT | SyntaxKind::OBJECT_COMP)
}

/// The object whose body contains `node`.
fn enclosing_object(node: &SyntaxNode) -> Option<SyntaxNode> {
    node.ancestors().find(|n| is_object(n.kind()))
}

fn literal_string(expr: &Expr) -> Option<String> {
    match expr.clone().unparenthesized()? {
        Expr::Literal(lit) => lit.string_value(),
        _ => None,
    }
}
