//! Recursive-descent parser building a rowan green tree.
//!
//! The parser never fails: unexpected tokens are wrapped in `ERROR` nodes
//! and missing ones are reported as zero-width errors. Delimited blocks are
//! parsed without looking at anything outside their own delimiters, which
//! is what lets [`crate::reparse`] re-run a single block in isolation.

use crate::lexer::Lexeme;
use crate::{SyntaxError, SyntaxKind};
use rowan::{Checkpoint, GreenNode, GreenNodeBuilder, TextRange, TextSize};

use SyntaxKind::{
    AMP, AMP_AMP, ARG, ARG_LIST, ARRAY, ARRAY_COMP, ASSERT_EXPR, ASSERT_KW, ASSERT_MEMBER, BANG,
    BANG_EQ, BINARY_EXPR, BIND, CALL_EXPR, CARET, COLON, COMMA, DOLLAR, DOLLAR_EXPR, DOT, ELSE_KW,
    EOF, EQ, EQ_EQ, ERROR, ERROR_EXPR, ERROR_KW, FALSE_KW, FIELD, FIELD_ACCESS, FIELD_NAME, FOR_KW,
    FOR_SPEC, FUNCTION_EXPR, FUNCTION_KW, GT, GT_EQ, IDENT, IF_EXPR, IF_KW, IF_SPEC, IMPORTBIN_KW,
    IMPORTSTR_KW, IMPORT_EXPR, IMPORT_KW, INDEX_EXPR, IN_KW, LITERAL, LOCAL_EXPR, LOCAL_KW, LT,
    LT_EQ, L_BRACE, L_BRACK, L_PAREN, MINUS, NULL_KW, NUMBER, OBJECT, OBJECT_COMP, OBJ_EXTEND,
    OBJ_LOCAL, PARAM, PARAM_LIST, PAREN_EXPR, PERCENT, PIPE, PIPE_PIPE, PLUS, R_BRACE, R_BRACK,
    R_PAREN, SELF_EXPR, SELF_KW, SEMI, SHL, SHR, SLASH, SOURCE_FILE, STAR, STRING, SUPER_EXPR,
    SUPER_KW, TAILSTRICT_KW, TEXT_BLOCK, THEN_KW, TILDE, TRUE_KW, UNARY_EXPR, VAR_REF,
    VERBATIM_STRING,
};

const UNARY_BP: u8 = 21;

/// Deepest expression nesting the parser descends into. Operator and
/// postfix chains count one level per link, which bounds the depth of the
/// resulting tree.
pub(crate) const MAX_NESTING: u32 = 500;

/// Message of the error reported at [`MAX_NESTING`].
pub(crate) const TOO_DEEP: &str = "expression nested too deeply";

/// Tree-building state over a token slice.
pub(crate) struct Parser<'t> {
    source: &'t str,
    tokens: &'t [Lexeme],
    pos: usize,
    last_end: TextSize,
    builder: GreenNodeBuilder<'static>,
    errors: Vec<SyntaxError>,
    depth: u32,
}

impl<'t> Parser<'t> {
    pub(crate) fn new(source: &'t str, tokens: &'t [Lexeme]) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            last_end: TextSize::from(0),
            builder: GreenNodeBuilder::new(),
            errors: Vec::new(),
            depth: 0,
        }
    }

    /// Start as if `depth` levels of nesting were already open.
    pub(crate) const fn nested(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    /// Finish the tree. Every node must have been closed.
    pub(crate) fn finish(self) -> (GreenNode, Vec<SyntaxError>) {
        (self.builder.finish(), self.errors)
    }

    // ---------------------------------------------------------------------
    // Token access
    // ---------------------------------------------------------------------

    fn nth(&self, n: usize) -> SyntaxKind {
        self.tokens[self.pos..]
            .iter()
            .filter(|t| !t.kind.is_trivia())
            .nth(n)
            .map_or(EOF, |t| t.kind)
    }

    fn current(&self) -> SyntaxKind {
        self.nth(0)
    }

    fn at(&self, kind: SyntaxKind) -> bool {
        self.current() == kind
    }

    /// Start offset of the next significant token, or the end of input.
    fn current_start(&self) -> TextSize {
        self.tokens[self.pos..]
            .iter()
            .find(|t| !t.kind.is_trivia())
            .map_or_else(|| TextSize::of(self.source), |t| t.range.start())
    }

    fn flush_trivia(&mut self) {
        while let Some(token) = self.tokens.get(self.pos) {
            if !token.kind.is_trivia() {
                break;
            }
            self.builder.token(token.kind.into(), token.text(self.source));
            self.pos += 1;
        }
    }

    fn bump(&mut self) {
        self.flush_trivia();
        if let Some(token) = self.tokens.get(self.pos) {
            self.builder.token(token.kind.into(), token.text(self.source));
            self.last_end = token.range.end();
            self.pos += 1;
        }
    }

    fn eat(&mut self, kind: SyntaxKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: SyntaxKind) -> bool {
        if self.eat(kind) {
            return true;
        }
        self.error_here(format!("expected {kind}"));
        false
    }

    // ---------------------------------------------------------------------
    // Nodes
    // ---------------------------------------------------------------------

    fn start_node(&mut self, kind: SyntaxKind) {
        self.flush_trivia();
        self.builder.start_node(kind.into());
    }

    fn checkpoint(&mut self) -> Checkpoint {
        self.flush_trivia();
        self.builder.checkpoint()
    }

    fn start_node_at(&mut self, checkpoint: Checkpoint, kind: SyntaxKind) {
        self.builder.start_node_at(checkpoint, kind.into());
    }

    fn finish_node(&mut self) {
        self.builder.finish_node();
    }

    // ---------------------------------------------------------------------
    // Errors and recovery
    // ---------------------------------------------------------------------

    /// Report an error at the next token. An error identical to the last
    /// one is dropped, so unwinding out of many unclosed groups at the end
    /// of input reports once.
    fn error_here(&mut self, message: impl Into<String>) {
        let error = SyntaxError::new(message, TextRange::empty(self.current_start()));
        if self.errors.last() != Some(&error) {
            self.errors.push(error);
        }
    }

    /// Wrap the rest of an expression that nests past [`MAX_NESTING`] in an
    /// `ERROR` node. Must not be called at `EOF`.
    fn too_deep(&mut self) {
        let start = self.current_start();
        self.start_node(ERROR);
        self.eat_group();
        while !is_recovery(self.current()) {
            self.eat_group();
        }
        self.finish_node();
        self.errors
            .push(SyntaxError::new(TOO_DEEP, TextRange::new(start, self.last_end)));
    }

    /// Wrap the next token (a whole bracketed group for openers) in an
    /// `ERROR` node.
    fn error_skip_group(&mut self, message: impl Into<String>) {
        if self.at(EOF) {
            self.error_here(message);
            return;
        }
        let start = self.current_start();
        self.start_node(ERROR);
        self.eat_group();
        self.finish_node();
        self.errors
            .push(SyntaxError::new(message, TextRange::new(start, self.last_end)));
    }

    /// Consume one token, or a balanced group when it is an opener.
    ///
    /// Stops without consuming at a closer that does not match the
    /// innermost open group, so the enclosing list can claim it.
    fn eat_group(&mut self) {
        let first = self.current();
        self.bump();
        let Some(closer) = first.closer() else {
            return;
        };
        let mut stack = vec![closer];
        while let Some(&expected) = stack.last() {
            let kind = self.current();
            if kind == EOF {
                return;
            }
            if let Some(nested) = kind.closer() {
                stack.push(nested);
            } else if kind.is_closer() {
                if kind != expected {
                    return;
                }
                stack.pop();
            }
            self.bump();
        }
    }

    /// Report a missing expression, consuming the offending token unless it
    /// is something an enclosing construct is waiting for.
    fn missing_expr(&mut self) {
        if is_recovery(self.current()) {
            self.error_here("expected expression");
        } else {
            self.error_skip_group("expected expression");
        }
    }

    /// Skip everything up to `closer`, then consume it.
    fn close(&mut self, closer: SyntaxKind) {
        if self.eat(closer) {
            return;
        }
        if self.at(EOF) {
            self.error_here(format!("expected {closer}"));
            return;
        }
        let start = self.current_start();
        self.start_node(ERROR);
        while !self.at(closer) && !self.at(EOF) {
            self.eat_group();
        }
        self.finish_node();
        self.errors.push(SyntaxError::new(
            format!("expected {closer}"),
            TextRange::new(start, self.last_end),
        ));
        self.eat(closer);
    }
}

/// Tokens that end an expression slot and are never swallowed by one.
const fn is_recovery(kind: SyntaxKind) -> bool {
    matches!(
        kind,
        R_PAREN
            | R_BRACK
            | R_BRACE
            | COMMA
            | SEMI
            | COLON
            | THEN_KW
            | ELSE_KW
            | FOR_KW
            | IN_KW
            | EOF
    )
}

const fn can_start_expr(kind: SyntaxKind) -> bool {
    matches!(
        kind,
        NULL_KW
            | TRUE_KW
            | FALSE_KW
            | NUMBER
            | STRING
            | VERBATIM_STRING
            | TEXT_BLOCK
            | IDENT
            | SELF_KW
            | SUPER_KW
            | DOLLAR
            | L_BRACE
            | L_BRACK
            | L_PAREN
            | IMPORT_KW
            | IMPORTSTR_KW
            | IMPORTBIN_KW
            | LOCAL_KW
            | IF_KW
            | FUNCTION_KW
            | ASSERT_KW
            | ERROR_KW
            | PLUS
            | MINUS
            | BANG
            | TILDE
    )
}

const fn infix_binding_power(kind: SyntaxKind) -> Option<(u8, u8)> {
    Some(match kind {
        PIPE_PIPE => (1, 2),
        AMP_AMP => (3, 4),
        PIPE => (5, 6),
        CARET => (7, 8),
        AMP => (9, 10),
        EQ_EQ | BANG_EQ => (11, 12),
        LT | LT_EQ | GT | GT_EQ | IN_KW => (13, 14),
        SHL | SHR => (15, 16),
        PLUS | MINUS => (17, 18),
        STAR | SLASH | PERCENT => (19, 20),
        _ => return None,
    })
}

// -------------------------------------------------------------------------
// Entry points
// -------------------------------------------------------------------------

/// Parse a whole document.
pub(crate) fn source_file(p: &mut Parser<'_>) {
    // The root has no parent to hold leading trivia, so open it first.
    p.builder.start_node(SOURCE_FILE.into());
    expr_or_error(p);
    if !p.at(EOF) {
        let start = p.current_start();
        p.start_node(ERROR);
        while !p.at(EOF) {
            p.bump();
        }
        p.finish_node();
        p.errors.push(SyntaxError::new(
            "unexpected tokens after end of document",
            TextRange::new(start, p.last_end),
        ));
    }
    p.flush_trivia();
    p.finish_node();
}

/// Parse a standalone block of the given kind. The input must start with
/// the block's opener. Returns `false` for kinds that are not blocks.
pub(crate) fn block(p: &mut Parser<'_>, kind: SyntaxKind) -> bool {
    match kind {
        OBJECT | OBJECT_COMP => object_like(p),
        ARRAY | ARRAY_COMP => array_like(p),
        PAREN_EXPR => paren_expr(p),
        ARG_LIST => arg_list(p),
        PARAM_LIST => param_list(p),
        _ => return false,
    }
    true
}

// -------------------------------------------------------------------------
// Expressions
// -------------------------------------------------------------------------

fn expr_or_error(p: &mut Parser<'_>) {
    if !expr_bp(p, 0) {
        p.missing_expr();
    }
}

/// Parse an expression whose infix operators bind at least `min_bp`.
/// Returns `false` without consuming anything when no expression starts
/// here.
fn expr_bp(p: &mut Parser<'_>, min_bp: u8) -> bool {
    if !can_start_expr(p.current()) {
        return false;
    }
    if p.depth >= MAX_NESTING {
        p.too_deep();
        return true;
    }
    let outer = p.depth;
    p.depth += 1;
    let cp = p.checkpoint();
    prefix_or_postfix(p, cp);

    loop {
        let op = p.current();
        let Some((left, right)) = infix_binding_power(op) else {
            break;
        };
        if left < min_bp {
            break;
        }
        if p.depth >= MAX_NESTING {
            p.too_deep();
            break;
        }
        p.depth += 1;
        p.start_node_at(cp, BINARY_EXPR);
        p.bump();
        if !expr_bp(p, right) {
            p.missing_expr();
        }
        p.finish_node();
    }
    p.depth = outer;
    true
}

fn prefix_or_postfix(p: &mut Parser<'_>, cp: Checkpoint) {
    match p.current() {
        PLUS | MINUS | BANG | TILDE => {
            p.start_node(UNARY_EXPR);
            p.bump();
            if !expr_bp(p, UNARY_BP) {
                p.missing_expr();
            }
            p.finish_node();
        }
        // These extend as far to the right as possible.
        LOCAL_KW => local_expr(p),
        IF_KW => if_expr(p),
        FUNCTION_KW => function_expr(p),
        ASSERT_KW => assert_expr(p),
        ERROR_KW => error_expr(p),
        _ => {
            primary(p);
            postfix(p, cp);
        }
    }
}

fn primary(p: &mut Parser<'_>) {
    match p.current() {
        NULL_KW | TRUE_KW | FALSE_KW | NUMBER | STRING | VERBATIM_STRING | TEXT_BLOCK => {
            leaf(p, LITERAL);
        }
        IDENT => leaf(p, VAR_REF),
        SELF_KW => leaf(p, SELF_EXPR),
        SUPER_KW => leaf(p, SUPER_EXPR),
        DOLLAR => leaf(p, DOLLAR_EXPR),
        L_BRACE => object_like(p),
        L_BRACK => array_like(p),
        L_PAREN => paren_expr(p),
        IMPORT_KW | IMPORTSTR_KW | IMPORTBIN_KW => import_expr(p),
        _ => p.error_skip_group("expected expression"),
    }
}

fn leaf(p: &mut Parser<'_>, kind: SyntaxKind) {
    p.start_node(kind);
    p.bump();
    p.finish_node();
}

/// Links are counted into the nesting of the enclosing [`expr_bp`], which
/// restores it.
fn postfix(p: &mut Parser<'_>, cp: Checkpoint) {
    loop {
        if matches!(p.current(), DOT | L_BRACK | L_PAREN | L_BRACE) {
            if p.depth >= MAX_NESTING {
                p.too_deep();
                break;
            }
            p.depth += 1;
        }
        match p.current() {
            DOT => {
                p.start_node_at(cp, FIELD_ACCESS);
                p.bump();
                if !p.eat(IDENT) {
                    p.error_here("expected field name");
                }
                p.finish_node();
            }
            L_BRACK => {
                p.start_node_at(cp, INDEX_EXPR);
                index_suffix(p);
                p.finish_node();
            }
            L_PAREN => {
                p.start_node_at(cp, CALL_EXPR);
                arg_list(p);
                p.eat(TAILSTRICT_KW);
                p.finish_node();
            }
            L_BRACE => {
                p.start_node_at(cp, OBJ_EXTEND);
                object_like(p);
                p.finish_node();
            }
            _ => break,
        }
    }
}

/// `[index]` or a slice `[start:end:step]` with any part omitted.
fn index_suffix(p: &mut Parser<'_>) {
    p.bump();
    if !p.at(COLON) && !p.at(R_BRACK) {
        expr_or_error(p);
    }
    while p.eat(COLON) {
        if !p.at(COLON) && !p.at(R_BRACK) {
            expr_or_error(p);
        }
    }
    p.close(R_BRACK);
}

fn paren_expr(p: &mut Parser<'_>) {
    p.start_node(PAREN_EXPR);
    p.bump();
    expr_or_error(p);
    p.close(R_PAREN);
    p.finish_node();
}

fn import_expr(p: &mut Parser<'_>) {
    p.start_node(IMPORT_EXPR);
    p.bump();
    if p.current().is_string() {
        p.bump();
    } else {
        p.error_here("expected string literal after import");
    }
    p.finish_node();
}

fn local_expr(p: &mut Parser<'_>) {
    p.start_node(LOCAL_EXPR);
    p.bump();
    loop {
        bind(p);
        if !p.eat(COMMA) {
            break;
        }
    }
    if p.expect(SEMI) || !is_recovery(p.current()) {
        expr_or_error(p);
    }
    p.finish_node();
}

/// `name = value` or `name(params) = body`.
fn bind(p: &mut Parser<'_>) {
    if !p.at(IDENT) {
        p.error_here("expected binding name");
        return;
    }
    p.start_node(BIND);
    p.bump();
    if p.at(L_PAREN) {
        param_list(p);
    }
    if p.expect(EQ) || !is_recovery(p.current()) {
        expr_or_error(p);
    }
    p.finish_node();
}

fn if_expr(p: &mut Parser<'_>) {
    p.start_node(IF_EXPR);
    p.bump();
    expr_or_error(p);
    if p.expect(THEN_KW) || !is_recovery(p.current()) {
        expr_or_error(p);
    }
    if p.eat(ELSE_KW) {
        expr_or_error(p);
    }
    p.finish_node();
}

fn function_expr(p: &mut Parser<'_>) {
    p.start_node(FUNCTION_EXPR);
    p.bump();
    if p.at(L_PAREN) {
        param_list(p);
    } else {
        p.error_here("expected '('");
    }
    expr_or_error(p);
    p.finish_node();
}

fn assert_expr(p: &mut Parser<'_>) {
    p.start_node(ASSERT_EXPR);
    p.bump();
    expr_or_error(p);
    if p.eat(COLON) {
        expr_or_error(p);
    }
    if p.expect(SEMI) || !is_recovery(p.current()) {
        expr_or_error(p);
    }
    p.finish_node();
}

fn error_expr(p: &mut Parser<'_>) {
    p.start_node(ERROR_EXPR);
    p.bump();
    expr_or_error(p);
    p.finish_node();
}

// -------------------------------------------------------------------------
// Delimited lists
// -------------------------------------------------------------------------

/// Comma-separated items up to `closer`. The opener has been consumed.
/// `item` returns `false` only when it consumed nothing.
fn delimited(
    p: &mut Parser<'_>,
    closer: SyntaxKind,
    what: &str,
    mut item: impl FnMut(&mut Parser<'_>) -> bool,
) {
    loop {
        if p.eat(closer) {
            return;
        }
        if p.at(EOF) {
            p.error_here(format!("expected {closer}"));
            return;
        }
        if p.at(COMMA) {
            p.error_skip_group(format!("expected {what}"));
            continue;
        }
        if !item(p) {
            p.error_skip_group(format!("expected {what}"));
            continue;
        }
        if !p.eat(COMMA) && !p.at(closer) && !p.at(EOF) {
            p.error_here(format!("expected ',' or {closer}"));
        }
    }
}

fn arg_list(p: &mut Parser<'_>) {
    p.start_node(ARG_LIST);
    p.bump();
    delimited(p, R_PAREN, "argument", arg);
    p.finish_node();
}

fn arg(p: &mut Parser<'_>) -> bool {
    if p.at(IDENT) && p.nth(1) == EQ {
        p.start_node(ARG);
        p.bump();
        p.bump();
        expr_or_error(p);
        p.finish_node();
        return true;
    }
    if !can_start_expr(p.current()) {
        return false;
    }
    p.start_node(ARG);
    expr_bp(p, 0);
    p.finish_node();
    true
}

fn param_list(p: &mut Parser<'_>) {
    p.start_node(PARAM_LIST);
    p.bump();
    delimited(p, R_PAREN, "parameter", param);
    p.finish_node();
}

fn param(p: &mut Parser<'_>) -> bool {
    if !p.at(IDENT) {
        return false;
    }
    p.start_node(PARAM);
    p.bump();
    if p.eat(EQ) {
        expr_or_error(p);
    }
    p.finish_node();
    true
}

/// `[a, b]` or `[x for x in xs if cond]`. The kind is only known once a
/// `for` shows up, so the node is opened retroactively.
fn array_like(p: &mut Parser<'_>) {
    let cp = p.checkpoint();
    p.bump();
    let mut kind = ARRAY;
    loop {
        if p.eat(R_BRACK) {
            break;
        }
        if p.at(EOF) {
            p.error_here("expected ']'");
            break;
        }
        if p.at(FOR_KW) {
            kind = ARRAY_COMP;
            comp_specs(p);
            continue;
        }
        if p.at(COMMA) || !expr_bp(p, 0) {
            p.error_skip_group("expected array element");
            continue;
        }
        if !p.eat(COMMA) && !p.at(R_BRACK) && !p.at(FOR_KW) && !p.at(EOF) {
            p.error_here("expected ',' or ']'");
        }
    }
    p.start_node_at(cp, kind);
    p.finish_node();
}

/// Object literal or object comprehension.
fn object_like(p: &mut Parser<'_>) {
    let cp = p.checkpoint();
    p.bump();
    let mut kind = OBJECT;
    loop {
        if p.eat(R_BRACE) {
            break;
        }
        if p.at(EOF) {
            p.error_here("expected '}'");
            break;
        }
        if p.at(FOR_KW) {
            kind = OBJECT_COMP;
            comp_specs(p);
            continue;
        }
        if p.at(COMMA) || !member(p) {
            p.error_skip_group("expected field, 'local' or 'assert'");
            continue;
        }
        if !p.eat(COMMA) && !p.at(R_BRACE) && !p.at(FOR_KW) && !p.at(EOF) {
            p.error_here("expected ',' or '}'");
        }
    }
    p.start_node_at(cp, kind);
    p.finish_node();
}

fn member(p: &mut Parser<'_>) -> bool {
    match p.current() {
        LOCAL_KW => {
            p.start_node(OBJ_LOCAL);
            p.bump();
            bind(p);
            p.finish_node();
        }
        ASSERT_KW => {
            p.start_node(ASSERT_MEMBER);
            p.bump();
            expr_or_error(p);
            if p.eat(COLON) {
                expr_or_error(p);
            }
            p.finish_node();
        }
        IDENT | STRING | VERBATIM_STRING | TEXT_BLOCK | L_BRACK => field(p),
        _ => return false,
    }
    true
}

/// `name: value`, `name+:: value`, `name(params): body`, `[expr]: value`.
fn field(p: &mut Parser<'_>) {
    p.start_node(FIELD);
    p.start_node(FIELD_NAME);
    if p.at(L_BRACK) {
        p.bump();
        expr_or_error(p);
        p.close(R_BRACK);
    } else {
        p.bump();
    }
    p.finish_node();

    if p.at(L_PAREN) {
        param_list(p);
    }
    p.eat(PLUS);
    if p.eat(COLON) {
        // `:`, `::` and `:::` select the field's visibility.
        if p.eat(COLON) {
            p.eat(COLON);
        }
        expr_or_error(p);
    } else {
        p.error_here("expected ':'");
        if !is_recovery(p.current()) {
            expr_or_error(p);
        }
    }
    p.finish_node();
}

fn comp_specs(p: &mut Parser<'_>) {
    loop {
        match p.current() {
            FOR_KW => {
                p.start_node(FOR_SPEC);
                p.bump();
                if !p.eat(IDENT) {
                    p.error_here("expected loop variable");
                }
                if p.expect(IN_KW) || !is_recovery(p.current()) {
                    expr_or_error(p);
                }
                p.finish_node();
            }
            IF_KW => {
                p.start_node(IF_SPEC);
                p.bump();
                expr_or_error(p);
                p.finish_node();
            }
            _ => break,
        }
    }
}
