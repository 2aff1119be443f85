//! Hover handler for displaying information about symbols.
//!
//! Provides hover information for:
//! - Variables: kind, declaration line and what is statically known about
//!   the value (literals are shown as written, nothing is evaluated)
//! - Fields reached through `.`: the defining field and its document
//! - `std` functions: signature and description
//! - `self`, `super` and `$`: the fields of the object
//! - Import paths: the resolved file

use crate::error::EngineError;
use crate::snapshot::Snapshot;
use joule_analysis::{BuiltinFunction, DocModel, FieldTarget, Symbol, SymbolKind, ValueDesc};
use joule_syntax::ast::{AstNode, Visibility};
use lsp_types::{Hover, HoverContents, HoverParams, MarkupContent, MarkupKind};

use super::utils::{classify, to_offset, to_range, Target};

/// Handle a hover request.
pub fn handle_hover(snap: &Snapshot, params: &HoverParams) -> Result<Option<Hover>, EngineError> {
    snap.checkpoint()?;
    let position = params.text_document_position_params.position;
    let offset = to_offset(&snap.doc.line_index, position);
    let (resolver, doc) = snap.analysis();

    let Some(target) = classify(&doc, offset) else {
        return Ok(None);
    };
    tracing::debug!("Hover for {:?}", target);

    let range = target.range();
    let info = match target {
        Target::Symbol { id, .. } => Some(symbol_info(snap, doc.scopes.symbol(id))),
        Target::FieldAccess { access, name, .. } => access.base().and_then(|base| {
            if resolver.is_std(&doc, &base) {
                resolver
                    .builtins()
                    .std_function(&name)
                    .map(builtin_info)
            } else {
                resolver
                    .field(&doc, &base, &name)
                    .map(|field| field_info(snap, &doc, &field))
            }
        }),
        Target::FieldKey { field, name, .. } => Some(field_info(
            snap,
            &doc,
            &FieldTarget {
                doc: std::rc::Rc::clone(&doc),
                name,
                field,
            },
        )),
        Target::NamedArg { call, name, .. } => call
            .callee()
            .and_then(|callee| resolver.function_of(&doc, &callee))
            .and_then(|function| {
                let param = function.param(&name)?;
                let mut info = code_block(&format!("(parameter) {name}"));
                if let Some(default) = param.default_value() {
                    info.push_str(&format!("\n\ndefault: `{}`", default.syntax().text()));
                }
                Some(info)
            }),
        Target::ImportPath { import, .. } => import.path().map(|path| {
            match snap.loader.locate(&snap.doc.path, &path) {
                Ok(resolved) => format!(
                    "{}\n\n`{}`",
                    code_block(&format!("{} {path:?}", import.kind().keyword())),
                    resolved.display()
                ),
                Err(e) => format!(
                    "{}\n\n{e}",
                    code_block(&format!("{} {path:?}", import.kind().keyword()))
                ),
            }
        }),
        Target::ObjectKeyword { expr, .. } => {
            let fields = resolver
                .fields(&doc, &expr)
                .into_iter()
                .map(|f| f.name)
                .collect();
            Some(code_block(&format!(
                "{} : {}",
                expr.syntax().text(),
                ValueDesc::Object { fields }
            )))
        }
    };

    snap.checkpoint()?;
    Ok(info.map(|value| Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range: Some(to_range(&snap.doc.line_index, range)),
    }))
}

fn code_block(line: &str) -> String {
    format!("```jsonnet\n{line}\n```")
}

/// `(local) x = 1`, `(parameter) a`, `(import) k = import "k.libsonnet"`.
pub fn describe_symbol(symbol: &Symbol) -> String {
    let kind = symbol.kind.describe();
    match &symbol.value {
        ValueDesc::Function { params } => {
            format!("({kind}) {}({})", symbol.name, params.join(", "))
        }
        ValueDesc::Unknown => format!("({kind}) {}", symbol.name),
        ValueDesc::Object { .. } | ValueDesc::Array { .. } => {
            format!("({kind}) {}: {}", symbol.name, symbol.value)
        }
        value => format!("({kind}) {} = {value}", symbol.name),
    }
}

fn symbol_info(snap: &Snapshot, symbol: &Symbol) -> String {
    if symbol.kind == SymbolKind::Builtin {
        return format!(
            "{}\n\nThe Jsonnet standard library.",
            code_block(&format!("({}) {}", symbol.kind.describe(), symbol.name))
        );
    }
    let line = snap.doc.line_index.line_col(symbol.range.start()).line + 1;
    let mut info = code_block(&describe_symbol(symbol));
    info.push_str(&format!("\n\ndeclared on line {line}"));
    if symbol.shadowed {
        info.push_str(", hidden by a later declaration");
    }
    info
}

fn builtin_info(function: &BuiltinFunction) -> String {
    format!("{}\n\n{}", code_block(&function.signature()), function.doc)
}

fn field_info(snap: &Snapshot, doc: &DocModel, field: &FieldTarget) -> String {
    let separator = match field.field.visibility() {
        Visibility::Default => ":",
        Visibility::Hidden => "::",
        Visibility::Forced => ":::",
    };
    let plus = if field.field.is_inherited() { "+" } else { "" };
    let head = match field.field.params() {
        Some(params) => format!("(field) {}{}", field.name, params.syntax().text()),
        None => {
            let value = field
                .field
                .value()
                .map_or(ValueDesc::Unknown, |v| ValueDesc::of(&v));
            match value {
                ValueDesc::Unknown => format!("(field) {}{plus}{separator}", field.name),
                value => format!("(field) {}{plus}{separator} {value}", field.name),
            }
        }
    };
    let mut info = code_block(&head);
    if field.doc.path != doc.path {
        info.push_str(&format!("\n\ndefined in `{}`", field.doc.path.display()));
    } else {
        let line = snap
            .doc
            .line_index
            .line_col(field.name_range().start())
            .line
            + 1;
        info.push_str(&format!("\n\ndefined on line {line}"));
    }
    info
}
