// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Guard expression evaluation against an issue's status map.
//!
//! Grammar (left-to-right, `or` binds looser than `and`):
//!
//! ```text
//! expr     := or_expr
//! or_expr  := and_expr (' or '  and_expr)*
//! and_expr := cmp      (' and ' cmp     )*
//! cmp      := path ('==' | '!=') literal | path
//! literal  := 'true' | 'false' | 'null' | 'none' | integer
//!           | quoted-string | bare-word
//! path     := ident ('.' ident)*
//! ```
//!
//! A bare path is truthy iff the resolved value is a non-empty string, a
//! non-zero number, or `true`. The empty expression is true.

use serde_json::{Map, Value};

/// Evaluate a guard expression against a status map.
pub fn eval_guard(expr: &str, status: &Map<String, Value>) -> bool {
    let expr = expr.trim();
    if expr.is_empty() {
        return true;
    }
    split_outside_quotes(expr, " or ")
        .iter()
        .any(|term| split_outside_quotes(term, " and ").iter().all(|cmp| eval_cmp(cmp, status)))
}

/// Split on a separator, ignoring occurrences inside quoted strings.
fn split_outside_quotes<'a>(expr: &'a str, sep: &str) -> Vec<&'a str> {
    let bytes = expr.as_bytes();
    let sep_bytes = sep.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if bytes[i..].starts_with(sep_bytes) => {
                parts.push(&expr[start..i]);
                i += sep_bytes.len();
                start = i;
                continue;
            }
            None => {}
        }
        i += 1;
    }
    parts.push(&expr[start..]);
    parts
}

fn eval_cmp(cmp: &str, status: &Map<String, Value>) -> bool {
    let cmp = cmp.trim();
    if let Some((path, literal)) = split_operator(cmp, "!=") {
        return !literal_matches(resolve_path(path.trim(), status), literal.trim());
    }
    if let Some((path, literal)) = split_operator(cmp, "==") {
        return literal_matches(resolve_path(path.trim(), status), literal.trim());
    }
    is_truthy(resolve_path(cmp, status))
}

/// Find an operator outside quotes and split around it.
fn split_operator<'a>(cmp: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let bytes = cmp.as_bytes();
    let op_bytes = op.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if bytes[i..].starts_with(op_bytes) => {
                return Some((&cmp[..i], &cmp[i + op_bytes.len()..]));
            }
            None => {}
        }
        i += 1;
    }
    None
}

/// Walk a dotted path. Any non-mapping intermediate yields `None`.
fn resolve_path<'a>(path: &str, status: &'a Map<String, Value>) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = status.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        _ => false,
    }
}

fn literal_matches(value: Option<&Value>, literal: &str) -> bool {
    match parse_literal(literal) {
        Literal::Bool(expected) => value.and_then(Value::as_bool) == Some(expected),
        // An undefined path compares equal to null.
        Literal::Null => matches!(value, None | Some(Value::Null)),
        Literal::Int(expected) => value.and_then(Value::as_i64) == Some(expected),
        Literal::Str(expected) => value.and_then(Value::as_str) == Some(expected.as_str()),
    }
}

enum Literal {
    Bool(bool),
    Null,
    Int(i64),
    Str(String),
}

fn parse_literal(literal: &str) -> Literal {
    match literal {
        "true" => return Literal::Bool(true),
        "false" => return Literal::Bool(false),
        "null" | "none" => return Literal::Null,
        _ => {}
    }
    if let Ok(n) = literal.parse::<i64>() {
        return Literal::Int(n);
    }
    let unquoted = literal
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| literal.strip_prefix('"').and_then(|s| s.strip_suffix('"')));
    Literal::Str(unquoted.unwrap_or(literal).to_string())
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
