//! String literals and `{expr}` interpolation spans.
//!
//! The lexer hands over the raw literal text. Each brace span is parsed by a
//! nested [`Parser`] that owns its own lexer over the span but shares the
//! outer parser's handler tables.

use std::rc::Rc;

use super::ast::{Expr, ExprKind, Position, StringPart};
use super::cursor::TokenCursor;
use super::error::CompileError;
use super::expr::Precedence;
use super::lexer::{Lexer, TokenKind};
use super::parser::Parser;

/// Prefix handler for string tokens.
pub(super) fn parse_string(p: &mut Parser<'_>) -> Option<Expr> {
    let pos = p.cur.pos;
    let raw = p.cur.literal.clone();
    if !has_interpolation(&raw) {
        return Some(Expr::new(
            ExprKind::StrLit {
                value: unescape(&raw),
                parts: Vec::new(),
            },
            pos,
        ));
    }
    let parts = split_parts(p, &raw, pos)?;
    Some(Expr::new(ExprKind::StrLit { value: raw, parts }, pos))
}

/// True if the raw text holds an unescaped `{`.
fn has_interpolation(raw: &str) -> bool {
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '{' => return true,
            _ => {}
        }
    }
    false
}

pub(crate) fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(c @ ('"' | '\\' | '{' | '}')) => out.push(c),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Split raw literal text into alternating text and expression parts.
fn split_parts(p: &mut Parser<'_>, raw: &str, pos: Position) -> Option<Vec<StringPart>> {
    let chars: Vec<(usize, char)> = raw.char_indices().collect();
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut idx = 0;

    while let Some(&(byte_pos, c)) = chars.get(idx) {
        match c {
            '\\' => {
                let end = chars.get(idx + 2).map_or(raw.len(), |(b, _)| *b);
                text.push_str(&unescape(raw.get(byte_pos..end).unwrap_or_default()));
                idx += 2;
            }
            '{' => {
                let Some(close) = matching_brace(&chars, idx) else {
                    p.errors.push(CompileError::parser("unterminated interpolation in string literal", pos));
                    return None;
                };
                if !text.is_empty() {
                    parts.push(StringPart::Text(std::mem::take(&mut text)));
                }
                let inner_start = byte_pos + 1;
                let inner_end = chars.get(close).map_or(raw.len(), |(b, _)| *b);
                let inner = raw.get(inner_start..inner_end).unwrap_or_default();
                // +1 for the opening quote, +1 for the brace.
                let column = pos.column + idx + 2;
                let expr = parse_span(p, inner, Position::new(pos.line, column))?;
                parts.push(StringPart::Expr(expr));
                idx = close + 1;
            }
            _ => {
                text.push(c);
                idx += 1;
            }
        }
    }
    if !text.is_empty() {
        parts.push(StringPart::Text(text));
    }
    Some(parts)
}

/// Index of the `}` closing the `{` at `open`, skipping nested braces and
/// quoted strings inside the span.
fn matching_brace(chars: &[(usize, char)], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut idx = open;
    while let Some(&(_, c)) = chars.get(idx) {
        match c {
            '\\' => idx += 1,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
        idx += 1;
    }
    None
}

/// Run a nested parser over one interpolation span.
fn parse_span(p: &mut Parser<'_>, inner: &str, start: Position) -> Option<Expr> {
    if inner.trim().is_empty() {
        p.errors.push(CompileError::parser("empty interpolation in string literal", start));
        return None;
    }
    let mut nested = Parser::with_lexer(Lexer::at(inner, start), Rc::clone(&p.tables));
    let expr = nested.parse_expression(Precedence::Lowest);
    if expr.is_some() && !nested.peek_is(TokenKind::Eof) {
        let got = nested.peek.clone();
        nested.unexpected(&got, "'}' to close interpolation");
    }
    let errors = nested.into_errors();
    let failed = !errors.is_empty();
    p.errors.extend(errors);
    if failed {
        None
    } else {
        expr
    }
}
