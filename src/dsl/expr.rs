//! Expression parsing by precedence climbing over per-token handler tables.

use std::collections::HashMap;

use indexmap::IndexMap;

use super::ast::{BinOp, Expr, ExprKind, UnaryOp};
use super::cursor::{describe, TokenCursor};
use super::error::CompileError;
use super::interp;
use super::lexer::TokenKind;
use super::parser::Parser;

/// Binding strength, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Lowest,
    Or,
    And,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
}

pub type PrefixFn = for<'a> fn(&mut Parser<'a>) -> Option<Expr>;
pub type InfixFn = for<'a> fn(&mut Parser<'a>, Expr) -> Option<Expr>;

/// Prefix and infix handlers keyed by token kind. One instance is shared by
/// a parser and every nested interpolation parser it spawns.
pub struct HandlerTables {
    prefix: HashMap<TokenKind, PrefixFn>,
    infix: HashMap<TokenKind, (Precedence, InfixFn)>,
}

impl HandlerTables {
    pub fn standard() -> Self {
        let mut tables = Self {
            prefix: HashMap::new(),
            infix: HashMap::new(),
        };

        tables.register_prefix(TokenKind::Ident, parse_identifier);
        tables.register_prefix(TokenKind::Int, parse_int);
        tables.register_prefix(TokenKind::Float, parse_float);
        tables.register_prefix(TokenKind::String, interp::parse_string);
        tables.register_prefix(TokenKind::True, parse_bool);
        tables.register_prefix(TokenKind::False, parse_bool);
        tables.register_prefix(TokenKind::Bang, parse_unary);
        tables.register_prefix(TokenKind::Minus, parse_unary);
        tables.register_prefix(TokenKind::LParen, parse_grouped);
        tables.register_prefix(TokenKind::Try, parse_try);
        tables.register_prefix(TokenKind::Render, parse_render);
        tables.register_prefix(TokenKind::Error, parse_error_ctor);
        tables.register_prefix(TokenKind::Ctx, parse_context);

        for (kind, prec) in [
            (TokenKind::Or, Precedence::Or),
            (TokenKind::And, Precedence::And),
            (TokenKind::EqEq, Precedence::Equals),
            (TokenKind::NotEq, Precedence::Equals),
            (TokenKind::Lt, Precedence::LessGreater),
            (TokenKind::Le, Precedence::LessGreater),
            (TokenKind::Gt, Precedence::LessGreater),
            (TokenKind::Ge, Precedence::LessGreater),
            (TokenKind::Plus, Precedence::Sum),
            (TokenKind::Minus, Precedence::Sum),
            (TokenKind::Star, Precedence::Product),
            (TokenKind::Slash, Precedence::Product),
            (TokenKind::Percent, Precedence::Product),
        ] {
            tables.register_infix(kind, prec, parse_binary);
        }
        tables.register_infix(TokenKind::Dot, Precedence::Call, parse_member);
        tables.register_infix(TokenKind::LParen, Precedence::Call, parse_call);

        tables
    }

    pub fn register_prefix(&mut self, kind: TokenKind, f: PrefixFn) {
        self.prefix.insert(kind, f);
    }

    pub fn register_infix(&mut self, kind: TokenKind, precedence: Precedence, f: InfixFn) {
        self.infix.insert(kind, (precedence, f));
    }

    fn prefix(&self, kind: TokenKind) -> Option<PrefixFn> {
        self.prefix.get(&kind).copied()
    }

    fn infix(&self, kind: TokenKind) -> Option<(Precedence, InfixFn)> {
        self.infix.get(&kind).copied()
    }

    fn precedence(&self, kind: TokenKind) -> Precedence {
        self.infix.get(&kind).map_or(Precedence::Lowest, |(p, _)| *p)
    }
}

impl Parser<'_> {
    /// Parse an expression starting at the current token. Infix operators
    /// are absorbed while they bind tighter than `precedence`; the cursor ends
    /// on the expression's last token.
    pub(super) fn parse_expression(&mut self, precedence: Precedence) -> Option<Expr> {
        let Some(prefix) = self.tables.prefix(self.cur.kind) else {
            let tok = self.cur.clone();
            if !tok.is(TokenKind::Illegal) {
                let found = describe(&tok);
                self.errors.push(CompileError::parser(
                    format!("expected an expression, got {found}"),
                    tok.pos,
                ));
            }
            return None;
        };
        let mut left = prefix(self)?;

        while !self.peek_is(TokenKind::Semicolon) && precedence < self.peek_precedence() {
            let Some((_, infix)) = self.tables.infix(self.peek.kind) else {
                break;
            };
            self.advance();
            left = infix(self, left)?;
        }
        Some(left)
    }

    fn peek_precedence(&self) -> Precedence {
        // A `(` on a new line starts a new statement rather than a call.
        if self.peek_is(TokenKind::LParen) && self.peek.pos.line != self.cur.pos.line {
            return Precedence::Lowest;
        }
        self.tables.precedence(self.peek.kind)
    }

    fn cur_precedence(&self) -> Precedence {
        self.tables.precedence(self.cur.kind)
    }

    /// Comma-separated expressions up to `end`. The cursor starts on the
    /// opening token and ends on `end`.
    fn parse_expression_list(&mut self, end: TokenKind) -> Option<Vec<Expr>> {
        let mut items = Vec::new();
        if self.peek_is(end) {
            self.advance();
            return Some(items);
        }
        self.advance();
        items.push(self.parse_expression(Precedence::Lowest)?);
        while self.peek_is(TokenKind::Comma) {
            self.advance();
            if self.peek_is(end) {
                break;
            }
            self.advance();
            items.push(self.parse_expression(Precedence::Lowest)?);
        }
        if !self.expect_peek(end) {
            return None;
        }
        Some(items)
    }

    /// `Name { field: expr, ... }` with the cursor on `Name`.
    fn parse_struct_literal(&mut self) -> Option<Expr> {
        let pos = self.cur.pos;
        let name = self.cur.literal.clone();
        self.advance();

        let mut fields = IndexMap::new();
        loop {
            if self.peek_is(TokenKind::RBrace) {
                self.advance();
                break;
            }
            if !self.expect_peek(TokenKind::Ident) {
                return None;
            }
            let field_pos = self.cur.pos;
            let field = self.cur.literal.clone();
            if !self.expect_peek(TokenKind::Colon) {
                return None;
            }
            self.advance();
            let value = self.parse_expression(Precedence::Lowest)?;
            if fields.insert(field.clone(), value).is_some() {
                self.errors.push(CompileError::parser(
                    format!("duplicate field '{field}' in {name} literal"),
                    field_pos,
                ));
            }
            if self.peek_is(TokenKind::Comma) {
                self.advance();
            } else if self.expect_peek(TokenKind::RBrace) {
                break;
            } else {
                return None;
            }
        }

        Some(Expr::new(ExprKind::StructLit { name, fields }, pos))
    }
}

// ── Prefix handlers ───────────────────────────────────────────────

/// Upper-case identifier directly followed by `{` is a struct literal.
fn parse_identifier(p: &mut Parser<'_>) -> Option<Expr> {
    let starts_upper = p.cur.literal.chars().next().is_some_and(char::is_uppercase);
    if starts_upper && p.peek_is(TokenKind::LBrace) {
        return p.parse_struct_literal();
    }
    Some(Expr::new(ExprKind::Ident(p.cur.literal.clone()), p.cur.pos))
}

fn parse_int(p: &mut Parser<'_>) -> Option<Expr> {
    match p.cur.literal.parse::<i64>() {
        Ok(v) => Some(Expr::new(ExprKind::IntLit(v), p.cur.pos)),
        Err(_) => {
            let msg = format!("invalid integer literal '{}'", p.cur.literal);
            p.errors.push(CompileError::parser(msg, p.cur.pos));
            None
        }
    }
}

fn parse_float(p: &mut Parser<'_>) -> Option<Expr> {
    match p.cur.literal.parse::<f64>() {
        Ok(v) => Some(Expr::new(ExprKind::FloatLit(v), p.cur.pos)),
        Err(_) => {
            let msg = format!("invalid float literal '{}'", p.cur.literal);
            p.errors.push(CompileError::parser(msg, p.cur.pos));
            None
        }
    }
}

fn parse_bool(p: &mut Parser<'_>) -> Option<Expr> {
    Some(Expr::new(ExprKind::BoolLit(p.cur_is(TokenKind::True)), p.cur.pos))
}

fn parse_unary(p: &mut Parser<'_>) -> Option<Expr> {
    let pos = p.cur.pos;
    let op = if p.cur_is(TokenKind::Bang) { UnaryOp::Not } else { UnaryOp::Neg };
    p.advance();
    let operand = p.parse_expression(Precedence::Prefix)?;
    Some(Expr::new(
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
        pos,
    ))
}

fn parse_grouped(p: &mut Parser<'_>) -> Option<Expr> {
    p.advance();
    let expr = p.parse_expression(Precedence::Lowest)?;
    if !p.expect_peek(TokenKind::RParen) {
        return None;
    }
    Some(expr)
}

/// `try expr`; the operand binds like a unary operand so `try M.find(x)`
/// wraps the whole call.
fn parse_try(p: &mut Parser<'_>) -> Option<Expr> {
    let pos = p.cur.pos;
    p.advance();
    let inner = p.parse_expression(Precedence::Prefix)?;
    Some(Expr::new(ExprKind::Try(Box::new(inner)), pos))
}

fn parse_render(p: &mut Parser<'_>) -> Option<Expr> {
    let pos = p.cur.pos;
    if !p.expect_peek(TokenKind::LParen) {
        return None;
    }
    let args = p.parse_expression_list(TokenKind::RParen)?;
    if args.is_empty() {
        p.errors.push(CompileError::parser("render needs at least one argument", pos));
        return None;
    }
    Some(Expr::new(ExprKind::Render(args), pos))
}

fn parse_error_ctor(p: &mut Parser<'_>) -> Option<Expr> {
    let pos = p.cur.pos;
    if !p.expect_peek(TokenKind::LParen) {
        return None;
    }
    p.advance();
    let message = p.parse_expression(Precedence::Lowest)?;
    if !p.expect_peek(TokenKind::RParen) {
        return None;
    }
    Some(Expr::new(ExprKind::ErrorCtor(Box::new(message)), pos))
}

/// `ctx.field`
fn parse_context(p: &mut Parser<'_>) -> Option<Expr> {
    let pos = p.cur.pos;
    if !p.expect_peek(TokenKind::Dot) || !p.expect_peek(TokenKind::Ident) {
        return None;
    }
    Some(Expr::new(ExprKind::Context(p.cur.literal.clone()), pos))
}

// ── Infix handlers ────────────────────────────────────────────────

fn parse_binary(p: &mut Parser<'_>, left: Expr) -> Option<Expr> {
    let op = match p.cur.kind {
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        TokenKind::Star => BinOp::Mul,
        TokenKind::Slash => BinOp::Div,
        TokenKind::Percent => BinOp::Mod,
        TokenKind::EqEq => BinOp::Eq,
        TokenKind::NotEq => BinOp::Ne,
        TokenKind::Lt => BinOp::Lt,
        TokenKind::Le => BinOp::Le,
        TokenKind::Gt => BinOp::Gt,
        TokenKind::Ge => BinOp::Ge,
        TokenKind::And => BinOp::And,
        TokenKind::Or => BinOp::Or,
        _ => {
            let msg = format!("{} is not a binary operator", describe(&p.cur));
            let pos = p.cur.pos;
            p.report(CompileError::parser(msg, pos));
            return None;
        }
    };
    let precedence = p.cur_precedence();
    let pos = left.pos;
    p.advance();
    let right = p.parse_expression(precedence)?;
    Some(Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        pos,
    ))
}

/// Property names may collide with keywords (`post.error`, `x.render`).
fn parse_member(p: &mut Parser<'_>, object: Expr) -> Option<Expr> {
    let is_name = p.peek.literal.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && !matches!(p.peek.kind, TokenKind::String | TokenKind::Illegal);
    if !is_name {
        let got = p.peek.clone();
        p.unexpected(&got, "property name after '.'");
        return None;
    }
    p.advance();
    let pos = object.pos;
    Some(Expr::new(
        ExprKind::Member {
            object: Box::new(object),
            property: p.cur.literal.clone(),
        },
        pos,
    ))
}

fn parse_call(p: &mut Parser<'_>, callee: Expr) -> Option<Expr> {
    let pos = callee.pos;
    let args = p.parse_expression_list(TokenKind::RParen)?;
    Some(Expr::new(
        ExprKind::Call {
            callee: Box::new(callee),
            args,
        },
        pos,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use crate::dsl::ast::{StmtKind, StringPart};
    use crate::dsl::parser;

    fn expr(src: &str) -> Expr {
        let result = parser::parse(&format!("func main() {{\n{src}\n}}"), 0);
        assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.diagnostics());
        let mut func = result.funcs.into_iter().next().unwrap();
        match func.body.remove(0).kind {
            StmtKind::Expr(e) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    fn binary(e: &Expr) -> (BinOp, &Expr, &Expr) {
        match &e.kind {
            ExprKind::Binary { op, left, right } => (*op, left, right),
            other => panic!("expected binary, got {other:?}"),
        }
    }

    fn ident(e: &Expr) -> &str {
        match &e.kind {
            ExprKind::Ident(name) => name,
            other => panic!("expected identifier, got {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let e = expr("a + b * c");
        let (op, left, right) = binary(&e);
        assert_eq!(op, BinOp::Add);
        assert_eq!(ident(left), "a");
        let (inner, l, r) = binary(right);
        assert_eq!(inner, BinOp::Mul);
        assert_eq!((ident(l), ident(r)), ("b", "c"));
    }

    #[test]
    fn grouping_overrides_precedence() {
        let e = expr("(a + b) * c");
        let (op, left, right) = binary(&e);
        assert_eq!(op, BinOp::Mul);
        assert_eq!(ident(right), "c");
        assert_eq!(binary(left).0, BinOp::Add);
    }

    #[test]
    fn binary_operators_are_left_associative() {
        let e = expr("a - b - c");
        let (_, left, right) = binary(&e);
        assert_eq!(ident(right), "c");
        assert_eq!(binary(left).0, BinOp::Sub);
    }

    #[test]
    fn precedence_ladder() {
        // || < && < == < < < + < *
        let e = expr("a || b && c == d < e + f * g");
        let (op, _, right) = binary(&e);
        assert_eq!(op, BinOp::Or);
        let (op, _, right) = binary(right);
        assert_eq!(op, BinOp::And);
        let (op, _, right) = binary(right);
        assert_eq!(op, BinOp::Eq);
        let (op, _, right) = binary(right);
        assert_eq!(op, BinOp::Lt);
        let (op, _, right) = binary(right);
        assert_eq!(op, BinOp::Add);
        assert_eq!(binary(right).0, BinOp::Mul);
    }

    #[test]
    fn unary_binds_tighter_than_binary() {
        let e = expr("-a * b");
        let (op, left, _) = binary(&e);
        assert_eq!(op, BinOp::Mul);
        assert!(matches!(left.kind, ExprKind::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn chained_member_call() {
        let e = expr("a.b.c()");
        let ExprKind::Call { callee, args } = &e.kind else {
            panic!("expected call");
        };
        assert!(args.is_empty());
        let ExprKind::Member { object, property } = &callee.kind else {
            panic!("expected member callee");
        };
        assert_eq!(property, "c");
        let ExprKind::Member { object: inner, property: inner_prop } = &object.kind else {
            panic!("expected two-level member chain");
        };
        assert_eq!(inner_prop, "b");
        assert_eq!(ident(inner), "a");
    }

    #[test]
    fn call_arguments() {
        let e = expr("f(1, x + 2, \"s\",)");
        let ExprKind::Call { args, .. } = &e.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 3);
        assert!(matches!(args[0].kind, ExprKind::IntLit(1)));
    }

    #[test]
    fn struct_literal_for_upper_case_identifier() {
        let e = expr("Post{title: \"x\", views: 3}");
        let ExprKind::StructLit { name, fields } = &e.kind else {
            panic!("expected struct literal");
        };
        assert_eq!(name, "Post");
        assert_eq!(fields.len(), 2);
        assert!(matches!(fields["views"].kind, ExprKind::IntLit(3)));
    }

    #[test]
    fn lower_case_identifier_before_brace_is_not_a_struct() {
        let result = parser::parse("func f() {\n if ok { x = 1 }\n}", 0);
        assert!(result.errors.is_empty());
        assert!(matches!(result.funcs[0].body[0].kind, StmtKind::If { .. }));
    }

    #[test]
    fn try_wraps_whole_call() {
        let e = expr("try Post.find(id)");
        let ExprKind::Try(inner) = &e.kind else {
            panic!("expected try");
        };
        assert!(matches!(inner.kind, ExprKind::Call { .. }));
    }

    #[test]
    fn render_with_arguments() {
        let e = expr("render(post, Card{n: 1})");
        let ExprKind::Render(args) = &e.kind else {
            panic!("expected render");
        };
        assert_eq!(args.len(), 2);
        assert!(matches!(args[1].kind, ExprKind::StructLit { .. }));
    }

    #[test]
    fn render_without_arguments_is_an_error() {
        let result = parser::parse("func f() {\n render()\n}", 0);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn error_constructor_and_context_access() {
        let e = expr("error(\"bad\")");
        assert!(matches!(e.kind, ExprKind::ErrorCtor(_)));
        let e = expr("ctx.tenant");
        assert_eq!(e.kind, ExprKind::Context("tenant".into()));
    }

    #[test]
    fn member_names_may_be_keywords() {
        let e = expr("job.error");
        assert!(matches!(e.kind, ExprKind::Member { ref property, .. } if property == "error"));
    }

    #[test]
    fn paren_on_next_line_is_not_a_call() {
        let result = parser::parse("func f() {\n a = b\n (c)\n}", 0);
        assert!(result.errors.is_empty());
        assert_eq!(result.funcs[0].body.len(), 2);
    }

    #[test]
    fn interpolated_string_parts() {
        let e = expr("\"Hello {name}!\"");
        let ExprKind::StrLit { parts, .. } = &e.kind else {
            panic!("expected string");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], StringPart::Text("Hello ".into()));
        assert!(matches!(&parts[1], StringPart::Expr(e) if ident(e) == "name"));
        assert_eq!(parts[2], StringPart::Text("!".into()));
    }

    #[test]
    fn missing_operand_reports_position() {
        let result = parser::parse("func f() {\n let x = 1 +\n}", 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].pos.line, 3);
        assert!(result.errors[0].message.starts_with("expected an expression"));
    }

    #[test]
    fn binary_handler_rejects_non_operator_tokens() {
        let mut tables = HandlerTables::standard();
        tables.register_infix(TokenKind::Question, Precedence::Sum, parse_binary);
        let lexer = crate::dsl::lexer::Lexer::new("a ? b", 0);
        let mut p = Parser::with_lexer(lexer, std::rc::Rc::new(tables));
        assert!(p.parse_expression(Precedence::Lowest).is_none());
        let errors = p.into_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "'?' is not a binary operator");
    }

    #[test]
    fn custom_prefix_handler_can_be_registered() {
        fn forty_two(p: &mut Parser<'_>) -> Option<Expr> {
            Some(Expr::new(ExprKind::IntLit(42), p.cur.pos))
        }
        let mut tables = HandlerTables::standard();
        tables.register_prefix(TokenKind::Question, forty_two);
        let lexer = crate::dsl::lexer::Lexer::new("? + 1", 0);
        let mut p = Parser::with_lexer(lexer, std::rc::Rc::new(tables));
        let e = p.parse_expression(Precedence::Lowest).unwrap();
        let (op, left, _) = binary(&e);
        assert_eq!(op, BinOp::Add);
        assert!(matches!(left.kind, ExprKind::IntLit(42)));
    }
}
