use std::rc::Rc;

use super::ast::*;
use super::cursor::{describe, TokenCursor};
use super::error::CompileError;
use super::expr::{HandlerTables, Precedence};
use super::lexer::{Lexer, Token, TokenKind};
use super::schema::SchemaParser;

/// Parse one script unit. Never fails outright: diagnostics are collected in
/// [`ParseResult::errors`] next to everything that did parse.
pub fn parse(source: &str, line_offset: usize) -> ParseResult {
    let mut parser = Parser::new(source, line_offset);
    parser.parse_program()
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    pub(super) cur: Token,
    pub(super) peek: Token,
    pub(super) errors: Vec<CompileError>,
    pub(super) tables: Rc<HandlerTables>,
    /// Brace nesting of `cur`, used to resynchronise on top-level declarations.
    depth: usize,
}

impl TokenCursor for Parser<'_> {
    fn cur(&self) -> &Token {
        &self.cur
    }

    fn peek(&self) -> &Token {
        &self.peek
    }

    fn advance(&mut self) {
        let next = self.pull();
        self.cur = std::mem::replace(&mut self.peek, next);
        match self.cur.kind {
            TokenKind::LBrace => self.depth += 1,
            TokenKind::RBrace => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
    }

    fn report(&mut self, error: CompileError) {
        self.errors.push(error);
    }
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, line_offset: usize) -> Self {
        Self::with_lexer(Lexer::new(source, line_offset), Rc::new(HandlerTables::standard()))
    }

    /// A parser over `lexer` that shares an existing set of handler tables.
    pub(super) fn with_lexer(lexer: Lexer<'a>, tables: Rc<HandlerTables>) -> Self {
        let mut parser = Self {
            lexer,
            cur: Token::new(TokenKind::Eof, "", Position::default()),
            peek: Token::new(TokenKind::Eof, "", Position::default()),
            errors: Vec::new(),
            tables,
            depth: 0,
        };
        parser.cur = parser.pull();
        parser.peek = parser.pull();
        if parser.cur.is(TokenKind::LBrace) {
            parser.depth = 1;
        }
        parser
    }

    fn pull(&mut self) -> Token {
        let tok = self.lexer.next_token();
        if tok.is(TokenKind::Illegal) {
            self.errors.push(CompileError::lexer(tok.literal.clone(), tok.pos));
        }
        tok
    }

    pub fn into_errors(self) -> Vec<CompileError> {
        self.errors
    }

    // ── Declarations ──────────────────────────────────────────────

    pub fn parse_program(&mut self) -> ParseResult {
        let mut result = ParseResult::default();
        let mut seen_declaration = false;

        while !self.cur_is(TokenKind::Eof) {
            let start = self.cur.pos;
            let parsed = match self.cur.kind {
                TokenKind::Import if seen_declaration => {
                    self.errors.push(CompileError::parser(
                        "imports must come before all other declarations",
                        start,
                    ));
                    false
                }
                TokenKind::Import => self.parse_import().map(|i| result.imports.push(i)).is_some(),
                TokenKind::Model => {
                    seen_declaration = true;
                    self.parse_model().map(|m| result.models.push(m)).is_some()
                }
                TokenKind::Service => {
                    seen_declaration = true;
                    self.parse_service().map(|s| result.services.push(s)).is_some()
                }
                TokenKind::Let | TokenKind::Const => {
                    seen_declaration = true;
                    self.parse_var_decl().map(|v| result.vars.push(v)).is_some()
                }
                TokenKind::Func => {
                    seen_declaration = true;
                    self.parse_func().map(|f| result.funcs.push(f)).is_some()
                }
                TokenKind::Semicolon => true,
                TokenKind::Illegal => false,
                _ => {
                    let found = describe(&self.cur);
                    self.errors.push(CompileError::parser(
                        format!("expected a declaration, got {found}"),
                        start,
                    ));
                    false
                }
            };

            if parsed {
                self.advance();
            } else {
                self.synchronize(start);
            }
        }

        log::debug!(
            "parsed unit: {} imports, {} models, {} services, {} vars, {} funcs, {} errors",
            result.imports.len(),
            result.models.len(),
            result.services.len(),
            result.vars.len(),
            result.funcs.len(),
            self.errors.len(),
        );
        result.errors = std::mem::take(&mut self.errors);
        result
    }

    /// Skip ahead to the next top-level declaration keyword (never the one the
    /// failed construct started on). `let`/`const` also occur inside function
    /// bodies, so they only count outside of braces.
    fn synchronize(&mut self, start: Position) {
        loop {
            if self.cur_is(TokenKind::Eof) {
                return;
            }
            if self.cur.pos != start {
                match self.cur.kind {
                    TokenKind::Import | TokenKind::Model | TokenKind::Service | TokenKind::Func => {
                        self.depth = 0;
                        return;
                    }
                    TokenKind::Let | TokenKind::Const if self.depth == 0 => return,
                    _ => {}
                }
            }
            self.advance();
        }
    }

    fn parse_import(&mut self) -> Option<ImportDecl> {
        let pos = self.cur.pos;
        let kind = match self.peek.kind {
            TokenKind::LBrace => {
                self.advance();
                let mut names = Vec::new();
                loop {
                    if self.peek_is(TokenKind::RBrace) {
                        self.advance();
                        break;
                    }
                    if !self.expect_peek(TokenKind::Ident) {
                        return None;
                    }
                    names.push(self.cur.literal.clone());
                    if self.peek_is(TokenKind::Comma) {
                        self.advance();
                    } else if !self.expect_peek(TokenKind::RBrace) {
                        return None;
                    } else {
                        break;
                    }
                }
                if !self.expect_contextual("from") || !self.expect_peek(TokenKind::String) {
                    return None;
                }
                ImportKind::Members {
                    names,
                    path: self.cur.literal.clone(),
                }
            }
            TokenKind::String => {
                self.advance();
                let path = self.cur.literal.clone();
                if !self.expect_contextual("as") || !self.expect_peek(TokenKind::Ident) {
                    return None;
                }
                ImportKind::Native {
                    path,
                    alias: self.cur.literal.clone(),
                }
            }
            TokenKind::Ident => {
                self.advance();
                let name = self.cur.literal.clone();
                if !self.expect_contextual("from") || !self.expect_peek(TokenKind::String) {
                    return None;
                }
                ImportKind::Default {
                    name,
                    path: self.cur.literal.clone(),
                }
            }
            _ => {
                let got = self.peek.clone();
                self.unexpected(&got, "'{', a string or an identifier after 'import'");
                return None;
            }
        };
        self.skip_semicolon();
        Some(ImportDecl { kind, pos })
    }

    /// Hand the token window to the schema sub-parser and take it back.
    fn parse_model(&mut self) -> Option<ModelDecl> {
        let mut sub = SchemaParser::new(&mut self.lexer, self.cur.clone(), self.peek.clone());
        let model = sub.parse_model();
        self.cur = sub.cur_token().clone();
        self.peek = sub.peek_token().clone();
        self.errors.extend_from_slice(sub.errors());
        model
    }

    fn parse_service(&mut self) -> Option<ServiceDecl> {
        let mut sub = SchemaParser::new(&mut self.lexer, self.cur.clone(), self.peek.clone());
        let service = sub.parse_service();
        self.cur = sub.cur_token().clone();
        self.peek = sub.peek_token().clone();
        self.errors.extend_from_slice(sub.errors());
        service
    }

    /// `let name[: Type] = expr` or `const ...`; the cursor starts on the keyword.
    fn parse_var_decl(&mut self) -> Option<VarDecl> {
        let pos = self.cur.pos;
        let is_const = self.cur_is(TokenKind::Const);
        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        let name = self.cur.literal.clone();
        let ty = if self.peek_is(TokenKind::Colon) {
            self.advance();
            self.parse_type_name()?
        } else {
            String::new()
        };
        if !self.expect_peek(TokenKind::Assign) {
            return None;
        }
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.skip_semicolon();
        Some(VarDecl {
            name,
            ty,
            value,
            is_const,
            pos,
        })
    }

    fn parse_func(&mut self) -> Option<FuncDecl> {
        let line = self.cur.pos.line;
        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        let name = self.cur.literal.clone();
        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }
        let params = self.parse_params()?;
        let return_type = if self.peek_is(TokenKind::Arrow) {
            self.advance();
            self.parse_type_name()?
        } else {
            String::new()
        };
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let body = self.parse_block()?;
        Some(FuncDecl {
            name,
            params,
            return_type,
            body,
            line,
        })
    }

    // ── Statements ────────────────────────────────────────────────

    /// Parse statements up to the matching `}`. The cursor starts on `{` and
    /// ends on `}`.
    fn parse_block(&mut self) -> Option<Vec<Stmt>> {
        let mut stmts = Vec::new();
        self.advance();
        while !self.cur_is(TokenKind::RBrace) && !self.cur_is(TokenKind::Eof) {
            if let Some(stmt) = self.parse_statement() {
                stmts.push(stmt);
                self.advance();
            } else {
                self.recover_statement();
            }
        }
        if self.cur_is(TokenKind::Eof) {
            let pos = self.cur.pos;
            self.errors.push(CompileError::parser("expected '}', got end of input", pos));
            return None;
        }
        Some(stmts)
    }

    /// Skip the rest of a broken statement: stop at `;`, at the block's `}`, or
    /// at the first token on a new line once braces are balanced.
    fn recover_statement(&mut self) {
        let line = self.cur.pos.line;
        let mut balance = 0usize;
        loop {
            match self.cur.kind {
                TokenKind::Eof => return,
                TokenKind::RBrace if balance == 0 => return,
                TokenKind::RBrace => balance -= 1,
                TokenKind::LBrace => balance += 1,
                TokenKind::Semicolon if balance == 0 => {
                    self.advance();
                    return;
                }
                _ => {}
            }
            self.advance();
            if balance == 0 && self.cur.pos.line != line {
                return;
            }
        }
    }

    fn parse_statement(&mut self) -> Option<Stmt> {
        let pos = self.cur.pos;
        let kind = match self.cur.kind {
            TokenKind::Let | TokenKind::Const => StmtKind::Let(self.parse_var_decl()?),
            TokenKind::Return => self.parse_return()?,
            TokenKind::If => self.parse_if()?,
            TokenKind::Semicolon => return self.empty_statement(),
            _ => self.parse_expression_statement()?,
        };
        Some(Stmt { kind, pos })
    }

    fn empty_statement(&mut self) -> Option<Stmt> {
        // A stray `;` is skipped by parsing the next statement in its place.
        self.advance();
        if self.cur_is(TokenKind::RBrace) || self.cur_is(TokenKind::Eof) {
            return None;
        }
        self.parse_statement()
    }

    fn parse_return(&mut self) -> Option<StmtKind> {
        let line = self.cur.pos.line;
        let bare = matches!(
            self.peek.kind,
            TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof
        ) || self.peek.pos.line != line;
        if bare {
            self.skip_semicolon();
            return Some(StmtKind::Return(None));
        }
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.skip_semicolon();
        Some(StmtKind::Return(Some(value)))
    }

    fn parse_if(&mut self) -> Option<StmtKind> {
        self.advance();
        let condition = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let then_body = self.parse_block()?;

        let else_body = if self.peek_is(TokenKind::Else) {
            self.advance();
            if self.peek_is(TokenKind::If) {
                self.advance();
                let pos = self.cur.pos;
                let nested = self.parse_if()?;
                Some(vec![Stmt { kind: nested, pos }])
            } else {
                if !self.expect_peek(TokenKind::LBrace) {
                    return None;
                }
                Some(self.parse_block()?)
            }
        } else {
            None
        };

        Some(StmtKind::If {
            condition,
            then_body,
            else_body,
        })
    }

    /// An expression followed by `=` becomes an assignment to that expression.
    fn parse_expression_statement(&mut self) -> Option<StmtKind> {
        let expr = self.parse_expression(Precedence::Lowest)?;
        if !self.peek_is(TokenKind::Assign) {
            self.skip_semicolon();
            return Some(StmtKind::Expr(expr));
        }

        if !matches!(expr.kind, ExprKind::Ident(_) | ExprKind::Member { .. }) {
            self.errors.push(CompileError::parser("invalid assignment target", expr.pos));
            return None;
        }
        self.advance();
        self.advance();
        let value = self.parse_expression(Precedence::Lowest)?;
        self.skip_semicolon();
        Some(StmtKind::Assign {
            target: expr,
            value,
        })
    }

    fn skip_semicolon(&mut self) {
        if self.peek_is(TokenKind::Semicolon) {
            self.advance();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;

    fn parse_str(s: &str) -> ParseResult {
        let result = parse(s, 0);
        assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.diagnostics());
        result
    }

    fn body(s: &str) -> Vec<Stmt> {
        let mut result = parse_str(&format!("func main() {{\n{s}\n}}"));
        result.funcs.remove(0).body
    }

    #[test]
    fn parse_imports_all_forms() {
        let result = parse_str(
            "import { Card, Badge } from \"./ui.loom\"\nimport \"strings\" as str\nimport Layout from \"./layout.loom\"",
        );
        assert_eq!(result.imports.len(), 3);
        assert_eq!(
            result.imports[0].kind,
            ImportKind::Members {
                names: vec!["Card".into(), "Badge".into()],
                path: "./ui.loom".into(),
            }
        );
        assert_eq!(
            result.imports[1].kind,
            ImportKind::Native {
                path: "strings".into(),
                alias: "str".into(),
            }
        );
        assert_eq!(
            result.imports[2].kind,
            ImportKind::Default {
                name: "Layout".into(),
                path: "./layout.loom".into(),
            }
        );
    }

    #[test]
    fn empty_member_import() {
        let result = parse_str("import {} from \"x\"");
        assert!(matches!(result.imports[0].kind, ImportKind::Members { ref names, .. } if names.is_empty()));
    }

    #[test]
    fn import_missing_from_is_reported() {
        let result = parse("import Layout \"./layout.loom\"", 0);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("'from'"));
        assert!(result.imports.is_empty());
    }

    #[test]
    fn import_missing_alias_is_reported() {
        let result = parse("import \"strings\" as", 0);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("expected identifier"));
    }

    #[test]
    fn import_unbalanced_braces_is_reported() {
        let result = parse("import { A, B from \"x\"\nfunc f() {}", 0);
        assert!(!result.errors.is_empty());
        assert_eq!(result.funcs.len(), 1);
    }

    #[test]
    fn import_after_declaration_is_an_error_but_parsing_continues() {
        let result = parse("let a = 1\nimport X from \"x\"\nfunc f() {}", 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].to_string(), "line 2: imports must come before all other declarations");
        assert!(result.imports.is_empty());
        assert_eq!(result.vars.len(), 1);
        assert_eq!(result.funcs.len(), 1);
    }

    #[test]
    fn malformed_import_then_valid_function() {
        let result = parse("import { Card from\nfunc show(id: uuid) {\n  render(id)\n}", 0);
        assert!(!result.errors.is_empty());
        assert_eq!(result.funcs.len(), 1);
        assert_eq!(result.funcs[0].name, "show");
        assert_eq!(result.funcs[0].line, 2);
    }

    #[test]
    fn parse_models_and_services_through_sub_parser() {
        let result = parse_str(
            "model Post { id: uuid\n title: text }\nservice Mail { send(to: text) }\nfunc f() { let p = Post{title: \"x\"} }",
        );
        assert_eq!(result.models.len(), 1);
        assert_eq!(result.models[0].fields.len(), 2);
        assert_eq!(result.services.len(), 1);
        assert_eq!(result.funcs.len(), 1);
        assert_eq!(result.model_names().collect::<Vec<_>>(), vec!["Post"]);
    }

    #[test]
    fn sub_parser_errors_are_merged() {
        let result = parse("model Post { id uuid }\nfunc f() {}", 0);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("expected ':'"));
        assert_eq!(result.funcs.len(), 1);
    }

    #[test]
    fn parse_top_level_vars() {
        let result = parse_str("const greeting = \"hi\"\nlet limit: int = 10;");
        assert_eq!(result.vars.len(), 2);
        assert!(result.vars[0].is_const);
        assert_eq!(result.vars[0].ty, "");
        assert!(!result.vars[1].is_const);
        assert_eq!(result.vars[1].ty, "int");
    }

    #[test]
    fn parse_func_signature() {
        let result = parse_str("func add(a: int, b: int) -> int {\n  return a + b\n}");
        let f = &result.funcs[0];
        assert_eq!(f.name, "add");
        assert_eq!(f.params, vec![
            Param { name: "a".into(), ty: "int".into() },
            Param { name: "b".into(), ty: "int".into() },
        ]);
        assert_eq!(f.return_type, "int");
        assert_eq!(f.body.len(), 1);
        assert_eq!(f.line, 1);
    }

    #[test]
    fn omitted_return_type_is_empty() {
        let result = parse_str("func f() {}");
        assert_eq!(result.funcs[0].return_type, "");
        assert!(result.funcs[0].body.is_empty());
    }

    #[test]
    fn line_offset_shifts_positions() {
        let result = parse("\nfunc f() {\n  x = 1\n}", 20);
        assert_eq!(result.funcs[0].line, 22);
        assert_eq!(result.funcs[0].body[0].pos.line, 23);
    }

    #[test]
    fn expression_followed_by_assign_is_assignment() {
        let stmts = body("post.title = \"x\"");
        match &stmts[0].kind {
            StmtKind::Assign { target, value } => {
                assert!(matches!(target.kind, ExprKind::Member { ref property, .. } if property == "title"));
                assert!(matches!(value.kind, ExprKind::StrLit { .. }));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn invalid_assignment_target() {
        let result = parse("func f() {\n  1 = 2\n}", 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "invalid assignment target");
    }

    #[test]
    fn bare_return_and_return_value() {
        let stmts = body("if x {\n  return\n}\nreturn 1");
        match &stmts[0].kind {
            StmtKind::If { then_body, .. } => {
                assert_eq!(then_body[0].kind, StmtKind::Return(None));
            }
            other => panic!("expected if, got {other:?}"),
        }
        assert!(matches!(stmts[1].kind, StmtKind::Return(Some(_))));
    }

    #[test]
    fn return_on_its_own_line_takes_no_value() {
        let stmts = body("return\nfoo()");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].kind, StmtKind::Return(None));
    }

    #[test]
    fn if_else_if_chain() {
        let stmts = body("if a { x = 1 } else if b { x = 2 } else { x = 3 }");
        assert_eq!(stmts.len(), 1);
        let StmtKind::If { else_body: Some(else_body), .. } = &stmts[0].kind else {
            panic!("expected if/else");
        };
        assert_eq!(else_body.len(), 1);
        assert!(matches!(
            else_body[0].kind,
            StmtKind::If { else_body: Some(_), .. }
        ));
    }

    #[test]
    fn semicolons_separate_statements() {
        let stmts = body("let a = 1; let b = 2;; a = b");
        assert_eq!(stmts.len(), 3);
    }

    #[test]
    fn broken_statement_recovers_at_next_line() {
        let result = parse("func f() {\n  let = 1\n  let y = 2\n}\nfunc g() {}", 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].pos.line, 2);
        assert_eq!(result.funcs.len(), 2);
        assert_eq!(result.funcs[0].body.len(), 1);
    }

    #[test]
    fn missing_closing_brace_reports_eof() {
        let result = parse("func f() {\n  let y = 2\n", 0);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("end of input"));
        assert!(result.funcs.is_empty());
    }

    #[test]
    fn lexer_errors_surface_as_diagnostics() {
        let result = parse("func f() {\n  let s = \"open\n}\nfunc g() {}", 0);
        assert!(result.errors.iter().any(|e| e.message == "unterminated string literal"));
        assert!(result.funcs.iter().any(|f| f.name == "g"));
    }

    #[test]
    fn garbage_at_top_level_is_skipped() {
        let result = parse("x y z\nfunc f() {}", 0);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.funcs.len(), 1);
    }
}
