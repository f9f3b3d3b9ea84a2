//! Sub-parser for `model` and `service` declarations.
//!
//! It runs on the declaration parser's lexer and token window: construct it
//! from the current/peek tokens, run one declaration, then copy
//! [`SchemaParser::cur_token`], [`SchemaParser::peek_token`] and
//! [`SchemaParser::errors`] back before resuming.

use super::ast::{FieldDecl, ModelDecl, ServiceDecl, ServiceMethod};
use super::cursor::TokenCursor;
use super::error::CompileError;
use super::lexer::{Lexer, Token, TokenKind};

pub struct SchemaParser<'l, 'a> {
    lexer: &'l mut Lexer<'a>,
    cur: Token,
    peek: Token,
    errors: Vec<CompileError>,
}

impl TokenCursor for SchemaParser<'_, '_> {
    fn cur(&self) -> &Token {
        &self.cur
    }

    fn peek(&self) -> &Token {
        &self.peek
    }

    fn advance(&mut self) {
        let next = self.lexer.next_token();
        if next.is(TokenKind::Illegal) {
            self.errors.push(CompileError::lexer(next.literal.clone(), next.pos));
        }
        self.cur = std::mem::replace(&mut self.peek, next);
    }

    fn report(&mut self, error: CompileError) {
        self.errors.push(error);
    }
}

impl<'l, 'a> SchemaParser<'l, 'a> {
    pub fn new(lexer: &'l mut Lexer<'a>, cur: Token, peek: Token) -> Self {
        Self {
            lexer,
            cur,
            peek,
            errors: Vec::new(),
        }
    }

    pub fn cur_token(&self) -> &Token {
        &self.cur
    }

    pub fn peek_token(&self) -> &Token {
        &self.peek
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    /// `model Name { field: Type[?] ... }`. Cursor starts on `model` and ends
    /// on the closing brace.
    pub fn parse_model(&mut self) -> Option<ModelDecl> {
        let pos = self.cur.pos;
        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        let name = self.cur.literal.clone();
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }

        let mut fields: Vec<FieldDecl> = Vec::new();
        while self.next_member() {
            if !self.expect_peek(TokenKind::Ident) {
                return None;
            }
            let field_pos = self.cur.pos;
            let field_name = self.cur.literal.clone();
            if !self.expect_peek(TokenKind::Colon) {
                return None;
            }
            let ty = self.parse_type_name()?;
            let optional = self.peek_is(TokenKind::Question);
            if optional {
                self.advance();
            }
            if fields.iter().any(|f| f.name == field_name) {
                self.errors.push(CompileError::parser(
                    format!("duplicate field '{field_name}' in model '{name}'"),
                    field_pos,
                ));
                continue;
            }
            fields.push(FieldDecl {
                name: field_name,
                ty,
                optional,
                pos: field_pos,
            });
        }
        if !self.cur_is(TokenKind::RBrace) {
            return None;
        }

        Some(ModelDecl { name, fields, pos })
    }

    /// `service Name { method(p: T) [-> R] ... }`
    pub fn parse_service(&mut self) -> Option<ServiceDecl> {
        let pos = self.cur.pos;
        if !self.expect_peek(TokenKind::Ident) {
            return None;
        }
        let name = self.cur.literal.clone();
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }

        let mut methods = Vec::new();
        while self.next_member() {
            if !self.expect_peek(TokenKind::Ident) {
                return None;
            }
            let method_pos = self.cur.pos;
            let method_name = self.cur.literal.clone();
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
            methods.push(ServiceMethod {
                name: method_name,
                params,
                return_type,
                pos: method_pos,
            });
        }
        if !self.cur_is(TokenKind::RBrace) {
            return None;
        }

        Some(ServiceDecl { name, methods, pos })
    }

    /// Skip member separators. Returns false once the closing brace has been
    /// consumed or input ran out.
    fn next_member(&mut self) -> bool {
        while self.peek_is(TokenKind::Comma) || self.peek_is(TokenKind::Semicolon) {
            self.advance();
        }
        if self.peek_is(TokenKind::RBrace) {
            self.advance();
            return false;
        }
        if self.peek_is(TokenKind::Eof) {
            let pos = self.peek.pos;
            self.errors.push(CompileError::parser("expected '}', got end of input", pos));
            return false;
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn with_parser<T>(src: &str, f: impl FnOnce(&mut SchemaParser<'_, '_>) -> T) -> (T, Token, Vec<CompileError>) {
        let mut lexer = Lexer::new(src, 0);
        let cur = lexer.next_token();
        let peek = lexer.next_token();
        let mut sub = SchemaParser::new(&mut lexer, cur, peek);
        let out = f(&mut sub);
        (out, sub.peek_token().clone(), sub.errors().to_vec())
    }

    #[test]
    fn parses_model_fields() {
        let (model, peek, errors) = with_parser(
            "model Post {\n  id: uuid\n  title: text,\n  body: text?\n} func",
            |p| p.parse_model(),
        );
        assert!(errors.is_empty(), "{errors:?}");
        let model = model.unwrap();
        assert_eq!(model.name, "Post");
        assert_eq!(model.fields.len(), 3);
        assert_eq!(model.fields[2].name, "body");
        assert!(model.fields[2].optional);
        assert!(!model.fields[0].optional);
        // The cursor stops on the closing brace, leaving the next declaration in peek.
        assert_eq!(peek.kind, TokenKind::Func);
    }

    #[test]
    fn parses_service_methods() {
        let (service, _, errors) = with_parser(
            "service Mailer { send(to: text, body: text) -> error; ping() }",
            |p| p.parse_service(),
        );
        assert!(errors.is_empty(), "{errors:?}");
        let service = service.unwrap();
        assert_eq!(service.methods.len(), 2);
        assert_eq!(service.methods[0].params.len(), 2);
        assert_eq!(service.methods[0].return_type, "error");
        assert_eq!(service.methods[1].return_type, "");
    }

    #[test]
    fn duplicate_field_is_reported() {
        let (model, _, errors) = with_parser("model A { x: int x: text }", |p| p.parse_model());
        assert!(model.is_some());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("duplicate field 'x'"));
    }

    #[test]
    fn missing_brace_is_reported() {
        let (model, _, errors) = with_parser("model A x: int", |p| p.parse_model());
        assert!(model.is_none());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].pos.line, 1);
    }
}
