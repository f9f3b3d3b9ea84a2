//! Two-token lookahead window shared by the declaration parser and the
//! schema sub-parser.

use super::ast::Param;
use super::error::CompileError;
use super::lexer::{Token, TokenKind};

pub(crate) trait TokenCursor {
    fn cur(&self) -> &Token;
    fn peek(&self) -> &Token;
    /// Shift the window by one token.
    fn advance(&mut self);
    fn report(&mut self, error: CompileError);

    fn cur_is(&self, kind: TokenKind) -> bool {
        self.cur().is(kind)
    }

    fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek().is(kind)
    }

    /// Advance if the next token has the expected kind, otherwise report a
    /// positioned error and leave the window untouched.
    fn expect_peek(&mut self, kind: TokenKind) -> bool {
        if self.peek_is(kind) {
            self.advance();
            true
        } else {
            let got = self.peek().clone();
            self.unexpected(&got, &kind.to_string());
            false
        }
    }

    /// Contextual keywords (`from`, `as`) are plain identifiers compared by
    /// text.
    fn expect_contextual(&mut self, word: &str) -> bool {
        if self.peek_is(TokenKind::Ident) && self.peek().literal == word {
            self.advance();
            true
        } else {
            let got = self.peek().clone();
            self.unexpected(&got, &format!("'{word}'"));
            false
        }
    }

    /// Report `expected X, got Y`. Illegal tokens were already reported as
    /// lexer errors when they entered the window.
    fn unexpected(&mut self, got: &Token, expected: &str) {
        if got.is(TokenKind::Illegal) {
            return;
        }
        let found = describe(got);
        self.report(CompileError::parser(
            format!("expected {expected}, got {found}"),
            got.pos,
        ));
    }

    /// Parse a type name in peek position. `error` is a keyword but is a valid
    /// type.
    fn parse_type_name(&mut self) -> Option<String> {
        if self.peek_is(TokenKind::Ident) || self.peek_is(TokenKind::Error) {
            self.advance();
            Some(self.cur().literal.clone())
        } else {
            let got = self.peek().clone();
            self.unexpected(&got, "type name");
            None
        }
    }

    /// `(a: T, b: U)` with the cursor on `(`; leaves the cursor on `)`.
    fn parse_params(&mut self) -> Option<Vec<Param>> {
        let mut params = Vec::new();
        if self.peek_is(TokenKind::RParen) {
            self.advance();
            return Some(params);
        }
        loop {
            if !self.expect_peek(TokenKind::Ident) {
                return None;
            }
            let name = self.cur().literal.clone();
            if !self.expect_peek(TokenKind::Colon) {
                return None;
            }
            let ty = self.parse_type_name()?;
            params.push(Param { name, ty });
            if self.peek_is(TokenKind::Comma) {
                self.advance();
                continue;
            }
            if !self.expect_peek(TokenKind::RParen) {
                return None;
            }
            return Some(params);
        }
    }
}

pub(crate) fn describe(tok: &Token) -> String {
    match tok.kind {
        TokenKind::Ident | TokenKind::Int | TokenKind::Float => {
            format!("{} '{}'", tok.kind, tok.literal)
        }
        TokenKind::String => format!("string \"{}\"", tok.literal),
        kind => kind.to_string(),
    }
}
