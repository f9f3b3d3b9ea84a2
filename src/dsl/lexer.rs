use std::fmt;

use serde::Serialize;

use super::ast::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    // Literals
    Ident,
    Int,
    Float,
    String,

    // Keywords
    Import,
    Model,
    Service,
    Let,
    Const,
    Func,
    Return,
    If,
    Else,
    True,
    False,
    Try,
    Render,
    Error,
    Ctx,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Arrow,    // ->
    Question, // ?

    // Operators
    Assign, // =
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And, // &&
    Or,  // ||

    /// Lexical error; the literal carries the message.
    Illegal,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Ident => "identifier",
            TokenKind::Int => "integer",
            TokenKind::Float => "float",
            TokenKind::String => "string",
            TokenKind::Import => "'import'",
            TokenKind::Model => "'model'",
            TokenKind::Service => "'service'",
            TokenKind::Let => "'let'",
            TokenKind::Const => "'const'",
            TokenKind::Func => "'func'",
            TokenKind::Return => "'return'",
            TokenKind::If => "'if'",
            TokenKind::Else => "'else'",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::Try => "'try'",
            TokenKind::Render => "'render'",
            TokenKind::Error => "'error'",
            TokenKind::Ctx => "'ctx'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::Comma => "','",
            TokenKind::Dot => "'.'",
            TokenKind::Colon => "':'",
            TokenKind::Semicolon => "';'",
            TokenKind::Arrow => "'->'",
            TokenKind::Question => "'?'",
            TokenKind::Assign => "'='",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Bang => "'!'",
            TokenKind::EqEq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Le => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::Ge => "'>='",
            TokenKind::And => "'&&'",
            TokenKind::Or => "'||'",
            TokenKind::Illegal => "invalid token",
            TokenKind::Eof => "end of input",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
    pub pos: Position,
}

impl Token {
    pub fn new(kind: TokenKind, literal: impl Into<String>, pos: Position) -> Self {
        Self {
            kind,
            literal: literal.into(),
            pos,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

/// Map identifier text to its keyword token kind, or `Ident` if it is not
/// reserved. `from` and `as` are deliberately absent: the import grammar
/// matches them by text.
pub fn lookup_ident(word: &str) -> TokenKind {
    match word {
        "import" => TokenKind::Import,
        "model" => TokenKind::Model,
        "service" => TokenKind::Service,
        "let" => TokenKind::Let,
        "const" => TokenKind::Const,
        "func" => TokenKind::Func,
        "return" => TokenKind::Return,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "try" => TokenKind::Try,
        "render" => TokenKind::Render,
        "error" => TokenKind::Error,
        "ctx" => TokenKind::Ctx,
        _ => TokenKind::Ident,
    }
}

/// Tokenize a whole source string, including the trailing `Eof`.
pub fn lex(source: &str) -> Vec<Token> {
    lex_from(source, 0)
}

/// Like [`lex`], with positions shifted by `line_offset` lines.
pub fn lex_from(source: &str, line_offset: usize) -> Vec<Token> {
    let mut lexer = Lexer::new(source, line_offset);
    let mut tokens = Vec::new();
    loop {
        let tok = lexer.next_token();
        let done = tok.is(TokenKind::Eof);
        tokens.push(tok);
        if done {
            return tokens;
        }
    }
}

/// Pull-based tokenizer. Never aborts: bad input yields `Illegal` tokens and
/// the end of input yields `Eof` forever.
pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    /// `line_offset` is the number of lines that precede `source` in its
    /// enclosing file.
    pub fn new(source: &'a str, line_offset: usize) -> Self {
        Self::at(source, Position::new(line_offset + 1, 1))
    }

    /// Lex `source` as if it started at `start` in the enclosing file.
    pub fn at(source: &'a str, start: Position) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: start.line,
            column: start.column,
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace_and_comments();

        let start_pos = self.position();
        let start = self.pos;
        let Some(ch) = self.peek() else {
            return Token::new(TokenKind::Eof, "", start_pos);
        };

        let kind = match ch {
            b'(' => self.single(TokenKind::LParen),
            b')' => self.single(TokenKind::RParen),
            b'{' => self.single(TokenKind::LBrace),
            b'}' => self.single(TokenKind::RBrace),
            b',' => self.single(TokenKind::Comma),
            b'.' => self.single(TokenKind::Dot),
            b':' => self.single(TokenKind::Colon),
            b';' => self.single(TokenKind::Semicolon),
            b'?' => self.single(TokenKind::Question),
            b'+' => self.single(TokenKind::Plus),
            b'*' => self.single(TokenKind::Star),
            b'/' => self.single(TokenKind::Slash),
            b'%' => self.single(TokenKind::Percent),
            b'-' => self.one_or_two(b'>', TokenKind::Minus, TokenKind::Arrow),
            b'=' => self.one_or_two(b'=', TokenKind::Assign, TokenKind::EqEq),
            b'!' => self.one_or_two(b'=', TokenKind::Bang, TokenKind::NotEq),
            b'<' => self.one_or_two(b'=', TokenKind::Lt, TokenKind::Le),
            b'>' => self.one_or_two(b'=', TokenKind::Gt, TokenKind::Ge),
            b'&' => self.doubled(b'&', TokenKind::And),
            b'|' => self.doubled(b'|', TokenKind::Or),
            b'"' => return self.lex_string(start_pos),
            b'0'..=b'9' => self.lex_number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_ident(),
            _ => {
                let ch = self.source.get(self.pos..).and_then(|s| s.chars().next()).unwrap_or('?');
                for _ in 0..ch.len_utf8() {
                    self.bump();
                }
                return Token::new(
                    TokenKind::Illegal,
                    format!("unexpected character '{ch}'"),
                    start_pos,
                );
            }
        };

        if kind == TokenKind::Illegal {
            let text = self.source.get(start..self.pos).unwrap_or_default();
            return Token::new(kind, format!("unexpected character '{text}'"), start_pos);
        }

        let literal = self.source.get(start..self.pos).unwrap_or_default();
        Token::new(kind, literal, start_pos)
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    /// Advance one byte, keeping line and column in step. UTF-8 continuation
    /// bytes do not advance the column.
    fn bump(&mut self) {
        let Some(b) = self.peek() else { return };
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if b & 0xC0 != 0x80 {
            self.column += 1;
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.bump();
        kind
    }

    fn one_or_two(&mut self, second: u8, one: TokenKind, two: TokenKind) -> TokenKind {
        self.bump();
        if self.peek() == Some(second) {
            self.bump();
            two
        } else {
            one
        }
    }

    fn doubled(&mut self, ch: u8, kind: TokenKind) -> TokenKind {
        self.bump();
        if self.peek() == Some(ch) {
            self.bump();
            kind
        } else {
            TokenKind::Illegal
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(b) = self.peek() {
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => self.bump(),
                b'/' if self.peek_at(1) == Some(b'/') => {
                    while self.peek().is_some_and(|b| b != b'\n') {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    /// Capture a string literal verbatim. Braces are counted so a quote inside
    /// an interpolation span (`"{f("x")}"`) does not end the literal; escape
    /// sequences are kept as written.
    fn lex_string(&mut self, start_pos: Position) -> Token {
        self.bump(); // opening quote
        let body_start = self.pos;
        let mut depth = 0usize;
        loop {
            match self.peek() {
                None | Some(b'\n') => {
                    return Token::new(TokenKind::Illegal, "unterminated string literal", start_pos);
                }
                Some(b'\\') => {
                    self.bump();
                    if self.peek().is_some_and(|b| b != b'\n') {
                        self.bump();
                    }
                }
                Some(b'{') => {
                    depth += 1;
                    self.bump();
                }
                Some(b'}') => {
                    depth = depth.saturating_sub(1);
                    self.bump();
                }
                Some(b'"') if depth == 0 => break,
                Some(b'"') => {
                    // Nested string inside an interpolation span.
                    self.bump();
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                        if b == b'\\' {
                            self.bump();
                        } else if b == b'"' {
                            break;
                        }
                    }
                }
                Some(_) => self.bump(),
            }
        }
        let body = self.source.get(body_start..self.pos).unwrap_or_default().to_string();
        self.bump(); // closing quote
        Token::new(TokenKind::String, body, start_pos)
    }

    fn lex_number(&mut self) -> TokenKind {
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            self.bump();
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.bump();
            }
            TokenKind::Float
        } else {
            TokenKind::Int
        }
    }

    fn lex_ident(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') {
            self.bump();
        }
        lookup_ident(self.source.get(start..self.pos).unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn kinds(s: &str) -> Vec<TokenKind> {
        lex(s).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_tokens() {
        assert_eq!(
            kinds("1 + 2.5"),
            vec![TokenKind::Int, TokenKind::Plus, TokenKind::Float, TokenKind::Eof]
        );
    }

    #[test]
    fn keywords() {
        assert_eq!(
            kinds("import model service let const func return if else"),
            vec![
                TokenKind::Import, TokenKind::Model, TokenKind::Service, TokenKind::Let,
                TokenKind::Const, TokenKind::Func, TokenKind::Return, TokenKind::If,
                TokenKind::Else, TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("true false try render error ctx"),
            vec![
                TokenKind::True, TokenKind::False, TokenKind::Try, TokenKind::Render,
                TokenKind::Error, TokenKind::Ctx, TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn contextual_keywords_are_identifiers() {
        let tokens = lex("from as");
        assert_eq!(tokens[0].kind, TokenKind::Ident);
        assert_eq!(tokens[0].literal, "from");
        assert_eq!(tokens[1].kind, TokenKind::Ident);
        assert_eq!(tokens[1].literal, "as");
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("= == != < <= > >= && || ! -> - * / %"),
            vec![
                TokenKind::Assign, TokenKind::EqEq, TokenKind::NotEq, TokenKind::Lt,
                TokenKind::Le, TokenKind::Gt, TokenKind::Ge, TokenKind::And, TokenKind::Or,
                TokenKind::Bang, TokenKind::Arrow, TokenKind::Minus, TokenKind::Star,
                TokenKind::Slash, TokenKind::Percent, TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let tokens = lex("let x\n  = 42");
        assert_eq!(tokens[0].pos, Position::new(1, 1));
        assert_eq!(tokens[1].pos, Position::new(1, 5));
        assert_eq!(tokens[2].pos, Position::new(2, 3));
        assert_eq!(tokens[3].pos, Position::new(2, 5));
        assert_eq!(tokens[3].literal, "42");
    }

    #[test]
    fn line_offset_is_applied() {
        let mut lexer = Lexer::new("\nfoo", 10);
        let tok = lexer.next_token();
        assert_eq!(tok.pos.line, 12);
    }

    #[test]
    fn string_keeps_interpolation_verbatim() {
        let tokens = lex(r#""Hello {name}!""#);
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].literal, "Hello {name}!");
    }

    #[test]
    fn quotes_inside_interpolation_do_not_end_string() {
        let tokens = lex(r#""a {f("x")} b" c"#);
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].literal, r#"a {f("x")} b"#);
        assert_eq!(tokens[1].kind, TokenKind::Ident);
    }

    #[test]
    fn escapes_are_kept_raw() {
        let tokens = lex(r#""say \"hi\" \{x\}""#);
        assert_eq!(tokens[0].literal, r#"say \"hi\" \{x\}"#);
    }

    #[test]
    fn unterminated_string_is_illegal() {
        let tokens = lex("\"abc\nlet");
        assert_eq!(tokens[0].kind, TokenKind::Illegal);
        assert_eq!(tokens[0].literal, "unterminated string literal");
        // Lexing continues after the error.
        assert_eq!(tokens[1].kind, TokenKind::Let);
    }

    #[test]
    fn unknown_character_is_illegal_and_lexing_continues() {
        let tokens = lex("a # b");
        assert_eq!(tokens[1].kind, TokenKind::Illegal);
        assert_eq!(tokens[1].literal, "unexpected character '#'");
        assert_eq!(tokens[2].kind, TokenKind::Ident);
    }

    #[test]
    fn single_ampersand_is_illegal() {
        let tokens = lex("a & b");
        assert_eq!(tokens[1].kind, TokenKind::Illegal);
    }

    #[test]
    fn comments_stripped() {
        assert_eq!(
            kinds("x // comment\ny"),
            vec![TokenKind::Ident, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn eof_is_permanent() {
        let mut lexer = Lexer::new("x", 0);
        lexer.next_token();
        assert!(lexer.next_token().is(TokenKind::Eof));
        assert!(lexer.next_token().is(TokenKind::Eof));
    }

    #[test]
    fn unicode_in_strings_counts_columns_by_char() {
        let tokens = lex("\"héllo\" x");
        assert_eq!(tokens[0].literal, "héllo");
        assert_eq!(tokens[1].pos, Position::new(1, 9));
    }
}
