use serde::Serialize;
use ts_rs::TS;

use super::ast::Position;

/// A compilation diagnostic with source location.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
pub struct CompileError {
    pub message: String,
    pub pos: Position,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ErrorKind {
    Lexer,
    Parser,
    Lowering,
}

impl CompileError {
    pub fn lexer(message: impl Into<String>, pos: Position) -> Self {
        Self {
            message: message.into(),
            pos,
            kind: ErrorKind::Lexer,
        }
    }

    pub fn parser(message: impl Into<String>, pos: Position) -> Self {
        Self {
            message: message.into(),
            pos,
            kind: ErrorKind::Parser,
        }
    }

    pub fn lowering(message: impl Into<String>, pos: Position) -> Self {
        Self {
            message: message.into(),
            pos,
            kind: ErrorKind::Lowering,
        }
    }

    /// Format the error with its phase and column, e.g. `[parser] line 3:7: ...`.
    pub fn format_detailed(&self) -> String {
        format!(
            "[{}] line {}:{}: {}",
            match self.kind {
                ErrorKind::Lexer => "lexer",
                ErrorKind::Parser => "parser",
                ErrorKind::Lowering => "lowering",
            },
            self.pos.line,
            self.pos.column,
            self.message,
        )
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.pos.line, self.message)
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_line_prefix() {
        let e = CompileError::parser("expected '}'", Position::new(12, 4));
        assert_eq!(e.to_string(), "line 12: expected '}'");
        assert_eq!(e.format_detailed(), "[parser] line 12:4: expected '}'");
    }
}
