//! AST node types for Loom scripts.

use indexmap::IndexMap;
use serde::Serialize;
use ts_rs::TS;

/// Source position for diagnostics and source mapping. Lines are absolute
/// (they already include the caller's line offset); columns start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, TS)]
#[ts(export)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Everything parsed out of one script unit.
#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub imports: Vec<ImportDecl>,
    pub models: Vec<ModelDecl>,
    pub services: Vec<ServiceDecl>,
    pub vars: Vec<VarDecl>,
    pub funcs: Vec<FuncDecl>,
    pub errors: Vec<super::error::CompileError>,
}

impl ParseResult {
    /// Diagnostics rendered as `line N: message` strings.
    pub fn diagnostics(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.name.as_str())
    }
}

// ── Declarations ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub kind: ImportKind,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportKind {
    /// `import { A, B } from "path"`
    Members { names: Vec<String>, path: String },
    /// `import "pkg" as alias`
    Native { path: String, alias: String },
    /// `import Name from "path"`
    Default { name: String, path: String },
}

/// `model Post { title: text, body: text? }`
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: String,
    pub optional: bool,
    pub pos: Position,
}

/// `service Mailer { send(to: text) -> error }`
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDecl {
    pub name: String,
    pub methods: Vec<ServiceMethod>,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceMethod {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: String,
    pub pos: Position,
}

/// `let x: int = 1` / `const y = "a"`
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    /// Empty when the type is inferred from the initializer.
    pub ty: String,
    pub value: Expr,
    pub is_const: bool,
    pub pos: Position,
}

/// `func name(a: T) -> R { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<Param>,
    /// Empty means the function returns only an error.
    pub return_type: String,
    pub body: Vec<Stmt>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: String,
}

// ── Statements ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Let(VarDecl),
    Assign { target: Expr, value: Expr },
    Return(Option<Expr>),
    If {
        condition: Expr,
        then_body: Vec<Stmt>,
        /// `else if` chains are stored as a single nested `If` statement.
        else_body: Option<Vec<Stmt>>,
    },
    Expr(Expr),
}

// ── Expressions ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Position,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Position) -> Self {
        Self { kind, pos }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Ident(String),
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    /// `value` holds the unescaped text; `parts` is non-empty only when the
    /// literal contained interpolation spans.
    StrLit { value: String, parts: Vec<StringPart> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Member { object: Box<Expr>, property: String },
    Try(Box<Expr>),
    Render(Vec<Expr>),
    ErrorCtor(Box<Expr>),
    /// `ctx.tenant`, `ctx.user`, ...
    Context(String),
    StructLit { name: String, fields: IndexMap<String, Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StringPart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}
