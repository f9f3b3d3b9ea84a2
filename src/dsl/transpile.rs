//! Lowering pass: Loom AST → Go source text plus a source map.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::Serialize;
use ts_rs::TS;

use super::ast::*;
use super::error::CompileError;

/// One generated line traced back to the script line it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct SourceMapEntry {
    pub generated_line: usize,
    pub original_line: usize,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct TranspileOutput {
    pub code: String,
    pub source_map: Vec<SourceMapEntry>,
    /// Non-empty only if some construct could not be lowered; callers treat
    /// this as fatal.
    pub errors: Vec<CompileError>,
}

#[derive(Debug, Clone, Copy)]
pub struct LoweringOptions {
    /// Emit the shared store/context/render helpers before the functions.
    pub emit_prelude: bool,
}

impl Default for LoweringOptions {
    fn default() -> Self {
        Self { emit_prelude: true }
    }
}

/// Lower every top-level var and function of a parsed unit.
pub fn transpile(result: &ParseResult, models: &[String]) -> TranspileOutput {
    transpile_with(result, models, LoweringOptions::default())
}

pub fn transpile_with(result: &ParseResult, models: &[String], options: LoweringOptions) -> TranspileOutput {
    let mut t = Transpiler::new(models);
    t.register_functions(&result.funcs);
    if options.emit_prelude {
        t.emit_prelude();
    }
    for var in &result.vars {
        t.lower_global(var);
    }
    for func in &result.funcs {
        t.lower_function(func);
    }
    t.finish()
}

const PRELUDE: &[&str] = &[
    "// Store is the persistence handle shared by every generated accessor.",
    "type Store interface {",
    "\tFind(dst any, id string) error",
    "\tAll(dst any) error",
    "\tSave(src any) error",
    "\tDelete(src any) error",
    "}",
    "",
    "// FragmentRenderer renders a named template fragment.",
    "type FragmentRenderer interface {",
    "\tRender(w io.Writer, name string, data any) error",
    "}",
    "",
    "// RequestContext is the implicit first argument of every lowered function.",
    "type RequestContext struct {",
    "\tDB        Store",
    "\tTenantID  string",
    "\tUserID    string",
    "\tWriter    io.Writer",
    "\tFragments FragmentRenderer",
    "}",
    "",
    "func renderFragment(ctx *RequestContext, name string, data any) error {",
    "\treturn ctx.Fragments.Render(ctx.Writer, name, data)",
    "}",
    "",
];

/// State that lives for one function only.
#[derive(Debug, Default)]
struct FunctionScope {
    /// An `err` variable is visible at the current point.
    err_declared: bool,
    /// Local name → model type, from `M.find`/`M.all`/`M{...}` initializers.
    var_types: HashMap<String, String>,
    return_type: String,
}

pub struct Transpiler<'m> {
    out: String,
    /// Lines written so far.
    line: usize,
    indent: usize,
    models: &'m [String],
    /// Unit functions by name; `true` if they return a value besides the error.
    funcs: HashMap<String, bool>,
    source_map: Vec<SourceMapEntry>,
    errors: Vec<CompileError>,
    scope: FunctionScope,
}

impl<'m> Transpiler<'m> {
    pub fn new(models: &'m [String]) -> Self {
        Self {
            out: String::new(),
            line: 0,
            indent: 0,
            models,
            funcs: HashMap::new(),
            source_map: Vec::new(),
            errors: Vec::new(),
            scope: FunctionScope::default(),
        }
    }

    /// Make the unit's functions callable with the implicit context argument.
    pub fn register_functions(&mut self, funcs: &[FuncDecl]) {
        for f in funcs {
            self.funcs.insert(f.name.clone(), returns_value(&f.return_type));
        }
    }

    pub fn finish(self) -> TranspileOutput {
        TranspileOutput {
            code: self.out,
            source_map: self.source_map,
            errors: self.errors,
        }
    }

    // ── Output ────────────────────────────────────────────────────

    fn emit(&mut self, text: &str) {
        if !text.is_empty() {
            for _ in 0..self.indent {
                self.out.push('\t');
            }
        }
        self.out.push_str(text);
        self.out.push('\n');
        self.line += 1;
    }

    /// Correlate the next output line with a script line.
    fn mark(&mut self, original_line: usize) {
        self.source_map.push(SourceMapEntry {
            generated_line: self.line + 1,
            original_line,
        });
    }

    fn placeholder(&mut self, expr: &Expr, what: &str) -> String {
        log::warn!("line {}: cannot lower {what}", expr.pos.line);
        self.errors.push(CompileError::lowering(format!("cannot lower {what}"), expr.pos));
        format!("/* unsupported: {what} */")
    }

    // ── Shared helpers ────────────────────────────────────────────

    pub fn emit_prelude(&mut self) {
        for line in PRELUDE {
            self.emit(line);
        }
        let models = self.models;
        for m in models {
            self.emit_model_accessors(m);
        }
    }

    fn emit_model_accessors(&mut self, model: &str) {
        self.emit(&format!("func find{model}(db Store, id string) (*{model}, error) {{"));
        self.emit(&format!("\tm := &{model}{{}}"));
        self.emit("\tif err := db.Find(m, id); err != nil {");
        self.emit("\t\treturn nil, err");
        self.emit("\t}");
        self.emit("\treturn m, nil");
        self.emit("}");
        self.emit("");
        self.emit(&format!("func all{model}(db Store) ([]*{model}, error) {{"));
        self.emit(&format!("\tvar ms []*{model}"));
        self.emit("\tif err := db.All(&ms); err != nil {");
        self.emit("\t\treturn nil, err");
        self.emit("\t}");
        self.emit("\treturn ms, nil");
        self.emit("}");
        self.emit("");
        self.emit(&format!("func save{model}(db Store, m *{model}) error {{"));
        self.emit("\treturn db.Save(m)");
        self.emit("}");
        self.emit("");
        self.emit(&format!("func delete{model}(db Store, m *{model}) error {{"));
        self.emit("\treturn db.Delete(m)");
        self.emit("}");
        self.emit("");
    }

    // ── Types ─────────────────────────────────────────────────────

    fn is_model(&self, name: &str) -> bool {
        self.models.iter().any(|m| m == name)
    }

    fn map_type(&self, ty: &str) -> String {
        match ty {
            "uuid" | "id" | "text" | "string" => "string".to_string(),
            "int" => "int".to_string(),
            "float" => "float64".to_string(),
            "bool" => "bool".to_string(),
            "error" => "error".to_string(),
            m if self.is_model(m) => format!("*{m}"),
            other => other.to_string(),
        }
    }

    fn zero_value(&self, ty: &str) -> String {
        match ty {
            "uuid" | "id" | "text" | "string" => "\"\"".to_string(),
            "int" => "0".to_string(),
            "float" => "0.0".to_string(),
            "bool" => "false".to_string(),
            "error" | "" => "nil".to_string(),
            m if self.is_model(m) => "nil".to_string(),
            other => format!("*new({other})"),
        }
    }

    fn success_return(&self) -> String {
        let ty = &self.scope.return_type;
        if returns_value(ty) {
            format!("return {}, nil", self.zero_value(ty))
        } else {
            "return nil".to_string()
        }
    }

    fn error_return(&self, err: &str) -> String {
        let ty = &self.scope.return_type;
        if returns_value(ty) {
            format!("return {}, {err}", self.zero_value(ty))
        } else {
            format!("return {err}")
        }
    }

    /// `Model.find` / `Model.all` on a known model, as `(model, method)`.
    fn model_accessor<'e>(&self, expr: &'e Expr) -> Option<(&'e str, &'e str)> {
        let ExprKind::Call { callee, .. } = &expr.kind else {
            return None;
        };
        let ExprKind::Member { object, property } = &callee.kind else {
            return None;
        };
        let ExprKind::Ident(model) = &object.kind else {
            return None;
        };
        if self.is_model(model) && matches!(property.as_str(), "find" | "all") {
            Some((model, property))
        } else {
            None
        }
    }

    /// Model type a binding initialised from `expr` should be tracked as.
    fn trackable_type(&self, expr: &Expr) -> Option<String> {
        let expr = match &expr.kind {
            ExprKind::Try(inner) => inner,
            _ => expr,
        };
        if let Some((model, _)) = self.model_accessor(expr) {
            return Some(model.to_string());
        }
        match &expr.kind {
            ExprKind::StructLit { name, .. } if self.is_model(name) => Some(name.clone()),
            _ => None,
        }
    }

    /// Statically known Go type of a `let` value, used when the binding must
    /// be declared ahead of a plain assignment.
    fn static_value_type(&self, decl: &VarDecl, call: &Expr) -> Option<String> {
        if !decl.ty.is_empty() {
            return Some(self.map_type(&decl.ty));
        }
        match self.model_accessor(call)? {
            (model, "find") => Some(format!("*{model}")),
            (model, _) => Some(format!("[]*{model}")),
        }
    }

    /// True if a call is known to return only an error.
    fn returns_error_only(&self, expr: &Expr) -> bool {
        let ExprKind::Call { callee, .. } = &expr.kind else {
            return false;
        };
        match &callee.kind {
            ExprKind::Member { object, property } => match &object.kind {
                ExprKind::Ident(var) => {
                    matches!(property.as_str(), "save" | "delete")
                        && self.scope.var_types.contains_key(var)
                }
                _ => false,
            },
            ExprKind::Ident(name) => self.funcs.get(name).is_some_and(|value| !value),
            _ => false,
        }
    }

    // ── Declarations ──────────────────────────────────────────────

    pub fn lower_global(&mut self, decl: &VarDecl) {
        self.mark(decl.pos.line);
        let value = match &decl.value.kind {
            ExprKind::Try(_) => self.placeholder(&decl.value, "try in a top-level declaration"),
            _ => self.lower_expr(&decl.value),
        };
        let line = if decl.is_const && is_literal(&decl.value) {
            format!("const {} = {value}", decl.name)
        } else if decl.ty.is_empty() {
            format!("var {} = {value}", decl.name)
        } else {
            format!("var {} {} = {value}", decl.name, self.map_type(&decl.ty))
        };
        self.emit(&line);
        self.emit("");
    }

    pub fn lower_function(&mut self, func: &FuncDecl) {
        log::debug!("lowering func {} ({} statements)", func.name, func.body.len());
        self.scope = FunctionScope {
            return_type: func.return_type.clone(),
            ..FunctionScope::default()
        };

        let mut params = vec!["ctx *RequestContext".to_string()];
        params.extend(func.params.iter().map(|p| format!("{} {}", p.name, self.map_type(&p.ty))));
        let result = if returns_value(&func.return_type) {
            format!("({}, error)", self.map_type(&func.return_type))
        } else {
            "error".to_string()
        };

        self.mark(func.line);
        self.emit(&format!("func {}({}) {result} {{", func.name, params.join(", ")));
        self.indent += 1;
        for stmt in &func.body {
            self.lower_stmt(stmt);
        }
        if !matches!(func.body.last(), Some(Stmt { kind: StmtKind::Return(_), .. })) {
            let ret = self.success_return();
            self.emit(&ret);
        }
        self.indent -= 1;
        self.emit("}");
        self.emit("");
    }

    // ── Statements ────────────────────────────────────────────────

    fn lower_block(&mut self, stmts: &[Stmt]) {
        self.indent += 1;
        let err_declared = self.scope.err_declared;
        for stmt in stmts {
            self.lower_stmt(stmt);
        }
        self.scope.err_declared = err_declared;
        self.indent -= 1;
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        self.mark(stmt.pos.line);
        match &stmt.kind {
            StmtKind::Let(decl) => self.lower_let(decl),
            StmtKind::Assign { target, value } => {
                let target = self.lower_expr(target);
                let value = self.lower_expr(value);
                self.emit(&format!("{target} = {value}"));
            }
            StmtKind::Return(value) => self.lower_return(value.as_ref()),
            StmtKind::If {
                condition,
                then_body,
                else_body,
            } => self.lower_if(condition, then_body, else_body.as_deref(), ""),
            StmtKind::Expr(expr) => match &expr.kind {
                ExprKind::Try(inner) => self.lower_try_stmt(inner),
                ExprKind::Render(args) => self.lower_render(args),
                _ => {
                    let line = self.lower_expr(expr);
                    self.emit(&line);
                }
            },
        }
    }

    fn lower_let(&mut self, decl: &VarDecl) {
        let name = &decl.name;
        if let ExprKind::Try(inner) = &decl.value.kind {
            let call = self.lower_expr(inner);
            if !self.scope.err_declared {
                self.emit(&format!("{name}, err := {call}"));
                self.scope.err_declared = true;
            } else if let Some(ty) = self.static_value_type(decl, inner) {
                self.emit(&format!("var {name} {ty}"));
                self.emit(&format!("{name}, err = {call}"));
            } else {
                // `err` exists already; Go reuses it because `name` is new.
                self.emit(&format!("{name}, err := {call}"));
            }
            self.emit_error_check();
        } else {
            let value = self.lower_expr(&decl.value);
            if decl.is_const && is_literal(&decl.value) {
                self.emit(&format!("const {name} = {value}"));
            } else if decl.ty.is_empty() {
                self.emit(&format!("{name} := {value}"));
            } else {
                let ty = self.map_type(&decl.ty);
                self.emit(&format!("var {name} {ty} = {value}"));
            }
        }

        match self.trackable_type(&decl.value) {
            Some(model) => {
                self.scope.var_types.insert(name.clone(), model);
            }
            None => {
                self.scope.var_types.remove(name);
            }
        }
    }

    fn emit_error_check(&mut self) {
        self.emit("if err != nil {");
        let ret = self.error_return("err");
        self.indent += 1;
        self.emit(&ret);
        self.indent -= 1;
        self.emit("}");
    }

    /// `try call` on its own: check and propagate, drop the value.
    fn lower_try_stmt(&mut self, inner: &Expr) {
        let call = self.lower_expr(inner);
        let binding = if self.returns_error_only(inner) { "err" } else { "_, err" };
        self.emit(&format!("if {binding} := {call}; err != nil {{"));
        let ret = self.error_return("err");
        self.indent += 1;
        self.emit(&ret);
        self.indent -= 1;
        self.emit("}");
    }

    fn lower_render(&mut self, args: &[Expr]) {
        for arg in args {
            let target = self.render_target(arg);
            let value = self.lower_expr(arg);
            self.emit(&format!(
                "if err := renderFragment(ctx, {}, {value}); err != nil {{",
                go_quote(&target)
            ));
            let ret = self.error_return("err");
            self.indent += 1;
            self.emit(&ret);
            self.indent -= 1;
            self.emit("}");
        }
    }

    fn render_target(&self, arg: &Expr) -> String {
        match &arg.kind {
            ExprKind::Ident(name) => self
                .scope
                .var_types
                .get(name)
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string()),
            ExprKind::StructLit { name, .. } => name.clone(),
            _ => "Unknown".to_string(),
        }
    }

    fn lower_return(&mut self, value: Option<&Expr>) {
        let Some(value) = value else {
            let ret = self.success_return();
            self.emit(&ret);
            return;
        };
        let line = match &value.kind {
            ExprKind::Render(args) => {
                self.lower_render(args);
                self.success_return()
            }
            // A returned try propagates by itself.
            ExprKind::Try(inner) => format!("return {}", self.lower_expr(inner)),
            ExprKind::ErrorCtor(_) => {
                let err = self.lower_expr(value);
                self.error_return(&err)
            }
            _ => {
                let v = self.lower_expr(value);
                if returns_value(&self.scope.return_type) {
                    format!("return {v}, nil")
                } else {
                    format!("return {v}")
                }
            }
        };
        self.emit(&line);
    }

    fn lower_if(&mut self, condition: &Expr, then_body: &[Stmt], else_body: Option<&[Stmt]>, lead: &str) {
        let cond = self.lower_expr(condition);
        self.emit(&format!("{lead}if {cond} {{"));
        self.lower_block(then_body);
        match else_body {
            None => self.emit("}"),
            Some(
                [Stmt {
                    kind:
                        StmtKind::If {
                            condition,
                            then_body,
                            else_body,
                        },
                    pos,
                }],
            ) => {
                self.mark(pos.line);
                self.lower_if(condition, then_body, else_body.as_deref(), "} else ");
            }
            Some(body) => {
                self.emit("} else {");
                self.lower_block(body);
                self.emit("}");
            }
        }
    }

    // ── Expressions ───────────────────────────────────────────────

    pub fn lower_expr(&mut self, expr: &Expr) -> String {
        match &expr.kind {
            ExprKind::Ident(name) => name.clone(),
            ExprKind::IntLit(v) => v.to_string(),
            ExprKind::FloatLit(v) => format!("{v:?}"),
            ExprKind::BoolLit(b) => b.to_string(),
            ExprKind::StrLit { value, parts } => {
                if parts.is_empty() {
                    go_quote(value)
                } else {
                    let (format, args) = self.format_parts(parts);
                    format!("fmt.Sprintf({}, {})", go_quote(&format), args.join(", "))
                }
            }
            ExprKind::Unary { op, operand } => {
                format!("{}{}", op.symbol(), self.lower_atom(operand))
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.lower_operand(left);
                let r = self.lower_operand(right);
                format!("{l} {} {r}", op.symbol())
            }
            ExprKind::Call { callee, args } => self.lower_call(callee, args),
            ExprKind::Member { object, property } => {
                format!("{}.{}", self.lower_atom(object), export_name(property))
            }
            ExprKind::Try(_) => self.placeholder(expr, "try outside a let initializer or statement"),
            ExprKind::Render(_) => self.placeholder(expr, "render inside an expression"),
            ExprKind::ErrorCtor(message) => match &message.kind {
                ExprKind::StrLit { value, parts } if parts.is_empty() => {
                    format!("errors.New({})", go_quote(value))
                }
                ExprKind::StrLit { parts, .. } => {
                    let (format, args) = self.format_parts(parts);
                    format!("fmt.Errorf({}, {})", go_quote(&format), args.join(", "))
                }
                _ => format!("fmt.Errorf(\"%v\", {})", self.lower_expr(message)),
            },
            ExprKind::Context(field) => match field.as_str() {
                "tenant" => "ctx.TenantID".to_string(),
                "user" => "ctx.UserID".to_string(),
                other => format!("ctx.{}", export_name(other)),
            },
            ExprKind::StructLit { name, fields } => {
                let mut body = String::new();
                for (i, (field, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        body.push_str(", ");
                    }
                    let value = self.lower_expr(value);
                    let _ = write!(body, "{}: {value}", export_name(field));
                }
                if self.is_model(name) {
                    format!("&{name}{{{body}}}")
                } else {
                    format!("{name}{{{body}}}")
                }
            }
        }
    }

    /// Binary operands are parenthesised so the target's own precedence
    /// rules never regroup them.
    fn lower_operand(&mut self, expr: &Expr) -> String {
        let s = self.lower_expr(expr);
        if matches!(expr.kind, ExprKind::Binary { .. }) {
            format!("({s})")
        } else {
            s
        }
    }

    /// Operand of a unary operator, member access or call: any operator
    /// expression is grouped so the suffix or prefix binds to all of it.
    fn lower_atom(&mut self, expr: &Expr) -> String {
        let s = self.lower_expr(expr);
        if matches!(expr.kind, ExprKind::Binary { .. } | ExprKind::Unary { .. }) {
            format!("({s})")
        } else {
            s
        }
    }

    fn format_parts(&mut self, parts: &[StringPart]) -> (String, Vec<String>) {
        let mut format = String::new();
        let mut args = Vec::new();
        for part in parts {
            match part {
                StringPart::Text(text) => format.push_str(&text.replace('%', "%%")),
                StringPart::Expr(e) => {
                    format.push_str("%v");
                    args.push(self.lower_expr(e));
                }
            }
        }
        (format, args)
    }

    fn lower_call(&mut self, callee: &Expr, args: &[Expr]) -> String {
        let mut lowered: Vec<String> = args.iter().map(|a| self.lower_expr(a)).collect();

        if let ExprKind::Member { object, property } = &callee.kind {
            if let ExprKind::Ident(obj) = &object.kind {
                if self.is_model(obj) && matches!(property.as_str(), "find" | "all") {
                    lowered.insert(0, "ctx.DB".to_string());
                    return format!("{property}{obj}({})", lowered.join(", "));
                }
                if matches!(property.as_str(), "save" | "delete") {
                    if let Some(model) = self.scope.var_types.get(obj) {
                        lowered.insert(0, obj.clone());
                        lowered.insert(0, "ctx.DB".to_string());
                        return format!("{property}{model}({})", lowered.join(", "));
                    }
                }
            }
        }

        if let ExprKind::Ident(name) = &callee.kind {
            if self.funcs.contains_key(name) {
                lowered.insert(0, "ctx".to_string());
            }
        }
        let callee = self.lower_atom(callee);
        format!("{callee}({})", lowered.join(", "))
    }
}

fn returns_value(return_type: &str) -> bool {
    !return_type.is_empty() && return_type != "error"
}

fn is_literal(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::IntLit(_) | ExprKind::FloatLit(_) | ExprKind::BoolLit(_) => true,
        ExprKind::StrLit { parts, .. } => parts.is_empty(),
        _ => false,
    }
}

/// Upper-case the first letter so the field is exported.
fn export_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Go interpreted string literal.
fn go_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
