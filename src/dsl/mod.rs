//! Loom script front-end: lexer, parser and the lowering pass to Go.

#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod ast;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod error;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod lexer;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
mod cursor;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod parser;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod expr;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
mod interp;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod schema;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod transpile;

use ast::ParseResult;
use error::CompileError;
use transpile::{LoweringOptions, TranspileOutput};

/// Parse one compilation unit. Diagnostics are collected, never fatal.
pub fn parse_source(source: &str, line_offset: usize) -> ParseResult {
    parser::parse(source, line_offset)
}

/// Lower a parsed unit with the default options.
pub fn transpile(result: &ParseResult, models: &[String]) -> TranspileOutput {
    transpile::transpile(result, models)
}

/// Compile a script into Go source.
///
/// This is the primary public entry point for the pipeline:
/// source → lex → parse → lower → `TranspileOutput`.
/// Any parse diagnostic stops before lowering; any lowering diagnostic is
/// returned as an error as well.
pub fn compile_source(
    source: &str,
    line_offset: usize,
    models: &[String],
) -> Result<TranspileOutput, Vec<CompileError>> {
    compile_with(source, line_offset, models, LoweringOptions::default())
}

pub fn compile_with(
    source: &str,
    line_offset: usize,
    models: &[String],
    options: LoweringOptions,
) -> Result<TranspileOutput, Vec<CompileError>> {
    let result = parse_source(source, line_offset);
    if result.has_errors() {
        return Err(result.errors);
    }
    let known = known_models(&result, models);
    let output = transpile::transpile_with(&result, &known, options);
    if output.errors.is_empty() {
        Ok(output)
    } else {
        Err(output.errors)
    }
}

/// Caller-supplied models followed by the ones the unit declares itself.
pub fn known_models(result: &ParseResult, models: &[String]) -> Vec<String> {
    let mut known = models.to_vec();
    for name in result.model_names() {
        if !known.iter().any(|m| m == name) {
            known.push(name.to_string());
        }
    }
    known
}
