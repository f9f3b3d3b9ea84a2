use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use serde::Serialize;

use loom_script::dsl::error::CompileError;
use loom_script::dsl::lexer::{self, TokenKind};
use loom_script::dsl::{self, transpile};
use loom_script::embed;
use loom_script::error::LoomError;
use loom_script::paths;
use loom_script::settings::{self, BuildConfig};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "loomc", about = "Loom script compiler", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the token stream of a script
    Tokens { file: PathBuf },
    /// Parse a script and print a summary of its declarations
    Parse { file: PathBuf },
    /// Compile a script to Go
    Build {
        file: PathBuf,
        /// Extra known model name (repeatable)
        #[arg(long = "model")]
        models: Vec<String>,
        /// Lines preceding a bare script in its original host
        #[arg(long)]
        line_offset: Option<usize>,
        /// Config file (defaults to loom.json next to the input)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the Go code here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Write the source map here
        #[arg(long)]
        source_map: Option<PathBuf>,
    },
    /// Print the JSON Schema of loom.json
    ConfigSchema,
}

// ── Input loading ────────────────────────────────────────────────

/// Script text plus the offset dictated by its host, if embedded.
struct Input {
    source: String,
    host_offset: Option<usize>,
}

fn load_input(path: &Path) -> Result<Input, LoomError> {
    let text = fs::read_to_string(path).map_err(|e| LoomError::io(path, &e))?;
    if paths::is_bare_script(path) {
        return Ok(Input {
            source: text,
            host_offset: None,
        });
    }
    let script = embed::extract_script(&text).ok_or_else(|| LoomError::NoScript {
        path: path.display().to_string(),
    })?;
    Ok(Input {
        source: script.source.to_string(),
        host_offset: Some(script.line_offset),
    })
}

// ── Commands ─────────────────────────────────────────────────────

fn run_tokens(file: &Path, raw_json: bool) -> Result<i32, LoomError> {
    let input = load_input(file)?;
    let tokens = lexer::lex_from(&input.source, input.host_offset.unwrap_or(0));
    if raw_json {
        println!("{}", serde_json::to_string_pretty(&tokens)?);
    } else {
        for tok in &tokens {
            println!("{:>4}:{:<3} {:<16} {}", tok.pos.line, tok.pos.column, tok.kind.to_string(), tok.literal);
        }
    }
    Ok(i32::from(tokens.iter().any(|t| t.is(TokenKind::Illegal))))
}

#[derive(Serialize)]
struct ParseSummary<'a> {
    imports: usize,
    models: Vec<&'a str>,
    services: Vec<&'a str>,
    vars: Vec<&'a str>,
    funcs: Vec<&'a str>,
    errors: &'a [CompileError],
}

fn run_parse(file: &Path, raw_json: bool) -> Result<i32, LoomError> {
    let input = load_input(file)?;
    let result = dsl::parse_source(&input.source, input.host_offset.unwrap_or(0));
    let summary = ParseSummary {
        imports: result.imports.len(),
        models: result.model_names().collect(),
        services: result.services.iter().map(|s| s.name.as_str()).collect(),
        vars: result.vars.iter().map(|v| v.name.as_str()).collect(),
        funcs: result.funcs.iter().map(|f| f.name.as_str()).collect(),
        errors: &result.errors,
    };
    if raw_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Imports: {}", summary.imports);
        println!("Models: {}", summary.models.join(", "));
        println!("Services: {}", summary.services.join(", "));
        println!("Vars: {}", summary.vars.join(", "));
        println!("Funcs: {}", summary.funcs.join(", "));
        report_errors(file, &result.errors);
    }
    Ok(i32::from(result.has_errors()))
}

struct BuildArgs<'a> {
    file: &'a Path,
    models: &'a [String],
    line_offset: Option<usize>,
    config: Option<&'a Path>,
    output: Option<&'a Path>,
    source_map: Option<&'a Path>,
}

fn run_build(args: &BuildArgs<'_>, raw_json: bool) -> Result<i32, LoomError> {
    let config_path = args
        .config
        .map_or_else(|| paths::config_for_input(args.file), Path::to_path_buf);
    let mut config: BuildConfig = settings::load_config(&config_path)?;
    config.merge_models(args.models);

    let input = load_input(args.file)?;
    let line_offset = input
        .host_offset
        .or(args.line_offset)
        .unwrap_or(config.line_offset);

    let output: transpile::TranspileOutput =
        match dsl::compile_with(&input.source, line_offset, &config.models, config.lowering_options()) {
            Ok(output) => output,
            Err(errors) => {
                if raw_json {
                    println!("{}", serde_json::to_string_pretty(&LoomError::from(errors))?);
                } else {
                    report_errors(args.file, &errors);
                }
                return Ok(1);
            }
        };

    let map_path = args.source_map.map(Path::to_path_buf).or_else(|| {
        config
            .source_map
            .then(|| paths::default_source_map_path(args.file))
    });
    if let Some(path) = &map_path {
        settings::write_json(path, &output.source_map)?;
        log::info!("wrote source map to {}", path.display());
    }

    if raw_json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if let Some(path) = args.output {
        settings::atomic_write(path, output.code.as_bytes())?;
        eprintln!("[loomc] Wrote {}", path.display());
    } else {
        print!("{}", output.code);
    }
    Ok(0)
}

fn report_errors(file: &Path, errors: &[CompileError]) {
    for e in errors {
        eprintln!("[loomc] {}: {}", file.display(), e.format_detailed());
    }
}

fn run(cli: &Cli) -> Result<i32, LoomError> {
    match &cli.command {
        Commands::Tokens { file } => run_tokens(file, cli.json),
        Commands::Parse { file } => run_parse(file, cli.json),
        Commands::Build {
            file,
            models,
            line_offset,
            config,
            output,
            source_map,
        } => run_build(
            &BuildArgs {
                file,
                models,
                line_offset: *line_offset,
                config: config.as_deref(),
                output: output.as_deref(),
                source_map: source_map.as_deref(),
            },
            cli.json,
        ),
        Commands::ConfigSchema => {
            println!("{}", settings::config_schema()?);
            Ok(0)
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("[loomc] Error: {e}");
            process::exit(1);
        }
    }
}
