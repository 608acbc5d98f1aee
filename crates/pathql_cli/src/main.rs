use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use pathql_core::QueryCompiler;
use pathql_core::catalog::MemoryCatalog;
use pathql_core::config::{CompilerConfig, all_settings};
use pathql_core::query::CompiledQuery;
use pathql_core::testutil::fixture_catalog;
use pathql_error::{Result, ResultExt};
use tracing::{Level, debug};

#[derive(Parser)]
#[clap(name = "pathql")]
struct Arguments {
    /// Increase log verbosity. Repeat for more output.
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(long, value_enum, default_value_t = LogFormatArg::Human, global = true)]
    log_format: LogFormatArg,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile queries and print the generated SQL.
    Compile(CompileArgs),
    /// List the available compiler settings.
    Settings,
}

#[derive(clap::Args)]
struct CompileArgs {
    /// Schema definition in JSON. Uses the built in order schema if omitted.
    #[clap(long, env = "PATHQL_SCHEMA")]
    schema: Option<PathBuf>,

    /// Compiler config in JSON, applied before any `--set`.
    #[clap(long)]
    config: Option<PathBuf>,

    #[clap(long)]
    dialect: Option<String>,

    /// Override a setting, e.g. `--set cache_chunk_size=32`.
    #[clap(long = "set", value_parser = parse_setting)]
    settings: Vec<(String, String)>,

    /// Skip join elimination.
    #[clap(long)]
    unoptimized: bool,

    /// Print each result as JSON.
    #[clap(long)]
    json: bool,

    #[clap(required = true)]
    queries: Vec<String>,
}

fn parse_setting(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}

/// Command line compiler for inspecting the SQL generated for queries.
fn main() {
    let args = Arguments::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let format = match args.log_format {
        LogFormatArg::Human => logutil::LogFormat::HumanReadable,
        LogFormatArg::Json => logutil::LogFormat::Json,
    };
    logutil::configure_global_logger(level, format, std::io::stderr);

    let result = match args.command {
        Commands::Compile(compile) => run_compile(compile),
        Commands::Settings => run_settings(),
    };

    if let Err(e) = result {
        println!("ERROR: {e}");
        std::process::exit(1);
    }
}

fn run_settings() -> Result<()> {
    let defaults = CompilerConfig::default();
    let mut stdout = BufWriter::new(std::io::stdout());
    for (name, description) in all_settings() {
        let value = defaults.get_as_scalar(name)?.to_string();
        writeln!(stdout, "{name:<20} {value:<10} {description}")?;
    }
    stdout.flush()?;
    Ok(())
}

fn run_compile(args: CompileArgs) -> Result<()> {
    let catalog = match &args.schema {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .context_fn(|| format!("Failed to read schema '{}'", path.display()))?;
            MemoryCatalog::from_json(&json)?
        }
        None => fixture_catalog(),
    };

    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .context_fn(|| format!("Failed to read config '{}'", path.display()))?;
            CompilerConfig::from_json(&json)?
        }
        None => CompilerConfig::default(),
    };
    if let Some(dialect) = &args.dialect {
        config.set_from_str("dialect", dialect)?;
    }
    for (name, value) in &args.settings {
        config.set_from_str(name, value)?;
    }
    if args.unoptimized {
        config.enable_optimizer = false;
    }
    debug!(?config, "compiler config");

    let compiler = QueryCompiler::with_config(Arc::new(catalog), config);
    let mut stdout = BufWriter::new(std::io::stdout());

    for query in &args.queries {
        let compiled = compiler.compile(query)?;
        if args.json {
            let out = serde_json::to_string_pretty(&describe_json(&compiled))
                .context("Failed to serialize output")?;
            writeln!(stdout, "{out}")?;
        } else {
            write_described(&mut stdout, &compiled)?;
        }
    }

    stdout.flush()?;
    Ok(())
}

fn write_described(out: &mut impl Write, compiled: &CompiledQuery) -> Result<()> {
    writeln!(out, "{}", compiled.sql())?;
    for (idx, param) in compiled.sql_arguments().iter().enumerate() {
        let datatype = compiled
            .parameter(param)
            .and_then(|info| info.datatype.as_ref())
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        writeln!(out, "  ${} = {param} ({datatype})", idx + 1)?;
    }
    match compiled.cache_max_age() {
        Some(age) => writeln!(out, "  cache max age: {}ms", age.as_millis())?,
        None => writeln!(out, "  not cacheable")?,
    }
    writeln!(out, "  tables: {}", compiled.tables().join(", "))?;
    Ok(())
}

fn describe_json(compiled: &CompiledQuery) -> serde_json::Value {
    let arguments: Vec<_> = compiled
        .sql_arguments()
        .iter()
        .map(|param| {
            let datatype = compiled
                .parameter(param)
                .and_then(|info| info.datatype.as_ref())
                .map(|d| d.to_string());
            serde_json::json!({ "parameter": param.to_string(), "datatype": datatype })
        })
        .collect();

    serde_json::json!({
        "query": compiled.source(),
        "sql": compiled.sql(),
        "arguments": arguments,
        "cache_max_age_ms": compiled.cache_max_age().map(|age| age.as_millis() as u64),
        "tables": compiled.tables(),
        "target_table": compiled.target_table(),
    })
}
