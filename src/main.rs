//! Purpose: `rosed` entry point: resolve table sources, register them and serve `ROSE/0.1`.
//! Role: Binary crate root; parses args, builds the registry, runs the tokio server.
//! Invariants: Tables are registered, never loaded, at startup; loading is lazy.
//! Invariants: Startup fails with `UnknownTable` when no table could be registered.
//! Invariants: Process exit code is derived from `core::error::to_exit_code`.
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueHint};
use serde::Serialize;

use rose::cli::{Parsed, emit_error, parse_args};
use rose::core::error::{Error, ErrorKind, to_exit_code};
use rose::registry::Registry;
use rose::serve::{self, DEFAULT_HOST, DEFAULT_PORT, ServeConfig};
use rose::table_paths::{TABLES_EXT_ENV, TABLES_PATH_ENV, TableSources};

const PROGRAM: &str = "rosed";
const LEGACY_FLAGS: &[&str] = &["host", "port", "tables", "help"];

#[derive(Parser)]
#[command(
    name = "rosed",
    version,
    about = "Serve identifier conversion tables over ROSE/0.1",
    after_help = r#"TABLES
  Candidate tables come from --tables FILE (one path per line) and from every
  file in the ROSE_TABLES_PATH directories whose extension is listed in
  ROSE_TABLES_EXT (default: tsv). A table's name is its file name without
  the extension; the first path registered under a name wins.

EXAMPLES
  $ ROSE_TABLES_PATH=/data/ids rosed
  $ rosed --port 12054 --tables tables.txt
  $ rosed check --json

NOTES
  - Logging honors RUST_LOG (default: info)."#
)]
struct Cli {
    #[arg(long, default_value = DEFAULT_HOST, help = "Address to listen on")]
    host: String,
    #[arg(long, default_value_t = DEFAULT_PORT, help = "Port to listen on")]
    port: u16,
    #[arg(
        long,
        value_hint = ValueHint::FilePath,
        help = "File listing table paths, one per line"
    )]
    tables: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Validate table configuration without serving",
        after_help = r#"EXAMPLES
  $ rosed check
  $ rosed check --json"#
    )]
    Check {
        #[arg(long, help = "Emit the report as JSON")]
        json: bool,
    },
}

fn main() {
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(PROGRAM, &err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<i32, Error> {
    let cli = match parse_args::<Cli, _>(std::env::args_os(), LEGACY_FLAGS)? {
        Parsed::Run(cli) => cli,
        Parsed::Exit(code) => return Ok(code),
    };
    serve::init_tracing();

    let config = ServeConfig {
        host: cli.host,
        port: cli.port,
    };
    let sources = TableSources::from_env(cli.tables);
    let mut registry = Registry::new();
    let rejected = registry.register_paths(sources.discover());

    if let Some(Command::Check { json }) = cli.command {
        emit_check_report(&config, &sources, &registry, &rejected, json);
        return if registry.is_empty() {
            Err(no_tables())
        } else {
            Ok(0)
        };
    }

    if registry.is_empty() {
        return Err(no_tables());
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to start async runtime")
                .with_source(err)
        })?;
    runtime.block_on(serve::serve(config, Arc::new(registry)))?;
    Ok(0)
}

fn no_tables() -> Error {
    Error::new(ErrorKind::UnknownTable)
        .with_message("no tables are available for loading")
        .with_hint(format!(
            "Set {TABLES_PATH_ENV} to a directory of .tsv files or pass --tables FILE."
        ))
}

fn emit_check_report(
    config: &ServeConfig,
    sources: &TableSources,
    registry: &Registry,
    rejected: &[(PathBuf, Error)],
    json: bool,
) {
    if json {
        let report = check_report(config, sources, registry, rejected);
        let text = serde_json::to_string_pretty(&report)
            .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
        println!("{text}");
        return;
    }
    for line in check_lines(config, sources, registry, rejected) {
        println!("{line}");
    }
}

#[derive(Serialize)]
struct CheckReport {
    check: Check,
}

#[derive(Serialize)]
struct Check {
    valid: bool,
    address: String,
    sources: CheckSources,
    tables: Vec<CheckTable>,
    rejected: Vec<CheckRejected>,
}

#[derive(Serialize)]
struct CheckSources {
    tables_file: Option<String>,
    dirs: Vec<String>,
    exts: Vec<String>,
}

#[derive(Serialize)]
struct CheckTable {
    name: String,
    path: String,
}

#[derive(Serialize)]
struct CheckRejected {
    path: String,
    kind: String,
    error: String,
}

fn check_report(
    config: &ServeConfig,
    sources: &TableSources,
    registry: &Registry,
    rejected: &[(PathBuf, Error)],
) -> CheckReport {
    let tables = registry
        .list()
        .into_iter()
        .map(|name| {
            let path = registry
                .path(&name)
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            CheckTable { name, path }
        })
        .collect();
    let rejected = rejected
        .iter()
        .map(|(path, err)| CheckRejected {
            path: path.display().to_string(),
            kind: format!("{:?}", err.kind()),
            error: err.to_string(),
        })
        .collect();
    CheckReport {
        check: Check {
            valid: !registry.is_empty(),
            address: config.address(),
            sources: CheckSources {
                tables_file: sources
                    .tables_file
                    .as_ref()
                    .map(|path| path.display().to_string()),
                dirs: sources
                    .dirs
                    .iter()
                    .map(|dir| dir.display().to_string())
                    .collect(),
                exts: sources.exts.clone(),
            },
            tables,
            rejected,
        },
    }
}

fn check_lines(
    config: &ServeConfig,
    sources: &TableSources,
    registry: &Registry,
    rejected: &[(PathBuf, Error)],
) -> Vec<String> {
    let mut lines = vec![
        if registry.is_empty() {
            "Configuration invalid.".to_string()
        } else {
            "Configuration valid.".to_string()
        },
        String::new(),
        format!("  Bind:   {}", config.address()),
    ];
    if let Some(file) = &sources.tables_file {
        lines.push(format!("  Tables file: {}", file.display()));
    }
    if sources.dirs.is_empty() {
        lines.push(format!("  {TABLES_PATH_ENV}: (unset)"));
    } else {
        for dir in &sources.dirs {
            lines.push(format!("  {TABLES_PATH_ENV}: {}", dir.display()));
        }
    }
    lines.push(format!("  {TABLES_EXT_ENV}: {}", sources.exts.join(", ")));
    lines.push(String::new());
    lines.push(format!("  Tables ({}):", registry.len()));
    for name in registry.list() {
        let path = registry
            .path(&name)
            .map(|path| path.display().to_string())
            .unwrap_or_default();
        lines.push(format!("    {name:<16} {path}"));
    }
    if !rejected.is_empty() {
        lines.push(String::new());
        lines.push(format!("  Rejected ({}):", rejected.len()));
        for (path, err) in rejected {
            lines.push(format!("    {}: {err}", path.display()));
        }
    }
    lines
}
