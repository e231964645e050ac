//! Purpose: `rose` client: convert identifiers through a table served by `rosed`.
//! Role: Reads identifiers from a file or stdin, sends one `map` request, prints the result.
//! Invariants: Output has exactly one line per input identifier on success.
//! Invariants: Non-200 responses print `server response: <code> <reason>` on stderr.
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bstr::BString;
use clap::{Parser, ValueHint};

use rose::cli::{Parsed, emit_error, parse_args};
use rose::client::{Client, read_identifiers};
use rose::core::error::{Error, ErrorKind, to_exit_code};
use rose::serve::{DEFAULT_HOST, DEFAULT_PORT};

const PROGRAM: &str = "rose";
const LEGACY_FLAGS: &[&str] = &["host", "port", "input", "help"];
const STDIN: &str = "-";

#[derive(Parser)]
#[command(
    name = "rose",
    version,
    about = "Convert identifiers between the fields of a rosed table",
    after_help = r#"EXAMPLES
  $ rose ids geneId transcriptId --input genes.txt
  $ printf 'G1\nG2\n' | rose ids geneId transcriptId

NOTES
  - Input has one identifier per line; lines starting with # are skipped.
  - Output has one line per input; several matches are joined with commas."#
)]
struct Cli {
    #[arg(help = "Table name (file name without extension)")]
    table: String,
    #[arg(help = "Field the input identifiers belong to")]
    src: String,
    #[arg(help = "Field to convert the identifiers to")]
    dest: String,
    #[arg(
        long,
        default_value = STDIN,
        value_hint = ValueHint::FilePath,
        help = "Input file, or - for stdin"
    )]
    input: PathBuf,
    #[arg(long, default_value = DEFAULT_HOST, help = "Server host")]
    host: String,
    #[arg(long, default_value_t = DEFAULT_PORT, help = "Server port")]
    port: u16,
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
    let ids = read_input(&cli.input)?;
    let client = Client::from_host_port(&cli.host, cli.port);
    let mapped = client.map(&cli.table, &cli.src, &cli.dest, ids)?;
    write_output(&mapped)?;
    Ok(0)
}

fn read_input(input: &Path) -> Result<Vec<BString>, Error> {
    if input.as_os_str() == STDIN {
        return read_identifiers(io::stdin().lock());
    }
    let file = File::open(input).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to open input")
            .with_path(input)
            .with_source(err)
    })?;
    read_identifiers(file).map_err(|err| err.with_path(input))
}

fn write_output(ids: &[BString]) -> Result<(), Error> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for id in ids {
        out.write_all(id)
            .and_then(|()| out.write_all(b"\n"))
            .map_err(write_failed)?;
    }
    out.flush().map_err(write_failed)
}

fn write_failed(err: io::Error) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to write output")
        .with_source(err)
}
