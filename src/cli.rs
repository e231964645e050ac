//! Purpose: Argument normalization and error reporting shared by the `rosed` and `rose` binaries.
//! Exports: `Parsed`, `parse_args`, `normalize_args`, `emit_error`, `error_text`.
//! Role: Keeps both command lines consistent: same legacy flag handling, same stderr format.
//! Invariants: Usage failures surface as `ErrorKind::Usage`; help and version exit 0.
//! Invariants: Error text is plain lines (`error:`, `hint:`, `path:`, `caused by:`) on stderr.
use std::error::Error as StdError;
use std::ffi::OsString;
use std::io::{self, IsTerminal};

use clap::{Parser, error::ErrorKind as ClapErrorKind};

use crate::core::error::{Error, ErrorKind};

/// Outcome of command-line parsing.
pub enum Parsed<T> {
    Run(T),
    Exit(i32),
}

/// Parses `args` into `T` after rewriting legacy single-dash `flags`.
pub fn parse_args<T, I>(args: I, flags: &[&str]) -> Result<Parsed<T>, Error>
where
    T: Parser,
    I: IntoIterator<Item = OsString>,
{
    match T::try_parse_from(normalize_args(args, flags)) {
        Ok(cli) => Ok(Parsed::Run(cli)),
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                Ok(Parsed::Exit(exit_code))
            }
            _ => Err(Error::new(ErrorKind::Usage)
                .with_message(clap_error_summary(&err))
                .with_hint(format!("Try `{} --help`.", program_name::<T>()))),
        },
    }
}

/// Rewrites `-name` and `-name=value` to their `--` forms for each name in `flags`.
///
/// Older deployments pass single-dash long flags; clap only accepts `--`.
pub fn normalize_args<I>(args: I, flags: &[&str]) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let replacement = arg.to_str().and_then(|value| {
                let rest = value.strip_prefix('-')?;
                if rest.starts_with('-') {
                    return None;
                }
                let name = rest.split_once('=').map_or(rest, |(name, _)| name);
                flags.contains(&name).then(|| format!("-{value}"))
            });
            replacement.map(OsString::from).unwrap_or(arg)
        })
        .collect()
}

fn program_name<T: Parser>() -> String {
    T::command().get_name().to_string()
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

pub fn emit_error(program: &str, err: &Error) {
    let use_color = io::stderr().is_terminal();
    eprintln!("{}", error_text(program, err, use_color));
}

pub fn error_text(program: &str, err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{program}: {} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];
    if let Some(table) = err.table() {
        lines.push(format!(
            "{} {table}",
            colorize_label("table:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    let mut cause = err.source();
    while let Some(source) = cause {
        lines.push(format!(
            "{} {source}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
        cause = source.source();
    }
    lines.join("\n")
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Malformed => "malformed request".to_string(),
        ErrorKind::NameConflict => "table name conflict".to_string(),
        ErrorKind::UnknownTable => "unknown table".to_string(),
        ErrorKind::NotLoaded => "table is not loaded".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Protocol => "unrecognized protocol".to_string(),
        ErrorKind::Status => "unexpected server response".to_string(),
    }
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}
