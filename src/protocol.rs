//! Purpose: Wire types for the line-oriented `ROSE/0.1` protocol.
//! Exports: `PROTOCOL_NAME`, `Status`, `Command`, `Request`, `Response`.
//! Role: Shared by the server dispatcher and the client; owns all framing rules.
//! Invariants: One request and one response per connection; lines end with `\n`.
//! Invariants: A `200` status line is followed by a blank line before the body.
//! Invariants: Request command lines must be UTF-8; identifier lines are opaque bytes.
use std::fmt;

use bstr::{BString, ByteSlice, ByteVec};

use crate::core::error::{Error, ErrorKind};
use crate::core::table::{Identifier, LINE_DELIM};

pub const PROTOCOL_NAME: &str = "ROSE/0.1";

/// Protocol-local status code with HTTP-like meaning.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Status(u16);

impl Status {
    pub const OK: Status = Status(200);
    pub const CREATED: Status = Status(201);
    pub const ACCEPTED: Status = Status(202);
    pub const NO_CONTENT: Status = Status(204);
    pub const RESET_CONTENT: Status = Status(205);
    pub const BAD_REQUEST: Status = Status(400);
    pub const UNAUTHORIZED: Status = Status(401);
    pub const NOT_FOUND: Status = Status(404);
    pub const REQUEST_TIMEOUT: Status = Status(408);
    pub const INTERNAL_ERROR: Status = Status(500);

    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    pub const fn code(self) -> u16 {
        self.0
    }

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    pub fn reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            205 => "Reset Content",
            400 => "Bad Request",
            401 => "Unauthorized",
            404 => "Not Found",
            408 => "Request Timeout",
            500 => "Internal Error",
            _ => "Unknown",
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::INTERNAL_ERROR
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.reason())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Map {
        table: String,
        src: String,
        dest: String,
    },
    Load(Option<String>),
    Unload(Option<String>),
    Reload(Option<String>),
    List,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, Error> {
        let mut tokens = line.split_ascii_whitespace();
        let Some(action) = tokens.next() else {
            return Err(malformed("empty command line"));
        };
        let args: Vec<&str> = tokens.collect();
        match (action, args.as_slice()) {
            ("map", [table, src, dest]) => Ok(Command::Map {
                table: table.to_string(),
                src: src.to_string(),
                dest: dest.to_string(),
            }),
            ("map", _) => Err(malformed("invalid command")
                .with_hint("expecting: map <table> <srcField> <destField>")),
            ("load", []) => Ok(Command::Load(None)),
            ("load", [table]) => Ok(Command::Load(Some(table.to_string()))),
            ("load", _) => Err(malformed("invalid command").with_hint("expecting: load [<table>]")),
            ("unload", []) => Ok(Command::Unload(None)),
            ("unload", [table]) => Ok(Command::Unload(Some(table.to_string()))),
            ("unload", _) => {
                Err(malformed("invalid command").with_hint("expecting: unload [<table>]"))
            }
            ("reload", []) => Ok(Command::Reload(None)),
            ("reload", [table]) => Ok(Command::Reload(Some(table.to_string()))),
            ("reload", _) => {
                Err(malformed("invalid command").with_hint("expecting: reload [<table>]"))
            }
            ("list", []) => Ok(Command::List),
            ("list", _) => Err(malformed("invalid command").with_hint("expecting: list")),
            (other, _) => Err(malformed(format!("unknown command `{other}`"))),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (action, table) = match self {
            Command::Map { table, src, dest } => return write!(f, "map {table} {src} {dest}"),
            Command::Load(table) => ("load", table),
            Command::Unload(table) => ("unload", table),
            Command::Reload(table) => ("reload", table),
            Command::List => return f.write_str("list"),
        };
        match table {
            Some(table) => write!(f, "{action} {table}"),
            None => f.write_str(action),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    pub command: Command,
    pub body: Vec<Identifier>,
}

impl Request {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: Vec<Identifier>) -> Self {
        self.body = body;
        self
    }

    /// Parses a complete request: one command line, then zero or more identifier lines.
    pub fn parse(raw: &[u8]) -> Result<Self, Error> {
        let mut lines = raw.lines();
        let Some(first) = lines.next() else {
            return Err(malformed("cannot read request"));
        };
        let first = first
            .to_str()
            .map_err(|err| malformed("command line is not valid UTF-8").with_source(err))?;
        let command = Command::parse(first)?;
        let body = lines.map(BString::from).collect();
        Ok(Self { command, body })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push_str(self.command.to_string());
        out.push_str(LINE_DELIM);
        for id in &self.body {
            out.push_str(id);
            out.push_str(LINE_DELIM);
        }
        out
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Response {
    pub status: Status,
    pub reason: String,
    pub body: Vec<BString>,
}

impl Response {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            reason: status.reason().to_string(),
            body: Vec::new(),
        }
    }

    pub fn with_body(mut self, body: Vec<BString>) -> Self {
        self.body = body;
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push_str(format!(
            "{PROTOCOL_NAME} {} {}",
            self.status.code(),
            self.reason
        ));
        out.push_str(LINE_DELIM);
        if self.status.is_ok() {
            out.push_str(LINE_DELIM);
        }
        for line in &self.body {
            out.push_str(line);
            out.push_str(LINE_DELIM);
        }
        out
    }

    /// Parses a server response, checking the protocol tag.
    pub fn parse(raw: &[u8]) -> Result<Self, Error> {
        let mut lines = raw.lines();
        let header = lines.next().unwrap_or_default().to_str_lossy();
        let mut tokens = header.split(' ');
        let (Some(tag), Some(code), Some(_)) = (tokens.next(), tokens.next(), tokens.clone().next())
        else {
            return Err(unrecognized(&header));
        };
        if tag != PROTOCOL_NAME {
            return Err(unrecognized(&header));
        }
        let code: u16 = code.parse().map_err(|_| unrecognized(&header))?;
        let reason = tokens.collect::<Vec<_>>().join(" ");
        let status = Status::new(code);
        if status.is_ok() {
            // Blank separator between the status line and the identifiers.
            let mut peek = lines.clone();
            if peek.next().is_some_and(|line| line.is_empty()) {
                lines = peek;
            }
        }
        Ok(Self {
            status,
            reason,
            body: lines.map(BString::from).collect(),
        })
    }
}

fn malformed(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Malformed).with_message(message)
}

fn unrecognized(header: &str) -> Error {
    Error::new(ErrorKind::Protocol)
        .with_message(format!("unrecognized protocol in status line `{header}`"))
        .with_hint(format!("Is the server speaking {PROTOCOL_NAME}?"))
}
