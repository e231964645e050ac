//! Purpose: Blocking client for the `ROSE/0.1` protocol.
//! Exports: `Client`, `read_identifiers`.
//! Role: Backs the `rose` binary and the integration tests; mirrors server framing rules.
//! Invariants: One request per connection; the write side is half-closed after sending.
//! Invariants: A non-200 `map` response never yields identifiers.
use std::io::{BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};

use bstr::{BString, ByteSlice, io::BufReadExt};

use crate::core::error::{Error, ErrorKind};
use crate::core::table::Identifier;
use crate::protocol::{Command, Request, Response, Status};

const COMMENT_PREFIX: &str = "#";

#[derive(Clone, Debug)]
pub struct Client {
    address: String,
}

impl Client {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn from_host_port(host: &str, port: u16) -> Self {
        Self::new(format!("{host}:{port}"))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sends one request and reads the full response.
    pub fn send(&self, request: &Request) -> Result<Response, Error> {
        let mut stream = TcpStream::connect(&self.address).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("cannot connect to server at {}", self.address))
                .with_hint("Is rosed running? Check --host and --port.")
                .with_source(err)
        })?;
        stream
            .write_all(&request.encode())
            .and_then(|()| stream.shutdown(Shutdown::Write))
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to send request")
                    .with_source(err)
            })?;
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read response")
                .with_source(err)
        })?;
        Response::parse(&raw)
    }

    /// Sends `command` with no body and requires `expected` back.
    pub fn command(&self, command: Command, expected: Status) -> Result<Response, Error> {
        let response = self.send(&Request::new(command))?;
        expect_status(response, expected)
    }

    /// Converts `ids` from `src` to `dest` through `table`, one output per input.
    pub fn map(
        &self,
        table: &str,
        src: &str,
        dest: &str,
        ids: Vec<Identifier>,
    ) -> Result<Vec<Identifier>, Error> {
        let request = Request::new(Command::Map {
            table: table.to_string(),
            src: src.to_string(),
            dest: dest.to_string(),
        })
        .with_body(ids);
        let response = self.send(&request)?;
        if response.status == Status::NO_CONTENT {
            return Ok(Vec::new());
        }
        Ok(expect_status(response, Status::OK)?.body)
    }

    pub fn list(&self) -> Result<Vec<String>, Error> {
        let response = self.command(Command::List, Status::OK)?;
        Ok(response
            .body
            .iter()
            .map(|name| name.to_str_lossy().into_owned())
            .collect())
    }
}

fn expect_status(response: Response, expected: Status) -> Result<Response, Error> {
    if response.status == expected {
        return Ok(response);
    }
    Err(Error::new(ErrorKind::Status).with_message(format!(
        "server response: {} {}",
        response.status.code(),
        response.reason
    )))
}

/// Reads identifiers one per line, skipping `#` comment lines.
pub fn read_identifiers<R: Read>(reader: R) -> Result<Vec<BString>, Error> {
    let mut ids = Vec::new();
    BufReader::new(reader)
        .for_byte_line(|line| {
            if !line.starts_with_str(COMMENT_PREFIX) {
                ids.push(BString::from(line));
            }
            Ok(true)
        })
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read identifiers")
                .with_source(err)
        })?;
    Ok(ids)
}
