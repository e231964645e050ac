//! Purpose: Execute one parsed request against the registry and build its response.
//! Exports: `dispatch`, `handle_request`.
//! Role: Translates registry outcomes into protocol status codes; holds no state.
//! Invariants: Every request yields exactly one status; registry errors never escape.
//! Invariants: Only a successful `map` or `list` carries a body.
use tracing::{error, info, warn};

use crate::core::error::Error;
use crate::core::table::Identifier;
use crate::protocol::{Command, Request, Response, Status};
use crate::registry::Registry;

/// Parses raw request bytes from `peer` and dispatches them.
pub fn handle_request(registry: &Registry, raw: &[u8], peer: &str) -> Response {
    match Request::parse(raw) {
        Ok(request) => dispatch(registry, &request, peer),
        Err(err) => {
            match err.hint() {
                Some(hint) => warn!(peer = %peer, error = %err, hint = %hint, "malformed request"),
                None => warn!(peer = %peer, error = %err, "malformed request"),
            }
            Response::new(Status::BAD_REQUEST)
        }
    }
}

pub fn dispatch(registry: &Registry, request: &Request, peer: &str) -> Response {
    match &request.command {
        Command::Map { table, src, dest } => {
            match registry.map_identifiers(table, src.as_bytes(), dest.as_bytes(), &request.body)
            {
                Ok(ids) if ids.is_empty() => Response::new(Status::NO_CONTENT),
                Ok(ids) => {
                    info!(peer = %peer, table = %table, count = ids.len(), "mapped identifiers");
                    Response::new(Status::OK).with_body(ids)
                }
                Err(err) => {
                    error!(peer = %peer, error = %err, "cannot map identifiers");
                    Response::new(Status::NOT_FOUND)
                }
            }
        }
        Command::Load(table) => lifecycle(Status::CREATED, "loaded", table.as_deref(), |name| {
            match name {
                Some(name) => registry.load(name).map(|_| ()),
                None => registry.load_all(),
            }
        }),
        Command::Unload(table) => {
            lifecycle(Status::NO_CONTENT, "unloaded", table.as_deref(), |name| match name {
                Some(name) => registry.unload(name),
                None => registry.unload_all(),
            })
        }
        Command::Reload(table) => {
            lifecycle(Status::RESET_CONTENT, "reloaded", table.as_deref(), |name| match name {
                Some(name) => registry.reload(name).map(|_| ()),
                None => registry.reload_all(),
            })
        }
        Command::List => {
            let names: Vec<Identifier> = registry.list().into_iter().map(Identifier::from).collect();
            Response::new(Status::OK).with_body(names)
        }
    }
}

fn lifecycle<F>(success: Status, verb: &str, table: Option<&str>, op: F) -> Response
where
    F: FnOnce(Option<&str>) -> Result<(), Error>,
{
    match op(table) {
        Ok(()) => {
            match table {
                Some(table) => info!(table = %table, "table is {verb}"),
                None => info!("all tables are {verb}"),
            }
            Response::new(success)
        }
        Err(err) => {
            warn!(error = %err, "table operation failed");
            Response::new(Status::NOT_FOUND)
        }
    }
}
