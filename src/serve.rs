//! Purpose: TCP server for the `ROSE/0.1` protocol.
//! Exports: `ServeConfig`, `serve`, `run`, `handle_connection`, `init_tracing`, `shutdown_signal`.
//! Role: Tokio accept loop; one task per connection; dispatch runs on the blocking pool.
//! Invariants: Each connection carries exactly one request and one response, then closes.
//! Invariants: Requests end when the client half-closes its write side.
//! Invariants: No read or write timeouts; a silent client holds only its own task.
use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::core::error::{Error, ErrorKind};
use crate::dispatch;
use crate::protocol::{Response, Status};
use crate::registry::Registry;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 12053;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
}

impl ServeConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Binds the configured address and serves until Ctrl-C or SIGTERM.
pub async fn serve(config: ServeConfig, registry: Arc<Registry>) -> Result<(), Error> {
    let address = config.address();
    let listener = TcpListener::bind(&address).await.map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message(format!("failed to bind {address}"))
            .with_source(err)
    })?;
    info!(address = %address, tables = registry.len(), "listening");
    run(listener, registry, shutdown_signal()).await
}

/// Accepts connections on `listener` until `shutdown` resolves.
pub async fn run<F>(
    listener: TcpListener,
    registry: Arc<Registry>,
    shutdown: F,
) -> Result<(), Error>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!(peer = %peer, "accepted connection");
                    let registry = Arc::clone(&registry);
                    tokio::spawn(handle_connection(stream, peer.to_string(), registry));
                }
                Err(err) => error!(error = %err, "cannot accept connection"),
            },
            _ = &mut shutdown => {
                info!("shutting down");
                return Ok(());
            }
        }
    }
}

/// Reads one request from `stream`, dispatches it, writes the response and closes.
pub async fn handle_connection<S>(mut stream: S, peer: String, registry: Arc<Registry>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut raw = Vec::new();
    let response = match stream.read_to_end(&mut raw).await {
        Ok(_) => {
            let peer = peer.clone();
            tokio::task::spawn_blocking(move || dispatch::handle_request(&registry, &raw, &peer))
                .await
                .unwrap_or_else(|err| {
                    error!(error = %err, "request task failed");
                    Response::new(Status::INTERNAL_ERROR)
                })
        }
        Err(err) => {
            error!(peer = %peer, error = %err, "cannot read request");
            Response::new(Status::BAD_REQUEST)
        }
    };

    if let Err(err) = stream.write_all(&response.encode()).await {
        error!(peer = %peer, error = %err, "cannot write response");
    }
    let _ = stream.shutdown().await;
    info!(peer = %peer, status = response.status.code(), "closed connection");
}

/// Installs the stderr log subscriber; stdout stays free for command output.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "cannot install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}
