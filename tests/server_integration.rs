//! Purpose: End-to-end tests for the `rosed` server over TCP.
//! Exports: None (integration test module).
//! Role: Validate mapping, table lifecycle commands and startup configuration across processes.
//! Invariants: Uses a loopback-only server with temp table directories.
//! Invariants: Bounded waits avoid test flakiness.
//! Invariants: Server processes are cleaned up on drop.

use rose::client::Client;
use rose::core::error::ErrorKind;
use rose::protocol::{Command as RoseCommand, Request, Status};
use serde_json::Value;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::{Duration, Instant};

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

static SERVER_LOCK: Mutex<()> = Mutex::new(());

const IDS: &str = "geneId\ttranscriptId\tproteinId\nG1\tT1\tP1\nG1\tT2\tP2\nG2\t\tP3\n";

struct TestServer {
    child: Child,
    port: u16,
    _server_guard: MutexGuard<'static, ()>,
}

impl TestServer {
    fn start(table_dirs: &[&Path]) -> TestResult<Self> {
        let guard = SERVER_LOCK
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        let mut last_err: Option<Box<dyn std::error::Error>> = None;
        for _attempt in 0..3 {
            let port = pick_port()?;
            let mut child = rosed(table_dirs)
                .arg("--port")
                .arg(port.to_string())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .spawn()?;

            match wait_for_server(&mut child, port) {
                Ok(()) => {
                    return Ok(Self {
                        child,
                        port,
                        _server_guard: guard,
                    });
                }
                Err(err) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    last_err = Some(err);
                    sleep(Duration::from_millis(30));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "server failed to start".into()))
    }

    fn client(&self) -> Client {
        Client::from_host_port("127.0.0.1", self.port)
    }

    fn status(&self, command: RoseCommand) -> TestResult<Status> {
        Ok(self.client().send(&Request::new(command))?.status)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn rosed(table_dirs: &[&Path]) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_rosed"));
    command
        .env("ROSE_TABLES_PATH", std::env::join_paths(table_dirs).unwrap_or_default())
        .env_remove("ROSE_TABLES_EXT")
        .env("RUST_LOG", "warn");
    command
}

fn write_table(dir: &Path, file_name: &str, contents: &str) -> TestResult<()> {
    std::fs::write(dir.join(file_name), contents)?;
    Ok(())
}

fn named(name: &str) -> Option<String> {
    Some(name.to_string())
}

#[test]
fn map_converts_identifiers_in_input_order() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    write_table(temp_dir.path(), "ids.tsv", IDS)?;
    let server = TestServer::start(&[temp_dir.path()])?;
    let client = server.client();

    let out = client.map(
        "ids",
        "geneId",
        "transcriptId",
        vec!["G1".into(), "G2".into(), "G3".into()],
    )?;
    assert_eq!(out, vec!["T1,T2", "", ""]);

    let out = client.map("ids", "proteinId", "geneId", vec!["P3".into(), "P1".into()])?;
    assert_eq!(out, vec!["G2", "G1"]);

    let out = client.map("ids", "geneId", "nosuchField", vec!["G1".into()])?;
    assert_eq!(out, vec![""]);
    Ok(())
}

#[test]
fn raw_exchange_follows_wire_format() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    write_table(temp_dir.path(), "ids.tsv", IDS)?;
    let server = TestServer::start(&[temp_dir.path()])?;

    let mut stream = TcpStream::connect(("127.0.0.1", server.port))?;
    stream.write_all(b"map ids geneId transcriptId\nG1\nG3\n")?;
    stream.shutdown(Shutdown::Write)?;
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    assert_eq!(response, "ROSE/0.1 200 OK\n\nT1,T2\n\n");

    let mut stream = TcpStream::connect(("127.0.0.1", server.port))?;
    stream.write_all(b"bogus command\n")?;
    stream.shutdown(Shutdown::Write)?;
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    assert_eq!(response, "ROSE/0.1 400 Bad Request\n");
    Ok(())
}

#[test]
fn unknown_table_is_not_found() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    write_table(temp_dir.path(), "ids.tsv", IDS)?;
    let server = TestServer::start(&[temp_dir.path()])?;

    let err = match server
        .client()
        .map("badtable", "geneId", "transcriptId", vec!["G1".into()])
    {
        Err(err) => err,
        Ok(out) => return Err(format!("expected error, got {out:?}").into()),
    };
    assert_eq!(err.kind(), ErrorKind::Status);
    assert_eq!(err.message(), Some("server response: 404 Not Found"));
    Ok(())
}

#[test]
fn lifecycle_commands_report_status() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    write_table(temp_dir.path(), "ids.tsv", IDS)?;
    write_table(temp_dir.path(), "genes.tsv", IDS)?;
    let server = TestServer::start(&[temp_dir.path()])?;

    assert_eq!(server.status(RoseCommand::Load(named("ids")))?, Status::CREATED);
    assert_eq!(server.status(RoseCommand::Unload(named("ids")))?, Status::NO_CONTENT);
    assert_eq!(server.status(RoseCommand::Unload(named("ids")))?, Status::NOT_FOUND);
    assert_eq!(server.status(RoseCommand::Reload(named("ids")))?, Status::RESET_CONTENT);
    assert_eq!(server.status(RoseCommand::Load(named("missing")))?, Status::NOT_FOUND);
    assert_eq!(server.status(RoseCommand::Load(None))?, Status::CREATED);
    assert_eq!(server.status(RoseCommand::Reload(None))?, Status::RESET_CONTENT);
    assert_eq!(server.status(RoseCommand::Unload(None))?, Status::NO_CONTENT);

    assert_eq!(server.client().list()?, vec!["genes", "ids"]);
    Ok(())
}

#[test]
fn reload_picks_up_file_changes() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    write_table(temp_dir.path(), "ids.tsv", IDS)?;
    let server = TestServer::start(&[temp_dir.path()])?;
    let client = server.client();

    let out = client.map("ids", "geneId", "transcriptId", vec!["G2".into()])?;
    assert_eq!(out, vec![""]);

    write_table(temp_dir.path(), "ids.tsv", "geneId\ttranscriptId\nG2\tT9\n")?;
    let out = client.map("ids", "geneId", "transcriptId", vec!["G2".into()])?;
    assert_eq!(out, vec![""], "loaded table is kept until reload");

    assert_eq!(server.status(RoseCommand::Reload(named("ids")))?, Status::RESET_CONTENT);
    let out = client.map("ids", "geneId", "transcriptId", vec!["G2".into()])?;
    assert_eq!(out, vec!["T9"]);
    Ok(())
}

#[test]
fn first_directory_wins_name_conflicts() -> TestResult<()> {
    let first = tempfile::tempdir()?;
    let second = tempfile::tempdir()?;
    write_table(first.path(), "ids.tsv", "a\tb\nx\tfirst\n")?;
    write_table(second.path(), "ids.tsv", "a\tb\nx\tsecond\n")?;
    write_table(second.path(), "extra.tsv", IDS)?;
    let server = TestServer::start(&[first.path(), second.path()])?;
    let client = server.client();

    assert_eq!(client.list()?, vec!["extra", "ids"]);
    assert_eq!(client.map("ids", "a", "b", vec!["x".into()])?, vec!["first"]);
    Ok(())
}

#[test]
fn no_tables_exits_with_unknown_table_code() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    let output = rosed(&[temp_dir.path()]).arg("--port").arg("0").output()?;
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no tables are available for loading"), "{stderr}");
    Ok(())
}

#[test]
fn check_reports_registered_tables_as_json() -> TestResult<()> {
    let temp_dir = tempfile::tempdir()?;
    write_table(temp_dir.path(), "ids.tsv", IDS)?;
    write_table(temp_dir.path(), "notes.txt", "ignored\n")?;
    let listing = temp_dir.path().join("tables.txt");
    std::fs::write(&listing, "# listed tables\n/does/not/exist.tsv\n")?;

    let output = rosed(&[temp_dir.path()])
        .arg("--tables")
        .arg(&listing)
        .args(["check", "--json"])
        .output()?;
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout)?;
    let check = &report["check"];
    assert_eq!(check["valid"], Value::Bool(true));
    assert_eq!(check["address"], "127.0.0.1:12053");
    assert_eq!(check["tables"].as_array().map(Vec::len), Some(1));
    assert_eq!(check["tables"][0]["name"], "ids");
    assert_eq!(check["rejected"][0]["path"], "/does/not/exist.tsv");
    assert_eq!(check["rejected"][0]["kind"], "Io");
    Ok(())
}

fn pick_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

fn wait_for_server(child: &mut Child, port: u16) -> TestResult<()> {
    let client = Client::from_host_port("127.0.0.1", port);
    let start = Instant::now();
    loop {
        if client.list().is_ok() {
            return Ok(());
        }
        if let Some(status) = child.try_wait()? {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                let _ = pipe.read_to_string(&mut stderr);
            }
            let detail = stderr.trim();
            return Err(format!(
                "server exited before ready (status: {status}, stderr: {})",
                if detail.is_empty() { "<empty>" } else { detail }
            )
            .into());
        }
        if start.elapsed() > Duration::from_secs(8) {
            return Err("server did not start in time".into());
        }
        sleep(Duration::from_millis(20));
    }
}
