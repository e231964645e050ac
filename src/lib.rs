//! Purpose: Identifier conversion engine and `ROSE/0.1` server/client shared by `rosed` and `rose`.
//! Exports: `cli` (shared binary plumbing), `core` (tables, projections, errors), `registry`, `protocol`, `dispatch`, `serve`, `client`.
//! Role: Library backing both binaries and the integration tests.
//! Invariants: No process-wide state; the registry is an explicit value passed to the server.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod cli;
pub mod client;
pub mod core;
pub mod dispatch;
pub mod protocol;
pub mod registry;
pub mod serve;
pub mod table_paths;
