//! Structured logging setup for the demo binary and integration tests.
//!
//! `tracing` itself is load-bearing for the engine's own retry-threshold
//! warnings (`cellmesh-invoke::invocation::log_retry`); this module only
//! wires a subscriber so those events are visible when a binary starts
//! up, the way `kimberlite-cli` initializes its own subscriber before
//! dispatching to a command.

use tracing_subscriber::EnvFilter;

/// Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`
/// (default `info` if unset). Safe to call once per process; a second
/// call is a no-op rather than a panic, since tests may share a process
/// with the demo binary's own init.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
