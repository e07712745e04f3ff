//! Logging setup for the `chainvault` binary.
//!
//! Plain `tracing-subscriber` fmt output on stderr, filtered by `RUST_LOG`
//! when set and by the configured level otherwise. Stdout is left for the
//! JSON reports the commands print.

use tracing_subscriber::EnvFilter;

/// Call once at startup, before any `tracing` events are emitted.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
