//! Tracing initialization for the QoS daemon.
//!
//! Console output only. `RUST_LOG` wins over the configured level, so
//! operators can turn on `qos::activity=info` or module-level debug output
//! without touching the config file.

use tracing_subscriber::EnvFilter;

/// Build the level filter, preferring `RUST_LOG` when it is set and valid.
pub fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the `tracing` subscriber.
///
/// Call this once at startup, before any `tracing` events are emitted.
pub fn init(level: &str) {
    tracing_subscriber::fmt().with_env_filter(filter(level)).init();
}
