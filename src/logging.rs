//! Structured logging setup.
//!
//! `RUST_LOG` takes precedence over the configured level so a single run
//! can be made chattier without touching the config file.

use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber. Calling it twice is harmless,
/// the second call is ignored.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
