//! Tracing subscriber setup for binaries

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Install a global fmt subscriber writing to stderr
///
/// Honors `RUST_LOG`; falls back to [`DEFAULT_FILTER`]. Calling twice is a
/// no-op (the second install fails silently).
pub fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let result = if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
    };

    if let Err(err) = result {
        tracing::debug!(error = %err, "tracing subscriber already installed");
    }
}
