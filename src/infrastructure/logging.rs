//! Logging configuration
//!
//! Initializes tracing for the engine and the CLI.

/// Initializes logging with the specified default level.
///
/// `RUST_LOG` takes precedence over `level` when set. Calling this more
/// than once in one process is a caller error; tests use per-test
/// subscribers instead.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .init();
}
