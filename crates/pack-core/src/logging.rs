//! Logging and observability
//!
//! Structured logging for pack-core and the `pack` CLI. Initialization is
//! idempotent so both the binary and test harnesses can call it freely.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging system at the default (`info`) level, or the level
/// named by `RUST_LOG` if set.
pub fn init() -> anyhow::Result<()> {
    init_with_verbosity(false)
}

/// Initialize the logging system, forcing `debug` level when `verbose` is
/// set and `RUST_LOG` is not already present in the environment. `--verbose`
/// at the CLI also gates the lifecycle's own `-log-level debug` argument
/// (see `phase::with_log_level`), so the two stay in sync.
pub fn init_with_verbosity(verbose: bool) -> anyhow::Result<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    Ok(())
}
