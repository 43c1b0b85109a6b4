//! Logging setup. Logs go to stderr so stdout only carries the report.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `info` (or `debug` when verbose)
/// is used for this crate and `warn` for everything else.
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,raw_loader={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!("Failed to initialize logging: {}", err))?;

    tracing::trace!("Logging initialized: level={}", level);
    Ok(())
}
