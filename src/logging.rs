//! File logging. The terminal belongs to the UI, so logs go to
//! `$XDG_DATA_HOME/ghpm/ghpm.log`.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_ENV: &str = "GHPM_LOG";
const DEFAULT_FILTER: &str = "ghpm=info,warn";

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the program; dropping it flushes pending log lines.
pub fn init(dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(dir, "ghpm.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  tracing_subscriber::registry()
    .with(filter)
    .with(
      fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  tracing::info!(path = %dir.join("ghpm.log").display(), "Logging initialized");
  Ok(guard)
}
