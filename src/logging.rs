use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `ticketdesk=debug`
pub const LOG_ENV: &str = "TICKETDESK_LOG";

/// Directory for the rolling log files
pub fn log_dir() -> PathBuf {
  dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .map(|d| d.join("ticketdesk").join("logs"))
    .unwrap_or_else(|| PathBuf::from("logs"))
}

/// Install the global subscriber.
///
/// Logs go to a daily rolling file; the terminal belongs to the UI. Keep the
/// returned guard alive until exit so buffered lines are flushed.
pub fn init(verbose: bool) -> Result<WorkerGuard> {
  let default = if verbose { "ticketdesk=debug,warn" } else { "ticketdesk=info,warn" };
  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

  let dir = log_dir();
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
  let file_appender = tracing_appender::rolling::daily(&dir, "ticketdesk.log");
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_filter(filter),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}
