use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_DIR: &str = "./logs";
pub const LOG_FILE_PREFIX: &str = "oi-tracker.log";

/// Initialize logging to both console and file.
/// Log files are created in ./logs with daily rotation; keep the returned
/// guard alive until shutdown so buffered lines are flushed.
pub fn init_logging() -> Result<WorkerGuard> {
    std::fs::create_dir_all(LOG_DIR).with_context(|| format!("Failed to create {}", LOG_DIR))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            // Console output
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_ansi(true),
        )
        .with(
            // File output with JSON formatting
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_ansi(false)
                .json(),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{error, info, warn};

    #[test]
    fn test_logging() {
        let _guard = init_logging().unwrap();

        info!(symbol = "NIFTY", "This is an info message");
        warn!("This is a warning message");
        error!("This is an error message");

        assert!(std::path::Path::new(LOG_DIR).exists());
        // A second subscriber cannot be installed
        assert!(init_logging().is_err());
    }
}
