//! Logging setup for the registry binary.
//!
//! Console output always goes to stderr so command results on stdout stay
//! machine-readable. With file logging enabled two daily-rotated files are
//! written as well:
//!
//! - `dataset-registry.<date>.log`: everything that passes the filter
//! - `error.<date>.log`: warnings and errors only
//!
//! ```no_run
//! use dataset_registry::config::LoggingSettings;
//! use dataset_registry::logging;
//!
//! logging::init(&LoggingSettings::default()).expect("Failed to initialize logging");
//! tracing::info!("Registry started");
//! ```

use crate::config::{APP_DIR_NAME, LoggingSettings};
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

/// Gets the log directory, creating it if needed.
///
/// Uses `settings.log_dir` when set, otherwise `<data dir>/dataset-registry/logs`.
pub fn get_log_dir(settings: &LoggingSettings) -> Result<PathBuf> {
    let log_dir = match &settings.log_dir {
        Some(dir) => dir.clone(),
        None => dirs::data_dir()
            .context("Failed to determine data directory")?
            .join(APP_DIR_NAME)
            .join("logs"),
    };

    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }

    Ok(log_dir)
}

fn rolling(prefix: &str, log_dir: &Path) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(10)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("Failed to create {prefix} file appender"))
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `settings.level`.
///
/// # Errors
///
/// Returns error if a subscriber is already installed, the filter is invalid,
/// or file appenders cannot be created.
pub fn init(settings: &LoggingSettings) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .context("Failed to create env filter")?;

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    let file_layers = if settings.file_logging {
        let log_dir = get_log_dir(settings)?;

        let all_logs_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false)
            .with_writer(rolling(APP_DIR_NAME, &log_dir)?);

        let error_logs_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false)
            .with_writer(rolling("error", &log_dir)?)
            .with_filter(EnvFilter::new("warn"));

        Some(all_logs_layer.and_then(error_logs_layer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_get_log_dir_creates_configured_dir() {
        let dir = TempDir::new().unwrap();
        let settings = LoggingSettings {
            log_dir: Some(dir.path().join("logs")),
            ..LoggingSettings::default()
        };
        let log_dir = get_log_dir(&settings).unwrap();
        assert!(log_dir.is_dir());
        assert!(log_dir.ends_with("logs"));
    }
}
