#![forbid(unsafe_code)]

//! Process-wide `tracing` setup.
//!
//! Without a log directory events go to stderr. With one, they are appended
//! to a file named after the current day so a cron-driven run leaves one file
//! per day behind.

use crate::error::{Result, SyncError};
use chrono::NaiveDate;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const DEFAULT_FILTER: &str = "info";
const LOG_SUBDIR: &str = "tubesync";

/// `<log_dir>/tubesync/<YYYYMMDD>.log`
pub fn log_file_path(log_dir: &Path, day: NaiveDate) -> PathBuf {
    log_dir
        .join(LOG_SUBDIR)
        .join(format!("{}.log", day.format("%Y%m%d")))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber. Returns the log file in use, if any.
pub fn init_logging(log_dir: Option<&Path>) -> Result<Option<PathBuf>> {
    let registry = tracing_subscriber::registry().with(env_filter());

    let Some(log_dir) = log_dir else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|err| SyncError::config(format!("initializing logging: {err}")))?;
        return Ok(None);
    };

    let path = log_file_path(log_dir, chrono::Local::now().date_naive());
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    registry
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|err| SyncError::config(format!("initializing logging: {err}")))?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_file_lives_under_tool_directory() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            log_file_path(Path::new("/var/log"), day),
            PathBuf::from("/var/log/tubesync/20240309.log")
        );
    }
}
