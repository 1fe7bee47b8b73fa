#![forbid(unsafe_code)]

//! Error kinds shared by the sync engine. Each variant maps to one failure
//! class with its own propagation rule: configuration problems end a single
//! request, fetch problems skip a channel, download problems skip an entry and
//! only missing startup configuration aborts the process.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{key} not set")]
    StartupConfigMissing { key: &'static str },

    #[error("no entries returned for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("history store error: {0}")]
    History(#[from] libsql::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn fetch(url: &str, reason: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.to_owned(),
            reason: reason.into(),
        }
    }

    pub fn download(url: &str, reason: impl Into<String>) -> Self {
        Self::Download {
            url: url.to_owned(),
            reason: reason.into(),
        }
    }

    /// True for failures that must stop the whole process rather than a
    /// single request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StartupConfigMissing { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_startup_errors_are_fatal() {
        assert!(SyncError::StartupConfigMissing { key: "DOWNLOADS_ROOT" }.is_fatal());
        assert!(!SyncError::config("bad").is_fatal());
        assert!(!SyncError::fetch("u", "empty").is_fatal());
        assert!(!SyncError::download("u", "status 1").is_fatal());
    }

    #[test]
    fn messages_name_the_failing_url() {
        let err = SyncError::download("https://example.com/watch?v=a", "exit status 1");
        assert_eq!(
            err.to_string(),
            "download failed for https://example.com/watch?v=a: exit status 1"
        );
        let err = SyncError::StartupConfigMissing { key: "SUBSCRIPTIONS_PATH" };
        assert_eq!(err.to_string(), "SUBSCRIPTIONS_PATH not set");
    }
}
