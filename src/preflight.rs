#![forbid(unsafe_code)]

//! Checks run by the binary before any channel work starts.

use crate::error::{Result, SyncError};
use nix::unistd::Uid;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Refuses to run as root.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        return Err(SyncError::config(format!(
            "{process} must not be run as root; use a regular user or a dedicated service account"
        )));
    }
    Ok(())
}

/// Confirms the downloader answers `--version` and returns what it printed.
pub async fn ensure_program_available(program: &Path) -> Result<String> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|err| {
            SyncError::config(format!("{} is not available: {err}", program.display()))
        })?;
    if !output.status.success() {
        return Err(SyncError::config(format!(
            "{} --version exited with {}",
            program.display(),
            output.status
        )));
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    tracing::debug!(program = %program.display(), %version, "downloader available");
    Ok(version)
}
