#![forbid(unsafe_code)]

//! `Platform` implementation that shells out to `yt-dlp`.
//!
//! Listings use `--flat-playlist` so no media is touched, date lookups use
//! `--skip-download`, and downloads write the media plus its thumbnail,
//! description and `info.json` next to it.

use crate::error::{Result, SyncError};
use crate::platform::{FormatProfile, Listing, Platform, parse_upload_date};
use crate::policy::RawEntry;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;

pub const YT_DLP_PROGRAM: &str = "yt-dlp";

/// Only the fields of a flat playlist dump the listing needs.
#[derive(Debug, Deserialize)]
struct FlatPlaylist {
    #[serde(default)]
    entries: Vec<Option<RawEntry>>,
    #[serde(default)]
    playlist_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SingleVideo {
    #[serde(default)]
    upload_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
    cookies: Option<PathBuf>,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlp {
    pub fn new() -> Self {
        Self::with_program(YT_DLP_PROGRAM)
    }

    /// Uses a specific executable instead of `yt-dlp` from `PATH`.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cookies: None,
        }
    }

    pub fn with_cookies(mut self, cookies: Option<PathBuf>) -> Self {
        self.cookies = cookies;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.stdin(Stdio::null()).kill_on_drop(true);
        if let Some(cookies) = self.cookies.as_deref().filter(|path| path.exists()) {
            command.arg("--cookies").arg(cookies);
        }
        command
    }

    async fn run_for_json(&self, mut command: Command, url: &str) -> Result<Output> {
        let output = command
            .stderr(Stdio::piped())
            .stdout(Stdio::piped())
            .output()
            .await
            .map_err(|err| {
                SyncError::fetch(url, format!("running {}: {err}", self.program.display()))
            })?;
        if !output.status.success() {
            return Err(SyncError::fetch(
                url,
                format!(
                    "metadata command failed (status {}): {}",
                    output.status,
                    last_line(&output.stderr)
                ),
            ));
        }
        Ok(output)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

fn last_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// Decodes the JSON printed by `--flat-playlist --dump-single-json`.
fn parse_listing(url: &str, stdout: &[u8]) -> Result<Listing> {
    let parsed: Option<FlatPlaylist> = serde_json::from_slice(stdout)
        .map_err(|err| SyncError::fetch(url, format!("decoding listing: {err}")))?;
    let Some(playlist) = parsed else {
        return Err(SyncError::fetch(url, "platform returned no data"));
    };
    Ok(Listing {
        entries: playlist.entries.into_iter().flatten().collect(),
        playlist_count: playlist.playlist_count,
    })
}

#[async_trait]
impl Platform for YtDlp {
    async fn fetch_listing(&self, url: &str) -> Result<Listing> {
        let mut command = self.command();
        command
            .arg("--flat-playlist")
            .arg("--dump-single-json")
            .arg("--no-warnings")
            .arg(url);
        let output = self.run_for_json(command, url).await?;
        parse_listing(url, &output.stdout)
    }

    async fn fetch_upload_date(&self, url: &str) -> Result<Option<u32>> {
        let mut command = self.command();
        command
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg(url);
        let output = self.run_for_json(command, url).await?;
        let info: Option<SingleVideo> = serde_json::from_slice(&output.stdout)
            .map_err(|err| SyncError::fetch(url, format!("decoding video metadata: {err}")))?;
        Ok(info
            .and_then(|info| info.upload_date)
            .as_deref()
            .and_then(parse_upload_date))
    }

    async fn download(
        &self,
        url: &str,
        output_template: &str,
        format: FormatProfile,
    ) -> Result<()> {
        let mut command = self.command();
        command
            .arg("--format")
            .arg(format.selector())
            .arg("--output")
            .arg(output_template)
            .arg("--write-thumbnail")
            .arg("--write-description")
            .arg("--write-info-json")
            .arg("--no-progress")
            .arg("--no-warnings");
        if let Some(container) = format.recode_to() {
            command.arg("--recode-video").arg(container);
        }
        command.arg(url);

        let output = command
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| {
                SyncError::download(url, format!("running {}: {err}", self.program.display()))
            })?;
        if !output.status.success() {
            return Err(SyncError::download(
                url,
                format!("status {}: {}", output.status, last_line(&output.stderr)),
            ));
        }
        Ok(())
    }
}
