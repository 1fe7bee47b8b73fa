#![forbid(unsafe_code)]

//! Age-based cleanup for channels flagged `ephemeral`.
//!
//! Only files one folder below the channel directory are considered, which
//! is where the season folders put media and sidecar files.

use crate::error::Result;
use crate::subscriptions::ChannelDescriptor;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Library folder of one channel: `<library_root>/<parent?>/<channel>`.
pub fn channel_dir(library_root: &Path, descriptor: &ChannelDescriptor) -> Option<PathBuf> {
    let channel = descriptor.channel_name.as_deref()?;
    let mut dir = library_root.to_path_buf();
    if let Some(parent) = &descriptor.parent_folder {
        dir.push(parent);
    }
    dir.push(channel);
    Some(dir)
}

/// Deletes files older than `max_age_days` from every ephemeral channel and
/// returns what was removed.
pub fn sweep_ephemeral(
    descriptors: &[ChannelDescriptor],
    library_root: &Path,
    max_age_days: u64,
    now: SystemTime,
) -> Result<Vec<PathBuf>> {
    let max_age = Duration::from_secs(max_age_days.saturating_mul(SECONDS_PER_DAY));
    let mut deleted = Vec::new();

    for descriptor in descriptors.iter().filter(|descriptor| descriptor.ephemeral) {
        let Some(dir) = channel_dir(library_root, descriptor) else {
            tracing::warn!(url = %descriptor.url, "ephemeral channel without a name; skipping sweep");
            continue;
        };
        if !dir.is_dir() {
            continue;
        }

        for entry in WalkDir::new(&dir)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
        {
            let modified = entry.metadata().ok().and_then(|meta| meta.modified().ok());
            let Some(modified) = modified else {
                continue;
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age <= max_age {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    tracing::info!(channel = descriptor.label(), path = %entry.path().display(), "deleted expired file");
                    deleted.push(entry.into_path());
                }
                Err(err) => {
                    tracing::warn!(path = %entry.path().display(), "could not delete expired file: {err}");
                }
            }
        }
    }

    Ok(deleted)
}
