#![forbid(unsafe_code)]

//! Filtering and ordering of a channel listing.
//!
//! The order is decided from the upload dates of the first and last entries
//! only. Fetching dates for every entry would cost one platform round trip per
//! video, so the two samples are all we ask for.

use crate::subscriptions::ChannelDescriptor;
use serde::Deserialize;

/// Title the platform reports for videos we cannot access.
pub const PRIVATE_VIDEO_TITLE: &str = "[Private video]";
/// Window used for sequence-ordered channels, large enough to cover a whole
/// playlist in practice.
pub const SEQUENCE_WINDOW: usize = 1000;

/// One item of a flat listing, before filtering.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RawEntry {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub live_status: Option<String>,
}

/// An entry that survived filtering and carries its position in the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEntry {
    pub url: String,
    pub title: String,
    pub upload_date: Option<u32>,
    pub live_status: Option<String>,
    pub playlist_index: usize,
}

/// Upload dates of the first and last surviving entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundaryDates {
    pub first: Option<u32>,
    pub last: Option<u32>,
}

impl BoundaryDates {
    /// True when the listing runs oldest-first.
    pub fn ascending(&self) -> bool {
        matches!((self.first, self.last), (Some(first), Some(last)) if last > first)
    }
}

fn is_unwanted(entry: &RawEntry) -> bool {
    entry.title.as_deref() == Some(PRIVATE_VIDEO_TITLE) || entry.live_status.is_some()
}

/// Drops private and live entries as well as entries without a usable URL.
/// The result keeps platform order and has no index assigned yet.
pub fn filter_entries(raw: Vec<RawEntry>) -> Vec<VideoEntry> {
    raw.into_iter()
        .filter(|entry| !is_unwanted(entry))
        .filter_map(|entry| {
            let url = entry
                .url
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty());
            let Some(url) = url else {
                tracing::warn!(
                    title = entry.title.as_deref().unwrap_or(""),
                    "ignoring listing entry without url"
                );
                return None;
            };
            Some(VideoEntry {
                url,
                title: entry.title.unwrap_or_default(),
                upload_date: None,
                live_status: entry.live_status,
                playlist_index: 0,
            })
        })
        .collect()
}

/// How many entries a run may consider.
pub fn window_bound(descriptor: &ChannelDescriptor, playlist_count: Option<usize>) -> usize {
    let configured = if descriptor.order_by_sequence {
        SEQUENCE_WINDOW
    } else {
        descriptor.max_videos
    };
    match playlist_count {
        Some(count) => configured.min(count),
        None => configured,
    }
}

/// Picks the window and assigns 1-based indices.
///
/// Sequence channels keep platform order. Date channels keep the newest
/// entries of the window and emit them oldest-first so that the first
/// download is the earliest episode.
pub fn order_entries(
    entries: Vec<VideoEntry>,
    descriptor: &ChannelDescriptor,
    playlist_count: Option<usize>,
    dates: BoundaryDates,
) -> Vec<VideoEntry> {
    let bound = window_bound(descriptor, playlist_count);

    let mut ordered: Vec<VideoEntry> = if descriptor.order_by_sequence {
        entries.into_iter().take(bound).collect()
    } else {
        let newest_first: Vec<VideoEntry> = if dates.ascending() {
            entries.into_iter().rev().collect()
        } else {
            entries
        };
        let mut window: Vec<VideoEntry> = newest_first.into_iter().take(bound).collect();
        window.reverse();
        window
    };

    for (position, entry) in ordered.iter_mut().enumerate() {
        entry.playlist_index = position + 1;
    }
    ordered
}
