#![forbid(unsafe_code)]

//! Channel descriptors and the subscription file they are loaded from.
//!
//! The file groups channels by parent folder:
//!
//! ```toml
//! [shared."Some Channel"]
//! url = "https://www.youtube.com/@some"
//! order_seq = true
//! ```

use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::{fs, path::Path};

/// Window used by scheduled syncs when a channel does not set `max_videos`.
pub const DEFAULT_MAX_VIDEOS: usize = 52;
/// Window used by backfills when the caller does not pick one.
pub const DEFAULT_BACKFILL_VIDEOS: usize = 100;

/// One configured channel or playlist. Built fresh from configuration for
/// every run and never mutated while a sync is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub url: String,
    pub channel_name: Option<String>,
    pub parent_folder: Option<String>,
    pub order_by_sequence: bool,
    pub use_best_format: bool,
    pub max_videos: usize,
    pub ephemeral: bool,
}

impl ChannelDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            channel_name: None,
            parent_folder: None,
            order_by_sequence: false,
            use_best_format: false,
            max_videos: DEFAULT_MAX_VIDEOS,
            ephemeral: false,
        }
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = Some(name.into());
        self
    }

    pub fn with_parent_folder(mut self, parent: impl Into<String>) -> Self {
        self.parent_folder = Some(parent.into());
        self
    }

    pub fn with_order_by_sequence(mut self, enabled: bool) -> Self {
        self.order_by_sequence = enabled;
        self
    }

    pub fn with_max_videos(mut self, max_videos: usize) -> Self {
        self.max_videos = max_videos;
        self
    }

    /// Name stored next to history rows and used in log lines.
    pub fn label(&self) -> &str {
        self.channel_name.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Deserialize)]
struct ChannelOptions {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    order_seq: bool,
    #[serde(default)]
    best_format: bool,
    #[serde(default)]
    max_videos: Option<usize>,
    #[serde(default)]
    ephemeral: bool,
}

/// Reads the subscription file from disk.
pub fn load_subscriptions(path: &Path) -> Result<Vec<ChannelDescriptor>> {
    let raw = fs::read_to_string(path).map_err(|err| {
        SyncError::config(format!("reading subscriptions {}: {err}", path.display()))
    })?;
    parse_subscriptions(&raw)
}

/// Turns the subscription document into descriptors in document order.
/// Invalid channels are logged and left out so the rest still sync.
pub fn parse_subscriptions(raw: &str) -> Result<Vec<ChannelDescriptor>> {
    let table: toml::Table = toml::from_str(raw)
        .map_err(|err| SyncError::config(format!("parsing subscriptions: {err}")))?;

    let mut descriptors = Vec::new();
    for (parent, group) in table {
        let toml::Value::Table(channels) = group else {
            tracing::error!(parent = %parent, "subscription group is not a table; ignoring");
            continue;
        };
        for (channel, options) in channels {
            match descriptor_from(&parent, &channel, options) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(err) => tracing::error!(parent = %parent, channel = %channel, "{err}"),
            }
        }
    }
    Ok(descriptors)
}

fn descriptor_from(parent: &str, channel: &str, value: toml::Value) -> Result<ChannelDescriptor> {
    let options: ChannelOptions = value
        .try_into()
        .map_err(|err| SyncError::config(format!("invalid options for {channel}: {err}")))?;
    let url = options
        .url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| SyncError::config(format!("channel {channel} has no url")))?;
    if options.max_videos == Some(0) {
        return Err(SyncError::config(format!(
            "channel {channel} sets max_videos to 0"
        )));
    }

    Ok(ChannelDescriptor {
        url,
        channel_name: Some(channel.to_string()),
        parent_folder: Some(parent.to_string()),
        order_by_sequence: options.order_seq,
        use_best_format: options.best_format,
        max_videos: options.max_videos.unwrap_or(DEFAULT_MAX_VIDEOS),
        ephemeral: options.ephemeral,
    })
}

/// Finds a configured channel by name. When a name appears under several
/// parents the last one wins.
pub fn find_channel<'a>(
    descriptors: &'a [ChannelDescriptor],
    name: &str,
) -> Option<&'a ChannelDescriptor> {
    descriptors
        .iter()
        .rev()
        .find(|descriptor| descriptor.channel_name.as_deref() == Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[shared."Foo Channel"]
url = "https://www.youtube.com/@foo"

[shared.Bar]
url = "https://www.youtube.com/playlist?list=PL123"
order_seq = true
best_format = true
max_videos = 10

[kids.Cartoons]
url = "https://www.youtube.com/@cartoons"
ephemeral = true
"#;

    #[test]
    fn parses_descriptors_in_document_order() {
        let descriptors = parse_subscriptions(SAMPLE).unwrap();
        let names: Vec<_> = descriptors.iter().map(|d| d.label()).collect();
        assert_eq!(names, vec!["Foo Channel", "Bar", "Cartoons"]);

        let foo = &descriptors[0];
        assert_eq!(foo.url, "https://www.youtube.com/@foo");
        assert_eq!(foo.parent_folder.as_deref(), Some("shared"));
        assert!(!foo.order_by_sequence);
        assert!(!foo.use_best_format);
        assert_eq!(foo.max_videos, DEFAULT_MAX_VIDEOS);
        assert!(!foo.ephemeral);

        let bar = &descriptors[1];
        assert!(bar.order_by_sequence);
        assert!(bar.use_best_format);
        assert_eq!(bar.max_videos, 10);

        let cartoons = &descriptors[2];
        assert_eq!(cartoons.parent_folder.as_deref(), Some("kids"));
        assert!(cartoons.ephemeral);
    }

    #[test]
    fn channels_without_url_are_skipped() {
        let raw = r#"
[shared.Missing]
order_seq = true

[shared.Blank]
url = "  "

[shared.Good]
url = "https://www.youtube.com/@good"
"#;
        let descriptors = parse_subscriptions(raw).unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].label(), "Good");
    }

    #[test]
    fn zero_window_is_rejected() {
        let raw = "[shared.Zero]\nurl = \"https://x\"\nmax_videos = 0\n";
        assert!(parse_subscriptions(raw).unwrap().is_empty());
    }

    #[test]
    fn malformed_document_is_a_config_error() {
        let err = parse_subscriptions("[shared\nurl=").unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_subscriptions(&dir.path().join("subs.toml")).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{SAMPLE}").unwrap();
        let descriptors = load_subscriptions(file.path()).unwrap();
        assert_eq!(descriptors.len(), 3);
    }

    #[test]
    fn find_channel_matches_by_name() {
        let descriptors = parse_subscriptions(SAMPLE).unwrap();
        let found = find_channel(&descriptors, "Bar").unwrap();
        assert_eq!(found.url, "https://www.youtube.com/playlist?list=PL123");
        assert!(find_channel(&descriptors, "bar").is_none());
        assert!(find_channel(&descriptors, "Nope").is_none());
    }

    #[test]
    fn find_channel_prefers_last_duplicate() {
        let raw = r#"
[a.Same]
url = "https://first"

[b.Same]
url = "https://second"
"#;
        let descriptors = parse_subscriptions(raw).unwrap();
        assert_eq!(find_channel(&descriptors, "Same").unwrap().url, "https://second");
    }
}
