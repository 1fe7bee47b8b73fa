#![forbid(unsafe_code)]

//! Output path templates handed to the downloader.
//!
//! Every descriptor gets its own `OutputTemplate` value; nothing here keeps a
//! shared default that a later channel could observe.

use crate::policy::VideoEntry;
use crate::subscriptions::ChannelDescriptor;
use std::path::Path;

const CHANNEL_TOKEN: &str = "%(channel)s";
const SEASON_DIR_TOKEN: &str = "Season %(upload_date>%y)s";
const SEASON_TOKEN: &str = "S%(upload_date>%y)s";
const EPISODE_TOKEN: &str = "E%(upload_date>%m%d)s";
const BASE_LAYOUT: &str =
    "%(channel)s/Season %(upload_date>%y)s/%(title)s (S%(upload_date>%y)sE%(upload_date>%m%d)s).%(ext)s";

/// Output template for one channel. In sequence mode the episode token is
/// left in place and swapped for the entry index by [`OutputTemplate::for_entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTemplate {
    pattern: String,
    index_episodes: bool,
}

impl OutputTemplate {
    pub fn build(descriptor: &ChannelDescriptor, downloads_root: &Path) -> Self {
        let root = downloads_root.to_string_lossy();
        let root = root.trim_end_matches('/');
        let mut pattern = if root.is_empty() {
            BASE_LAYOUT.to_string()
        } else {
            format!("{root}/{BASE_LAYOUT}")
        };

        if let Some(parent) = &descriptor.parent_folder {
            pattern = pattern.replace(CHANNEL_TOKEN, &format!("{parent}/{CHANNEL_TOKEN}"));
        }
        if let Some(channel) = &descriptor.channel_name {
            pattern = pattern.replace(CHANNEL_TOKEN, channel);
        }
        if descriptor.order_by_sequence {
            pattern = pattern
                .replace(SEASON_DIR_TOKEN, "Season 1")
                .replace(SEASON_TOKEN, "S1");
        }

        Self {
            pattern,
            index_episodes: descriptor.order_by_sequence,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Template for a single entry.
    pub fn for_entry(&self, entry: &VideoEntry) -> String {
        if self.index_episodes {
            self.pattern
                .replace(EPISODE_TOKEN, &format!("E{}", entry.playlist_index))
        } else {
            self.pattern.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(index: usize) -> VideoEntry {
        VideoEntry {
            url: format!("https://example.com/watch?v={index}"),
            title: format!("Video {index}"),
            upload_date: None,
            live_status: None,
            playlist_index: index,
        }
    }

    fn root() -> PathBuf {
        PathBuf::from("/yt")
    }

    #[test]
    fn base_template_keeps_every_token() {
        let template = OutputTemplate::build(&ChannelDescriptor::new("https://x"), &root());
        assert_eq!(
            template.as_str(),
            "/yt/%(channel)s/Season %(upload_date>%y)s/%(title)s (S%(upload_date>%y)sE%(upload_date>%m%d)s).%(ext)s"
        );
        assert_eq!(template.for_entry(&entry(3)), template.as_str());
    }

    #[test]
    fn parent_and_channel_are_resolved() {
        let descriptor = ChannelDescriptor::new("https://x")
            .with_parent_folder("shared")
            .with_channel_name("Foo");
        let template = OutputTemplate::build(&descriptor, &root());
        assert_eq!(
            template.as_str(),
            "/yt/shared/Foo/Season %(upload_date>%y)s/%(title)s (S%(upload_date>%y)sE%(upload_date>%m%d)s).%(ext)s"
        );
        assert!(!template.as_str().contains("%(channel)s"));
        assert!(!template.as_str().contains("shared/shared"));
    }

    #[test]
    fn parent_without_override_keeps_channel_token() {
        let descriptor = ChannelDescriptor::new("https://x").with_parent_folder("shared");
        let template = OutputTemplate::build(&descriptor, &root());
        assert!(template.as_str().starts_with("/yt/shared/%(channel)s/Season "));
    }

    #[test]
    fn sequence_mode_uses_season_one_and_entry_index() {
        let descriptor = ChannelDescriptor::new("https://x")
            .with_channel_name("Course")
            .with_order_by_sequence(true);
        let template = OutputTemplate::build(&descriptor, &root());
        assert_eq!(
            template.as_str(),
            "/yt/Course/Season 1/%(title)s (S1E%(upload_date>%m%d)s).%(ext)s"
        );
        assert_eq!(
            template.for_entry(&entry(7)),
            "/yt/Course/Season 1/%(title)s (S1E7).%(ext)s"
        );
        // The per-entry value never leaks back into the channel template.
        assert_eq!(
            template.for_entry(&entry(8)),
            "/yt/Course/Season 1/%(title)s (S1E8).%(ext)s"
        );
    }

    #[test]
    fn templates_are_independent_between_channels() {
        let first = OutputTemplate::build(
            &ChannelDescriptor::new("https://a")
                .with_channel_name("A")
                .with_order_by_sequence(true),
            &root(),
        );
        let second = OutputTemplate::build(
            &ChannelDescriptor::new("https://b").with_channel_name("B"),
            &root(),
        );
        assert!(first.as_str().contains("Season 1"));
        assert!(second.as_str().contains("Season %(upload_date>%y)s"));
        assert!(second.as_str().starts_with("/yt/B/"));
    }

    #[test]
    fn trailing_slash_on_root_is_ignored() {
        let template = OutputTemplate::build(
            &ChannelDescriptor::new("https://x").with_channel_name("C"),
            Path::new("/yt/"),
        );
        assert!(template.as_str().starts_with("/yt/C/"));
    }
}
