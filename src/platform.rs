#![forbid(unsafe_code)]

//! Port to the video platform. The sync engine only talks to this trait so
//! tests can drive it with a scripted fake; production uses `ytdlp::YtDlp`.

use crate::error::Result;
use crate::policy::RawEntry;
use async_trait::async_trait;

/// Result of a metadata-only listing query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub entries: Vec<RawEntry>,
    pub playlist_count: Option<usize>,
}

/// Format profile requested for a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatProfile {
    /// 1080p mp4 when available.
    Default,
    /// Best streams, remuxed into mkv.
    Best,
}

impl FormatProfile {
    pub fn for_best(use_best_format: bool) -> Self {
        if use_best_format { Self::Best } else { Self::Default }
    }

    pub fn selector(self) -> &'static str {
        match self {
            Self::Default => {
                "bv*[height<=1080][ext=mp4]+ba[ext=m4a]/b[height<=1080][ext=mp4] / bv*+ba/b"
            }
            Self::Best => "bestvideo+bestaudio/best",
        }
    }

    /// Container to convert into after download, if any.
    pub fn recode_to(self) -> Option<&'static str> {
        match self {
            Self::Default => None,
            Self::Best => Some("mkv"),
        }
    }
}

#[async_trait]
pub trait Platform: Send + Sync {
    /// Lists a channel or playlist without transferring media. An empty
    /// answer from the platform is a `SyncError::Fetch`.
    async fn fetch_listing(&self, url: &str) -> Result<Listing>;

    /// Upload date of one video as `YYYYMMDD`, if the platform reports it.
    async fn fetch_upload_date(&self, url: &str) -> Result<Option<u32>>;

    /// Downloads one video using `output_template` for its file name.
    async fn download(&self, url: &str, output_template: &str, format: FormatProfile)
    -> Result<()>;
}

/// Parses an 8-digit `YYYYMMDD` string.
pub fn parse_upload_date(value: &str) -> Option<u32> {
    let trimmed = value.trim();
    if trimmed.len() != 8 || !trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_upload_date_accepts_only_eight_digits() {
        assert_eq!(parse_upload_date("20230101"), Some(20230101));
        assert_eq!(parse_upload_date(" 20231231 "), Some(20231231));
        assert_eq!(parse_upload_date("2023-01-01"), None);
        assert_eq!(parse_upload_date("230101"), None);
        assert_eq!(parse_upload_date(""), None);
    }

    #[test]
    fn format_profiles_map_to_selectors() {
        assert_eq!(FormatProfile::for_best(false), FormatProfile::Default);
        assert_eq!(FormatProfile::for_best(true), FormatProfile::Best);
        assert!(FormatProfile::Default.selector().contains("height<=1080"));
        assert_eq!(FormatProfile::Best.selector(), "bestvideo+bestaudio/best");
        assert_eq!(FormatProfile::Default.recode_to(), None);
        assert_eq!(FormatProfile::Best.recode_to(), Some("mkv"));
    }
}
