#![forbid(unsafe_code)]

//! Channel synchronization: fetch, filter, order, dedup against history and
//! download whatever is left.
//!
//! A channel moves through `Fetching → Filtering → Deduplicating →
//! Downloading → Done`, and may jump from `Fetching` straight to `Done` when
//! the platform has nothing for it. Channels run concurrently; the entries of
//! one channel are downloaded strictly one after another so sequence indices
//! and output paths never overlap. History is written only after a download
//! has been confirmed, which keeps an interrupted run safe to repeat.

use crate::error::{Result, SyncError};
use crate::history::{HistoryStore, RecordOutcome};
use crate::platform::{FormatProfile, Platform};
use crate::policy::{BoundaryDates, VideoEntry, filter_entries, order_entries};
use crate::subscriptions::{ChannelDescriptor, find_channel};
use crate::template::OutputTemplate;
use chrono::Utc;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Channel name used for one-off downloads without an override.
pub const SINGLE_URL_CHANNEL: &str = "MISC";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Fetching,
    Filtering,
    Deduplicating,
    Downloading,
    Done,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncPhase::Fetching => "fetching",
            SyncPhase::Filtering => "filtering",
            SyncPhase::Deduplicating => "deduplicating",
            SyncPhase::Downloading => "downloading",
            SyncPhase::Done => "done",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed,
    /// The platform returned nothing usable; the channel was not touched.
    Skipped { reason: String },
}

/// What happened to one channel during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub channel: String,
    pub url: String,
    pub outcome: SyncOutcome,
    pub candidates: usize,
    pub already_downloaded: usize,
    pub downloaded: Vec<String>,
    pub failed: Vec<String>,
    /// Downloaded but the history write failed; these will be fetched again
    /// on the next run.
    pub unrecorded: Vec<String>,
}

impl SyncReport {
    fn new(descriptor: &ChannelDescriptor) -> Self {
        Self {
            channel: descriptor.label().to_string(),
            url: descriptor.url.clone(),
            outcome: SyncOutcome::Completed,
            candidates: 0,
            already_downloaded: 0,
            downloaded: Vec::new(),
            failed: Vec::new(),
            unrecorded: Vec::new(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, SyncOutcome::Skipped { .. })
    }
}

/// Totals over a batch of channels.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<SyncReport>,
    /// Channels whose run ended with an error instead of a report.
    pub errors: Vec<(String, SyncError)>,
}

impl BatchSummary {
    pub fn downloaded(&self) -> usize {
        self.reports.iter().map(|report| report.downloaded.len()).sum()
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().map(|report| report.failed.len()).sum()
    }

    pub fn skipped(&self) -> usize {
        self.reports.iter().filter(|report| report.is_skipped()).count()
    }
}

/// The sync engine. Cheap to clone; every clone shares the same platform and
/// history handles.
#[derive(Clone)]
pub struct ChannelSync {
    platform: Arc<dyn Platform>,
    history: Arc<dyn HistoryStore>,
    downloads_root: PathBuf,
}

impl ChannelSync {
    pub fn new(
        platform: Arc<dyn Platform>,
        history: Arc<dyn HistoryStore>,
        downloads_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            platform,
            history,
            downloads_root: downloads_root.into(),
        }
    }

    /// Syncs every descriptor concurrently, one task per channel. Failures
    /// stay inside their channel.
    pub async fn refresh_all_channels(&self, descriptors: Vec<ChannelDescriptor>) -> BatchSummary {
        tracing::info!(channels = descriptors.len(), "refreshing subscriptions");
        let mut tasks = JoinSet::new();
        for descriptor in descriptors {
            let engine = self.clone();
            tasks.spawn(async move {
                let label = descriptor.label().to_string();
                (label, engine.sync_channel(&descriptor).await)
            });
        }

        let mut summary = BatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(report))) => summary.reports.push(report),
                Ok((label, Err(err))) => {
                    tracing::error!(channel = %label, "channel sync failed: {err}");
                    summary.errors.push((label, err));
                }
                Err(err) => tracing::error!("channel task aborted: {err}"),
            }
        }

        tracing::info!(
            downloaded = summary.downloaded(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            errors = summary.errors.len(),
            "refresh finished"
        );
        summary
    }

    /// Full pipeline for one channel.
    pub async fn sync_channel(&self, descriptor: &ChannelDescriptor) -> Result<SyncReport> {
        let mut report = SyncReport::new(descriptor);
        let channel = descriptor.label();

        enter(channel, SyncPhase::Fetching);
        let listing = match self.platform.fetch_listing(&descriptor.url).await {
            Ok(listing) => listing,
            Err(err) => {
                tracing::warn!(channel, url = %descriptor.url, "skipping channel: {err}");
                return Ok(skip(report, err.to_string()));
            }
        };

        enter(channel, SyncPhase::Filtering);
        let mut entries = filter_entries(listing.entries);
        if entries.is_empty() {
            tracing::warn!(channel, url = %descriptor.url, "no valid video urls returned");
            return Ok(skip(report, "no valid entries".to_string()));
        }
        let dates = self.boundary_dates(&mut entries, descriptor).await;
        let candidates = order_entries(entries, descriptor, listing.playlist_count, dates);
        report.candidates = candidates.len();

        self.download_pending(descriptor, candidates, report).await
    }

    /// Downloads one URL outside any subscription. It still goes through
    /// history so a known video is not fetched twice.
    pub async fn download_single_url(
        &self,
        url: &str,
        channel_override: Option<&str>,
        parent_folder: Option<&str>,
    ) -> Result<SyncReport> {
        let url = url.trim();
        if url.is_empty() {
            return Err(SyncError::config("no url entered"));
        }
        let channel = channel_override
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(SINGLE_URL_CHANNEL);
        let mut descriptor = ChannelDescriptor::new(url).with_channel_name(channel);
        if let Some(parent) = parent_folder.filter(|parent| !parent.trim().is_empty()) {
            descriptor = descriptor.with_parent_folder(parent.trim());
        }

        let entry = VideoEntry {
            url: url.to_string(),
            title: String::new(),
            upload_date: None,
            live_status: None,
            playlist_index: 0,
        };
        let mut report = SyncReport::new(&descriptor);
        report.candidates = 1;
        self.download_pending(&descriptor, vec![entry], report).await
    }

    /// Re-syncs one configured channel with a larger window.
    pub async fn backfill_channel(
        &self,
        descriptors: &[ChannelDescriptor],
        channel_name: &str,
        max_videos: usize,
    ) -> Result<SyncReport> {
        let Some(found) = find_channel(descriptors, channel_name) else {
            return Err(SyncError::config(format!(
                "no configured channel named {channel_name}"
            )));
        };
        if max_videos == 0 {
            return Err(SyncError::config("backfill needs max_videos above 0"));
        }
        let descriptor = found.clone().with_max_videos(max_videos);
        tracing::info!(channel = channel_name, max_videos, "starting backfill");
        self.sync_channel(&descriptor).await
    }

    /// Samples the first and last entries for their upload dates. A failed
    /// lookup leaves that side unknown.
    async fn boundary_dates(
        &self,
        entries: &mut [VideoEntry],
        descriptor: &ChannelDescriptor,
    ) -> BoundaryDates {
        let last_position = entries.len() - 1;
        let first = self.lookup_date(&entries[0].url, descriptor).await;
        let last = if last_position == 0 {
            first
        } else {
            self.lookup_date(&entries[last_position].url, descriptor)
                .await
        };
        entries[0].upload_date = first;
        entries[last_position].upload_date = last;
        BoundaryDates { first, last }
    }

    async fn lookup_date(&self, url: &str, descriptor: &ChannelDescriptor) -> Option<u32> {
        match self.platform.fetch_upload_date(url).await {
            Ok(date) => date,
            Err(err) => {
                tracing::warn!(channel = descriptor.label(), url, "upload date lookup failed: {err}");
                None
            }
        }
    }

    async fn download_pending(
        &self,
        descriptor: &ChannelDescriptor,
        candidates: Vec<VideoEntry>,
        mut report: SyncReport,
    ) -> Result<SyncReport> {
        let channel = descriptor.label();

        enter(channel, SyncPhase::Deduplicating);
        let known = self.history.list_all_urls().await?;
        let pending: Vec<VideoEntry> = candidates
            .into_iter()
            .filter(|entry| !known.contains(&entry.url))
            .collect();
        report.already_downloaded = report.candidates - pending.len();

        if pending.is_empty() {
            tracing::info!(channel, "no new videos to download");
            enter(channel, SyncPhase::Done);
            return Ok(report);
        }

        enter(channel, SyncPhase::Downloading);
        let template = OutputTemplate::build(descriptor, &self.downloads_root);
        let format = FormatProfile::for_best(descriptor.use_best_format);
        for entry in pending {
            let output = template.for_entry(&entry);
            match self.platform.download(&entry.url, &output, format).await {
                Ok(()) => {
                    match self.history.record(&entry.url, channel, Utc::now()).await {
                        Ok(RecordOutcome::Inserted) => {
                            tracing::info!(channel, url = %entry.url, index = entry.playlist_index, "downloaded");
                        }
                        Ok(RecordOutcome::Duplicate) => {
                            tracing::info!(channel, url = %entry.url, "downloaded; already in history");
                        }
                        Err(err) => {
                            tracing::error!(channel, url = %entry.url, "downloaded but not recorded: {err}");
                            report.unrecorded.push(entry.url.clone());
                        }
                    }
                    report.downloaded.push(entry.url);
                }
                Err(err) => {
                    tracing::warn!(channel, url = %entry.url, "{err}");
                    report.failed.push(entry.url);
                }
            }
        }

        tracing::info!(
            channel,
            downloaded = report.downloaded.len(),
            failed = report.failed.len(),
            "completed attempted downloads"
        );
        enter(channel, SyncPhase::Done);
        Ok(report)
    }
}

fn enter(channel: &str, phase: SyncPhase) {
    tracing::debug!(channel, %phase, "sync phase");
}

fn skip(mut report: SyncReport, reason: String) -> SyncReport {
    enter(&report.channel, SyncPhase::Done);
    report.outcome = SyncOutcome::Skipped { reason };
    report
}
