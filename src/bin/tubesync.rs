#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tubesync_tools::config::{RuntimeOverrides, RuntimeSettings, resolve_runtime_settings};
use tubesync_tools::history::{HistoryStore, LibsqlHistory};
use tubesync_tools::logging::init_logging;
use tubesync_tools::platform::Platform;
use tubesync_tools::preflight::{ensure_not_root, ensure_program_available};
use tubesync_tools::retention::sweep_ephemeral;
use tubesync_tools::subscriptions::{DEFAULT_BACKFILL_VIDEOS, load_subscriptions};
use tubesync_tools::sync::{ChannelSync, SyncOutcome, SyncReport};
use tubesync_tools::ytdlp::{YT_DLP_PROGRAM, YtDlp};

#[derive(Parser, Debug)]
#[command(author, version, about = "Sync subscribed channels into local season folders")]
struct Cli {
    /// `.env` file with runtime settings
    #[arg(long = "env-file", global = true)]
    env_file: Option<PathBuf>,

    #[arg(long = "downloads-root", global = true)]
    downloads_root: Option<PathBuf>,

    #[arg(long = "subscriptions", global = true)]
    subscriptions: Option<PathBuf>,

    #[arg(long = "history-db", global = true)]
    history_db: Option<PathBuf>,

    /// Downloader executable
    #[arg(long = "yt-dlp", global = true, default_value = YT_DLP_PROGRAM)]
    yt_dlp: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Sync every subscribed channel.
    Refresh,
    /// Download one video outside the subscriptions.
    DownloadUrl {
        url: String,
        #[arg(long)]
        channel: Option<String>,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Re-sync one subscribed channel with a larger window.
    Backfill {
        channel: String,
        #[arg(long = "max-videos", default_value_t = DEFAULT_BACKFILL_VIDEOS)]
        max_videos: usize,
    },
    /// Delete aged files of ephemeral channels.
    Sweep {
        #[arg(long = "max-age-days")]
        max_age_days: Option<u64>,
    },
}

impl Cli {
    fn overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            downloads_root: self.downloads_root.clone(),
            subscriptions_path: self.subscriptions.clone(),
            history_db: self.history_db.clone(),
            env_path: self.env_file.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    ensure_not_root("tubesync")?;

    let settings =
        resolve_runtime_settings(cli.overrides()).context("resolving runtime settings")?;
    if let Some(path) = init_logging(settings.log_dir.as_deref())? {
        eprintln!("Logging to {}", path.display());
    }

    tokio::select! {
        result = run(cli, settings) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted; unfinished downloads will be retried on the next run");
            Ok(())
        }
    }
}

async fn run(cli: Cli, settings: RuntimeSettings) -> Result<()> {
    let Cli {
        command, yt_dlp, ..
    } = cli;

    match command {
        Command::Refresh => {
            let engine = build_engine(&yt_dlp, &settings).await?;
            let descriptors = load_subscriptions(&settings.subscriptions_path)?;
            let summary = engine.refresh_all_channels(descriptors).await;
            for report in &summary.reports {
                print_report(report);
            }
            for (channel, err) in &summary.errors {
                println!("{channel}: error: {err}");
            }
            println!(
                "Downloaded {} video(s), {} failed, {} channel(s) skipped.",
                summary.downloaded(),
                summary.failed(),
                summary.skipped()
            );
        }
        Command::DownloadUrl {
            url,
            channel,
            parent,
        } => {
            let engine = build_engine(&yt_dlp, &settings).await?;
            let report = engine
                .download_single_url(&url, channel.as_deref(), parent.as_deref())
                .await?;
            print_report(&report);
            if !report.failed.is_empty() {
                bail!("download failed for {url}");
            }
        }
        Command::Backfill {
            channel,
            max_videos,
        } => {
            let descriptors = load_subscriptions(&settings.subscriptions_path)?;
            let engine = build_engine(&yt_dlp, &settings).await?;
            let report = engine
                .backfill_channel(&descriptors, &channel, max_videos)
                .await?;
            print_report(&report);
        }
        Command::Sweep { max_age_days } => {
            let descriptors = load_subscriptions(&settings.subscriptions_path)?;
            let max_age_days = max_age_days.unwrap_or(settings.ephemeral_days);
            let deleted = sweep_ephemeral(
                &descriptors,
                &settings.library_root,
                max_age_days,
                SystemTime::now(),
            )?;
            println!("Deleted {} expired file(s).", deleted.len());
        }
    }
    Ok(())
}

/// Checks the downloader and opens history. Only commands that download
/// need this.
async fn build_engine(yt_dlp: &Path, settings: &RuntimeSettings) -> Result<ChannelSync> {
    let version = ensure_program_available(yt_dlp).await?;
    tracing::info!(%version, "using {}", yt_dlp.display());
    let history = LibsqlHistory::open(&settings.history_db)
        .await
        .with_context(|| format!("opening history at {}", settings.history_db.display()))?;
    let platform: Arc<dyn Platform> =
        Arc::new(YtDlp::with_program(yt_dlp).with_cookies(settings.cookies_path.clone()));
    let history: Arc<dyn HistoryStore> = Arc::new(history);
    Ok(ChannelSync::new(
        platform,
        history,
        settings.downloads_root.clone(),
    ))
}

fn print_report(report: &SyncReport) {
    match &report.outcome {
        SyncOutcome::Skipped { reason } => println!("{}: skipped ({reason})", report.channel),
        SyncOutcome::Completed => println!(
            "{}: {} new, {} already downloaded, {} failed",
            report.channel,
            report.downloaded.len(),
            report.already_downloaded,
            report.failed.len()
        ),
    }
    for url in &report.unrecorded {
        println!("  not recorded in history: {url}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_download_url_with_overrides() {
        let cli = Cli::try_parse_from([
            "tubesync",
            "--downloads-root",
            "/yt",
            "download-url",
            "https://www.youtube.com/watch?v=a",
            "--channel",
            "Talks",
        ])
        .unwrap();
        assert_eq!(cli.downloads_root, Some(PathBuf::from("/yt")));
        assert_eq!(
            cli.command,
            Command::DownloadUrl {
                url: "https://www.youtube.com/watch?v=a".into(),
                channel: Some("Talks".into()),
                parent: None,
            }
        );
    }

    #[test]
    fn backfill_defaults_to_hundred_videos() {
        let cli = Cli::try_parse_from(["tubesync", "backfill", "Foo"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Backfill {
                channel: "Foo".into(),
                max_videos: DEFAULT_BACKFILL_VIDEOS,
            }
        );
        assert_eq!(cli.yt_dlp, PathBuf::from(YT_DLP_PROGRAM));
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "tubesync",
            "sweep",
            "--max-age-days",
            "7",
            "--env-file",
            "/etc/tubesync.env",
        ])
        .unwrap();
        assert_eq!(cli.command, Command::Sweep { max_age_days: Some(7) });
        assert_eq!(cli.overrides().env_path, Some(PathBuf::from("/etc/tubesync.env")));
    }

    #[test]
    fn download_url_requires_a_url() {
        assert!(Cli::try_parse_from(["tubesync", "download-url"]).is_err());
    }
}
