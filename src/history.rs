#![forbid(unsafe_code)]

//! Download history: the durable set of URLs that were fetched successfully.
//!
//! Uniqueness on `url` is enforced by the store itself. A second insert for
//! the same URL, whether from a retry or a concurrent run, is reported as
//! [`RecordOutcome::Duplicate`] instead of failing.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, params};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    Duplicate,
}

/// Persisted row of the `downloads` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRecord {
    pub url: String,
    pub channel: String,
    pub downloaded_at: DateTime<Utc>,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Every URL recorded so far, across all channels.
    async fn list_all_urls(&self) -> Result<HashSet<String>>;

    async fn record(
        &self,
        url: &str,
        channel: &str,
        downloaded_at: DateTime<Utc>,
    ) -> Result<RecordOutcome>;
}

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA busy_timeout=5000;
        "#,
    )
    .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS downloads (
            url TEXT PRIMARY KEY,
            channel TEXT NOT NULL DEFAULT '',
            downloaded_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_downloads_channel ON downloads(channel);
        "#,
    )
    .await?;
    Ok(())
}

/// History backed by a local SQLite-compatible database.
#[derive(Clone)]
pub struct LibsqlHistory {
    conn: Connection,
}

impl LibsqlHistory {
    /// Opens (and if necessary creates) the database and its schema.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    /// Rows recorded for one channel, oldest first.
    pub async fn records_for_channel(&self, channel: &str) -> Result<Vec<DownloadRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT url, channel, downloaded_at FROM downloads WHERE channel = ?1 ORDER BY downloaded_at, url",
                params![channel],
            )
            .await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            let url: String = row.get(0)?;
            let channel: String = row.get(1)?;
            let raw_timestamp: String = row.get(2)?;
            let downloaded_at = DateTime::parse_from_rfc3339(&raw_timestamp)
                .map(|value| value.with_timezone(&Utc))
                .unwrap_or_else(|err| {
                    tracing::warn!(url = %url, "unparsable download timestamp {raw_timestamp}: {err}");
                    DateTime::<Utc>::UNIX_EPOCH
                });
            records.push(DownloadRecord {
                url,
                channel,
                downloaded_at,
            });
        }
        Ok(records)
    }
}

#[async_trait]
impl HistoryStore for LibsqlHistory {
    async fn list_all_urls(&self) -> Result<HashSet<String>> {
        let mut rows = self.conn.query("SELECT url FROM downloads", params![]).await?;
        let mut urls = HashSet::new();
        while let Some(row) = rows.next().await? {
            urls.insert(row.get::<String>(0)?);
        }
        Ok(urls)
    }

    async fn record(
        &self,
        url: &str,
        channel: &str,
        downloaded_at: DateTime<Utc>,
    ) -> Result<RecordOutcome> {
        let changed = self
            .conn
            .execute(
                r#"
                INSERT INTO downloads (url, channel, downloaded_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(url) DO NOTHING
                "#,
                params![url, channel, downloaded_at.to_rfc3339()],
            )
            .await?;
        Ok(if changed == 0 {
            RecordOutcome::Duplicate
        } else {
            RecordOutcome::Inserted
        })
    }
}

/// In-process history, handy for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: Mutex<HashMap<String, DownloadRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates the store with already downloaded URLs.
    pub fn with_urls<'a>(channel: &str, urls: impl IntoIterator<Item = &'a str>) -> Self {
        let history = Self::new();
        {
            let mut records = history.records.lock();
            for url in urls {
                records.insert(
                    url.to_string(),
                    DownloadRecord {
                        url: url.to_string(),
                        channel: channel.to_string(),
                        downloaded_at: Utc::now(),
                    },
                );
            }
        }
        history
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn get(&self, url: &str) -> Option<DownloadRecord> {
        self.records.lock().get(url).cloned()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn list_all_urls(&self) -> Result<HashSet<String>> {
        Ok(self.records.lock().keys().cloned().collect())
    }

    async fn record(
        &self,
        url: &str,
        channel: &str,
        downloaded_at: DateTime<Utc>,
    ) -> Result<RecordOutcome> {
        let mut records = self.records.lock();
        if records.contains_key(url) {
            return Ok(RecordOutcome::Duplicate);
        }
        records.insert(
            url.to_string(),
            DownloadRecord {
                url: url.to_string(),
                channel: channel.to_string(),
                downloaded_at,
            },
        );
        Ok(RecordOutcome::Inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn create_store() -> Result<(tempfile::TempDir, LibsqlHistory, PathBuf)> {
        let dir = tempdir()?;
        let path = dir.path().join("state/history.db");
        let store = LibsqlHistory::open(&path).await?;
        Ok((dir, store, path))
    }

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn open_creates_database_and_schema() -> Result<()> {
        let (_temp, store, path) = create_store().await?;
        assert!(path.exists(), "database file should be created");

        let mut rows = store
            .conn
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                ["downloads"],
            )
            .await?;
        let exists: Option<String> = rows
            .next()
            .await?
            .map(|row| row.get::<String>(0))
            .transpose()?;
        assert_eq!(exists.as_deref(), Some("downloads"));
        Ok(())
    }

    #[tokio::test]
    async fn record_then_list() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        assert!(store.list_all_urls().await?.is_empty());

        assert_eq!(
            store.record("https://a", "Foo", at(1)).await?,
            RecordOutcome::Inserted
        );
        assert_eq!(
            store.record("https://b", "Bar", at(2)).await?,
            RecordOutcome::Inserted
        );

        let urls = store.list_all_urls().await?;
        assert_eq!(urls.len(), 2);
        assert!(urls.contains("https://a"));
        assert!(urls.contains("https://b"));
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_insert_is_ignored() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        store.record("https://a", "Foo", at(1)).await?;
        assert_eq!(
            store.record("https://a", "Other", at(5)).await?,
            RecordOutcome::Duplicate
        );

        let records = store.records_for_channel("Foo").await?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].downloaded_at, at(1));
        assert!(store.records_for_channel("Other").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn history_survives_reopen() -> Result<()> {
        let (_temp, store, path) = create_store().await?;
        store.record("https://a", "Foo", at(1)).await?;
        drop(store);

        let reopened = LibsqlHistory::open(&path).await?;
        assert!(reopened.list_all_urls().await?.contains("https://a"));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_records_keep_one_row() -> Result<()> {
        let (_temp, store, _path) = create_store().await?;
        let store = Arc::new(store);
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            tasks.spawn(async move { store.record("https://same", "Foo", at(3)).await });
        }
        let mut inserted = 0;
        while let Some(outcome) = tasks.join_next().await {
            if outcome.expect("task panicked")? == RecordOutcome::Inserted {
                inserted += 1;
            }
        }
        assert_eq!(inserted, 1);
        assert_eq!(store.list_all_urls().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn memory_history_mirrors_uniqueness() -> Result<()> {
        let history = MemoryHistory::with_urls("Foo", ["https://a"]);
        assert_eq!(history.len(), 1);
        assert_eq!(
            history.record("https://a", "Bar", at(1)).await?,
            RecordOutcome::Duplicate
        );
        assert_eq!(history.get("https://a").unwrap().channel, "Foo");
        assert_eq!(
            history.record("https://b", "Bar", at(1)).await?,
            RecordOutcome::Inserted
        );
        assert_eq!(history.list_all_urls().await?.len(), 2);
        Ok(())
    }
}
