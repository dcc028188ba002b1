use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::article::{Article, GlobalArticle};
use crate::error::StoreResult;
use crate::store::table::{read_rows, write_rows_atomic, ArchiveLock, Table};
use crate::TARGET_STORE;

/// A row that can live in an archive: it has a dedup key and a publish time.
pub trait ArchiveRecord: Table + DeserializeOwned + Clone {
    fn key(&self) -> &str;

    fn published_time(&self) -> Option<DateTime<Utc>>;
}

impl ArchiveRecord for Article {
    fn key(&self) -> &str {
        &self.news_id
    }

    fn published_time(&self) -> Option<DateTime<Utc>> {
        self.published_at()
    }
}

impl ArchiveRecord for GlobalArticle {
    fn key(&self) -> &str {
        &self.news_id
    }

    fn published_time(&self) -> Option<DateTime<Utc>> {
        self.published_at()
    }
}

/// Newest first; rows without a usable publish time go last, ties keep their order.
pub fn sort_newest_first<T: ArchiveRecord>(rows: &mut [T]) {
    rows.sort_by_cached_key(|row| Reverse(row.published_time()));
}

/// An append-only CSV archive sorted by publish time, newest first.
///
/// Incremental merges only compare against the `lookback` most recent rows.
/// A row older than that window can therefore be admitted a second time if
/// it shows up again in a later batch.
#[derive(Debug, Clone)]
pub struct Archive<T> {
    path: PathBuf,
    lookback: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T: ArchiveRecord> Archive<T> {
    pub fn new(path: impl Into<PathBuf>, lookback: usize) -> Self {
        Self {
            path: path.into(),
            lookback,
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> StoreResult<Vec<T>> {
        read_rows(&self.path)
    }

    /// Merges `incoming` and returns the rows that were actually added.
    ///
    /// Rows whose key is already inside the lookback window, or that repeat an
    /// earlier row of the same batch, are skipped. Survivors are prepended,
    /// the whole archive is re-sorted and then replaced atomically. Nothing is
    /// written when there is nothing new.
    pub fn merge_incremental_rows(&self, incoming: Vec<T>) -> StoreResult<Vec<T>> {
        let _lock = ArchiveLock::acquire(&self.path)?;

        let existing = self.load()?;
        let mut seen: HashSet<String> = existing
            .iter()
            .take(self.lookback)
            .map(|row| row.key().to_string())
            .collect();

        let incoming_count = incoming.len();
        let added: Vec<T> = incoming
            .into_iter()
            .filter(|row| {
                let fresh = seen.insert(row.key().to_string());
                if !fresh {
                    debug!(target: TARGET_STORE, "Skipping known key {}", row.key());
                }
                fresh
            })
            .collect();

        if added.is_empty() {
            info!(
                target: TARGET_STORE,
                "{}: 0 of {} rows new, archive unchanged",
                self.path.display(),
                incoming_count
            );
            return Ok(added);
        }

        let mut merged: Vec<T> = Vec::with_capacity(added.len() + existing.len());
        merged.extend(added.iter().cloned());
        merged.extend(existing);
        sort_newest_first(&mut merged);
        write_rows_atomic(&self.path, &merged)?;

        info!(
            target: TARGET_STORE,
            "{}: {} of {} rows new, {} total",
            self.path.display(),
            added.len(),
            incoming_count,
            merged.len()
        );
        Ok(added)
    }

    /// Merges `incoming` and returns how many rows were added.
    pub fn merge_incremental(&self, incoming: Vec<T>) -> StoreResult<usize> {
        Ok(self.merge_incremental_rows(incoming)?.len())
    }

    /// Replaces the archive contents wholesale, under the writer lock.
    pub fn replace(&self, rows: &[T]) -> StoreResult<()> {
        let _lock = ArchiveLock::acquire(&self.path)?;
        write_rows_atomic(&self.path, rows)
    }

    /// Latest parseable publish time in the archive.
    pub fn last_pub_date(&self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self
            .load()?
            .iter()
            .filter_map(|row| row.published_time())
            .max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: &str, hour: u32) -> Article {
        Article {
            search_keyword: "국회".to_string(),
            news_id: id.to_string(),
            pub_date: format!("2026-01-28 {:02}:00:00", hour),
            collected_at: "2026-01-28 23:00:00".to_string(),
            title: format!("title {}", id),
            description: String::new(),
            link: format!("https://n.news.naver.com/{}", id),
            originallink: String::new(),
            content: String::new(),
        }
    }

    fn ids(rows: &[Article]) -> Vec<&str> {
        rows.iter().map(|a| a.news_id.as_str()).collect()
    }

    #[test]
    fn test_merge_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let archive: Archive<Article> = Archive::new(dir.path().join("a.csv"), 100);
        let batch = vec![article("u1", 9), article("u2", 10)];

        assert_eq!(archive.merge_incremental(batch.clone()).unwrap(), 2);
        let before = std::fs::read(archive.path()).unwrap();
        assert_eq!(archive.merge_incremental(batch).unwrap(), 0);
        assert_eq!(std::fs::read(archive.path()).unwrap(), before);
    }

    #[test]
    fn test_rows_are_sorted_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let archive: Archive<Article> = Archive::new(dir.path().join("a.csv"), 100);
        archive
            .merge_incremental(vec![article("u1", 9), article("u3", 11)])
            .unwrap();
        archive.merge_incremental(vec![article("u2", 10)]).unwrap();

        assert_eq!(ids(&archive.load().unwrap()), vec!["u3", "u2", "u1"]);
        assert_eq!(
            archive.last_pub_date().unwrap().map(|d| d.to_rfc3339()),
            Some("2026-01-28T11:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_lookback_window_limits_the_seen_set() {
        let dir = tempfile::tempdir().unwrap();
        let archive: Archive<Article> = Archive::new(dir.path().join("a.csv"), 3);
        archive
            .replace(&[article("u4", 14), article("u3", 13), article("u2", 12), article("u1", 11)])
            .unwrap();

        let added = archive
            .merge_incremental_rows(vec![article("u2", 12), article("u5", 15)])
            .unwrap();
        assert_eq!(ids(&added), vec!["u5"]);

        // u1 sits outside the three most recent rows and is admitted again
        let added = archive.merge_incremental_rows(vec![article("u1", 11)]).unwrap();
        assert_eq!(ids(&added), vec!["u1"]);
        assert_eq!(archive.load().unwrap().len(), 6);
    }

    #[test]
    fn test_repeats_within_a_batch_are_added_once() {
        let dir = tempfile::tempdir().unwrap();
        let archive: Archive<Article> = Archive::new(dir.path().join("a.csv"), 100);
        let added = archive
            .merge_incremental_rows(vec![article("u1", 9), article("u1", 9)])
            .unwrap();
        assert_eq!(added.len(), 1);
    }

    #[test]
    fn test_locked_archive_rejects_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        let archive: Archive<Article> = Archive::new(&path, 100);

        let _held = ArchiveLock::acquire(&path).unwrap();
        let err = archive.merge_incremental(vec![article("u1", 9)]).unwrap_err();
        assert!(matches!(err, crate::error::StoreError::Locked { .. }));
        assert!(!archive.exists());
    }

    #[test]
    fn test_malformed_dates_sort_last() {
        let mut rows = vec![article("u1", 9), article("bad", 10), article("u2", 10)];
        rows[1].pub_date = "not a date".to_string();
        sort_newest_first(&mut rows);
        assert_eq!(ids(&rows), vec!["u2", "u1", "bad"]);
    }
}
