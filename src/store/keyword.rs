use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::article::{Article, SelectedCopyRow};
use crate::config::DedupConfig;
use crate::dedup::{FingerprintLogRow, SimilarityLogRow};
use crate::store::archive::Archive;
use crate::store::table::{write_log, write_rows_atomic};
use crate::TARGET_STORE;

pub const RAW_ARCHIVE: &str = "raw_archive.csv";
pub const SELECTED_ARCHIVE: &str = "selected_archive.csv";
pub const SELECTED_ARCHIVE_COPY: &str = "selected_archive_copy.csv";
pub const SIMILARITY_LOG_DIR: &str = "similarity_logs";
pub const FINGERPRINT_LOG_DIR: &str = "fingerprint_logs";

/// Files of one keyword under `<output_root>/<keyword>/`.
#[derive(Debug, Clone)]
pub struct KeywordStore {
    keyword: String,
    dir: PathBuf,
    raw: Archive<Article>,
    selected: Archive<Article>,
}

impl KeywordStore {
    pub fn new(output_root: &Path, keyword: &str, lookback: usize) -> Self {
        let dir = output_root.join(keyword);
        Self {
            keyword: keyword.to_string(),
            raw: Archive::new(dir.join(RAW_ARCHIVE), lookback),
            selected: Archive::new(dir.join(SELECTED_ARCHIVE), lookback),
            dir,
        }
    }

    pub fn for_config(config: &DedupConfig, keyword: &str) -> Self {
        Self::new(&config.output_root, keyword, config.lookback)
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn raw_archive(&self) -> &Archive<Article> {
        &self.raw
    }

    pub fn selected_archive(&self) -> &Archive<Article> {
        &self.selected
    }

    /// Adds freshly fetched articles to the raw archive and returns the new ones.
    pub fn save_raw_and_get_new(&self, articles: Vec<Article>) -> Result<Vec<Article>> {
        let fetched = articles.len();
        let new = self
            .raw
            .merge_incremental_rows(articles)
            .with_context(|| format!("Failed to merge raw archive for {}", self.keyword))?;
        info!(
            target: TARGET_STORE,
            "[{}] raw: {} fetched, {} new", self.keyword, fetched, new.len()
        );
        Ok(new)
    }

    /// Merges canonical articles into the selected archive and refreshes its skim copy.
    pub fn merge_selected(&self, canonical: Vec<Article>) -> Result<usize> {
        let added = self
            .selected
            .merge_incremental(canonical)
            .with_context(|| format!("Failed to merge selected archive for {}", self.keyword))?;

        if added > 0 || !self.dir.join(SELECTED_ARCHIVE_COPY).exists() {
            let copy: Vec<SelectedCopyRow> = self
                .selected
                .load()?
                .iter()
                .map(SelectedCopyRow::from)
                .collect();
            write_rows_atomic(&self.dir.join(SELECTED_ARCHIVE_COPY), &copy)
                .context("Failed to write selected archive copy")?;
        }
        Ok(added)
    }

    pub fn load_selected(&self) -> Result<Vec<Article>> {
        self.selected
            .load()
            .with_context(|| format!("Failed to read selected archive for {}", self.keyword))
    }

    /// Most recent publish time among the selected articles.
    pub fn last_pub_date(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.selected.last_pub_date()?)
    }

    pub fn write_similarity_log(&self, stamp: &str, rows: &[SimilarityLogRow]) -> Result<Option<PathBuf>> {
        Ok(write_log(&self.dir.join(SIMILARITY_LOG_DIR), stamp, rows)?)
    }

    pub fn write_fingerprint_log(&self, stamp: &str, rows: &[FingerprintLogRow]) -> Result<Option<PathBuf>> {
        Ok(write_log(&self.dir.join(FINGERPRINT_LOG_DIR), stamp, rows)?)
    }
}
