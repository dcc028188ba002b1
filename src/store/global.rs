use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::aggregate::Aggregation;
use crate::article::{Article, GlobalArticle};
use crate::config::DedupConfig;
use crate::store::keyword::SELECTED_ARCHIVE;
use crate::store::table::{append_rows, read_rows, stage_rows, ArchiveLock};
use crate::TARGET_STORE;

pub const FINAL_DIR: &str = "final";
pub const CANONICAL_ARCHIVE: &str = "canonical_archive.csv";
pub const CANONICAL_META: &str = "canonical_archive_meta.csv";
pub const EXCLUDED_GLOBAL: &str = "excluded_global.csv";
pub const DUPLICATE_HISTORY: &str = "duplicate_removal_history.csv";

/// The `final/` directory holding the cross-keyword outputs.
#[derive(Debug, Clone)]
pub struct GlobalStore {
    output_root: PathBuf,
    final_dir: PathBuf,
}

impl GlobalStore {
    pub fn new(output_root: &Path) -> Self {
        Self {
            output_root: output_root.to_path_buf(),
            final_dir: output_root.join(FINAL_DIR),
        }
    }

    pub fn for_config(config: &DedupConfig) -> Self {
        Self::new(&config.output_root)
    }

    pub fn final_dir(&self) -> &Path {
        &self.final_dir
    }

    pub fn canonical_path(&self) -> PathBuf {
        self.final_dir.join(CANONICAL_ARCHIVE)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.final_dir.join(CANONICAL_META)
    }

    pub fn excluded_path(&self) -> PathBuf {
        self.final_dir.join(EXCLUDED_GLOBAL)
    }

    pub fn history_path(&self) -> PathBuf {
        self.final_dir.join(DUPLICATE_HISTORY)
    }

    /// Keyword directories under the output root that hold a selected archive.
    pub fn discover_keywords(&self) -> Result<Vec<String>> {
        if !self.output_root.exists() {
            return Ok(Vec::new());
        }
        let mut keywords = Vec::new();
        for entry in fs::read_dir(&self.output_root)
            .with_context(|| format!("Failed to list {}", self.output_root.display()))?
        {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name == FINAL_DIR || !entry.path().join(SELECTED_ARCHIVE).is_file() {
                continue;
            }
            keywords.push(name);
        }
        keywords.sort();
        Ok(keywords)
    }

    /// Reads the committed selected archive of each keyword.
    ///
    /// Keywords without an archive yet are skipped with a warning.
    pub fn load_keyword_archives(&self, keywords: &[String]) -> Result<Vec<(String, Vec<Article>)>> {
        let mut archives = Vec::with_capacity(keywords.len());
        for keyword in keywords {
            let path = self.output_root.join(keyword).join(SELECTED_ARCHIVE);
            if !path.exists() {
                warn!(target: TARGET_STORE, "[{}] no selected archive at {}", keyword, path.display());
                continue;
            }
            let rows: Vec<Article> = read_rows(&path)
                .with_context(|| format!("Failed to read selected archive for {}", keyword))?;
            archives.push((keyword.clone(), rows));
        }
        Ok(archives)
    }

    pub fn load_canonical(&self) -> Result<Vec<GlobalArticle>> {
        Ok(read_rows(&self.canonical_path())?)
    }

    /// Publishes an aggregation.
    ///
    /// All three snapshot files are staged before any of them is renamed into
    /// place, so a failure while writing leaves the previous outputs intact.
    /// The sidecars are published first and the canonical archive last; it
    /// only changes once its meta and exclusion files are in place. History
    /// rows are appended after everything else is published.
    pub fn commit(&self, aggregation: &Aggregation) -> Result<()> {
        let _lock = ArchiveLock::acquire(&self.canonical_path())
            .context("Another aggregation is already running")?;

        let staged = vec![
            stage_rows(&self.meta_path(), &aggregation.meta)?,
            stage_rows(&self.excluded_path(), &aggregation.excluded)?,
            stage_rows(&self.canonical_path(), &aggregation.canonical)?,
        ];
        for table in staged {
            let target = table.target().to_path_buf();
            table
                .commit()
                .with_context(|| format!("Failed to publish {}", target.display()))?;
        }

        append_rows(&self.history_path(), &aggregation.history)
            .context("Failed to append duplicate removal history")?;

        info!(
            target: TARGET_STORE,
            "Committed {} canonical rows and {} history rows to {}",
            aggregation.canonical.len(),
            aggregation.history.len(),
            self.final_dir.display()
        );
        Ok(())
    }
}
