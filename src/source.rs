//! Seams to the news search provider and the body extractor.
//!
//! The engine never talks to the network itself; a [`NewsProvider`] hands it
//! raw items and a [`ContentExtractor`] fills in article bodies.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::article::Article;
use crate::TARGET_PIPELINE;

/// One search result as the provider returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub link: String,
    #[serde(default)]
    pub originallink: String,
    #[serde(rename = "pubDate", default)]
    pub pub_date: String,
    /// Body text, when the capture already carries it
    #[serde(default)]
    pub content: String,
}

/// Provider response envelope
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub items: Vec<RawItem>,
}

pub trait NewsProvider {
    /// Returns up to `count` of the newest items for `keyword`.
    fn fetch(&self, keyword: &str, count: usize) -> Result<Vec<RawItem>>;
}

pub trait ContentExtractor {
    /// Body text of an article; an error is isolated to that article.
    fn extract(&self, article: &Article) -> Result<String>;
}

/// Replays captured provider responses from disk.
///
/// Either a single file serving every keyword, or a directory holding one
/// `<keyword>.json` per keyword.
#[derive(Debug, Clone)]
pub enum JsonFileProvider {
    File(PathBuf),
    Directory(PathBuf),
}

impl JsonFileProvider {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        JsonFileProvider::File(path.into())
    }

    pub fn directory(dir: impl Into<PathBuf>) -> Self {
        JsonFileProvider::Directory(dir.into())
    }

    fn path_for(&self, keyword: &str) -> PathBuf {
        match self {
            JsonFileProvider::File(path) => path.clone(),
            JsonFileProvider::Directory(dir) => dir.join(format!("{}.json", keyword)),
        }
    }
}

pub fn read_search_response(path: &Path) -> Result<SearchResponse> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read provider capture {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse provider capture {}", path.display()))
}

impl NewsProvider for JsonFileProvider {
    fn fetch(&self, keyword: &str, count: usize) -> Result<Vec<RawItem>> {
        let path = self.path_for(keyword);
        let mut items = read_search_response(&path)?.items;
        items.truncate(count);
        debug!(
            target: TARGET_PIPELINE,
            "[{}] {} items from {}",
            keyword,
            items.len(),
            path.display()
        );
        Ok(items)
    }
}

/// Uses whatever body the item already carried.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredContent;

impl ContentExtractor for StoredContent {
    fn extract(&self, article: &Article) -> Result<String> {
        Ok(article.content.clone())
    }
}
