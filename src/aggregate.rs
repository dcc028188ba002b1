//! Cross-keyword aggregation of the per-keyword selected archives.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::article::{Article, GlobalArticle};
use crate::config::DedupConfig;
use crate::dedup::{ArticleClusterer, Candidate};
use crate::identity::parse_pub_date;
use crate::store::archive::sort_newest_first;
use crate::store::history::DuplicateHistoryRecord;
use crate::store::table::Table;
use crate::TARGET_AGGREGATE;

pub const REMOVED_BY_IDENTITY: &str = "identity";
pub const REMOVED_BY_SIMILARITY: &str = "similarity";

/// One row per pooled article describing where it ended up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRow {
    pub news_id: String,
    pub link: String,
    #[serde(default)]
    pub originallink: String,
    pub source_keyword: String,
    pub title: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    pub cluster_id: String,
    pub title_group_id: String,
    pub body_group_id: String,
    pub is_global_canonical: bool,
    pub global_replaced_by: Option<String>,
    pub removed_by: Option<String>,
}

impl Table for MetaRow {
    const COLUMNS: &'static [&'static str] = &[
        "news_id",
        "link",
        "originallink",
        "source_keyword",
        "title",
        "pubDate",
        "cluster_id",
        "title_group_id",
        "body_group_id",
        "is_global_canonical",
        "global_replaced_by",
        "removed_by",
    ];
}

impl Candidate for MetaRow {
    fn publisher_link(&self) -> &str {
        &self.originallink
    }

    fn published_at(&self) -> Option<DateTime<Utc>> {
        parse_pub_date(&self.pub_date)
    }
}

/// A pooled article that did not make it into the global canonical archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedRow {
    pub news_id: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    pub collected_at: String,
    pub source_keyword: String,
    pub title: String,
    pub link: String,
    pub originallink: String,
    pub global_replaced_by: String,
    pub removed_by: String,
}

impl Table for ExcludedRow {
    const COLUMNS: &'static [&'static str] = &[
        "news_id",
        "pubDate",
        "collected_at",
        "source_keyword",
        "title",
        "link",
        "originallink",
        "global_replaced_by",
        "removed_by",
    ];
}

/// Result of one aggregation cycle, ready to be committed.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub execute_at: String,
    /// Size of the concatenated pool before either pass
    pub total_rows: usize,
    pub canonical: Vec<GlobalArticle>,
    pub meta: Vec<MetaRow>,
    pub excluded: Vec<ExcludedRow>,
    pub history: Vec<DuplicateHistoryRecord>,
    pub identity_removed: usize,
    pub similarity_removed: usize,
    pub cluster_count: usize,
}

impl Aggregation {
    /// Share of pooled rows that were excluded.
    pub fn duplicate_ratio(&self) -> f64 {
        if self.total_rows == 0 {
            0.0
        } else {
            self.excluded.len() as f64 / self.total_rows as f64
        }
    }
}

/// Position of a pooled article after the identity pass
enum PoolEntry {
    Survivor(usize),
    Duplicate { article: Article, survivor: usize },
}

/// Merges every keyword's canonical articles into one global pool.
///
/// The pool is sorted newest first. An identity pass keeps the first row for
/// each news_id, then a similarity pass clusters the survivors and keeps one
/// canonical per cluster.
#[derive(Debug, Clone)]
pub struct GlobalAggregator {
    clusterer: ArticleClusterer,
}

impl GlobalAggregator {
    pub fn new(clusterer: ArticleClusterer) -> Self {
        Self { clusterer }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(ArticleClusterer::for_global(config))
    }

    /// Builds the global canonical archive from per-keyword archives.
    ///
    /// # Arguments
    /// * `archives` - `(keyword, selected articles)` pairs
    /// * `execute_at` - timestamp stamped on the history rows
    ///
    /// # Returns
    /// * `Ok(Aggregation)` - canonical rows, meta rows, exclusions and history
    /// * `Err` - if clustering the pool failed
    pub fn aggregate(
        &self,
        archives: Vec<(String, Vec<Article>)>,
        execute_at: &str,
    ) -> Result<Aggregation> {
        // Step 1: Pool everything, tagging rows with the archive they came from
        let mut pool: Vec<Article> = Vec::new();
        for (keyword, articles) in archives {
            debug!(target: TARGET_AGGREGATE, "[{}] {} selected rows", keyword, articles.len());
            pool.extend(articles.into_iter().map(|mut article| {
                article.search_keyword = keyword.clone();
                article
            }));
        }
        sort_newest_first(&mut pool);
        let total_rows = pool.len();

        // Step 2: Identity pass
        let mut survivors: Vec<Article> = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();
        let mut entries: Vec<PoolEntry> = Vec::with_capacity(total_rows);
        for article in pool {
            match position.get(&article.news_id) {
                Some(&survivor) => {
                    debug!(
                        target: TARGET_AGGREGATE,
                        "Identity duplicate {} from {} (kept copy from {})",
                        article.news_id,
                        article.search_keyword,
                        survivors[survivor].search_keyword
                    );
                    entries.push(PoolEntry::Duplicate { article, survivor });
                }
                None => {
                    position.insert(article.news_id.clone(), survivors.len());
                    entries.push(PoolEntry::Survivor(survivors.len()));
                    survivors.push(article);
                }
            }
        }
        let identity_removed = total_rows - survivors.len();

        // Step 3: Similarity pass over the survivors
        let batch = self
            .clusterer
            .cluster(survivors)
            .context("Failed to cluster the global pool")?;
        let final_canonical: Vec<String> = batch
            .articles
            .iter()
            .zip(&batch.assignments)
            .map(|(article, a)| {
                a.replaced_by
                    .clone()
                    .unwrap_or_else(|| article.news_id.clone())
            })
            .collect();

        // Step 4: Emit meta, exclusion and history rows in pool order
        let mut aggregation = Aggregation {
            execute_at: execute_at.to_string(),
            total_rows,
            identity_removed,
            cluster_count: batch.cluster_count(),
            ..Aggregation::default()
        };

        for entry in &entries {
            let (article, survivor, removed_by) = match entry {
                PoolEntry::Survivor(s) => {
                    let removed_by = (!batch.assignments[*s].is_canonical)
                        .then_some(REMOVED_BY_SIMILARITY);
                    (&batch.articles[*s], *s, removed_by)
                }
                PoolEntry::Duplicate { article, survivor } => {
                    (article, *survivor, Some(REMOVED_BY_IDENTITY))
                }
            };
            let assignment = &batch.assignments[survivor];
            let replaced_by = removed_by.map(|_| final_canonical[survivor].clone());

            aggregation.meta.push(MetaRow {
                news_id: article.news_id.clone(),
                link: article.link.clone(),
                originallink: article.originallink.clone(),
                source_keyword: article.search_keyword.clone(),
                title: article.title.clone(),
                pub_date: article.pub_date.clone(),
                cluster_id: format!("G-{}", assignment.cluster_id),
                title_group_id: format!("T-{}", assignment.title_group_id),
                body_group_id: format!("B-{}", assignment.body_group_id),
                is_global_canonical: removed_by.is_none(),
                global_replaced_by: replaced_by.clone(),
                removed_by: removed_by.map(str::to_string),
            });

            if let (Some(removed_by), Some(replaced_by)) = (removed_by, replaced_by) {
                aggregation.excluded.push(ExcludedRow {
                    news_id: article.news_id.clone(),
                    pub_date: article.pub_date.clone(),
                    collected_at: article.collected_at.clone(),
                    source_keyword: article.search_keyword.clone(),
                    title: article.title.clone(),
                    link: article.link.clone(),
                    originallink: article.originallink.clone(),
                    global_replaced_by: replaced_by.clone(),
                    removed_by: removed_by.to_string(),
                });
                aggregation.history.push(DuplicateHistoryRecord {
                    source_keyword: article.search_keyword.clone(),
                    news_id: article.news_id.clone(),
                    link: article.link.clone(),
                    global_replaced_by: replaced_by,
                    execute_at: execute_at.to_string(),
                });
            }
        }

        aggregation.similarity_removed = batch.non_canonical_count();
        aggregation.canonical = batch
            .canonical()
            .into_iter()
            .map(GlobalArticle::from)
            .collect();

        info!(
            target: TARGET_AGGREGATE,
            "Aggregated {} rows into {} canonical ({} identity duplicates, {} similarity duplicates, {} clusters)",
            aggregation.total_rows,
            aggregation.canonical.len(),
            aggregation.identity_removed,
            aggregation.similarity_removed,
            aggregation.cluster_count
        );
        Ok(aggregation)
    }
}
