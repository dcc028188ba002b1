use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::article::Article;
use crate::config::DedupConfig;
use crate::dedup::canonical::CanonicalPolicy;
use crate::dedup::cluster::{ClusterMerger, MergeMode};
use crate::dedup::similarity::{SimilarityGrouper, Weighting};
use crate::store::table::Table;
use crate::text::normalize_title;
use crate::TARGET_DEDUP;

/// Cluster membership and canonical decision for one article of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    pub cluster_id: usize,
    pub title_group_id: usize,
    pub body_group_id: usize,
    pub is_canonical: bool,
    /// Canonical news_id of the cluster, `None` for the canonical itself
    pub replaced_by: Option<String>,
}

/// Row of the per-run similarity debug log.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityLogRow {
    pub news_id: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    pub collected_at: String,
    pub is_canonical: bool,
    pub cluster_id: String,
    pub title_group_id: String,
    pub body_group_id: String,
    pub replaced_by: String,
    pub title: String,
}

impl Table for SimilarityLogRow {
    const COLUMNS: &'static [&'static str] = &[
        "news_id",
        "pubDate",
        "collected_at",
        "is_canonical",
        "cluster_id",
        "title_group_id",
        "body_group_id",
        "replaced_by",
        "title",
    ];
}

/// A batch after clustering: `assignments[i]` describes `articles[i]`.
#[derive(Debug, Clone, Default)]
pub struct ClusteredBatch {
    pub articles: Vec<Article>,
    pub assignments: Vec<ClusterAssignment>,
}

impl ClusteredBatch {
    pub fn cluster_count(&self) -> usize {
        self.assignments
            .iter()
            .map(|a| a.cluster_id + 1)
            .max()
            .unwrap_or(0)
    }

    /// Canonical articles in batch order.
    pub fn canonical(&self) -> Vec<Article> {
        self.articles
            .iter()
            .zip(&self.assignments)
            .filter(|(_, a)| a.is_canonical)
            .map(|(article, _)| article.clone())
            .collect()
    }

    pub fn non_canonical_count(&self) -> usize {
        self.assignments.iter().filter(|a| !a.is_canonical).count()
    }

    /// Debug rows ordered by cluster, canonical first inside each cluster.
    pub fn similarity_log_rows(&self) -> Vec<SimilarityLogRow> {
        let mut rows: Vec<(usize, bool, SimilarityLogRow)> = self
            .articles
            .iter()
            .zip(&self.assignments)
            .map(|(article, a)| {
                (
                    a.cluster_id,
                    !a.is_canonical,
                    SimilarityLogRow {
                        news_id: article.news_id.clone(),
                        pub_date: article.pub_date.clone(),
                        collected_at: article.collected_at.clone(),
                        is_canonical: a.is_canonical,
                        cluster_id: format!("C-{}", a.cluster_id),
                        title_group_id: format!("T-{}", a.title_group_id),
                        body_group_id: format!("B-{}", a.body_group_id),
                        replaced_by: a.replaced_by.clone().unwrap_or_default(),
                        title: article.title.clone(),
                    },
                )
            })
            .collect();
        rows.sort_by_key(|(cluster, not_canonical, _)| (*cluster, *not_canonical));
        rows.into_iter().map(|(_, _, row)| row).collect()
    }
}

/// Title grouping, body grouping, cluster merge and canonical selection over one batch.
#[derive(Debug, Clone)]
pub struct ArticleClusterer {
    title_grouper: SimilarityGrouper,
    body_grouper: SimilarityGrouper,
    merger: ClusterMerger,
    policy: CanonicalPolicy,
}

impl ArticleClusterer {
    pub fn new(
        title_threshold: f64,
        body_threshold: f64,
        mode: MergeMode,
        policy: CanonicalPolicy,
    ) -> Self {
        Self {
            title_grouper: SimilarityGrouper::new(title_threshold).with_label("title"),
            body_grouper: SimilarityGrouper::new(body_threshold).with_label("body"),
            merger: ClusterMerger::new(mode),
            policy,
        }
    }

    /// Applies the same term weighting to titles and bodies.
    pub fn with_weighting(mut self, weighting: Weighting) -> Self {
        self.title_grouper = self.title_grouper.with_weighting(weighting);
        self.body_grouper = self.body_grouper.with_weighting(weighting);
        self
    }

    /// Clusterer for a single keyword batch.
    pub fn for_keyword(config: &DedupConfig) -> Self {
        Self::new(
            config.title_threshold,
            config.body_threshold,
            config.merge_mode,
            CanonicalPolicy::new(config.wire_domains.clone()),
        )
        .with_weighting(config.weighting)
    }

    /// Clusterer for the cross-keyword pool.
    pub fn for_global(config: &DedupConfig) -> Self {
        Self::new(
            config.global_title_threshold,
            config.global_body_threshold,
            config.global_merge_mode,
            CanonicalPolicy::new(config.wire_domains.clone()),
        )
        .with_weighting(config.weighting)
    }

    pub fn policy(&self) -> &CanonicalPolicy {
        &self.policy
    }

    pub fn cluster(&self, articles: Vec<Article>) -> Result<ClusteredBatch> {
        if articles.is_empty() {
            return Ok(ClusteredBatch::default());
        }

        let titles: Vec<String> = articles.iter().map(|a| normalize_title(&a.title)).collect();
        let bodies: Vec<&str> = articles.iter().map(|a| a.content.as_str()).collect();

        let title_groups = self.title_grouper.group(&titles);
        let body_groups = self.body_grouper.group(&bodies);
        let clusters = self
            .merger
            .merge(&title_groups, &body_groups)
            .context("Failed to merge similarity groups")?;

        let mut members: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (index, cluster) in clusters.iter().enumerate() {
            members.entry(*cluster).or_default().push(index);
        }

        let mut canonical_of: Vec<usize> = vec![0; articles.len()];
        for (cluster, indices) in &members {
            let candidates: Vec<&Article> = indices.iter().map(|&i| &articles[i]).collect();
            let chosen = self
                .policy
                .select_index(&candidates)
                .map(|position| indices[position])
                .with_context(|| format!("Cluster {} has no members", cluster))?;
            for &i in indices {
                canonical_of[i] = chosen;
                if i != chosen {
                    debug!(
                        target: TARGET_DEDUP,
                        "Cluster C-{}: {} replaced by {}",
                        cluster,
                        articles[i].news_id,
                        articles[chosen].news_id
                    );
                }
            }
        }

        let assignments: Vec<ClusterAssignment> = (0..articles.len())
            .map(|i| {
                let chosen = canonical_of[i];
                ClusterAssignment {
                    cluster_id: clusters[i],
                    title_group_id: title_groups[i],
                    body_group_id: body_groups[i],
                    is_canonical: chosen == i,
                    replaced_by: (chosen != i).then(|| articles[chosen].news_id.clone()),
                }
            })
            .collect();

        info!(
            target: TARGET_DEDUP,
            "Clustered {} articles into {} clusters ({} merge)",
            articles.len(),
            members.len(),
            self.merger.mode()
        );

        Ok(ClusteredBatch {
            articles,
            assignments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: &str, pub_date: &str, title: &str, content: &str) -> Article {
        Article {
            search_keyword: "국회".to_string(),
            news_id: id.to_string(),
            pub_date: pub_date.to_string(),
            collected_at: "2026-01-28 12:00:00".to_string(),
            title: title.to_string(),
            description: String::new(),
            link: format!("https://n.news.naver.com/{}", id),
            originallink: format!("https://www.example-paper.co.kr/{}", id),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_identical_titles_pick_earliest_without_wire() {
        let clusterer =
            ArticleClusterer::new(0.2, 0.9, MergeMode::Or, CanonicalPolicy::new(Vec::new()));
        let batch = clusterer
            .cluster(vec![
                article("a", "2026-01-28 10:00:00", "예산안 본회의 통과", "first body about budget"),
                article("b", "2026-01-28 08:00:00", "예산안 본회의 통과", "rain and flooding report"),
                article("c", "2026-01-28 09:00:00", "예산안 본회의 통과", "sports results overnight"),
            ])
            .unwrap();

        assert_eq!(batch.cluster_count(), 1);
        let canonical = batch.canonical();
        assert_eq!(canonical.len(), 1);
        assert_eq!(canonical[0].news_id, "b");
        assert_eq!(batch.assignments[0].replaced_by.as_deref(), Some("b"));
        assert_eq!(batch.assignments[1].replaced_by, None);
    }

    #[test]
    fn test_every_cluster_has_exactly_one_canonical() {
        let clusterer =
            ArticleClusterer::new(0.3, 0.5, MergeMode::Or, CanonicalPolicy::default());
        let batch = clusterer
            .cluster(vec![
                article("a", "2026-01-28 10:00:00", "budget vote passes", "budget body"),
                article("b", "2026-01-28 11:00:00", "storm floods villages", "storm body"),
                article("c", "2026-01-28 12:00:00", "budget vote passes", "other text"),
                article("d", "2026-01-28 13:00:00", "new stadium opens", "stadium body"),
            ])
            .unwrap();

        for cluster in 0..batch.cluster_count() {
            let canonical = batch
                .assignments
                .iter()
                .filter(|a| a.cluster_id == cluster && a.is_canonical)
                .count();
            assert_eq!(canonical, 1, "cluster {} has {} canonicals", cluster, canonical);
        }

        let canonical_ids: Vec<String> = batch.canonical().into_iter().map(|a| a.news_id).collect();
        for assignment in &batch.assignments {
            if let Some(target) = &assignment.replaced_by {
                assert!(canonical_ids.contains(target));
            }
        }
    }

    #[test]
    fn test_log_rows_are_grouped_by_cluster() {
        let clusterer =
            ArticleClusterer::new(0.2, 0.9, MergeMode::Or, CanonicalPolicy::new(Vec::new()));
        let batch = clusterer
            .cluster(vec![
                article("a", "2026-01-28 10:00:00", "same headline here", "x1"),
                article("b", "2026-01-28 11:00:00", "different story entirely", "y1"),
                article("c", "2026-01-28 09:00:00", "same headline here", "z1"),
            ])
            .unwrap();
        let rows = batch.similarity_log_rows();
        let ids: Vec<&str> = rows.iter().map(|r| r.news_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(rows[0].cluster_id, "C-0");
        assert_eq!(rows[1].replaced_by, "c");
        assert_eq!(rows[2].title_group_id, "T-1");
    }

    #[test]
    fn test_empty_batch() {
        let clusterer = ArticleClusterer::for_keyword(&DedupConfig::default());
        let batch = clusterer.cluster(Vec::new()).unwrap();
        assert!(batch.articles.is_empty());
        assert_eq!(batch.cluster_count(), 0);
    }
}
