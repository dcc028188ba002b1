//! One keyword, end to end: fetch, archive, filter, extract, dedup, select.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::article::Article;
use crate::config::{DedupConfig, KeywordSpec};
use crate::dedup::{ArticleClusterer, FingerprintDeduplicator, FingerprintLogRow};
use crate::filter::{ArticleFilter, Filtered, RuleFilter};
use crate::identity::format_timestamp;
use crate::source::{ContentExtractor, NewsProvider};
use crate::store::keyword::KeywordStore;
use crate::summary::{PipelineStats, RunLog};
use crate::TARGET_PIPELINE;

pub const STATUS_SUCCESS: &str = "success";

/// Runs keyword batches against a provider and an extractor.
pub struct KeywordPipeline<'a> {
    config: &'a DedupConfig,
    provider: &'a dyn NewsProvider,
    extractor: &'a dyn ContentExtractor,
    request_delay: Duration,
}

fn count_filtered(removed_by: &mut BTreeMap<String, usize>, stage: &str, filtered: &[Filtered]) {
    for f in filtered {
        *removed_by
            .entry(format!("{}:{}", stage, f.reason))
            .or_insert(0) += 1;
    }
}

impl<'a> KeywordPipeline<'a> {
    pub fn new(
        config: &'a DedupConfig,
        provider: &'a dyn NewsProvider,
        extractor: &'a dyn ContentExtractor,
    ) -> Self {
        Self {
            config,
            provider,
            extractor,
            request_delay: Duration::from_millis(config.request_delay_ms),
        }
    }

    /// Pause between two extraction requests.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Runs every keyword in turn; one keyword failing never stops the others.
    pub fn run_keywords(&self, keywords: &[KeywordSpec]) -> Vec<PipelineStats> {
        keywords.iter().map(|spec| self.run(spec)).collect()
    }

    /// Runs one keyword and reports the outcome, including failures, as stats.
    pub fn run(&self, spec: &KeywordSpec) -> PipelineStats {
        let mut stats = PipelineStats {
            keyword: spec.keyword.clone(),
            ..PipelineStats::default()
        };
        let mut run_log = RunLog::new();

        match self.try_run(spec, &mut stats, &mut run_log) {
            Ok(()) => {
                stats.status = STATUS_SUCCESS.to_string();
                info!(
                    target: TARGET_PIPELINE,
                    "[{}] done: {} new raw, {} added to selected archive",
                    spec.keyword,
                    stats.new_raw,
                    stats.final_added
                );
            }
            Err(e) => {
                run_log.end_step("fail");
                stats.status = format!("fail: {:#}", e);
                error!(target: TARGET_PIPELINE, "[{}] pipeline failed: {:#}", spec.keyword, e);
            }
        }

        let store = KeywordStore::for_config(self.config, &spec.keyword);
        let log_path = store
            .dir()
            .join("run_logs")
            .join(format!("{}.json", Utc::now().format("%Y%m%d_%H%M%S")));
        if let Err(e) = run_log.save(&log_path) {
            warn!(target: TARGET_PIPELINE, "[{}] could not save run log: {:#}", spec.keyword, e);
        }
        stats
    }

    fn try_run(&self, spec: &KeywordSpec, stats: &mut PipelineStats, run_log: &mut RunLog) -> Result<()> {
        let keyword = spec.keyword.as_str();
        let store = KeywordStore::for_config(self.config, keyword);
        let filter = RuleFilter::for_keyword(self.config, keyword, spec.keyword_required);
        let now = Utc::now();
        let collected_at = format_timestamp(&now);
        let stamp = now.format("%Y%m%d_%H%M%S").to_string();

        // Step 1: Fetch
        run_log.start_step("fetch");
        let items = self
            .provider
            .fetch(keyword, self.config.fetch_count)
            .with_context(|| format!("Failed to fetch items for {}", keyword))?;
        let articles: Vec<Article> = items
            .into_iter()
            .map(|item| Article::from_item(keyword, item, &collected_at))
            .collect();
        stats.fetched = articles.len();
        run_log.add_metric("fetched", stats.fetched);
        run_log.end_step(STATUS_SUCCESS);

        // Step 2: Raw archive
        run_log.start_step("raw_archive");
        let new_articles = store.save_raw_and_get_new(articles)?;
        stats.new_raw = new_articles.len();
        run_log.add_metric("new_raw", stats.new_raw);
        run_log.end_step(STATUS_SUCCESS);
        if new_articles.is_empty() {
            info!(target: TARGET_PIPELINE, "[{}] nothing new", keyword);
            return Ok(());
        }

        // Step 3: Pre-filter
        run_log.start_step("pre_filter");
        let (candidates, filtered) = filter.pre_filter(new_articles);
        count_filtered(&mut stats.removed_by, "pre_filter", &filtered);
        run_log.add_metric("kept", candidates.len());
        run_log.end_step(STATUS_SUCCESS);

        // Step 4: Extract bodies
        run_log.start_step("extract");
        let extracted = self.extract_bodies(keyword, candidates, stats);
        run_log.add_metric("extracted", extracted.len());
        run_log.end_step(STATUS_SUCCESS);

        // Step 5: Post-filter
        run_log.start_step("post_filter");
        let (with_body, filtered) = filter.post_filter(extracted);
        count_filtered(&mut stats.removed_by, "post_filter", &filtered);
        run_log.add_metric("kept", with_body.len());
        run_log.end_step(STATUS_SUCCESS);

        // Step 6: Fingerprint dedup
        run_log.start_step("fingerprint");
        let outcome = FingerprintDeduplicator::new(
            self.config.fingerprint_title_distance,
            self.config.fingerprint_body_distance,
        )
        .deduplicate(with_body);
        if !outcome.removed.is_empty() {
            *stats
                .removed_by
                .entry(FingerprintDeduplicator::REMOVED_BY.to_string())
                .or_insert(0) += outcome.removed.len();
            let rows: Vec<FingerprintLogRow> = outcome.removed.iter().map(FingerprintLogRow::from).collect();
            store.write_fingerprint_log(&stamp, &rows)?;
        }
        run_log.add_metric("removed", outcome.removed.len());
        run_log.end_step(STATUS_SUCCESS);

        // Step 7: Cluster and select canonicals
        run_log.start_step("cluster");
        let batch = ArticleClusterer::for_keyword(self.config).cluster(outcome.kept)?;
        let non_canonical = batch.non_canonical_count();
        if non_canonical > 0 {
            *stats.removed_by.entry("similarity".to_string()).or_insert(0) += non_canonical;
        }
        store.write_similarity_log(&stamp, &batch.similarity_log_rows())?;
        run_log.add_metric("clusters", batch.cluster_count());
        run_log.end_step(STATUS_SUCCESS);

        // Step 8: Selected archive
        run_log.start_step("selected_archive");
        stats.final_added = store.merge_selected(batch.canonical())?;
        run_log.add_metric("added", stats.final_added);
        run_log.end_step(STATUS_SUCCESS);
        Ok(())
    }

    /// Fills in bodies; an article whose extraction fails is dropped from this run.
    fn extract_bodies(&self, keyword: &str, articles: Vec<Article>, stats: &mut PipelineStats) -> Vec<Article> {
        let mut extracted = Vec::with_capacity(articles.len());
        for (i, mut article) in articles.into_iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                thread::sleep(self.request_delay);
            }
            match self.extractor.extract(&article) {
                Ok(body) => {
                    article.content = body;
                    extracted.push(article);
                }
                Err(e) => {
                    warn!(
                        target: TARGET_PIPELINE,
                        "[{}] extraction failed for {}: {:#}", keyword, article.link, e
                    );
                    *stats
                        .removed_by
                        .entry("extract:failed".to_string())
                        .or_insert(0) += 1;
                }
            }
        }
        extracted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{RawItem, StoredContent};
    use anyhow::bail;

    struct FixedProvider(Vec<RawItem>);

    impl NewsProvider for FixedProvider {
        fn fetch(&self, _keyword: &str, count: usize) -> Result<Vec<RawItem>> {
            Ok(self.0.iter().take(count).cloned().collect())
        }
    }

    struct FailingProvider;

    impl NewsProvider for FailingProvider {
        fn fetch(&self, keyword: &str, _count: usize) -> Result<Vec<RawItem>> {
            bail!("provider unavailable for {}", keyword)
        }
    }

    fn item(n: usize, title: &str, body: &str) -> RawItem {
        RawItem {
            title: title.to_string(),
            description: "국회가 본회의를 열어 여러 안건을 처리했다고 밝혔다".to_string(),
            link: format!("https://n.news.naver.com/mnews/article/001/{}", n),
            originallink: format!("https://press{}.example.com/{}", n, n),
            pub_date: format!("Wed, 28 Jan 2026 {:02}:00:00 +0900", 8 + n),
            content: body.to_string(),
        }
    }

    fn body(topic: &str) -> String {
        format!("{} ", topic).repeat(60)
    }

    fn config(root: &std::path::Path) -> DedupConfig {
        DedupConfig {
            output_root: root.to_path_buf(),
            request_delay_ms: 0,
            ..DedupConfig::default()
        }
    }

    #[test]
    fn test_run_twice_adds_nothing_the_second_time() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        let provider = FixedProvider(vec![
            item(1, "국회 예산안 처리", &body("budget vote passes parliament")),
            item(2, "국회 태풍 대책 논의", &body("storm response plan debated")),
        ]);
        let pipeline = KeywordPipeline::new(&config, &provider, &StoredContent);
        let spec = KeywordSpec::parse("국회");

        let first = pipeline.run(&spec);
        assert!(first.is_success(), "{}", first.status);
        assert_eq!(first.new_raw, 2);
        assert_eq!(first.final_added, 2);

        let second = pipeline.run(&spec);
        assert!(second.is_success());
        assert_eq!(second.new_raw, 0);
        assert_eq!(second.final_added, 0);
    }

    #[test]
    fn test_failure_is_reported_not_raised() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        let pipeline = KeywordPipeline::new(&config, &FailingProvider, &StoredContent);

        let results = pipeline.run_keywords(&[KeywordSpec::parse("국회"), KeywordSpec::parse("예산")]);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|s| s.status.starts_with("fail:")));
    }

    #[test]
    fn test_short_bodies_are_counted_by_reason() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        let provider = FixedProvider(vec![item(1, "국회 예산안 처리", "too short")]);
        let pipeline = KeywordPipeline::new(&config, &provider, &StoredContent);

        let stats = pipeline.run(&KeywordSpec::parse("국회"));
        assert!(stats.is_success());
        assert_eq!(stats.final_added, 0);
        assert_eq!(stats.removed_by["post_filter:too_short_content"], 1);
    }
}
