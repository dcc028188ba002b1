//! Rule-based filtering before and after body extraction.

use std::collections::HashSet;
use tracing::info;
use url::Url;

use crate::article::Article;
use crate::config::DedupConfig;
use crate::TARGET_PIPELINE;

pub const MIN_DESCRIPTION_CHARS: usize = 20;
pub const MIN_BODY_CHARS: usize = 200;
pub const MAX_BODY_CHARS: usize = 5000;

/// An article removed by a filter rule, kept for the run summary.
#[derive(Debug, Clone)]
pub struct Filtered {
    pub article: Article,
    pub reason: &'static str,
}

pub trait ArticleFilter {
    /// Rules that only need the search result (title, summary, links).
    fn pre_filter(&self, articles: Vec<Article>) -> (Vec<Article>, Vec<Filtered>);

    /// Rules that need the extracted body.
    fn post_filter(&self, articles: Vec<Article>) -> (Vec<Article>, Vec<Filtered>);
}

#[derive(Debug, Clone)]
pub struct RuleFilter {
    keyword: String,
    keyword_required: bool,
    exclude_words: Vec<String>,
}

fn press_host(originallink: &str) -> String {
    Url::parse(originallink.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_default()
}

impl RuleFilter {
    pub fn new(keyword: &str, keyword_required: bool, exclude_words: Vec<String>) -> Self {
        Self {
            keyword: keyword.to_string(),
            keyword_required,
            exclude_words: exclude_words
                .into_iter()
                .map(|w| w.to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn for_keyword(config: &DedupConfig, keyword: &str, keyword_required: bool) -> Self {
        Self::new(keyword, keyword_required, config.exclude_words.clone())
    }

    fn pre_reason(&self, article: &Article, seen: &mut HashSet<(String, String)>) -> Option<&'static str> {
        let title = article.title.to_lowercase();
        if self.keyword_required && !title.contains(&self.keyword.to_lowercase()) {
            return Some("missing_keyword_in_title");
        }
        if self.exclude_words.iter().any(|w| title.contains(w.as_str())) {
            return Some("exclude_pattern");
        }
        if article.description.chars().count() < MIN_DESCRIPTION_CHARS {
            return Some("short_snippet");
        }
        if !seen.insert((press_host(&article.originallink), article.title.clone())) {
            return Some("duplicate_title");
        }
        None
    }

    fn post_reason(&self, article: &Article) -> Option<&'static str> {
        let body = article.content.trim();
        let length = body.chars().count();
        if body.is_empty() {
            Some("empty_content")
        } else if length < MIN_BODY_CHARS {
            Some("too_short_content")
        } else if length > MAX_BODY_CHARS {
            Some("too_long_content")
        } else {
            None
        }
    }
}

fn partition(
    stage: &str,
    keyword: &str,
    articles: Vec<Article>,
    mut reason: impl FnMut(&Article) -> Option<&'static str>,
) -> (Vec<Article>, Vec<Filtered>) {
    let before = articles.len();
    let mut kept = Vec::with_capacity(before);
    let mut filtered = Vec::new();
    for article in articles {
        match reason(&article) {
            Some(reason) => filtered.push(Filtered { article, reason }),
            None => kept.push(article),
        }
    }
    info!(
        target: TARGET_PIPELINE,
        "[{}] {}: {} -> {} (removed {})",
        keyword,
        stage,
        before,
        kept.len(),
        filtered.len()
    );
    (kept, filtered)
}

impl ArticleFilter for RuleFilter {
    fn pre_filter(&self, articles: Vec<Article>) -> (Vec<Article>, Vec<Filtered>) {
        let mut seen = HashSet::new();
        partition("pre-filter", &self.keyword, articles, |a| self.pre_reason(a, &mut seen))
    }

    fn post_filter(&self, articles: Vec<Article>) -> (Vec<Article>, Vec<Filtered>) {
        partition("post-filter", &self.keyword, articles, |a| self.post_reason(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: &str, title: &str, description: &str, originallink: &str) -> Article {
        Article {
            search_keyword: "국민의힘".to_string(),
            news_id: id.to_string(),
            pub_date: "2026-01-28 10:00:00".to_string(),
            collected_at: "2026-01-28 12:00:00".to_string(),
            title: title.to_string(),
            description: description.to_string(),
            link: format!("https://n.news.naver.com/{}", id),
            originallink: originallink.to_string(),
            content: String::new(),
        }
    }

    const LONG_DESCRIPTION: &str = "국민의힘 지도부가 오늘 오전 최고위원회의를 열고 현안을 논의했다";

    #[test]
    fn test_pre_filter_rules() {
        let filter = RuleFilter::new("국민의힘", true, vec!["[포토]".to_string()]);
        let (kept, filtered) = filter.pre_filter(vec![
            article("ok", "국민의힘 최고위 개최", LONG_DESCRIPTION, "https://a.com/1"),
            article("nokw", "여야 협상 재개", LONG_DESCRIPTION, "https://a.com/2"),
            article("photo", "[포토] 국민의힘 회의", LONG_DESCRIPTION, "https://a.com/3"),
            article("short", "국민의힘 논평", "짧은 요약", "https://a.com/4"),
            article("dup", "국민의힘 최고위 개최", LONG_DESCRIPTION, "https://a.com/5"),
            article("otherpress", "국민의힘 최고위 개최", LONG_DESCRIPTION, "https://b.com/1"),
        ]);

        let kept_ids: Vec<&str> = kept.iter().map(|a| a.news_id.as_str()).collect();
        assert_eq!(kept_ids, vec!["ok", "otherpress"]);

        let reasons: Vec<(&str, &str)> = filtered
            .iter()
            .map(|f| (f.article.news_id.as_str(), f.reason))
            .collect();
        assert_eq!(
            reasons,
            vec![
                ("nokw", "missing_keyword_in_title"),
                ("photo", "exclude_pattern"),
                ("short", "short_snippet"),
                ("dup", "duplicate_title"),
            ]
        );
    }

    #[test]
    fn test_post_filter_body_length() {
        let filter = RuleFilter::new("국회", false, Vec::new());
        let mut empty = article("empty", "t", LONG_DESCRIPTION, "");
        empty.content = "   ".to_string();
        let mut short = article("short", "t", LONG_DESCRIPTION, "");
        short.content = "짧다".to_string();
        let mut good = article("good", "t", LONG_DESCRIPTION, "");
        good.content = "가".repeat(MIN_BODY_CHARS);
        let mut long = article("long", "t", LONG_DESCRIPTION, "");
        long.content = "가".repeat(MAX_BODY_CHARS + 1);

        let (kept, filtered) = filter.post_filter(vec![empty, short, good, long]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].news_id, "good");
        assert_eq!(filtered.len(), 3);
    }
}
