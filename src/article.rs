use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{news_id, normalize_pub_date, parse_pub_date};
use crate::source::RawItem;
use crate::store::table::Table;
use crate::text::normalize_html_text;

/// A single collected story, in the column order of the per-keyword archives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub search_keyword: String,
    pub news_id: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    pub collected_at: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub link: String,
    #[serde(default)]
    pub originallink: String,
    #[serde(default)]
    pub content: String,
}

impl Table for Article {
    const COLUMNS: &'static [&'static str] = &[
        "search_keyword",
        "news_id",
        "pubDate",
        "collected_at",
        "title",
        "description",
        "link",
        "originallink",
        "content",
    ];
}

impl Article {
    /// Builds an article from a provider item, deriving its id from the link.
    pub fn from_item(keyword: &str, item: RawItem, collected_at: &str) -> Self {
        Article {
            search_keyword: keyword.to_string(),
            news_id: news_id(&item.link),
            pub_date: normalize_pub_date(&item.pub_date),
            collected_at: collected_at.to_string(),
            title: normalize_html_text(&item.title),
            description: normalize_html_text(&item.description),
            link: item.link.trim().to_string(),
            originallink: item.originallink.trim().to_string(),
            content: item.content,
        }
    }

    /// Publish time, `None` when the stored value is malformed.
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        parse_pub_date(&self.pub_date)
    }

    pub fn collected_time(&self) -> Option<DateTime<Utc>> {
        parse_pub_date(&self.collected_at)
    }
}

/// Row of the global canonical archive: identity and time columns first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalArticle {
    pub news_id: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    pub collected_at: String,
    pub search_keyword: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub link: String,
    #[serde(default)]
    pub originallink: String,
    #[serde(default)]
    pub content: String,
}

impl Table for GlobalArticle {
    const COLUMNS: &'static [&'static str] = &[
        "news_id",
        "pubDate",
        "collected_at",
        "search_keyword",
        "title",
        "description",
        "link",
        "originallink",
        "content",
    ];
}

impl GlobalArticle {
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        parse_pub_date(&self.pub_date)
    }
}

impl From<Article> for GlobalArticle {
    fn from(article: Article) -> Self {
        GlobalArticle {
            news_id: article.news_id,
            pub_date: article.pub_date,
            collected_at: article.collected_at,
            search_keyword: article.search_keyword,
            title: article.title,
            description: article.description,
            link: article.link,
            originallink: article.originallink,
            content: article.content,
        }
    }
}

/// Short human-readable copy of a selected archive row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedCopyRow {
    pub news_id: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    pub title: String,
    pub description: String,
}

impl Table for SelectedCopyRow {
    const COLUMNS: &'static [&'static str] = &["news_id", "pubDate", "title", "description"];
}

impl From<&Article> for SelectedCopyRow {
    fn from(article: &Article) -> Self {
        SelectedCopyRow {
            news_id: article.news_id.clone(),
            pub_date: article.pub_date.clone(),
            title: article.title.clone(),
            description: article.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(link: &str) -> RawItem {
        RawItem {
            title: "<b>국회</b> 예산안 &quot;처리&quot;".to_string(),
            description: "여야가 예산안을 처리했다".to_string(),
            link: link.to_string(),
            originallink: "https://www.yna.co.kr/view/AKR1".to_string(),
            pub_date: "Mon, 26 Jan 2026 09:30:00 +0900".to_string(),
            content: String::new(),
        }
    }

    #[test]
    fn test_same_link_same_id_across_keywords() {
        let link = "https://n.news.naver.com/article/001/1";
        let a = Article::from_item("이재명", item(link), "2026-01-26 01:00:00");
        let b = Article::from_item("국민의힘", item(link), "2026-01-27 01:00:00");
        assert_eq!(a.news_id, b.news_id);
    }

    #[test]
    fn test_from_item_normalizes_fields() {
        let article = Article::from_item(
            "국회",
            item("https://n.news.naver.com/article/001/1"),
            "2026-01-26 01:00:00",
        );
        assert_eq!(article.title, "국회 예산안 \"처리\"");
        assert_eq!(article.pub_date, "2026-01-26 00:30:00");
        assert!(article.published_at().is_some());
    }
}
