//! Article identity and timestamp normalization.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use url::Url;
use urlnorm::UrlNormalizer;

/// Number of hex characters kept from the URL digest
pub const NEWS_ID_LEN: usize = 16;

/// Storage format for `pubDate` and `collected_at`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Normalizes a link so that trivially different spellings share one identity.
///
/// Links that do not parse as URLs are only trimmed.
pub fn canonical_link(link: &str) -> String {
    let trimmed = link.trim();
    match Url::parse(trimmed) {
        Ok(parsed) => UrlNormalizer::default().compute_normalization_string(&parsed),
        Err(_) => trimmed.to_string(),
    }
}

/// Content address of an article: the same link always yields the same id.
pub fn news_id(link: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_link(link).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..NEWS_ID_LEN].to_string()
}

/// Parse a date string in the formats the search provider and our archives use
pub fn parse_pub_date(date_str: &str) -> Option<DateTime<Utc>> {
    let date_str = date_str.trim();
    if date_str.is_empty() {
        return None;
    }

    // Try RFC2822, which is what the provider sends
    if let Ok(date) = DateTime::parse_from_rfc2822(date_str) {
        return Some(date.with_timezone(&Utc));
    }

    // Try RFC3339
    if let Ok(date) = DateTime::parse_from_rfc3339(date_str) {
        return Some(date.with_timezone(&Utc));
    }

    if let Ok(date) = DateTime::parse_from_str(date_str, "%Y-%m-%d %H:%M:%S%z") {
        return Some(date.with_timezone(&Utc));
    }

    // Archive format carries no offset and is always UTC
    for format in &[TIMESTAMP_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(date_str, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(day) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        return day
            .and_hms_opt(0, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive));
    }

    None
}

/// Converts a provider date into the archive format.
///
/// Unparsable input is kept verbatim so the row survives; it simply sorts last.
pub fn normalize_pub_date(raw: &str) -> String {
    match parse_pub_date(raw) {
        Some(date) => format_timestamp(&date),
        None => raw.trim().to_string(),
    }
}

pub fn format_timestamp(date: &DateTime<Utc>) -> String {
    date.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_news_id_is_stable() {
        let link = "https://n.news.naver.com/mnews/article/001/0014712345?sid=100";
        let first = news_id(link);
        assert_eq!(first, news_id(link));
        assert_eq!(first.len(), NEWS_ID_LEN);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_news_id_ignores_surrounding_whitespace() {
        assert_eq!(
            news_id("  https://www.yna.co.kr/view/AKR20260101000100001  "),
            news_id("https://www.yna.co.kr/view/AKR20260101000100001")
        );
    }

    #[test]
    fn test_distinct_links_have_distinct_ids() {
        assert_ne!(
            news_id("https://www.yna.co.kr/view/AKR1"),
            news_id("https://www.yna.co.kr/view/AKR2")
        );
    }

    #[test]
    fn test_unparsable_link_still_gets_an_id() {
        assert_eq!(news_id("not a url"), news_id("not a url"));
    }

    #[test]
    fn test_normalize_provider_date() {
        assert_eq!(
            normalize_pub_date("Mon, 26 Jan 2026 09:30:00 +0900"),
            "2026-01-26 00:30:00"
        );
        assert_eq!(normalize_pub_date("2026-01-26 00:30:00"), "2026-01-26 00:30:00");
    }

    #[test]
    fn test_malformed_date_is_kept() {
        assert_eq!(normalize_pub_date(" yesterday "), "yesterday");
        assert!(parse_pub_date("yesterday").is_none());
        assert!(parse_pub_date("").is_none());
    }
}
