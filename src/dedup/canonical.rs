use chrono::{DateTime, Utc};
use url::Url;

use crate::article::{Article, GlobalArticle};
use crate::identity::parse_pub_date;

/// Wire services whose filings are treated as the origin of syndicated coverage
pub const DEFAULT_WIRE_DOMAINS: &[&str] = &["newsis.com", "yna.co.kr", "news1.kr"];

/// Anything the canonical policy can choose between.
pub trait Candidate {
    /// Publisher URL used to recognise wire-service filings
    fn publisher_link(&self) -> &str;

    /// Publish time, `None` when missing or malformed
    fn published_at(&self) -> Option<DateTime<Utc>>;
}

impl Candidate for Article {
    fn publisher_link(&self) -> &str {
        &self.originallink
    }

    fn published_at(&self) -> Option<DateTime<Utc>> {
        parse_pub_date(&self.pub_date)
    }
}

impl Candidate for GlobalArticle {
    fn publisher_link(&self) -> &str {
        &self.originallink
    }

    fn published_at(&self) -> Option<DateTime<Utc>> {
        parse_pub_date(&self.pub_date)
    }
}

impl<T: Candidate> Candidate for &T {
    fn publisher_link(&self) -> &str {
        (**self).publisher_link()
    }

    fn published_at(&self) -> Option<DateTime<Utc>> {
        (**self).published_at()
    }
}

/// Picks the single representative of a cluster.
///
/// A lone wire-service filing wins outright; several wire filings resolve to
/// the earliest one; without any wire filing the earliest article wins.
/// Missing timestamps sort after every real one, and equal timestamps keep
/// the input order.
#[derive(Debug, Clone)]
pub struct CanonicalPolicy {
    wire_domains: Vec<String>,
}

impl Default for CanonicalPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_WIRE_DOMAINS.iter().map(|d| d.to_string()).collect())
    }
}

impl CanonicalPolicy {
    pub fn new(wire_domains: Vec<String>) -> Self {
        let wire_domains = wire_domains
            .into_iter()
            .map(|d| d.trim().trim_start_matches('.').to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { wire_domains }
    }

    pub fn wire_domains(&self) -> &[String] {
        &self.wire_domains
    }

    pub fn is_wire_service(&self, link: &str) -> bool {
        let link = link.trim();
        if link.is_empty() {
            return false;
        }
        match Url::parse(link).ok().and_then(|u| u.host_str().map(str::to_lowercase)) {
            Some(host) => self
                .wire_domains
                .iter()
                .any(|d| host == *d || host.ends_with(&format!(".{}", d))),
            // Not a URL; fall back to a plain substring match
            None => {
                let link = link.to_lowercase();
                self.wire_domains.iter().any(|d| link.contains(d.as_str()))
            }
        }
    }

    /// Index of the canonical candidate, `None` only for an empty slice.
    pub fn select_index<C: Candidate>(&self, candidates: &[C]) -> Option<usize> {
        let wire: Vec<usize> = (0..candidates.len())
            .filter(|&i| self.is_wire_service(candidates[i].publisher_link()))
            .collect();

        match wire.len() {
            0 => earliest(candidates, 0..candidates.len()),
            1 => Some(wire[0]),
            _ => earliest(candidates, wire.into_iter()),
        }
    }

    pub fn select<'a, C: Candidate>(&self, candidates: &'a [C]) -> Option<&'a C> {
        self.select_index(candidates).map(|i| &candidates[i])
    }
}

fn earliest<C: Candidate>(candidates: &[C], indices: impl Iterator<Item = usize>) -> Option<usize> {
    indices.min_by_key(|&i| {
        let published = candidates[i].published_at();
        (published.is_none(), published, i)
    })
}
