use serde::Serialize;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::article::Article;
use crate::store::table::Table;
use crate::TARGET_DEDUP;

/// Width of the character shingles fed into the fingerprint
const SHINGLE_WIDTH: usize = 4;

/// 64-bit SimHash of a text: similar texts have a small Hamming distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimHash(pub u64);

fn feature_hash(feature: &str) -> u64 {
    let digest = Sha256::digest(feature.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

impl SimHash {
    /// Fingerprints the lowercased word characters of `text` as 4-character shingles.
    pub fn of(text: &str) -> Self {
        let chars: Vec<char> = text
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect();

        let mut weights: HashMap<String, i64> = HashMap::new();
        if chars.len() < SHINGLE_WIDTH {
            weights.insert(chars.iter().collect(), 1);
        } else {
            for window in chars.windows(SHINGLE_WIDTH) {
                *weights.entry(window.iter().collect()).or_insert(0) += 1;
            }
        }

        let mut v = [0i64; 64];
        for (feature, weight) in &weights {
            let h = feature_hash(feature);
            for (bit, item) in v.iter_mut().enumerate() {
                if (h >> bit) & 1 == 1 {
                    *item += weight;
                } else {
                    *item -= weight;
                }
            }
        }

        let mut fingerprint: u64 = 0;
        for (bit, item) in v.iter().enumerate() {
            if *item > 0 {
                fingerprint |= 1 << bit;
            }
        }
        SimHash(fingerprint)
    }

    /// Count differing bits between two fingerprints
    pub fn distance(self, other: SimHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

/// An article dropped by the fingerprint pass, with what it duplicated.
#[derive(Debug, Clone)]
pub struct FingerprintRemoval {
    pub article: Article,
    pub duplicate_of: String,
    pub title_distance: u32,
    pub body_distance: u32,
}

/// Row of the per-run fingerprint log.
#[derive(Debug, Clone, Serialize)]
pub struct FingerprintLogRow {
    pub news_id: String,
    #[serde(rename = "pubDate")]
    pub pub_date: String,
    pub collected_at: String,
    pub title: String,
    pub link: String,
    pub removed_by: &'static str,
    pub duplicate_of: String,
    pub title_distance: u32,
    pub body_distance: u32,
}

impl Table for FingerprintLogRow {
    const COLUMNS: &'static [&'static str] = &[
        "news_id",
        "pubDate",
        "collected_at",
        "title",
        "link",
        "removed_by",
        "duplicate_of",
        "title_distance",
        "body_distance",
    ];
}

impl From<&FingerprintRemoval> for FingerprintLogRow {
    fn from(removal: &FingerprintRemoval) -> Self {
        FingerprintLogRow {
            news_id: removal.article.news_id.clone(),
            pub_date: removal.article.pub_date.clone(),
            collected_at: removal.article.collected_at.clone(),
            title: removal.article.title.clone(),
            link: removal.article.link.clone(),
            removed_by: FingerprintDeduplicator::REMOVED_BY,
            duplicate_of: removal.duplicate_of.clone(),
            title_distance: removal.title_distance,
            body_distance: removal.body_distance,
        }
    }
}

#[derive(Debug, Default)]
pub struct FingerprintOutcome {
    pub kept: Vec<Article>,
    pub removed: Vec<FingerprintRemoval>,
}

/// Drops re-publications whose title AND body fingerprints are both within budget.
#[derive(Debug, Clone)]
pub struct FingerprintDeduplicator {
    title_distance: u32,
    body_distance: u32,
}

impl FingerprintDeduplicator {
    pub const REMOVED_BY: &'static str = "fingerprint";

    pub fn new(title_distance: u32, body_distance: u32) -> Self {
        Self {
            title_distance,
            body_distance,
        }
    }

    pub fn deduplicate(&self, mut articles: Vec<Article>) -> FingerprintOutcome {
        if articles.is_empty() {
            return FingerprintOutcome::default();
        }

        // Earliest collected article survives; unparsable times go last, ties keep input order
        articles.sort_by(|a, b| match (a.collected_time(), b.collected_time()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        let fingerprints: Vec<(SimHash, SimHash)> = articles
            .iter()
            .map(|a| (SimHash::of(&a.title), SimHash::of(&a.content)))
            .collect();

        let total = articles.len();
        let mut dropped: Vec<Option<(usize, u32, u32)>> = vec![None; total];

        for i in 0..total {
            if dropped[i].is_some() {
                continue;
            }
            let (title_i, body_i) = fingerprints[i];
            for j in i + 1..total {
                if dropped[j].is_some() {
                    continue;
                }
                let (title_j, body_j) = fingerprints[j];
                let title_distance = title_i.distance(title_j);
                let body_distance = body_i.distance(body_j);

                if title_distance <= self.title_distance && body_distance <= self.body_distance {
                    debug!(
                        target: TARGET_DEDUP,
                        "Fingerprint duplicate: {} repeats {} (title distance {} <= {}, body distance {} <= {})",
                        articles[j].news_id,
                        articles[i].news_id,
                        title_distance,
                        self.title_distance,
                        body_distance,
                        self.body_distance
                    );
                    dropped[j] = Some((i, title_distance, body_distance));
                }
            }
        }

        let kept_ids: Vec<String> = articles.iter().map(|a| a.news_id.clone()).collect();
        let mut outcome = FingerprintOutcome::default();
        for (article, drop) in articles.into_iter().zip(dropped) {
            match drop {
                None => outcome.kept.push(article),
                Some((kept_index, title_distance, body_distance)) => {
                    outcome.removed.push(FingerprintRemoval {
                        article,
                        duplicate_of: kept_ids[kept_index].clone(),
                        title_distance,
                        body_distance,
                    })
                }
            }
        }

        info!(
            target: TARGET_DEDUP,
            "Fingerprint pass: {} in -> {} kept ({} removed)",
            total,
            outcome.kept.len(),
            outcome.removed.len()
        );
        outcome
    }
}
