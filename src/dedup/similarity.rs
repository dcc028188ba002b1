use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

use crate::error::UnknownVariant;
use crate::text::ngram_features;
use crate::TARGET_DEDUP;

/// How n-gram counts are weighted before the cosine comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Weighting {
    /// Counts scaled by smoothed inverse document frequency over the batch
    #[default]
    TfIdf,
    /// Raw counts
    TermFrequency,
}

impl FromStr for Weighting {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tfidf" | "tf-idf" => Ok(Weighting::TfIdf),
            "tf" | "count" => Ok(Weighting::TermFrequency),
            _ => Err(UnknownVariant {
                kind: "weighting",
                value: s.to_string(),
                expected: "tfidf, tf",
            }),
        }
    }
}

/// L2-normalized sparse vector, sorted by feature index
type SparseVector = Vec<(usize, f64)>;

fn vectorize<S: AsRef<str>>(texts: &[S], weighting: Weighting) -> Vec<SparseVector> {
    let mut vocabulary: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<HashMap<usize, f64>> = Vec::with_capacity(texts.len());

    for text in texts {
        let mut doc: HashMap<usize, f64> = HashMap::new();
        for feature in ngram_features(text.as_ref()) {
            let next = vocabulary.len();
            let index = *vocabulary.entry(feature).or_insert(next);
            *doc.entry(index).or_insert(0.0) += 1.0;
        }
        counts.push(doc);
    }

    let idf = match weighting {
        Weighting::TfIdf => {
            let mut document_frequency = vec![0usize; vocabulary.len()];
            for doc in &counts {
                for &index in doc.keys() {
                    document_frequency[index] += 1;
                }
            }
            let n = texts.len() as f64;
            document_frequency
                .into_iter()
                .map(|df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
                .collect()
        }
        Weighting::TermFrequency => vec![1.0; vocabulary.len()],
    };

    counts
        .into_iter()
        .map(|doc| {
            let mut vector: SparseVector = doc
                .into_iter()
                .map(|(index, count)| (index, count * idf[index]))
                .collect();
            let norm = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                for (_, weight) in vector.iter_mut() {
                    *weight /= norm;
                }
            }
            vector.sort_unstable_by_key(|(index, _)| *index);
            vector
        })
        .collect()
}

/// Cosine of two normalized vectors; zero vectors are dissimilar to everything.
fn cosine(a: &SparseVector, b: &SparseVector) -> f64 {
    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0;
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    dot
}

/// Partitions texts into similarity groups by comparing each text against group seeds.
///
/// The first unassigned text seeds a group, and only later unassigned texts
/// are compared, and only against that seed. Members that join a group are
/// never used as anchors within the same call, so the result is not a
/// single-linkage clustering.
#[derive(Debug, Clone)]
pub struct SimilarityGrouper {
    threshold: f64,
    weighting: Weighting,
    label: &'static str,
}

impl SimilarityGrouper {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            weighting: Weighting::default(),
            label: "text",
        }
    }

    pub fn with_weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Name used in debug logs ("title", "body").
    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Returns one group index per input text, numbered from 0 in seed order.
    pub fn group<S: AsRef<str>>(&self, texts: &[S]) -> Vec<usize> {
        if texts.is_empty() {
            return Vec::new();
        }

        let vectors = vectorize(texts, self.weighting);
        let mut group_ids: Vec<Option<usize>> = vec![None; texts.len()];
        let mut current_group = 0;

        for seed in 0..texts.len() {
            if group_ids[seed].is_some() {
                continue;
            }
            group_ids[seed] = Some(current_group);

            for candidate in seed + 1..texts.len() {
                if group_ids[candidate].is_some() {
                    continue;
                }
                let similarity = cosine(&vectors[seed], &vectors[candidate]);
                if similarity >= self.threshold {
                    debug!(
                        target: TARGET_DEDUP,
                        "[{} similarity {:.4}] {} <-> {}", self.label, similarity, seed, candidate
                    );
                    group_ids[candidate] = Some(current_group);
                }
            }

            current_group += 1;
        }

        group_ids
            .into_iter()
            .map(|id| id.unwrap_or_default())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_single_input() {
        let grouper = SimilarityGrouper::new(0.5);
        assert!(grouper.group::<&str>(&[]).is_empty());
        assert_eq!(grouper.group(&["only one"]), vec![0]);
    }

    #[test]
    fn test_identical_texts_share_a_group() {
        let grouper = SimilarityGrouper::new(0.2);
        let titles = [
            "국회 예산안 본회의 통과",
            "국회 예산안 본회의 통과",
            "국회 예산안 본회의 통과",
        ];
        assert_eq!(grouper.group(&titles), vec![0, 0, 0]);
    }

    #[test]
    fn test_unrelated_texts_split() {
        let grouper = SimilarityGrouper::new(0.3);
        let texts = [
            "budget vote passes parliament",
            "storm floods coastal villages",
            "budget vote passes parliament today",
        ];
        assert_eq!(grouper.group(&texts), vec![0, 1, 0]);
    }

    #[test]
    fn test_empty_strings_are_dissimilar() {
        let grouper = SimilarityGrouper::new(0.1);
        assert_eq!(grouper.group(&["", "budget vote", ""]), vec![0, 1, 2]);
    }

    #[test]
    fn test_joined_members_are_not_anchors() {
        // B is close to the seed A, C is close to B but not to A.
        // Single-linkage would chain C into A's group; seed comparison must not.
        let grouper = SimilarityGrouper::new(0.5).with_weighting(Weighting::TermFrequency);
        let texts = [
            "alpha beta gamma delta",
            "alpha beta gamma delta epsilon zeta",
            "gamma delta epsilon zeta eta theta",
        ];
        let groups = grouper.group(&texts);
        assert_eq!(groups[0], groups[1]);
        assert_ne!(groups[0], groups[2]);
    }

    #[test]
    fn test_term_frequency_cosine_of_identical_text_is_one() {
        let vectors = vectorize(&["same words here", "same words here"], Weighting::TermFrequency);
        assert!((cosine(&vectors[0], &vectors[1]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighting_from_str() {
        assert_eq!("TF-IDF".parse::<Weighting>().unwrap(), Weighting::TfIdf);
        assert_eq!("tf".parse::<Weighting>().unwrap(), Weighting::TermFrequency);
        assert!("bm25".parse::<Weighting>().is_err());
    }
}
