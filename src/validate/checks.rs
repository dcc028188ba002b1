use std::collections::{BTreeMap, HashMap, HashSet};

use crate::aggregate::{MetaRow, REMOVED_BY_IDENTITY};
use crate::config::DedupConfig;
use crate::dedup::CanonicalPolicy;
use crate::validate::{Check, CheckOutcome, Snapshot};

/// Number of offending ids quoted in a failure message
const SAMPLE: usize = 5;

fn sample<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .take(SAMPLE)
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(", ")
}

fn clusters(meta: &[MetaRow]) -> BTreeMap<&str, Vec<&MetaRow>> {
    let mut clusters: BTreeMap<&str, Vec<&MetaRow>> = BTreeMap::new();
    for row in meta {
        clusters.entry(row.cluster_id.as_str()).or_default().push(row);
    }
    clusters
}

/// The canonical archive, the meta file and (if present) the history keep their schema.
pub struct RequiredColumns;

const CANONICAL_REQUIRED: &[&str] = &["news_id", "link", "title", "pubDate"];
const META_REQUIRED: &[&str] = &[
    "news_id",
    "pubDate",
    "cluster_id",
    "is_global_canonical",
    "global_replaced_by",
];
const HISTORY_REQUIRED: &[&str] = &["news_id", "link", "global_replaced_by"];

fn missing_columns(headers: &[String], required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .map(|c| c.to_string())
        .collect()
}

impl Check for RequiredColumns {
    fn name(&self) -> &'static str {
        "required columns"
    }

    fn run(&self, snapshot: &Snapshot) -> CheckOutcome {
        for (file, headers, required) in [
            ("canonical archive", &snapshot.canonical_headers, CANONICAL_REQUIRED),
            ("meta file", &snapshot.meta_headers, META_REQUIRED),
        ] {
            let Some(headers) = headers else {
                return CheckOutcome::Fail(format!("{} is missing", file));
            };
            let missing = missing_columns(headers, required);
            if !missing.is_empty() {
                return CheckOutcome::Fail(format!("{} lacks columns: {}", file, missing.join(", ")));
            }
        }

        // No history file just means nothing has been excluded yet
        if let Some(headers) = &snapshot.history_headers {
            let missing = missing_columns(headers, HISTORY_REQUIRED);
            if !missing.is_empty() {
                return CheckOutcome::Fail(format!(
                    "duplicate history lacks columns: {}",
                    missing.join(", ")
                ));
            }
        }
        CheckOutcome::Pass("all schemas intact".to_string())
    }
}

/// No two canonical rows share a news_id or a link.
pub struct NoDuplicateIds;

impl Check for NoDuplicateIds {
    fn name(&self) -> &'static str {
        "no duplicate ids"
    }

    fn run(&self, snapshot: &Snapshot) -> CheckOutcome {
        let mut ids = HashSet::new();
        let mut links = HashSet::new();
        let mut duplicates = Vec::new();
        for row in &snapshot.canonical {
            if !ids.insert(row.news_id.as_str()) || !links.insert(row.link.as_str()) {
                duplicates.push(row.news_id.clone());
            }
        }
        if duplicates.is_empty() {
            CheckOutcome::Pass(format!("{} canonical rows, all unique", snapshot.canonical.len()))
        } else {
            CheckOutcome::Fail(format!(
                "{} duplicated rows in canonical archive: {}",
                duplicates.len(),
                sample(&duplicates)
            ))
        }
    }
}

/// Every cluster in the meta file has exactly one canonical member.
pub struct CanonicalPerCluster;

impl Check for CanonicalPerCluster {
    fn name(&self) -> &'static str {
        "one canonical per cluster"
    }

    fn run(&self, snapshot: &Snapshot) -> CheckOutcome {
        let clusters = clusters(&snapshot.meta);
        let bad: Vec<String> = clusters
            .iter()
            .filter(|(_, rows)| rows.iter().filter(|r| r.is_global_canonical).count() != 1)
            .map(|(cluster, _)| cluster.to_string())
            .collect();
        if bad.is_empty() {
            CheckOutcome::Pass(format!("{} clusters, one canonical each", clusters.len()))
        } else {
            CheckOutcome::Fail(format!(
                "{} clusters without exactly one canonical: {}",
                bad.len(),
                sample(&bad)
            ))
        }
    }
}

/// `global_replaced_by` is empty exactly for canonical rows and otherwise points
/// at the canonical of the same cluster.
pub struct ReferentialIntegrity;

impl Check for ReferentialIntegrity {
    fn name(&self) -> &'static str {
        "replaced_by integrity"
    }

    fn run(&self, snapshot: &Snapshot) -> CheckOutcome {
        let canonical_cluster: HashMap<&str, &str> = snapshot
            .meta
            .iter()
            .filter(|r| r.is_global_canonical)
            .map(|r| (r.news_id.as_str(), r.cluster_id.as_str()))
            .collect();

        let mut problems = Vec::new();
        for row in &snapshot.meta {
            match (&row.global_replaced_by, row.is_global_canonical) {
                (None, true) => {}
                (Some(_), true) => problems.push(format!("{} is canonical but replaced", row.news_id)),
                (None, false) => problems.push(format!("{} has no replacement", row.news_id)),
                (Some(target), false) => match canonical_cluster.get(target.as_str()) {
                    None => problems.push(format!("{} -> {} dangles", row.news_id, target)),
                    Some(cluster) if *cluster != row.cluster_id => problems.push(format!(
                        "{} -> {} crosses clusters",
                        row.news_id, target
                    )),
                    Some(_) => {}
                },
            }
        }

        if problems.is_empty() {
            CheckOutcome::Pass("every replacement resolves to a canonical row".to_string())
        } else {
            CheckOutcome::Fail(format!("{} broken references: {}", problems.len(), sample(&problems)))
        }
    }
}

/// The canonical archive holds exactly the rows the meta file marks canonical.
pub struct ArchiveMetaAgreement;

impl Check for ArchiveMetaAgreement {
    fn name(&self) -> &'static str {
        "archive/meta agreement"
    }

    fn run(&self, snapshot: &Snapshot) -> CheckOutcome {
        let archive: HashSet<&str> = snapshot.canonical.iter().map(|r| r.news_id.as_str()).collect();
        let meta: HashSet<&str> = snapshot
            .meta
            .iter()
            .filter(|r| r.is_global_canonical)
            .map(|r| r.news_id.as_str())
            .collect();

        let mut only_archive: Vec<&str> = archive.difference(&meta).copied().collect();
        let mut only_meta: Vec<&str> = meta.difference(&archive).copied().collect();
        only_archive.sort_unstable();
        only_meta.sort_unstable();

        if !only_archive.is_empty() {
            return CheckOutcome::Fail(format!(
                "archive rows not canonical in meta: {}",
                sample(&only_archive)
            ));
        }
        if !only_meta.is_empty() {
            return CheckOutcome::Fail(format!(
                "meta canonicals missing from archive: {}",
                sample(&only_meta)
            ));
        }
        CheckOutcome::Pass(format!("{} canonical rows agree", archive.len()))
    }
}

/// Size relations between the archive and meta file, and the duplicate ratio alarm.
pub struct RowCountSanity {
    pub duplicate_ratio_alarm: f64,
}

impl Check for RowCountSanity {
    fn name(&self) -> &'static str {
        "row count sanity"
    }

    fn run(&self, snapshot: &Snapshot) -> CheckOutcome {
        let canonical = snapshot.canonical.len();
        let meta = snapshot.meta.len();
        if canonical == 0 {
            return CheckOutcome::Fail("canonical archive is empty".to_string());
        }
        if meta < canonical {
            return CheckOutcome::Fail(format!(
                "meta has {} rows, fewer than the {} canonical rows",
                meta, canonical
            ));
        }

        let duplicates = snapshot.meta.iter().filter(|r| !r.is_global_canonical).count();
        let ratio = duplicates as f64 / meta as f64;
        if ratio > self.duplicate_ratio_alarm {
            CheckOutcome::Warn(format!(
                "duplicate ratio {:.3} exceeds {:.3}",
                ratio, self.duplicate_ratio_alarm
            ))
        } else {
            CheckOutcome::Pass(format!(
                "{} canonical of {} rows (duplicate ratio {:.3})",
                canonical, meta, ratio
            ))
        }
    }
}

/// Re-runs the canonical policy on each cluster and compares with the recorded choice.
///
/// Identity duplicates are left out: they never took part in the selection.
pub struct CanonicalPolicyApplied {
    pub policy: CanonicalPolicy,
}

impl Check for CanonicalPolicyApplied {
    fn name(&self) -> &'static str {
        "canonical policy applied"
    }

    fn run(&self, snapshot: &Snapshot) -> CheckOutcome {
        let mut mismatches = Vec::new();
        let mut checked = 0;
        for (cluster, rows) in clusters(&snapshot.meta) {
            let candidates: Vec<&MetaRow> = rows
                .into_iter()
                .filter(|r| r.removed_by.as_deref() != Some(REMOVED_BY_IDENTITY))
                .collect();
            let Some(actual) = candidates.iter().find(|r| r.is_global_canonical) else {
                continue;
            };
            let Some(expected) = self.policy.select(&candidates) else {
                continue;
            };
            checked += 1;
            if expected.news_id != actual.news_id {
                mismatches.push(format!(
                    "{}: expected {}, found {}",
                    cluster, expected.news_id, actual.news_id
                ));
            }
        }

        if mismatches.is_empty() {
            CheckOutcome::Pass(format!("policy reproduced for {} clusters", checked))
        } else {
            CheckOutcome::Fail(format!(
                "{} clusters disagree with the policy: {}",
                mismatches.len(),
                sample(&mismatches)
            ))
        }
    }
}

/// The full suite in execution order.
pub fn default_checks(config: &DedupConfig) -> Vec<Box<dyn Check>> {
    vec![
        Box::new(RequiredColumns),
        Box::new(NoDuplicateIds),
        Box::new(CanonicalPerCluster),
        Box::new(ReferentialIntegrity),
        Box::new(ArchiveMetaAgreement),
        Box::new(CanonicalPolicyApplied {
            policy: CanonicalPolicy::new(config.wire_domains.clone()),
        }),
        Box::new(RowCountSanity {
            duplicate_ratio_alarm: config.duplicate_ratio_alarm,
        }),
    ]
}
