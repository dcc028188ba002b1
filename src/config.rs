//! Runtime configuration for the deduplication engine.
//!
//! Every threshold and list lives in [`DedupConfig`], which is built once at
//! startup and passed by reference into the components that need it.

use anyhow::{ensure, Result};
use std::path::PathBuf;

use crate::dedup::canonical::DEFAULT_WIRE_DOMAINS;
use crate::dedup::cluster::MergeMode;
use crate::dedup::similarity::Weighting;
use crate::environment::{get_env_var_as_vec, get_env_var_or};

/// Title similarity threshold used inside a single keyword batch
pub const DEFAULT_TITLE_THRESHOLD: f64 = 0.15;

/// Body similarity threshold used inside a single keyword batch
pub const DEFAULT_BODY_THRESHOLD: f64 = 0.4;

pub const DEFAULT_GLOBAL_TITLE_THRESHOLD: f64 = 0.3;
pub const DEFAULT_GLOBAL_BODY_THRESHOLD: f64 = 0.5;

/// Maximum Hamming distance between 64-bit title fingerprints treated as identical
pub const DEFAULT_FINGERPRINT_TITLE_DISTANCE: u32 = 3;

/// Maximum Hamming distance between 64-bit body fingerprints treated as identical
pub const DEFAULT_FINGERPRINT_BODY_DISTANCE: u32 = 3;

/// Number of most recent archive rows consulted during an incremental merge
pub const DEFAULT_LOOKBACK: usize = 2000;

/// Share of non-canonical rows in the global meta file that raises a warning
pub const DEFAULT_DUPLICATE_RATIO_ALARM: f64 = 0.9;

pub const DEFAULT_FETCH_COUNT: usize = 1000;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 100;

/// A keyword to collect, and whether its titles must mention it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSpec {
    pub keyword: String,
    pub keyword_required: bool,
}

impl KeywordSpec {
    /// Parses `keyword` or `keyword:required`.
    pub fn parse(entry: &str) -> Self {
        match entry.rsplit_once(':') {
            Some((keyword, flag)) if flag.trim().eq_ignore_ascii_case("required") => KeywordSpec {
                keyword: keyword.trim().to_string(),
                keyword_required: true,
            },
            _ => KeywordSpec {
                keyword: entry.trim().to_string(),
                keyword_required: false,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct DedupConfig {
    pub title_threshold: f64,
    pub body_threshold: f64,
    pub global_title_threshold: f64,
    pub global_body_threshold: f64,
    pub fingerprint_title_distance: u32,
    pub fingerprint_body_distance: u32,
    pub lookback: usize,
    pub merge_mode: MergeMode,
    pub global_merge_mode: MergeMode,
    /// Term weighting of the n-gram vectors compared by both clusterers
    pub weighting: Weighting,
    pub wire_domains: Vec<String>,
    pub duplicate_ratio_alarm: f64,
    pub exclude_words: Vec<String>,
    pub fetch_count: usize,
    pub request_delay_ms: u64,
    pub output_root: PathBuf,
    pub log_dir: PathBuf,
    pub keywords: Vec<KeywordSpec>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            title_threshold: DEFAULT_TITLE_THRESHOLD,
            body_threshold: DEFAULT_BODY_THRESHOLD,
            global_title_threshold: DEFAULT_GLOBAL_TITLE_THRESHOLD,
            global_body_threshold: DEFAULT_GLOBAL_BODY_THRESHOLD,
            fingerprint_title_distance: DEFAULT_FINGERPRINT_TITLE_DISTANCE,
            fingerprint_body_distance: DEFAULT_FINGERPRINT_BODY_DISTANCE,
            lookback: DEFAULT_LOOKBACK,
            merge_mode: MergeMode::Or,
            global_merge_mode: MergeMode::Or,
            weighting: Weighting::TfIdf,
            wire_domains: DEFAULT_WIRE_DOMAINS.iter().map(|d| d.to_string()).collect(),
            duplicate_ratio_alarm: DEFAULT_DUPLICATE_RATIO_ALARM,
            exclude_words: Vec::new(),
            fetch_count: DEFAULT_FETCH_COUNT,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            output_root: PathBuf::from("outputs"),
            log_dir: PathBuf::from("logs"),
            keywords: Vec::new(),
        }
    }
}

impl DedupConfig {
    /// Builds the configuration from `NEWSDEDUP_*` environment variables.
    ///
    /// Unset variables keep their defaults; malformed ones abort startup.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let wire_domains = match get_env_var_as_vec("NEWSDEDUP_WIRE_DOMAINS", ';') {
            domains if domains.is_empty() => defaults.wire_domains,
            domains => domains,
        };

        let config = Self {
            title_threshold: get_env_var_or("NEWSDEDUP_TITLE_THRESHOLD", defaults.title_threshold)?,
            body_threshold: get_env_var_or("NEWSDEDUP_BODY_THRESHOLD", defaults.body_threshold)?,
            global_title_threshold: get_env_var_or(
                "NEWSDEDUP_GLOBAL_TITLE_THRESHOLD",
                defaults.global_title_threshold,
            )?,
            global_body_threshold: get_env_var_or(
                "NEWSDEDUP_GLOBAL_BODY_THRESHOLD",
                defaults.global_body_threshold,
            )?,
            fingerprint_title_distance: get_env_var_or(
                "NEWSDEDUP_FINGERPRINT_TITLE_DISTANCE",
                defaults.fingerprint_title_distance,
            )?,
            fingerprint_body_distance: get_env_var_or(
                "NEWSDEDUP_FINGERPRINT_BODY_DISTANCE",
                defaults.fingerprint_body_distance,
            )?,
            lookback: get_env_var_or("NEWSDEDUP_LOOKBACK", defaults.lookback)?,
            merge_mode: get_env_var_or("NEWSDEDUP_MERGE_MODE", defaults.merge_mode)?,
            global_merge_mode: get_env_var_or(
                "NEWSDEDUP_GLOBAL_MERGE_MODE",
                defaults.global_merge_mode,
            )?,
            weighting: get_env_var_or("NEWSDEDUP_WEIGHTING", defaults.weighting)?,
            wire_domains,
            duplicate_ratio_alarm: get_env_var_or(
                "NEWSDEDUP_DUPLICATE_RATIO_ALARM",
                defaults.duplicate_ratio_alarm,
            )?,
            exclude_words: get_env_var_as_vec("NEWSDEDUP_EXCLUDE_WORDS", ';'),
            fetch_count: get_env_var_or("NEWSDEDUP_FETCH_COUNT", defaults.fetch_count)?,
            request_delay_ms: get_env_var_or(
                "NEWSDEDUP_REQUEST_DELAY_MS",
                defaults.request_delay_ms,
            )?,
            output_root: get_env_var_or("NEWSDEDUP_OUTPUT_ROOT", defaults.output_root)?,
            log_dir: get_env_var_or("NEWSDEDUP_LOG_DIR", defaults.log_dir)?,
            keywords: get_env_var_as_vec("NEWSDEDUP_KEYWORDS", ';')
                .iter()
                .map(|entry| KeywordSpec::parse(entry))
                .collect(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would make the engine meaningless.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("title_threshold", self.title_threshold),
            ("body_threshold", self.body_threshold),
            ("global_title_threshold", self.global_title_threshold),
            ("global_body_threshold", self.global_body_threshold),
            ("duplicate_ratio_alarm", self.duplicate_ratio_alarm),
        ] {
            ensure!(
                (0.0..=1.0).contains(&value),
                "{} must be within 0.0..=1.0, got {}",
                name,
                value
            );
        }
        ensure!(
            self.fingerprint_title_distance <= 64 && self.fingerprint_body_distance <= 64,
            "fingerprint distances are measured on 64-bit hashes and must be <= 64"
        );
        ensure!(self.lookback > 0, "lookback must be at least 1 row");
        Ok(())
    }
}
