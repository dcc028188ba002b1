//! Per-run step records, the cumulative execution log and the printed summary.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::identity::format_timestamp;
use crate::store::table::{append_rows, read_rows, Table};

/// Timing and counts of one pipeline step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step_number: usize,
    pub step_name: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub elapsed_seconds: Option<f64>,
    pub status: String,
    pub metrics: BTreeMap<String, Value>,
}

/// Structured record of one run, saved as JSON.
#[derive(Debug, Serialize)]
pub struct RunLog {
    pub run_started_at: String,
    pub steps: Vec<StepRecord>,
    #[serde(skip)]
    open_step: Option<(usize, Instant)>,
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            run_started_at: format_timestamp(&Utc::now()),
            steps: Vec::new(),
            open_step: None,
        }
    }

    /// Opens a new step; any step still open is closed as "interrupted".
    pub fn start_step(&mut self, name: &str) {
        if self.open_step.is_some() {
            self.end_step("interrupted");
        }
        let number = self.steps.len() + 1;
        self.steps.push(StepRecord {
            step_number: number,
            step_name: name.to_string(),
            started_at: format_timestamp(&Utc::now()),
            ended_at: None,
            elapsed_seconds: None,
            status: "running".to_string(),
            metrics: BTreeMap::new(),
        });
        self.open_step = Some((self.steps.len() - 1, Instant::now()));
    }

    pub fn add_metric(&mut self, key: &str, value: impl Into<Value>) {
        if let Some((index, _)) = self.open_step {
            self.steps[index].metrics.insert(key.to_string(), value.into());
        }
    }

    pub fn end_step(&mut self, status: &str) {
        if let Some((index, started)) = self.open_step.take() {
            let step = &mut self.steps[index];
            step.ended_at = Some(format_timestamp(&Utc::now()));
            step.elapsed_seconds = Some((started.elapsed().as_secs_f64() * 1000.0).round() / 1000.0);
            step.status = status.to_string();
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Outcome of one keyword run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineStats {
    pub keyword: String,
    pub fetched: usize,
    pub new_raw: usize,
    pub final_added: usize,
    pub status: String,
    /// Removed article counts keyed by stage and reason
    pub removed_by: BTreeMap<String, usize>,
}

impl PipelineStats {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Row of the cumulative execution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogRow {
    pub execute_at: String,
    pub keyword: String,
    pub new_raw: usize,
    pub final_added: usize,
    pub status: String,
    /// Share of new raw articles that ended up in the selected archive
    pub e_ratio: f64,
    pub tot_new_raw: usize,
    pub tot_final_added: usize,
}

impl Table for ExecutionLogRow {
    const COLUMNS: &'static [&'static str] = &[
        "execute_at",
        "keyword",
        "new_raw",
        "final_added",
        "status",
        "e_ratio",
        "tot_new_raw",
        "tot_final_added",
    ];
}

/// Append-only CSV with one row per keyword run and running totals.
#[derive(Debug, Clone)]
pub struct ExecutionLog {
    path: PathBuf,
}

impl ExecutionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, execute_at: &DateTime<Utc>, stats: &[PipelineStats]) -> Result<Vec<ExecutionLogRow>> {
        let previous: Vec<ExecutionLogRow> = read_rows(&self.path)?;
        let (mut tot_new_raw, mut tot_final_added) = previous
            .last()
            .map(|row| (row.tot_new_raw, row.tot_final_added))
            .unwrap_or((0, 0));

        let execute_at = format_timestamp(execute_at);
        let rows: Vec<ExecutionLogRow> = stats
            .iter()
            .map(|s| {
                tot_new_raw += s.new_raw;
                tot_final_added += s.final_added;
                ExecutionLogRow {
                    execute_at: execute_at.clone(),
                    keyword: s.keyword.clone(),
                    new_raw: s.new_raw,
                    final_added: s.final_added,
                    status: s.status.clone(),
                    e_ratio: ratio(s.final_added, s.new_raw),
                    tot_new_raw,
                    tot_final_added,
                }
            })
            .collect();

        append_rows(&self.path, &rows)
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;
        Ok(rows)
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        ((part as f64 / whole as f64) * 10_000.0).round() / 10_000.0
    }
}

/// Human-readable end-of-run report.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub stats: Vec<PipelineStats>,
}

impl RunSummary {
    pub fn new(stats: Vec<PipelineStats>) -> Self {
        Self { stats }
    }

    pub fn success_count(&self) -> usize {
        self.stats.iter().filter(|s| s.is_success()).count()
    }

    /// Removed counts summed over all keywords.
    pub fn removed_totals(&self) -> BTreeMap<String, usize> {
        let mut totals = BTreeMap::new();
        for stats in &self.stats {
            for (reason, count) in &stats.removed_by {
                *totals.entry(reason.clone()).or_insert(0) += count;
            }
        }
        totals
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} keywords, {} succeeded",
            self.stats.len(),
            self.success_count()
        )?;
        for s in &self.stats {
            writeln!(
                f,
                "  {:<16} fetched {:>5}  new {:>5}  added {:>5}  {}",
                s.keyword, s.fetched, s.new_raw, s.final_added, s.status
            )?;
        }
        let totals = self.removed_totals();
        if !totals.is_empty() {
            writeln!(f, "removed by:")?;
            for (reason, count) in totals {
                writeln!(f, "  {:<32} {:>5}", reason, count)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stats(keyword: &str, new_raw: usize, final_added: usize) -> PipelineStats {
        PipelineStats {
            keyword: keyword.to_string(),
            fetched: new_raw,
            new_raw,
            final_added,
            status: "success".to_string(),
            removed_by: BTreeMap::from([("fingerprint".to_string(), 1)]),
        }
    }

    #[test]
    fn test_execution_log_carries_running_totals() {
        let dir = tempfile::tempdir().unwrap();
        let log = ExecutionLog::new(dir.path().join("execution_log.csv"));
        let at = Utc.with_ymd_and_hms(2026, 1, 28, 12, 0, 0).unwrap();

        log.record(&at, &[stats("국회", 10, 4), stats("예산", 5, 5)]).unwrap();
        let second = log.record(&at, &[stats("국회", 2, 1)]).unwrap();

        assert_eq!(second[0].tot_new_raw, 17);
        assert_eq!(second[0].tot_final_added, 10);
        assert_eq!(second[0].e_ratio, 0.5);

        let all: Vec<ExecutionLogRow> = read_rows(log.path()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].execute_at, "2026-01-28 12:00:00");
    }

    #[test]
    fn test_run_log_records_steps() {
        let dir = tempfile::tempdir().unwrap();
        let mut run = RunLog::new();
        run.start_step("fetch");
        run.add_metric("items", 12);
        run.start_step("dedup");
        run.end_step("success");
        run.save(&dir.path().join("run.json")).unwrap();

        assert_eq!(run.steps.len(), 2);
        assert_eq!(run.steps[0].status, "interrupted");
        assert_eq!(run.steps[0].metrics["items"], Value::from(12));
        assert_eq!(run.steps[1].step_number, 2);
        assert!(run.steps[1].elapsed_seconds.is_some());
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary::new(vec![stats("국회", 10, 4), stats("예산", 5, 5)]);
        let text = summary.to_string();
        assert!(text.starts_with("2 keywords, 2 succeeded"));
        assert!(text.contains("fingerprint"));
        assert_eq!(summary.removed_totals()["fingerprint"], 2);
    }
}
