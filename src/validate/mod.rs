//! Read-only consistency checks over the committed global outputs.

pub mod checks;
pub mod runner;

use anyhow::{Context, Result};
use std::fmt;

use crate::aggregate::MetaRow;
use crate::article::GlobalArticle;
use crate::store::global::GlobalStore;
use crate::store::table::{read_headers, read_rows};

pub use checks::default_checks;
pub use runner::{ValidationReport, Validator};

/// Tri-state result of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass(String),
    Warn(String),
    Fail(String),
}

impl CheckOutcome {
    pub fn is_fail(&self) -> bool {
        matches!(self, CheckOutcome::Fail(_))
    }

    pub fn is_warn(&self) -> bool {
        matches!(self, CheckOutcome::Warn(_))
    }

    pub fn message(&self) -> &str {
        match self {
            CheckOutcome::Pass(m) | CheckOutcome::Warn(m) | CheckOutcome::Fail(m) => m,
        }
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::Pass(m) => write!(f, "[OK] {}", m),
            CheckOutcome::Warn(m) => write!(f, "[WARN] {}", m),
            CheckOutcome::Fail(m) => write!(f, "[FAIL] {}", m),
        }
    }
}

/// An independent invariant over a [`Snapshot`].
pub trait Check {
    fn name(&self) -> &'static str;

    fn run(&self, snapshot: &Snapshot) -> CheckOutcome;
}

/// Everything the checks read, loaded once.
///
/// Header rows are `None` when the file does not exist.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub canonical_headers: Option<Vec<String>>,
    pub meta_headers: Option<Vec<String>>,
    pub history_headers: Option<Vec<String>>,
    pub canonical: Vec<GlobalArticle>,
    pub meta: Vec<MetaRow>,
}

impl Snapshot {
    pub fn load(store: &GlobalStore) -> Result<Self> {
        let canonical_headers = read_headers(&store.canonical_path())?;
        let meta_headers = read_headers(&store.meta_path())?;
        let history_headers = read_headers(&store.history_path())?;

        let canonical = read_rows(&store.canonical_path())
            .context("Failed to read the global canonical archive")?;
        let meta = read_rows(&store.meta_path()).context("Failed to read the global meta file")?;

        Ok(Snapshot {
            canonical_headers,
            meta_headers,
            history_headers,
            canonical,
            meta,
        })
    }
}
