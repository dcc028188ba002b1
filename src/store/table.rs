//! Typed CSV tables: whole-file reads, staged atomic replacement and append-only logs.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::TARGET_STORE;

/// A CSV record type with a fixed column order.
///
/// `COLUMNS` must list the serialized field names in declaration order; it is
/// used for the header of empty files and by the column checks.
pub trait Table: Serialize {
    const COLUMNS: &'static [&'static str];
}

/// Reads every row of a table; a missing file is an empty table.
pub fn read_rows<T: Table + DeserializeOwned>(path: &Path) -> StoreResult<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path).map_err(|e| StoreError::csv(path, e))?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(|e| StoreError::csv(path, e))
}

/// Header row of a table, `None` when the file does not exist.
pub fn read_headers(path: &Path) -> StoreResult<Option<Vec<String>>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader = csv::Reader::from_path(path).map_err(|e| StoreError::csv(path, e))?;
    let headers = reader.headers().map_err(|e| StoreError::csv(path, e))?;
    Ok(Some(headers.iter().map(str::to_string).collect()))
}

/// Serialized rows sitting in a temporary file beside their destination.
///
/// Nothing is visible at the destination until [`StagedTable::commit`];
/// dropping an uncommitted stage deletes the temporary file.
#[derive(Debug)]
pub struct StagedTable {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedTable {
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Atomically renames the staged file onto its destination.
    pub fn commit(self) -> StoreResult<()> {
        let target = self.target;
        self.file
            .persist(&target)
            .map_err(|e| StoreError::Persist {
                path: target.clone(),
                source: e.error,
            })?;
        debug!(target: TARGET_STORE, "Replaced {}", target.display());
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> StoreResult<PathBuf> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
    Ok(dir)
}

/// Writes `rows` to a temporary file in the destination directory and syncs it.
pub fn stage_rows<T: Table>(path: &Path, rows: &[T]) -> StoreResult<StagedTable> {
    let dir = ensure_parent(path)?;
    let mut file = NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;

    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file.as_file_mut());
        writer
            .write_record(T::COLUMNS)
            .map_err(|e| StoreError::csv(path, e))?;
        for row in rows {
            writer.serialize(row).map_err(|e| StoreError::csv(path, e))?;
        }
        writer
            .flush()
            .map_err(|e| StoreError::io(path, e))?;
    }

    file.as_file()
        .sync_all()
        .map_err(|e| StoreError::io(file.path(), e))?;

    Ok(StagedTable {
        file,
        target: path.to_path_buf(),
    })
}

/// Replaces a table with `rows`; readers see either the old or the new file.
pub fn write_rows_atomic<T: Table>(path: &Path, rows: &[T]) -> StoreResult<()> {
    stage_rows(path, rows)?.commit()
}

/// Appends rows to an audit table, writing the header only for a new file.
pub fn append_rows<T: Table>(path: &Path, rows: &[T]) -> StoreResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    ensure_parent(path)?;
    let is_new = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);

    let file: File = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(io::BufWriter::new(file));

    if is_new {
        writer
            .write_record(T::COLUMNS)
            .map_err(|e| StoreError::csv(path, e))?;
    }
    for row in rows {
        writer.serialize(row).map_err(|e| StoreError::csv(path, e))?;
    }
    writer.flush().map_err(|e| StoreError::io(path, e))?;
    debug!(target: TARGET_STORE, "Appended {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Writes a run log as `<dir>/<stamp>.csv`; nothing is written for an empty run.
pub fn write_log<T: Table>(dir: &Path, stamp: &str, rows: &[T]) -> StoreResult<Option<PathBuf>> {
    if rows.is_empty() {
        return Ok(None);
    }
    let path = dir.join(format!("{}.csv", stamp));
    write_rows_atomic(&path, rows)?;
    Ok(Some(path))
}

/// Single-writer guard: `<path>.lock` exists for as long as the guard lives.
#[derive(Debug)]
pub struct ArchiveLock {
    lock_path: PathBuf,
}

impl ArchiveLock {
    pub fn acquire(path: &Path) -> StoreResult<Self> {
        ensure_parent(path)?;
        let mut lock_name = path.as_os_str().to_os_string();
        lock_name.push(".lock");
        let lock_path = PathBuf::from(lock_name);

        match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", std::process::id()).and_then(|_| file.sync_all()) {
                    let _ = fs::remove_file(&lock_path);
                    return Err(StoreError::io(&lock_path, e));
                }
                debug!(target: TARGET_STORE, "Acquired {}", lock_path.display());
                Ok(ArchiveLock { lock_path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                // A stale lock from a killed run must be removed by hand once its pid is gone
                let owner = fs::read_to_string(&lock_path)
                    .ok()
                    .map(|pid| pid.trim().to_string())
                    .filter(|pid| !pid.is_empty())
                    .unwrap_or_else(|| "unknown".to_string());
                Err(StoreError::Locked {
                    path: path.to_path_buf(),
                    owner,
                })
            }
            Err(e) => Err(StoreError::io(&lock_path, e)),
        }
    }
}

impl Drop for ArchiveLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            tracing::warn!(
                target: TARGET_STORE,
                "Failed to remove lock {}: {}",
                self.lock_path.display(),
                e
            );
        }
    }
}
