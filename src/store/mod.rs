//! File-backed persistence for keyword and global archives.
//!
//! Archives are replaced whole through a staged temporary file and a rename;
//! audit logs (duplicate history, run logs) are only ever appended to.

pub mod archive;
pub mod global;
pub mod history;
pub mod keyword;
pub mod table;

pub use archive::{sort_newest_first, Archive, ArchiveRecord};
pub use global::GlobalStore;
pub use history::DuplicateHistoryRecord;
pub use keyword::KeywordStore;
pub use table::{append_rows, read_headers, read_rows, stage_rows, write_rows_atomic, ArchiveLock, Table};
