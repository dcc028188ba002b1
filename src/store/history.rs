use serde::{Deserialize, Serialize};

use crate::store::table::Table;

/// One excluded article in the append-only duplicate removal history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateHistoryRecord {
    pub source_keyword: String,
    pub news_id: String,
    pub link: String,
    pub global_replaced_by: String,
    pub execute_at: String,
}

impl Table for DuplicateHistoryRecord {
    const COLUMNS: &'static [&'static str] = &[
        "source_keyword",
        "news_id",
        "link",
        "global_replaced_by",
        "execute_at",
    ];
}
