pub mod aggregate;
pub mod article;
pub mod config;
pub mod dedup;
pub mod environment;
pub mod error;
pub mod filter;
pub mod identity;
pub mod logging;
pub mod pipeline;
pub mod source;
pub mod store;
pub mod summary;
pub mod text;
pub mod validate;

pub const TARGET_DEDUP: &str = "dedup";
pub const TARGET_STORE: &str = "store";
pub const TARGET_AGGREGATE: &str = "aggregate";
pub const TARGET_VALIDATE: &str = "validate";
pub const TARGET_PIPELINE: &str = "pipeline";

pub use article::{Article, GlobalArticle};
pub use config::DedupConfig;
