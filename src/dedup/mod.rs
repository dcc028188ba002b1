//! Near-duplicate detection and canonical selection.
//!
//! A keyword batch first goes through the [`FingerprintDeduplicator`], which
//! drops obvious re-publications, then through the [`ArticleClusterer`]:
//! title and body [`SimilarityGrouper`] runs, a [`ClusterMerger`] that joins
//! the two groupings, and a [`CanonicalPolicy`] that picks one representative
//! per cluster.

pub mod batch;
pub mod canonical;
pub mod cluster;
pub mod fingerprint;
pub mod similarity;

pub use batch::{ArticleClusterer, ClusterAssignment, ClusteredBatch, SimilarityLogRow};
pub use canonical::{CanonicalPolicy, Candidate, DEFAULT_WIRE_DOMAINS};
pub use cluster::{ClusterMerger, MergeMode, UnionFind};
pub use fingerprint::{FingerprintDeduplicator, FingerprintLogRow, FingerprintOutcome, SimHash};
pub use similarity::{SimilarityGrouper, Weighting};
