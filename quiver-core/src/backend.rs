//! The contract every backend implements.
//!
//! The in-memory index, the persistent wrapper and the hybrid-engine adapter
//! all expose exactly this surface, so callers can only tell them apart
//! through [`IndexStats::backend`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::distance::{normalize_metric, Metric};
use crate::error::{Error, Result};
use crate::filter::{GetOptions, SearchOptions};
use crate::vector::{Metadata, VectorInput, VectorItem};

/// Which concrete engine is serving a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Persistent,
    Hybrid,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Persistent => "persistent",
            BackendKind::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated configuration of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Collection name.
    pub name: String,
    /// Number of components per vector.
    pub dimension: usize,
    /// Scoring metric.
    pub metric: Metric,
    /// Whether vectors are unit-normalized on insert and query.
    pub normalize: bool,
}

impl IndexConfig {
    /// Creates a config, defaulting `normalize` from the metric.
    pub fn new(name: impl Into<String>, dimension: usize, metric: Metric) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric,
            normalize: metric.normalizes_by_default(),
        }
    }

    /// Validates raw options: dimension must be positive, metric must be known.
    pub fn from_parts(
        name: impl Into<String>,
        dimension: Option<usize>,
        metric: &str,
        normalize: Option<bool>,
    ) -> Result<Self> {
        let dimension = match dimension {
            Some(d) if d > 0 => d,
            _ => return Err(Error::MissingDimension),
        };
        let metric = normalize_metric(metric)?;
        Ok(Self::new(name, dimension, metric)
            .with_normalize(normalize.unwrap_or_else(|| metric.normalizes_by_default())))
    }

    /// Overrides the normalize flag. Chainable.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }
}

/// One item returned by `get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemView {
    pub id: String,
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    /// Similarity score (higher = more similar, for every metric).
    pub score: f32,
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

/// Snapshot of a backend's configuration and size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub name: String,
    pub size: usize,
    pub dimension: usize,
    pub metric: Metric,
    pub normalize: bool,
    pub backend: BackendKind,
}

/// The operations shared by all backends.
///
/// Mutations take `&mut self`; the store facade serializes them. Queries take
/// `&self` and may run concurrently with each other.
pub trait VectorBackend: Send + Sync {
    /// Inserts or replaces items. Returns the number of items processed.
    fn upsert(&mut self, items: Vec<VectorItem>) -> Result<usize>;

    /// Removes items by id. Returns the number actually removed.
    fn remove(&mut self, ids: &[String]) -> Result<usize>;

    /// Looks items up by id. Unknown ids are skipped.
    fn get(&self, ids: &[String], options: GetOptions) -> Result<Vec<ItemView>>;

    /// Returns up to `k` hits ordered by descending score.
    fn search(&self, query: &VectorInput, k: usize, options: &SearchOptions)
        -> Result<Vec<SearchHit>>;

    /// Number of stored items.
    fn count(&self) -> usize;

    /// Removes every item.
    fn clear(&mut self) -> Result<()>;

    /// Configuration and size snapshot.
    fn stats(&self) -> IndexStats;

    /// Releases resources. The backend must not be used afterwards.
    fn close(&mut self) -> Result<()>;
}
