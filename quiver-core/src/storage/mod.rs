//! Durable persistence for collections.
//!
//! This module provides:
//! - [`DurableStore`], the transactional contract the persistent index writes through
//! - [`FileStore`], a directory-per-collection implementation
//! - WAL (write-ahead log) frames for atomic batches
//! - Checksummed snapshot files for compaction

pub mod data_file;
pub mod file_store;
pub mod wal;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::IndexConfig;
use crate::distance::Metric;
use crate::error::{Error, Result};
use crate::vector::VectorRecord;

pub use data_file::DataFile;
pub use file_store::{FileStore, FileStoreOptions};
pub use wal::{SyncMode, Wal, WalEntry};

/// The persisted description of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub dimension: usize,
    pub metric: Metric,
    pub normalize: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CollectionMeta {
    /// Creates metadata for a collection opened for the first time.
    pub fn new(config: &IndexConfig) -> Self {
        let now = Utc::now();
        Self {
            dimension: config.dimension,
            metric: config.metric,
            normalize: config.normalize,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fails with `ConfigMismatch` unless `config` matches the stored triple.
    pub fn check(&self, collection: &str, config: &IndexConfig) -> Result<()> {
        if self.dimension == config.dimension
            && self.metric == config.metric
            && self.normalize == config.normalize
        {
            return Ok(());
        }

        Err(Error::ConfigMismatch {
            collection: collection.to_string(),
            stored: self.to_string(),
            requested: ConfigTriple(config).to_string(),
        })
    }

    /// Refreshes `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl fmt::Display for CollectionMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dimension={} metric={} normalize={}",
            self.dimension, self.metric, self.normalize
        )
    }
}

struct ConfigTriple<'a>(&'a IndexConfig);

impl fmt::Display for ConfigTriple<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dimension={} metric={} normalize={}",
            self.0.dimension, self.0.metric, self.0.normalize
        )
    }
}

/// A transactional store keyed by `(collection, id)`.
///
/// Every mutating call is one atomic batch: it either commits fully or leaves
/// the stored state exactly as it was.
pub trait DurableStore: Send + Sync {
    /// Establishes metadata on first use; afterwards verifies it matches.
    fn ensure_meta(&mut self, collection: &str, config: &IndexConfig) -> Result<CollectionMeta>;

    /// Returns every stored record of the collection.
    fn load_items(&mut self, collection: &str) -> Result<Vec<VectorRecord>>;

    /// Inserts or replaces records.
    fn persist_items(&mut self, collection: &str, records: &[VectorRecord]) -> Result<()>;

    /// Deletes records by id. Unknown ids are ignored.
    fn remove_items(&mut self, collection: &str, ids: &[String]) -> Result<()>;

    /// Deletes every record of the collection. Metadata is kept.
    fn clear_items(&mut self, collection: &str) -> Result<()>;

    /// Rewrites the collection into its most compact form.
    fn compact(&mut self, _collection: &str) -> Result<()> {
        Ok(())
    }

    /// Flushes and releases every open resource.
    fn close(&mut self) -> Result<()>;
}
