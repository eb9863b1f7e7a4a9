//! # Quiver Core
//!
//! Core library for Quiver, an embeddable vector index with pluggable backends.
//!
//! Items are fixed-dimension vectors keyed by a string id and carrying
//! arbitrary JSON metadata. Search is exact: every stored vector is scored and
//! the best `k` are kept in a bounded heap.
//!
//! ## Crate Features
//!
//! - `async` - Enables [`AsyncStore`] for tokio-compatible async operations
//!
//! ## Core Types
//!
//! ### Backends
//!
//! Every backend implements [`VectorBackend`]:
//!
//! - [`BruteForceIndex`] - In-memory flat buffer with swap-delete compaction
//! - [`PersistentIndex`] - The in-memory index written through to a [`DurableStore`]
//! - [`HybridIndex`] - Adapter over a third-party [`HybridEngine`]
//!
//! ### Facade
//!
//! - [`Store`] - Validates [`StoreOptions`], selects a backend, serializes access
//! - [`BackendRegistry`] - Named backend factories
//!
//! ### Persistence
//!
//! - [`FileStore`] - Directory-per-collection store with WAL and snapshots
//!
//! ### Filtering
//!
//! - [`Filter`] - Declarative filter expressions for metadata conditions
//! - [`BitmapIndex`] - Roaring bitmap index used for filter pushdown
//!
//! ### Types
//!
//! - [`VectorItem`] - An id, raw vector input and metadata
//! - [`Metric`] - `cosine`, `ip` or `l2`; higher scores are always better
//! - [`CompoundId`] - Structured, versioned identifiers

pub mod backend;
pub mod distance;
pub mod error;
pub mod filter;
pub mod hybrid;
pub mod id_codec;
pub mod index;
pub mod persistent;
pub mod storage;
pub mod store;
pub mod vector;

// Re-exports for convenient access
pub use backend::{BackendKind, IndexConfig, IndexStats, ItemView, SearchHit, VectorBackend};
pub use distance::{normalize_metric, Metric};
pub use error::{Error, Result};
pub use filter::{BitmapIndex, Filter, FilterCondition, GetOptions, SearchFilter, SearchOptions};
pub use hybrid::{
    EngineDocument, EngineFactory, EngineHit, EngineQuery, EngineSchema, FlatEngine,
    FlatEngineFactory, HybridEngine, HybridIndex,
};
pub use id_codec::CompoundId;
pub use index::BruteForceIndex;
pub use persistent::PersistentIndex;
pub use storage::{CollectionMeta, DurableStore, FileStore, FileStoreOptions, SyncMode};
#[cfg(feature = "async")]
pub use store::AsyncStore;
pub use store::{BackendFactory, BackendRegistry, BackendSelector, Store, StoreOptions};
pub use vector::{
    coerce_vector, prepare_vector, to_canonical_id, Metadata, VectorInput, VectorItem,
    VectorRecord,
};

/// Re-export commonly used types for convenience.
///
/// # Example
///
/// ```rust
/// use quiver_core::prelude::*;
///
/// let mut index = BruteForceIndex::new(Metric::L2, 3);
/// index.upsert(vec![VectorItem::new("a", vec![1.0, 2.0, 3.0])]).unwrap();
/// assert_eq!(index.count(), 1);
/// ```
pub mod prelude {
    pub use crate::{
        BruteForceIndex, CompoundId, Error, Filter, GetOptions, IndexConfig, Metric, Result,
        SearchOptions, Store, StoreOptions, VectorBackend, VectorItem,
    };
}
