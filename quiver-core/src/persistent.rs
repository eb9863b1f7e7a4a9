//! Durable collection: an in-memory index written through to a [`DurableStore`].
//!
//! Mutations are validated, committed to the store, and only then applied to
//! memory, so memory is never ahead of durable state. Queries are answered
//! from memory alone.

use std::path::Path;

use tracing::info;

use crate::backend::{BackendKind, IndexConfig, IndexStats, ItemView, SearchHit, VectorBackend};
use crate::error::Result;
use crate::filter::{GetOptions, SearchOptions};
use crate::index::BruteForceIndex;
use crate::storage::{DurableStore, FileStore, FileStoreOptions};
use crate::vector::{VectorInput, VectorItem};

/// A brute-force index backed by a durable store.
///
/// # Example
///
/// ```no_run
/// use quiver_core::{IndexConfig, Metric, PersistentIndex, VectorBackend, VectorItem};
///
/// let config = IndexConfig::new("docs", 3, Metric::Cosine);
/// let mut index = PersistentIndex::open_path(config, "./my_vectors").unwrap();
/// index.upsert(vec![VectorItem::new("a", vec![1.0, 0.0, 0.0])]).unwrap();
/// index.close().unwrap();
/// ```
pub struct PersistentIndex {
    index: BruteForceIndex,
    store: Box<dyn DurableStore>,
}

impl PersistentIndex {
    /// Opens a collection: checks or records its metadata, then rehydrates
    /// every stored record into memory.
    pub fn open(config: IndexConfig, mut store: Box<dyn DurableStore>) -> Result<Self> {
        let meta = store.ensure_meta(&config.name, &config)?;
        let records = store.load_items(&config.name)?;

        let mut index = BruteForceIndex::with_config(config);
        let loaded = index.apply(records)?;
        info!(
            collection = %index.config().name,
            loaded,
            created_at = %meta.created_at,
            "Rehydrated collection"
        );

        Ok(Self { index, store })
    }

    /// Opens a collection inside a [`FileStore`] rooted at `path`.
    pub fn open_path<P: AsRef<Path>>(config: IndexConfig, path: P) -> Result<Self> {
        Self::open_path_with_options(config, path, FileStoreOptions::default())
    }

    /// Like [`open_path`](Self::open_path) with explicit store options.
    pub fn open_path_with_options<P: AsRef<Path>>(
        config: IndexConfig,
        path: P,
        options: FileStoreOptions,
    ) -> Result<Self> {
        let store = FileStore::open_with_options(path, options)?;
        Self::open(config, Box::new(store))
    }

    /// The in-memory view.
    pub fn index(&self) -> &BruteForceIndex {
        &self.index
    }

    /// Folds the store's log for this collection into a snapshot.
    pub fn compact(&mut self) -> Result<()> {
        self.store.compact(&self.index.config().name)
    }

    fn collection(&self) -> &str {
        &self.index.config().name
    }
}

impl std::fmt::Debug for PersistentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentIndex")
            .field("config", self.index.config())
            .field("size", &self.index.len())
            .finish_non_exhaustive()
    }
}

impl VectorBackend for PersistentIndex {
    fn upsert(&mut self, items: Vec<VectorItem>) -> Result<usize> {
        let records = self.index.prepare(&items)?;
        let name = self.index.config().name.clone();
        self.store.persist_items(&name, &records)?;
        self.index.apply(records)
    }

    fn remove(&mut self, ids: &[String]) -> Result<usize> {
        let present: Vec<String> = ids
            .iter()
            .filter(|id| self.index.contains(id))
            .cloned()
            .collect();
        if present.is_empty() {
            return Ok(0);
        }

        let name = self.collection().to_string();
        self.store.remove_items(&name, &present)?;
        Ok(self.index.remove_ids(&present))
    }

    fn get(&self, ids: &[String], options: GetOptions) -> Result<Vec<ItemView>> {
        self.index.get(ids, options)
    }

    fn search(
        &self,
        query: &VectorInput,
        k: usize,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        self.index.search(query, k, options)
    }

    fn count(&self) -> usize {
        self.index.count()
    }

    fn clear(&mut self) -> Result<()> {
        let name = self.collection().to_string();
        self.store.clear_items(&name)?;
        self.index.clear()
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            backend: BackendKind::Persistent,
            ..self.index.stats()
        }
    }

    fn close(&mut self) -> Result<()> {
        self.store.close()?;
        self.index.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::Metric;
    use crate::error::Error;
    use crate::storage::CollectionMeta;
    use crate::vector::VectorRecord;
    use serde_json::json;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "quiver_test_persistent_{}_{}",
            std::process::id(),
            id
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Accepts metadata and loads, refuses every write.
    struct FailingStore;

    impl DurableStore for FailingStore {
        fn ensure_meta(&mut self, _: &str, config: &IndexConfig) -> Result<CollectionMeta> {
            Ok(CollectionMeta::new(config))
        }

        fn load_items(&mut self, _: &str) -> Result<Vec<VectorRecord>> {
            Ok(vec![VectorRecord {
                id: "seed".into(),
                vector: vec![1.0, 0.0],
                metadata: json!({}),
            }])
        }

        fn persist_items(&mut self, _: &str, _: &[VectorRecord]) -> Result<()> {
            Err(Error::Io(std::io::Error::other("disk full")))
        }

        fn remove_items(&mut self, _: &str, _: &[String]) -> Result<()> {
            Err(Error::Io(std::io::Error::other("disk full")))
        }

        fn clear_items(&mut self, _: &str) -> Result<()> {
            Err(Error::Io(std::io::Error::other("disk full")))
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_durable_round_trip() {
        let dir = temp_dir();
        let config = IndexConfig::new("docs", 3, Metric::Cosine);

        {
            let mut index = PersistentIndex::open_path(config.clone(), &dir).unwrap();
            index
                .upsert(vec![
                    VectorItem::new("x", vec![3.0, 0.0, 4.0]).with_metadata(json!({ "t": 1 })),
                    VectorItem::new("y", vec![0.0, 1.0, 0.0]),
                ])
                .unwrap();
            index.close().unwrap();
        }

        let index = PersistentIndex::open_path(config, &dir).unwrap();
        assert_eq!(index.count(), 2);
        let view = index.get(&ids(&["x"]), GetOptions::with_vectors()).unwrap();
        assert_eq!(view[0].metadata, json!({ "t": 1 }));
        let v = view[0].vector.as_ref().unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[2] - 0.8).abs() < 1e-6);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_non_finite_vector_is_rejected_and_collection_reopens() {
        let dir = temp_dir();
        let config = IndexConfig::new("docs", 2, Metric::Ip);

        {
            let mut index = PersistentIndex::open_path(config.clone(), &dir).unwrap();
            index.upsert(vec![VectorItem::new("ok", vec![1.0, 2.0])]).unwrap();

            let result = index.upsert(vec![
                VectorItem::new("fine", vec![0.5, 0.5]),
                VectorItem::new("inf", vec![f32::INFINITY, 0.0]),
            ]);
            assert!(matches!(result, Err(Error::InvalidVector(_))));
            assert_eq!(index.count(), 1);
            index.close().unwrap();
        }

        let index = PersistentIndex::open_path(config, &dir).unwrap();
        assert_eq!(index.count(), 1);
        assert_eq!(index.index().vector("ok"), Some(&[1.0, 2.0][..]));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_reopen_with_different_config_fails() {
        let dir = temp_dir();
        let config = IndexConfig::new("docs", 3, Metric::Cosine);
        PersistentIndex::open_path(config, &dir)
            .unwrap()
            .close()
            .unwrap();

        let result = PersistentIndex::open_path(IndexConfig::new("docs", 4, Metric::Cosine), &dir);
        assert!(matches!(result, Err(Error::ConfigMismatch { .. })));

        let result = PersistentIndex::open_path(IndexConfig::new("docs", 3, Metric::Ip), &dir);
        assert!(matches!(result, Err(Error::ConfigMismatch { .. })));

        // A different collection name is a separate namespace.
        assert!(PersistentIndex::open_path(IndexConfig::new("other", 4, Metric::Ip), &dir).is_ok());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_remove_and_clear_survive_reopen() {
        let dir = temp_dir();
        let config = IndexConfig::new("docs", 2, Metric::L2);

        {
            let mut index = PersistentIndex::open_path(config.clone(), &dir).unwrap();
            index
                .upsert(vec![
                    VectorItem::new("a", vec![1.0, 0.0]),
                    VectorItem::new("b", vec![0.0, 1.0]),
                    VectorItem::new("c", vec![1.0, 1.0]),
                ])
                .unwrap();
            assert_eq!(index.remove(&ids(&["a", "ghost"])).unwrap(), 1);
            index.compact().unwrap();
            index.close().unwrap();
        }
        {
            let mut index = PersistentIndex::open_path(config.clone(), &dir).unwrap();
            assert_eq!(index.count(), 2);
            assert!(index.get(&ids(&["a"]), GetOptions::default()).unwrap().is_empty());
            index.clear().unwrap();
            assert_eq!(index.count(), 0);
            index.close().unwrap();
        }

        let index = PersistentIndex::open_path(config, &dir).unwrap();
        assert_eq!(index.count(), 0);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let config = IndexConfig::new("docs", 2, Metric::L2);
        let mut index = PersistentIndex::open(config, Box::new(FailingStore)).unwrap();
        assert_eq!(index.count(), 1);

        let result = index.upsert(vec![VectorItem::new("new", vec![0.0, 1.0])]);
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(index.count(), 1);
        assert!(!index.index().contains("new"));

        assert!(index.remove(&ids(&["seed"])).is_err());
        assert!(index.index().contains("seed"));

        assert!(index.clear().is_err());
        assert_eq!(index.count(), 1);
    }

    #[test]
    fn test_validation_precedes_store_write() {
        let dir = temp_dir();
        let config = IndexConfig::new("docs", 2, Metric::L2);

        {
            let mut index = PersistentIndex::open_path(config.clone(), &dir).unwrap();
            let result = index.upsert(vec![
                VectorItem::new("ok", vec![1.0, 1.0]),
                VectorItem::new("bad", vec![1.0]),
            ]);
            assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
            index.close().unwrap();
        }

        let index = PersistentIndex::open_path(config, &dir).unwrap();
        assert_eq!(index.count(), 0);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_stats_reports_persistent() {
        let config = IndexConfig::new("docs", 2, Metric::L2);
        let index = PersistentIndex::open(config, Box::new(FailingStore)).unwrap();
        let stats = index.stats();
        assert_eq!(stats.backend, BackendKind::Persistent);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.name, "docs");
    }
}
