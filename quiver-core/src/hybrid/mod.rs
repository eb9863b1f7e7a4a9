//! Adapter exposing a third-party hybrid (vector + attribute) engine through
//! the [`VectorBackend`] contract.
//!
//! Engines are plugins: an [`EngineFactory`] builds a [`HybridEngine`] from an
//! [`EngineSchema`]. Engines issue their own document ids and may not hand
//! stored vectors back, so the adapter keeps side tables mapping external ids
//! to internal ids, metadata and vectors.
//!
//! Structured [`Filter`]s are pushed down into the engine. Arbitrary
//! predicates cannot be, so those searches scan the side tables instead,
//! scoring with the collection's own metric.

pub mod flat_engine;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{BackendKind, IndexConfig, IndexStats, ItemView, SearchHit, VectorBackend};
use crate::distance::Metric;
use crate::error::Result;
use crate::filter::{Filter, GetOptions, PredicateFn, SearchFilter, SearchOptions};
use crate::index::TopK;
use crate::vector::{prepare_vector, Metadata, VectorInput, VectorItem, VectorRecord};

pub use flat_engine::{FlatEngine, FlatEngineFactory};

static NULL_METADATA: Metadata = Metadata::Null;

/// Field names and vector layout an engine is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSchema {
    /// Field carrying the external id.
    pub id_field: String,
    /// Field carrying the vector.
    pub vector_field: String,
    pub dimension: usize,
    pub metric: Metric,
    /// Whether vectors handed to the engine are unit length.
    pub normalized: bool,
}

impl EngineSchema {
    /// Schema for a collection, with fields `id` and `embedding`.
    pub fn for_config(config: &IndexConfig) -> Self {
        Self {
            id_field: "id".to_string(),
            vector_field: "embedding".to_string(),
            dimension: config.dimension,
            metric: config.metric,
            normalized: config.normalize,
        }
    }

    /// Similarity of two vectors under this schema. Higher is better.
    #[inline]
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        if self.normalized {
            self.metric.score(a, b)
        } else {
            self.metric.score_raw(a, b)
        }
    }
}

/// A document handed to an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineDocument {
    /// External id, stored under [`EngineSchema::id_field`].
    pub id: String,
    /// Vector, stored under [`EngineSchema::vector_field`].
    pub vector: Vec<f32>,
    /// Filterable attributes.
    pub attributes: Metadata,
}

/// A native engine query.
#[derive(Debug, Clone, Copy)]
pub struct EngineQuery<'a> {
    pub vector: &'a [f32],
    pub k: usize,
    /// Attribute predicate evaluated inside the engine.
    pub filter: Option<&'a Filter>,
}

/// One engine result, identified by the engine's own id.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineHit {
    pub doc_id: String,
    pub score: f32,
}

/// The operations the adapter needs from a hybrid engine.
pub trait HybridEngine: Send + Sync {
    /// Stores a document and returns the engine-issued id.
    fn insert(&mut self, doc: EngineDocument) -> Result<String>;

    /// Removes a document by engine id. Returns false if it was unknown.
    fn remove(&mut self, doc_id: &str) -> Result<bool>;

    /// Up to `query.k` hits, best first, scored so that higher is better.
    fn search(&self, query: &EngineQuery<'_>) -> Result<Vec<EngineHit>>;

    /// Number of stored documents.
    fn count(&self) -> usize;

    /// Releases engine resources.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Builds engines. Called once on open and again on every `clear`.
pub trait EngineFactory: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    fn create(&self, schema: &EngineSchema) -> Result<Box<dyn HybridEngine>>;
}

/// [`VectorBackend`] over an injected hybrid engine.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use quiver_core::{
///     Filter, FlatEngineFactory, HybridIndex, IndexConfig, Metric, SearchOptions,
///     VectorBackend, VectorItem,
/// };
/// use serde_json::json;
///
/// let config = IndexConfig::new("docs", 2, Metric::Ip);
/// let mut index = HybridIndex::open(config, Arc::new(FlatEngineFactory)).unwrap();
/// index.upsert(vec![
///     VectorItem::new("a", vec![1.0, 0.0]).with_metadata(json!({ "lang": "en" })),
///     VectorItem::new("b", vec![0.9, 0.1]).with_metadata(json!({ "lang": "de" })),
/// ]).unwrap();
///
/// let opts = SearchOptions::new().with_filter(Filter::field("lang").eq("de"));
/// let hits = index.search(&vec![1.0f32, 0.0].into(), 5, &opts).unwrap();
/// assert_eq!(hits.len(), 1);
/// assert_eq!(hits[0].id, "b");
/// ```
pub struct HybridIndex {
    config: IndexConfig,
    schema: EngineSchema,
    factory: Arc<dyn EngineFactory>,
    engine: Box<dyn HybridEngine>,
    /// External id → engine id.
    to_internal: HashMap<String, String>,
    /// Engine id → external id.
    to_external: HashMap<String, String>,
    /// External id → metadata.
    metadata: HashMap<String, Metadata>,
    /// External id → prepared vector.
    vectors: HashMap<String, Vec<f32>>,
}

impl HybridIndex {
    /// Creates the engine and an empty adapter around it.
    pub fn open(config: IndexConfig, factory: Arc<dyn EngineFactory>) -> Result<Self> {
        let schema = EngineSchema::for_config(&config);
        let engine = factory.create(&schema)?;
        debug!(
            collection = %config.name,
            engine = factory.name(),
            "Opened hybrid collection"
        );

        Ok(Self {
            config,
            schema,
            factory,
            engine,
            to_internal: HashMap::new(),
            to_external: HashMap::new(),
            metadata: HashMap::new(),
            vectors: HashMap::new(),
        })
    }

    /// Schema the engine was created with.
    pub fn schema(&self) -> &EngineSchema {
        &self.schema
    }

    /// Drops every side-table entry for an external id.
    fn forget(&mut self, id: &str) {
        if let Some(doc_id) = self.to_internal.remove(id) {
            self.to_external.remove(&doc_id);
        }
        self.metadata.remove(id);
        self.vectors.remove(id);
    }

    /// Replaces or adds one document.
    ///
    /// Engines have no atomic replace, so the old document is removed first.
    /// If the new insert fails, the old document is put back from the side
    /// tables. Only when that also fails is the item dropped.
    fn insert_record(&mut self, record: VectorRecord) -> Result<()> {
        let previous = match self.to_internal.get(&record.id).cloned() {
            Some(old) => {
                self.engine.remove(&old)?;
                Some(old)
            }
            None => None,
        };

        let inserted = self.engine.insert(EngineDocument {
            id: record.id.clone(),
            vector: record.vector.clone(),
            attributes: record.metadata.clone(),
        });
        let doc_id = match inserted {
            Ok(doc_id) => doc_id,
            Err(e) => {
                if let Some(old) = previous {
                    self.restore(&record.id, &old);
                }
                return Err(e);
            }
        };

        if let Some(old) = previous {
            self.to_external.remove(&old);
        }
        self.to_external.insert(doc_id.clone(), record.id.clone());
        self.to_internal.insert(record.id.clone(), doc_id);
        self.metadata.insert(record.id.clone(), record.metadata);
        self.vectors.insert(record.id, record.vector);
        Ok(())
    }

    /// Reinserts the side-table copy of `id` after a failed replace.
    fn restore(&mut self, id: &str, old_doc_id: &str) {
        let doc = EngineDocument {
            id: id.to_string(),
            vector: self.vectors.get(id).cloned().unwrap_or_default(),
            attributes: self.metadata.get(id).cloned().unwrap_or_default(),
        };
        self.to_external.remove(old_doc_id);
        match self.engine.insert(doc) {
            Ok(doc_id) => {
                self.to_external.insert(doc_id.clone(), id.to_string());
                self.to_internal.insert(id.to_string(), doc_id);
            }
            Err(e) => {
                warn!(id, error = %e, "Could not restore document after failed replace");
                self.forget(id);
            }
        }
    }

    fn hit(&self, id: &str, score: f32, include_vectors: bool) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            score,
            metadata: self.metadata.get(id).cloned().unwrap_or_default(),
            vector: if include_vectors {
                self.vectors.get(id).cloned()
            } else {
                None
            },
        }
    }

    /// Native search with an optional pushed-down filter.
    fn search_engine(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&Filter>,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let hits = self.engine.search(&EngineQuery {
            vector: query,
            k,
            filter,
        })?;

        let mut results: Vec<SearchHit> = hits
            .into_iter()
            .filter(|h| options.min_score.map_or(true, |min| h.score >= min))
            .filter_map(|h| {
                let Some(id) = self.to_external.get(&h.doc_id) else {
                    debug!(doc_id = %h.doc_id, "Engine returned unmapped document");
                    return None;
                };
                Some(self.hit(id, h.score, options.include_vectors))
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);
        Ok(results)
    }

    /// Client-side scan for predicates the engine cannot evaluate.
    fn search_scan(
        &self,
        query: &[f32],
        k: usize,
        predicate: &PredicateFn,
        options: &SearchOptions,
    ) -> Vec<SearchHit> {
        let mut top = TopK::new(k, self.vectors.len());

        for (id, vector) in &self.vectors {
            let metadata = self.metadata.get(id).unwrap_or(&NULL_METADATA);
            if !predicate(id.as_str(), metadata) {
                continue;
            }

            let score = self.schema.score(query, vector);
            if options.min_score.is_some_and(|min| score < min) {
                continue;
            }
            top.push(score, id.as_str());
        }

        top.into_sorted_vec()
            .into_iter()
            .map(|c| self.hit(c.key, c.score, options.include_vectors))
            .collect()
    }
}

impl fmt::Debug for HybridIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridIndex")
            .field("config", &self.config)
            .field("engine", &self.factory.name())
            .field("size", &self.to_internal.len())
            .finish_non_exhaustive()
    }
}

impl VectorBackend for HybridIndex {
    fn upsert(&mut self, items: Vec<VectorItem>) -> Result<usize> {
        let records = items
            .iter()
            .map(|item| item.prepare(self.config.dimension, self.config.normalize))
            .collect::<Result<Vec<_>>>()?;

        let processed = records.len();
        for record in records {
            self.insert_record(record)?;
        }
        Ok(processed)
    }

    fn remove(&mut self, ids: &[String]) -> Result<usize> {
        let mut removed = 0;
        for id in ids {
            let Some(doc_id) = self.to_internal.get(id).cloned() else {
                continue;
            };
            self.engine.remove(&doc_id)?;
            self.forget(id);
            removed += 1;
        }
        Ok(removed)
    }

    fn get(&self, ids: &[String], options: GetOptions) -> Result<Vec<ItemView>> {
        Ok(ids
            .iter()
            .filter(|id| self.to_internal.contains_key(*id))
            .map(|id| ItemView {
                id: id.clone(),
                metadata: self.metadata.get(id).cloned().unwrap_or_default(),
                vector: if options.include_vectors {
                    self.vectors.get(id).cloned()
                } else {
                    None
                },
            })
            .collect())
    }

    fn search(
        &self,
        query: &VectorInput,
        k: usize,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>> {
        let query = prepare_vector(query, self.config.dimension, self.config.normalize)?;
        if k == 0 || self.to_internal.is_empty() {
            return Ok(Vec::new());
        }

        match &options.filter {
            None => self.search_engine(&query, k, None, options),
            Some(SearchFilter::Where(filter)) => {
                self.search_engine(&query, k, Some(filter), options)
            }
            Some(SearchFilter::Predicate(predicate)) => {
                Ok(self.search_scan(&query, k, predicate.as_ref(), options))
            }
        }
    }

    fn count(&self) -> usize {
        self.to_internal.len()
    }

    fn clear(&mut self) -> Result<()> {
        self.engine = self.factory.create(&self.schema)?;
        self.to_internal.clear();
        self.to_external.clear();
        self.metadata.clear();
        self.vectors.clear();
        Ok(())
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            name: self.config.name.clone(),
            size: self.to_internal.len(),
            dimension: self.config.dimension,
            metric: self.config.metric,
            normalize: self.config.normalize,
            backend: BackendKind::Hybrid,
        }
    }

    fn close(&mut self) -> Result<()> {
        self.engine.close()?;
        self.to_internal.clear();
        self.to_external.clear();
        self.metadata.clear();
        self.vectors.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::index::BruteForceIndex;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn open(metric: Metric, dimension: usize) -> HybridIndex {
        let config = IndexConfig::new("test", dimension, metric);
        HybridIndex::open(config, Arc::new(FlatEngineFactory)).unwrap()
    }

    fn items() -> Vec<VectorItem> {
        vec![
            VectorItem::new("a", vec![1.0, 0.0, 0.0]).with_metadata(json!({ "group": 1 })),
            VectorItem::new("b", vec![0.0, 1.0, 0.0]).with_metadata(json!({ "group": 2 })),
            VectorItem::new("c", vec![0.7, 0.7, 0.0]).with_metadata(json!({ "group": 1 })),
            VectorItem::new("d", vec![0.0, 0.2, 0.9]).with_metadata(json!({ "group": 3 })),
        ]
    }

    #[test]
    fn test_cosine_scenario() {
        let mut index = open(Metric::Cosine, 3);
        index
            .upsert(vec![
                VectorItem::new("a", vec![1.0, 0.0, 0.0]),
                VectorItem::new("b", vec![0.0, 1.0, 0.0]),
            ])
            .unwrap();

        let hits = index
            .search(&vec![0.0f32, 1.0, 0.0].into(), 2, &SearchOptions::new())
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "b");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].id, "a");
        assert!(hits[1].score.abs() < 1e-6);
    }

    #[test]
    fn test_parity_with_memory_backend() {
        for metric in [Metric::Cosine, Metric::Ip, Metric::L2] {
            let mut hybrid = open(metric, 3);
            let mut memory = BruteForceIndex::new(metric, 3);
            hybrid.upsert(items()).unwrap();
            memory.upsert(items()).unwrap();

            let query: VectorInput = vec![0.5f32, 0.4, 0.1].into();
            for opts in [
                SearchOptions::new(),
                SearchOptions::new().with_filter(Filter::field("group").eq(1)),
                SearchOptions::new().with_predicate(|id, _| id != "c"),
            ] {
                let h: Vec<_> = hybrid
                    .search(&query, 3, &opts)
                    .unwrap()
                    .into_iter()
                    .map(|h| h.id)
                    .collect();
                let m: Vec<_> = memory
                    .search(&query, 3, &opts)
                    .unwrap()
                    .into_iter()
                    .map(|h| h.id)
                    .collect();
                assert_eq!(h, m, "metric {} opts {:?}", metric, opts.filter);
            }
        }
    }

    #[test]
    fn test_predicate_fallback_uses_collection_metric() {
        let mut index = open(Metric::L2, 2);
        index
            .upsert(vec![
                VectorItem::new("near", vec![0.1, 0.1]),
                VectorItem::new("far", vec![2.0, 2.0]),
                // Same direction as the query, so cosine would rank it first.
                VectorItem::new("aligned", vec![9.0, 0.0]),
            ])
            .unwrap();

        let opts = SearchOptions::new().with_predicate(|_, _| true);
        let hits = index.search(&vec![1.0f32, 0.0].into(), 3, &opts).unwrap();
        assert_eq!(hits[0].id, "near");
        assert!((hits[0].score + 0.82).abs() < 1e-5);
        assert_eq!(hits[2].id, "aligned");
    }

    #[test]
    fn test_upsert_replaces_engine_document() {
        let mut index = open(Metric::Ip, 3);
        index.upsert(items()).unwrap();
        index
            .upsert(vec![
                VectorItem::new("a", vec![0.0, 0.0, 5.0]).with_metadata(json!({ "group": 9 }))
            ])
            .unwrap();

        assert_eq!(index.count(), 4);
        assert_eq!(index.engine.count(), 4);

        let view = index.get(&ids(&["a"]), GetOptions::with_vectors()).unwrap();
        assert_eq!(view[0].metadata["group"], 9);
        assert_eq!(view[0].vector.as_deref(), Some(&[0.0, 0.0, 5.0][..]));

        let opts = SearchOptions::new().with_filter(Filter::field("group").eq(1));
        let hits = index.search(&vec![0.0f32, 0.0, 1.0].into(), 10, &opts).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c");
    }

    /// Flat engine whose inserts fail while `failing` is set.
    struct FlakyEngine {
        inner: FlatEngine,
        failing: Arc<AtomicBool>,
    }

    impl HybridEngine for FlakyEngine {
        fn insert(&mut self, doc: EngineDocument) -> Result<String> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::Engine("insert refused".into()));
            }
            self.inner.insert(doc)
        }

        fn remove(&mut self, doc_id: &str) -> Result<bool> {
            self.inner.remove(doc_id)
        }

        fn search(&self, query: &EngineQuery<'_>) -> Result<Vec<EngineHit>> {
            self.inner.search(query)
        }

        fn count(&self) -> usize {
            self.inner.count()
        }
    }

    struct FlakyFactory {
        failing: Arc<AtomicBool>,
    }

    impl EngineFactory for FlakyFactory {
        fn name(&self) -> &str {
            "flaky"
        }

        fn create(&self, schema: &EngineSchema) -> Result<Box<dyn HybridEngine>> {
            Ok(Box::new(FlakyEngine {
                inner: FlatEngine::new(schema.clone()),
                failing: Arc::clone(&self.failing),
            }))
        }
    }

    #[test]
    fn test_failed_replace_drops_item_when_restore_fails() {
        let failing = Arc::new(AtomicBool::new(false));
        let factory = FlakyFactory {
            failing: Arc::clone(&failing),
        };
        let config = IndexConfig::new("test", 3, Metric::Ip);
        let mut index = HybridIndex::open(config, Arc::new(factory)).unwrap();
        index.upsert(items()).unwrap();

        failing.store(true, Ordering::SeqCst);
        let result = index.upsert(vec![
            VectorItem::new("a", vec![0.0, 0.0, 5.0]).with_metadata(json!({ "group": 9 }))
        ]);
        assert!(matches!(result, Err(Error::Engine(_))));
        failing.store(false, Ordering::SeqCst);

        // The restore insert was refused as well.
        assert_eq!(index.count(), 3);
        assert!(index.get(&ids(&["a"]), GetOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_failed_replace_restores_previous_document() {
        let failing = Arc::new(AtomicBool::new(false));
        let factory = FlakyFactory {
            failing: Arc::clone(&failing),
        };
        let config = IndexConfig::new("test", 3, Metric::Ip);
        let mut index = HybridIndex::open(config, Arc::new(factory)).unwrap();
        index.upsert(items()).unwrap();

        // Rejected by the engine's own dimension check, not the adapter's.
        let result = index.insert_record(VectorRecord {
            id: "a".into(),
            vector: vec![1.0, 2.0],
            metadata: json!({ "group": 9 }),
        });
        assert!(matches!(result, Err(Error::Engine(_))));

        assert_eq!(index.count(), 4);
        assert_eq!(index.engine.count(), 4);
        let view = index.get(&ids(&["a"]), GetOptions::with_vectors()).unwrap();
        assert_eq!(view[0].metadata["group"], 1);
        assert_eq!(view[0].vector.as_deref(), Some(&[1.0, 0.0, 0.0][..]));

        let hits = index
            .search(&vec![1.0f32, 0.0, 0.0].into(), 1, &SearchOptions::new())
            .unwrap();
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn test_removal_keeps_remaining_items() {
        let mut index = open(Metric::Cosine, 3);
        index.upsert(items()).unwrap();

        assert_eq!(index.remove(&ids(&["a", "zzz"])).unwrap(), 1);
        assert_eq!(index.count(), 3);
        assert_eq!(index.engine.count(), 3);

        let view = index.get(&ids(&["b", "c", "a"]), GetOptions::default()).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view[0].metadata["group"], 2);
        assert_eq!(view[1].metadata["group"], 1);
    }

    #[test]
    fn test_min_score_and_vectors() {
        let mut index = open(Metric::Ip, 3);
        index.upsert(items()).unwrap();

        let opts = SearchOptions::new().with_min_score(0.5).with_vectors();
        let hits = index.search(&vec![1.0f32, 0.0, 0.0].into(), 10, &opts).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[0].vector.as_deref(), Some(&[1.0, 0.0, 0.0][..]));
        assert_eq!(hits[1].id, "c");
    }

    #[test]
    fn test_dimension_mismatch_rejects_batch() {
        let mut index = open(Metric::Cosine, 3);
        let result = index.upsert(vec![
            VectorItem::new("ok", vec![1.0, 0.0, 0.0]),
            VectorItem::new("bad", vec![1.0, 0.0]),
        ]);
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
        assert_eq!(index.count(), 0);
    }

    #[test]
    fn test_clear_recreates_engine() {
        let mut index = open(Metric::Cosine, 3);
        index.upsert(items()).unwrap();
        index.clear().unwrap();

        assert_eq!(index.count(), 0);
        assert_eq!(index.engine.count(), 0);
        assert!(index
            .search(&vec![1.0f32, 0.0, 0.0].into(), 3, &SearchOptions::new())
            .unwrap()
            .is_empty());

        index.upsert(items()).unwrap();
        assert_eq!(index.count(), 4);
    }

    #[test]
    fn test_stats() {
        let mut index = open(Metric::L2, 3);
        index.upsert(items()).unwrap();
        let stats = index.stats();
        assert_eq!(stats.backend, BackendKind::Hybrid);
        assert_eq!(stats.size, 4);
        assert!(!stats.normalize);
    }
}
