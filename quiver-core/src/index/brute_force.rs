//! Brute-force (flat) index for exact nearest neighbor search.
//!
//! Vectors live in one contiguous `f32` buffer, `dimension` floats per slot,
//! with parallel `ids` and `metadata` arrays and an id→slot map. Search scans
//! every occupied slot and keeps the best `k` in a bounded min-heap, so it is
//! O(n · d + n · log k) with 100% recall.
//!
//! Slots stay dense: removal moves the last occupied slot into the hole
//! (swap-delete), which means the relative order of surviving items is not
//! preserved.

use std::collections::HashMap;

use tracing::debug;

use crate::backend::{BackendKind, IndexConfig, IndexStats, ItemView, SearchHit, VectorBackend};
use crate::distance::Metric;
use crate::error::{Error, Result};
use crate::filter::{GetOptions, SearchOptions};
use crate::index::top_k::TopK;
use crate::vector::{prepare_vector, Metadata, VectorInput, VectorItem, VectorRecord};

/// Slots allocated on first growth.
const INITIAL_CAPACITY: usize = 16;

/// Brute-force index over a flat vector buffer.
///
/// # Example
///
/// ```
/// use quiver_core::{BruteForceIndex, Filter, Metric, SearchOptions, VectorBackend, VectorItem};
/// use serde_json::json;
///
/// let mut index = BruteForceIndex::new(Metric::Cosine, 3);
///
/// index.upsert(vec![
///     VectorItem::new("a", vec![1.0, 0.0, 0.0]).with_metadata(json!({ "type": "x" })),
///     VectorItem::new("b", vec![0.0, 1.0, 0.0]).with_metadata(json!({ "type": "y" })),
///     VectorItem::new("c", vec![0.9, 0.1, 0.0]).with_metadata(json!({ "type": "x" })),
/// ]).unwrap();
///
/// let query = vec![1.0f32, 0.0, 0.0].into();
/// let hits = index.search(&query, 2, &SearchOptions::new()).unwrap();
/// assert_eq!(hits[0].id, "a");
/// assert_eq!(hits[1].id, "c");
///
/// let opts = SearchOptions::new().with_filter(Filter::field("type").eq("y"));
/// let hits = index.search(&query, 10, &opts).unwrap();
/// assert_eq!(hits.len(), 1);
/// assert_eq!(hits[0].id, "b");
/// ```
#[derive(Debug)]
pub struct BruteForceIndex {
    config: IndexConfig,
    /// Occupied slots.
    size: usize,
    /// Allocated slots.
    capacity: usize,
    /// `capacity * dimension` floats; only the first `size` slots are live.
    data: Vec<f32>,
    /// Slot → id, length `size`.
    ids: Vec<String>,
    /// Slot → metadata, length `size`.
    metadata: Vec<Metadata>,
    /// Id → slot.
    slots: HashMap<String, usize>,
}

impl BruteForceIndex {
    /// Creates an unnamed index with the metric's default normalization.
    pub fn new(metric: Metric, dimension: usize) -> Self {
        Self::with_config(IndexConfig::new("default", dimension, metric))
    }

    /// Creates an index from a validated configuration.
    pub fn with_config(config: IndexConfig) -> Self {
        Self {
            config,
            size: 0,
            capacity: 0,
            data: Vec::new(),
            ids: Vec::new(),
            metadata: Vec::new(),
            slots: HashMap::new(),
        }
    }

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Returns the dimension of vectors in this index.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }

    /// Returns the metric used by this index.
    #[inline]
    pub fn metric(&self) -> Metric {
        self.config.metric
    }

    /// Returns the number of vectors in the index.
    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns true if the index contains no vectors.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the number of allocated slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if the id is stored.
    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.slots.contains_key(id)
    }

    /// Ids in slot order.
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.ids.iter().map(String::as_str)
    }

    /// Borrowed view of a stored vector.
    pub fn vector(&self, id: &str) -> Option<&[f32]> {
        self.slots.get(id).map(|&slot| self.slot(slot))
    }

    #[inline]
    fn slot(&self, slot: usize) -> &[f32] {
        let d = self.config.dimension;
        &self.data[slot * d..(slot + 1) * d]
    }

    #[inline]
    fn slot_mut(&mut self, slot: usize) -> &mut [f32] {
        let d = self.config.dimension;
        &mut self.data[slot * d..(slot + 1) * d]
    }

    #[inline]
    fn score(&self, query: &[f32], stored: &[f32]) -> f32 {
        if self.config.normalize {
            self.config.metric.score(query, stored)
        } else {
            self.config.metric.score_raw(query, stored)
        }
    }

    /// Coerces and normalizes a batch under this index's configuration.
    ///
    /// Fails on the first bad vector, before anything is mutated.
    pub fn prepare(&self, items: &[VectorItem]) -> Result<Vec<VectorRecord>> {
        items
            .iter()
            .map(|item| item.prepare(self.config.dimension, self.config.normalize))
            .collect()
    }

    /// Grows to at least `needed` slots by doubling.
    fn ensure_capacity(&mut self, needed: usize) {
        if needed <= self.capacity {
            return;
        }

        let mut new_capacity = self.capacity.max(INITIAL_CAPACITY);
        while new_capacity < needed {
            new_capacity *= 2;
        }

        self.data.resize(new_capacity * self.config.dimension, 0.0);
        self.ids.reserve(new_capacity - self.ids.len());
        self.metadata.reserve(new_capacity - self.metadata.len());
        debug!(
            collection = %self.config.name,
            from = self.capacity,
            to = new_capacity,
            "Grew vector buffer"
        );
        self.capacity = new_capacity;
    }

    /// Applies prepared records. Every record is checked before any is applied.
    ///
    /// Returns the number of records processed.
    pub fn apply(&mut self, records: Vec<VectorRecord>) -> Result<usize> {
        if let Some(bad) = records
            .iter()
            .find(|r| r.vector.len() != self.config.dimension)
        {
            return Err(Error::DimensionMismatch {
                expected: self.config.dimension,
                got: bad.vector.len(),
            });
        }

        let new_ids = records
            .iter()
            .filter(|r| !self.slots.contains_key(&r.id))
            .count();
        self.ensure_capacity(self.size + new_ids);

        let processed = records.len();
        for record in records {
            match self.slots.get(&record.id) {
                Some(&slot) => {
                    self.slot_mut(slot).copy_from_slice(&record.vector);
                    self.metadata[slot] = record.metadata;
                }
                None => {
                    // Duplicates inside one batch were counted once above.
                    self.ensure_capacity(self.size + 1);
                    let slot = self.size;
                    self.slot_mut(slot).copy_from_slice(&record.vector);
                    self.ids.push(record.id.clone());
                    self.metadata.push(record.metadata);
                    self.slots.insert(record.id, slot);
                    self.size += 1;
                }
            }
        }

        Ok(processed)
    }

    /// Removes ids with swap-delete. Returns the number removed.
    pub fn remove_ids<S: AsRef<str>>(&mut self, ids: &[S]) -> usize {
        let mut removed = 0;

        for id in ids {
            let Some(slot) = self.slots.remove(id.as_ref()) else {
                continue;
            };

            let last = self.size - 1;
            if slot != last {
                let d = self.config.dimension;
                self.data.copy_within(last * d..(last + 1) * d, slot * d);
            }
            self.ids.swap_remove(slot);
            self.metadata.swap_remove(slot);
            if slot != last {
                self.slots.insert(self.ids[slot].clone(), slot);
            }

            self.size -= 1;
            removed += 1;
        }

        removed
    }

    /// Exact top-k search with a query already in stored form.
    pub fn search_prepared(
        &self,
        query: &[f32],
        k: usize,
        options: &SearchOptions,
    ) -> Vec<SearchHit> {
        if k == 0 || self.size == 0 {
            return Vec::new();
        }

        let mut top = TopK::new(k, self.size);
        for slot in 0..self.size {
            if let Some(filter) = &options.filter {
                if !filter.matches(&self.ids[slot], &self.metadata[slot]) {
                    continue;
                }
            }

            let score = self.score(query, self.slot(slot));
            if options.min_score.is_some_and(|min| score < min) {
                continue;
            }
            top.push(score, slot);
        }

        top.into_sorted_vec()
            .into_iter()
            .map(|c| SearchHit {
                id: self.ids[c.key].clone(),
                score: c.score,
                metadata: self.metadata[c.key].clone(),
                vector: options.include_vectors.then(|| self.slot(c.key).to_vec()),
            })
            .collect()
    }

    /// Drops every item and releases the buffers.
    fn reset(&mut self) {
        self.size = 0;
        self.capacity = 0;
        self.data = Vec::new();
        self.ids = Vec::new();
        self.metadata = Vec::new();
        self.slots = HashMap::new();
    }
}

impl VectorBackend for BruteForceIndex {
    fn upsert(&mut self, items: Vec<VectorItem>) -> Result<usize> {
        let records = self.prepare(&items)?;
        self.apply(records)
    }

    fn remove(&mut self, ids: &[String]) -> Result<usize> {
        Ok(self.remove_ids(ids))
    }

    fn get(&self, ids: &[String], options: GetOptions) -> Result<Vec<ItemView>> {
        Ok(ids
            .iter()
            .filter_map(|id| {
                let &slot = self.slots.get(id)?;
                Some(ItemView {
                    id: id.clone(),
                    metadata: self.metadata[slot].clone(),
                    vector: options.include_vectors.then(|| self.slot(slot).to_vec()),
                })
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
        Ok(self.search_prepared(&query, k, options))
    }

    fn count(&self) -> usize {
        self.size
    }

    fn clear(&mut self) -> Result<()> {
        self.reset();
        Ok(())
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            name: self.config.name.clone(),
            size: self.size,
            dimension: self.config.dimension,
            metric: self.config.metric,
            normalize: self.config.normalize,
            backend: BackendKind::Memory,
        }
    }

    fn close(&mut self) -> Result<()> {
        self.reset();
        Ok(())
    }
}
