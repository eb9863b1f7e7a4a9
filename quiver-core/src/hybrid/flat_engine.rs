//! In-process reference engine for the hybrid adapter.
//!
//! Issues sequential `u32` document ids, scores every candidate exactly, and
//! answers attribute filters from a roaring [`BitmapIndex`] before scoring.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::filter::BitmapIndex;
use crate::hybrid::{
    EngineDocument, EngineFactory, EngineHit, EngineQuery, EngineSchema, HybridEngine,
};
use crate::index::TopK;
use crate::vector::Metadata;

#[derive(Debug)]
struct FlatDoc {
    vector: Vec<f32>,
    attributes: Metadata,
}

/// Exact engine with bitmap filter pushdown.
#[derive(Debug)]
pub struct FlatEngine {
    schema: EngineSchema,
    next_id: u32,
    docs: HashMap<u32, FlatDoc>,
    attributes: BitmapIndex,
}

impl FlatEngine {
    pub fn new(schema: EngineSchema) -> Self {
        Self {
            schema,
            next_id: 0,
            docs: HashMap::new(),
            attributes: BitmapIndex::new(),
        }
    }

    fn parse_id(doc_id: &str) -> Option<u32> {
        doc_id.parse().ok()
    }
}

impl HybridEngine for FlatEngine {
    fn insert(&mut self, doc: EngineDocument) -> Result<String> {
        if doc.vector.len() != self.schema.dimension {
            return Err(Error::Engine(format!(
                "document '{}': field '{}' has {} components, schema expects {}",
                doc.id,
                self.schema.vector_field,
                doc.vector.len(),
                self.schema.dimension
            )));
        }

        let id = self.next_id;
        self.next_id = id
            .checked_add(1)
            .ok_or_else(|| Error::Engine("document id space exhausted".into()))?;

        self.attributes.insert(id, &doc.attributes);
        self.docs.insert(
            id,
            FlatDoc {
                vector: doc.vector,
                attributes: doc.attributes,
            },
        );
        Ok(id.to_string())
    }

    fn remove(&mut self, doc_id: &str) -> Result<bool> {
        let Some(id) = Self::parse_id(doc_id) else {
            return Ok(false);
        };
        let Some(doc) = self.docs.remove(&id) else {
            return Ok(false);
        };
        self.attributes.delete(id, &doc.attributes);
        Ok(true)
    }

    fn search(&self, query: &EngineQuery<'_>) -> Result<Vec<EngineHit>> {
        if query.vector.len() != self.schema.dimension {
            return Err(Error::Engine(format!(
                "query has {} components, schema expects {}",
                query.vector.len(),
                self.schema.dimension
            )));
        }

        let mut top = TopK::new(query.k, self.docs.len());
        match query.filter {
            Some(filter) => {
                for id in self.attributes.query(filter).iter() {
                    if let Some(doc) = self.docs.get(&id) {
                        top.push(self.schema.score(query.vector, &doc.vector), id);
                    }
                }
            }
            None => {
                for (&id, doc) in &self.docs {
                    top.push(self.schema.score(query.vector, &doc.vector), id);
                }
            }
        }

        Ok(top
            .into_sorted_vec()
            .into_iter()
            .map(|c| EngineHit {
                doc_id: c.key.to_string(),
                score: c.score,
            })
            .collect())
    }

    fn count(&self) -> usize {
        self.docs.len()
    }
}

/// Factory for [`FlatEngine`]. Registered under `"hybrid"` by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatEngineFactory;

impl EngineFactory for FlatEngineFactory {
    fn name(&self) -> &str {
        "flat"
    }

    fn create(&self, schema: &EngineSchema) -> Result<Box<dyn HybridEngine>> {
        Ok(Box::new(FlatEngine::new(schema.clone())))
    }
}
