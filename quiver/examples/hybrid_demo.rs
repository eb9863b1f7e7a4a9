//! Hybrid backend demo.
//!
//! Plugs a custom engine into the store through the backend registry. The
//! engine here only wraps the bundled flat engine and counts calls, but any
//! vector engine with attribute filtering fits behind the same trait.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quiver::prelude::*;
use quiver::{
    json, BackendRegistry, EngineDocument, EngineFactory, EngineHit, EngineQuery, EngineSchema,
    FlatEngine, HybridEngine,
};
use tracing_subscriber::EnvFilter;

struct CountingEngine {
    inner: FlatEngine,
    searches: Arc<AtomicUsize>,
}

impl HybridEngine for CountingEngine {
    fn insert(&mut self, doc: EngineDocument) -> Result<String> {
        self.inner.insert(doc)
    }

    fn remove(&mut self, doc_id: &str) -> Result<bool> {
        self.inner.remove(doc_id)
    }

    fn search(&self, query: &EngineQuery<'_>) -> Result<Vec<EngineHit>> {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.inner.search(query)
    }

    fn count(&self) -> usize {
        self.inner.count()
    }
}

struct CountingFactory {
    searches: Arc<AtomicUsize>,
}

impl EngineFactory for CountingFactory {
    fn name(&self) -> &str {
        "counting"
    }

    fn create(&self, schema: &EngineSchema) -> Result<Box<dyn HybridEngine>> {
        println!(
            "   🔧 Engine created: {} dims on field '{}', id field '{}'",
            schema.dimension, schema.vector_field, schema.id_field
        );
        Ok(Box::new(CountingEngine {
            inner: FlatEngine::new(schema.clone()),
            searches: Arc::clone(&self.searches),
        }))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("🌟 Quiver Hybrid Backend Demo\n");

    let searches = Arc::new(AtomicUsize::new(0));
    let mut registry = BackendRegistry::default();
    registry.register_engine(
        "counting",
        Arc::new(CountingFactory {
            searches: Arc::clone(&searches),
        }),
    );
    println!("📋 Registered backends: {:?}\n", registry.names());

    let store = Store::open_with_registry(
        StoreOptions::new(4).with_metric("ip").with_backend("counting"),
        &registry,
    )?;

    let products = [
        ("p-1", "laptop", 1299, [0.9f32, 0.1, 0.3, 0.0]),
        ("p-2", "laptop", 899, [0.8, 0.2, 0.4, 0.1]),
        ("p-3", "phone", 699, [0.2, 0.9, 0.1, 0.3]),
        ("p-4", "tablet", 499, [0.5, 0.6, 0.2, 0.2]),
        ("p-5", "phone", 999, [0.3, 0.8, 0.2, 0.4]),
    ];
    let items = products
        .iter()
        .map(|(id, category, price, embedding)| {
            VectorItem::new(*id, embedding.to_vec())
                .with_metadata(json!({ "category": category, "price": price }))
        })
        .collect();
    store.upsert(items)?;
    println!("📥 Inserted {} products\n", store.count());

    let query = vec![0.85f32, 0.2, 0.3, 0.1];

    println!("🔍 Attribute filter pushed into the engine (price < 1000)...");
    let options = SearchOptions::new().with_filter(Filter::field("price").lt(1000));
    for hit in store.search(query.clone(), 3, &options)? {
        println!("   {} {} (score: {:.4})", hit.id, hit.metadata, hit.score);
    }
    println!("   Engine searches so far: {}\n", searches.load(Ordering::Relaxed));

    println!("🔍 Predicate evaluated by the adapter (id ends in an odd digit)...");
    let options = SearchOptions::new().with_predicate(|id, _| {
        id.chars()
            .last()
            .and_then(|c| c.to_digit(10))
            .is_some_and(|d| d % 2 == 1)
    });
    for hit in store.search(query, 3, &options)? {
        println!("   {} {} (score: {:.4})", hit.id, hit.metadata, hit.score);
    }
    println!(
        "   Engine searches so far: {} (predicate scans bypass the engine)\n",
        searches.load(Ordering::Relaxed)
    );

    println!("📈 Stats: {:?}", store.stats());
    store.close()?;
    Ok(())
}
