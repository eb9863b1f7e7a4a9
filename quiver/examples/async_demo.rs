//! Async API demo using AsyncStore.
//!
//! Run with: cargo run --example async_demo --features async

#[cfg(feature = "async")]
use quiver::prelude::*;
#[cfg(feature = "async")]
use quiver::{json, AsyncStore};

#[cfg(feature = "async")]
#[tokio::main]
async fn main() -> Result<()> {
    use std::sync::Arc;
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("Async Quiver Demo\n");

    let temp_dir = std::env::temp_dir().join("quiver_async_demo");
    let _ = std::fs::remove_dir_all(&temp_dir);

    // Nothing is opened until the first call
    let store = Arc::new(AsyncStore::new(
        StoreOptions::new(128)
            .with_name("signals")
            .with_storage_path(&temp_dir),
    ));
    store.ready().await?;
    println!("Opened async store\n");

    println!("⏳ Inserting 1000 vectors in 10 concurrent batches...");
    let start = std::time::Instant::now();

    let mut handles = vec![];
    for batch in 0..10 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let items = (batch * 100..(batch + 1) * 100)
                .map(|i| {
                    let vector: Vec<f32> = (0..128).map(|j| ((i * 128 + j) as f32).sin()).collect();
                    let category = if i % 2 == 0 { "even" } else { "odd" };
                    VectorItem::new(format!("sig-{}", i), vector)
                        .with_metadata(json!({ "n": i, "category": category }))
                })
                .collect();
            store.upsert(items).await
        }));
    }

    for handle in handles {
        if let Ok(result) = handle.await {
            result?;
        }
    }

    println!("   [OK] Inserted in {:?}", start.elapsed());
    println!("   Total vectors: {}\n", store.count().await?);

    println!("Searching even signals...");
    let query: Vec<f32> = (0..128).map(|i| (i as f32 * 0.1).cos()).collect();
    let options = SearchOptions::new().with_filter(Filter::field("category").eq("even"));
    let results = store.search(query, 5, options).await?;

    println!("   Top 5 results:");
    for (i, r) in results.iter().enumerate() {
        println!("     {}. {} (score: {:.4})", i + 1, r.id, r.score);
    }

    store.close().await?;
    let _ = std::fs::remove_dir_all(&temp_dir);

    println!("\nAsync demo complete!");
    Ok(())
}

#[cfg(not(feature = "async"))]
fn main() {
    println!("Run with: cargo run --example async_demo --features async");
}
