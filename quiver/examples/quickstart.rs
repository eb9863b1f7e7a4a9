//! Quick start example for Quiver.
//!
//! Builds an in-memory store, inserts a few documents and runs plain,
//! filtered and predicate searches.

use quiver::prelude::*;
use quiver::{json, CompoundId};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("🌟 Quiver Quick Start Example\n");

    // Small dimension for demonstration; real embeddings are 384-1536 dim
    let store = Store::open(StoreOptions::new(8).with_name("articles"))?;

    let documents = [
        ("Introduction to Rust programming", "rust", [0.9f32, 0.8, 0.1, 0.0, 0.1, 0.0, 0.2, 0.1]),
        ("Advanced Rust patterns", "rust", [0.85, 0.9, 0.15, 0.05, 0.1, 0.0, 0.25, 0.15]),
        ("Python for data science", "python", [0.1, 0.2, 0.9, 0.85, 0.0, 0.1, 0.0, 0.2]),
        ("Machine learning fundamentals", "ml", [0.2, 0.1, 0.7, 0.8, 0.6, 0.7, 0.1, 0.3]),
        ("Systems programming with Rust", "rust", [0.8, 0.7, 0.2, 0.1, 0.15, 0.05, 0.3, 0.2]),
    ];

    println!("📥 Inserting {} documents...", documents.len());
    let mut items = Vec::new();
    for (i, (title, topic, embedding)) in documents.iter().enumerate() {
        let id = CompoundId::new(format!("article-{}", i + 1))
            .with_kind("article")
            .with_field("title")
            .encode()?;
        items.push(
            VectorItem::new(id, embedding.to_vec())
                .with_metadata(json!({ "title": title, "topic": topic })),
        );
    }
    store.upsert(items)?;
    println!("✅ Store contains {} vectors\n", store.count());

    let query = vec![0.88f32, 0.85, 0.12, 0.03, 0.12, 0.02, 0.22, 0.12];

    println!("🔍 Searching for documents similar to 'Rust programming'...\n");
    let results = store.search(query.clone(), 3, &SearchOptions::new())?;
    print_hits(&results);

    println!("🔍 Searching with filter (topic = 'python' or 'ml')...\n");
    let filter = Filter::field("topic").contained_in(vec!["python", "ml"]);
    let results = store.search(query.clone(), 10, &SearchOptions::new().with_filter(filter))?;
    print_hits(&results);

    println!("🔍 Searching with a predicate (title mentions 'Advanced')...\n");
    let options = SearchOptions::new().with_predicate(|_, metadata| {
        metadata["title"]
            .as_str()
            .is_some_and(|t| t.contains("Advanced"))
    });
    let results = store.search(query, 10, &options)?;
    print_hits(&results);

    println!("📈 Stats: {:?}", store.stats());
    store.close()?;
    Ok(())
}

fn print_hits(hits: &[quiver::SearchHit]) {
    println!("{:-<60}", "");
    for (rank, hit) in hits.iter().enumerate() {
        let title = hit.metadata["title"].as_str().unwrap_or("Unknown");
        let entity = CompoundId::decode(&hit.id)
            .and_then(|id| id.entity_id)
            .unwrap_or_else(|| hit.id.clone());
        println!(
            "  {}. [{}] {} (score: {:.4})",
            rank + 1,
            entity,
            title,
            hit.score
        );
    }
    println!("{:-<60}\n", "");
}
