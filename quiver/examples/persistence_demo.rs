//! Persistence demonstration for Quiver.
//!
//! This example shows how to:
//! 1. Create a persistent collection
//! 2. Insert and remove vectors
//! 3. Close and reopen (simulating restart)
//! 4. Recover writes that were never compacted
//! 5. Refuse to reopen with a different configuration

use quiver::prelude::*;
use quiver::{json, SyncMode};
use std::fs;
use tracing_subscriber::EnvFilter;

fn options(path: &str) -> StoreOptions {
    StoreOptions::new(8)
        .with_name("notes")
        .with_storage_path(path)
        .with_sync_mode(SyncMode::Immediate)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let storage_path = "./demo_storage";

    // Clean up any previous run
    let _ = fs::remove_dir_all(storage_path);

    println!("🌟 Quiver Persistence Demo\n");

    println!("📥 Phase 1: Creating collection and inserting vectors...");
    {
        let store = Store::open(options(storage_path))?;

        let docs = [
            ("note-1", "Rust programming basics", [0.9f32, 0.8, 0.1, 0.0, 0.1, 0.0, 0.2, 0.1]),
            ("note-2", "Advanced Rust patterns", [0.85, 0.9, 0.15, 0.05, 0.1, 0.0, 0.25, 0.15]),
            ("note-3", "Python data science", [0.1, 0.2, 0.9, 0.85, 0.0, 0.1, 0.0, 0.2]),
            ("note-4", "Machine learning", [0.2, 0.1, 0.7, 0.8, 0.6, 0.7, 0.1, 0.3]),
            ("note-5", "Systems with Rust", [0.8, 0.7, 0.2, 0.1, 0.15, 0.05, 0.3, 0.2]),
        ];
        let items = docs
            .iter()
            .map(|(id, title, embedding)| {
                VectorItem::new(*id, embedding.to_vec()).with_metadata(json!({ "title": title }))
            })
            .collect();
        store.upsert(items)?;
        store.remove(["note-4"])?;

        println!("   ✅ Stored {} vectors", store.count());
        store.close()?;
        println!("   💾 Store closed\n");
    }

    println!("🔄 Phase 2: Reopening collection after 'restart'...");
    {
        let store = Store::open(options(storage_path))?;
        println!("   ✅ Collection reopened with {} vectors\n", store.count());

        println!("📊 Verifying persisted data:");
        let ids = (1..=5).map(|i| format!("note-{}", i));
        for item in store.get(ids, GetOptions::default())? {
            let title = item.metadata["title"].as_str().unwrap_or("Unknown");
            println!("   {}: {}", item.id, title);
        }
        println!();

        println!("🔍 Searching for 'Rust programming'...");
        let query = vec![0.88f32, 0.85, 0.12, 0.03, 0.12, 0.02, 0.22, 0.12];
        for hit in store.search(query, 3, &SearchOptions::new())? {
            let title = hit.metadata["title"].as_str().unwrap_or("Unknown");
            println!("   [{}] {} (score: {:.4})", hit.id, title, hit.score);
        }
        println!();
    }

    println!("💥 Phase 3: Writing without closing...");
    {
        let store = Store::open(options(storage_path))?;
        store.upsert_one(
            VectorItem::new("note-6", vec![0.5; 8])
                .with_metadata(json!({ "title": "New note (no close)" })),
        )?;
        println!("   ✅ Inserted note-6 WITHOUT calling close()");
        println!("   📝 Simulating crash (dropping store)...\n");
    }

    println!("🔄 Phase 4: Recovering after 'crash'...");
    {
        let store = Store::open(options(storage_path))?;
        println!("   ✅ Collection recovered with {} vectors", store.count());

        if store.get(["note-6"], GetOptions::default())?.is_empty() {
            println!("   ❌ note-6 not found (log replay failed)");
        } else {
            println!("   ✅ note-6 recovered from the write-ahead log!");
        }
        store.close()?;
    }

    println!("\n🚫 Phase 5: Reopening with a different dimension...");
    match Store::open(StoreOptions::new(16).with_name("notes").with_storage_path(storage_path)) {
        Err(e @ Error::ConfigMismatch { .. }) => println!("   ✅ Rejected: {}", e),
        Err(e) => return Err(e),
        Ok(_) => println!("   ❌ Mismatched configuration was accepted"),
    }

    let _ = fs::remove_dir_all(storage_path);

    println!("\n✨ Demo complete! Quiver persistence is working correctly.");
    Ok(())
}
