//! # Quiver
//!
//! **An embeddable vector index with exact search and pluggable backends.**
//!
//! Quiver stores fixed-dimension vectors under string ids with arbitrary JSON
//! metadata and answers top-k similarity queries. The same contract is served
//! by three backends, so callers can switch storage without touching queries.
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **Exact Search** | Flat buffer scan with a bounded top-k heap |
//! | **Metrics** | Cosine, inner product, negative squared L2 |
//! | **Filtered Search** | Attribute filters or arbitrary predicates |
//! | **Persistence** | WAL batches plus checksummed snapshots |
//! | **Hybrid Engines** | Adapter for third-party vector + attribute engines |
//! | **Async API** | Tokio-compatible async store (feature flag) |
//!
//! ## Quick Start
//!
//! ```rust
//! use quiver::prelude::*;
//! use quiver::json;
//!
//! let store = Store::open(StoreOptions::new(3)).unwrap();
//! store.upsert(vec![
//!     VectorItem::new("a", vec![1.0, 0.0, 0.0]).with_metadata(json!({ "lang": "en" })),
//!     VectorItem::new("b", vec![0.0, 1.0, 0.0]).with_metadata(json!({ "lang": "de" })),
//! ]).unwrap();
//!
//! let hits = store.search(vec![1.0f32, 0.0, 0.0], 1, &SearchOptions::new()).unwrap();
//! assert_eq!(hits[0].id, "a");
//! ```
//!
//! ### Persistent Collection
//!
//! ```no_run
//! use quiver::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let options = StoreOptions::new(384)
//!         .with_name("notes")
//!         .with_storage_path("./my_vectors");
//!     let store = Store::open(options)?;
//!
//!     store.upsert(vec![VectorItem::new("doc-1", vec![0.1; 384])])?;
//!     let filter = Filter::field("kind").eq("note");
//!     let hits = store.search(vec![0.1f32; 384], 10, &SearchOptions::new().with_filter(filter))?;
//!     println!("{} hits", hits.len());
//!
//!     store.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Crate Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | Enables `AsyncStore` for tokio compatibility |
//!
//! ## Architecture
//!
//! - **`quiver-core`**: Core library with no async runtime dependency
//! - **`quiver`**: Main crate that re-exports everything
//!
//! ## Thread Safety
//!
//! - Backends take `&mut self` for mutation; wrap them yourself or use [`Store`]
//! - [`Store`] holds its backend behind a `RwLock`

// Re-export everything from core
pub use quiver_core::*;

pub use serde_json::{json, Value};
