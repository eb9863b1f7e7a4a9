//! Exact in-memory indexing.

pub mod brute_force;
pub mod top_k;

pub use brute_force::BruteForceIndex;
pub use top_k::{Candidate, TopK};
