//! Error types for Quiver operations.

use thiserror::Error;

/// Result type alias using Quiver's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during Quiver operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Store options did not carry a positive dimension.
    #[error("dimension is required and must be a positive integer")]
    MissingDimension,

    /// Metric name is not one of `cosine`, `ip`, `l2`.
    #[error("unsupported metric: {0}")]
    UnsupportedMetric(String),

    /// Item id was null.
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// Vector input could not be read as packed floats.
    #[error("invalid vector: {0}")]
    InvalidVector(String),

    /// Vector dimension mismatch between index and input.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A collection was reopened with a different dimension, metric or normalize flag.
    #[error("config mismatch for collection '{collection}': stored {stored}, requested {requested}")]
    ConfigMismatch {
        collection: String,
        stored: String,
        requested: String,
    },

    /// Requested backend name is not registered.
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// Backend cannot run in the current environment.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Compound id has no entity id.
    #[error("compound id requires an entity id")]
    MissingEntityId,

    /// IO error during storage operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// WAL corruption detected.
    #[error("WAL corrupted: {0}")]
    WalCorrupted(String),

    /// Snapshot file failed validation.
    #[error("snapshot corrupted: {0}")]
    SnapshotCorrupted(String),

    /// Hybrid engine reported a failure.
    #[error("engine error: {0}")]
    Engine(String),
}
