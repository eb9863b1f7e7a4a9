//! Similarity metrics for vector scoring.
//!
//! Every metric is expressed as a score where higher means more similar, so the
//! top-k selection in the index never needs to know which metric is active.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported similarity metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity. Vectors are normalized on the way in, so scoring is a dot product.
    Cosine,
    /// Inner (dot) product on raw vectors.
    Ip,
    /// Negative squared Euclidean distance.
    L2,
}

impl Default for Metric {
    fn default() -> Self {
        Self::Cosine
    }
}

impl Metric {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Ip => "ip",
            Metric::L2 => "l2",
        }
    }

    /// Whether vectors are unit-normalized when the caller does not say otherwise.
    #[inline]
    pub fn normalizes_by_default(&self) -> bool {
        matches!(self, Metric::Cosine)
    }

    /// Scores `b` against `a`, assuming cosine inputs are already unit length.
    ///
    /// # Panics
    ///
    /// Debug builds panic if the slices have different lengths.
    #[inline]
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

        match self {
            Metric::Cosine | Metric::Ip => dot_product(a, b),
            Metric::L2 => -euclidean_distance_squared(a, b),
        }
    }

    /// Scores without assuming normalized input.
    ///
    /// Only differs from [`Metric::score`] for cosine, where it divides by both norms.
    #[inline]
    pub fn score_raw(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => cosine_similarity(a, b),
            _ => self.score(a, b),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        normalize_metric(s)
    }
}

/// Validates a metric name and returns its canonical form.
///
/// Matching ignores case and surrounding whitespace.
///
/// # Example
///
/// ```
/// use quiver_core::{normalize_metric, Metric};
///
/// assert_eq!(normalize_metric(" L2 ").unwrap(), Metric::L2);
/// assert!(normalize_metric("manhattan").is_err());
/// ```
pub fn normalize_metric(name: &str) -> Result<Metric> {
    match name.trim().to_ascii_lowercase().as_str() {
        "cosine" => Ok(Metric::Cosine),
        "ip" => Ok(Metric::Ip),
        "l2" => Ok(Metric::L2),
        _ => Err(Error::UnsupportedMetric(name.to_string())),
    }
}

/// Computes squared Euclidean distance (avoids sqrt for comparisons).
#[inline]
pub fn euclidean_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Computes dot product (inner product) between two vectors.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Computes the L2 norm of a vector.
#[inline]
pub fn l2_norm(a: &[f32]) -> f32 {
    a.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Computes cosine similarity between two vectors.
///
/// Range: [-1, 1]. Returns 0 when either vector has zero norm.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let denominator = l2_norm(a) * l2_norm(b);
    if denominator == 0.0 {
        return 0.0;
    }

    dot_product(a, b) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_metric() {
        assert_eq!(normalize_metric("cosine").unwrap(), Metric::Cosine);
        assert_eq!(normalize_metric("IP").unwrap(), Metric::Ip);
        assert_eq!(normalize_metric("  l2").unwrap(), Metric::L2);
        assert!(matches!(
            normalize_metric("euclidean"),
            Err(Error::UnsupportedMetric(name)) if name == "euclidean"
        ));
    }

    #[test]
    fn test_normalize_by_default() {
        assert!(Metric::Cosine.normalizes_by_default());
        assert!(!Metric::Ip.normalizes_by_default());
        assert!(!Metric::L2.normalizes_by_default());
    }

    #[test]
    fn test_l2_score_is_negative_squared_distance() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert!((Metric::L2.score(&a, &b) + 25.0).abs() < 1e-6);
        assert!(Metric::L2.score(&a, &a).abs() < 1e-10);
    }

    #[test]
    fn test_dot_product() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        assert!((dot_product(&a, &b) - 32.0).abs() < 1e-6);
        assert!((Metric::Ip.score(&a, &b) - 32.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_score_raw_only_differs_for_cosine() {
        let a = [3.0, 4.0];
        let b = [3.0, 4.0];
        assert!((Metric::Cosine.score_raw(&a, &b) - 1.0).abs() < 1e-6);
        assert!((Metric::Cosine.score(&a, &b) - 25.0).abs() < 1e-6);
        assert_eq!(Metric::Ip.score_raw(&a, &b), Metric::Ip.score(&a, &b));
    }

    #[test]
    fn test_metric_serde_lowercase() {
        let json = serde_json::to_string(&Metric::L2).unwrap();
        assert_eq!(json, "\"l2\"");
        let back: Metric = serde_json::from_str("\"ip\"").unwrap();
        assert_eq!(back, Metric::Ip);
    }
}
