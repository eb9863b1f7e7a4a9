//! Vector inputs, items and the coercion helpers that turn them into index records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::distance::l2_norm;
use crate::error::{Error, Result};

/// Arbitrary metadata attached to an item. `Value::Null` when absent.
pub type Metadata = Value;

/// Numeric input accepted wherever a vector is expected.
///
/// Embedding producers hand vectors over in several shapes; all of them are
/// coerced to a dense `Vec<f32>` of the index dimension before use.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorInput {
    /// Already a float buffer.
    F32(Vec<f32>),
    /// Generic numeric array (doubles or integers).
    F64(Vec<f64>),
    /// JSON array of numbers.
    Json(Vec<Value>),
    /// Raw little-endian bytes of packed 32-bit floats.
    Bytes(Vec<u8>),
}

impl VectorInput {
    /// Wraps a raw byte buffer of packed little-endian `f32` values.
    pub fn from_le_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(bytes.into())
    }

    /// Number of components the input will produce, if well formed.
    pub fn len(&self) -> usize {
        match self {
            VectorInput::F32(v) => v.len(),
            VectorInput::F64(v) => v.len(),
            VectorInput::Json(v) => v.len(),
            VectorInput::Bytes(b) => b.len() / 4,
        }
    }

    /// Returns true if the input holds no components.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<f32>> for VectorInput {
    fn from(data: Vec<f32>) -> Self {
        Self::F32(data)
    }
}

impl From<&[f32]> for VectorInput {
    fn from(data: &[f32]) -> Self {
        Self::F32(data.to_vec())
    }
}

impl From<&Vec<f32>> for VectorInput {
    fn from(data: &Vec<f32>) -> Self {
        Self::F32(data.clone())
    }
}

impl<const N: usize> From<[f32; N]> for VectorInput {
    fn from(data: [f32; N]) -> Self {
        Self::F32(data.to_vec())
    }
}

impl<const N: usize> From<&[f32; N]> for VectorInput {
    fn from(data: &[f32; N]) -> Self {
        Self::F32(data.to_vec())
    }
}

impl From<Vec<f64>> for VectorInput {
    fn from(data: Vec<f64>) -> Self {
        Self::F64(data)
    }
}

impl From<&[f64]> for VectorInput {
    fn from(data: &[f64]) -> Self {
        Self::F64(data.to_vec())
    }
}

impl From<Vec<i32>> for VectorInput {
    fn from(data: Vec<i32>) -> Self {
        Self::F64(data.into_iter().map(f64::from).collect())
    }
}

impl From<Vec<Value>> for VectorInput {
    fn from(data: Vec<Value>) -> Self {
        Self::Json(data)
    }
}

/// Converts an arbitrary JSON value into a canonical string id.
///
/// Strings pass through, numbers and booleans are stringified, and any other
/// non-null value uses its JSON text. `null` is rejected.
pub fn to_canonical_id(value: &Value) -> Result<String> {
    match value {
        Value::Null => Err(Error::InvalidId("id must not be null".to_string())),
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Ok(other.to_string()),
    }
}

/// Coerces an input into a float buffer of exactly `dimension` finite components.
///
/// `NaN`, infinities and `f64` values that overflow `f32` fail with
/// [`Error::InvalidVector`].
pub fn coerce_vector(input: &VectorInput, dimension: usize) -> Result<Vec<f32>> {
    let data: Vec<f32> = match input {
        VectorInput::F32(v) => v.clone(),
        VectorInput::F64(v) => v.iter().map(|&x| x as f32).collect(),
        VectorInput::Json(values) => values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                v.as_f64().map(|x| x as f32).ok_or_else(|| {
                    Error::InvalidVector(format!("component {} is not a number: {}", i, v))
                })
            })
            .collect::<Result<_>>()?,
        VectorInput::Bytes(bytes) => {
            if bytes.len() % 4 != 0 {
                return Err(Error::InvalidVector(format!(
                    "byte length {} is not a multiple of 4",
                    bytes.len()
                )));
            }
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        }
    };

    if data.len() != dimension {
        return Err(Error::DimensionMismatch {
            expected: dimension,
            got: data.len(),
        });
    }

    if let Some(i) = data.iter().position(|x| !x.is_finite()) {
        return Err(Error::InvalidVector(format!(
            "component {} is not finite: {}",
            i, data[i]
        )));
    }

    Ok(data)
}

/// Scales a vector to unit length in place. Zero vectors are left untouched.
#[inline]
pub fn normalize_in_place(data: &mut [f32]) {
    let norm = l2_norm(data);
    if norm > 0.0 {
        for x in data.iter_mut() {
            *x /= norm;
        }
    }
}

/// Coerces an input and, when `normalize` is set, scales it to unit length.
///
/// # Example
///
/// ```
/// use quiver_core::prepare_vector;
///
/// let v = prepare_vector(&vec![3.0f32, 4.0].into(), 2, true).unwrap();
/// assert!((v[0] - 0.6).abs() < 1e-6);
/// assert!((v[1] - 0.8).abs() < 1e-6);
/// ```
pub fn prepare_vector(input: &VectorInput, dimension: usize, normalize: bool) -> Result<Vec<f32>> {
    let mut data = coerce_vector(input, dimension)?;
    if normalize {
        normalize_in_place(&mut data);
    }
    Ok(data)
}

/// An item handed to `upsert`: id, raw vector, metadata.
///
/// # Example
///
/// ```
/// use quiver_core::VectorItem;
/// use serde_json::json;
///
/// let item = VectorItem::new("doc-1", vec![0.1, 0.2, 0.3])
///     .with_metadata(json!({ "title": "intro" }));
/// assert_eq!(item.id, "doc-1");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct VectorItem {
    pub id: String,
    pub vector: VectorInput,
    pub metadata: Metadata,
}

impl VectorItem {
    /// Creates an item without metadata.
    pub fn new(id: impl Into<String>, vector: impl Into<VectorInput>) -> Self {
        Self {
            id: id.into(),
            vector: vector.into(),
            metadata: Value::Null,
        }
    }

    /// Attaches metadata. Chainable.
    pub fn with_metadata(mut self, metadata: impl Into<Metadata>) -> Self {
        self.metadata = metadata.into();
        self
    }

    /// Prepares the item for storage under the given configuration.
    pub fn prepare(&self, dimension: usize, normalize: bool) -> Result<VectorRecord> {
        Ok(VectorRecord {
            id: self.id.clone(),
            vector: prepare_vector(&self.vector, dimension, normalize)?,
            metadata: self.metadata.clone(),
        })
    }
}

impl TryFrom<Value> for VectorItem {
    type Error = Error;

    /// Reads `{ "id": ..., "vector": [...], "metadata": ... }`.
    fn try_from(value: Value) -> Result<Self> {
        let Value::Object(mut map) = value else {
            return Err(Error::InvalidVector("item must be a JSON object".to_string()));
        };

        let id = to_canonical_id(map.get("id").unwrap_or(&Value::Null))?;
        let vector = match map.remove("vector") {
            Some(Value::Array(values)) => VectorInput::Json(values),
            Some(other) => {
                return Err(Error::InvalidVector(format!(
                    "vector must be an array, got {}",
                    other
                )))
            }
            None => return Err(Error::InvalidVector("item has no vector".to_string())),
        };
        let metadata = map.remove("metadata").unwrap_or(Value::Null);

        Ok(Self {
            id,
            vector,
            metadata,
        })
    }
}

/// A prepared item: canonical id, coerced vector, metadata.
///
/// This is the unit the index holds and the durable layer persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_f32() {
        let v = coerce_vector(&vec![1.0f32, 2.0, 3.0].into(), 3).unwrap();
        assert_eq!(v, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_coerce_numeric_arrays() {
        let v = coerce_vector(&vec![1.5f64, -2.0].into(), 2).unwrap();
        assert_eq!(v, vec![1.5, -2.0]);

        let v = coerce_vector(&vec![1i32, 2, 3].into(), 3).unwrap();
        assert_eq!(v, vec![1.0, 2.0, 3.0]);

        let v = coerce_vector(&vec![json!(0.5), json!(2)].into(), 2).unwrap();
        assert_eq!(v, vec![0.5, 2.0]);
    }

    #[test]
    fn test_coerce_bytes() {
        let bytes: Vec<u8> = [1.0f32, -0.5]
            .iter()
            .flat_map(|x| x.to_le_bytes())
            .collect();
        let v = coerce_vector(&VectorInput::from_le_bytes(bytes), 2).unwrap();
        assert_eq!(v, vec![1.0, -0.5]);

        let err = coerce_vector(&VectorInput::from_le_bytes(vec![0u8; 7]), 2);
        assert!(matches!(err, Err(Error::InvalidVector(_))));
    }

    #[test]
    fn test_coerce_dimension_mismatch() {
        let err = coerce_vector(&vec![1.0f32, 2.0].into(), 3);
        assert!(matches!(
            err,
            Err(Error::DimensionMismatch {
                expected: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn test_coerce_rejects_non_numeric_json() {
        let err = coerce_vector(&vec![json!(1.0), json!("x")].into(), 2);
        assert!(matches!(err, Err(Error::InvalidVector(_))));
    }

    #[test]
    fn test_coerce_rejects_non_finite() {
        let inputs: Vec<VectorInput> = vec![
            vec![f32::INFINITY, 0.0].into(),
            vec![1.0f32, f32::NAN].into(),
            vec![1e40f64, 0.0].into(),
            VectorInput::from_le_bytes(
                [f32::NEG_INFINITY, 0.0]
                    .iter()
                    .flat_map(|x| x.to_le_bytes())
                    .collect::<Vec<u8>>(),
            ),
        ];
        for input in &inputs {
            let err = coerce_vector(input, 2);
            assert!(matches!(err, Err(Error::InvalidVector(_))), "{:?}", input);
        }

        let err = prepare_vector(&vec![f32::MAX, f32::NAN].into(), 2, true);
        assert!(matches!(err, Err(Error::InvalidVector(_))));
    }

    #[test]
    fn test_prepare_normalizes() {
        let v = prepare_vector(&vec![3.0f32, 4.0].into(), 2, true).unwrap();
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);

        let raw = prepare_vector(&vec![3.0f32, 4.0].into(), 2, false).unwrap();
        assert_eq!(raw, vec![3.0, 4.0]);
    }

    #[test]
    fn test_prepare_zero_vector_is_left_alone() {
        let v = prepare_vector(&vec![0.0f32, 0.0].into(), 2, true).unwrap();
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn test_canonical_id() {
        assert_eq!(to_canonical_id(&json!("a")).unwrap(), "a");
        assert_eq!(to_canonical_id(&json!(42)).unwrap(), "42");
        assert_eq!(to_canonical_id(&json!(true)).unwrap(), "true");
        assert!(matches!(
            to_canonical_id(&Value::Null),
            Err(Error::InvalidId(_))
        ));
    }

    #[test]
    fn test_item_from_json() {
        let item = VectorItem::try_from(json!({
            "id": 7,
            "vector": [1, 0, 0],
            "metadata": { "kind": "note" }
        }))
        .unwrap();
        assert_eq!(item.id, "7");
        assert_eq!(item.metadata["kind"], "note");
        assert_eq!(item.prepare(3, false).unwrap().vector, vec![1.0, 0.0, 0.0]);

        let missing_id = VectorItem::try_from(json!({ "vector": [1] }));
        assert!(matches!(missing_id, Err(Error::InvalidId(_))));
    }

    #[test]
    fn test_record_serialization() {
        let record = VectorRecord {
            id: "x".into(),
            vector: vec![1.0, 2.0],
            metadata: json!({ "k": 1 }),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: VectorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
