//! Bitmap-based attribute index for filter pushdown.
//!
//! Uses roaring bitmaps to track which document ids carry a given value for a
//! top-level metadata field, so a [`Filter`] can be answered with set algebra
//! instead of a scan.

use std::collections::HashMap;

use roaring::RoaringBitmap;
use serde_json::Value;

use crate::filter::{Filter, FilterCondition};
use crate::vector::Metadata;

/// A bitmap-based index for fast attribute filtering.
///
/// Maintains inverted indexes from field values to document ids using
/// roaring bitmaps, which are highly compressed for sparse id sets.
///
/// # Example
///
/// ```
/// use quiver_core::{BitmapIndex, Filter};
/// use serde_json::json;
///
/// let mut index = BitmapIndex::new();
///
/// index.insert(1, &json!({ "category": "electronics" }));
/// index.insert(2, &json!({ "category": "books" }));
/// index.insert(3, &json!({ "category": "electronics" }));
///
/// let matches = index.query(&Filter::field("category").eq("electronics"));
///
/// assert!(matches.contains(1));
/// assert!(matches.contains(3));
/// assert!(!matches.contains(2));
/// ```
#[derive(Debug, Default)]
pub struct BitmapIndex {
    /// field_name -> value key -> (original value, bitmap of doc ids)
    field_indexes: HashMap<String, HashMap<String, (Value, RoaringBitmap)>>,
    /// Tracks all indexed ids (for NOT operations)
    all_ids: RoaringBitmap,
}

impl BitmapIndex {
    /// Creates a new empty bitmap index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of indexed documents.
    pub fn len(&self) -> u64 {
        self.all_ids.len()
    }

    /// Returns true if no documents are indexed.
    pub fn is_empty(&self) -> bool {
        self.all_ids.is_empty()
    }

    /// Indexes a document's metadata. Non-object metadata indexes no fields.
    pub fn insert(&mut self, id: u32, metadata: &Metadata) {
        self.all_ids.insert(id);

        let Some(fields) = metadata.as_object() else {
            return;
        };
        for (field, value) in fields {
            self.field_indexes
                .entry(field.clone())
                .or_default()
                .entry(value_key(value))
                .or_insert_with(|| (value.clone(), RoaringBitmap::new()))
                .1
                .insert(id);
        }
    }

    /// Removes a document's metadata from the index.
    pub fn delete(&mut self, id: u32, metadata: &Metadata) {
        self.all_ids.remove(id);

        let Some(fields) = metadata.as_object() else {
            return;
        };
        for (field, value) in fields {
            let Some(field_map) = self.field_indexes.get_mut(field) else {
                continue;
            };
            let key = value_key(value);
            let emptied = match field_map.get_mut(&key) {
                Some((_, bitmap)) => {
                    bitmap.remove(id);
                    bitmap.is_empty()
                }
                None => false,
            };
            if emptied {
                field_map.remove(&key);
            }
        }
    }

    /// Evaluates a filter and returns matching document ids as a bitmap.
    pub fn query(&self, filter: &Filter) -> RoaringBitmap {
        self.eval_condition(&filter.condition)
    }

    /// Evaluates a filter condition recursively.
    fn eval_condition(&self, condition: &FilterCondition) -> RoaringBitmap {
        match condition {
            FilterCondition::Eq(field, value) => self.get_bitmap(field, &value_key(value)),
            FilterCondition::Ne(field, value) => {
                let eq_bitmap = self.get_bitmap(field, &value_key(value));
                &self.all_ids - &eq_bitmap
            }
            FilterCondition::In(field, values) => {
                let mut result = RoaringBitmap::new();
                for value in values {
                    result |= self.get_bitmap(field, &value_key(value));
                }
                result
            }
            FilterCondition::Gt(..)
            | FilterCondition::Gte(..)
            | FilterCondition::Lt(..)
            | FilterCondition::Lte(..) => self.range_query(condition),
            FilterCondition::Contains(field, substring) => self.union_where(field, |v| {
                v.as_str()
                    .is_some_and(|s| s.contains(substring.as_str()))
            }),
            FilterCondition::Exists(field) => self.union_where(field, |_| true),
            FilterCondition::And(left, right) => {
                self.eval_condition(left) & self.eval_condition(right)
            }
            FilterCondition::Or(left, right) => {
                self.eval_condition(left) | self.eval_condition(right)
            }
            FilterCondition::Not(inner) => {
                let inner_result = self.eval_condition(inner);
                &self.all_ids - &inner_result
            }
        }
    }

    /// Gets the bitmap for a specific field/value pair.
    fn get_bitmap(&self, field: &str, key: &str) -> RoaringBitmap {
        self.field_indexes
            .get(field)
            .and_then(|m| m.get(key))
            .map(|(_, bitmap)| bitmap.clone())
            .unwrap_or_default()
    }

    /// Unions the bitmaps of every value of `field` accepted by `keep`.
    fn union_where<F>(&self, field: &str, keep: F) -> RoaringBitmap
    where
        F: Fn(&Value) -> bool,
    {
        let Some(field_map) = self.field_indexes.get(field) else {
            return RoaringBitmap::new();
        };

        field_map
            .values()
            .filter(|(value, _)| keep(value))
            .fold(RoaringBitmap::new(), |acc, (_, bm)| &acc | bm)
    }

    /// Evaluates range queries (gt, gte, lt, lte) over numeric values.
    fn range_query(&self, condition: &FilterCondition) -> RoaringBitmap {
        let (field, target) = match condition {
            FilterCondition::Gt(f, v)
            | FilterCondition::Gte(f, v)
            | FilterCondition::Lt(f, v)
            | FilterCondition::Lte(f, v) => (f, v),
            _ => return RoaringBitmap::new(),
        };
        let Some(target) = target.as_f64() else {
            return RoaringBitmap::new();
        };

        self.union_where(field, |stored| {
            let Some(stored) = stored.as_f64() else {
                return false;
            };
            match condition {
                FilterCondition::Gt(..) => stored > target,
                FilterCondition::Gte(..) => stored >= target,
                FilterCondition::Lt(..) => stored < target,
                FilterCondition::Lte(..) => stored <= target,
                _ => false,
            }
        })
    }

    /// Clears all indexed data.
    pub fn clear(&mut self) {
        self.field_indexes.clear();
        self.all_ids.clear();
    }
}

/// Converts a JSON value to a lookup key. Strings are tagged so that the
/// string `"1"` and the number `1` stay distinct.
fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => format!("s:{}", s),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_query_eq() {
        let mut index = BitmapIndex::new();

        index.insert(1, &json!({ "category": "electronics" }));
        index.insert(2, &json!({ "category": "books" }));
        index.insert(3, &json!({ "category": "electronics" }));

        let matches = index.query(&Filter::field("category").eq("electronics"));

        assert_eq!(matches.len(), 2);
        assert!(matches.contains(1));
        assert!(matches.contains(3));
        assert!(!matches.contains(2));
    }

    #[test]
    fn test_query_ne_and_in() {
        let mut index = BitmapIndex::new();

        index.insert(1, &json!({ "status": "active" }));
        index.insert(2, &json!({ "status": "inactive" }));
        index.insert(3, &json!({ "status": "archived" }));

        let ne = index.query(&Filter::field("status").ne("active"));
        assert_eq!(ne.len(), 2);
        assert!(!ne.contains(1));

        let within =
            index.query(&Filter::field("status").contained_in(vec!["active", "archived"]));
        assert_eq!(within.len(), 2);
        assert!(within.contains(1));
        assert!(within.contains(3));
    }

    #[test]
    fn test_string_and_number_keys_differ() {
        let mut index = BitmapIndex::new();
        index.insert(1, &json!({ "v": "1" }));
        index.insert(2, &json!({ "v": 1 }));

        let matches = index.query(&Filter::field("v").eq(1));
        assert_eq!(matches.len(), 1);
        assert!(matches.contains(2));
    }

    #[test]
    fn test_query_and_or_not() {
        let mut index = BitmapIndex::new();

        index.insert(1, &json!({ "category": "electronics", "brand": "sony" }));
        index.insert(2, &json!({ "category": "electronics", "brand": "lg" }));
        index.insert(3, &json!({ "category": "books", "brand": "sony" }));

        let and = index.query(
            &Filter::field("category")
                .eq("electronics")
                .and(Filter::field("brand").eq("sony")),
        );
        assert_eq!(and.len(), 1);
        assert!(and.contains(1));

        let or = index.query(
            &Filter::field("category")
                .eq("books")
                .or(Filter::field("brand").eq("lg")),
        );
        assert_eq!(or.len(), 2);

        let not = index.query(&Filter::field("brand").eq("sony").negate());
        assert_eq!(not.len(), 1);
        assert!(not.contains(2));
    }

    #[test]
    fn test_delete() {
        let mut index = BitmapIndex::new();

        let metadata = json!({ "category": "electronics" });
        index.insert(1, &metadata);
        index.insert(2, &metadata);
        assert_eq!(index.len(), 2);

        index.delete(1, &metadata);
        assert_eq!(index.len(), 1);

        let matches = index.query(&Filter::field("category").eq("electronics"));
        assert_eq!(matches.len(), 1);
        assert!(matches.contains(2));
    }

    #[test]
    fn test_numeric_range() {
        let mut index = BitmapIndex::new();

        index.insert(1, &json!({ "price": 10 }));
        index.insert(2, &json!({ "price": 25 }));
        index.insert(3, &json!({ "price": 50.5 }));
        index.insert(4, &json!({ "price": "cheap" }));

        let matches = index.query(&Filter::field("price").gt(20));
        assert_eq!(matches.len(), 2);
        assert!(matches.contains(2));
        assert!(matches.contains(3));

        let matches = index.query(&Filter::field("price").lte(25));
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn test_contains_and_exists() {
        let mut index = BitmapIndex::new();

        index.insert(1, &json!({ "name": "rust book" }));
        index.insert(2, &json!({ "name": "python book" }));
        index.insert(3, &json!({}));
        index.insert(4, &serde_json::Value::Null);

        let contains = index.query(&Filter::field("name").contains("rust"));
        assert_eq!(contains.len(), 1);
        assert!(contains.contains(1));

        let exists = index.query(&Filter::field("name").exists());
        assert_eq!(exists.len(), 2);
        assert!(!exists.contains(3));
        assert!(!exists.contains(4));
    }
}
