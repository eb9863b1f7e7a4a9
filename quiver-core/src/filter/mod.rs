//! Filter expressions for metadata-based vector filtering.
//!
//! Two kinds of filters exist. A [`Filter`] is a declarative attribute
//! predicate over top-level metadata fields; engines that index attributes can
//! evaluate it natively. A predicate closure is arbitrary caller code over
//! `(id, metadata)` and can only be evaluated by scanning.

pub mod bitmap_index;

pub use bitmap_index::BitmapIndex;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::vector::Metadata;

/// A filter expression that can be evaluated against metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub(crate) condition: FilterCondition,
}

impl Filter {
    /// Creates a filter for a specific field.
    ///
    /// # Example
    ///
    /// ```
    /// use quiver_core::Filter;
    ///
    /// let filter = Filter::field("category").eq("documents");
    /// ```
    pub fn field(name: &str) -> FieldFilter {
        FieldFilter {
            field_name: name.to_string(),
        }
    }

    /// Creates a filter from a condition.
    pub fn from_condition(condition: FilterCondition) -> Self {
        Self { condition }
    }

    /// Returns the underlying condition tree.
    pub fn condition(&self) -> &FilterCondition {
        &self.condition
    }

    /// Combines this filter with another using AND.
    pub fn and(self, other: Filter) -> Self {
        Self {
            condition: FilterCondition::And(Box::new(self.condition), Box::new(other.condition)),
        }
    }

    /// Combines this filter with another using OR.
    pub fn or(self, other: Filter) -> Self {
        Self {
            condition: FilterCondition::Or(Box::new(self.condition), Box::new(other.condition)),
        }
    }

    /// Negates this filter.
    #[allow(clippy::should_implement_trait)]
    pub fn negate(self) -> Self {
        Self {
            condition: FilterCondition::Not(Box::new(self.condition)),
        }
    }

    /// Evaluates the filter against metadata. Returns true if it matches.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.condition.matches(metadata)
    }
}

/// Builder for field-specific filter conditions.
#[derive(Debug)]
pub struct FieldFilter {
    field_name: String,
}

impl FieldFilter {
    /// Field equals value.
    pub fn eq<V: Into<Value>>(self, value: V) -> Filter {
        Filter::from_condition(FilterCondition::Eq(self.field_name, value.into()))
    }

    /// Field not equals value.
    pub fn ne<V: Into<Value>>(self, value: V) -> Filter {
        Filter::from_condition(FilterCondition::Ne(self.field_name, value.into()))
    }

    /// Field greater than value.
    pub fn gt<V: Into<Value>>(self, value: V) -> Filter {
        Filter::from_condition(FilterCondition::Gt(self.field_name, value.into()))
    }

    /// Field greater than or equal to value.
    pub fn gte<V: Into<Value>>(self, value: V) -> Filter {
        Filter::from_condition(FilterCondition::Gte(self.field_name, value.into()))
    }

    /// Field less than value.
    pub fn lt<V: Into<Value>>(self, value: V) -> Filter {
        Filter::from_condition(FilterCondition::Lt(self.field_name, value.into()))
    }

    /// Field less than or equal to value.
    pub fn lte<V: Into<Value>>(self, value: V) -> Filter {
        Filter::from_condition(FilterCondition::Lte(self.field_name, value.into()))
    }

    /// Field value is in the given list.
    pub fn contained_in<V: Into<Value>>(self, values: Vec<V>) -> Filter {
        let values: Vec<Value> = values.into_iter().map(|v| v.into()).collect();
        Filter::from_condition(FilterCondition::In(self.field_name, values))
    }

    /// Field (as string) contains the given substring.
    pub fn contains(self, substring: &str) -> Filter {
        Filter::from_condition(FilterCondition::Contains(
            self.field_name,
            substring.to_string(),
        ))
    }

    /// Field exists (is present, possibly null).
    pub fn exists(self) -> Filter {
        Filter::from_condition(FilterCondition::Exists(self.field_name))
    }
}

/// The actual filter condition variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterCondition {
    /// Field equals value
    Eq(String, Value),
    /// Field not equals value
    Ne(String, Value),
    /// Field greater than value
    Gt(String, Value),
    /// Field greater than or equal to value
    Gte(String, Value),
    /// Field less than value
    Lt(String, Value),
    /// Field less than or equal to value
    Lte(String, Value),
    /// Field value is in list
    In(String, Vec<Value>),
    /// String field contains substring
    Contains(String, String),
    /// Field exists
    Exists(String),
    /// Logical AND
    And(Box<FilterCondition>, Box<FilterCondition>),
    /// Logical OR
    Or(Box<FilterCondition>, Box<FilterCondition>),
    /// Logical NOT
    Not(Box<FilterCondition>),
}

impl FilterCondition {
    /// Evaluates this condition against metadata.
    ///
    /// Non-object metadata has no fields, so every field lookup misses.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            FilterCondition::Eq(name, value) => field_value(metadata, name)
                .map(|v| v == value)
                .unwrap_or(false),
            FilterCondition::Ne(name, value) => field_value(metadata, name)
                .map(|v| v != value)
                .unwrap_or(true),
            FilterCondition::Gt(name, value) => {
                compare_values(field_value(metadata, name), value, |a, b| a > b)
            }
            FilterCondition::Gte(name, value) => {
                compare_values(field_value(metadata, name), value, |a, b| a >= b)
            }
            FilterCondition::Lt(name, value) => {
                compare_values(field_value(metadata, name), value, |a, b| a < b)
            }
            FilterCondition::Lte(name, value) => {
                compare_values(field_value(metadata, name), value, |a, b| a <= b)
            }
            FilterCondition::In(name, values) => field_value(metadata, name)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            FilterCondition::Contains(name, substring) => field_value(metadata, name)
                .and_then(Value::as_str)
                .map(|s| s.contains(substring.as_str()))
                .unwrap_or(false),
            FilterCondition::Exists(name) => field_value(metadata, name).is_some(),
            FilterCondition::And(a, b) => a.matches(metadata) && b.matches(metadata),
            FilterCondition::Or(a, b) => a.matches(metadata) || b.matches(metadata),
            FilterCondition::Not(c) => !c.matches(metadata),
        }
    }
}

/// Looks up a top-level metadata field.
#[inline]
pub(crate) fn field_value<'a>(metadata: &'a Metadata, name: &str) -> Option<&'a Value> {
    metadata.as_object().and_then(|m| m.get(name))
}

/// Helper to compare numeric values.
fn compare_values<F>(field_value: Option<&Value>, target: &Value, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (field_value, target) {
        (Some(Value::Number(a)), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(av), Some(bv)) => cmp(av, bv),
            _ => false,
        },
        _ => false,
    }
}

/// Arbitrary caller predicate over `(id, metadata)`.
pub type PredicateFn = dyn Fn(&str, &Metadata) -> bool + Send + Sync;

/// The filter attached to a search.
#[derive(Clone)]
pub enum SearchFilter {
    /// Declarative attribute filter, pushed down where the backend can.
    Where(Filter),
    /// Caller closure, always evaluated by scanning.
    Predicate(Arc<PredicateFn>),
}

impl SearchFilter {
    /// Evaluates the filter for one item.
    #[inline]
    pub fn matches(&self, id: &str, metadata: &Metadata) -> bool {
        match self {
            SearchFilter::Where(filter) => filter.matches(metadata),
            SearchFilter::Predicate(f) => f(id, metadata),
        }
    }
}

impl fmt::Debug for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchFilter::Where(filter) => f.debug_tuple("Where").field(filter).finish(),
            SearchFilter::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}

impl From<Filter> for SearchFilter {
    fn from(filter: Filter) -> Self {
        SearchFilter::Where(filter)
    }
}

/// Options for `search`.
///
/// # Example
///
/// ```
/// use quiver_core::{Filter, SearchOptions};
///
/// let opts = SearchOptions::new()
///     .with_filter(Filter::field("lang").eq("en"))
///     .with_min_score(0.25)
///     .with_vectors();
/// assert!(opts.include_vectors);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub filter: Option<SearchFilter>,
    pub min_score: Option<f32>,
    pub include_vectors: bool,
}

impl SearchOptions {
    /// Options with no filter, no score floor, no vectors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a declarative attribute filter. Chainable.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(SearchFilter::Where(filter));
        self
    }

    /// Sets a caller predicate over `(id, metadata)`. Chainable.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str, &Metadata) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(SearchFilter::Predicate(Arc::new(predicate)));
        self
    }

    /// Excludes hits scoring below `min_score`. Chainable.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Returns stored vectors alongside hits. Chainable.
    pub fn with_vectors(mut self) -> Self {
        self.include_vectors = true;
        self
    }
}

/// Options for `get`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    pub include_vectors: bool,
}

impl GetOptions {
    /// Returns stored vectors alongside metadata.
    pub fn with_vectors() -> Self {
        Self {
            include_vectors: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_metadata() -> Metadata {
        json!({
            "category": "documents",
            "year": 2024,
            "score": 0.95,
            "active": true,
            "name": "test document"
        })
    }

    #[test]
    fn test_filter_eq() {
        let m = test_metadata();
        assert!(Filter::field("category").eq("documents").matches(&m));
        assert!(!Filter::field("category").eq("images").matches(&m));
    }

    #[test]
    fn test_filter_ne() {
        let m = test_metadata();
        assert!(Filter::field("category").ne("images").matches(&m));
    }

    #[test]
    fn test_filter_numeric_comparisons() {
        let m = test_metadata();

        assert!(Filter::field("year").gt(2020).matches(&m));
        assert!(Filter::field("year").gte(2024).matches(&m));
        assert!(Filter::field("year").lt(2025).matches(&m));
        assert!(Filter::field("year").lte(2024).matches(&m));
        assert!(!Filter::field("category").gt(1).matches(&m));
    }

    #[test]
    fn test_filter_in_and_contains() {
        let m = test_metadata();
        assert!(Filter::field("category")
            .contained_in(vec!["documents", "images"])
            .matches(&m));
        assert!(!Filter::field("category")
            .contained_in(vec!["audio", "video"])
            .matches(&m));
        assert!(Filter::field("name").contains("document").matches(&m));
    }

    #[test]
    fn test_filter_exists() {
        let m = test_metadata();
        assert!(Filter::field("category").exists().matches(&m));
        assert!(!Filter::field("nonexistent").exists().matches(&m));
    }

    #[test]
    fn test_filter_combinators() {
        let m = test_metadata();
        // (category = 'documents' AND year > 2024) OR active = true
        let filter = Filter::field("category")
            .eq("documents")
            .and(Filter::field("year").gt(2024))
            .or(Filter::field("active").eq(true));
        assert!(filter.matches(&m));
        assert!(Filter::field("category").eq("images").negate().matches(&m));
    }

    #[test]
    fn test_non_object_metadata_has_no_fields() {
        assert!(!Filter::field("a").exists().matches(&Value::Null));
        assert!(Filter::field("a").ne(1).matches(&json!([1, 2])));
    }

    #[test]
    fn test_search_filter_predicate() {
        let opts = SearchOptions::new().with_predicate(|id, _| id.starts_with("keep"));
        let filter = opts.filter.unwrap();
        assert!(filter.matches("keep-1", &Value::Null));
        assert!(!filter.matches("drop-1", &Value::Null));
        assert_eq!(format!("{:?}", filter), "Predicate(<fn>)");
    }
}
