//! Compound identifiers.
//!
//! A compound id packs several logical key parts into one stable string so
//! that vector keys stay structured ("chunk 2 of field `body` of entity X").
//!
//! # Format
//!
//! ```text
//! v1::<namespace>::<type>::<entityId>::<chunkId>::<field>::<variant>
//! ```
//!
//! Each part is percent-encoded on its own, so a literal `::` inside a part
//! can never be mistaken for a separator. Trailing empty parts are dropped.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Version tag prefixed to every encoded id.
pub const VERSION: &str = "v1";

/// Separator between parts.
pub const SEPARATOR: &str = "::";

/// The structured parts of a compound id.
///
/// # Example
///
/// ```
/// use quiver_core::CompoundId;
///
/// let id = CompoundId::new("doc-42").with_field("body").with_chunk(2);
/// let encoded = id.encode().unwrap();
/// assert_eq!(encoded, "v1::::::doc-42::2::body");
/// assert_eq!(CompoundId::decode(&encoded), Some(id));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CompoundId {
    pub namespace: Option<String>,
    pub kind: Option<String>,
    pub entity_id: Option<String>,
    pub chunk_id: Option<String>,
    pub field: Option<String>,
    pub variant: Option<String>,
}

impl CompoundId {
    /// Creates a compound id for an entity.
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: Some(entity_id.into()),
            ..Default::default()
        }
    }

    /// Sets the namespace. Chainable.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the entity type. Chainable.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Sets the chunk id. Chainable.
    pub fn with_chunk(mut self, chunk_id: impl ToString) -> Self {
        self.chunk_id = Some(chunk_id.to_string());
        self
    }

    /// Sets the field name. Chainable.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Sets the variant. Chainable.
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    fn parts(&self) -> [Option<&str>; 6] {
        [
            self.namespace.as_deref(),
            self.kind.as_deref(),
            self.entity_id.as_deref(),
            self.chunk_id.as_deref(),
            self.field.as_deref(),
            self.variant.as_deref(),
        ]
    }

    /// Encodes the parts into a versioned string.
    pub fn encode(&self) -> Result<String> {
        encode(self)
    }

    /// Decodes a string produced by [`encode`]. See [`decode`].
    pub fn decode(id: &str) -> Option<Self> {
        decode(id)
    }
}

/// Encodes a compound id.
///
/// Fails with [`Error::MissingEntityId`] when the entity id is absent or empty.
pub fn encode(id: &CompoundId) -> Result<String> {
    if id.entity_id.as_deref().map_or(true, str::is_empty) {
        return Err(Error::MissingEntityId);
    }

    let mut parts: Vec<Cow<'_, str>> = id
        .parts()
        .iter()
        .map(|p| p.map(urlencoding::encode).unwrap_or(Cow::Borrowed("")))
        .collect();

    while parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }

    let mut out = String::from(VERSION);
    for part in &parts {
        out.push_str(SEPARATOR);
        out.push_str(part);
    }
    Ok(out)
}

/// Decodes a compound id.
///
/// Returns `None` for empty input, a foreign version tag, malformed escapes,
/// or a token without an entity id. Absent parts decode to `None`.
pub fn decode(id: &str) -> Option<CompoundId> {
    if id.is_empty() {
        return None;
    }

    let mut segments = id.split(SEPARATOR);
    if segments.next()? != VERSION {
        return None;
    }

    let mut parts: [Option<String>; 6] = Default::default();
    for (slot, raw) in parts.iter_mut().zip(segments.by_ref()) {
        if raw.is_empty() {
            continue;
        }
        *slot = Some(urlencoding::decode(raw).ok()?.into_owned());
    }
    if segments.next().is_some() {
        return None;
    }

    let [namespace, kind, entity_id, chunk_id, field, variant] = parts;
    entity_id.as_ref()?;

    Some(CompoundId {
        namespace,
        kind,
        entity_id,
        chunk_id,
        field,
        variant,
    })
}

impl fmt::Display for CompoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str("<missing entity id>"),
        }
    }
}

impl FromStr for CompoundId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        decode(s).ok_or_else(|| Error::InvalidId(format!("not a {} compound id: {}", VERSION, s)))
    }
}
