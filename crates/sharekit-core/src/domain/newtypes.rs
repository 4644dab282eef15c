//! Domain newtypes with validation
//!
//! Strongly-typed identifiers for batches, requests and graph objects, plus
//! the validated [`ResourcePath`] every request is addressed to.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a [`Batch`](super::batch::Batch)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    /// Create a new random BatchId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BatchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BatchId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid BatchId: {e}")))
    }
}

/// Sequence number of a request inside its batch
///
/// Assigned at enqueue time; defines execution and response-correlation
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle of an object in a context's object graph
///
/// Only meaningful for the context that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "obj{}", self.0)
    }
}

// ============================================================================
// ResourcePath
// ============================================================================

/// Placeholder replaced by the anchor object's key when a path is resolved
pub const ANCHOR_PLACEHOLDER: &str = "{anchor}";

/// Binds the `{anchor}` placeholder of a path to a graph object's key property
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Anchor {
    object: ObjectId,
    key: String,
}

impl Anchor {
    /// Object whose key fills the placeholder
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Property of the anchor object used as the key (e.g. `Id`)
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Site-relative path of a remote resource (e.g. `_api/web/lists`)
///
/// A path is never empty and never starts with `/`. A *deferred* path carries
/// an [`Anchor`]: its `{anchor}` placeholder is filled in with a key the server
/// assigns later, possibly by an earlier request of the same batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    template: String,
    anchor: Option<Anchor>,
}

impl ResourcePath {
    /// Creates a concrete path
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidResourcePath`] if the path is empty or
    /// contains the anchor placeholder.
    pub fn new(path: impl AsRef<str>) -> Result<Self, DomainError> {
        let trimmed = path.as_ref().trim().trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(DomainError::InvalidResourcePath(
                "path must not be empty".to_string(),
            ));
        }
        if trimmed.contains(ANCHOR_PLACEHOLDER) {
            return Err(DomainError::InvalidResourcePath(format!(
                "{trimmed} contains {ANCHOR_PLACEHOLDER} but has no anchor"
            )));
        }
        Ok(Self {
            template: trimmed.to_string(),
            anchor: None,
        })
    }

    /// Creates a deferred path whose `{anchor}` is filled from `object`'s
    /// `key` property at send time
    pub fn anchored(
        template: impl AsRef<str>,
        object: ObjectId,
        key: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let trimmed = template.as_ref().trim().trim_start_matches('/');
        if !trimmed.contains(ANCHOR_PLACEHOLDER) {
            return Err(DomainError::InvalidResourcePath(format!(
                "{trimmed} has no {ANCHOR_PLACEHOLDER} placeholder"
            )));
        }
        let key = key.into();
        if key.is_empty() {
            return Err(DomainError::InvalidResourcePath(
                "anchor key must not be empty".to_string(),
            ));
        }
        Ok(Self {
            template: trimmed.to_string(),
            anchor: Some(Anchor { object, key }),
        })
    }

    /// Appends a segment (`lists` + `items` -> `lists/items`)
    pub fn join(&self, segment: &str) -> Self {
        let segment = segment.trim_matches('/');
        Self {
            template: format!("{}/{}", self.template, segment),
            anchor: self.anchor.clone(),
        }
    }

    /// The raw template, placeholder included
    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn anchor(&self) -> Option<&Anchor> {
        self.anchor.as_ref()
    }

    pub fn is_deferred(&self) -> bool {
        self.anchor.is_some()
    }

    /// Fills the placeholder with the anchor's key value
    ///
    /// Concrete paths are returned unchanged.
    pub fn resolve(&self, key_value: &str) -> String {
        if self.anchor.is_some() {
            self.template
                .replace(ANCHOR_PLACEHOLDER, &escape_odata_literal(key_value))
        } else {
            self.template.clone()
        }
    }
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.anchor {
            Some(anchor) => write!(f, "{} [{}={}]", self.template, anchor.key, anchor.object),
            None => write!(f, "{}", self.template),
        }
    }
}

impl FromStr for ResourcePath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for ResourcePath {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Escapes a value for use inside an OData string literal (`'it''s'`)
pub fn escape_odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}
