//! Request descriptors
//!
//! A [`RequestDescriptor`] is one pending operation against a remote
//! resource. It is created by [`Batch::enqueue`](super::batch::Batch::enqueue)
//! from a [`RequestSpec`], is immutable afterwards, and is consumed exactly
//! once when its batch executes.

use std::fmt;

use super::newtypes::{ObjectId, RequestId, ResourcePath};
use super::selector::PropertySelector;
use super::value::PropertyBag;

/// What a request does to its resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    Get,
    Add,
    Update,
    Delete,
    /// Service-specific action (`Recycle`, `GetItems`, `Deploy`, ...)
    Custom(String),
}

impl OperationKind {
    /// True for operations that change remote state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, OperationKind::Get)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Get => write!(f, "get"),
            OperationKind::Add => write!(f, "add"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
            OperationKind::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// Request body
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    #[default]
    None,
    /// JSON object body
    Properties(PropertyBag),
    /// Raw file content (app packages)
    Binary(Vec<u8>),
}

impl Payload {
    pub fn is_none(&self) -> bool {
        matches!(self, Payload::None)
    }

    /// True when the payload carries no data at all
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::None => true,
            Payload::Properties(bag) => bag.is_empty(),
            Payload::Binary(bytes) => bytes.is_empty(),
        }
    }
}

/// How a successful response is applied to the object graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultBinding {
    /// Union the response into the target object
    Merge,
    /// The response's `value` array merges into the target's named collection
    Collection(String),
    /// The response's `Row` array (list data streams) merges into the
    /// target's named collection; the rest of the body is kept as the result
    Rows(String),
    /// The target is removed from its parent collection and marked deleted
    Remove,
    /// Nothing is materialized; the body is only kept as the request result
    Discard,
}

impl ResultBinding {
    /// Default binding for an operation kind
    pub fn for_kind(kind: &OperationKind) -> Self {
        match kind {
            OperationKind::Get | OperationKind::Add | OperationKind::Update => ResultBinding::Merge,
            OperationKind::Delete => ResultBinding::Remove,
            OperationKind::Custom(_) => ResultBinding::Discard,
        }
    }
}

/// Everything needed to enqueue a request
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub path: ResourcePath,
    pub kind: OperationKind,
    pub selector: PropertySelector,
    pub payload: Payload,
    pub target: ObjectId,
    pub binding: ResultBinding,
}

impl RequestSpec {
    fn new(kind: OperationKind, path: ResourcePath, target: ObjectId) -> Self {
        Self {
            binding: ResultBinding::for_kind(&kind),
            path,
            kind,
            selector: PropertySelector::new(),
            payload: Payload::None,
            target,
        }
    }

    pub fn get(path: ResourcePath, target: ObjectId) -> Self {
        Self::new(OperationKind::Get, path, target)
    }

    pub fn add(path: ResourcePath, target: ObjectId, payload: Payload) -> Self {
        Self::new(OperationKind::Add, path, target).with_payload(payload)
    }

    pub fn update(path: ResourcePath, target: ObjectId, changes: PropertyBag) -> Self {
        Self::new(OperationKind::Update, path, target).with_payload(Payload::Properties(changes))
    }

    pub fn delete(path: ResourcePath, target: ObjectId) -> Self {
        Self::new(OperationKind::Delete, path, target)
    }

    pub fn custom(name: impl Into<String>, path: ResourcePath, target: ObjectId) -> Self {
        Self::new(OperationKind::Custom(name.into()), path, target)
    }

    #[must_use]
    pub fn with_selector(mut self, selector: PropertySelector) -> Self {
        self.selector = selector;
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_binding(mut self, binding: ResultBinding) -> Self {
        self.binding = binding;
        self
    }
}

/// One enqueued operation
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    id: RequestId,
    path: ResourcePath,
    kind: OperationKind,
    selector: PropertySelector,
    payload: Payload,
    target: ObjectId,
    binding: ResultBinding,
}

impl RequestDescriptor {
    pub(crate) fn from_spec(id: RequestId, spec: RequestSpec) -> Self {
        Self {
            id,
            path: spec.path,
            kind: spec.kind,
            selector: spec.selector,
            payload: spec.payload,
            target: spec.target,
            binding: spec.binding,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn selector(&self) -> &PropertySelector {
        &self.selector
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn target(&self) -> ObjectId {
        self.target
    }

    pub fn binding(&self) -> &ResultBinding {
        &self.binding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bindings() {
        assert_eq!(ResultBinding::for_kind(&OperationKind::Get), ResultBinding::Merge);
        assert_eq!(ResultBinding::for_kind(&OperationKind::Add), ResultBinding::Merge);
        assert_eq!(ResultBinding::for_kind(&OperationKind::Delete), ResultBinding::Remove);
        assert_eq!(
            ResultBinding::for_kind(&OperationKind::Custom("Recycle".into())),
            ResultBinding::Discard
        );
    }

    #[test]
    fn test_spec_builders() {
        let path = ResourcePath::new("_api/web/lists").unwrap();
        let target = ObjectId::new(2);
        let spec = RequestSpec::custom("GetItems", path.clone(), target)
            .with_binding(ResultBinding::Collection("Items".into()));
        assert_eq!(spec.kind, OperationKind::Custom("GetItems".into()));
        assert_eq!(spec.binding, ResultBinding::Collection("Items".into()));

        let spec = RequestSpec::update(path, target, PropertyBag::new().with("Title", "x"));
        assert_eq!(spec.binding, ResultBinding::Merge);
        assert!(!spec.payload.is_empty());
    }

    #[test]
    fn test_payload_emptiness() {
        assert!(Payload::None.is_empty());
        assert!(Payload::Properties(PropertyBag::new()).is_empty());
        assert!(Payload::Binary(Vec::new()).is_empty());
        assert!(!Payload::Binary(vec![1]).is_empty());
        assert!(OperationKind::Delete.is_mutation());
        assert!(!OperationKind::Get.is_mutation());
    }
}
