//! Materialized objects
//!
//! A [`MaterializedObject`] is the in-memory view of one remote entity. Its
//! lifecycle is `Unrequested -> Requested -> (Requested | Deleted)`; the set
//! of populated properties only grows until the object is deleted.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{BatchError, DomainError};
use super::newtypes::ObjectId;
use super::value::{PropertyBag, PropertyValue};

/// Lifecycle state of a materialized object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectState {
    /// Created locally, no response applied yet
    #[default]
    Unrequested,
    /// At least one successful Get/Add response was applied
    Requested,
    /// Removed remotely; terminal
    Deleted,
}

impl ObjectState {
    /// Validates a lifecycle transition
    pub fn transition(self, to: ObjectState) -> Result<ObjectState, DomainError> {
        match (self, to) {
            (ObjectState::Deleted, _) => Err(DomainError::InvalidState {
                from: self.to_string(),
                to: to.to_string(),
            }),
            (ObjectState::Requested, ObjectState::Unrequested) => Err(DomainError::InvalidState {
                from: self.to_string(),
                to: to.to_string(),
            }),
            (_, to) => Ok(to),
        }
    }
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectState::Unrequested => write!(f, "unrequested"),
            ObjectState::Requested => write!(f, "requested"),
            ObjectState::Deleted => write!(f, "deleted"),
        }
    }
}

/// Entity type of an object, derived from where it lives in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Web,
    List,
    ListItem,
    ContentType,
    FieldLink,
    Field,
    Folder,
    IrmSettings,
    AppCatalog,
    App,
    Other,
}

impl EntityKind {
    /// Kind of the members of a named collection
    pub fn for_collection(name: &str) -> Self {
        match name {
            "Lists" => EntityKind::List,
            "Items" => EntityKind::ListItem,
            "ContentTypes" => EntityKind::ContentType,
            "FieldLinks" => EntityKind::FieldLink,
            "Fields" => EntityKind::Field,
            "Folders" => EntityKind::Folder,
            "AvailableApps" => EntityKind::App,
            _ => EntityKind::Other,
        }
    }

    /// Kind of a named nested single object
    pub fn for_child(name: &str) -> Self {
        match name {
            "RootFolder" => EntityKind::Folder,
            "InformationRightsManagementSettings" => EntityKind::IrmSettings,
            "SiteCollectionAppCatalog" => EntityKind::AppCatalog,
            _ => EntityKind::Other,
        }
    }
}

/// Where an object hangs off its parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Member of the parent's named collection
    Collection(String),
    /// The parent's named nested object
    Child(String),
}

/// Back-link from an object to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentLink {
    pub object: ObjectId,
    pub slot: Slot,
}

impl ParentLink {
    pub fn collection(object: ObjectId, name: impl Into<String>) -> Self {
        Self {
            object,
            slot: Slot::Collection(name.into()),
        }
    }

    pub fn child(object: ObjectId, name: impl Into<String>) -> Self {
        Self {
            object,
            slot: Slot::Child(name.into()),
        }
    }
}

/// A named collection of child objects
#[derive(Debug, Clone, Default)]
pub struct ObjectCollection {
    requested: bool,
    members: Vec<ObjectId>,
}

impl ObjectCollection {
    /// True once a response populated this collection
    pub fn is_requested(&self) -> bool {
        self.requested
    }

    /// Live members in materialization order
    pub fn members(&self) -> &[ObjectId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn mark_requested(&mut self) {
        self.requested = true;
    }

    pub(crate) fn push(&mut self, id: ObjectId) {
        if !self.members.contains(&id) {
            self.members.push(id);
        }
    }

    pub(crate) fn remove(&mut self, id: ObjectId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| *m != id);
        before != self.members.len()
    }
}

/// In-memory representation of a remote entity
#[derive(Debug, Clone)]
pub struct MaterializedObject {
    id: ObjectId,
    kind: EntityKind,
    state: ObjectState,
    properties: PropertyBag,
    parent: Option<ParentLink>,
    collections: BTreeMap<String, ObjectCollection>,
    children: BTreeMap<String, ObjectId>,
}

impl MaterializedObject {
    pub(crate) fn new(id: ObjectId, kind: EntityKind, parent: Option<ParentLink>) -> Self {
        Self {
            id,
            kind,
            state: ObjectState::Unrequested,
            properties: PropertyBag::new(),
            parent,
            collections: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn state(&self) -> ObjectState {
        self.state
    }

    pub fn parent(&self) -> Option<&ParentLink> {
        self.parent.as_ref()
    }

    /// True once a response has populated this object (and it is not deleted)
    pub fn is_requested(&self) -> bool {
        self.state == ObjectState::Requested
    }

    pub fn is_deleted(&self) -> bool {
        self.state == ObjectState::Deleted
    }

    /// Fails with [`BatchError::ObjectDeleted`] on deleted objects
    pub fn ensure_live(&self) -> Result<(), BatchError> {
        if self.is_deleted() {
            Err(BatchError::ObjectDeleted(self.id))
        } else {
            Ok(())
        }
    }

    /// Reads a materialized property; never triggers a fetch
    pub fn property(&self, name: &str) -> Result<Option<&PropertyValue>, BatchError> {
        self.ensure_live()?;
        Ok(self.properties.get(name))
    }

    pub fn text(&self, name: &str) -> Result<Option<&str>, BatchError> {
        Ok(self.property(name)?.and_then(PropertyValue::as_str))
    }

    pub fn guid(&self, name: &str) -> Result<Option<Uuid>, BatchError> {
        Ok(self.property(name)?.and_then(PropertyValue::as_guid))
    }

    pub fn int(&self, name: &str) -> Result<Option<i64>, BatchError> {
        Ok(self.property(name)?.and_then(PropertyValue::as_i64))
    }

    pub fn bool(&self, name: &str) -> Result<Option<bool>, BatchError> {
        Ok(self.property(name)?.and_then(PropertyValue::as_bool))
    }

    /// All scalar properties populated so far
    pub fn properties(&self) -> Result<&PropertyBag, BatchError> {
        self.ensure_live()?;
        Ok(&self.properties)
    }

    /// Whether `name` has been populated, as a property, a requested
    /// collection, or a requested nested object
    ///
    /// Always false for deleted objects.
    pub fn is_property_available(&self, name: &str) -> bool {
        if self.is_deleted() {
            return false;
        }
        self.properties.contains(name)
            || self
                .collections
                .get(name)
                .is_some_and(ObjectCollection::is_requested)
            || self.children.contains_key(name)
    }

    pub fn collection(&self, name: &str) -> Result<Option<&ObjectCollection>, BatchError> {
        self.ensure_live()?;
        Ok(self.collections.get(name))
    }

    pub fn child(&self, name: &str) -> Result<Option<ObjectId>, BatchError> {
        self.ensure_live()?;
        Ok(self.children.get(name).copied())
    }

    /// Local property assignment
    pub fn set_property(
        &mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Result<(), BatchError> {
        self.ensure_live()?;
        self.properties.insert(name, value);
        Ok(())
    }

    pub(crate) fn merge_properties(&mut self, bag: PropertyBag) {
        self.properties.merge(bag);
    }

    pub(crate) fn mark_requested(&mut self) -> Result<(), BatchError> {
        self.state = self
            .state
            .transition(ObjectState::Requested)
            .map_err(|_| BatchError::ObjectDeleted(self.id))?;
        Ok(())
    }

    pub(crate) fn mark_deleted(&mut self) -> Result<(), BatchError> {
        self.state = self
            .state
            .transition(ObjectState::Deleted)
            .map_err(|_| BatchError::ObjectDeleted(self.id))?;
        Ok(())
    }

    pub(crate) fn collection_mut(&mut self, name: &str) -> &mut ObjectCollection {
        self.collections.entry(name.to_string()).or_default()
    }

    pub(crate) fn set_child(&mut self, name: &str, id: ObjectId) {
        self.children.insert(name.to_string(), id);
    }

    pub(crate) fn raw_child(&self, name: &str) -> Option<ObjectId> {
        self.children.get(name).copied()
    }

    pub(crate) fn raw_collection(&self, name: &str) -> Option<&ObjectCollection> {
        self.collections.get(name)
    }

    pub(crate) fn raw_property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}
