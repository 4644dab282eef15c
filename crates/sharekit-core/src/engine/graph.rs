//! Object graph owned by a context
//!
//! Objects live in an arena keyed by [`ObjectId`]. Parents reference children
//! by id (named collections and named nested objects) and children keep a
//! [`ParentLink`] back to their owner, so no reference cycles exist.

use std::collections::HashMap;

use crate::domain::errors::BatchError;
use crate::domain::newtypes::ObjectId;
use crate::domain::object::{EntityKind, MaterializedObject, ParentLink, Slot};
use crate::domain::value::PropertyValue;

/// Arena of materialized objects rooted at the site's web
#[derive(Debug)]
pub struct ObjectGraph {
    objects: HashMap<ObjectId, MaterializedObject>,
    next_id: u64,
    root: ObjectId,
}

impl ObjectGraph {
    pub fn new() -> Self {
        let root = ObjectId::new(1);
        let mut objects = HashMap::new();
        objects.insert(root, MaterializedObject::new(root, EntityKind::Web, None));
        Self {
            objects,
            next_id: 2,
            root,
        }
    }

    /// The web object every path is relative to
    pub fn root(&self) -> ObjectId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn get(&self, id: ObjectId) -> Result<&MaterializedObject, BatchError> {
        self.objects.get(&id).ok_or(BatchError::UnknownObject(id))
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Result<&mut MaterializedObject, BatchError> {
        self.objects.get_mut(&id).ok_or(BatchError::UnknownObject(id))
    }

    /// Creates an object that is linked to its parent but not yet a member of
    /// the parent's collection
    ///
    /// Add placeholders start out this way and are attached once the server
    /// confirms them.
    pub fn create_detached(&mut self, kind: EntityKind, parent: Option<ParentLink>) -> ObjectId {
        let id = ObjectId::new(self.next_id);
        self.next_id += 1;
        self.objects
            .insert(id, MaterializedObject::new(id, kind, parent));
        id
    }

    /// Returns the named nested object of `owner`, creating it if needed
    pub fn child_object(&mut self, owner: ObjectId, name: &str) -> Result<ObjectId, BatchError> {
        let parent = self.get(owner)?;
        parent.ensure_live()?;
        if let Some(existing) = parent.raw_child(name) {
            return Ok(existing);
        }
        let id = self.create_detached(
            EntityKind::for_child(name),
            Some(ParentLink::child(owner, name)),
        );
        self.get_mut(owner)?.set_child(name, id);
        Ok(id)
    }

    /// Adds a detached object to its parent's collection
    ///
    /// No-op for nested objects and objects without a parent.
    pub fn attach(&mut self, id: ObjectId) -> Result<(), BatchError> {
        let link = self.get(id)?.parent().cloned();
        if let Some(ParentLink {
            object,
            slot: Slot::Collection(name),
        }) = link
        {
            self.get_mut(object)?.collection_mut(&name).push(id);
        }
        Ok(())
    }

    /// Removes `id` from its owning collection and marks it deleted
    pub fn delete(&mut self, id: ObjectId) -> Result<(), BatchError> {
        let link = self.get(id)?.parent().cloned();
        if let Some(ParentLink {
            object,
            slot: Slot::Collection(name),
        }) = link
        {
            if let Ok(owner) = self.get_mut(object) {
                owner.collection_mut(&name).remove(id);
            }
        }
        self.get_mut(id)?.mark_deleted()
    }

    /// Live members of `owner`'s named collection
    pub fn members(&self, owner: ObjectId, collection: &str) -> Result<Vec<ObjectId>, BatchError> {
        let parent = self.get(owner)?;
        parent.ensure_live()?;
        Ok(parent
            .raw_collection(collection)
            .map(|c| {
                c.members()
                    .iter()
                    .copied()
                    .filter(|m| self.objects.get(m).is_some_and(|o| !o.is_deleted()))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Number of live members materialized into a collection
    pub fn count(&self, owner: ObjectId, collection: &str) -> Result<usize, BatchError> {
        Ok(self.members(owner, collection)?.len())
    }

    /// Finds a collection member whose `key` property equals `value`
    pub fn find_member(
        &self,
        owner: ObjectId,
        collection: &str,
        key: &str,
        value: &PropertyValue,
    ) -> Result<Option<ObjectId>, BatchError> {
        let wanted = value.to_key_string();
        Ok(self.members(owner, collection)?.into_iter().find(|m| {
            self.objects
                .get(m)
                .and_then(|o| o.raw_property(key))
                .is_some_and(|v| v == value || (wanted.is_some() && v.to_key_string() == wanted))
        }))
    }

    /// Text form of an object's key property, if materialized
    pub fn key_value(&self, id: ObjectId, key: &str) -> Result<Option<String>, BatchError> {
        let object = self.get(id)?;
        object.ensure_live()?;
        Ok(object
            .raw_property(key)
            .and_then(PropertyValue::to_key_string))
    }
}

impl Default for ObjectGraph {
    fn default() -> Self {
        Self::new()
    }
}
