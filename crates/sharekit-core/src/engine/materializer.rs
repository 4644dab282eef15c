//! Result materializer
//!
//! Applies a successful response to the object graph according to the
//! descriptor's [`ResultBinding`]. Properties are only ever added or
//! overwritten, so an object's populated set grows monotonically until the
//! object is deleted.

use tracing::trace;

use super::graph::ObjectGraph;
use crate::domain::errors::BatchError;
use crate::domain::newtypes::ObjectId;
use crate::domain::object::{EntityKind, ParentLink};
use crate::domain::request::{OperationKind, Payload, RequestDescriptor, ResultBinding};
use crate::domain::value::{PropertyBag, PropertyValue};

/// Properties used to recognise the same entity across responses, in order
/// of preference
pub const MERGE_KEYS: [&str; 3] = ["Id", "UniqueId", "ID"];

/// Applies `body` to the descriptor's target
///
/// Returns the objects the response materialized: the target for merges and
/// removals, the members for collection bindings, nothing for discards.
pub fn apply(
    graph: &mut ObjectGraph,
    descriptor: &RequestDescriptor,
    body: &PropertyBag,
) -> Result<Vec<ObjectId>, BatchError> {
    let target = descriptor.target();
    match descriptor.binding() {
        ResultBinding::Merge => {
            // Updates answer 204; the sent values become the materialized state
            if let (OperationKind::Update, Payload::Properties(changes)) =
                (descriptor.kind(), descriptor.payload())
            {
                merge_into(graph, target, changes.clone())?;
            }
            merge_into(graph, target, body.clone())?;
            // Only a created entity joins its parent collection
            if *descriptor.kind() == OperationKind::Add {
                graph.attach(target)?;
            }
            Ok(vec![target])
        }
        ResultBinding::Collection(name) => {
            let items = rows(descriptor, body, "value", name)?;
            graph.get_mut(target)?.mark_requested()?;
            merge_collection(graph, target, name, items)
        }
        ResultBinding::Rows(name) => {
            let items = rows(descriptor, body, "Row", name)?;
            graph.get_mut(target)?.mark_requested()?;
            merge_collection(graph, target, name, items)
        }
        ResultBinding::Remove => {
            graph.delete(target)?;
            Ok(vec![target])
        }
        ResultBinding::Discard => Ok(Vec::new()),
    }
}

fn rows(
    descriptor: &RequestDescriptor,
    body: &PropertyBag,
    field: &str,
    collection: &str,
) -> Result<Vec<PropertyBag>, BatchError> {
    match body.get(field) {
        Some(PropertyValue::Collection(items)) => Ok(items.clone()),
        Some(PropertyValue::List(items)) if items.is_empty() => Ok(Vec::new()),
        None if body.is_empty() => Ok(Vec::new()),
        _ => Err(BatchError::MalformedResponse {
            request_id: descriptor.id(),
            reason: format!("expected a '{field}' array for collection {collection}"),
        }),
    }
}

/// Unions `bag` into `id` and marks it requested
///
/// Nested objects become child objects and nested arrays become collections
/// of child objects.
pub fn merge_into(graph: &mut ObjectGraph, id: ObjectId, bag: PropertyBag) -> Result<(), BatchError> {
    let mut scalars = PropertyBag::new();
    for (name, value) in bag {
        match value {
            PropertyValue::Object(inner) => {
                let child = graph.child_object(id, &name)?;
                merge_into(graph, child, inner)?;
            }
            PropertyValue::Collection(items) => {
                merge_collection(graph, id, &name, items)?;
            }
            scalar => {
                scalars.insert(name, scalar);
            }
        }
    }
    let object = graph.get_mut(id)?;
    object.mark_requested()?;
    object.merge_properties(scalars);
    trace!(object = %id, "Merged response properties");
    Ok(())
}

/// Merges response rows into `owner`'s named collection
///
/// Rows carrying a known key update the existing member; others become new
/// members.
pub fn merge_collection(
    graph: &mut ObjectGraph,
    owner: ObjectId,
    name: &str,
    items: Vec<PropertyBag>,
) -> Result<Vec<ObjectId>, BatchError> {
    graph.get_mut(owner)?.collection_mut(name).mark_requested();

    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        let existing = match merge_key(&item) {
            Some((key, value)) => graph.find_member(owner, name, key, value)?,
            None => None,
        };
        let member = match existing {
            Some(member) => member,
            None => {
                let member = graph.create_detached(
                    EntityKind::for_collection(name),
                    Some(ParentLink::collection(owner, name)),
                );
                graph.attach(member)?;
                member
            }
        };
        merge_into(graph, member, item)?;
        ids.push(member);
    }
    Ok(ids)
}

fn merge_key(item: &PropertyBag) -> Option<(&'static str, &PropertyValue)> {
    MERGE_KEYS.iter().find_map(|key| {
        item.get(key)
            .filter(|v| v.to_key_string().is_some())
            .map(|v| (*key, v))
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::batch::Batch;
    use crate::domain::newtypes::ResourcePath;
    use crate::domain::request::RequestSpec;

    fn descriptor(spec: RequestSpec) -> RequestDescriptor {
        let mut batch = Batch::new();
        batch.enqueue(spec).unwrap();
        batch.seal().unwrap().remove(0)
    }

    fn path() -> ResourcePath {
        ResourcePath::new("_api/web").unwrap()
    }

    #[test]
    fn test_merge_is_monotonic() {
        let mut graph = ObjectGraph::new();
        let web = graph.root();

        let get = descriptor(RequestSpec::get(path(), web));
        apply(&mut graph, &get, &PropertyBag::new().with("A", 1).with("B", 2)).unwrap();
        apply(&mut graph, &get, &PropertyBag::new().with("C", 3)).unwrap();

        let object = graph.get(web).unwrap();
        assert!(object.is_requested());
        for name in ["A", "B", "C"] {
            assert!(object.is_property_available(name), "{name} missing");
        }
    }

    #[test]
    fn test_nested_values_become_children() {
        let mut graph = ObjectGraph::new();
        let web = graph.root();
        let body = PropertyBag::from_json(&json!({
            "Title": "Docs",
            "RootFolder": { "Name": "Shared Documents" },
            "ContentTypes": [
                { "Id": "0x0101", "Name": "Document", "FieldLinks": [ { "Id": "f1" } ] },
                { "Id": "0x0120", "Name": "Folder" }
            ]
        }));
        let list = graph.create_detached(EntityKind::List, Some(ParentLink::collection(web, "Lists")));
        merge_into(&mut graph, list, body).unwrap();

        let object = graph.get(list).unwrap();
        assert!(object.is_property_available("RootFolder"));
        assert!(object.is_property_available("ContentTypes"));
        let folder = object.child("RootFolder").unwrap().unwrap();
        assert_eq!(graph.get(folder).unwrap().text("Name").unwrap(), Some("Shared Documents"));

        let content_types = graph.members(list, "ContentTypes").unwrap();
        assert_eq!(content_types.len(), 2);
        assert_eq!(graph.count(content_types[0], "FieldLinks").unwrap(), 1);
        assert_eq!(graph.get(content_types[0]).unwrap().kind(), EntityKind::ContentType);
    }

    #[test]
    fn test_collection_merges_by_key() {
        let mut graph = ObjectGraph::new();
        let web = graph.root();
        let list = graph.create_detached(EntityKind::List, None);
        let rows = |n: i64| (1..=n).map(|i| PropertyBag::new().with("ID", i)).collect::<Vec<_>>();

        merge_collection(&mut graph, list, "Items", rows(5)).unwrap();
        let ids = merge_collection(&mut graph, list, "Items", rows(10)).unwrap();

        assert_eq!(ids.len(), 10);
        assert_eq!(graph.count(list, "Items").unwrap(), 10);
        assert_eq!(graph.count(web, "Lists").unwrap(), 0);
    }

    #[test]
    fn test_collection_binding_requires_value_array() {
        let mut graph = ObjectGraph::new();
        let web = graph.root();
        let d = descriptor(
            RequestSpec::custom("GetItems", path(), web)
                .with_payload(Payload::Properties(PropertyBag::new().with("query", "x")))
                .with_binding(ResultBinding::Collection("Items".into())),
        );

        let err = apply(&mut graph, &d, &PropertyBag::new().with("value", "nope")).unwrap_err();
        assert!(matches!(err, BatchError::MalformedResponse { .. }));

        let ok = apply(&mut graph, &d, &PropertyBag::from_json(&json!({ "value": [] }))).unwrap();
        assert!(ok.is_empty());
        assert!(graph.get(web).unwrap().is_property_available("Items"));
    }

    #[test]
    fn test_add_attaches_and_remove_detaches() {
        let mut graph = ObjectGraph::new();
        let web = graph.root();
        let list = graph.create_detached(EntityKind::List, Some(ParentLink::collection(web, "Lists")));

        let add = descriptor(RequestSpec::add(
            ResourcePath::new("_api/web/lists").unwrap(),
            list,
            Payload::Properties(PropertyBag::new().with("Title", "Tasks")),
        ));
        apply(&mut graph, &add, &PropertyBag::new().with("Id", uuid::Uuid::new_v4())).unwrap();
        assert_eq!(graph.members(web, "Lists").unwrap(), vec![list]);

        let delete = descriptor(RequestSpec::delete(ResourcePath::new("_api/web/lists").unwrap(), list));
        apply(&mut graph, &delete, &PropertyBag::new()).unwrap();
        assert_eq!(graph.count(web, "Lists").unwrap(), 0);
        assert!(graph.get(list).unwrap().property("Id").is_err());
    }

    #[test]
    fn test_update_materializes_sent_values() {
        let mut graph = ObjectGraph::new();
        let web = graph.root();
        let d = descriptor(RequestSpec::update(
            path(),
            web,
            PropertyBag::new().with("IrmEnabled", true),
        ));
        apply(&mut graph, &d, &PropertyBag::new()).unwrap();
        assert_eq!(graph.get(web).unwrap().bool("IrmEnabled").unwrap(), Some(true));
    }

    #[test]
    fn test_update_does_not_attach_to_parent() {
        let mut graph = ObjectGraph::new();
        let web = graph.root();
        let list = graph.create_detached(EntityKind::List, Some(ParentLink::collection(web, "Lists")));
        let d = descriptor(RequestSpec::update(
            path(),
            list,
            PropertyBag::new().with("Description", "updated"),
        ));

        apply(&mut graph, &d, &PropertyBag::new()).unwrap();

        assert_eq!(graph.get(list).unwrap().text("Description").unwrap(), Some("updated"));
        assert_eq!(graph.count(web, "Lists").unwrap(), 0);
    }

    #[test]
    fn test_collection_binding_marks_owner_requested() {
        let mut graph = ObjectGraph::new();
        let list = graph.create_detached(EntityKind::List, None);
        let d = descriptor(
            RequestSpec::get(path(), list).with_binding(ResultBinding::Collection("Items".into())),
        );

        apply(&mut graph, &d, &PropertyBag::from_json(&json!({ "value": [ { "ID": 1 } ] }))).unwrap();

        assert!(graph.get(list).unwrap().is_requested());
        assert_eq!(graph.count(list, "Items").unwrap(), 1);
    }

    #[test]
    fn test_rows_binding_reads_row_array() {
        let mut graph = ObjectGraph::new();
        let list = graph.create_detached(EntityKind::List, None);
        let d = descriptor(
            RequestSpec::custom("RenderListDataAsStream", path(), list)
                .with_binding(ResultBinding::Rows("Items".into())),
        );
        let body = PropertyBag::from_json(&json!({
            "Row": [ { "ID": "1", "Title": "a" }, { "ID": "2", "Title": "b" } ],
            "FirstRow": 1,
            "LastRow": 2,
            "RowLimit": 5
        }));
        assert_eq!(apply(&mut graph, &d, &body).unwrap().len(), 2);
        assert_eq!(apply(&mut graph, &d, &body).unwrap().len(), 2);
        assert_eq!(graph.count(list, "Items").unwrap(), 2);
        assert!(graph.get(list).unwrap().is_requested());
    }

    #[test]
    fn test_discard_leaves_graph_untouched() {
        let mut graph = ObjectGraph::new();
        let web = graph.root();
        let d = descriptor(RequestSpec::custom("Recycle", path(), web));
        assert!(apply(&mut graph, &d, &PropertyBag::new().with("value", 1)).unwrap().is_empty());
        assert!(!graph.get(web).unwrap().is_requested());
    }
}
