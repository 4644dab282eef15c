//! Domain entities for the batch engine
//!
//! This module contains the core types shared by the engine, the object model
//! and transport adapters:
//! - Newtypes for identifiers and validated resource paths
//! - Typed property values and bags
//! - Property selectors
//! - Request descriptors and batches
//! - Materialized objects
//! - Error types

pub mod batch;
pub mod errors;
pub mod newtypes;
pub mod object;
pub mod request;
pub mod selector;
pub mod value;

// Re-export commonly used types
pub use batch::{Batch, BatchState};
pub use errors::{BatchError, DomainError};
pub use newtypes::*;
pub use object::{EntityKind, MaterializedObject, ObjectCollection, ObjectState, ParentLink, Slot};
pub use request::{OperationKind, Payload, RequestDescriptor, RequestSpec, ResultBinding};
pub use selector::PropertySelector;
pub use value::{PropertyBag, PropertyValue};
