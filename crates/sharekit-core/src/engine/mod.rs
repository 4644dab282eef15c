//! Batch execution engine
//!
//! - [`Context`] - session owning the object graph and the implicit batch
//! - [`ObjectGraph`] - arena of materialized objects
//! - [`materializer`] - applies responses to the graph

pub mod context;
pub mod graph;
pub mod materializer;

pub use context::{BatchOutcome, Context, ContextFactory, RequestHandle, RequestResult};
pub use graph::ObjectGraph;
