//! sharekit Core - deferred-batch engine for SharePoint Online
//!
//! This crate contains the hexagonal core of the client:
//! - **Domain types** - `ResourcePath`, `PropertySelector`, `PropertyBag`,
//!   `RequestDescriptor`, `Batch`, `MaterializedObject`
//! - **Engine** - `Context` (implicit/explicit batches, execution rounds),
//!   the object graph and the result materializer
//! - **Object model** - list, list item and app catalog operations built on
//!   top of the engine
//! - **Port definitions** - `IBatchTransport`, implemented by adapter crates
//!
//! # Architecture
//!
//! The domain module has no I/O. The engine talks to the remote service only
//! through the transport port, so every operation can be exercised against an
//! in-memory transport in tests.

pub mod config;
pub mod domain;
pub mod engine;
pub mod model;
pub mod ports;

pub use engine::{BatchOutcome, Context, ContextFactory, RequestHandle, RequestResult};
