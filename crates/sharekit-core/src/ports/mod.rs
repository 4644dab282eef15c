//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the boundaries the engine depends on; their implementations
//! live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IBatchTransport`] - Sends resolved requests to the remote service and
//!   returns one response (or fault) per request, in order

pub mod transport;

pub use transport::{IBatchTransport, TransportFault, TransportRequest, TransportResponse};
