//! Domain error types
//!
//! Two layers of errors live here:
//! - [`DomainError`] for values rejected at construction time (paths,
//!   selectors, identifiers)
//! - [`BatchError`] for everything the batch engine and the object model
//!   report to callers

use thiserror::Error;

use super::newtypes::{BatchId, ObjectId, RequestId};

/// Errors raised while constructing domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Resource path is empty or malformed
    #[error("Invalid resource path: {0}")]
    InvalidResourcePath(String),

    /// Property selector contains an empty or duplicated segment
    #[error("Invalid property selector: {0}")]
    InvalidSelector(String),

    /// A required identifying argument is missing
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },
}

/// Errors reported by the batch engine and the object model
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BatchError {
    /// Null/empty identifying input, rejected before any network activity
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The remote service rejected a request, or the transport failed
    #[error("Request {request_id} failed: {cause}")]
    RequestFailed {
        /// Descriptor whose response was a fault
        request_id: RequestId,
        /// HTTP status reported by the transport, if any
        status: Option<u16>,
        /// Fault message
        cause: String,
    },

    /// The batch was executed before
    #[error("Batch {0} has already been executed")]
    BatchAlreadyExecuted(BatchId),

    /// Use of an object after it was deleted
    #[error("Object {0} has been deleted")]
    ObjectDeleted(ObjectId),

    /// A deferred path points at an object whose key is still unknown
    #[error("Request {request_id} references {object} which has no '{key}' value")]
    UnresolvedReference {
        /// Descriptor carrying the deferred path
        request_id: RequestId,
        /// Anchor object
        object: ObjectId,
        /// Key property the path needs
        key: String,
    },

    /// The transport answered with a different number of responses
    #[error("Expected {expected} responses, received {received}")]
    ResponseCountMismatch {
        /// Number of requests sent
        expected: usize,
        /// Number of responses received
        received: usize,
    },

    /// A response could not be applied to its target
    #[error("Response for request {request_id} is malformed: {reason}")]
    MalformedResponse {
        /// Descriptor the response belongs to
        request_id: RequestId,
        /// What was wrong with it
        reason: String,
    },

    /// Handle does not belong to this context's object graph
    #[error("Unknown object {0}")]
    UnknownObject(ObjectId),

    /// App package could not be read from disk
    #[error("Package {path} could not be read: {reason}")]
    PackageUnreadable {
        /// Path given by the caller
        path: String,
        /// Underlying I/O error message
        reason: String,
    },

    /// The blocking variants could not start their runtime
    #[error("Blocking runtime unavailable: {0}")]
    Runtime(String),
}

impl BatchError {
    /// Returns true if the remote service answered 404 Not Found
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BatchError::RequestFailed {
                status: Some(404),
                ..
            }
        )
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        BatchError::InvalidArgument(message.into())
    }
}

impl From<DomainError> for BatchError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidArgument(msg) => BatchError::InvalidArgument(msg),
            other => BatchError::InvalidArgument(other.to_string()),
        }
    }
}
