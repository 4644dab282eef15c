//! Batch transport port (driven/secondary port)
//!
//! The engine hands a transport fully resolved requests: deferred paths have
//! already been filled in with server-assigned keys. A transport may send
//! them one by one or pack them into a single wire-level batch, but it must
//! answer in request order.
//!
//! ## Design Notes
//!
//! - Faults are per request so the engine can apply the successful prefix of
//!   a batch and report the first failure.
//! - Uses `#[async_trait]` for async trait methods.

use thiserror::Error;

use crate::domain::newtypes::RequestId;
use crate::domain::request::{OperationKind, Payload};
use crate::domain::selector::PropertySelector;
use crate::domain::value::PropertyBag;

// ============================================================================
// Wire DTOs
// ============================================================================

/// A request ready to be sent
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Copied into the matching [`TransportResponse`]
    pub correlation_id: RequestId,
    pub kind: OperationKind,
    /// Site-relative path with every placeholder resolved
    pub path: String,
    pub selector: PropertySelector,
    pub payload: Payload,
}

impl TransportRequest {
    /// True when the body is raw bytes rather than JSON
    pub fn is_binary(&self) -> bool {
        matches!(self.payload, Payload::Binary(_))
    }
}

/// A successful response
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub correlation_id: RequestId,
    pub status: u16,
    /// Parsed body; empty for `204 No Content`
    pub body: PropertyBag,
}

impl TransportResponse {
    pub fn new(correlation_id: RequestId, status: u16, body: PropertyBag) -> Self {
        Self {
            correlation_id,
            status,
            body,
        }
    }
}

/// A failed request
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportFault {
    /// HTTP status, when the service answered at all
    pub status: Option<u16>,
    pub message: String,
}

impl TransportFault {
    /// Fault reported by the remote service
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Fault that never reached the remote service
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

// ============================================================================
// IBatchTransport trait
// ============================================================================

/// Port trait for delivering requests to the remote service
///
/// ## Implementation Notes
///
/// - `send_batch` returns at most one entry per request, in request order.
/// - A transport may stop after the first fault; the engine treats a shorter
///   result ending in a fault as "later requests not sent".
/// - Returning more entries than requests, or fewer without a fault, is a
///   protocol violation the engine reports as a count mismatch.
#[async_trait::async_trait]
pub trait IBatchTransport: Send + Sync {
    /// Sends a single request
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportFault>;

    /// Sends an ordered run of requests
    ///
    /// The default sends them one at a time and stops after the first fault.
    async fn send_batch(
        &self,
        requests: &[TransportRequest],
    ) -> Vec<Result<TransportResponse, TransportFault>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let result = self.send(request).await;
            let failed = result.is_err();
            results.push(result);
            if failed {
                break;
            }
        }
        results
    }
}
