//! sharekit REST - SharePoint Online transport
//!
//! Implements the core's [`IBatchTransport`](sharekit_core::ports::IBatchTransport)
//! port over the SharePoint REST API.
//!
//! ## Modules
//!
//! - [`client`] - Authenticated HTTP client with 429/503 retry
//! - [`rate_limit`] - Adaptive token buckets per request category
//! - [`translate`] - Descriptor to HTTP request mapping and body parsing
//! - [`multipart`] - `$batch` multipart/mixed encoding and decoding
//! - [`transport`] - The [`RestTransport`](transport::RestTransport) adapter

pub mod client;
pub mod multipart;
pub mod rate_limit;
pub mod transport;
pub mod translate;

use std::time::Duration;

use sharekit_core::ports::TransportFault;
use thiserror::Error;

pub use client::SharePointClient;
pub use transport::RestTransport;

/// Errors that can occur when talking to SharePoint
#[derive(Debug, Error)]
pub enum RestError {
    /// The access token is missing, invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller lacks permission for the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The addressed resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Still throttled after every retry
    #[error("Throttled, retry after {retry_after:?}")]
    Throttled {
        /// Last server-suggested delay
        retry_after: Duration,
    },

    /// Any other non-success status
    #[error("Request failed with status {status}: {message}")]
    Status {
        status: u16,
        message: String,
    },

    /// 5xx answer
    #[error("Server error {status}: {message}")]
    ServerError {
        status: u16,
        message: String,
    },

    /// The request never got an answer
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A `$batch` response did not match its request
    #[error("Batch error: {0}")]
    Batch(String),

    /// The transport could not be built from the configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RestError {
    /// Maps an HTTP error status to the matching variant
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => RestError::Unauthorized(message),
            403 => RestError::Forbidden(message),
            404 => RestError::NotFound(message),
            500..=599 => RestError::ServerError { status, message },
            _ => RestError::Status { status, message },
        }
    }

    /// HTTP status this error stands for, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::Unauthorized(_) => Some(401),
            RestError::Forbidden(_) => Some(403),
            RestError::NotFound(_) => Some(404),
            RestError::Throttled { .. } => Some(429),
            RestError::Status { status, .. } => Some(*status),
            RestError::ServerError { status, .. } => Some(*status),
            RestError::Network(e) => e.status().map(|s| s.as_u16()),
            RestError::InvalidResponse(_) | RestError::Batch(_) | RestError::Configuration(_) => None,
        }
    }
}

impl From<RestError> for TransportFault {
    fn from(err: RestError) -> Self {
        let message = err.to_string();
        match err.status() {
            Some(status) => TransportFault::new(status, message),
            None => TransportFault::network(message),
        }
    }
}
