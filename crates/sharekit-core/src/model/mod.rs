//! Object model
//!
//! Typed operations built on the batch engine. Every operation comes in three
//! flavours:
//! - `foo` enqueues into a private batch and executes it immediately
//! - `foo_batch` enqueues into the context's implicit batch
//! - `foo_in` enqueues into a caller-owned explicit batch
//!
//! Deferred flavours return the graph object (or request handle) right away;
//! it is populated once the batch executes.

pub mod apps;
pub mod lists;

pub use apps::{AppManager, InstallOutcome};
pub use lists::{CamlQueryOptions, ListTemplateType, RenderListDataOptions, RenderOptions};

use crate::domain::batch::Batch;
use crate::domain::errors::BatchError;
use crate::domain::newtypes::ObjectId;
use crate::engine::context::{Context, RequestHandle, RequestResult};

/// Rejects blank identifying arguments before anything is enqueued
pub(crate) fn require<'a>(value: &'a str, what: &str) -> Result<&'a str, BatchError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(BatchError::invalid(format!("{what} must not be empty")))
    } else {
        Ok(trimmed)
    }
}

impl Context {
    /// Executes a private batch built by an immediate operation
    ///
    /// Results of a private batch are not kept.
    pub(crate) async fn run_private(&mut self, mut batch: Batch) -> Result<(), BatchError> {
        let outcome = self.execute_batch(&mut batch).await;
        self.forget_results(batch.id());
        outcome.map(|_| ())
    }

    /// Executes a private batch and returns the result of `handle`
    pub(crate) async fn run_private_for(
        &mut self,
        mut batch: Batch,
        handle: &RequestHandle,
    ) -> Result<RequestResult, BatchError> {
        let outcome = self.execute_batch(&mut batch).await;
        let result = self.take_result(handle);
        self.forget_results(batch.id());
        outcome?;
        result.ok_or_else(|| BatchError::MalformedResponse {
            request_id: handle.request_id,
            reason: "no response was recorded".to_string(),
        })
    }

    /// Executes a private lookup batch, mapping 404 to `None`
    pub(crate) async fn run_lookup(
        &mut self,
        batch: Batch,
        object: ObjectId,
    ) -> Result<Option<ObjectId>, BatchError> {
        match self.run_private(batch).await {
            Ok(()) => Ok(Some(object)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Result of a request that must have run
    pub(crate) fn require_result(&self, handle: &RequestHandle) -> Result<&RequestResult, BatchError> {
        self.result(handle)
            .ok_or_else(|| BatchError::MalformedResponse {
                request_id: handle.request_id,
                reason: "no response was recorded".to_string(),
            })
    }
}
