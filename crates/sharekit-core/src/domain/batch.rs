//! Batches of pending requests
//!
//! A [`Batch`] is an ordered sequence of [`RequestDescriptor`]s. Insertion
//! order is execution order and response-correlation order. A batch moves
//! from `Pending` to `Executed` exactly once.

use serde::{Deserialize, Serialize};

use super::errors::BatchError;
use super::newtypes::{BatchId, RequestId};
use super::request::{OperationKind, Payload, RequestDescriptor, RequestSpec};

/// Lifecycle of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Accepting requests
    Pending,
    /// Handed to the transport; terminal
    Executed,
}

/// Ordered collection of requests executed together
#[derive(Debug)]
pub struct Batch {
    id: BatchId,
    descriptors: Vec<RequestDescriptor>,
    next_seq: u64,
    state: BatchState,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            id: BatchId::new(),
            descriptors: Vec::new(),
            next_seq: 1,
            state: BatchState::Pending,
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn is_executed(&self) -> bool {
        self.state == BatchState::Executed
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[RequestDescriptor] {
        &self.descriptors
    }

    /// Validates `spec` and appends it, returning its sequence number
    ///
    /// Validation happens here, before any network activity:
    /// - executed batches accept nothing
    /// - Add and Update need a non-empty payload
    /// - custom operations need a name
    pub fn enqueue(&mut self, spec: RequestSpec) -> Result<RequestId, BatchError> {
        if self.is_executed() {
            return Err(BatchError::BatchAlreadyExecuted(self.id));
        }

        match &spec.kind {
            OperationKind::Add | OperationKind::Update if spec.payload.is_empty() => {
                return Err(BatchError::invalid(format!(
                    "{} on {} requires a payload",
                    spec.kind, spec.path
                )));
            }
            OperationKind::Custom(name) if name.trim().is_empty() => {
                return Err(BatchError::invalid("custom operation name is empty"));
            }
            OperationKind::Get | OperationKind::Delete if !spec.payload.is_none() => {
                return Err(BatchError::invalid(format!(
                    "{} on {} does not take a payload",
                    spec.kind, spec.path
                )));
            }
            _ => {}
        }
        if let Payload::Properties(bag) = &spec.payload {
            if bag.names().any(str::is_empty) {
                return Err(BatchError::invalid("payload contains an empty property name"));
            }
        }

        let id = RequestId::new(self.next_seq);
        self.next_seq += 1;
        self.descriptors
            .push(RequestDescriptor::from_spec(id, spec));
        Ok(id)
    }

    /// Hands the descriptors to the executor and seals the batch
    pub(crate) fn seal(&mut self) -> Result<Vec<RequestDescriptor>, BatchError> {
        if self.is_executed() {
            return Err(BatchError::BatchAlreadyExecuted(self.id));
        }
        self.state = BatchState::Executed;
        Ok(std::mem::take(&mut self.descriptors))
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}
