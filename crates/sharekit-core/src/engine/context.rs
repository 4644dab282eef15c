//! Session context
//!
//! A [`Context`] owns the object graph, at most one implicit batch and the
//! results of every executed request. Explicit batches are created with
//! [`Context::new_batch`] and stay with the caller until they are handed to
//! [`Context::execute_batch`].
//!
//! ## Execution
//!
//! A batch is sent in rounds. A round ends early only when a descriptor's
//! deferred path is anchored on an object that an earlier descriptor of the
//! same round will create and whose key is therefore still unknown. Each
//! round's responses are applied strictly in enqueue order; the first fault
//! stops the batch and is reported as [`BatchError::RequestFailed`].

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::iter::Peekable;
use std::sync::Arc;
use std::vec::IntoIter;

use tracing::{debug, info, warn};

use super::graph::ObjectGraph;
use super::materializer;
use crate::domain::batch::Batch;
use crate::domain::errors::BatchError;
use crate::domain::newtypes::{BatchId, ObjectId, RequestId};
use crate::domain::object::{EntityKind, MaterializedObject, ParentLink};
use crate::domain::request::{RequestDescriptor, RequestSpec};
use crate::domain::value::PropertyBag;
use crate::ports::transport::{IBatchTransport, TransportRequest};

// ============================================================================
// Handles and outcomes
// ============================================================================

/// Identifies an enqueued request across batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle {
    pub batch_id: BatchId,
    pub request_id: RequestId,
}

/// What a successful request produced
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub request_id: RequestId,
    pub status: u16,
    /// Raw response body, kept even when nothing was materialized
    pub body: PropertyBag,
    /// Objects the response was applied to
    pub objects: Vec<ObjectId>,
}

/// Outcome of executing a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The batch held no requests; nothing was sent
    Empty,
    /// Every request was sent and materialized
    Executed {
        batch_id: BatchId,
        /// One handle per request, in enqueue order
        responses: Vec<RequestHandle>,
    },
}

impl BatchOutcome {
    pub fn is_empty(&self) -> bool {
        matches!(self, BatchOutcome::Empty)
    }

    pub fn response_count(&self) -> usize {
        match self {
            BatchOutcome::Empty => 0,
            BatchOutcome::Executed { responses, .. } => responses.len(),
        }
    }
}

// ============================================================================
// Context
// ============================================================================

/// A client session against one site
pub struct Context {
    transport: Arc<dyn IBatchTransport>,
    graph: ObjectGraph,
    pending: Option<Batch>,
    results: HashMap<RequestHandle, RequestResult>,
}

impl Context {
    pub fn new(transport: Arc<dyn IBatchTransport>) -> Self {
        Self {
            transport,
            graph: ObjectGraph::new(),
            pending: None,
            results: HashMap::new(),
        }
    }

    /// The site's web object
    pub fn web(&self) -> ObjectId {
        self.graph.root()
    }

    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    /// Read-only view of a materialized object
    pub fn object(&self, id: ObjectId) -> Result<&MaterializedObject, BatchError> {
        self.graph.get(id)
    }

    /// Mutable access for local property assignment
    pub fn object_mut(&mut self, id: ObjectId) -> Result<&mut MaterializedObject, BatchError> {
        self.graph.get_mut(id)
    }

    /// Live members materialized into `owner`'s collection
    pub fn members(&self, owner: ObjectId, collection: &str) -> Result<Vec<ObjectId>, BatchError> {
        self.graph.members(owner, collection)
    }

    /// Creates a graph object to be used as a request target
    pub fn create_object(&mut self, kind: EntityKind, parent: Option<ParentLink>) -> ObjectId {
        self.graph.create_detached(kind, parent)
    }

    /// Named nested object of `owner`, created on first use
    pub fn child_object(&mut self, owner: ObjectId, name: &str) -> Result<ObjectId, BatchError> {
        self.graph.child_object(owner, name)
    }

    /// Result of an executed request; `None` before execution or after a
    /// failure that stopped the batch earlier
    pub fn result(&self, handle: &RequestHandle) -> Option<&RequestResult> {
        self.results.get(handle)
    }

    /// Removes and returns the result of an executed request
    pub fn take_result(&mut self, handle: &RequestHandle) -> Option<RequestResult> {
        self.results.remove(handle)
    }

    /// Drops every recorded result of `batch_id`
    pub(crate) fn forget_results(&mut self, batch_id: BatchId) {
        self.results.retain(|handle, _| handle.batch_id != batch_id);
    }

    /// Number of requests waiting in the implicit batch
    pub fn pending_len(&self) -> usize {
        self.pending.as_ref().map_or(0, Batch::len)
    }

    /// Creates an explicit batch; it runs only through [`execute_batch`](Self::execute_batch)
    pub fn new_batch(&self) -> Batch {
        Batch::new()
    }

    /// Enqueues into the implicit batch, creating it on first use
    pub fn enqueue(&mut self, spec: RequestSpec) -> Result<RequestHandle, BatchError> {
        self.check_target(&spec)?;
        let batch = self.pending.get_or_insert_with(Batch::new);
        let request_id = batch.enqueue(spec)?;
        Ok(RequestHandle {
            batch_id: batch.id(),
            request_id,
        })
    }

    /// Enqueues into an explicit batch
    pub fn enqueue_in(
        &mut self,
        batch: &mut Batch,
        spec: RequestSpec,
    ) -> Result<RequestHandle, BatchError> {
        self.check_target(&spec)?;
        let request_id = batch.enqueue(spec)?;
        Ok(RequestHandle {
            batch_id: batch.id(),
            request_id,
        })
    }

    /// Enqueues into `batch` when given, the implicit batch otherwise
    pub fn enqueue_to(
        &mut self,
        batch: Option<&mut Batch>,
        spec: RequestSpec,
    ) -> Result<RequestHandle, BatchError> {
        match batch {
            Some(batch) => self.enqueue_in(batch, spec),
            None => self.enqueue(spec),
        }
    }

    fn check_target(&self, spec: &RequestSpec) -> Result<(), BatchError> {
        self.graph.get(spec.target)?.ensure_live()?;
        if let Some(anchor) = spec.path.anchor() {
            self.graph.get(anchor.object())?.ensure_live()?;
        }
        Ok(())
    }

    /// Executes the implicit batch
    ///
    /// With nothing pending this returns [`BatchOutcome::Empty`] without
    /// touching the transport. The implicit batch is cleared either way.
    pub async fn execute(&mut self) -> Result<BatchOutcome, BatchError> {
        match self.pending.take() {
            Some(mut batch) => self.execute_batch(&mut batch).await,
            None => Ok(BatchOutcome::Empty),
        }
    }

    /// Executes an explicit batch
    ///
    /// # Errors
    /// [`BatchError::BatchAlreadyExecuted`] on a second call for the same
    /// batch, [`BatchError::RequestFailed`] for the first faulted request.
    pub async fn execute_batch(&mut self, batch: &mut Batch) -> Result<BatchOutcome, BatchError> {
        let batch_id = batch.id();
        let descriptors = batch.seal()?;
        if descriptors.is_empty() {
            debug!(batch = %batch_id, "Empty batch, nothing to send");
            return Ok(BatchOutcome::Empty);
        }

        let total = descriptors.len();
        info!(batch = %batch_id, requests = total, "Executing batch");

        let mut responses = Vec::with_capacity(total);
        let mut remaining = descriptors.into_iter().peekable();
        let mut round = 0usize;
        while remaining.peek().is_some() {
            round += 1;
            let descriptors = self.next_round(&mut remaining);
            self.run_round(batch_id, round, &descriptors, &mut responses)
                .await?;
        }

        info!(batch = %batch_id, requests = total, rounds = round, "Batch executed");
        Ok(BatchOutcome::Executed {
            batch_id,
            responses,
        })
    }

    /// Takes descriptors until one depends on a key produced earlier in the
    /// same round
    fn next_round(&self, remaining: &mut Peekable<IntoIter<RequestDescriptor>>) -> Vec<RequestDescriptor> {
        let mut round = Vec::new();
        let mut targets = HashSet::new();
        while let Some(next) = remaining.peek() {
            if !round.is_empty() {
                if let Some(anchor) = next.path().anchor() {
                    let pending_key = matches!(
                        self.graph.key_value(anchor.object(), anchor.key()),
                        Ok(None)
                    );
                    if targets.contains(&anchor.object()) && pending_key {
                        break;
                    }
                }
            }
            if let Some(descriptor) = remaining.next() {
                targets.insert(descriptor.target());
                round.push(descriptor);
            }
        }
        round
    }

    async fn run_round(
        &mut self,
        batch_id: BatchId,
        round: usize,
        descriptors: &[RequestDescriptor],
        responses: &mut Vec<RequestHandle>,
    ) -> Result<(), BatchError> {
        let requests = descriptors
            .iter()
            .map(|d| self.resolve(d))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(batch = %batch_id, round, requests = requests.len(), "Sending round");

        let results = self.transport.send_batch(&requests).await;

        let expected = requests.len();
        let received = results.len();
        let faulted = results.iter().any(Result::is_err);
        if received > expected || (received < expected && !faulted) {
            warn!(batch = %batch_id, expected, received, "Response count mismatch");
            return Err(BatchError::ResponseCountMismatch { expected, received });
        }

        for (descriptor, result) in descriptors.iter().zip(results) {
            let response = match result {
                Ok(response) => response,
                Err(fault) => {
                    warn!(
                        batch = %batch_id,
                        request = %descriptor.id(),
                        status = ?fault.status,
                        "Request failed: {}",
                        fault.message
                    );
                    return Err(BatchError::RequestFailed {
                        request_id: descriptor.id(),
                        status: fault.status,
                        cause: fault.message,
                    });
                }
            };
            if response.correlation_id != descriptor.id() {
                return Err(BatchError::MalformedResponse {
                    request_id: descriptor.id(),
                    reason: format!("response correlated to {}", response.correlation_id),
                });
            }

            let objects = materializer::apply(&mut self.graph, descriptor, &response.body)?;
            debug!(
                request = %descriptor.id(),
                kind = %descriptor.kind(),
                status = response.status,
                objects = objects.len(),
                "Applied response"
            );

            let handle = RequestHandle {
                batch_id,
                request_id: descriptor.id(),
            };
            self.results.insert(
                handle,
                RequestResult {
                    request_id: descriptor.id(),
                    status: response.status,
                    body: response.body,
                    objects,
                },
            );
            responses.push(handle);
        }
        Ok(())
    }

    /// Builds the wire request, filling deferred paths from the graph
    fn resolve(&self, descriptor: &RequestDescriptor) -> Result<TransportRequest, BatchError> {
        self.graph.get(descriptor.target())?.ensure_live()?;
        let path = match descriptor.path().anchor() {
            Some(anchor) => {
                let key = self
                    .graph
                    .key_value(anchor.object(), anchor.key())?
                    .ok_or_else(|| BatchError::UnresolvedReference {
                        request_id: descriptor.id(),
                        object: anchor.object(),
                        key: anchor.key().to_string(),
                    })?;
                descriptor.path().resolve(&key)
            }
            None => descriptor.path().as_str().to_string(),
        };
        Ok(TransportRequest {
            correlation_id: descriptor.id(),
            kind: descriptor.kind().clone(),
            path,
            selector: descriptor.selector().clone(),
            payload: descriptor.payload().clone(),
        })
    }

    // ========================================================================
    // Blocking variants
    // ========================================================================

    /// Blocking [`execute`](Self::execute)
    ///
    /// Must not be called from inside an async runtime.
    pub fn execute_blocking(&mut self) -> Result<BatchOutcome, BatchError> {
        block_on(self.execute())?
    }

    /// Blocking [`execute_batch`](Self::execute_batch)
    pub fn execute_batch_blocking(&mut self, batch: &mut Batch) -> Result<BatchOutcome, BatchError> {
        block_on(self.execute_batch(batch))?
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("objects", &self.graph.len())
            .field("pending", &self.pending_len())
            .field("results", &self.results.len())
            .finish()
    }
}

/// Runs `future` to completion on a fresh current-thread runtime
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output, BatchError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| BatchError::Runtime(e.to_string()))?;
    Ok(runtime.block_on(future))
}

// ============================================================================
// ContextFactory
// ============================================================================

/// Creates isolated contexts over one shared transport
#[derive(Clone)]
pub struct ContextFactory {
    transport: Arc<dyn IBatchTransport>,
}

impl ContextFactory {
    pub fn new(transport: Arc<dyn IBatchTransport>) -> Self {
        Self { transport }
    }

    /// A new context with its own object graph and batches
    pub fn create(&self) -> Context {
        Context::new(Arc::clone(&self.transport))
    }
}

impl std::fmt::Debug for ContextFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextFactory").finish_non_exhaustive()
    }
}
