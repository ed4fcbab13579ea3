//! # Core Worker Framework
//!
//! This module defines the generic building blocks that host workers as actors.
//!
//! ## Key Types
//!
//! - [`WorkerEntity`]: The trait that worker behaviour must implement.
//! - [`WorkerActor`]: The generic actor that owns one worker and its mailbox.
//! - [`WorkerClient`]: The generic client for sending requests to a worker.
//! - [`FrameworkError`]: Errors of the mailbox itself (e.g., ActorClosed).

use crate::message::{DispatchRequest, WorkerFault, WorkerReply};
use crate::pool::WorkerId;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

// =============================================================================
// 1. THE ABSTRACTION
// =============================================================================

/// Trait that any worker behaviour must implement to be hosted by a [`WorkerActor`].
///
/// # Async & Context
/// Hooks are `#[async_trait]` so a worker can await other services while handling a
/// request. The `Context` type is injected through [`WorkerActor::run`] rather than at
/// construction, so dependencies can be wired after the actor exists.
#[async_trait]
pub trait WorkerEntity: Send + 'static {
    /// The runtime dependencies injected into the actor. Use `()` if none are needed.
    type Context: Send + Sync;

    /// The worker's own error type. Its `Display` text is what the caller sees.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Called once, before the first request is handled.
    async fn on_start(&mut self, _ctx: &Self::Context) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handles one request and produces the reply payload.
    async fn handle(
        &mut self,
        request: DispatchRequest,
        ctx: &Self::Context,
    ) -> Result<String, Self::Error>;

    /// Called after the mailbox closes.
    async fn on_stop(&mut self, _ctx: &Self::Context) {}
}

// =============================================================================
// 2. THE MESSAGES & ERRORS
// =============================================================================

/// Errors of the mailbox plumbing, independent of what the worker does.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FrameworkError {
    #[error("Actor closed")]
    ActorClosed,
    #[error("Actor dropped response channel")]
    ActorDropped,
}

/// Type alias for the one-shot channel a worker answers on.
pub type Response = oneshot::Sender<WorkerReply>;

/// Message delivered to a worker's mailbox.
#[derive(Debug)]
pub struct WorkerRequest {
    pub request: DispatchRequest,
    pub respond_to: Response,
}

// =============================================================================
// 3. THE GENERIC ACTOR SERVER
// =============================================================================

/// The actor that hosts one worker.
///
/// **Concurrency Model**: the actor owns its entity and processes its mailbox one
/// request at a time, so the entity's state needs no lock. Many actors run in parallel,
/// one Tokio task each.
pub struct WorkerActor<T: WorkerEntity> {
    id: WorkerId,
    receiver: mpsc::Receiver<WorkerRequest>,
    entity: T,
    handled: u64,
}

impl<T: WorkerEntity> WorkerActor<T> {
    /// Creates the actor and the client that feeds its mailbox.
    ///
    /// `buffer_size` bounds the mailbox; senders wait when it is full.
    pub fn new(id: WorkerId, entity: T, buffer_size: usize) -> (Self, WorkerClient) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            id: id.clone(),
            receiver,
            entity,
            handled: 0,
        };
        (actor, WorkerClient::new(id, sender))
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Runs the event loop until every client has been dropped.
    pub async fn run(mut self, context: T::Context) {
        let worker = self.id.clone();
        if let Err(e) = self.entity.on_start(&context).await {
            warn!(%worker, error = %e, "on_start failed, worker not started");
            return;
        }
        info!(%worker, "Worker started");

        while let Some(WorkerRequest {
            request,
            respond_to,
        }) = self.receiver.recv().await
        {
            let correlation = request.correlation_token.clone();
            let trace_id = request.trace.map(|trace| trace.trace_id.to_string());
            debug!(%worker, %correlation, ?trace_id, operation = %request.operation, "Handle");

            let reply = self
                .entity
                .handle(request, &context)
                .await
                .map_err(|e| WorkerFault::new(e.to_string()));
            match &reply {
                Ok(_) => {
                    self.handled += 1;
                    debug!(%worker, %correlation, "Handled");
                }
                Err(fault) => warn!(%worker, %correlation, error = %fault, "Handle failed"),
            }

            // The caller may have timed out or been cancelled; its reply is discarded.
            if respond_to.send(reply).is_err() {
                debug!(%worker, %correlation, "Caller gone, reply discarded");
            }
        }

        self.entity.on_stop(&context).await;
        info!(%worker, handled = self.handled, "Shutdown");
    }
}

// =============================================================================
// 4. THE GENERIC CLIENT
// =============================================================================

/// Sends requests to one [`WorkerActor`]. Cheap to clone; holds only the mailbox sender.
#[derive(Clone, Debug)]
pub struct WorkerClient {
    id: WorkerId,
    sender: mpsc::Sender<WorkerRequest>,
}

impl WorkerClient {
    pub fn new(id: WorkerId, sender: mpsc::Sender<WorkerRequest>) -> Self {
        Self { id, sender }
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Sends a request and waits for the worker's reply.
    pub async fn ask(&self, request: DispatchRequest) -> Result<WorkerReply, FrameworkError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(WorkerRequest {
                request,
                respond_to,
            })
            .await
            .map_err(|_| FrameworkError::ActorClosed)?;
        response.await.map_err(|_| FrameworkError::ActorDropped)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// =============================================================================
// 5. EXAMPLE USAGE (Test)
// =============================================================================
