//! # Worker Transport
//!
//! The capability the gateway uses to move a request across the hop to a worker.
//! [`LocalTransport`] delivers to in-process [`WorkerActor`](crate::framework::WorkerActor)s;
//! a remote transport would implement the same trait over the cluster's own messaging.

use crate::framework::{FrameworkError, WorkerClient};
use crate::message::{DispatchRequest, WorkerReply};
use crate::pool::{WorkerHandle, WorkerId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Failures to reach a worker or to hear back from it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Worker {0} is unreachable")]
    WorkerUnreachable(WorkerId),
    #[error("Worker {0} dropped the request without replying")]
    ReplyDropped(WorkerId),
    #[error("No route to worker {0}")]
    UnknownWorker(WorkerId),
    #[error("Worker {0} did not answer before the deadline")]
    DeadlineExceeded(WorkerId),
}

/// Sends one request to one worker and returns the worker's reply.
///
/// `timeout` is the caller's remaining budget; implementations may use it to bound
/// their own waits but the gateway enforces it independently.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    async fn send(
        &self,
        worker: &WorkerHandle,
        request: DispatchRequest,
        timeout: Duration,
    ) -> Result<WorkerReply, TransportError>;
}

/// Routes requests to worker actors living in this process.
#[derive(Default)]
pub struct LocalTransport {
    routes: RwLock<HashMap<WorkerId, WorkerClient>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `client` reachable under its worker id, replacing any previous route.
    pub fn bind(&self, client: WorkerClient) {
        debug!(worker = %client.id(), "Route bound");
        self.routes.write().insert(client.id().clone(), client);
    }

    /// Removes the route, dropping this transport's mailbox sender.
    pub fn unbind(&self, id: &WorkerId) -> bool {
        let removed = self.routes.write().remove(id).is_some();
        if removed {
            debug!(worker = %id, "Route removed");
        }
        removed
    }

    pub fn route_count(&self) -> usize {
        self.routes.read().len()
    }
}

#[async_trait]
impl WorkerTransport for LocalTransport {
    async fn send(
        &self,
        worker: &WorkerHandle,
        request: DispatchRequest,
        timeout: Duration,
    ) -> Result<WorkerReply, TransportError> {
        // Clone the client out so the lock is released before awaiting.
        let client = self
            .routes
            .read()
            .get(&worker.id)
            .cloned()
            .ok_or_else(|| TransportError::UnknownWorker(worker.id.clone()))?;

        match tokio::time::timeout(timeout, client.ask(request)).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(FrameworkError::ActorClosed)) => {
                Err(TransportError::WorkerUnreachable(worker.id.clone()))
            }
            Ok(Err(FrameworkError::ActorDropped)) => {
                Err(TransportError::ReplyDropped(worker.id.clone()))
            }
            Err(_) => Err(TransportError::DeadlineExceeded(worker.id.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::echo_worker;

    #[tokio::test]
    async fn test_local_transport_routes_to_bound_worker() {
        let transport = LocalTransport::new();
        let id = WorkerId::from("console-1");
        let (actor, client) = echo_worker::new(id.clone(), "node-a", 4);
        let handle = tokio::spawn(actor.run(()));
        transport.bind(client);
        assert_eq!(transport.route_count(), 1);

        let worker = WorkerHandle::alive(id.clone(), "local://console-1");
        let reply = transport
            .send(&worker, DispatchRequest::new("op", "c-1", "ping"), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(reply.unwrap().starts_with("ping"));

        assert!(transport.unbind(&id));
        assert!(!transport.unbind(&id));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_worker_is_reported() {
        let transport = LocalTransport::new();
        let worker = WorkerHandle::alive("ghost", "local://ghost");
        let result = transport
            .send(&worker, DispatchRequest::new("op", "c-1", "x"), Duration::from_secs(1))
            .await;
        assert_eq!(result, Err(TransportError::UnknownWorker(WorkerId::from("ghost"))));
    }

    #[tokio::test]
    async fn test_stopped_worker_is_unreachable() {
        let transport = LocalTransport::new();
        let id = WorkerId::from("console-2");
        let (actor, client) = echo_worker::new(id.clone(), "node-a", 4);
        drop(actor);
        transport.bind(client);

        let worker = WorkerHandle::alive(id.clone(), "local://console-2");
        let result = transport
            .send(&worker, DispatchRequest::new("op", "c-1", "x"), Duration::from_secs(1))
            .await;
        assert_eq!(result, Err(TransportError::WorkerUnreachable(id)));
    }
}
