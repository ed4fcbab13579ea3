//! # Echo Worker
//!
//! The worker this node runs by default: it answers every request with its payload,
//! stamped with the worker and node that served it. That is enough to see, from the
//! response alone, which cluster member a request landed on.
//!
//! ## Structure
//!
//! - [`entity`] - [`WorkerEntity`](crate::framework::WorkerEntity) implementation for [`EchoWorker`]
//! - [`error`] - [`EchoError`] type
//! - [`new()`] - Factory function that creates the actor and client
//!
//! ## Usage
//!
//! ```rust
//! use traced_router::echo_worker;
//! use traced_router::message::DispatchRequest;
//! use traced_router::pool::WorkerId;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (actor, client) = echo_worker::new(WorkerId::from("console-1"), "node-a", 16);
//!     tokio::spawn(actor.run(()));
//!
//!     let reply = client
//!         .ask(DispatchRequest::new("Cluster.Ask", "req-1", "hit from req-1"))
//!         .await
//!         .unwrap();
//!     assert!(reply.unwrap().contains("console-1"));
//! }
//! ```

pub mod entity;
pub mod error;

pub use entity::EchoWorker;
pub use error::EchoError;

use crate::framework::{WorkerActor, WorkerClient};
use crate::pool::WorkerId;

/// Creates an echo worker actor and its client.
pub fn new(
    id: WorkerId,
    node: impl Into<String>,
    mailbox_size: usize,
) -> (WorkerActor<EchoWorker>, WorkerClient) {
    let entity = EchoWorker::new(id.clone(), node);
    WorkerActor::new(id, entity, mailbox_size)
}
