//! Actor runtime that hosts workers.
//!
//! # Main Components
//!
//! - [`WorkerEntity`] - Trait that worker behaviour implements to be hosted by an actor
//! - [`WorkerActor`] - Generic actor that owns one worker and processes its mailbox
//! - [`WorkerClient`] - Cloneable handle for sending requests to a worker
//! - [`FrameworkError`] - Mailbox errors
//!
//! # Testing
//!
//! See [`mock`] module for a scripted transport that stands in for real workers.

pub mod core;
pub mod mock;

// Re-export core types for convenience
pub use self::core::*;
