//! # Traced Router
//!
//! > **Route requests across a worker pool without losing the trace.**
//!
//! A cluster node hosts a pool of worker actors. Requests arrive at the node's gateway,
//! which picks one reachable worker, forwards the request over an asynchronous hop and
//! waits for the answer under a deadline. Each dispatch is one span in the caller's
//! distributed trace, and the trace context travels with the request so the worker's
//! side of the hop stays in the same trace.
//!
//! ## Module Tour
//!
//! ### 1. Bootstrap ([`membership`])
//! Resolves this node's seeds, address, port and roles from the `cluster` configuration
//! section, falling back to defaults field by field.
//! - **Key items**: [`MembershipConfig`](membership::MembershipConfig),
//!   [`ConfigFallback`](membership::ConfigFallback).
//!
//! ### 2. The Pool ([`pool`])
//! The set of workers a dispatch may go to, with a pluggable selection policy.
//! - **Key items**: [`WorkerPool`](pool::WorkerPool), [`SelectionPolicy`](pool::SelectionPolicy).
//!
//! ### 3. The Gateway ([`gateway`])
//! One span per dispatch, trace propagation, bounded wait, draining.
//! - **Key items**: [`TracedGateway`](gateway::TracedGateway), [`DispatchError`](gateway::DispatchError).
//!
//! ### 4. The Workers ([`framework`], [`echo_worker`], [`transport`])
//! Workers are actors: each owns its state and handles its mailbox one request at a time.
//! The gateway reaches them through the [`WorkerTransport`](transport::WorkerTransport)
//! capability.
//!
//! ### 5. Telemetry ([`telemetry`])
//! Trace ids, span ids, B3 propagation and the [`SpanSink`](telemetry::SpanSink) that
//! receives finished spans.
//!
//! ### 6. The Node ([`lifecycle`])
//! Starts everything in order, reports readiness, and stops everything in reverse.
//!
//! ## Running
//!
//! ```bash
//! CLUSTER__IP=10.0.0.5 CLUSTER__PORT=9001 CLUSTER__ROLES=console RUST_LOG=info cargo run
//! ```

pub mod echo_worker;
pub mod framework;
pub mod gateway;
pub mod lifecycle;
pub mod membership;
pub mod message;
pub mod pool;
pub mod telemetry;
pub mod transport;
