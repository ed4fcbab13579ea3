//! # Mock Transport & Testing Guide
//!
//! [`MockTransport`] implements [`WorkerTransport`] entirely in memory. Each call to
//! `send` consumes the next scripted expectation, so tests can make a worker answer
//! slowly, fail, vanish, or never answer at all, without spawning any actors.
//!
//! ## When to use Mocks vs Real Workers
//!
//! | Feature | MockTransport | LocalTransport + WorkerActor |
//! |---------|---------------|------------------------------|
//! | **Speed** | Instant (in-memory) | Fast (but involves tokio spawn) |
//! | **Determinism** | Scripted replies | Subject to scheduler |
//! | **Failure injection** | Easy (`return_fault`, `never_reply`) | Needs a misbehaving entity |
//! | **Use Case** | Gateway timeout and span tests | Full node tests |
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use traced_router::framework::mock::MockTransport;
//! use traced_router::gateway::TracedGateway;
//! use traced_router::message::DispatchRequest;
//! use traced_router::pool::{WorkerHandle, WorkerPool};
//! use traced_router::telemetry::RecordingSpanSink;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockTransport::new();
//!     mock.expect_send().return_ok("pong");
//!
//!     let pool = Arc::new(WorkerPool::new());
//!     pool.register(WorkerHandle::alive("w-1", "local://w-1"));
//!     let sink = RecordingSpanSink::new();
//!     let gateway = TracedGateway::new(pool, Arc::new(mock.clone()), Arc::new(sink.clone()));
//!
//!     let response = gateway
//!         .dispatch(DispatchRequest::new("ping", "c-1", "ping"), Duration::from_secs(1))
//!         .await
//!         .unwrap();
//!     assert_eq!(response.payload, "pong");
//!     mock.verify();
//! }
//! ```

use crate::message::{DispatchRequest, WorkerFault, WorkerReply};
use crate::pool::{WorkerHandle, WorkerId};
use crate::transport::{TransportError, WorkerTransport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

/// What a scripted send does once it has waited out its delay.
enum Behaviour {
    Reply(WorkerReply),
    Fail(TransportError),
    Hang,
}

struct Expectation {
    delay: Duration,
    behaviour: Behaviour,
}

/// What to do when no scripted expectation is left.
#[derive(Clone, Copy)]
enum Fallback {
    Echo(Duration),
    Hang,
}

/// One request observed by the mock.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub worker: WorkerId,
    pub request: DispatchRequest,
}

#[derive(Default)]
struct State {
    expectations: VecDeque<Expectation>,
    fallback: Option<Fallback>,
    calls: Vec<RecordedCall>,
}

/// A scripted [`WorkerTransport`]. Clones share the same script and call log.
///
/// Expectations are consumed in order regardless of which worker was selected. When the
/// script runs out, the fallback (if any) answers; otherwise the call panics, which fails
/// the test.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the next `send`.
    pub fn expect_send(&self) -> SendExpectationBuilder {
        SendExpectationBuilder {
            state: self.state.clone(),
            delay: Duration::ZERO,
        }
    }

    /// Once the script is exhausted, echo every payload back after `delay`.
    pub fn fallback_echo(&self, delay: Duration) {
        self.state.lock().fallback = Some(Fallback::Echo(delay));
    }

    /// Once the script is exhausted, never answer.
    pub fn fallback_hang(&self) {
        self.state.lock().fallback = Some(Fallback::Hang);
    }

    /// Every request seen so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Verifies that all scripted expectations were consumed.
    pub fn verify(&self) {
        let remaining = self.state.lock().expectations.len();
        if remaining != 0 {
            panic!("Not all expectations were met. {} remaining", remaining);
        }
    }
}

#[async_trait]
impl WorkerTransport for MockTransport {
    async fn send(
        &self,
        worker: &WorkerHandle,
        request: DispatchRequest,
        _timeout: Duration,
    ) -> Result<WorkerReply, TransportError> {
        let expectation = {
            let mut state = self.state.lock();
            state.calls.push(RecordedCall {
                worker: worker.id.clone(),
                request: request.clone(),
            });
            match state.expectations.pop_front() {
                Some(expectation) => expectation,
                None => match state.fallback {
                    Some(Fallback::Echo(delay)) => Expectation {
                        delay,
                        behaviour: Behaviour::Reply(Ok(request.payload.clone())),
                    },
                    Some(Fallback::Hang) => Expectation {
                        delay: Duration::ZERO,
                        behaviour: Behaviour::Hang,
                    },
                    None => panic!("Unexpected send to worker {}", worker.id),
                },
            }
        };

        if !expectation.delay.is_zero() {
            tokio::time::sleep(expectation.delay).await;
        }
        match expectation.behaviour {
            Behaviour::Reply(reply) => Ok(reply),
            Behaviour::Fail(error) => Err(error),
            Behaviour::Hang => std::future::pending::<Result<WorkerReply, TransportError>>().await,
        }
    }
}

/// Builder for one scripted `send`.
pub struct SendExpectationBuilder {
    state: Arc<Mutex<State>>,
    delay: Duration,
}

impl SendExpectationBuilder {
    /// Waits `delay` before answering.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// The worker answers successfully.
    pub fn return_ok(self, payload: impl Into<String>) {
        self.push(Behaviour::Reply(Ok(payload.into())));
    }

    /// The worker itself reports an error.
    pub fn return_fault(self, message: impl Into<String>) {
        self.push(Behaviour::Reply(Err(WorkerFault::new(message))));
    }

    /// The transport fails to deliver or to bring back the reply.
    pub fn return_transport_err(self, error: TransportError) {
        self.push(Behaviour::Fail(error));
    }

    /// The worker never answers.
    pub fn never_reply(self) {
        self.push(Behaviour::Hang);
    }

    fn push(self, behaviour: Behaviour) {
        self.state.lock().expectations.push_back(Expectation {
            delay: self.delay,
            behaviour,
        });
    }
}
