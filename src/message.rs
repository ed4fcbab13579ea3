//! # Dispatch Messages
//!
//! The request and response types that travel from the gateway to a worker and back.
//! Every request carries the trace context of the span that sent it, so a worker on the
//! other side of the hop can attach its own work to the same trace.

use crate::pool::WorkerId;
use crate::telemetry::TraceContext;
use serde::{Deserialize, Serialize};

/// One unit of work handed to the gateway by the inbound boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Caller-supplied token used to correlate the response (and any error) with the request.
    pub correlation_token: String,
    /// Logical operation name; the gateway names its span after it.
    pub operation: String,
    pub payload: String,
    /// Inbound trace context. `None` means the request starts a new trace.
    #[serde(default)]
    pub trace: Option<TraceContext>,
}

impl DispatchRequest {
    pub fn new(
        operation: impl Into<String>,
        correlation_token: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            correlation_token: correlation_token.into(),
            operation: operation.into(),
            payload: payload.into(),
            trace: None,
        }
    }

    /// Continues an existing trace instead of starting a new one.
    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }
}

/// The successful result of a dispatch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub correlation_token: String,
    pub payload: String,
    /// The worker that served the request.
    pub worker: WorkerId,
    /// Context of the gateway span the request was served under.
    pub trace: TraceContext,
}

/// Error reported by a worker itself (as opposed to the transport failing to reach it).
///
/// The message is surfaced to the caller verbatim.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct WorkerFault {
    pub message: String,
}

impl WorkerFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// What a worker sends back for one request.
pub type WorkerReply = Result<String, WorkerFault>;
