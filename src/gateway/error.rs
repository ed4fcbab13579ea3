//! Dispatch errors.
//!
//! Every [`DispatchError`] names the operation, the caller's correlation token and the
//! trace id, which is enough to find the matching span in the telemetry backend.

use crate::message::DispatchRequest;
use crate::telemetry::TraceId;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchErrorKind {
    /// The pool had no Alive worker. Not retried here.
    NoWorkersAvailable,
    /// No reply arrived within the caller's timeout.
    Timeout { elapsed: Duration },
    /// The worker reported an error, or the transport could not reach it.
    WorkerFailure(String),
    /// The caller abandoned the request.
    Cancelled,
    /// The gateway is draining and no longer accepts requests.
    ShuttingDown,
}

impl fmt::Display for DispatchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchErrorKind::NoWorkersAvailable => f.write_str("No workers available"),
            DispatchErrorKind::Timeout { elapsed } => {
                write!(f, "Timed out after {}ms", elapsed.as_millis())
            }
            DispatchErrorKind::WorkerFailure(message) => write!(f, "Worker failure: {message}"),
            DispatchErrorKind::Cancelled => f.write_str("Cancelled by caller"),
            DispatchErrorKind::ShuttingDown => f.write_str("Gateway is shutting down"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} (operation={operation}, correlation={correlation_token}, trace_id={})", trace_label(.trace_id))]
pub struct DispatchError {
    pub kind: DispatchErrorKind,
    pub operation: String,
    pub correlation_token: String,
    /// `None` only when the request was rejected before a span was opened.
    pub trace_id: Option<TraceId>,
}

impl DispatchError {
    pub(crate) fn new(
        kind: DispatchErrorKind,
        request: &DispatchRequest,
        trace_id: Option<TraceId>,
    ) -> Self {
        Self {
            kind,
            operation: request.operation.clone(),
            correlation_token: request.correlation_token.clone(),
            trace_id,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, DispatchErrorKind::Timeout { .. })
    }
}

fn trace_label(trace_id: &Option<TraceId>) -> String {
    trace_id.map_or_else(|| "none".to_string(), |id| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_carries_lookup_context() {
        let request = DispatchRequest::new("Cluster.Ask", "req-42", "hit");
        let trace_id = TraceId::from_u128(0xabc).unwrap();
        let error = DispatchError::new(
            DispatchErrorKind::Timeout {
                elapsed: Duration::from_millis(200),
            },
            &request,
            Some(trace_id),
        );
        assert_eq!(
            error.to_string(),
            "Timed out after 200ms (operation=Cluster.Ask, correlation=req-42, trace_id=00000000000000000000000000000abc)"
        );
        assert!(error.is_timeout());
    }

    #[test]
    fn test_error_without_span_says_none() {
        let request = DispatchRequest::new("Cluster.Ask", "req-1", "hit");
        let error = DispatchError::new(DispatchErrorKind::ShuttingDown, &request, None);
        assert!(error.to_string().ends_with("trace_id=none)"));
    }
}
