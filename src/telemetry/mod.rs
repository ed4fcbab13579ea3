//! # Distributed Tracing
//!
//! Everything the gateway needs to keep one logical request inside one trace while it
//! crosses the asynchronous hop to a worker.
//!
//! - [`context`] - [`TraceId`], [`SpanId`], [`TraceContext`] and B3 propagation.
//! - [`sink`] - the [`SpanSink`] capability and its implementations.
//!
//! The sink is always passed in explicitly; nothing here is a global tracer.

pub mod context;
pub mod sink;

pub use context::{SpanId, TraceContext, TraceContextError, TraceId};
pub use sink::{
    ActiveSpan, LogSpanSink, NoopSpanSink, RecordingSpanSink, SpanHandle, SpanOutcome,
    SpanRecord, SpanSink,
};

use std::sync::Arc;
use tracing::info;

/// Environment variable that selects the span sink.
pub const TRACE_SINK_VAR: &str = "TRACE_SINK";

/// Picks a sink from `TRACE_SINK`: `log` writes spans through `tracing`; anything else,
/// including an unset variable, disables span export.
pub fn sink_from_env() -> Arc<dyn SpanSink> {
    sink_named(std::env::var(TRACE_SINK_VAR).ok().as_deref())
}

pub fn sink_named(name: Option<&str>) -> Arc<dyn SpanSink> {
    match name.map(str::trim) {
        Some(name) if name.eq_ignore_ascii_case("log") => {
            info!("Span export enabled (log)");
            Arc::new(LogSpanSink)
        }
        _ => {
            info!("No span sink configured, spans are discarded");
            Arc::new(NoopSpanSink)
        }
    }
}
