//! # Span Sinks
//!
//! The gateway reports spans to a [`SpanSink`] it receives at construction. How (or
//! whether) a sink exports them is invisible to the gateway.
//!
//! - [`NoopSpanSink`] - used when no telemetry backend is configured.
//! - [`LogSpanSink`] - writes each closed span as a structured `tracing` event.
//! - [`RecordingSpanSink`] - keeps every span in memory; meant for tests.
//!
//! [`ActiveSpan`] wraps a [`SpanHandle`] so it is closed exactly once on every exit path.

use super::context::{SpanId, TraceContext, TraceId};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

/// How a span ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpanOutcome {
    Ok,
    Error,
    Timeout,
    /// The caller stopped waiting before the worker answered.
    Cancelled,
}

impl fmt::Display for SpanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpanOutcome::Ok => "ok",
            SpanOutcome::Error => "error",
            SpanOutcome::Timeout => "timeout",
            SpanOutcome::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// An open span, as handed out by [`SpanSink::start_span`].
#[derive(Clone, Debug)]
pub struct SpanHandle {
    pub operation: String,
    pub context: TraceContext,
    pub started_at: SystemTime,
}

impl SpanHandle {
    /// Opens a span with a fresh span id, continuing `trace_id` when given.
    pub fn open(operation: &str, trace_id: Option<TraceId>, parent: Option<SpanId>) -> Self {
        Self {
            operation: operation.to_string(),
            context: TraceContext {
                trace_id: trace_id.unwrap_or_else(TraceId::generate),
                span_id: SpanId::generate(),
                parent_span_id: parent,
                sampled: true,
            },
            started_at: SystemTime::now(),
        }
    }
}

/// Destination for spans produced by the gateway.
pub trait SpanSink: Send + Sync {
    fn start_span(
        &self,
        operation: &str,
        trace_id: Option<TraceId>,
        parent: Option<SpanId>,
    ) -> SpanHandle;

    fn close_span(&self, handle: SpanHandle, outcome: SpanOutcome);
}

/// Discards every span. Identifiers are still generated so context keeps propagating.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSpanSink;

impl SpanSink for NoopSpanSink {
    fn start_span(
        &self,
        operation: &str,
        trace_id: Option<TraceId>,
        parent: Option<SpanId>,
    ) -> SpanHandle {
        SpanHandle::open(operation, trace_id, parent)
    }

    fn close_span(&self, _handle: SpanHandle, _outcome: SpanOutcome) {}
}

/// Emits closed spans through `tracing`, one `info` event per span.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSpanSink;

impl SpanSink for LogSpanSink {
    fn start_span(
        &self,
        operation: &str,
        trace_id: Option<TraceId>,
        parent: Option<SpanId>,
    ) -> SpanHandle {
        let handle = SpanHandle::open(operation, trace_id, parent);
        debug!(
            operation,
            trace_id = %handle.context.trace_id,
            span_id = %handle.context.span_id,
            "Span started"
        );
        handle
    }

    fn close_span(&self, handle: SpanHandle, outcome: SpanOutcome) {
        let duration = handle.started_at.elapsed().unwrap_or(Duration::ZERO);
        info!(
            operation = %handle.operation,
            trace_id = %handle.context.trace_id,
            span_id = %handle.context.span_id,
            parent_span_id = ?handle.context.parent_span_id.map(|id| id.to_string()),
            %outcome,
            duration_ms = duration.as_millis() as u64,
            "Span closed"
        );
    }
}

/// A finished span as captured by [`RecordingSpanSink`].
#[derive(Clone, Debug, PartialEq)]
pub struct SpanRecord {
    pub operation: String,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub started_at: SystemTime,
    pub ended_at: SystemTime,
    pub outcome: SpanOutcome,
}

#[derive(Default)]
struct Recorded {
    started: Vec<TraceContext>,
    closed: Vec<SpanRecord>,
}

/// Keeps every started and closed span in memory. Clones share the same storage.
#[derive(Clone, Default)]
pub struct RecordingSpanSink {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingSpanSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contexts of every span started so far, in start order.
    pub fn started(&self) -> Vec<TraceContext> {
        self.inner.lock().started.clone()
    }

    /// Every span closed so far, in close order.
    pub fn closed(&self) -> Vec<SpanRecord> {
        self.inner.lock().closed.clone()
    }

    /// Number of spans started but not yet closed.
    pub fn open_count(&self) -> usize {
        let recorded = self.inner.lock();
        recorded.started.len() - recorded.closed.len()
    }
}

impl SpanSink for RecordingSpanSink {
    fn start_span(
        &self,
        operation: &str,
        trace_id: Option<TraceId>,
        parent: Option<SpanId>,
    ) -> SpanHandle {
        let handle = SpanHandle::open(operation, trace_id, parent);
        self.inner.lock().started.push(handle.context);
        handle
    }

    fn close_span(&self, handle: SpanHandle, outcome: SpanOutcome) {
        let record = SpanRecord {
            operation: handle.operation,
            trace_id: handle.context.trace_id,
            span_id: handle.context.span_id,
            parent_span_id: handle.context.parent_span_id,
            started_at: handle.started_at,
            ended_at: SystemTime::now(),
            outcome,
        };
        self.inner.lock().closed.push(record);
    }
}

/// A span owned by exactly one dispatch.
///
/// [`ActiveSpan::close`] consumes the guard, so a span cannot be closed twice. If the
/// guard is dropped without being closed (the dispatch future was dropped mid-flight),
/// the span is closed with [`SpanOutcome::Cancelled`].
pub struct ActiveSpan {
    sink: Arc<dyn SpanSink>,
    handle: Option<SpanHandle>,
    context: TraceContext,
}

impl ActiveSpan {
    /// Opens a span for `operation`, continuing `inbound` when the request carried a trace.
    pub fn start(sink: Arc<dyn SpanSink>, operation: &str, inbound: Option<&TraceContext>) -> Self {
        let mut handle = match inbound {
            Some(parent) => sink.start_span(operation, Some(parent.trace_id), Some(parent.span_id)),
            None => sink.start_span(operation, None, None),
        };
        // The upstream sampling decision is kept, not re-made here.
        if let Some(parent) = inbound {
            handle.context.sampled = parent.sampled;
        }
        let context = handle.context;
        Self {
            sink,
            handle: Some(handle),
            context,
        }
    }

    pub fn context(&self) -> TraceContext {
        self.context
    }

    pub fn close(mut self, outcome: SpanOutcome) {
        if let Some(handle) = self.handle.take() {
            self.sink.close_span(handle, outcome);
        }
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(trace_id = %self.context.trace_id, "Span abandoned before completion");
            self.sink.close_span(handle, SpanOutcome::Cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_close_records_once() {
        let sink = RecordingSpanSink::new();
        let span = ActiveSpan::start(Arc::new(sink.clone()), "Cluster.Ask", None);
        assert_eq!(sink.open_count(), 1);

        span.close(SpanOutcome::Ok);

        let closed = sink.closed();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].outcome, SpanOutcome::Ok);
        assert_eq!(closed[0].operation, "Cluster.Ask");
        assert_eq!(sink.open_count(), 0);
    }

    #[test]
    fn test_unsampled_parent_keeps_child_unsampled() {
        let sink = RecordingSpanSink::new();
        let parent = TraceContext {
            sampled: false,
            ..TraceContext::new_root()
        };
        let span = ActiveSpan::start(Arc::new(sink.clone()), "Cluster.Ask", Some(&parent));
        assert!(!span.context().sampled);
        assert_eq!(span.context().trace_id, parent.trace_id);
        span.close(SpanOutcome::Ok);

        let root = ActiveSpan::start(Arc::new(sink.clone()), "Cluster.Ask", None);
        assert!(root.context().sampled);
    }

    #[test]
    fn test_dropped_span_is_closed_as_cancelled() {
        let sink = RecordingSpanSink::new();
        {
            let _span = ActiveSpan::start(Arc::new(sink.clone()), "Cluster.Ask", None);
        }
        let closed = sink.closed();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].outcome, SpanOutcome::Cancelled);
    }

    #[test]
    fn test_inbound_context_is_continued() {
        let sink = RecordingSpanSink::new();
        let inbound = TraceContext::new_root();
        let span = ActiveSpan::start(Arc::new(sink.clone()), "Cluster.Ask", Some(&inbound));
        let context = span.context();
        assert_eq!(context.trace_id, inbound.trace_id);
        assert_eq!(context.parent_span_id, Some(inbound.span_id));
        span.close(SpanOutcome::Error);

        assert_eq!(sink.closed()[0].parent_span_id, Some(inbound.span_id));
    }

    #[test]
    fn test_noop_sink_still_generates_ids() {
        let handle = NoopSpanSink.start_span("op", None, None);
        assert_ne!(handle.context.trace_id.as_u128(), 0);
        NoopSpanSink.close_span(handle, SpanOutcome::Ok);
    }
}
