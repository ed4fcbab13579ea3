//! # Traced Dispatch Gateway
//!
//! Wraps one pool dispatch in a span, carries the trace context across the hop to the
//! worker, and bounds the wait.
//!
//! ## Algorithm
//!
//! 1. Open a span named after the request's operation. An inbound trace is continued
//!    (same trace id, inbound span as parent); otherwise a new trace starts.
//! 2. Ask the pool for a worker. None Alive → close `Error`, return
//!    [`DispatchErrorKind::NoWorkersAvailable`]. No retry at this layer.
//! 3. Send the request, stamped with the span's context, and suspend until the reply or
//!    the timeout, whichever comes first.
//! 4. Reply → close `Ok` (or `Error` if the worker reported a fault).
//! 5. Timeout → close `Timeout`. The worker may still finish; its reply is discarded.
//!
//! The span is owned by an [`ActiveSpan`] guard, so it is closed exactly once on every
//! path, including when the caller drops the dispatch future.
//!
//! ## Draining
//!
//! [`TracedGateway::close`] stops admitting requests and [`TracedGateway::drained`]
//! resolves once every admitted dispatch has finished or timed out.

pub mod error;

pub use error::{DispatchError, DispatchErrorKind};

use crate::message::{DispatchRequest, DispatchResponse};
use crate::pool::{Liveness, PoolError, WorkerPool};
use crate::telemetry::{ActiveSpan, SpanOutcome, SpanSink};
use crate::transport::{TransportError, WorkerTransport};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

/// Timeout used by [`TracedGateway::dispatch_default`] unless configured otherwise.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Routes requests to the pool with tracing and a bounded wait.
///
/// The span sink and the transport are injected; the gateway never looks up global state.
pub struct TracedGateway {
    pool: Arc<WorkerPool>,
    transport: Arc<dyn WorkerTransport>,
    sink: Arc<dyn SpanSink>,
    node: Option<String>,
    default_timeout: Duration,
    in_flight: TaskTracker,
}

impl TracedGateway {
    pub fn new(
        pool: Arc<WorkerPool>,
        transport: Arc<dyn WorkerTransport>,
        sink: Arc<dyn SpanSink>,
    ) -> Self {
        Self {
            pool,
            transport,
            sink,
            node: None,
            default_timeout: DEFAULT_DISPATCH_TIMEOUT,
            in_flight: TaskTracker::new(),
        }
    }

    /// Address of the node this gateway runs on. Informational; added to log spans.
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Dispatches `request` to one worker and waits at most `timeout` for its reply.
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
        timeout: Duration,
    ) -> Result<DispatchResponse, DispatchError> {
        self.admit(request, timeout, std::future::pending::<()>())
            .await
    }

    /// [`dispatch`](Self::dispatch) with the configured default timeout.
    pub async fn dispatch_default(
        &self,
        request: DispatchRequest,
    ) -> Result<DispatchResponse, DispatchError> {
        self.dispatch(request, self.default_timeout).await
    }

    /// Like [`dispatch`](Self::dispatch), but gives up as soon as `cancel` fires.
    ///
    /// Cancellation does not wait for the worker; the span is closed `Cancelled`.
    pub async fn dispatch_cancellable(
        &self,
        request: DispatchRequest,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<DispatchResponse, DispatchError> {
        self.admit(request, timeout, cancel.cancelled_owned()).await
    }

    /// Stops admitting new dispatches. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        let closed = self.in_flight.close();
        if closed {
            info!(in_flight = self.in_flight.len(), "Gateway closed to new dispatches");
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.in_flight.is_closed()
    }

    /// Number of dispatches currently waiting on a worker.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Resolves once the gateway is closed and every admitted dispatch has finished.
    pub async fn drained(&self) {
        self.in_flight.wait().await;
    }

    async fn admit<C>(
        &self,
        request: DispatchRequest,
        timeout: Duration,
        cancelled: C,
    ) -> Result<DispatchResponse, DispatchError>
    where
        C: Future<Output = ()>,
    {
        // Counted before the closed check, so `drained` cannot finish while an admitted
        // dispatch has not yet been tracked.
        let admitted = self.in_flight.token();
        if self.in_flight.is_closed() {
            warn!(operation = %request.operation, "Rejected, gateway is shutting down");
            let trace_id = request.trace.as_ref().map(|trace| trace.trace_id);
            return Err(DispatchError::new(
                DispatchErrorKind::ShuttingDown,
                &request,
                trace_id,
            ));
        }

        let span = ActiveSpan::start(
            self.sink.clone(),
            &request.operation,
            request.trace.as_ref(),
        );
        let log_span = info_span!(
            "dispatch",
            operation = %request.operation,
            correlation = %request.correlation_token,
            trace_id = %span.context().trace_id,
            node = self.node.as_deref().unwrap_or("local"),
        );
        let result = self
            .run(request, timeout, span, cancelled)
            .instrument(log_span)
            .await;
        drop(admitted);
        result
    }

    async fn run<C>(
        &self,
        request: DispatchRequest,
        timeout: Duration,
        span: ActiveSpan,
        cancelled: C,
    ) -> Result<DispatchResponse, DispatchError>
    where
        C: Future<Output = ()>,
    {
        let context = span.context();
        let fail = |kind: DispatchErrorKind, request: &DispatchRequest| {
            DispatchError::new(kind, request, Some(context.trace_id))
        };

        let worker = match self.pool.select_worker() {
            Ok(worker) => worker,
            Err(PoolError::NoWorkersAvailable) => {
                warn!("No workers available");
                span.close(SpanOutcome::Error);
                return Err(fail(DispatchErrorKind::NoWorkersAvailable, &request));
            }
        };
        debug!(worker = %worker.id, address = %worker.address, "Worker selected");

        let outbound = request.clone().with_trace(context);
        let started = Instant::now();
        let send = tokio::time::timeout(timeout, self.transport.send(&worker, outbound, timeout));
        tokio::pin!(cancelled);

        let result = tokio::select! {
            result = send => result,
            () = &mut cancelled => {
                info!(worker = %worker.id, "Cancelled by caller");
                span.close(SpanOutcome::Cancelled);
                return Err(fail(DispatchErrorKind::Cancelled, &request));
            }
        };

        match result {
            Ok(Ok(Ok(payload))) => {
                debug!(worker = %worker.id, elapsed_ms = started.elapsed().as_millis() as u64, "Reply received");
                span.close(SpanOutcome::Ok);
                Ok(DispatchResponse {
                    correlation_token: request.correlation_token,
                    payload,
                    worker: worker.id,
                    trace: context,
                })
            }
            Ok(Ok(Err(fault))) => {
                warn!(worker = %worker.id, error = %fault, "Worker reported failure");
                span.close(SpanOutcome::Error);
                Err(fail(DispatchErrorKind::WorkerFailure(fault.message), &request))
            }
            Err(_) | Ok(Err(TransportError::DeadlineExceeded(_))) => {
                let elapsed = started.elapsed();
                warn!(worker = %worker.id, elapsed_ms = elapsed.as_millis() as u64, "Timed out waiting for worker");
                span.close(SpanOutcome::Timeout);
                Err(fail(DispatchErrorKind::Timeout { elapsed }, &request))
            }
            Ok(Err(error)) => {
                if matches!(error, TransportError::WorkerUnreachable(_)) {
                    self.pool.set_liveness(&worker.id, Liveness::Unreachable);
                }
                warn!(worker = %worker.id, error = %error, "Transport failure");
                span.close(SpanOutcome::Error);
                Err(fail(DispatchErrorKind::WorkerFailure(error.to_string()), &request))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::mock::MockTransport;
    use crate::pool::{WorkerHandle, WorkerId};
    use crate::telemetry::{RecordingSpanSink, SpanHandle, SpanId, TraceContext, TraceId};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::OnceLock;

    fn gateway_with(workers: &[&str], mock: &MockTransport) -> (TracedGateway, RecordingSpanSink) {
        let pool = Arc::new(WorkerPool::new());
        for id in workers {
            pool.register(WorkerHandle::alive(*id, format!("local://{id}")));
        }
        let sink = RecordingSpanSink::new();
        let gateway = TracedGateway::new(pool, Arc::new(mock.clone()), Arc::new(sink.clone()));
        (gateway, sink)
    }

    #[tokio::test]
    async fn test_reply_closes_span_ok() {
        let mock = MockTransport::new();
        mock.expect_send().return_ok("pong");
        let (gateway, sink) = gateway_with(&["w-1"], &mock);

        let response = gateway
            .dispatch(DispatchRequest::new("Cluster.Ask", "c-1", "ping"), Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(response.payload, "pong");
        assert_eq!(response.correlation_token, "c-1");
        assert_eq!(response.worker, WorkerId::from("w-1"));

        let closed = sink.closed();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].operation, "Cluster.Ask");
        assert_eq!(closed[0].outcome, SpanOutcome::Ok);
        assert_eq!(closed[0].trace_id, response.trace.trace_id);
        assert_eq!(closed[0].span_id, response.trace.span_id);
        mock.verify();
    }

    #[tokio::test]
    async fn test_empty_pool_fails_without_sending() {
        let mock = MockTransport::new();
        let (gateway, sink) = gateway_with(&[], &mock);

        let error = gateway
            .dispatch(DispatchRequest::new("Cluster.Ask", "c-1", "ping"), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(error.kind, DispatchErrorKind::NoWorkersAvailable);
        assert_eq!(error.correlation_token, "c-1");
        assert!(error.trace_id.is_some());
        assert!(mock.calls().is_empty());
        assert_eq!(sink.closed()[0].outcome, SpanOutcome::Error);
    }

    #[tokio::test]
    async fn test_worker_fault_is_surfaced_verbatim() {
        let mock = MockTransport::new();
        mock.expect_send().return_fault("disk full");
        let (gateway, sink) = gateway_with(&["w-1"], &mock);

        let error = gateway
            .dispatch(DispatchRequest::new("Cluster.Ask", "c-9", "ping"), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert_eq!(error.kind, DispatchErrorKind::WorkerFailure("disk full".to_string()));
        assert_eq!(sink.closed()[0].outcome, SpanOutcome::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_worker_times_out() {
        let mock = MockTransport::new();
        mock.expect_send().never_reply();
        let (gateway, sink) = gateway_with(&["w-1"], &mock);

        let error = gateway
            .dispatch(DispatchRequest::new("Cluster.Ask", "c-1", "ping"), Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(error.is_timeout());
        match error.kind {
            DispatchErrorKind::Timeout { elapsed } => {
                assert!(elapsed >= Duration::from_millis(200));
                assert!(elapsed < Duration::from_millis(300));
            }
            other => panic!("unexpected error kind: {other:?}"),
        }
        let closed = sink.closed();
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].outcome, SpanOutcome::Timeout);
        assert_eq!(sink.open_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_deadline_counts_as_timeout() {
        let mock = MockTransport::new();
        mock.expect_send()
            .return_transport_err(TransportError::DeadlineExceeded(WorkerId::from("w-1")));
        let (gateway, sink) = gateway_with(&["w-1"], &mock);

        let error = gateway
            .dispatch(DispatchRequest::new("Cluster.Ask", "c-1", "ping"), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(error.is_timeout());
        assert_eq!(sink.closed()[0].outcome, SpanOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_unreachable_worker_is_marked_in_pool() {
        let mock = MockTransport::new();
        mock.expect_send()
            .return_transport_err(TransportError::WorkerUnreachable(WorkerId::from("w-1")));
        let (gateway, _sink) = gateway_with(&["w-1"], &mock);

        let error = gateway
            .dispatch(DispatchRequest::new("Cluster.Ask", "c-1", "ping"), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(error.kind, DispatchErrorKind::WorkerFailure(_)));
        assert_eq!(gateway.pool().alive_count(), 0);

        let next = gateway
            .dispatch(DispatchRequest::new("Cluster.Ask", "c-2", "ping"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(next.kind, DispatchErrorKind::NoWorkersAvailable);
    }

    #[tokio::test]
    async fn test_inbound_trace_is_continued_and_forwarded() {
        let mock = MockTransport::new();
        mock.expect_send().return_ok("pong");
        let (gateway, _sink) = gateway_with(&["w-1"], &mock);

        let inbound = TraceContext::new_root();
        let response = gateway
            .dispatch(
                DispatchRequest::new("Cluster.Ask", "c-1", "ping").with_trace(inbound),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(response.trace.trace_id, inbound.trace_id);
        assert_eq!(response.trace.parent_span_id, Some(inbound.span_id));
        assert_ne!(response.trace.span_id, inbound.span_id);

        let forwarded = mock.calls()[0].request.trace.unwrap();
        assert_eq!(forwarded, response.trace);
    }

    #[tokio::test]
    async fn test_unsampled_inbound_trace_stays_unsampled() {
        let mock = MockTransport::new();
        mock.expect_send().return_ok("pong");
        let (gateway, _sink) = gateway_with(&["w-1"], &mock);

        let inbound = TraceContext::extract_b3([
            ("X-B3-TraceId", "463ac35c9f6413ad"),
            ("X-B3-SpanId", "a2fb4a1d1a96d312"),
            ("X-B3-Sampled", "0"),
        ])
        .unwrap()
        .unwrap();
        assert!(!inbound.sampled);

        let response = gateway
            .dispatch(
                DispatchRequest::new("Cluster.Ask", "c-1", "ping").with_trace(inbound),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        let forwarded = mock.calls()[0].request.trace.unwrap();
        assert!(!forwarded.sampled);
        assert!(!response.trace.sampled);
        assert_eq!(forwarded.trace_id, inbound.trace_id);
        assert!(forwarded
            .b3_headers()
            .contains(&("X-B3-Sampled", "0".to_string())));
    }

    /// Closes the gateway from inside `start_span`, i.e. after a dispatch has been
    /// admitted but before it reaches the pool.
    struct CloseOnStartSink {
        gateway: Arc<OnceLock<Arc<TracedGateway>>>,
        in_flight_at_close: Arc<AtomicUsize>,
        inner: RecordingSpanSink,
    }

    impl SpanSink for CloseOnStartSink {
        fn start_span(
            &self,
            operation: &str,
            trace_id: Option<TraceId>,
            parent: Option<SpanId>,
        ) -> SpanHandle {
            if let Some(gateway) = self.gateway.get() {
                gateway.close();
                self.in_flight_at_close
                    .store(gateway.in_flight(), Ordering::SeqCst);
            }
            self.inner.start_span(operation, trace_id, parent)
        }

        fn close_span(&self, handle: SpanHandle, outcome: SpanOutcome) {
            self.inner.close_span(handle, outcome);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_after_admission_still_waits_for_dispatch() {
        let mock = MockTransport::new();
        mock.expect_send().after(Duration::from_millis(100)).return_ok("late");
        let pool = Arc::new(WorkerPool::new());
        pool.register(WorkerHandle::alive("w-1", "local://w-1"));

        let slot = Arc::new(OnceLock::new());
        let in_flight_at_close = Arc::new(AtomicUsize::new(usize::MAX));
        let sink = CloseOnStartSink {
            gateway: slot.clone(),
            in_flight_at_close: in_flight_at_close.clone(),
            inner: RecordingSpanSink::new(),
        };
        let gateway = Arc::new(TracedGateway::new(pool, Arc::new(mock), Arc::new(sink)));
        assert!(slot.set(gateway.clone()).is_ok());

        let dispatching = gateway.clone();
        let pending = tokio::spawn(async move {
            dispatching
                .dispatch(DispatchRequest::new("Cluster.Ask", "c-1", "ping"), Duration::from_secs(1))
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(gateway.is_closed());
        assert_eq!(in_flight_at_close.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.in_flight(), 1);

        let waiting = Instant::now();
        gateway.drained().await;
        assert!(waiting.elapsed() >= Duration::from_millis(80));
        assert_eq!(pending.await.unwrap().unwrap().payload, "late");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_closes_span_cancelled() {
        let mock = MockTransport::new();
        mock.expect_send().never_reply();
        let (gateway, sink) = gateway_with(&["w-1"], &mock);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let error = gateway
            .dispatch_cancellable(
                DispatchRequest::new("Cluster.Ask", "c-1", "ping"),
                Duration::from_secs(5),
                cancel,
            )
            .await
            .unwrap_err();

        assert_eq!(error.kind, DispatchErrorKind::Cancelled);
        assert_eq!(sink.closed()[0].outcome, SpanOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_closed_gateway_rejects_new_dispatches() {
        let mock = MockTransport::new();
        let (gateway, sink) = gateway_with(&["w-1"], &mock);

        assert!(gateway.close());
        assert!(!gateway.close());
        gateway.drained().await;

        let error = gateway
            .dispatch_default(DispatchRequest::new("Cluster.Ask", "c-1", "ping"))
            .await
            .unwrap_err();
        assert_eq!(error.kind, DispatchErrorKind::ShuttingDown);
        assert_eq!(error.trace_id, None);
        assert!(sink.started().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drained_waits_for_in_flight_dispatch() {
        let mock = MockTransport::new();
        mock.expect_send().after(Duration::from_millis(100)).return_ok("late");
        let (gateway, _sink) = gateway_with(&["w-1"], &mock);
        let gateway = Arc::new(gateway);

        let dispatching = gateway.clone();
        let pending = tokio::spawn(async move {
            dispatching
                .dispatch(DispatchRequest::new("Cluster.Ask", "c-1", "ping"), Duration::from_secs(1))
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(gateway.in_flight(), 1);

        gateway.close();
        gateway.drained().await;
        assert_eq!(gateway.in_flight(), 0);
        assert_eq!(pending.await.unwrap().unwrap().payload, "late");
    }
}
