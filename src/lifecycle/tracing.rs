//! # Log Output
//!
//! [`setup_tracing`] installs the process-wide `tracing` subscriber. Call it once, at the
//! top of `main`.
//!
//! Levels are controlled with `RUST_LOG`:
//!
//! ```bash
//! RUST_LOG=info cargo run
//! RUST_LOG=traced_router::gateway=debug cargo run
//! ```
//!
//! Every dispatch runs inside a `dispatch` span carrying the operation, correlation
//! token and trace id, so the compact format prints lines such as:
//!
//! ```text
//! DEBUG service:dispatch: Worker selected worker=console-1
//! WARN service:dispatch: Timed out waiting for worker worker=console-1 elapsed_ms=200
//! ```
//!
//! Setting `TRACE_SINK=log` additionally emits one `Span closed` event per dispatch span
//! (see [`LogSpanSink`](crate::telemetry::LogSpanSink)).

/// Installs a compact `fmt` subscriber filtered by `RUST_LOG`.
///
/// If a global subscriber is already installed it is kept, and the refusal is logged
/// through it at `debug`.
pub fn setup_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false) // span names carry the context; module paths add noise
        .compact()
        .try_init();
    if let Err(e) = installed {
        ::tracing::debug!(error = %e, "Subscriber already installed, keeping it");
    }
}
