//! Cluster node entry point.
//!
//! Resolves configuration from the environment, starts the node, sends one probe
//! request through the gateway and then serves until Ctrl-C.
//!
//! Exit codes: `0` after a graceful stop, `1` when the node could not start.

use std::process::ExitCode;
use tracing::{error, info, info_span, warn, Instrument};
use traced_router::lifecycle::{setup_tracing, ClusterNode};
use traced_router::membership::{environment_source, ServiceIdentity};
use traced_router::message::DispatchRequest;
use traced_router::telemetry::sink_from_env;

#[tokio::main]
async fn main() -> ExitCode {
    setup_tracing();

    let identity = ServiceIdentity::from_env();
    let span = info_span!(
        "service",
        service = %identity.service_name,
        environment = %identity.environment
    );
    run().instrument(span).await
}

async fn run() -> ExitCode {
    let source = match environment_source() {
        Ok(source) => source,
        Err(e) => {
            error!(error = %e, "Unable to read configuration");
            return ExitCode::FAILURE;
        }
    };

    let node = match ClusterNode::bootstrap(&source, sink_from_env()) {
        Ok(node) => node,
        Err(e) => {
            error!(error = %e, "Node failed to start");
            return ExitCode::FAILURE;
        }
    };

    let probe = DispatchRequest::new("Cluster.Ask", "startup-probe", "hit from startup-probe");
    match node.gateway().dispatch_default(probe).await {
        Ok(response) => info!(
            worker = %response.worker,
            trace_id = %response.trace.trace_id,
            payload = %response.payload,
            "Startup probe answered"
        ),
        Err(e) => warn!(error = %e, "Startup probe failed"),
    }

    info!(node = %node.address(), "Serving, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Unable to listen for Ctrl-C, stopping");
    }

    node.stop().await;
    info!("Shutdown complete");
    ExitCode::SUCCESS
}
