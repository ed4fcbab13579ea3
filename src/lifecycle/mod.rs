//! # Node Lifecycle
//!
//! [`ClusterNode`] owns everything that runs on one node: the worker actors, the
//! [`LocalTransport`] that routes to them, the [`WorkerPool`] they are registered in and
//! the [`TracedGateway`] in front of the pool.
//!
//! Startup order is membership → workers → gateway → readiness. Shutdown runs it
//! backwards and waits for in-flight dispatches before any worker goes away.

mod settings;
pub mod tracing;

pub use self::settings::{NodeSettings, DEFAULT_ACTOR_SYSTEM, SECTION as SETTINGS_SECTION};
pub use self::tracing::setup_tracing;

use crate::echo_worker;
use crate::framework::{WorkerActor, WorkerClient, WorkerEntity};
use crate::gateway::TracedGateway;
use crate::membership::{ConfigError, MembershipConfig};
use crate::pool::{WorkerHandle, WorkerId, WorkerPool};
use crate::telemetry::SpanSink;
use crate::transport::LocalTransport;
use ::tracing::{error, info, warn};
use config::Config;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("No workers to start (roles={roles}, workers_per_role={workers_per_role})")]
    NoWorkers {
        roles: usize,
        workers_per_role: usize,
    },
}

/// A running node.
///
/// Dropping a `ClusterNode` without calling [`stop`](Self::stop) leaves its worker tasks
/// running until the runtime shuts down.
pub struct ClusterNode {
    membership: MembershipConfig,
    settings: NodeSettings,
    address: String,
    pool: Arc<WorkerPool>,
    transport: Arc<LocalTransport>,
    gateway: Arc<TracedGateway>,
    ready: watch::Sender<bool>,
    workers: Vec<(WorkerId, JoinHandle<()>)>,
}

impl ClusterNode {
    /// Resolves settings and membership from `source`, then starts the node.
    pub fn bootstrap(source: &Config, sink: Arc<dyn SpanSink>) -> Result<Self, LifecycleError> {
        let settings = NodeSettings::from_source(source)?;
        let membership = MembershipConfig::resolve_with(source, settings.config_fallback)?;
        Self::start(membership, settings, sink)
    }

    /// Starts one echo worker per role slot and opens the gateway.
    pub fn start(
        membership: MembershipConfig,
        settings: NodeSettings,
        sink: Arc<dyn SpanSink>,
    ) -> Result<Self, LifecycleError> {
        Self::start_with(membership, settings, sink, |id, node: &str, mailbox| {
            echo_worker::new(id, node, mailbox)
        })
    }

    /// Starts the node with workers built by `make_worker(id, node_address, mailbox_size)`.
    pub fn start_with<E, F>(
        membership: MembershipConfig,
        settings: NodeSettings,
        sink: Arc<dyn SpanSink>,
        mut make_worker: F,
    ) -> Result<Self, LifecycleError>
    where
        E: WorkerEntity<Context = ()>,
        F: FnMut(WorkerId, &str, usize) -> (WorkerActor<E>, WorkerClient),
    {
        if settings.workers_per_role == 0 || membership.roles.is_empty() {
            return Err(LifecycleError::NoWorkers {
                roles: membership.roles.len(),
                workers_per_role: settings.workers_per_role,
            });
        }
        if settings.mailbox_size == 0 {
            let error = ConfigError::invalid("gateway.mailbox_size", "must be greater than zero");
            return Err(error.into());
        }

        let address = membership.node_address(&settings.actor_system);
        info!(node = %address, roles = ?membership.roles, "Starting node");

        let pool = Arc::new(WorkerPool::new());
        let transport = Arc::new(LocalTransport::new());
        let mut workers = Vec::with_capacity(membership.roles.len() * settings.workers_per_role);

        for role in &membership.roles {
            for n in 1..=settings.workers_per_role {
                let id = WorkerId::new(format!("{role}-{n}"));
                let (actor, client) = make_worker(id.clone(), &address, settings.mailbox_size);
                let task = tokio::spawn(actor.run(()));
                transport.bind(client);
                pool.register(WorkerHandle::alive(id.clone(), format!("{address}/user/{id}")));
                workers.push((id, task));
            }
        }

        let gateway = Arc::new(
            TracedGateway::new(pool.clone(), transport.clone(), sink)
                .with_node(address.clone())
                .with_default_timeout(settings.dispatch_timeout),
        );
        let (ready, _) = watch::channel(true);
        info!(node = %address, workers = workers.len(), policy = pool.policy_name(), "Node ready");

        Ok(Self {
            membership,
            settings,
            address,
            pool,
            transport,
            gateway,
            ready,
            workers,
        })
    }

    pub fn gateway(&self) -> Arc<TracedGateway> {
        self.gateway.clone()
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn membership(&self) -> &MembershipConfig {
        &self.membership
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    /// This node's actor-system address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Watches readiness: `true` from start until [`stop`](Self::stop) begins.
    pub fn readiness(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Drains the gateway, then stops every worker.
    ///
    /// A worker task that panicked is logged and does not stop the rest of shutdown.
    pub async fn stop(self) {
        info!(node = %self.address, "Stopping node");
        self.ready.send_replace(false);

        self.gateway.close();
        self.gateway.drained().await;

        for handle in self.pool.drain() {
            self.transport.unbind(&handle.id);
        }
        if self.transport.route_count() != 0 {
            warn!(routes = self.transport.route_count(), "Routes left after drain");
        }

        let mut failed = 0;
        for (id, task) in self.workers {
            if let Err(e) = task.await {
                failed += 1;
                error!(worker = %id, error = %e, "Worker task failed");
            }
        }
        info!(node = %self.address, failed, "Node stopped");
    }
}
