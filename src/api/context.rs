//! Request context: injected collaborator handles.
//!
//! Built once at startup and shared read-only across all requests, so
//! handlers receive their collaborators explicitly instead of reaching
//! for process-wide singletons. Tests substitute fakes or spies per
//! role.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::cluster::{BuildScheduler, ConsoleStore, EventLog, InMemoryCluster, WorkerRegistry};
use crate::config::MasterConfig;

/// Collaborator handles plus process-wide defaults, passed to every
/// handler invocation.
#[derive(Clone)]
pub struct ApiContext {
    pub scheduler: Arc<dyn BuildScheduler>,
    pub registry: Arc<dyn WorkerRegistry>,
    pub console: Arc<dyn ConsoleStore>,
    pub eventlog: Arc<dyn EventLog>,
    pub config: MasterConfig,
    /// Prometheus exposition handle; absent when metrics are disabled.
    pub metrics: Option<PrometheusHandle>,
}

impl ApiContext {
    pub fn new(
        scheduler: Arc<dyn BuildScheduler>,
        registry: Arc<dyn WorkerRegistry>,
        console: Arc<dyn ConsoleStore>,
        eventlog: Arc<dyn EventLog>,
        config: MasterConfig,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            scheduler,
            registry,
            console,
            eventlog,
            config,
            metrics,
        }
    }

    /// Context where every collaborator role is served by one in-memory
    /// cluster instance.
    pub fn from_cluster(
        cluster: Arc<InMemoryCluster>,
        config: MasterConfig,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self::new(
            cluster.clone(),
            cluster.clone(),
            cluster.clone(),
            cluster,
            config,
            metrics,
        )
    }
}
