//! Interfaces to the cluster collaborators.
//!
//! The dispatch layer only routes requests; the build scheduler, worker
//! registry, console-output store, and event log own the actual state.
//! They are specified here at their interface boundary and injected
//! into the request context at startup, so handlers never reach for a
//! process-wide singleton and tests can substitute fakes or spies.
//!
//! Resource representations cross this boundary as JSON values: the
//! collaborators own their schemas and the dispatch layer forwards them
//! verbatim.

pub mod memory;

use std::path::PathBuf;

use serde_json::Value;

pub use memory::InMemoryCluster;

/// Failures reported by collaborators.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The addressed build/subjob/atom/worker does not exist (or, for
    /// console output, is not locally persisted yet).
    #[error("{0} not found")]
    NotFound(String),

    /// The collaborator rejected a mutation payload.
    #[error("{0}")]
    Rejected(String),
}

/// Archive format for build result downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Tar,
    Zip,
}

/// The build scheduler: owns builds, their subjobs and atoms, and the
/// result archives they produce.
pub trait BuildScheduler: Send + Sync {
    /// All known builds, ordered by id.
    fn builds(&self) -> Vec<Value>;

    /// Builds that are queued or in progress.
    fn active_builds(&self) -> Vec<Value>;

    fn build(&self, build_id: u64) -> Result<Value, ClusterError>;

    /// Ask the scheduler to accept a new build. `Ok` carries the
    /// representation of the accepted build; `Err(Rejected)` means the
    /// request parameters were unacceptable.
    fn request_new_build(&self, params: &Value) -> Result<Value, ClusterError>;

    /// Ask the scheduler to apply an update (e.g. cancellation) to an
    /// existing build.
    fn update_build(&self, build_id: u64, params: &Value) -> Result<Value, ClusterError>;

    fn subjobs(&self, build_id: u64) -> Result<Vec<Value>, ClusterError>;

    fn subjob(&self, build_id: u64, subjob_id: u64) -> Result<Value, ClusterError>;

    /// Base URL of the worker currently executing the subjob, if any.
    fn subjob_worker_url(
        &self,
        build_id: u64,
        subjob_id: u64,
    ) -> Result<Option<String>, ClusterError>;

    fn atoms(&self, build_id: u64, subjob_id: u64) -> Result<Vec<Value>, ClusterError>;

    fn atom(&self, build_id: u64, subjob_id: u64, atom_id: u64) -> Result<Value, ClusterError>;

    /// Record a subjob result archive reported by a worker.
    fn report_subjob_result(
        &self,
        build_id: u64,
        subjob_id: u64,
        worker_url: &str,
        payload: &[u8],
    ) -> Result<(), ClusterError>;

    /// Filesystem path of the build's result archive in the requested
    /// format. The dispatch layer hands this to static byte serving.
    fn results_archive_path(
        &self,
        build_id: u64,
        format: ArchiveFormat,
    ) -> Result<PathBuf, ClusterError>;
}

/// The worker registry: the authoritative directory of worker nodes,
/// shared across all requests.
pub trait WorkerRegistry: Send + Sync {
    /// All known workers, ordered by id.
    fn workers(&self) -> Vec<Value>;

    fn worker(&self, worker_id: u64) -> Result<Value, ClusterError>;

    /// Register a connecting worker and return its representation.
    fn connect_worker(
        &self,
        url: &str,
        num_executors: u32,
        session_id: Option<&str>,
    ) -> Result<Value, ClusterError>;

    /// Apply a worker-requested state change and refresh its heartbeat.
    fn update_worker_state(&self, worker_id: u64, state: &str) -> Result<Value, ClusterError>;

    fn refresh_heartbeat(&self, worker_id: u64) -> Result<(), ClusterError>;

    /// Place the given workers into graceful-shutdown mode.
    fn set_shutdown_mode(&self, worker_ids: &[u64]) -> Result<(), ClusterError>;

    fn all_worker_ids(&self) -> Vec<u64>;
}

/// The master's locally retained console-output store.
pub trait ConsoleStore: Send + Sync {
    /// Fetch up to `max_lines` of console output for an atom, starting
    /// at `offset_line` (default: the tail). `NotFound` means the
    /// output is not persisted locally, which is the fallback trigger.
    fn console_output(
        &self,
        build_id: u64,
        subjob_id: u64,
        atom_id: u64,
        max_lines: usize,
        offset_line: Option<usize>,
    ) -> Result<Value, ClusterError>;
}

/// The event log collaborator.
pub trait EventLog: Send + Sync {
    /// Append an event with the given tag and payload.
    fn record(&self, tag: &str, data: Value);

    /// Events after the given timestamp and/or id, oldest first.
    fn events(&self, since_timestamp: Option<f64>, since_id: Option<u64>) -> Vec<Value>;
}
