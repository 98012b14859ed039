//! In-memory reference implementation of the cluster collaborators.
//!
//! Backs the binary in single-process operation and gives tests a
//! seedable fake. State lives behind its own synchronization (`RwLock`
//! for the ordered build list, `DashMap` for the worker directory), so
//! request handlers never need exclusive access.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde_json::{json, Value};

use crate::cluster::{
    ArchiveFormat, BuildScheduler, ClusterError, ConsoleStore, EventLog, WorkerRegistry,
};

#[derive(Debug, Clone)]
struct AtomRecord {
    id: u64,
    command: String,
    state: String,
}

#[derive(Debug, Clone)]
struct SubjobRecord {
    id: u64,
    state: String,
    worker_url: Option<String>,
    atoms: Vec<AtomRecord>,
}

#[derive(Debug, Clone)]
struct BuildRecord {
    id: u64,
    state: String,
    params: Value,
    subjobs: Vec<SubjobRecord>,
}

#[derive(Debug, Clone)]
struct WorkerRecord {
    id: u64,
    url: String,
    num_executors: u32,
    state: String,
    session_id: Option<String>,
    last_heartbeat: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Single-process implementation of all collaborator traits.
pub struct InMemoryCluster {
    results_directory: PathBuf,
    builds: RwLock<BTreeMap<u64, BuildRecord>>,
    next_build_id: AtomicU64,
    workers: DashMap<u64, WorkerRecord>,
    next_worker_id: AtomicU64,
    console: DashMap<(u64, u64, u64), Vec<String>>,
    events: RwLock<Vec<Value>>,
    next_event_id: AtomicU64,
}

impl InMemoryCluster {
    pub fn new(results_directory: impl Into<PathBuf>) -> Self {
        Self {
            results_directory: results_directory.into(),
            builds: RwLock::new(BTreeMap::new()),
            next_build_id: AtomicU64::new(1),
            workers: DashMap::new(),
            next_worker_id: AtomicU64::new(1),
            console: DashMap::new(),
            events: RwLock::new(Vec::new()),
            next_event_id: AtomicU64::new(1),
        }
    }

    /// Seed a build with `subjobs × atoms` units. Subjobs start without
    /// an assigned worker. Returns the build id.
    pub fn seed_build(&self, subjobs: usize, atoms_per_subjob: usize) -> u64 {
        let id = self.next_build_id.fetch_add(1, Ordering::SeqCst);
        let subjobs = (0..subjobs as u64)
            .map(|subjob_id| SubjobRecord {
                id: subjob_id,
                state: "queued".to_string(),
                worker_url: None,
                atoms: (0..atoms_per_subjob as u64)
                    .map(|atom_id| AtomRecord {
                        id: atom_id,
                        command: format!("atom {atom_id}"),
                        state: "queued".to_string(),
                    })
                    .collect(),
            })
            .collect();
        let record = BuildRecord {
            id,
            state: "queued".to_string(),
            params: json!({}),
            subjobs,
        };
        if let Ok(mut builds) = self.builds.write() {
            builds.insert(id, record);
        }
        id
    }

    /// Assign a worker base URL to a subjob.
    pub fn assign_subjob_worker(&self, build_id: u64, subjob_id: u64, worker_url: &str) {
        if let Ok(mut builds) = self.builds.write() {
            if let Some(subjob) = builds
                .get_mut(&build_id)
                .and_then(|b| b.subjobs.iter_mut().find(|s| s.id == subjob_id))
            {
                subjob.worker_url = Some(worker_url.to_string());
                subjob.state = "in_progress".to_string();
            }
        }
    }

    /// Store console output lines for an atom in the local store.
    pub fn store_console_output(
        &self,
        build_id: u64,
        subjob_id: u64,
        atom_id: u64,
        lines: Vec<String>,
    ) {
        self.console.insert((build_id, subjob_id, atom_id), lines);
    }

    /// Append an event with the given tag and payload.
    pub fn record_event(&self, tag: &str, data: Value) {
        let id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        let event = json!({
            "__id__": id,
            "__tag__": tag,
            "__timestamp__": unix_now(),
            "data": data,
        });
        if let Ok(mut events) = self.events.write() {
            events.push(event);
        }
    }

    fn with_build<T>(
        &self,
        build_id: u64,
        f: impl FnOnce(&BuildRecord) -> T,
    ) -> Result<T, ClusterError> {
        let builds = self
            .builds
            .read()
            .map_err(|_| ClusterError::Rejected("build store poisoned".to_string()))?;
        builds
            .get(&build_id)
            .map(f)
            .ok_or_else(|| ClusterError::NotFound(format!("build {build_id}")))
    }

    fn with_subjob<T>(
        &self,
        build_id: u64,
        subjob_id: u64,
        f: impl FnOnce(&SubjobRecord) -> T,
    ) -> Result<T, ClusterError> {
        self.with_build(build_id, |build| {
            build
                .subjobs
                .iter()
                .find(|s| s.id == subjob_id)
                .map(f)
                .ok_or_else(|| {
                    ClusterError::NotFound(format!("subjob {subjob_id} of build {build_id}"))
                })
        })?
    }
}

fn build_representation(build: &BuildRecord) -> Value {
    json!({
        "id": build.id,
        "status": build.state,
        "num_subjobs": build.subjobs.len(),
        "request_params": build.params,
    })
}

fn subjob_representation(build_id: u64, subjob: &SubjobRecord) -> Value {
    json!({
        "id": subjob.id,
        "build_id": build_id,
        "state": subjob.state,
        "slave": subjob.worker_url,
        "num_atoms": subjob.atoms.len(),
    })
}

fn atom_representation(atom: &AtomRecord) -> Value {
    json!({
        "id": atom.id,
        "command_string": atom.command,
        "state": atom.state,
    })
}

fn worker_representation(worker: &WorkerRecord) -> Value {
    json!({
        "id": worker.id,
        "url": worker.url,
        "num_executors": worker.num_executors,
        "current_build_id": Value::Null,
        "state": worker.state,
        "session_id": worker.session_id,
        "last_heartbeat": worker.last_heartbeat,
    })
}

impl BuildScheduler for InMemoryCluster {
    fn builds(&self) -> Vec<Value> {
        self.builds
            .read()
            .map(|builds| builds.values().map(build_representation).collect())
            .unwrap_or_default()
    }

    fn active_builds(&self) -> Vec<Value> {
        self.builds
            .read()
            .map(|builds| {
                builds
                    .values()
                    .filter(|b| b.state == "queued" || b.state == "building")
                    .map(build_representation)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn build(&self, build_id: u64) -> Result<Value, ClusterError> {
        self.with_build(build_id, build_representation)
    }

    fn request_new_build(&self, params: &Value) -> Result<Value, ClusterError> {
        let valid = params.get("type").and_then(Value::as_str).is_some();
        if !valid {
            return Err(ClusterError::Rejected(
                "build request must specify a project type".to_string(),
            ));
        }
        let id = self.next_build_id.fetch_add(1, Ordering::SeqCst);
        let record = BuildRecord {
            id,
            state: "queued".to_string(),
            params: params.clone(),
            subjobs: Vec::new(),
        };
        let representation = build_representation(&record);
        let mut builds = self
            .builds
            .write()
            .map_err(|_| ClusterError::Rejected("build store poisoned".to_string()))?;
        builds.insert(id, record);
        Ok(representation)
    }

    fn update_build(&self, build_id: u64, params: &Value) -> Result<Value, ClusterError> {
        let state = params
            .get("build")
            .and_then(|b| b.get("status"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ClusterError::Rejected("update must specify build.status".to_string())
            })?;
        if state != "canceled" {
            return Err(ClusterError::Rejected(format!(
                "cannot set build state to {state}"
            )));
        }
        let mut builds = self
            .builds
            .write()
            .map_err(|_| ClusterError::Rejected("build store poisoned".to_string()))?;
        let build = builds
            .get_mut(&build_id)
            .ok_or_else(|| ClusterError::NotFound(format!("build {build_id}")))?;
        build.state = state.to_string();
        Ok(build_representation(build))
    }

    fn subjobs(&self, build_id: u64) -> Result<Vec<Value>, ClusterError> {
        self.with_build(build_id, |build| {
            build
                .subjobs
                .iter()
                .map(|s| subjob_representation(build_id, s))
                .collect()
        })
    }

    fn subjob(&self, build_id: u64, subjob_id: u64) -> Result<Value, ClusterError> {
        self.with_subjob(build_id, subjob_id, |s| {
            subjob_representation(build_id, s)
        })
    }

    fn subjob_worker_url(
        &self,
        build_id: u64,
        subjob_id: u64,
    ) -> Result<Option<String>, ClusterError> {
        self.with_subjob(build_id, subjob_id, |s| s.worker_url.clone())
    }

    fn atoms(&self, build_id: u64, subjob_id: u64) -> Result<Vec<Value>, ClusterError> {
        self.with_subjob(build_id, subjob_id, |s| {
            s.atoms.iter().map(atom_representation).collect()
        })
    }

    fn atom(&self, build_id: u64, subjob_id: u64, atom_id: u64) -> Result<Value, ClusterError> {
        self.with_subjob(build_id, subjob_id, |s| {
            s.atoms
                .iter()
                .find(|a| a.id == atom_id)
                .map(atom_representation)
                .ok_or_else(|| {
                    ClusterError::NotFound(format!(
                        "atom {atom_id} of subjob {subjob_id} of build {build_id}"
                    ))
                })
        })?
    }

    fn report_subjob_result(
        &self,
        build_id: u64,
        subjob_id: u64,
        worker_url: &str,
        _payload: &[u8],
    ) -> Result<(), ClusterError> {
        let mut builds = self
            .builds
            .write()
            .map_err(|_| ClusterError::Rejected("build store poisoned".to_string()))?;
        let build = builds
            .get_mut(&build_id)
            .ok_or_else(|| ClusterError::NotFound(format!("build {build_id}")))?;
        let subjob = build
            .subjobs
            .iter_mut()
            .find(|s| s.id == subjob_id)
            .ok_or_else(|| {
                ClusterError::NotFound(format!("subjob {subjob_id} of build {build_id}"))
            })?;
        subjob.state = "completed".to_string();
        tracing::debug!(
            build_id,
            subjob_id,
            worker_url,
            "subjob result recorded"
        );
        Ok(())
    }

    fn results_archive_path(
        &self,
        build_id: u64,
        format: ArchiveFormat,
    ) -> Result<PathBuf, ClusterError> {
        self.with_build(build_id, |build| {
            let file_name = match format {
                ArchiveFormat::Tar => "artifacts.tar.gz",
                ArchiveFormat::Zip => "artifacts.zip",
            };
            self.results_directory
                .join(build.id.to_string())
                .join(file_name)
        })
    }
}

impl WorkerRegistry for InMemoryCluster {
    fn workers(&self) -> Vec<Value> {
        let mut workers: Vec<_> = self.workers.iter().map(|w| w.clone()).collect();
        workers.sort_by_key(|w| w.id);
        workers.iter().map(worker_representation).collect()
    }

    fn worker(&self, worker_id: u64) -> Result<Value, ClusterError> {
        self.workers
            .get(&worker_id)
            .map(|w| worker_representation(&w))
            .ok_or_else(|| ClusterError::NotFound(format!("slave {worker_id}")))
    }

    fn connect_worker(
        &self,
        url: &str,
        num_executors: u32,
        session_id: Option<&str>,
    ) -> Result<Value, ClusterError> {
        // Reconnecting workers keep their id; the new session replaces
        // the old one.
        let existing = self
            .workers
            .iter()
            .find(|w| w.url == url)
            .map(|w| w.id);
        let id = existing
            .unwrap_or_else(|| self.next_worker_id.fetch_add(1, Ordering::SeqCst));
        let record = WorkerRecord {
            id,
            url: url.to_string(),
            num_executors,
            state: "idle".to_string(),
            session_id: session_id.map(str::to_string),
            last_heartbeat: unix_now(),
        };
        let representation = worker_representation(&record);
        self.workers.insert(id, record);
        Ok(representation)
    }

    fn update_worker_state(&self, worker_id: u64, state: &str) -> Result<Value, ClusterError> {
        match state {
            "idle" | "in_shutdown" | "disconnected" => {}
            other => {
                return Err(ClusterError::Rejected(format!(
                    "unknown slave state {other}"
                )))
            }
        }
        let mut worker = self
            .workers
            .get_mut(&worker_id)
            .ok_or_else(|| ClusterError::NotFound(format!("slave {worker_id}")))?;
        worker.state = state.to_string();
        worker.last_heartbeat = unix_now();
        Ok(worker_representation(&worker))
    }

    fn refresh_heartbeat(&self, worker_id: u64) -> Result<(), ClusterError> {
        let mut worker = self
            .workers
            .get_mut(&worker_id)
            .ok_or_else(|| ClusterError::NotFound(format!("slave {worker_id}")))?;
        worker.last_heartbeat = unix_now();
        Ok(())
    }

    fn set_shutdown_mode(&self, worker_ids: &[u64]) -> Result<(), ClusterError> {
        // Validate the whole batch first so the mutation never applies
        // partially.
        for id in worker_ids {
            if !self.workers.contains_key(id) {
                return Err(ClusterError::NotFound(format!("slave {id}")));
            }
        }
        for id in worker_ids {
            if let Some(mut worker) = self.workers.get_mut(id) {
                worker.state = "in_shutdown".to_string();
            }
        }
        Ok(())
    }

    fn all_worker_ids(&self) -> Vec<u64> {
        let mut ids: Vec<_> = self.workers.iter().map(|w| w.id).collect();
        ids.sort_unstable();
        ids
    }
}

impl ConsoleStore for InMemoryCluster {
    fn console_output(
        &self,
        build_id: u64,
        subjob_id: u64,
        atom_id: u64,
        max_lines: usize,
        offset_line: Option<usize>,
    ) -> Result<Value, ClusterError> {
        let lines = self
            .console
            .get(&(build_id, subjob_id, atom_id))
            .ok_or_else(|| {
                ClusterError::NotFound(format!(
                    "console output for atom {atom_id} of subjob {subjob_id} of build {build_id}"
                ))
            })?;
        let total = lines.len();
        // Default to the tail of the output, like `tail -n max_lines`.
        let offset = offset_line.unwrap_or_else(|| total.saturating_sub(max_lines));
        let offset = offset.min(total);
        let end = offset.saturating_add(max_lines).min(total);
        let content: String = lines[offset..end]
            .iter()
            .map(|l| format!("{l}\n"))
            .collect();
        Ok(json!({
            "console_output": content,
            "total_num_lines": total,
            "offset_line": offset,
            "num_lines": end - offset,
        }))
    }
}

impl EventLog for InMemoryCluster {
    fn record(&self, tag: &str, data: Value) {
        self.record_event(tag, data);
    }

    fn events(&self, since_timestamp: Option<f64>, since_id: Option<u64>) -> Vec<Value> {
        self.events
            .read()
            .map(|events| {
                events
                    .iter()
                    .filter(|e| {
                        let ts = e
                            .get("__timestamp__")
                            .and_then(Value::as_f64)
                            .unwrap_or(0.0);
                        let id = e.get("__id__").and_then(Value::as_u64).unwrap_or(0);
                        since_timestamp.map_or(true, |since| ts > since)
                            && since_id.map_or(true, |since| id > since)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_builds_are_addressable_down_to_atoms() {
        let cluster = InMemoryCluster::new("/tmp/results");
        let build_id = cluster.seed_build(2, 3);
        assert_eq!(cluster.subjobs(build_id).unwrap().len(), 2);
        assert_eq!(cluster.atoms(build_id, 1).unwrap().len(), 3);
        let atom = cluster.atom(build_id, 1, 2).unwrap();
        assert_eq!(atom["id"], 2);
        assert!(matches!(
            cluster.atom(build_id, 1, 9),
            Err(ClusterError::NotFound(_))
        ));
    }

    #[test]
    fn new_build_requires_a_project_type() {
        let cluster = InMemoryCluster::new("/tmp/results");
        let rejected = cluster.request_new_build(&json!({"url": "git://x"}));
        assert!(matches!(rejected, Err(ClusterError::Rejected(_))));
        let accepted = cluster
            .request_new_build(&json!({"type": "git", "url": "git://x"}))
            .unwrap();
        assert_eq!(accepted["status"], "queued");
    }

    #[test]
    fn console_store_defaults_to_the_tail() {
        let cluster = InMemoryCluster::new("/tmp/results");
        let lines: Vec<String> = (0..10).map(|i| format!("line {i}")).collect();
        cluster.store_console_output(1, 0, 0, lines);
        let chunk = cluster.console_output(1, 0, 0, 3, None).unwrap();
        assert_eq!(chunk["offset_line"], 7);
        assert_eq!(chunk["num_lines"], 3);
        assert_eq!(chunk["console_output"], "line 7\nline 8\nline 9\n");

        let from_start = cluster.console_output(1, 0, 0, 2, Some(0)).unwrap();
        assert_eq!(from_start["console_output"], "line 0\nline 1\n");
    }

    #[test]
    fn reconnecting_worker_keeps_its_id() {
        let cluster = InMemoryCluster::new("/tmp/results");
        let first = cluster
            .connect_worker("http://worker-1:43001", 4, Some("a"))
            .unwrap();
        let second = cluster
            .connect_worker("http://worker-1:43001", 4, Some("b"))
            .unwrap();
        assert_eq!(first["id"], second["id"]);
        assert_eq!(cluster.all_worker_ids().len(), 1);
    }

    #[test]
    fn shutdown_batch_validates_before_applying() {
        let cluster = InMemoryCluster::new("/tmp/results");
        cluster.connect_worker("http://worker-1:43001", 4, None).unwrap();
        let err = cluster.set_shutdown_mode(&[1, 99]);
        assert!(matches!(err, Err(ClusterError::NotFound(_))));
        // The existing worker must be untouched after the failed batch.
        assert_eq!(cluster.worker(1).unwrap()["state"], "idle");
        cluster.set_shutdown_mode(&[1]).unwrap();
        assert_eq!(cluster.worker(1).unwrap()["state"], "in_shutdown");
    }

    #[test]
    fn eventlog_filters_by_id() {
        let cluster = InMemoryCluster::new("/tmp/results");
        cluster.record_event("BUILD_REQUEST", json!({"build_id": 1}));
        cluster.record_event("BUILD_REQUEST", json!({"build_id": 2}));
        cluster.record_event("BUILD_REQUEST", json!({"build_id": 3}));
        assert_eq!(cluster.events(None, None).len(), 3);
        assert_eq!(cluster.events(None, Some(1)).len(), 2);
        assert_eq!(cluster.events(None, Some(3)).len(), 0);
    }
}
