use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use foresight_domain::models::{WorkerRegistration, WorkerState, WorkerStatus};
use foresight_errors::{SchedulerError, SchedulerResult};

struct WorkerEntry {
    state: WorkerState,
    /// Monotonic heartbeat timestamp; wall-clock stays in `state`.
    last_seen: Instant,
}

/// In-memory directory of workers keyed by id.
///
/// The registry is the sole owner of live `WorkerState`; every read returns
/// a cloned snapshot, and writes are linearized per worker id by the lock.
/// Enumeration is id-ordered so equal inputs always produce equal output.
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, WorkerEntry>>,
    heartbeat_timeout: Duration,
}

impl WorkerRegistry {
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            heartbeat_timeout,
        }
    }

    pub fn register(&self, registration: WorkerRegistration) -> SchedulerResult<WorkerState> {
        let state = WorkerState::new(registration);
        let mut workers = self.write()?;
        info!(worker_id = %state.id, "worker registered");
        workers.insert(
            state.id.clone(),
            WorkerEntry {
                state: state.clone(),
                last_seen: Instant::now(),
            },
        );
        Ok(state)
    }

    pub fn unregister(&self, worker_id: &str) -> SchedulerResult<()> {
        let mut workers = self.write()?;
        if workers.remove(worker_id).is_none() {
            return Err(SchedulerError::worker_not_found(worker_id));
        }
        info!(worker_id, "worker unregistered");
        Ok(())
    }

    /// Delete a worker without treating absence as an error. Used by the
    /// reaper's removed-timeout path.
    pub fn remove(&self, worker_id: &str) -> SchedulerResult<Option<WorkerState>> {
        let mut workers = self.write()?;
        Ok(workers.remove(worker_id).map(|e| e.state))
    }

    /// Touch the heartbeat and fold in the reported load and queue depth.
    /// A worker that was reaped offline comes back schedulable here.
    pub fn heartbeat(
        &self,
        worker_id: &str,
        load: f64,
        active_tasks: u32,
        at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        let mut workers = self.write()?;
        let entry = workers
            .get_mut(worker_id)
            .ok_or_else(|| SchedulerError::worker_not_found(worker_id))?;

        entry.last_seen = Instant::now();
        entry.state.last_heartbeat = at;
        entry.state.set_load(load);
        entry.state.active_tasks = active_tasks;
        if !matches!(entry.state.status, WorkerStatus::Draining) {
            entry.state.status = if active_tasks > 0 {
                WorkerStatus::Busy
            } else {
                WorkerStatus::Idle
            };
        }
        Ok(())
    }

    pub fn update_status(&self, worker_id: &str, status: WorkerStatus) -> SchedulerResult<()> {
        let mut workers = self.write()?;
        let entry = workers
            .get_mut(worker_id)
            .ok_or_else(|| SchedulerError::worker_not_found(worker_id))?;
        entry.state.status = status;
        Ok(())
    }

    pub fn update_load(&self, worker_id: &str, load: f64) -> SchedulerResult<()> {
        let mut workers = self.write()?;
        let entry = workers
            .get_mut(worker_id)
            .ok_or_else(|| SchedulerError::worker_not_found(worker_id))?;
        entry.state.set_load(load);
        Ok(())
    }

    pub fn get(&self, worker_id: &str) -> Option<WorkerState> {
        self.read()
            .ok()
            .and_then(|workers| workers.get(worker_id).map(|e| e.state.clone()))
    }

    pub fn list(&self) -> Vec<WorkerState> {
        let mut all: Vec<WorkerState> = match self.read() {
            Ok(workers) => workers.values().map(|e| e.state.clone()).collect(),
            Err(_) => Vec::new(),
        };
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Workers eligible for new work right now: schedulable status, fresh
    /// heartbeat, spare concurrency and a superset of the required
    /// capabilities. Returned id-ordered.
    pub fn available(&self, required_capabilities: &[String]) -> Vec<WorkerState> {
        let mut eligible: Vec<WorkerState> = match self.read() {
            Ok(workers) => workers
                .values()
                .filter(|e| {
                    e.state.is_schedulable()
                        && e.last_seen.elapsed() < self.heartbeat_timeout
                        && e.state.has_capacity()
                        && e.state.has_capabilities(required_capabilities)
                })
                .map(|e| e.state.clone())
                .collect(),
            Err(_) => Vec::new(),
        };
        eligible.sort_by(|a, b| a.id.cmp(&b.id));
        eligible
    }

    /// Heartbeat age of every worker, for the reaper's threshold checks.
    pub fn heartbeat_ages(&self) -> Vec<(String, Duration)> {
        match self.read() {
            Ok(workers) => workers
                .iter()
                .map(|(id, e)| (id.clone(), e.last_seen.elapsed()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Mark every worker whose heartbeat is older than `older_than` as
    /// offline and return their ids. Never deletes.
    pub fn reap(&self, older_than: Duration) -> Vec<String> {
        let mut reaped = Vec::new();
        if let Ok(mut workers) = self.write() {
            for (id, entry) in workers.iter_mut() {
                if entry.last_seen.elapsed() >= older_than
                    && entry.state.status != WorkerStatus::Offline
                {
                    entry.state.status = WorkerStatus::Offline;
                    debug!(worker_id = %id, "reaped stale worker");
                    reaped.push(id.clone());
                }
            }
        }
        reaped.sort();
        reaped
    }

    pub fn len(&self) -> usize {
        self.read().map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(
        &self,
    ) -> SchedulerResult<std::sync::RwLockReadGuard<'_, HashMap<String, WorkerEntry>>> {
        self.workers
            .read()
            .map_err(|_| SchedulerError::Internal("worker registry lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> SchedulerResult<std::sync::RwLockWriteGuard<'_, HashMap<String, WorkerEntry>>> {
        self.workers
            .write()
            .map_err(|_| SchedulerError::Internal("worker registry lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(id: &str, capabilities: &[&str], max: u32) -> WorkerRegistration {
        WorkerRegistration {
            worker_id: id.to_string(),
            capabilities: capabilities.iter().map(|s| s.to_string()).collect(),
            max_concurrency: max,
        }
    }

    fn registry() -> WorkerRegistry {
        WorkerRegistry::new(Duration::from_secs(30))
    }

    #[test]
    fn test_register_and_get() {
        let registry = registry();
        registry.register(registration("w1", &["gpu"], 4)).unwrap();

        let state = registry.get("w1").unwrap();
        assert_eq!(state.status, WorkerStatus::Idle);
        assert_eq!(state.max_concurrency, 4);
        assert!(registry.get("w2").is_none());
    }

    #[test]
    fn test_unregister_unknown_worker_errors() {
        let registry = registry();
        assert!(matches!(
            registry.unregister("ghost"),
            Err(SchedulerError::WorkerNotFound { .. })
        ));
    }

    #[test]
    fn test_heartbeat_updates_state() {
        let registry = registry();
        registry.register(registration("w1", &[], 4)).unwrap();

        registry.heartbeat("w1", 1.4, 2, Utc::now()).unwrap();
        let state = registry.get("w1").unwrap();
        assert_eq!(state.current_load, 1.0); // clamped
        assert_eq!(state.active_tasks, 2);
        assert_eq!(state.status, WorkerStatus::Busy);

        registry.heartbeat("w1", 0.1, 0, Utc::now()).unwrap();
        assert_eq!(registry.get("w1").unwrap().status, WorkerStatus::Idle);
    }

    #[test]
    fn test_heartbeat_preserves_draining() {
        let registry = registry();
        registry.register(registration("w1", &[], 4)).unwrap();
        registry
            .update_status("w1", WorkerStatus::Draining)
            .unwrap();

        registry.heartbeat("w1", 0.5, 1, Utc::now()).unwrap();
        assert_eq!(registry.get("w1").unwrap().status, WorkerStatus::Draining);
    }

    #[test]
    fn test_available_filters_status_capacity_capabilities() {
        let registry = registry();
        registry.register(registration("w1", &["gpu"], 2)).unwrap();
        registry.register(registration("w2", &["gpu"], 2)).unwrap();
        registry.register(registration("w3", &[], 2)).unwrap();
        registry.register(registration("w4", &["gpu"], 2)).unwrap();

        registry.update_status("w2", WorkerStatus::Offline).unwrap();
        registry.heartbeat("w4", 0.3, 2, Utc::now()).unwrap(); // full

        let gpu = vec!["gpu".to_string()];
        let eligible = registry.available(&gpu);
        let ids: Vec<&str> = eligible.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["w1"]);

        // Without the capability filter w3 is eligible too.
        let eligible = registry.available(&[]);
        let ids: Vec<&str> = eligible.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec!["w1", "w3"]);
    }

    #[test]
    fn test_available_excludes_stale_heartbeats() {
        let registry = WorkerRegistry::new(Duration::from_millis(40));
        registry.register(registration("w1", &[], 2)).unwrap();
        assert_eq!(registry.available(&[]).len(), 1);

        std::thread::sleep(Duration::from_millis(60));
        assert!(registry.available(&[]).is_empty());
    }

    #[test]
    fn test_enumeration_is_id_ordered() {
        let registry = registry();
        for id in ["w3", "w1", "w2"] {
            registry.register(registration(id, &[], 2)).unwrap();
        }
        let ids: Vec<String> = registry.list().into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec!["w1", "w2", "w3"]);
    }

    #[test]
    fn test_reap_marks_offline_without_deleting() {
        let registry = registry();
        registry.register(registration("w1", &[], 2)).unwrap();

        std::thread::sleep(Duration::from_millis(30));
        let reaped = registry.reap(Duration::from_millis(10));
        assert_eq!(reaped, vec!["w1".to_string()]);
        assert_eq!(registry.get("w1").unwrap().status, WorkerStatus::Offline);
        assert_eq!(registry.len(), 1);

        // Already-offline workers are not reaped again.
        assert!(registry.reap(Duration::from_millis(10)).is_empty());
    }

    #[test]
    fn test_heartbeat_revives_reaped_worker() {
        let registry = registry();
        registry.register(registration("w1", &[], 2)).unwrap();
        registry.update_status("w1", WorkerStatus::Offline).unwrap();
        assert!(registry.available(&[]).is_empty());

        registry.heartbeat("w1", 0.2, 0, Utc::now()).unwrap();
        assert_eq!(registry.available(&[]).len(), 1);
    }
}
