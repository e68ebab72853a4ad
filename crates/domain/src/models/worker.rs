use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Worker scheduling status as reported over the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Draining,
    Offline,
}

/// Live state of a worker node as tracked by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerState {
    pub id: String,
    pub status: WorkerStatus,
    pub capabilities: Vec<String>,
    pub current_load: f64,
    pub active_tasks: u32,
    pub max_concurrency: u32,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

/// Registration request for a new worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub worker_id: String,
    pub capabilities: Vec<String>,
    pub max_concurrency: u32,
}

impl WorkerState {
    pub fn new(registration: WorkerRegistration) -> Self {
        let now = Utc::now();
        Self {
            id: registration.worker_id,
            status: WorkerStatus::Idle,
            capabilities: registration.capabilities,
            current_load: 0.0,
            active_tasks: 0,
            max_concurrency: registration.max_concurrency.max(1),
            last_heartbeat: now,
            registered_at: now,
        }
    }

    /// Offline and draining workers never receive new work.
    pub fn is_schedulable(&self) -> bool {
        !matches!(self.status, WorkerStatus::Offline | WorkerStatus::Draining)
    }

    pub fn has_capacity(&self) -> bool {
        self.active_tasks < self.max_concurrency
    }

    /// The worker must advertise a superset of the required capabilities.
    pub fn has_capabilities(&self, required: &[String]) -> bool {
        required
            .iter()
            .all(|cap| self.capabilities.iter().any(|c| c == cap))
    }

    pub fn set_load(&mut self, load: f64) {
        self.current_load = load.clamp(0.0, 1.0);
    }

    /// Fraction of concurrency slots in use.
    pub fn saturation(&self) -> f64 {
        if self.max_concurrency == 0 {
            0.0
        } else {
            self.active_tasks as f64 / self.max_concurrency as f64
        }
    }
}

/// Health class derived purely from heartbeat age and load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerHealth {
    Healthy,
    Degraded,
    Unhealthy,
    Removed,
}

/// Derived capacity snapshot for one worker, recomputed on every heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerCapacity {
    pub worker_id: String,
    pub queue_depth: u32,
    pub estimated_free_at: DateTime<Utc>,
    pub health: WorkerHealth,
    pub avg_task_duration_ms: f64,
}

/// One telemetry record from the worker heartbeat stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRecord {
    pub worker_id: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub queue_depth: u32,
    pub timestamp_ms: i64,
}

impl HeartbeatRecord {
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp_ms).unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(status: WorkerStatus, active: u32, max: u32) -> WorkerState {
        let mut w = WorkerState::new(WorkerRegistration {
            worker_id: "w1".to_string(),
            capabilities: vec!["gpu".to_string(), "x86".to_string()],
            max_concurrency: max,
        });
        w.status = status;
        w.active_tasks = active;
        w
    }

    #[test]
    fn test_schedulable_excludes_offline_and_draining() {
        assert!(worker(WorkerStatus::Idle, 0, 4).is_schedulable());
        assert!(worker(WorkerStatus::Busy, 2, 4).is_schedulable());
        assert!(!worker(WorkerStatus::Draining, 0, 4).is_schedulable());
        assert!(!worker(WorkerStatus::Offline, 0, 4).is_schedulable());
    }

    #[test]
    fn test_capacity_bound() {
        assert!(worker(WorkerStatus::Idle, 3, 4).has_capacity());
        assert!(!worker(WorkerStatus::Idle, 4, 4).has_capacity());
    }

    #[test]
    fn test_capability_superset() {
        let w = worker(WorkerStatus::Idle, 0, 4);
        assert!(w.has_capabilities(&[]));
        assert!(w.has_capabilities(&["gpu".to_string()]));
        assert!(!w.has_capabilities(&["gpu".to_string(), "arm".to_string()]));
    }

    #[test]
    fn test_load_is_clamped() {
        let mut w = worker(WorkerStatus::Idle, 0, 4);
        w.set_load(1.7);
        assert_eq!(w.current_load, 1.0);
        w.set_load(-0.2);
        assert_eq!(w.current_load, 0.0);
    }

    #[test]
    fn test_heartbeat_wire_format() {
        let json = r#"{"workerId":"w1","cpuUsage":0.5,"memoryUsage":0.25,"queueDepth":3,"timestampMs":1714557600000}"#;
        let record: HeartbeatRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.worker_id, "w1");
        assert_eq!(record.queue_depth, 3);
        assert_eq!(record.timestamp().timestamp_millis(), 1714557600000);
    }
}
