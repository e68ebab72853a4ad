//! Fluent builders for domain objects with sensible test defaults.

use chrono::{Duration, Utc};

use foresight_domain::models::{
    CompletionEvent, HeartbeatRecord, Task, WorkerRegistration, WorkerState,
};

pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(id: &str, task_type: &str) -> Self {
        Self {
            task: Task {
                id: id.to_string(),
                task_type: task_type.to_string(),
                priority: 0,
                created_at: Utc::now(),
                payload: serde_json::Value::Object(serde_json::Map::new()),
                required_capabilities: Vec::new(),
                max_retries: None,
                timeout_ms: None,
                metadata: None,
            },
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn capability(mut self, capability: &str) -> Self {
        self.task.required_capabilities.push(capability.to_string());
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.task.payload = payload;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

pub struct WorkerBuilder {
    state: WorkerState,
}

impl WorkerBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            state: WorkerState::new(WorkerRegistration {
                worker_id: id.to_string(),
                capabilities: Vec::new(),
                max_concurrency: 4,
            }),
        }
    }

    pub fn capability(mut self, capability: &str) -> Self {
        self.state.capabilities.push(capability.to_string());
        self
    }

    pub fn max_concurrency(mut self, max: u32) -> Self {
        self.state.max_concurrency = max;
        self
    }

    pub fn active_tasks(mut self, active: u32) -> Self {
        self.state.active_tasks = active;
        self
    }

    pub fn load(mut self, load: f64) -> Self {
        self.state.set_load(load);
        self
    }

    pub fn status(mut self, status: foresight_domain::models::WorkerStatus) -> Self {
        self.state.status = status;
        self
    }

    pub fn registration(&self) -> WorkerRegistration {
        WorkerRegistration {
            worker_id: self.state.id.clone(),
            capabilities: self.state.capabilities.clone(),
            max_concurrency: self.state.max_concurrency,
        }
    }

    pub fn build(self) -> WorkerState {
        self.state
    }
}

pub struct HeartbeatBuilder {
    record: HeartbeatRecord,
}

impl HeartbeatBuilder {
    pub fn new(worker_id: &str) -> Self {
        Self {
            record: HeartbeatRecord {
                worker_id: worker_id.to_string(),
                cpu_usage: 0.2,
                memory_usage: 0.2,
                queue_depth: 0,
                timestamp_ms: Utc::now().timestamp_millis(),
            },
        }
    }

    pub fn cpu(mut self, cpu: f64) -> Self {
        self.record.cpu_usage = cpu;
        self
    }

    pub fn memory(mut self, memory: f64) -> Self {
        self.record.memory_usage = memory;
        self
    }

    pub fn queue_depth(mut self, depth: u32) -> Self {
        self.record.queue_depth = depth;
        self
    }

    pub fn build(self) -> HeartbeatRecord {
        self.record
    }
}

pub struct CompletionBuilder {
    event: CompletionEvent,
}

impl CompletionBuilder {
    pub fn new(task_id: &str, task_type: &str, worker_id: &str, duration_ms: u64) -> Self {
        let completed_at = Utc::now();
        Self {
            event: CompletionEvent {
                task_id: task_id.to_string(),
                task_type: task_type.to_string(),
                worker_id: worker_id.to_string(),
                started_at: completed_at - Duration::milliseconds(duration_ms as i64),
                completed_at,
                duration_ms,
                success: true,
                predicted_duration_ms: None,
            },
        }
    }

    pub fn predicted(mut self, predicted_ms: f64) -> Self {
        self.event.predicted_duration_ms = Some(predicted_ms);
        self
    }

    pub fn failed(mut self) -> Self {
        self.event.success = false;
        self
    }

    pub fn build(self) -> CompletionEvent {
        self.event
    }
}
