use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use foresight_errors::{SchedulerError, SchedulerResult};

/// A unit of work read off the task stream.
///
/// `task_type` is the stable key the predictor learns per; it must be
/// non-empty whenever completion feedback is expected for the task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub priority: i32,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    #[serde(rename = "requiredCapabilities", default)]
    pub required_capabilities: Vec<String>,
    #[serde(rename = "maxRetries", default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(rename = "timeoutMs", default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Task {
    /// Parse a task out of the flat string fields of a stream record.
    ///
    /// Required fields: `id`, `type`. `payload` and `metadata` are JSON
    /// encoded strings, `priority` an integer string, `createdAt` RFC-3339.
    /// Any malformed field fails the whole record so the caller can drain it
    /// as a poison message.
    pub fn from_stream_fields(fields: &HashMap<String, String>) -> SchedulerResult<Self> {
        let id = fields
            .get("id")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SchedulerError::invalid_task("missing field: id"))?
            .clone();
        let task_type = fields
            .get("type")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| SchedulerError::invalid_task("missing field: type"))?
            .clone();

        let priority = match fields.get("priority") {
            Some(raw) => raw.parse::<i32>().map_err(|e| {
                SchedulerError::invalid_task(format!("priority is not an integer: {e}"))
            })?,
            None => 0,
        };

        let created_at = match fields.get("createdAt") {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map_err(|e| {
                    SchedulerError::invalid_task(format!("createdAt is not RFC-3339: {e}"))
                })?
                .with_timezone(&Utc),
            None => Utc::now(),
        };

        let payload = match fields.get("payload") {
            Some(raw) => serde_json::from_str(raw).map_err(|e| {
                SchedulerError::invalid_task(format!("payload is not valid JSON: {e}"))
            })?,
            None => serde_json::Value::Object(serde_json::Map::new()),
        };

        let metadata = match fields.get("metadata") {
            Some(raw) => Some(serde_json::from_str(raw).map_err(|e| {
                SchedulerError::invalid_task(format!("metadata is not valid JSON: {e}"))
            })?),
            None => None,
        };

        let required_capabilities = fields
            .get("requiredCapabilities")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            id,
            task_type,
            priority,
            created_at,
            payload,
            required_capabilities,
            max_retries: None,
            timeout_ms: None,
            metadata,
        })
    }

    /// Priority saturated into `[0, max_priority]` for scoring.
    pub fn clamped_priority(&self, max_priority: i32) -> i32 {
        self.priority.clamp(0, max_priority)
    }
}
