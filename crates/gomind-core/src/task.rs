//! Async task submission types (§3, §4.11).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

/// Structured error carried by a failed [`Task`] (§7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<Json>,
}

/// Mid-run progress reported by a worker for a long-lived task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskProgress {
    pub percent: Option<f32>,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOptions {
    pub timeout: Duration,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(30 * 60) }
    }
}

/// An asynchronously-executed unit of work, decoupled from submission by the
/// Task Queue (§4.11).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub status: TaskStatus,
    pub input: Json,
    pub result: Option<Json>,
    pub error: Option<TaskError>,
    pub progress: Option<TaskProgress>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub trace_id: Option<String>,
    pub parent_span_id: Option<String>,
    pub options: TaskOptions,
}

impl Task {
    pub fn new(id: String, task_type: String, input: Json, options: TaskOptions) -> Self {
        Self {
            id,
            task_type,
            status: TaskStatus::Queued,
            input,
            result: None,
            error: None,
            progress: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            trace_id: None,
            parent_span_id: None,
            options,
        }
    }
}
