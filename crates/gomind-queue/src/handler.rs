//! Task handler registration: dispatch is keyed by `task.type` (§4.11).

use crate::store::TaskStore;
use chrono::Utc;
use gomind_core::{Task, TaskError, TaskProgress};
use serde_json::Value as Json;
use std::sync::Arc;

#[async_trait::async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task, progress: ProgressReporter) -> Result<Json, TaskError>;
}

/// Handed to a running handler so it can persist [`TaskProgress`] updates
/// mid-run without holding a reference to the whole store's write surface.
#[derive(Clone)]
pub struct ProgressReporter {
    store: Arc<dyn TaskStore>,
    task_id: String,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn TaskStore>, task_id: String) -> Self {
        Self { store, task_id }
    }

    pub async fn report(&self, percent: Option<f32>, message: Option<String>) {
        let progress = TaskProgress { percent, message, updated_at: Utc::now() };
        let _ = self.store.update_progress(&self.task_id, progress).await;
    }
}
