//! Task Store: the persisted record backing the inbound Task API (§6).

use chrono::Utc;
use dashmap::DashMap;
use gomind_core::{Task, TaskError, TaskProgress, TaskStatus};
use serde_json::Value as Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("task {0} is already in a terminal state")]
    NotCancellable(String),
}

#[async_trait::async_trait]
pub trait TaskStore: Send + Sync {
    async fn put(&self, task: Task);
    async fn get(&self, id: &str) -> Option<Task>;
    async fn mark_running(&self, id: &str) -> Result<(), TaskStoreError>;
    async fn update_progress(&self, id: &str, progress: TaskProgress) -> Result<(), TaskStoreError>;
    async fn complete(&self, id: &str, result: Json) -> Result<(), TaskStoreError>;
    async fn fail(&self, id: &str, error: TaskError) -> Result<(), TaskStoreError>;
    /// Transitions a queued/running task to `cancelled`. Terminal tasks
    /// return `NotCancellable` (§5 "Cancellation").
    async fn cancel(&self, id: &str) -> Result<(), TaskStoreError>;
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: DashMap<String, Task>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate<F>(&self, id: &str, f: F) -> Result<(), TaskStoreError>
    where
        F: FnOnce(&mut Task),
    {
        let mut entry = self.tasks.get_mut(id).ok_or_else(|| TaskStoreError::NotFound(id.to_string()))?;
        f(&mut entry);
        Ok(())
    }
}

#[async_trait::async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn put(&self, task: Task) {
        self.tasks.insert(task.id.clone(), task);
    }

    async fn get(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).map(|entry| entry.value().clone())
    }

    async fn mark_running(&self, id: &str) -> Result<(), TaskStoreError> {
        self.mutate(id, |task| {
            task.status = TaskStatus::Running;
            task.started_at = Some(Utc::now());
        })
    }

    async fn update_progress(&self, id: &str, progress: TaskProgress) -> Result<(), TaskStoreError> {
        self.mutate(id, |task| task.progress = Some(progress))
    }

    async fn complete(&self, id: &str, result: Json) -> Result<(), TaskStoreError> {
        self.mutate(id, |task| {
            task.status = TaskStatus::Completed;
            task.result = Some(result);
            task.completed_at = Some(Utc::now());
        })
    }

    async fn fail(&self, id: &str, error: TaskError) -> Result<(), TaskStoreError> {
        self.mutate(id, |task| {
            task.status = TaskStatus::Failed;
            task.error = Some(error);
            task.completed_at = Some(Utc::now());
        })
    }

    async fn cancel(&self, id: &str) -> Result<(), TaskStoreError> {
        let mut entry = self.tasks.get_mut(id).ok_or_else(|| TaskStoreError::NotFound(id.to_string()))?;
        if entry.status.is_terminal() {
            return Err(TaskStoreError::NotCancellable(id.to_string()));
        }
        entry.status = TaskStatus::Cancelled;
        entry.cancelled_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gomind_core::TaskOptions;
    use serde_json::json;

    #[tokio::test]
    async fn cancel_terminal_task_fails() {
        let store = InMemoryTaskStore::new();
        store.put(Task::new("t1".to_string(), "echo".to_string(), json!({}), TaskOptions::default())).await;
        store.complete("t1", json!({"ok": true})).await.unwrap();
        let result = store.cancel("t1").await;
        assert!(matches!(result, Err(TaskStoreError::NotCancellable(_))));
    }

    #[tokio::test]
    async fn cancel_queued_task_succeeds() {
        let store = InMemoryTaskStore::new();
        store.put(Task::new("t1".to_string(), "echo".to_string(), json!({}), TaskOptions::default())).await;
        store.cancel("t1").await.unwrap();
        let task = store.get("t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert!(task.cancelled_at.is_some());
    }
}
