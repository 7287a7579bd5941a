//! The Task Queue half of §4.11: decouples submission from execution.

use gomind_core::Task;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

#[async_trait::async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: Task);
    /// Waits up to `timeout` for a task; returns `None` on timeout, matching
    /// the long-poll `Dequeue(timeout)` semantics used by workers.
    async fn dequeue(&self, timeout: Duration) -> Option<Task>;
    async fn len(&self) -> usize;
}

/// FIFO in-memory queue. A single `Notify` wakes every waiting worker on
/// each enqueue; losers simply re-check the queue and go back to waiting.
pub struct InMemoryTaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    notify: Arc<Notify>,
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self { tasks: Mutex::new(VecDeque::new()), notify: Arc::new(Notify::new()) }
    }
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: Task) {
        self.tasks.lock().await.push_back(task);
        self.notify.notify_waiters();
    }

    async fn dequeue(&self, timeout: Duration) -> Option<Task> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(task) = self.tasks.lock().await.pop_front() {
                return Some(task);
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let notified = self.notify.notified();
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return None;
            }
        }
    }

    async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }
}
