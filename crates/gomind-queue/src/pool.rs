//! Worker Pool (§4.11): N workers draining the Task Queue, each dispatching
//! to a handler keyed by `task.type` under panic recovery and a per-task
//! timeout.

use crate::handler::{ProgressReporter, TaskHandler};
use crate::queue::TaskQueue;
use crate::store::TaskStore;
use gomind_core::{Task, TaskError, TaskStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum WorkerPoolError {
    #[error("worker pool is already started")]
    AlreadyStarted,
    #[error("worker pool is not running")]
    NotRunning,
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub dequeue_poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { worker_count: 5, dequeue_poll_interval: Duration::from_secs(1) }
    }
}

pub struct WorkerPool {
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn TaskStore>,
    handlers: Arc<HashMap<String, Arc<dyn TaskHandler>>>,
    config: WorkerPoolConfig,
    started: AtomicBool,
    shutdown: CancellationToken,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn TaskQueue>, store: Arc<dyn TaskStore>, handlers: HashMap<String, Arc<dyn TaskHandler>>, config: WorkerPoolConfig) -> Self {
        Self {
            queue,
            store,
            handlers: Arc::new(handlers),
            config,
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            workers: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Idempotent-rejecting: a double `start` returns `AlreadyStarted`
    /// rather than spawning a second fleet of workers.
    pub async fn start(&self) -> Result<(), WorkerPoolError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(WorkerPoolError::AlreadyStarted);
        }
        let mut workers = self.workers.lock().await;
        for worker_id in 0..self.config.worker_count {
            let queue = self.queue.clone();
            let store = self.store.clone();
            let handlers = self.handlers.clone();
            let shutdown = self.shutdown.clone();
            let poll_interval = self.config.dequeue_poll_interval;
            workers.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, store, handlers, shutdown, poll_interval).await;
            }));
        }
        Ok(())
    }

    /// Signals all workers to stop accepting new tasks and waits for
    /// in-flight handlers to drain, bounded by `deadline`.
    pub async fn stop(&self, deadline: Duration) -> Result<(), WorkerPoolError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(WorkerPoolError::NotRunning);
        }
        self.shutdown.cancel();
        let mut workers = self.workers.lock().await;
        let joins = std::mem::take(&mut *workers);
        let drain = async {
            for handle in joins {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(deadline, drain).await.is_err() {
            warn!("worker pool stop deadline exceeded, some workers may still be draining");
        }
        Ok(())
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn TaskQueue>,
    store: Arc<dyn TaskStore>,
    handlers: Arc<HashMap<String, Arc<dyn TaskHandler>>>,
    shutdown: CancellationToken,
    poll_interval: Duration,
) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        let task = tokio::select! {
            _ = shutdown.cancelled() => return,
            task = queue.dequeue(poll_interval) => task,
        };
        let Some(task) = task else { continue };
        dispatch(worker_id, &task, &store, &handlers).await;
    }
}

async fn dispatch(worker_id: usize, task: &Task, store: &Arc<dyn TaskStore>, handlers: &HashMap<String, Arc<dyn TaskHandler>>) {
    let Some(handler) = handlers.get(&task.task_type).cloned() else {
        warn!(worker_id, task_id = %task.id, task_type = %task.task_type, "no handler registered for task type");
        let _ = store.fail(&task.id, TaskError { code: "unknown_task_type".to_string(), message: format!("no handler registered for task type {}", task.task_type), details: None }).await;
        return;
    };
    let _ = store.mark_running(&task.id).await;

    let reporter = ProgressReporter::new(store.clone(), task.id.clone());
    let task_for_handler = task.clone();
    let timeout = task.options.timeout;

    let run = tokio::spawn(async move { handler.handle(&task_for_handler, reporter).await });

    let outcome = match tokio::time::timeout(timeout, run).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            let message = if join_error.is_panic() { "task handler panicked".to_string() } else { "task handler was cancelled".to_string() };
            error!(worker_id, task_id = %task.id, %message, "task execution failed");
            Err(TaskError { code: "handler_panic".to_string(), message, details: None })
        }
        Err(_) => Err(TaskError { code: "timeout".to_string(), message: format!("task exceeded its {:?} timeout", timeout), details: None }),
    };

    match outcome {
        Ok(result) => {
            info!(worker_id, task_id = %task.id, "task completed");
            let _ = store.complete(&task.id, result).await;
        }
        Err(error) => {
            let _ = store.fail(&task.id, error).await;
        }
    }
}
