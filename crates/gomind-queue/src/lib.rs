//! The Task Queue / Worker Pool (§4.11): decouples task submission from
//! execution behind a registered-handler dispatch table.

pub mod handler;
pub mod pool;
pub mod queue;
pub mod store;

pub use handler::{ProgressReporter, TaskHandler};
pub use pool::{WorkerPool, WorkerPoolConfig, WorkerPoolError};
pub use queue::{InMemoryTaskQueue, TaskQueue};
pub use store::{InMemoryTaskStore, TaskStore, TaskStoreError};
