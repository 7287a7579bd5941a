//! Interrupt notification (§4.9 step 5): fire-and-forget delivery to an
//! external operator-facing surface. Failure never rolls back the checkpoint
//! — the checkpoint is already persisted by the time this runs.

use async_trait::async_trait;
use gomind_core::ExecutionCheckpoint;
use tracing::warn;

#[async_trait]
pub trait InterruptNotifier: Send + Sync {
    async fn notify(&self, checkpoint: &ExecutionCheckpoint);
}

/// Posts the checkpoint as JSON to a configured webhook URL. Errors are
/// logged, never propagated — notification is explicitly non-blocking and
/// best-effort per §4.9.
pub struct WebhookNotifier {
    url: String,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), http: reqwest::Client::new() }
    }
}

#[async_trait]
impl InterruptNotifier for WebhookNotifier {
    async fn notify(&self, checkpoint: &ExecutionCheckpoint) {
        if let Err(err) = self.http.post(&self.url).json(checkpoint).send().await {
            warn!(checkpoint_id = %checkpoint.checkpoint_id, error = %err, "interrupt webhook notification failed");
        }
    }
}

/// A notifier that does nothing, for deployments without an operator webhook
/// configured.
pub struct NoopNotifier;

#[async_trait]
impl InterruptNotifier for NoopNotifier {
    async fn notify(&self, _checkpoint: &ExecutionCheckpoint) {}
}
