//! Checkpoint Store (§3, §4.9): persistence for pending human-in-the-loop
//! checkpoints plus the background expiry sweeper.

use chrono::Utc;
use dashmap::DashMap;
use gomind_core::{CheckpointStatus, DefaultAction, ExecutionCheckpoint, ExpiryBehavior, PlanMode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::interval;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CheckpointStoreError {
    #[error("checkpoint not found: {0}")]
    NotFound(String),
    #[error("checkpoint {0} is already terminal ({1:?})")]
    AlreadyTerminal(String, CheckpointStatus),
}

/// Delivery semantics for the expiry sweeper's callback, grounded in the same
/// at-most-once/at-least-once split used by message bus subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryGuarantee {
    /// The claim transition happens before the callback runs; a callback
    /// panic never retriggers the same checkpoint (default).
    AtMostOnce,
    /// The claim transition happens only after the callback returns
    /// successfully; a panicking callback leaves the checkpoint `Pending`
    /// for the next sweep to retry.
    AtLeastOnce,
}

impl Default for DeliveryGuarantee {
    fn default() -> Self {
        Self::AtMostOnce
    }
}

#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn put(&self, checkpoint: ExecutionCheckpoint);
    async fn get(&self, checkpoint_id: &str) -> Option<ExecutionCheckpoint>;
    /// Atomically transitions a pending checkpoint to a terminal status and
    /// returns the updated checkpoint. Fails if the checkpoint doesn't exist
    /// or was already actioned — this is the "claim" used both by
    /// `ProcessCommand` and by the expiry sweeper, so only one caller ever
    /// wins the transition.
    async fn claim(&self, checkpoint_id: &str, status: CheckpointStatus) -> Result<ExecutionCheckpoint, CheckpointStoreError>;
    async fn pending_ids(&self) -> Vec<String>;
}

/// In-memory checkpoint store keyed by checkpoint id, backed by a
/// concurrent map so claims from the sweeper and from `ProcessCommand` can
/// race safely without an external lock.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: DashMap<String, ExecutionCheckpoint>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn put(&self, checkpoint: ExecutionCheckpoint) {
        self.checkpoints.insert(checkpoint.checkpoint_id.clone(), checkpoint);
    }

    async fn get(&self, checkpoint_id: &str) -> Option<ExecutionCheckpoint> {
        self.checkpoints.get(checkpoint_id).map(|entry| entry.value().clone())
    }

    async fn claim(&self, checkpoint_id: &str, status: CheckpointStatus) -> Result<ExecutionCheckpoint, CheckpointStoreError> {
        let mut entry = self
            .checkpoints
            .get_mut(checkpoint_id)
            .ok_or_else(|| CheckpointStoreError::NotFound(checkpoint_id.to_string()))?;
        if entry.status.is_terminal() {
            return Err(CheckpointStoreError::AlreadyTerminal(checkpoint_id.to_string(), entry.status));
        }
        entry.status = status;
        Ok(entry.clone())
    }

    async fn pending_ids(&self) -> Vec<String> {
        self.checkpoints
            .iter()
            .filter(|entry| matches!(entry.value().status, CheckpointStatus::Pending))
            .map(|entry| entry.key().clone())
            .collect()
    }
}

/// Resolves the terminal status a checkpoint transitions to on expiry,
/// per the §4.9 expiry behavior table.
pub fn expiry_target(decision_default_request_mode: PlanMode, request_mode: Option<PlanMode>, streaming_expiry_behavior: ExpiryBehavior, non_streaming_expiry_behavior: ExpiryBehavior, default_action: DefaultAction) -> CheckpointStatus {
    let mode = request_mode.unwrap_or_else(|| {
        warn!("checkpoint has no request_mode recorded, falling back to decision default_request_mode");
        decision_default_request_mode
    });
    let behavior = match mode {
        PlanMode::Streaming => streaming_expiry_behavior,
        PlanMode::NonStreaming => non_streaming_expiry_behavior,
    };
    match behavior {
        ExpiryBehavior::ImplicitDeny => CheckpointStatus::Expired,
        ExpiryBehavior::ApplyDefault => match default_action {
            DefaultAction::Approve => CheckpointStatus::ExpiredApproved,
            DefaultAction::Reject => CheckpointStatus::ExpiredRejected,
            DefaultAction::Abort => CheckpointStatus::ExpiredAborted,
        },
    }
}

/// Background loop scanning the pending index in batches, claiming and
/// expiring any checkpoint whose `expires_at` has passed (§4.9 "Expiry
/// sweeper"). `on_expired` is invoked after the claim for at-most-once
/// delivery, or before it for at-least-once.
pub async fn run_expiry_sweeper<F, Fut>(
    store: Arc<dyn CheckpointStore>,
    batch_size: usize,
    scan_period: Duration,
    delivery: DeliveryGuarantee,
    on_expired: F,
) where
    F: Fn(ExecutionCheckpoint) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let mut ticker = interval(scan_period);
    loop {
        ticker.tick().await;
        let now = Utc::now();
        let mut scanned = 0usize;
        for checkpoint_id in store.pending_ids().await {
            if scanned >= batch_size {
                break;
            }
            scanned += 1;
            let Some(checkpoint) = store.get(&checkpoint_id).await else { continue };
            if !checkpoint.is_expired(now) {
                continue;
            }
            let target = expiry_target(
                checkpoint.decision.default_request_mode,
                Some(checkpoint.request_mode),
                checkpoint.decision.streaming_expiry_behavior,
                checkpoint.decision.non_streaming_expiry_behavior,
                checkpoint.decision.default_action,
            );
            match delivery {
                DeliveryGuarantee::AtMostOnce => {
                    if let Ok(claimed) = store.claim(&checkpoint_id, target).await {
                        info!(checkpoint_id, ?target, "checkpoint expired");
                        if let Err(join_err) = tokio::spawn(on_expired(claimed)).await {
                            warn!(checkpoint_id, error = %join_err, "expiry callback panicked");
                        }
                    }
                }
                DeliveryGuarantee::AtLeastOnce => {
                    match tokio::spawn(on_expired(checkpoint.clone())).await {
                        Ok(()) => {
                            if let Ok(claimed) = store.claim(&checkpoint_id, target).await {
                                info!(checkpoint_id = %claimed.checkpoint_id, ?target, "checkpoint expired");
                            }
                        }
                        Err(join_err) => {
                            warn!(checkpoint_id, error = %join_err, "expiry callback panicked, checkpoint left pending for retry");
                        }
                    }
                }
            }
        }
    }
}
