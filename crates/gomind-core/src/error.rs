//! Shared error hierarchy for the execution core.
//!
//! Every crate in the workspace defines its own narrow error enum and
//! converts into [`GoMindError`] at the boundary, the same pattern the
//! teacher codebase uses for its `GlobalError` aggregation.

use thiserror::Error;

/// Top-level error type returned by the facade crate and surfaced to callers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GoMindError {
    #[error("plan validation failed: {0}")]
    PlanValidation(String),

    #[error("plan cache error: {0}")]
    PlanCache(String),

    #[error("capability not found: {0}")]
    CapabilityNotFound(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("parameter binding failed for step {step_id}: {reason}")]
    Binding { step_id: String, reason: String },

    #[error("step execution failed: {0}")]
    StepExecution(String),

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("checkpoint expired: {0}")]
    CheckpointExpired(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("llm error: {0}")]
    Llm(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type GoMindResult<T> = Result<T, GoMindError>;

impl GoMindError {
    /// Stable error code for structured HITL-facing error responses (§7).
    pub fn code(&self) -> &'static str {
        match self {
            GoMindError::PlanValidation(_) => "plan_validation_error",
            GoMindError::PlanCache(_) => "plan_cache_error",
            GoMindError::CapabilityNotFound(_) => "capability_not_found",
            GoMindError::AgentNotFound(_) => "agent_not_found",
            GoMindError::Binding { .. } => "binding_error",
            GoMindError::StepExecution(_) => "step_execution_error",
            GoMindError::CheckpointNotFound(_) => "checkpoint_not_found",
            GoMindError::CheckpointExpired(_) => "checkpoint_expired",
            GoMindError::InvalidCommand(_) => "invalid_command",
            GoMindError::Llm(_) => "llm_error",
            GoMindError::Serialization(_) => "serialization_error",
            GoMindError::Other(_) => "internal_error",
        }
    }
}
