//! Shared data model and cross-cutting types for the GoMind execution core.
//!
//! This crate has no collaborator dependencies (no LLM client, no HTTP
//! client): every other crate in the workspace depends on it, never the
//! other way around, to keep the catalog/planner/executor/HITL layers from
//! importing each other directly (§9 design notes).

pub mod capability;
pub mod checkpoint;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod plan;
pub mod result;
pub mod task;
pub mod value;

pub use capability::{AgentRecord, Capability, CapabilityParameter, Health, RecordType, RequestMetadata};
pub use checkpoint::{CheckpointStatus, DefaultAction, ExecutionCheckpoint, ExpiryBehavior, InterruptDecision, InterruptPoint};
pub use command::{Command, CommandType};
pub use config::GoMindConfig;
pub use context::{RequestContext, ResumePointKey};
pub use error::{GoMindError, GoMindResult};
pub use plan::{PlanMode, PlanValidationError, RoutingPlan, RoutingStep, StepMetadata};
pub use result::{ExecutionResult, StepAttempts, StepResult};
pub use task::{Task, TaskError, TaskOptions, TaskProgress, TaskStatus};
pub use value::ParamValue;
