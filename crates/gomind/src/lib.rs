//! GoMind: a multi-agent orchestration facade wiring the Planner, the
//! parameter Binding Engine, the DAG Executor, the Synthesizer, the HITL
//! Controller and the Task Queue into one request/resume API.
//!
//! Individual concerns live in their own crates (`gomind-catalog`,
//! `gomind-llm`, `gomind-planner`, `gomind-binding`, `gomind-executor`,
//! `gomind-hitl`, `gomind-queue`); this crate only wires them together.

pub mod hitl_adapter;
pub mod orchestrator;
pub mod task_handler;

pub use hitl_adapter::HitlControllerGate;
pub use orchestrator::{Orchestrator, ProcessOutcome};
pub use task_handler::{RequestTaskHandler, REQUEST_TASK_TYPE};

pub use gomind_binding;
pub use gomind_catalog;
pub use gomind_core;
pub use gomind_executor;
pub use gomind_hitl;
pub use gomind_llm;
pub use gomind_planner;
pub use gomind_queue;
