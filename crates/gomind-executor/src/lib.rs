//! The DAG Executor (§4.6) and Synthesizer (§4.8).

pub mod executor;
pub mod graph;
pub mod hitl_gate;
pub mod synthesizer;

pub use executor::{DagExecutor, ExecutorConfig};
pub use graph::{aggregate_success, all_terminal, ready_steps, skip_transitive_dependents, StepStatus};
pub use hitl_gate::{HitlGate, HitlOutcome, NoopHitlGate};
pub use synthesizer::{SynthesisStrategy, Synthesizer};
