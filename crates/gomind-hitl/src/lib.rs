//! The HITL Controller, Policy, Checkpoint Store and Command Bus (§3, §4.9, §4.10).

pub mod checkpoint_store;
pub mod command_bus;
pub mod controller;
pub mod notifier;
pub mod policy;

pub use checkpoint_store::{run_expiry_sweeper, CheckpointStore, CheckpointStoreError, DeliveryGuarantee, InMemoryCheckpointStore};
pub use command_bus::CommandBus;
pub use controller::{ControllerError, ControllerOutcome, HitlController, ResumePlan};
pub use notifier::{InterruptNotifier, NoopNotifier, WebhookNotifier};
pub use policy::{Policy, RuleBasedPolicy, RuleBasedPolicyConfig};
