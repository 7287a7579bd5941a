//! Human command types delivered to checkpoints (§3, §4.9, §4.10).

use crate::plan::{RoutingPlan, RoutingStep};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    Approve,
    Edit,
    Reject,
    Skip,
    Abort,
    Retry,
    Respond,
}

/// A command submitted by a human operator against a pending checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub command_id: String,
    pub checkpoint_id: String,
    #[serde(rename = "type")]
    pub command_type: CommandType,
    #[serde(default)]
    pub edited_plan: Option<RoutingPlan>,
    #[serde(default)]
    pub edited_step: Option<RoutingStep>,
    #[serde(default)]
    pub edited_params: Option<HashMap<String, Json>>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub response: Option<Json>,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}
