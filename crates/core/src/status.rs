//! Execution lifecycle and the point-in-time status document.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;
use crate::types::ExecutionId;

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle of one pipeline run.
///
/// `Completed` and `Failed` are terminal: no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl Lifecycle {
    /// All lifecycle values, in the order a successful run visits them.
    pub const ALL: [Lifecycle; 4] = [
        Lifecycle::Pending,
        Lifecycle::InProgress,
        Lifecycle::Completed,
        Lifecycle::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Lifecycle::Completed | Lifecycle::Failed)
    }

    /// Whether the backend is still expected to produce events.
    pub fn is_live(self) -> bool {
        !self.is_terminal()
    }

    /// Wire name, as used by the status endpoint.
    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::Pending => "pending",
            Lifecycle::InProgress => "in_progress",
            Lifecycle::Completed => "completed",
            Lifecycle::Failed => "failed",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lifecycle {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Lifecycle::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| CoreError::UnknownStatus(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// ExecutionStatus
// ---------------------------------------------------------------------------

/// Snapshot returned by the status endpoint (`GET /api/status/{id}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub execution_id: ExecutionId,
    pub status: Lifecycle,
    /// Name of the agent currently running, if the backend reports one.
    #[serde(default)]
    pub current_stage: Option<String>,
    /// Accumulated provider cost in USD. The backend may send `null`.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub cost: f64,
    /// Human-readable failure reason, present when `status` is `failed`.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Server-side path of the rendered video once completed.
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

impl ExecutionStatus {
    /// Create a bare snapshot; enrich it with the `with_*` builders.
    pub fn new(execution_id: ExecutionId, status: Lifecycle) -> Self {
        Self {
            execution_id,
            status,
            current_stage: None,
            cost: 0.0,
            error_message: None,
            output_path: None,
            topic: None,
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.current_stage = Some(stage.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_output(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}
