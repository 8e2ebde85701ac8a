//! Progress events streamed by the pipeline while a run is live.
//!
//! The backend pushes one JSON object per WebSocket text frame with the
//! shape `{"agent", "step", "percent", "log"}`. Events are ordered by
//! arrival only: they carry no sequence number and no timestamp.

use serde::{Deserialize, Deserializer, Serialize};

/// Agent name the backend uses for pipeline-level messages.
pub const PIPELINE_AGENT: &str = "pipeline";

/// Step name the backend uses when the pipeline itself raised.
pub const ERROR_STEP: &str = "error";

/// Upper bound of a reported percentage.
pub const PERCENT_MAX: f64 = 100.0;

/// One line of the append-only event log for an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Pipeline agent that emitted the event (e.g. `"ScriptAgent"`).
    #[serde(default)]
    pub agent: String,

    /// Step within the agent; becomes the displayed stage.
    #[serde(default)]
    pub step: String,

    /// Reported completion, nominally 0-100.
    ///
    /// `None` when the frame carried no usable number (absent, `null`,
    /// a string, ...). A `None` percent never moves the progress bar.
    #[serde(default, deserialize_with = "lenient_percent")]
    pub percent: Option<f64>,

    /// Free-form human-readable log line.
    #[serde(default)]
    pub log: String,
}

impl ProgressEvent {
    pub fn new(
        agent: impl Into<String>,
        step: impl Into<String>,
        percent: f64,
        log: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            step: step.into(),
            percent: Some(percent),
            log: log.into(),
        }
    }

    /// The reported percent clamped to `0..=100`, or `None` if the event
    /// carries no finite number.
    pub fn reported_percent(&self) -> Option<f64> {
        self.percent
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, PERCENT_MAX))
    }

    /// Whether this is the marker the backend emits when the pipeline
    /// raised instead of finishing.
    pub fn is_pipeline_error(&self) -> bool {
        self.agent == PIPELINE_AGENT && self.step == ERROR_STEP
    }

    /// Whether the event suggests the run has reached its end.
    ///
    /// Events never change the lifecycle on their own; this only tells
    /// the observer that the status endpoint is worth asking now.
    pub fn signals_end(&self) -> bool {
        self.is_pipeline_error() || self.reported_percent() == Some(PERCENT_MAX)
    }
}

/// Accept any JSON value for `percent`, keeping only finite numbers.
fn lenient_percent<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_f64().filter(|p| p.is_finite()))
}
