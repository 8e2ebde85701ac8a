//! Progress stream frame parser.
//!
//! The backend sends one JSON object per text frame with the shape
//! `{"agent": ..., "step": ..., "percent": ..., "log": ...}`. Anything
//! that is not a JSON object is malformed; callers log and drop it.

use shorts_core::error::CoreError;
use shorts_core::progress::ProgressEvent;

/// Parse a progress WebSocket text frame into a [`ProgressEvent`].
pub fn parse_frame(text: &str) -> Result<ProgressEvent, CoreError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| CoreError::MalformedEvent(e.to_string()))?;

    if !value.is_object() {
        return Err(CoreError::MalformedEvent(format!(
            "expected a JSON object, got {}",
            json_kind(&value)
        )));
    }

    serde_json::from_value(value).map_err(|e| CoreError::MalformedEvent(e.to_string()))
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
