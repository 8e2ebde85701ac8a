use crate::types::ExecutionId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid execution id: {0}")]
    InvalidExecutionId(ExecutionId),

    #[error("Unknown lifecycle status: '{0}'")]
    UnknownStatus(String),

    #[error("Malformed progress event: {0}")]
    MalformedEvent(String),
}

/// Reject ids that cannot name a run.
pub fn validate_execution_id(id: ExecutionId) -> Result<ExecutionId, CoreError> {
    if crate::types::is_valid_execution_id(id) {
        Ok(id)
    } else {
        Err(CoreError::InvalidExecutionId(id))
    }
}
