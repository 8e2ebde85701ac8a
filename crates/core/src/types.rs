/// Backend-assigned identifier of one pipeline run.
///
/// Immutable once returned by the submission endpoint. Only positive
/// values name a run; zero and negatives mean "no execution".
pub type ExecutionId = i64;

/// Whether `id` can name a run on the backend.
pub fn is_valid_execution_id(id: ExecutionId) -> bool {
    id > 0
}
