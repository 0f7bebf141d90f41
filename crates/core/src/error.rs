use thiserror::Error;

use super::job::Stage;

/// Caller-facing failure taxonomy of the ingestion pipeline.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IngestError {
    /// Malformed or unsupported source file. Fatal to the job, never retried.
    #[error("Could not parse statement: {0}")]
    Parse(String),
    /// Completion-service failure where no degraded default exists.
    #[error("Completion service error: {0}")]
    ExternalService(String),
    /// Confirmation or resume attempted in the wrong stage. Job state is untouched.
    #[error("Job {job_id} is {actual}, expected {expected}")]
    State {
        job_id: String,
        expected: Stage,
        actual: Stage,
    },
    #[error("{0} not found")]
    NotFound(String),
    #[error("Uniqueness violated: {0}")]
    DuplicateConstraint(String),
    /// Refused before a job was created (format or size).
    #[error("Upload rejected: {0}")]
    Rejected(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("{0}")]
    Internal(String),
}

impl IngestError {
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            IngestError::State { .. } | IngestError::NotFound(_) | IngestError::Rejected(_)
        )
    }
}
