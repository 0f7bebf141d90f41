use fins_core::IngestError;
use fins_import::ImportError;
use fins_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl From<PipelineError> for IngestError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Import(e) => IngestError::Parse(e.to_string()),
            PipelineError::Storage(e) => e.into(),
            PipelineError::Ingest(e) => e,
            PipelineError::Io(e) => IngestError::Internal(e.to_string()),
        }
    }
}
