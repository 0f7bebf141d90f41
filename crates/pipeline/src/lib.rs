pub mod analyzer;
pub mod categorize;
pub mod duplicates;
pub mod error;
pub mod extractor;
pub mod matcher;
pub mod orchestrator;
pub mod settings;
pub mod upload;

pub use analyzer::analyze;
pub use categorize::{CategorizationOutcome, Categorizer};
pub use duplicates::check_duplicates;
pub use error::PipelineError;
pub use extractor::extract;
pub use matcher::{local_match, match_account};
pub use orchestrator::{IngestionService, JobCommand};
pub use settings::PipelineSettings;
