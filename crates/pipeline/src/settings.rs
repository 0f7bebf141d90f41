use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Tunables for the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Where accepted uploads are staged as `<job_id>.<ext>`.
    pub upload_dir: PathBuf,
    pub max_upload_bytes: u64,
    /// Accepted extensions after sniffing: any of `csv`, `pdf`, `txt`.
    pub supported_formats: Vec<String>,
    pub categorization_batch_size: usize,
    /// A learned rule is applied only above this confidence.
    pub rule_apply_threshold: f32,
    /// An AI result above this confidence becomes a rule.
    pub rule_learn_threshold: f32,
    /// Account matches below this confidence propose a new account.
    pub create_new_threshold: f32,
    /// Pinned for structured calls made while a job runs.
    pub analysis_temperature: f32,
    /// Service default; analysis and account matching use it as-is.
    pub analysis_max_tokens: u32,
    pub extraction_max_tokens: u32,
    /// Service default temperature, used by manual re-categorisation.
    pub recategorize_temperature: f32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        PipelineSettings {
            upload_dir: PathBuf::from("/tmp/fins-uploads"),
            max_upload_bytes: 10 * 1024 * 1024,
            supported_formats: vec!["csv".into(), "pdf".into(), "txt".into()],
            categorization_batch_size: 30,
            rule_apply_threshold: 0.8,
            rule_learn_threshold: 0.9,
            create_new_threshold: 0.7,
            analysis_temperature: 0.1,
            analysis_max_tokens: 2048,
            extraction_max_tokens: 4096,
            recategorize_temperature: 0.7,
        }
    }
}
