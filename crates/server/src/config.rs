use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fins_llm::LlmConfig;
use fins_pipeline::PipelineSettings;
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "fins.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSection,
    pub storage: StorageSection,
    pub upload: UploadSection,
    pub llm: LlmConfig,
    pub pipeline: PipelineSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub database_path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("fins.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadSection {
    pub dir: PathBuf,
    pub max_bytes: u64,
    pub supported_formats: Vec<String>,
}

impl Default for UploadSection {
    fn default() -> Self {
        let defaults = PipelineSettings::default();
        Self {
            dir: defaults.upload_dir,
            max_bytes: defaults.max_upload_bytes,
            supported_formats: defaults.supported_formats,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub categorization_batch_size: usize,
    pub rule_apply_threshold: f32,
    pub rule_learn_threshold: f32,
    pub create_new_threshold: f32,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let defaults = PipelineSettings::default();
        Self {
            categorization_batch_size: defaults.categorization_batch_size,
            rule_apply_threshold: defaults.rule_apply_threshold,
            rule_learn_threshold: defaults.rule_learn_threshold,
            create_new_threshold: defaults.create_new_threshold,
        }
    }
}

impl Settings {
    /// Reads `FINS_CONFIG` (or `fins.toml`) if it exists, then applies
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var("FINS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut settings = Self::from_file(Path::new(&path))?;
        settings.apply_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("FINS_DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(v);
        }
        if let Some(v) = var("FINS_UPLOAD_DIR") {
            self.upload.dir = PathBuf::from(v);
        }
        if let Some(v) = var("FINS_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = var("FINS_LLM_API_KEY") {
            self.llm.api_key = Some(v).filter(|k| !k.is_empty());
        }
        if let Some(v) = var("FINS_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = var("FINS_LLM_MODEL") {
            self.llm.model = v;
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            upload_dir: self.upload.dir.clone(),
            max_upload_bytes: self.upload.max_bytes,
            supported_formats: self.upload.supported_formats.clone(),
            categorization_batch_size: self.pipeline.categorization_batch_size,
            rule_apply_threshold: self.pipeline.rule_apply_threshold,
            rule_learn_threshold: self.pipeline.rule_learn_threshold,
            create_new_threshold: self.pipeline.create_new_threshold,
            analysis_max_tokens: self.llm.max_tokens,
            recategorize_temperature: self.llm.temperature,
            ..PipelineSettings::default()
        }
    }
}
