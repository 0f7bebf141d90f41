pub mod client;
pub mod mock;
pub mod prompts;
pub mod response;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::{HttpCompletionClient, LlmConfig};
pub use mock::MockCompletion;
pub use response::{
    parse_json_response, AccountMatchReply, CategorizedRow, ExtractedRow, StructureReply,
};

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Completion request failed (status {status}): {body}")]
    Status { status: u16, body: String },
    #[error("Completion response had no content")]
    EmptyResponse,
    #[error("Completion service unavailable: {0}")]
    Unavailable(String),
    #[error("Could not decode completion response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Stateless text completion. Implementations may fail; callers decide the
/// degraded default.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CompletionError>;
}
