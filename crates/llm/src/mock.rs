use std::sync::Mutex;

use async_trait::async_trait;

use crate::{ChatMessage, CompletionError, CompletionService};

type Responder = Box<dyn Fn(&[ChatMessage]) -> Result<String, CompletionError> + Send + Sync>;

struct RecordedCall {
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

/// Scripted completion service for tests. Every call is recorded.
pub struct MockCompletion {
    responder: Responder,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockCompletion {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Result<String, CompletionError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `reply`.
    pub fn fixed(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(move |_| Ok(reply.clone()))
    }

    /// Always fails.
    pub fn unavailable() -> Self {
        Self::new(|_| Err(CompletionError::Unavailable("mock offline".to_string())))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Concatenated message contents of every call, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| {
                calls
                    .iter()
                    .map(|call| {
                        call.messages
                            .iter()
                            .map(|m| m.content.as_str())
                            .collect::<Vec<_>>()
                            .join("\n")
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `(temperature, max_tokens)` of every call, in call order.
    pub fn sampling(&self) -> Vec<(f32, u32)> {
        self.calls
            .lock()
            .map(|calls| calls.iter().map(|c| (c.temperature, c.max_tokens)).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CompletionError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                messages: messages.to_vec(),
                temperature,
                max_tokens,
            });
        }
        (self.responder)(messages)
    }
}
