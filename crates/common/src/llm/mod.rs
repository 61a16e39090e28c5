//! Language model abstraction
//!
//! Two call shapes are needed:
//! - structured JSON completion (citation extraction)
//! - streamed free-text completion (answer synthesis)

mod mock;
mod ollama;

pub use mock::ScriptedLanguageModel;
pub use ollama::OllamaLanguageModel;

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;

/// Output format requested from the model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    Json,
}

/// A single-turn completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub format: ResponseFormat,
    /// Provider default when `None`
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn text(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            format: ResponseFormat::Text,
            temperature: None,
        }
    }

    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            format: ResponseFormat::Json,
            ..Self::text(system, user)
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Stream of answer fragments
pub type TokenStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run a completion and return the whole reply
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Run a completion and yield reply fragments as they arrive
    async fn complete_stream(&self, request: &CompletionRequest) -> Result<TokenStream>;

    /// Check the model service is reachable
    async fn ping(&self) -> Result<()>;

    fn model_name(&self) -> &str;
}

/// Drain a token stream, forwarding every fragment to `on_token`
pub async fn collect_stream<F>(mut stream: TokenStream, mut on_token: F) -> Result<String>
where
    F: FnMut(&str) + Send,
{
    let mut answer = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        if fragment.is_empty() {
            continue;
        }
        on_token(&fragment);
        answer.push_str(&fragment);
    }
    Ok(answer)
}

/// Create a language model client based on configuration
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaLanguageModel::new(config)?)),
        "mock" => Ok(Arc::new(ScriptedLanguageModel::new(r#"{"citations": []}"#))),
        other => Err(AppError::Configuration {
            message: format!("Unknown language model provider: {}", other),
        }),
    }
}
