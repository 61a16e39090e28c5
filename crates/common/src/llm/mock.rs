//! Scripted language model for tests and dry runs

use super::{CompletionRequest, LanguageModel, TokenStream};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Mutex;

/// Replies are chosen by the first rule whose needle occurs in the user
/// prompt, falling back to the default reply. Every request is recorded.
pub struct ScriptedLanguageModel {
    rules: Vec<(String, Reply)>,
    default_reply: Reply,
    requests: Mutex<Vec<CompletionRequest>>,
}

#[derive(Clone)]
enum Reply {
    Text(String),
    Fail,
}

impl ScriptedLanguageModel {
    pub fn new(default_reply: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default_reply: Reply::Text(default_reply.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `reply` when the user prompt contains `needle`
    pub fn with_rule(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Text(reply.into())));
        self
    }

    /// Fail when the user prompt contains `needle`
    pub fn with_failure(mut self, needle: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Fail));
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn respond(&self, request: &CompletionRequest) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| request.user.contains(needle.as_str()))
            .map(|(_, reply)| reply)
            .unwrap_or(&self.default_reply);

        match reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Fail => Err(AppError::LanguageModel {
                message: "scripted failure".to_string(),
            }),
        }
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.respond(request)
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<TokenStream> {
        let reply = self.respond(request)?;
        let fragments: Vec<Result<String>> = reply
            .split_inclusive(' ')
            .map(|f| Ok(f.to_string()))
            .collect();
        Ok(futures::stream::iter(fragments).boxed())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
