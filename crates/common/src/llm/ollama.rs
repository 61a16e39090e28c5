//! Ollama chat client (`POST /api/chat`)

use super::{CompletionRequest, LanguageModel, ResponseFormat, TokenStream};
use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::resilience::with_retry;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub struct OllamaLanguageModel {
    client: reqwest::Client,
    model: String,
    base_url: String,
    retry_budget: Duration,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct StreamLine {
    #[serde(default)]
    message: Option<ChatResponseMessage>,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaLanguageModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            model: config.model.clone(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            retry_budget: Duration::from_secs(config.retry_budget_secs),
        })
    }

    fn build_request<'a>(&'a self, request: &'a CompletionRequest, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            stream,
            format: match request.format {
                ResponseFormat::Json => Some("json"),
                ResponseFormat::Text => None,
            },
            options: request.temperature.map(|temperature| ChatOptions { temperature }),
        }
    }

    async fn send(&self, request: &CompletionRequest, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&self.build_request(request, stream))
            .send()
            .await
            .map_err(|e| AppError::LanguageModel {
                message: format!("Request failed: {}", e),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            // Unknown model and similar; retrying will not help
            return Err(AppError::Configuration {
                message: format!("Language model rejected request ({}): {}", status, body),
            });
        }
        Err(AppError::LanguageModel {
            message: format!("API error {}: {}", status, body),
        })
    }

    async fn complete_once(&self, request: &CompletionRequest) -> Result<String> {
        let response = self.send(request, false).await?;
        let body: ChatResponse = response.json().await.map_err(|e| AppError::LanguageModel {
            message: format!("Failed to parse response: {}", e),
        })?;
        Ok(body.message.content)
    }
}

fn parse_stream_line(line: &[u8]) -> Result<String> {
    let parsed: StreamLine = serde_json::from_slice(line).map_err(|e| AppError::LanguageModel {
        message: format!("Failed to parse stream: {}", e),
    })?;

    if let Some(error) = parsed.error {
        return Err(AppError::LanguageModel { message: error });
    }
    Ok(parsed.message.map(|m| m.content).unwrap_or_default())
}

/// Split an NDJSON byte stream into parsed content fragments.
///
/// Lines are cut on raw bytes so a multi-byte character split across two
/// network chunks is decoded intact.
fn ndjson_fragments<S, B>(bytes: S) -> TokenStream
where
    S: futures::Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = (Box::pin(bytes), Vec::<u8>::new(), false);

    futures::stream::unfold(state, |(mut bytes, mut buffer, mut finished)| async move {
        loop {
            if let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=line_end).collect();
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Some((parse_stream_line(&line), (bytes, buffer, finished)));
            }

            if finished {
                if buffer.iter().all(u8::is_ascii_whitespace) {
                    return None;
                }
                let line = std::mem::take(&mut buffer);
                return Some((parse_stream_line(&line), (bytes, buffer, finished)));
            }

            match bytes.next().await {
                Some(Ok(chunk)) => buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    buffer.clear();
                    finished = true;
                    let err = AppError::LanguageModel {
                        message: format!("Stream interrupted: {}", e),
                    };
                    return Some((Err(err), (bytes, buffer, finished)));
                }
                None => finished = true,
            }
        }
    })
    .boxed()
}

#[async_trait]
impl LanguageModel for OllamaLanguageModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let start = Instant::now();
        let result =
            with_retry("ollama_chat", self.retry_budget, || self.complete_once(request)).await;
        let mode = match request.format {
            ResponseFormat::Json => "json",
            ResponseFormat::Text => "text",
        };
        metrics::record_llm(start.elapsed().as_secs_f64(), &self.model, mode, result.is_ok());
        result
    }

    async fn complete_stream(&self, request: &CompletionRequest) -> Result<TokenStream> {
        let start = Instant::now();
        let result = with_retry("ollama_chat_stream", self.retry_budget, || {
            self.send(request, true)
        })
        .await;
        metrics::record_llm(start.elapsed().as_secs_f64(), &self.model, "stream", result.is_ok());

        Ok(ndjson_fragments(result?.bytes_stream()))
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|e| AppError::LanguageModel {
            message: format!("Ollama unreachable at {}: {}", self.base_url, e),
        })?;

        if !response.status().is_success() {
            return Err(AppError::LanguageModel {
                message: format!("Ollama health check returned {}", response.status()),
            });
        }
        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::collect_stream;

    fn chunks(parts: &[&'static str]) -> impl futures::Stream<Item = reqwest::Result<&'static [u8]>> {
        futures::stream::iter(parts.iter().map(|p| Ok(p.as_bytes())).collect::<Vec<_>>())
    }

    #[test]
    fn test_request_serialization() {
        let model = OllamaLanguageModel::new(&LlmConfig::default()).unwrap();
        let request = CompletionRequest::json("sys", "text").with_temperature(Some(0.3));
        let body = serde_json::to_value(model.build_request(&request, false)).unwrap();

        assert_eq!(body["format"], "json");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "text");
        assert!((body["options"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_text_request_omits_format_and_options() {
        let model = OllamaLanguageModel::new(&LlmConfig::default()).unwrap();
        let request = CompletionRequest::text("sys", "q");
        let body = serde_json::to_value(model.build_request(&request, true)).unwrap();

        assert!(body.get("format").is_none());
        assert!(body.get("options").is_none());
        assert_eq!(body["stream"], true);
    }

    #[tokio::test]
    async fn test_ndjson_lines_split_across_chunks() {
        let stream = ndjson_fragments(chunks(&[
            "{\"message\":{\"content\":\"Art\"},\"done\":false}\n{\"mess",
            "age\":{\"content\":\"icle 3\"},\"done\":false}\n",
            "{\"message\":{\"content\":\"\"},\"done\":true}",
        ]));

        let answer = collect_stream(stream, |_| {}).await.unwrap();
        assert_eq!(answer, "Article 3");
    }

    #[tokio::test]
    async fn test_ndjson_multibyte_character_across_chunks() {
        // "ü" is 0xC3 0xBC
        let first: &'static [u8] = b"{\"message\":{\"content\":\"\xC3";
        let second: &'static [u8] = b"\xBC\"}}\n";
        let stream = ndjson_fragments(futures::stream::iter(vec![Ok(first), Ok(second)]));

        let answer = collect_stream(stream, |_| {}).await.unwrap();
        assert_eq!(answer, "ü");
    }

    #[tokio::test]
    async fn test_ndjson_error_line() {
        let stream = ndjson_fragments(chunks(&["{\"error\":\"model not loaded\"}\n"]));
        assert!(collect_stream(stream, |_| {}).await.is_err());
    }
}
