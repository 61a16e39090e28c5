//! Embedding service abstraction
//!
//! Provides a unified interface for multiple embedding providers:
//! - Ollama (bge-m3 and other local models)
//! - OpenAI-compatible endpoints
//! - A deterministic mock for tests and dry runs

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::resilience::with_retry;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Collapse every whitespace run to a single space and trim the ends
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn check_dimension(expected: usize, embedding: Vec<f32>) -> Result<Vec<f32>> {
    if embedding.len() != expected {
        return Err(AppError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        });
    }
    Ok(embedding)
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// Ollama embedding client
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dimension: usize,
    base_url: String,
    retry_budget: Duration,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(config.timeout_secs))?,
            model: config.model.clone(),
            dimension: config.dimension,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            retry_budget: Duration::from_secs(config.retry_budget_secs),
        })
    }

    async fn make_request(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&OllamaRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| AppError::EmbeddingError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: OllamaResponse = response.json().await.map_err(|e| AppError::EmbeddingError {
            message: format!("Failed to parse response: {}", e),
        })?;

        check_dimension(self.dimension, result.embedding)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let result = with_retry("ollama_embed", self.retry_budget, || self.make_request(text)).await;
        metrics::record_embedding(start.elapsed().as_secs_f64(), &self.model, 1, result.is_ok());
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// OpenAI-compatible embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    retry_budget: Duration,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
            message: "embedding.api_key is required for the openai provider".to_string(),
        })?;

        Ok(Self {
            client: http_client(Duration::from_secs(config.timeout_secs))?,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            retry_budget: Duration::from_secs(config.retry_budget_secs),
        })
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&OpenAIRequest {
                input: texts,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| AppError::EmbeddingError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: OpenAIResponse = response.json().await.map_err(|e| AppError::EmbeddingError {
            message: format!("Failed to parse response: {}", e),
        })?;

        result
            .data
            .into_iter()
            .map(|e| check_dimension(self.dimension, e.embedding))
            .collect()
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings.into_iter().next().ok_or_else(|| AppError::EmbeddingError {
            message: "Empty response".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        const BATCH_SIZE: usize = 100;

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            let start = Instant::now();
            let result =
                with_retry("openai_embed", self.retry_budget, || self.make_request(chunk)).await;
            metrics::record_embedding(
                start.elapsed().as_secs_f64(),
                &self.model,
                chunk.len(),
                result.is_ok(),
            );
            all_embeddings.extend(result?);
        }

        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic mock embedder for tests and dry runs.
///
/// Each lowercase word is hashed into one of `dimension` buckets and the
/// resulting bag-of-words vector is L2-normalized, so texts sharing words
/// land close to each other under cosine similarity.
pub struct MockEmbedder {
    dimension: usize,
    fail_marker: Option<String>,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail_marker: None,
        }
    }

    /// Fail every request whose text contains `marker`
    pub fn failing_on(dimension: usize, marker: impl Into<String>) -> Self {
        Self {
            dimension,
            fail_marker: Some(marker.into()),
        }
    }

    fn bucket(&self, word: &str) -> usize {
        let digest = Sha256::digest(word.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(bytes) % self.dimension as u64) as usize
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                return Err(AppError::EmbeddingError {
                    message: "mock embedding failure".to_string(),
                });
            }
        }

        let mut vector = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            vector[self.bucket(&word.to_lowercase())] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "mock" => Ok(Arc::new(MockEmbedder::new(config.dimension))),
        other => Err(AppError::Configuration {
            message: format!("Unknown embedding provider: {}", other),
        }),
    }
}

/// Cosine similarity between two vectors of equal length
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
