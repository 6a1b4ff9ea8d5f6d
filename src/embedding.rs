//! Embedding gateway for an OpenAI-compatible embeddings endpoint.
//!
//! Batches texts through `POST {endpoint}/embeddings`, preserving input
//! order, with the shared [`RetryPolicy`] handling transient failures.
//! The gateway is stateless beyond its HTTP client; dimensionality is
//! enforced by the index store, the gateway only guarantees that one
//! response is internally consistent.

use serde::Deserialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::retry::{retryable_status, CancelToken, RetryError, RetryPolicy};

pub struct EmbeddingClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    batch_size: usize,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.embedding_model.clone(),
            batch_size: config.embed_batch_size,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    /// Embed `texts`, one vector per input in the same order. Requests
    /// are split into batches of at most `embed_batch_size`.
    pub async fn embed(&self, texts: &[String], cancel: &CancelToken) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let mut batch_vectors = self.embed_batch(batch, cancel).await?;
            vectors.append(&mut batch_vectors);
        }
        Ok(vectors)
    }

    /// Embed a single query text.
    pub async fn embed_query(&self, text: &str, cancel: &CancelToken) -> Result<Vec<f32>> {
        let vectors = self.embed(&[text.to_string()], cancel).await?;
        vectors.into_iter().next().ok_or_else(|| Error::BackendUnavailable {
            endpoint: self.endpoint.clone(),
            reason: "empty embedding response".to_string(),
        })
    }

    async fn embed_batch(&self, texts: &[String], cancel: &CancelToken) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.endpoint);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let vectors: Vec<Vec<f32>> = self
            .retry
            .run(cancel, || {
                let request = self
                    .http
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&body);
                let endpoint = self.endpoint.clone();
                async move {
                    let response = request.send().await.map_err(|e| {
                        RetryError::Transient(Error::BackendUnavailable {
                            endpoint: endpoint.clone(),
                            reason: e.to_string(),
                        })
                    })?;

                    let status = response.status();
                    if !status.is_success() {
                        let text = response.text().await.unwrap_or_default();
                        let err = Error::BackendUnavailable {
                            endpoint: endpoint.clone(),
                            reason: format!("embeddings API error {}: {}", status, text),
                        };
                        return if retryable_status(status) {
                            Err(RetryError::Transient(err))
                        } else {
                            Err(RetryError::Fatal(err))
                        };
                    }

                    let parsed: EmbeddingsResponse = response.json().await.map_err(|e| {
                        RetryError::Fatal(Error::BackendUnavailable {
                            endpoint,
                            reason: format!("malformed embeddings response: {}", e),
                        })
                    })?;
                    Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
                }
            })
            .await?;

        if vectors.len() != texts.len() {
            return Err(Error::BackendUnavailable {
                endpoint: self.endpoint.clone(),
                reason: format!(
                    "embeddings response has {} vectors for {} inputs",
                    vectors.len(),
                    texts.len()
                ),
            });
        }

        // A single response must agree with itself on dimensionality.
        if let Some(first) = vectors.first() {
            let dims = first.len();
            for v in &vectors[1..] {
                if v.len() != dims {
                    return Err(Error::DimensionMismatch {
                        expected: dims,
                        actual: v.len(),
                    });
                }
            }
        }

        Ok(vectors)
    }
}
