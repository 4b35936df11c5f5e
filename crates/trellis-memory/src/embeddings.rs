use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use trellis_core::config::EmbeddingConfig;
use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::EmbeddingProvider;

/// HTTP-based embedding provider compatible with OpenAI, Ollama, etc.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: &str, api_key: Option<&str>, model: &str, dims: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(String::from),
            model: model.to_string(),
            dims,
        }
    }

    /// Build a provider from `[embedding]`, filling in the base URL for
    /// known providers.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = match (&config.base_url, config.provider.as_str()) {
            (Some(url), _) => url.as_str(),
            (None, "openai") => "https://api.openai.com/v1",
            (None, "ollama") => "http://localhost:11434/v1",
            (None, other) => {
                return Err(TrellisError::Config(format!(
                    "embedding provider '{}' needs a base_url",
                    other
                )))
            }
        };
        Ok(Self::new(
            base_url,
            config.api_key.as_deref(),
            &config.model,
            config.dimensions,
        ))
    }

    pub fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>> {
        let texts = texts.to_vec();
        Box::pin(async move {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            let mut req = self.client.post(self.endpoint()).json(&EmbeddingRequest {
                model: self.model.clone(),
                input: texts,
            });

            if let Some(ref key) = self.api_key {
                req = req.bearer_auth(key);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| TrellisError::Embedding(format!("request failed: {}", e)))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(TrellisError::Embedding(format!(
                    "API error {}: {}",
                    status, body
                )));
            }

            let body: EmbeddingResponse = resp.json().await.map_err(|e| {
                TrellisError::Embedding(format!("failed to parse response: {}", e))
            })?;

            Ok(body.data.into_iter().map(|d| d.embedding).collect())
        })
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, base_url: Option<&str>) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: provider.to_string(),
            model: "nomic-embed-text".to_string(),
            base_url: base_url.map(str::to_string),
            api_key: None,
            dimensions: 768,
        }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_mismatched_or_empty() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_from_config_endpoints() {
        let ollama = HttpEmbeddingProvider::from_config(&config("ollama", None)).unwrap();
        assert_eq!(ollama.endpoint(), "http://localhost:11434/v1/embeddings");
        assert_eq!(ollama.dimensions(), 768);

        let custom =
            HttpEmbeddingProvider::from_config(&config("tei", Some("http://gpu:8080/v1/"))).unwrap();
        assert_eq!(custom.endpoint(), "http://gpu:8080/v1/embeddings");

        assert!(HttpEmbeddingProvider::from_config(&config("tei", None)).is_err());
    }

    #[tokio::test]
    async fn test_empty_batch_skips_request() {
        let provider = HttpEmbeddingProvider::new("http://127.0.0.1:9", None, "m", 4);
        assert!(provider.embed(&[]).await.unwrap().is_empty());
    }
}
