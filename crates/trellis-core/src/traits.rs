use futures::future::{self, BoxFuture};

use crate::error::Result;
use crate::types::RetrievedRecord;

/// Embedding model: turns text into vectors.
pub trait EmbeddingProvider: Send + Sync + 'static {
    /// Embed a batch of texts, one vector per input in the same order.
    fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>>;

    /// Number of dimensions in the embedding vectors.
    fn dimensions(&self) -> usize;
}

/// Vector store: similarity search over a single collection.
pub trait VectorStore: Send + Sync + 'static {
    /// For each query vector, return up to `k` records ranked by similarity.
    fn similarity_search(
        &self,
        embeddings: &[Vec<f32>],
        k: usize,
    ) -> BoxFuture<'_, Result<Vec<Vec<RetrievedRecord>>>>;
}

/// Text generation model.
pub trait LlmClient: Send + Sync + 'static {
    /// Generate a completion for one prompt.
    fn generate(&self, prompt: &str) -> BoxFuture<'_, Result<String>>;

    /// Generate completions for many prompts, preserving order.
    fn generate_batch(&self, prompts: &[String]) -> BoxFuture<'_, Result<Vec<String>>> {
        let prompts = prompts.to_vec();
        Box::pin(async move {
            let futs = prompts.iter().map(|p| self.generate(p));
            future::try_join_all(futs).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl LlmClient for Echo {
        fn generate(&self, prompt: &str) -> BoxFuture<'_, Result<String>> {
            let out = format!("echo: {}", prompt);
            Box::pin(async move { Ok(out) })
        }
    }

    #[tokio::test]
    async fn test_generate_batch_preserves_order() {
        let out = Echo
            .generate_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(out, vec!["echo: a", "echo: b"]);
    }
}
