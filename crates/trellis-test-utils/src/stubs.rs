use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::{EmbeddingProvider, LlmClient, VectorStore};
use trellis_core::types::RetrievedRecord;

/// Deterministic embedder: a text becomes `[len, vowels, 1.0]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubEmbedder;

impl StubEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let vowels = text.chars().filter(|c| "aeiouAEIOU".contains(*c)).count();
        vec![text.len() as f32, vowels as f32, 1.0]
    }
}

impl EmbeddingProvider for StubEmbedder {
    fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>> {
        let out = texts.iter().map(|t| Self::vector(t)).collect();
        Box::pin(async move { Ok(out) })
    }

    fn dimensions(&self) -> usize {
        3
    }
}

/// Vector store returning the first `k` of a fixed document list for
/// every query, recording the queries it saw.
#[derive(Debug, Default)]
pub struct StubVectorStore {
    docs: Vec<RetrievedRecord>,
    seen: Mutex<Vec<Vec<f32>>>,
}

impl StubVectorStore {
    pub fn new(texts: &[&str]) -> Self {
        let docs = texts
            .iter()
            .enumerate()
            .map(|(i, text)| RetrievedRecord {
                id: format!("doc{}", i + 1),
                page_content: text.to_string(),
                metadata: Default::default(),
                score: 1.0 - i as f32 * 0.1,
            })
            .collect();
        Self {
            docs,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Query vectors received so far.
    pub fn queries(&self) -> Vec<Vec<f32>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl VectorStore for StubVectorStore {
    fn similarity_search(
        &self,
        embeddings: &[Vec<f32>],
        k: usize,
    ) -> BoxFuture<'_, Result<Vec<Vec<RetrievedRecord>>>> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.extend(embeddings.iter().cloned());
        }
        let hits: Vec<RetrievedRecord> = self.docs.iter().take(k).cloned().collect();
        let out = vec![hits; embeddings.len()];
        Box::pin(async move { Ok(out) })
    }
}

/// Text generator with a fixed reply, or an echo of the prompt.
#[derive(Debug, Default)]
pub struct StubLlm {
    reply: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl StubLlm {
    /// Always answers `reply`.
    pub fn fixed(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answers `echo: <prompt>`.
    pub fn echo() -> Self {
        Self::default()
    }

    /// Shared counter of `generate` calls.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl LlmClient for StubLlm {
    fn generate(&self, prompt: &str) -> BoxFuture<'_, Result<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let out = match &self.reply {
            Some(reply) => reply.clone(),
            None => format!("echo: {}", prompt),
        };
        Box::pin(async move { Ok(out) })
    }
}

/// Text generator whose every call fails with a request error.
#[derive(Debug, Clone)]
pub struct FailingLlm {
    message: String,
}

impl FailingLlm {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl LlmClient for FailingLlm {
    fn generate(&self, _prompt: &str) -> BoxFuture<'_, Result<String>> {
        let err = TrellisError::LlmRequest(self.message.clone());
        Box::pin(async move { Err(err) })
    }
}
