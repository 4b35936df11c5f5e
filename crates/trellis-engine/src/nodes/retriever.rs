use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::{EmbeddingProvider, VectorStore};

use crate::graph::{Context, Node};

/// Embeds the query text and looks up the `k` nearest records.
///
/// `query` may be a string or a list of strings. The output always holds
/// one list of records per query, so a single string yields a list of
/// one entry.
pub struct RetrieverNode {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    k: usize,
}

impl RetrieverNode {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>, k: usize) -> Self {
        Self { embedder, store, k }
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

fn queries(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::String(q) => Ok(vec![q.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|v| {
                v.as_str().map(str::to_string).ok_or_else(|| {
                    TrellisError::InvalidInput(format!("query list must hold strings, got {}", v))
                })
            })
            .collect(),
        other => Err(TrellisError::InvalidInput(format!(
            "query must be a string or a list of strings, got {}",
            other
        ))),
    }
}

impl Node for RetrieverNode {
    fn input_names(&self) -> Vec<String> {
        vec!["query".to_string()]
    }

    fn execute(&self, mut ctx: Context) -> BoxFuture<'_, Result<Context>> {
        Box::pin(async move {
            let queries = queries(ctx.get_input("query")?)?;

            let vectors = self.embedder.embed(&queries).await?;
            if vectors.len() != queries.len() {
                return Err(TrellisError::Embedding(format!(
                    "expected {} embedding(s), got {}",
                    queries.len(),
                    vectors.len()
                )));
            }

            let results = self.store.similarity_search(&vectors, self.k).await?;
            if results.len() != queries.len() {
                return Err(TrellisError::VectorStore(format!(
                    "expected {} result set(s), got {}",
                    queries.len(),
                    results.len()
                )));
            }

            debug!(
                node = %ctx.path(),
                queries = queries.len(),
                hits = results.iter().map(Vec::len).sum::<usize>(),
                "Retrieved records"
            );

            ctx.set_output(serde_json::to_value(results)?)?;
            Ok(ctx)
        })
    }
}
