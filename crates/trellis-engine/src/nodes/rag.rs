use std::sync::Arc;

use trellis_core::config::TemplateFormat;
use trellis_core::error::Result;
use trellis_core::traits::{EmbeddingProvider, LlmClient, VectorStore};

use crate::graph::{Graph, InputMapping, InputRef, Node};

use super::{LlmGenerateNode, PromptTemplateNode, RetrieverNode};

/// Build the retriever -> prompt -> generate composite.
///
/// The composite reads `query` plus any template placeholder other than
/// `contexts`, which is filled from the retriever. Only `generate` is
/// forwarded, so callers address the answer as `/<name>/generate`.
pub fn rag_graph(
    prompt: &str,
    format: TemplateFormat,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmClient>,
    k: usize,
) -> Result<Graph> {
    let template = PromptTemplateNode::new(prompt, format)?;
    let mappings = template
        .input_names()
        .into_iter()
        .map(|name| {
            let reference = if name == "contexts" {
                InputRef::sibling("retriever")
            } else {
                InputRef::Parent(name.clone())
            };
            InputMapping::new(reference, name)
        })
        .collect();

    let mut graph = Graph::new();
    graph
        .add_node("retriever", &["query"], RetrieverNode::new(embedder, store, k), false)?
        .add_node_mapped("prompt", mappings, template, false)?
        .add_node("generate", &["/prompt"], LlmGenerateNode::new(llm), true)?;
    Ok(graph)
}
