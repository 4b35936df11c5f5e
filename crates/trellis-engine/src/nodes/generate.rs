use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::LlmClient;

use crate::graph::{Context, Node};

/// Calls the text-generation model on a rendered prompt.
///
/// A string prompt produces a string; a list of prompts produces the
/// list of completions in the same order.
pub struct LlmGenerateNode {
    llm: Arc<dyn LlmClient>,
}

impl LlmGenerateNode {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

impl Node for LlmGenerateNode {
    fn input_names(&self) -> Vec<String> {
        vec!["prompt".to_string()]
    }

    fn execute(&self, mut ctx: Context) -> BoxFuture<'_, Result<Context>> {
        Box::pin(async move {
            let output = match ctx.get_input("prompt")? {
                Value::String(prompt) => Value::String(self.llm.generate(prompt).await?),
                Value::Array(items) => {
                    let prompts = items
                        .iter()
                        .map(|v| {
                            v.as_str().map(str::to_string).ok_or_else(|| {
                                TrellisError::InvalidInput(format!(
                                    "prompt list must hold strings, got {}",
                                    v
                                ))
                            })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    debug!(node = %ctx.path(), prompts = prompts.len(), "Generating batch");
                    let completions = self.llm.generate_batch(&prompts).await?;
                    Value::Array(completions.into_iter().map(Value::String).collect())
                }
                other => {
                    return Err(TrellisError::InvalidInput(format!(
                        "prompt must be a string or a list of strings, got {}",
                        other
                    )))
                }
            };
            ctx.set_output(output)?;
            Ok(ctx)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use serde_json::json;
    use trellis_core::types::TaskMessage;

    struct Shout;

    impl LlmClient for Shout {
        fn generate(&self, prompt: &str) -> BoxFuture<'_, Result<String>> {
            let out = prompt.to_uppercase();
            Box::pin(async move { Ok(out) })
        }
    }

    fn ctx(prompt: Value) -> Context {
        let mut inputs = HashMap::new();
        inputs.insert("prompt".to_string(), prompt);
        Context::with_inputs(TaskMessage::new("completion"), inputs)
    }

    #[tokio::test]
    async fn test_single_prompt() {
        let node = LlmGenerateNode::new(Arc::new(Shout));
        let out = node.execute(ctx(json!("hi"))).await.unwrap();
        assert_eq!(out.output(), Some(&json!("HI")));
    }

    #[tokio::test]
    async fn test_prompt_batch() {
        let node = LlmGenerateNode::new(Arc::new(Shout));
        let out = node.execute(ctx(json!(["a", "b"]))).await.unwrap();
        assert_eq!(out.output(), Some(&json!(["A", "B"])));
    }

    #[tokio::test]
    async fn test_invalid_prompt() {
        let node = LlmGenerateNode::new(Arc::new(Shout));
        assert!(matches!(
            node.execute(ctx(json!(7))).await,
            Err(TrellisError::InvalidInput(_))
        ));
        assert!(matches!(
            node.execute(ctx(json!(["ok", 1]))).await,
            Err(TrellisError::InvalidInput(_))
        ));
    }
}
