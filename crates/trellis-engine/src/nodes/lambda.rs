use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use trellis_core::error::{Result, TrellisError};

use crate::graph::{Context, Node};

type LambdaFn = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Leaf node backed by an async closure.
///
/// The closure receives the node's inputs in declared order and returns
/// the node's output.
pub struct LambdaNode {
    inputs: Vec<String>,
    func: LambdaFn,
}

impl LambdaNode {
    pub fn new<F, Fut>(inputs: &[&str], func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            func: Arc::new(move |args| -> BoxFuture<'static, Result<Value>> {
                Box::pin(func(args))
            }),
        }
    }

    /// A node with no inputs that always outputs `value`.
    pub fn constant(value: Value) -> Self {
        Self::new(&[], move |_| {
            let value = value.clone();
            async move { Ok::<_, TrellisError>(value) }
        })
    }
}

impl Node for LambdaNode {
    fn input_names(&self) -> Vec<String> {
        self.inputs.clone()
    }

    fn execute(&self, mut ctx: Context) -> BoxFuture<'_, Result<Context>> {
        Box::pin(async move {
            let args: Vec<Value> = ctx
                .get_inputs(&self.inputs)?
                .into_iter()
                .cloned()
                .collect();
            let output = (self.func)(args).await?;
            ctx.set_output(output)?;
            Ok(ctx)
        })
    }
}
