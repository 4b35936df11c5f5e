use futures::future::BoxFuture;
use serde_json::{Map, Value};

use trellis_core::error::{Result, TrellisError};

use crate::graph::{Context, Node};

/// Pulls the task's input columns out of the task payload.
///
/// With a single input key the output is that column as a list; with
/// several it is an object of columns keyed by input key.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtracterNode;

impl ExtracterNode {
    pub fn new() -> Self {
        Self
    }
}

impl Node for ExtracterNode {
    fn input_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn execute(&self, mut ctx: Context) -> BoxFuture<'_, Result<Context>> {
        Box::pin(async move {
            let task = ctx.task();
            let mut columns = Map::new();
            for key in &task.input_keys {
                let column = task.column(key).ok_or_else(|| TrellisError::UnresolvedInput {
                    node: ctx.path().to_string(),
                    input: key.clone(),
                })?;
                columns.insert(key.clone(), Value::Array(column));
            }

            let output = if columns.len() == 1 {
                columns.into_iter().map(|(_, v)| v).next().unwrap_or_default()
            } else {
                Value::Object(columns)
            };
            ctx.set_output(output)?;
            Ok(ctx)
        })
    }
}
