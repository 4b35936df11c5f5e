use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use trellis_core::error::{Result, TrellisError};
use trellis_core::types::TaskMessage;

const ROOT_PATH: &str = "/";

/// Per-node view of one in-flight task.
///
/// A context carries the inputs resolved for exactly one node, a
/// write-once output slot, and the originating task. The executor hands
/// each node its own context and takes it back when the node returns, so
/// no two running nodes ever share one.
#[derive(Debug, Clone)]
pub struct Context {
    path: String,
    task: Arc<TaskMessage>,
    inputs: HashMap<String, Value>,
    output: Option<Value>,
    cancel: CancellationToken,
}

impl Context {
    /// Root context seeded with explicit inputs.
    pub fn with_inputs(task: TaskMessage, inputs: HashMap<String, Value>) -> Self {
        Self {
            path: ROOT_PATH.to_string(),
            task: Arc::new(task),
            inputs,
            output: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Root context seeded from the task payload: one input per entry in
    /// `task.input_keys`, holding that column's values as a list.
    pub fn from_task(task: TaskMessage) -> Result<Self> {
        let mut inputs = HashMap::new();
        for key in &task.input_keys {
            let column = task.column(key).ok_or_else(|| TrellisError::UnresolvedInput {
                node: ROOT_PATH.to_string(),
                input: key.clone(),
            })?;
            inputs.insert(key.clone(), Value::Array(column));
        }
        Ok(Self::with_inputs(task, inputs))
    }

    /// Attach a cancellation token scoped to this run.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Context for child `name`, seeing only `inputs`.
    pub(crate) fn child(&self, name: &str, inputs: HashMap<String, Value>) -> Self {
        Self {
            path: child_path(&self.path, name),
            task: Arc::clone(&self.task),
            inputs,
            output: None,
            cancel: self.cancel.clone(),
        }
    }

    /// Fully qualified path of the node owning this context.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment (empty at the root).
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// The task this run was started for.
    pub fn task(&self) -> &TaskMessage {
        &self.task
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Get one input by its local name.
    pub fn get_input(&self, name: &str) -> Result<&Value> {
        self.inputs
            .get(name)
            .ok_or_else(|| TrellisError::UnresolvedInput {
                node: self.path.clone(),
                input: name.to_string(),
            })
    }

    /// Get several inputs, in the order requested.
    pub fn get_inputs<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&Value>> {
        names.iter().map(|n| self.get_input(n.as_ref())).collect()
    }

    /// All inputs visible to this node.
    pub fn inputs(&self) -> &HashMap<String, Value> {
        &self.inputs
    }

    /// Write this node's output. A second write fails.
    pub fn set_output(&mut self, value: Value) -> Result<()> {
        if self.output.is_some() {
            return Err(TrellisError::DuplicateWrite {
                node: self.path.clone(),
            });
        }
        self.output = Some(value);
        Ok(())
    }

    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    /// A named field of an object output (a graph's forwarded child).
    pub fn output_field(&self, name: &str) -> Option<&Value> {
        self.output.as_ref().and_then(|v| v.get(name))
    }

    pub(crate) fn take_output(&mut self) -> Option<Value> {
        self.output.take()
    }
}

pub(crate) fn child_path(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}
