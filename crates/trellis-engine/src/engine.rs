use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use trellis_core::error::{Result, TrellisError};
use trellis_core::types::TaskMessage;

use crate::graph::executor::{resolve, Scope};
use crate::graph::{Context, Graph, InputMapping, InputRef, Node};
use crate::handler::TaskHandler;

/// Result of one engine run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Output tasks of every handler, in registration order.
    pub tasks: Vec<TaskMessage>,
    /// The root context after execution. Its output holds the root
    /// graph's forwarded children.
    pub context: Context,
    /// Total execution time in milliseconds.
    pub elapsed_ms: u64,
}

struct HandlerEntry {
    handler: Arc<dyn TaskHandler>,
    inputs: Vec<(InputRef, String)>,
}

/// A root graph plus the task handlers that consume its results.
///
/// Built once, then shared read-only across any number of concurrent
/// runs; all per-run state lives in the run's context.
#[derive(Default)]
pub struct Engine {
    graph: Graph,
    handlers: Vec<HandlerEntry>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the root graph. See [`Graph::add_node`].
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        inputs: &[&str],
        node: impl Node,
        is_output: bool,
    ) -> Result<&mut Self> {
        self.graph.add_node(name, inputs, node, is_output)?;
        Ok(self)
    }

    /// Register a task handler reading root outputs (`/node`) or seed
    /// inputs (`name`). Handlers run in registration order.
    pub fn add_task_handler(
        &mut self,
        inputs: &[&str],
        handler: impl TaskHandler,
    ) -> Result<&mut Self> {
        let declared = handler.input_names();
        let mappings = if inputs.is_empty() {
            declared
                .iter()
                .map(|n| InputMapping::new(InputRef::Parent(n.clone()), n.clone()))
                .collect()
        } else {
            inputs
                .iter()
                .map(|s| InputMapping::parse(s))
                .collect::<Result<Vec<_>>>()?
        };

        if mappings.len() != declared.len() {
            return Err(TrellisError::GraphConstruction(format!(
                "handler '{}' declares {} input(s) but {} were given",
                handler.name(),
                declared.len(),
                mappings.len()
            )));
        }

        let bound: Vec<(InputRef, String)> = mappings
            .into_iter()
            .zip(&declared)
            .map(|(mapping, default_local)| {
                let local = mapping.local_name.unwrap_or_else(|| default_local.clone());
                (mapping.reference, local)
            })
            .collect();
        self.check_handler_inputs(handler.name(), &bound)?;

        self.handlers.push(HandlerEntry {
            handler: Arc::new(handler),
            inputs: bound,
        });
        Ok(self)
    }

    /// Every root reference a handler reads must name a child the root
    /// graph forwards.
    fn check_handler_inputs(&self, handler: &str, inputs: &[(InputRef, String)]) -> Result<()> {
        let forwarded = self.graph.output_names();
        for (reference, _) in inputs {
            let Some(producer) = reference.producer() else {
                continue;
            };
            if !self.graph.contains(producer) {
                return Err(TrellisError::GraphConstruction(format!(
                    "handler '{}' reads '{}', which has not been added",
                    handler, reference
                )));
            }
            if !forwarded.contains(&producer) {
                return Err(TrellisError::GraphConstruction(format!(
                    "handler '{}' reads '{}', which the root graph does not output",
                    handler, reference
                )));
            }
        }
        Ok(())
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Seed keys the root graph reads.
    pub fn input_names(&self) -> Vec<String> {
        self.graph.input_names()
    }

    /// Run the root graph only. The returned context's output is an
    /// object of the root's forwarded children.
    pub async fn execute(&self, ctx: Context) -> Result<Context> {
        for key in self.graph.input_names() {
            if !ctx.inputs().contains_key(&key) {
                return Err(TrellisError::UnresolvedInput {
                    node: ctx.path().to_string(),
                    input: key,
                });
            }
        }
        self.graph.execute(ctx).await
    }

    /// Seed a context from `task`, run the graph, then every handler.
    pub async fn run(&self, task: TaskMessage, cancel: CancellationToken) -> Result<RunOutput> {
        let ctx = Context::from_task(task)?.with_cancel(cancel);
        self.run_context(ctx).await
    }

    /// Run the graph and every handler starting from a prepared context.
    pub async fn run_context(&self, ctx: Context) -> Result<RunOutput> {
        let start = Instant::now();
        let task_id = ctx.task().id.clone();

        // Nodes added after a handler can change what the root forwards.
        for entry in &self.handlers {
            self.check_handler_inputs(entry.handler.name(), &entry.inputs)?;
        }

        let ctx = self.execute(ctx).await?;

        // Handlers see the root's seed inputs and forwarded outputs.
        let mut scope = Scope::default();
        if let Some(Value::Object(outputs)) = ctx.output() {
            for (name, value) in outputs {
                scope.write(name, name, value.clone())?;
            }
        }

        let mut tasks = Vec::new();
        for entry in &self.handlers {
            let name = entry.handler.name();
            let mut inputs = HashMap::with_capacity(entry.inputs.len());
            for (reference, local) in &entry.inputs {
                inputs.insert(local.clone(), resolve(reference, &ctx, &scope, name)?);
            }
            let view = ctx.child(name, inputs);
            let emitted = entry.handler.try_handle(&view)?;
            debug!(handler = %name, tasks = emitted.len(), "Task handler complete");
            tasks.extend(emitted);
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(task = %task_id, tasks = tasks.len(), elapsed_ms, "Engine run complete");

        Ok(RunOutput {
            tasks,
            context: ctx,
            elapsed_ms,
        })
    }
}
