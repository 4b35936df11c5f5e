use std::collections::HashMap;
use std::time::Instant;

use futures::future;
use serde_json::{Map, Value};
use tracing::{debug, error};

use trellis_core::error::{Result, TrellisError};

use super::composite::{Child, Graph};
use super::context::{child_path, Context};
use super::input::InputRef;

/// Outputs written by the children of one graph during one run.
///
/// Lives only as long as the graph's own `execute` call, so outputs of
/// internal children never escape the graph.
#[derive(Debug, Default)]
pub(crate) struct Scope {
    values: HashMap<String, Value>,
}

impl Scope {
    /// Record `name`'s output. Each child writes at most once per run.
    pub(crate) fn write(&mut self, name: &str, path: &str, value: Value) -> Result<()> {
        if self.values.contains_key(name) {
            return Err(TrellisError::DuplicateWrite {
                node: path.to_string(),
            });
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub(crate) fn take(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }
}

/// Resolve one input reference for the node at `consumer`.
///
/// `Parent` references read the enclosing context's inputs, `Sibling`
/// references read the scope and then walk any field segments.
pub(crate) fn resolve(
    reference: &InputRef,
    parent: &Context,
    scope: &Scope,
    consumer: &str,
) -> Result<Value> {
    let unresolved = || TrellisError::UnresolvedInput {
        node: consumer.to_string(),
        input: reference.to_string(),
    };

    match reference {
        InputRef::Parent(key) => parent.inputs().get(key).cloned().ok_or_else(unresolved),
        InputRef::Sibling { node, fields } => {
            let mut value = scope.get(node).ok_or_else(unresolved)?;
            for field in fields {
                value = value.get(field.as_str()).ok_or_else(unresolved)?;
            }
            Ok(value.clone())
        }
    }
}

/// Build the view handed to `child`: only its declared inputs.
fn child_context(child: &Child, parent: &Context, scope: &Scope) -> Result<Context> {
    let path = child_path(parent.path(), &child.name);
    let mut inputs = HashMap::with_capacity(child.inputs.len());
    for (reference, local) in &child.inputs {
        inputs.insert(local.clone(), resolve(reference, parent, scope, &path)?);
    }
    Ok(parent.child(&child.name, inputs))
}

/// Run one child to completion and take its output.
async fn run_child(child: &Child, ctx: Context) -> Result<Value> {
    let path = ctx.path().to_string();
    let start = Instant::now();
    debug!(node = %path, "Starting node");

    let result = child.node.execute(ctx).await.map_err(|e| e.in_node(&path));

    let mut ctx = match result {
        Ok(ctx) => ctx,
        Err(e) => {
            if e.node() == Some(path.as_str()) {
                error!(node = %path, error = %e, "Graph node failed");
            }
            return Err(e);
        }
    };

    let output = ctx
        .take_output()
        .ok_or(TrellisError::MissingOutput { node: path.clone() })?;

    debug!(
        node = %path,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Node execution complete"
    );
    Ok(output)
}

/// Execute every child of `graph` in dependency waves.
///
/// All children of a wave run concurrently on the current task. The
/// first failure drops the rest of the wave, and cancellation of the
/// context's token abandons it. Returns the forwarded outputs keyed by
/// child name.
pub(crate) async fn execute_graph(graph: &Graph, ctx: &Context) -> Result<Map<String, Value>> {
    let children = graph.children();
    let mut scope = Scope::default();

    for (wave, level) in graph.waves().iter().enumerate() {
        if ctx.cancel_token().is_cancelled() {
            return Err(TrellisError::Cancelled);
        }

        let mut runs = Vec::with_capacity(level.len());
        for &i in level {
            let child = &children[i];
            let child_ctx = child_context(child, ctx, &scope)?;
            runs.push(run_child(child, child_ctx));
        }

        debug!(graph = %ctx.path(), wave, nodes = level.len(), "Running wave");

        let outputs = tokio::select! {
            result = future::try_join_all(runs) => result?,
            _ = ctx.cancel_token().cancelled() => return Err(TrellisError::Cancelled),
        };

        for (&i, output) in level.iter().zip(outputs) {
            let child = &children[i];
            scope.write(&child.name, &child_path(ctx.path(), &child.name), output)?;
        }
    }

    let mut forwarded = Map::new();
    for i in graph.output_indices() {
        let name = &children[i].name;
        if let Some(value) = scope.take(name) {
            forwarded.insert(name.clone(), value);
        }
    }
    Ok(forwarded)
}
