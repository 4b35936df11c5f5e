use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use trellis_core::error::{Result, TrellisError};

use super::context::Context;
use super::executor;
use super::input::{InputMapping, InputRef};
use super::node::Node;

/// A child node and its resolved wiring.
pub(crate) struct Child {
    pub(crate) name: String,
    pub(crate) node: Arc<dyn Node>,
    /// (reference, local input name), in the node's declared order.
    pub(crate) inputs: Vec<(InputRef, String)>,
    /// Indices of sibling producers.
    pub(crate) deps: Vec<usize>,
    pub(crate) is_output: bool,
}

/// A composite node: an internal graph of named children.
///
/// Children must be added after every sibling they read from, so the
/// wiring is acyclic by construction; it is still checked on every
/// insertion and a rejected node leaves the graph unchanged. Execution
/// waves are computed at construction time and reused for every run.
///
/// The graph's output is an object keyed by child name holding the
/// outputs of the children flagged `is_output`. When none are flagged,
/// every child no sibling reads from is forwarded instead. Everything
/// else stays internal to the graph.
#[derive(Default)]
pub struct Graph {
    children: Vec<Child>,
    index: HashMap<String, usize>,
    input_names: Vec<String>,
    levels: Vec<Vec<usize>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a child node.
    ///
    /// Each entry of `inputs` is `name` (one of this graph's inputs),
    /// `/node` (a sibling's output) or `/node/field`, optionally suffixed
    /// with `as local` to pick which declared input it feeds. Entries
    /// without a local name bind positionally. With no entries, every
    /// declared input is read from this graph's input of the same name.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        inputs: &[&str],
        node: impl Node,
        is_output: bool,
    ) -> Result<&mut Self> {
        let mappings = inputs
            .iter()
            .map(|s| InputMapping::parse(s))
            .collect::<Result<Vec<_>>>()?;
        self.add_node_mapped(name, mappings, node, is_output)
    }

    /// Add a child node with already-parsed input mappings.
    pub fn add_node_mapped(
        &mut self,
        name: impl Into<String>,
        inputs: Vec<InputMapping>,
        node: impl Node,
        is_output: bool,
    ) -> Result<&mut Self> {
        let name = name.into();
        validate_name(&name)?;
        if self.index.contains_key(&name) {
            return Err(TrellisError::GraphConstruction(format!(
                "duplicate node name '{}'",
                name
            )));
        }

        let bound = bind_inputs(&name, &node.input_names(), inputs)?;

        let mut deps = Vec::new();
        for (reference, _) in &bound {
            let Some(producer) = reference.producer() else {
                continue;
            };
            if producer == name {
                return Err(TrellisError::GraphConstruction(format!(
                    "node '{}' reads its own output (cycle)",
                    name
                )));
            }
            let idx = self.index.get(producer).ok_or_else(|| {
                TrellisError::GraphConstruction(format!(
                    "node '{}' reads '{}', which has not been added",
                    name, reference
                ))
            })?;
            if !deps.contains(idx) {
                deps.push(*idx);
            }
        }
        deps.sort_unstable();

        let child = Child {
            name: name.clone(),
            node: Arc::new(node),
            inputs: bound,
            deps,
            is_output,
        };

        let mut candidate: Vec<&Child> = self.children.iter().collect();
        candidate.push(&child);
        let levels = compute_levels(&candidate)?;

        for (reference, _) in &child.inputs {
            if let InputRef::Parent(key) = reference {
                if !self.input_names.contains(key) {
                    self.input_names.push(key.clone());
                }
            }
        }
        self.index.insert(name, self.children.len());
        self.children.push(child);
        self.levels = levels;
        Ok(self)
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether a direct child named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Child names per execution wave, in declaration order.
    pub fn levels(&self) -> Vec<Vec<&str>> {
        self.levels
            .iter()
            .map(|level| {
                level
                    .iter()
                    .map(|&i| self.children[i].name.as_str())
                    .collect()
            })
            .collect()
    }

    /// Names of the children whose outputs this graph forwards.
    pub fn output_names(&self) -> Vec<&str> {
        self.output_indices()
            .into_iter()
            .map(|i| self.children[i].name.as_str())
            .collect()
    }

    pub(crate) fn children(&self) -> &[Child] {
        &self.children
    }

    pub(crate) fn waves(&self) -> &[Vec<usize>] {
        &self.levels
    }

    pub(crate) fn output_indices(&self) -> Vec<usize> {
        let flagged: Vec<usize> = self
            .children
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_output)
            .map(|(i, _)| i)
            .collect();
        if !flagged.is_empty() {
            return flagged;
        }

        let consumed: HashSet<usize> = self
            .children
            .iter()
            .flat_map(|c| c.deps.iter().copied())
            .collect();
        (0..self.children.len())
            .filter(|i| !consumed.contains(i))
            .collect()
    }
}

impl Node for Graph {
    fn input_names(&self) -> Vec<String> {
        self.input_names.clone()
    }

    fn execute(&self, mut ctx: Context) -> BoxFuture<'_, Result<Context>> {
        Box::pin(async move {
            let outputs = executor::execute_graph(self, &ctx).await?;
            ctx.set_output(Value::Object(outputs))?;
            Ok(ctx)
        })
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains(char::is_whitespace) {
        return Err(TrellisError::GraphConstruction(format!(
            "invalid node name '{}'",
            name
        )));
    }
    Ok(())
}

/// Pair every declared input name with exactly one reference.
fn bind_inputs(
    node: &str,
    declared: &[String],
    mappings: Vec<InputMapping>,
) -> Result<Vec<(InputRef, String)>> {
    if mappings.is_empty() {
        return Ok(declared
            .iter()
            .map(|n| (InputRef::Parent(n.clone()), n.clone()))
            .collect());
    }

    let explicit: Vec<String> = mappings
        .iter()
        .filter_map(|m| m.local_name.clone())
        .collect();
    let mut free = declared.iter().filter(|n| !explicit.contains(*n));

    let mut bound: Vec<(InputRef, String)> = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        let local = match mapping.local_name {
            Some(local) => local,
            None => free.next().cloned().ok_or_else(|| {
                TrellisError::GraphConstruction(format!(
                    "node '{}' declares {} input(s) but more were given",
                    node,
                    declared.len()
                ))
            })?,
        };
        if !declared.contains(&local) {
            return Err(TrellisError::GraphConstruction(format!(
                "node '{}' has no input named '{}'",
                node, local
            )));
        }
        if bound.iter().any(|(_, l)| *l == local) {
            return Err(TrellisError::GraphConstruction(format!(
                "input '{}' of node '{}' is bound twice",
                local, node
            )));
        }
        bound.push((mapping.reference, local));
    }

    if let Some(missing) = declared.iter().find(|d| !bound.iter().any(|(_, l)| l == *d)) {
        return Err(TrellisError::GraphConstruction(format!(
            "input '{}' of node '{}' is not bound",
            missing, node
        )));
    }

    // Keep the node's declared order.
    bound.sort_by_key(|(_, local)| declared.iter().position(|d| d == local));
    Ok(bound)
}

/// Group children into waves with Kahn's algorithm.
///
/// Each wave holds the children whose producers all appear in earlier
/// waves, in declaration order.
fn compute_levels(children: &[&Child]) -> Result<Vec<Vec<usize>>> {
    let mut in_degree: Vec<usize> = children.iter().map(|c| c.deps.len()).collect();
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); children.len()];
    for (i, child) in children.iter().enumerate() {
        for &dep in &child.deps {
            consumers[dep].push(i);
        }
    }

    let mut levels = Vec::new();
    let mut placed = 0;
    let mut current: Vec<usize> = (0..children.len()).filter(|&i| in_degree[i] == 0).collect();

    while !current.is_empty() {
        placed += current.len();
        let mut next = Vec::new();
        for &i in &current {
            for &consumer in &consumers[i] {
                in_degree[consumer] -= 1;
                if in_degree[consumer] == 0 {
                    next.push(consumer);
                }
            }
        }
        next.sort_unstable();
        levels.push(current);
        current = next;
    }

    if placed != children.len() {
        return Err(TrellisError::GraphConstruction(
            "input references form a cycle".into(),
        ));
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Const {
        inputs: Vec<String>,
        value: Value,
    }

    impl Const {
        fn new(inputs: &[&str], value: Value) -> Self {
            Self {
                inputs: inputs.iter().map(|s| s.to_string()).collect(),
                value,
            }
        }
    }

    impl Node for Const {
        fn input_names(&self) -> Vec<String> {
            self.inputs.clone()
        }

        fn execute(&self, mut ctx: Context) -> BoxFuture<'_, Result<Context>> {
            Box::pin(async move {
                ctx.set_output(self.value.clone())?;
                Ok(ctx)
            })
        }
    }

    #[test]
    fn test_linear_wiring() {
        let mut g = Graph::new();
        g.add_node("a", &["query"], Const::new(&["query"], json!(1)), false)
            .unwrap();
        g.add_node("b", &["/a"], Const::new(&["x"], json!(2)), false)
            .unwrap();
        g.add_node("c", &["/b"], Const::new(&["x"], json!(3)), true)
            .unwrap();

        assert_eq!(g.len(), 3);
        assert_eq!(g.levels(), vec![vec!["a"], vec!["b"], vec!["c"]]);
        assert_eq!(g.output_names(), vec!["c"]);
        assert_eq!(g.input_names(), vec!["query"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut g = Graph::new();
        g.add_node("a", &[], Const::new(&[], json!(1)), false).unwrap();
        let err = g
            .add_node("a", &[], Const::new(&[], json!(2)), false)
            .err()
            .unwrap();
        assert!(matches!(err, TrellisError::GraphConstruction(_)));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut g = Graph::new();
        let err = g
            .add_node("b", &["/a"], Const::new(&["x"], json!(1)), false)
            .err()
            .unwrap();
        assert!(matches!(err, TrellisError::GraphConstruction(_)));
        assert!(g.is_empty());
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut g = Graph::new();
        let err = g
            .add_node("a", &["/a"], Const::new(&["x"], json!(1)), false)
            .err()
            .unwrap();
        match err {
            TrellisError::GraphConstruction(msg) => assert!(msg.contains("cycle")),
            other => panic!("expected GraphConstruction, got {other:?}"),
        }
        assert!(g.is_empty());
    }

    #[test]
    fn test_arity_mismatch_rejected() {
        let mut g = Graph::new();
        g.add_node("a", &[], Const::new(&[], json!(1)), false).unwrap();
        let err = g
            .add_node("b", &["/a", "query"], Const::new(&["x"], json!(1)), false)
            .err()
            .unwrap();
        assert!(matches!(err, TrellisError::GraphConstruction(_)));

        let err = g
            .add_node("c", &["/a"], Const::new(&["x", "y"], json!(1)), false)
            .err()
            .unwrap();
        assert!(matches!(err, TrellisError::GraphConstruction(_)));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_explicit_local_names() {
        let mut g = Graph::new();
        g.add_node("r", &["query"], Const::new(&["query"], json!([])), false)
            .unwrap();
        g.add_node(
            "p",
            &["query", "/r as contexts"],
            Const::new(&["contexts", "query"], json!("prompt")),
            true,
        )
        .unwrap();

        let p = &g.children()[1];
        assert_eq!(p.inputs[0].1, "contexts");
        assert_eq!(p.inputs[0].0.producer(), Some("r"));
        assert_eq!(p.inputs[1].1, "query");
        assert_eq!(p.deps, vec![0]);

        let err = g
            .add_node("q", &["/r as nope"], Const::new(&["x"], json!(1)), false)
            .err()
            .unwrap();
        assert!(matches!(err, TrellisError::GraphConstruction(_)));
    }

    #[test]
    fn test_diamond_levels_in_declaration_order() {
        let mut g = Graph::new();
        g.add_node("src", &[], Const::new(&[], json!(0)), false).unwrap();
        g.add_node("right", &["/src"], Const::new(&["x"], json!(1)), false)
            .unwrap();
        g.add_node("left", &["/src"], Const::new(&["x"], json!(2)), false)
            .unwrap();
        g.add_node(
            "join",
            &["/left", "/right"],
            Const::new(&["l", "r"], json!(3)),
            false,
        )
        .unwrap();

        assert_eq!(
            g.levels(),
            vec![vec!["src"], vec!["right", "left"], vec!["join"]]
        );
        // No flagged outputs: the sink is forwarded.
        assert_eq!(g.output_names(), vec!["join"]);
    }

    #[test]
    fn test_unflagged_forwards_all_sinks() {
        let mut g = Graph::new();
        g.add_node("a", &[], Const::new(&[], json!(0)), false).unwrap();
        g.add_node("b", &[], Const::new(&[], json!(1)), false).unwrap();
        g.add_node("c", &["/a"], Const::new(&["x"], json!(2)), false)
            .unwrap();
        assert_eq!(g.output_names(), vec!["b", "c"]);
    }

    #[test]
    fn test_invalid_names() {
        let mut g = Graph::new();
        assert!(g.add_node("", &[], Const::new(&[], json!(0)), false).is_err());
        assert!(g.add_node("a/b", &[], Const::new(&[], json!(0)), false).is_err());
        assert!(g.is_empty());
    }
}
