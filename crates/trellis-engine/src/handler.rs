use serde_json::Value;

use trellis_core::error::{Result, TrellisError};
use trellis_core::types::TaskMessage;

use crate::graph::Context;

/// Terminal consumer of a finished run.
///
/// Receives a context holding only its declared inputs plus the
/// originating task and turns them into zero or more downstream tasks.
/// The context is borrowed: handlers never change it.
pub trait TaskHandler: Send + Sync + 'static {
    /// Handler name (used in errors and logs).
    fn name(&self) -> &str;

    /// Local names of the inputs this handler reads.
    fn input_names(&self) -> Vec<String>;

    /// Produce output tasks, in order.
    fn try_handle(&self, ctx: &Context) -> Result<Vec<TaskMessage>>;
}

/// Copies the originating task and adds one payload column per input.
///
/// List inputs must hold one value per row; any other value is written
/// to every row.
#[derive(Debug, Clone)]
pub struct SimpleTaskHandler {
    output_columns: Vec<String>,
}

impl SimpleTaskHandler {
    pub fn new(output_columns: Vec<String>) -> Self {
        Self { output_columns }
    }

    pub fn output_columns(&self) -> &[String] {
        &self.output_columns
    }

    fn fail(&self, message: String) -> TrellisError {
        TrellisError::TaskHandler {
            handler: self.name().to_string(),
            message,
        }
    }
}

impl Default for SimpleTaskHandler {
    fn default() -> Self {
        Self::new(vec!["response".to_string()])
    }
}

impl TaskHandler for SimpleTaskHandler {
    fn name(&self) -> &str {
        "simple"
    }

    fn input_names(&self) -> Vec<String> {
        self.output_columns.clone()
    }

    fn try_handle(&self, ctx: &Context) -> Result<Vec<TaskMessage>> {
        let mut message = ctx.task().clone();
        let rows = message.rows.len();

        for column in &self.output_columns {
            let value = ctx.get_input(column)?;
            match value {
                Value::Array(items) => {
                    if items.len() != rows {
                        return Err(self.fail(format!(
                            "column '{}' has {} value(s) for {} row(s)",
                            column,
                            items.len(),
                            rows
                        )));
                    }
                    for (row, item) in message.rows.iter_mut().zip(items) {
                        row.insert(column.clone(), item.clone());
                    }
                }
                scalar => {
                    for row in message.rows.iter_mut() {
                        row.insert(column.clone(), scalar.clone());
                    }
                }
            }
        }

        Ok(vec![message])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use serde_json::json;

    fn context(task: TaskMessage, inputs: &[(&str, Value)]) -> Context {
        let inputs: HashMap<String, Value> = inputs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Context::with_inputs(task, inputs)
    }

    #[test]
    fn test_default_input_names() {
        assert_eq!(SimpleTaskHandler::default().input_names(), vec!["response"]);
        let handler = SimpleTaskHandler::new(vec!["frogs".into(), "toads".into()]);
        assert_eq!(handler.input_names(), vec!["frogs", "toads"]);
    }

    #[test]
    fn test_list_column_added_per_row() {
        let reptiles = ["lizards", "snakes", "turtles"];
        let task = TaskMessage::from_column("id", vec![json!(1), json!(2), json!(3)]);
        let ctx = context(task.clone(), &[("reptiles", json!(reptiles))]);

        let handler = SimpleTaskHandler::new(vec!["reptiles".into()]);
        let out = handler.try_handle(&ctx).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, task.id);
        assert_eq!(out[0].column("reptiles"), Some(reptiles.iter().map(|r| json!(r)).collect()));
        assert_eq!(out[0].column("id"), task.column("id"));
    }

    #[test]
    fn test_scalar_broadcast() {
        let task = TaskMessage::from_column("query", vec![json!("hello")]);
        let ctx = context(task, &[("answer", json!("generated-answer"))]);

        let out = SimpleTaskHandler::new(vec!["answer".into()])
            .try_handle(&ctx)
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rows[0].get("answer"), Some(&json!("generated-answer")));
        assert_eq!(out[0].rows[0].get("query"), Some(&json!("hello")));
    }

    #[test]
    fn test_length_mismatch() {
        let task = TaskMessage::from_column("q", vec![json!("a"), json!("b")]);
        let ctx = context(task, &[("response", json!(["only one"]))]);

        assert!(matches!(
            SimpleTaskHandler::default().try_handle(&ctx),
            Err(TrellisError::TaskHandler { .. })
        ));
    }

    #[test]
    fn test_missing_input() {
        let task = TaskMessage::from_column("q", vec![json!("a")]);
        let ctx = context(task, &[]);
        assert!(matches!(
            SimpleTaskHandler::default().try_handle(&ctx),
            Err(TrellisError::UnresolvedInput { .. })
        ));
    }
}
