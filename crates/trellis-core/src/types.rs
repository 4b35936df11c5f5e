use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single payload row: column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Unique task identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work handed to an engine, and the shape of what task
/// handlers emit downstream.
///
/// `input_keys` names the payload columns that seed the root context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    pub id: TaskId,
    #[serde(default = "default_task_type")]
    pub task_type: String,
    #[serde(default)]
    pub input_keys: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Row>,
    pub created_at: DateTime<Utc>,
}

fn default_task_type() -> String {
    "completion".to_string()
}

impl TaskMessage {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            task_type: task_type.into(),
            input_keys: vec![],
            rows: vec![],
            created_at: Utc::now(),
        }
    }

    /// A completion task whose rows are read through `input_keys`.
    pub fn completion(input_keys: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            input_keys,
            rows,
            ..Self::new(default_task_type())
        }
    }

    /// Build a single-column completion task, one row per value.
    pub fn from_column(key: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        let key = key.into();
        let rows = values
            .into_iter()
            .map(|v| {
                let mut row = Row::new();
                row.insert(key.clone(), v);
                row
            })
            .collect();
        Self::completion(vec![key], rows)
    }

    /// Values of column `key`, one per row. `None` if any row lacks it.
    pub fn column(&self, key: &str) -> Option<Vec<serde_json::Value>> {
        self.rows.iter().map(|row| row.get(key).cloned()).collect()
    }

    /// Number of payload rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A record returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedRecord {
    pub id: String,
    pub page_content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Cosine similarity to the query vector.
    #[serde(default)]
    pub score: f32,
}

/// A document to be embedded and stored in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub page_content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_column_builds_rows() {
        let task = TaskMessage::from_column("questions", vec![json!("a"), json!("b")]);
        assert_eq!(task.task_type, "completion");
        assert_eq!(task.input_keys, vec!["questions"]);
        assert_eq!(task.len(), 2);
        assert_eq!(task.column("questions"), Some(vec![json!("a"), json!("b")]));
    }

    #[test]
    fn test_column_missing_in_some_row() {
        let mut task = TaskMessage::from_column("q", vec![json!("a"), json!("b")]);
        task.rows[1].remove("q");
        assert_eq!(task.column("q"), None);
        assert_eq!(task.column("nope"), None);
    }

    #[test]
    fn test_task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }
}
