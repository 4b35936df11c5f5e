use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use trellis_core::config::AppConfig;
use trellis_core::types::TaskMessage;
use trellis_engine::Context;

const TEST_CONFIG: &str = r#"
[engine]
run_timeout_secs = 5
input_keys = ["questions"]
output_columns = ["response"]

[model]
provider = "ollama"
model_id = "llama3.2"
temperature = 0.0

[embedding]
provider = "ollama"
model = "nomic-embed-text"
dimensions = 3

[vector_store]
path = "vectors.db"
collection = "Arxiv"
k = 2
"#;

/// A complete config pointing at local services.
pub fn test_config() -> AppConfig {
    toml::from_str(TEST_CONFIG).expect("valid test config")
}

/// Write `contents` (or the test config) to `dir/trellis.toml`.
pub fn write_config(dir: &Path, contents: Option<&str>) -> PathBuf {
    let path = dir.join("trellis.toml");
    std::fs::write(&path, contents.unwrap_or(TEST_CONFIG)).expect("write test config");
    path
}

/// A completion task with one `questions` row per question.
pub fn question_task(questions: &[&str]) -> TaskMessage {
    TaskMessage::from_column(
        "questions",
        questions.iter().map(|q| Value::from(*q)).collect(),
    )
}

/// A root context seeded with explicit inputs.
pub fn seeded_context(inputs: &[(&str, Value)]) -> Context {
    let inputs: HashMap<String, Value> = inputs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    Context::with_inputs(TaskMessage::new("completion"), inputs)
}
