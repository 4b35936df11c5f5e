use std::io::Write;

use trellis_core::config::{AppConfig, TemplateFormat};
use trellis_core::error::TrellisError;
use trellis_test_utils::{test_config, write_config};

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
run_timeout_secs = 30
input_keys = ["query"]
output_columns = ["answer", "raw"]

[model]
provider = "groq"
model_id = "llama-3.1-8b-instant"
api_key = "gsk-test-key"
max_tokens = 512
temperature = 0.3

[model.retry]
max_retries = 5
initial_backoff_ms = 250
max_backoff_ms = 8000

[embedding]
provider = "openai"
model = "text-embedding-3-small"
api_key = "sk-embed"
dimensions = 1536

[vector_store]
path = "/tmp/trellis-test/vectors.db"
collection = "Papers"
k = 6

[rag]
template_format = "f-string"
prompt = "Context: {contexts}\nQuestion: {query}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.run_timeout_secs, 30);
    assert_eq!(config.engine.input_keys, vec!["query"]);
    assert_eq!(config.engine.output_columns, vec!["answer", "raw"]);
    assert_eq!(config.model.provider, "groq");
    assert_eq!(config.model.api_key, Some("gsk-test-key".to_string()));
    assert_eq!(config.model.max_tokens, 512);
    assert!((config.model.temperature - 0.3).abs() < f32::EPSILON);

    let retry = config.model.retry.as_ref().expect("retry section");
    assert_eq!(retry.max_retries, 5);
    assert_eq!(retry.initial_backoff_ms, 250);

    let embedding = config.embedding.as_ref().expect("embedding section");
    assert_eq!(embedding.dimensions, 1536);

    assert_eq!(config.vector_store.collection, "Papers");
    assert_eq!(config.vector_store.k, 6);
    assert_eq!(
        config.vector_store_path(),
        std::path::PathBuf::from("/tmp/trellis-test/vectors.db")
    );
    assert_eq!(config.rag.template_format, TemplateFormat::FString);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("TRELLIS_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
provider = "openai"
model_id = "gpt-4o-mini"
api_key = "${TRELLIS_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.model.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("TRELLIS_TEST_API_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[model]
model_id = "gpt-4o-mini"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.model.provider, "openai");
    assert_eq!(config.model.max_tokens, 1024);
    assert_eq!(config.model.temperature, 0.0);
    assert!(config.model.retry.is_none());
    assert!(config.embedding.is_none());
    assert_eq!(config.engine.run_timeout_secs, 120);
    assert_eq!(config.engine.input_keys, vec!["questions"]);
    assert_eq!(config.engine.output_columns, vec!["response"]);
    assert_eq!(config.vector_store.collection, "Arxiv");
    assert_eq!(config.vector_store.k, 4);
    assert_eq!(config.rag.template_format, TemplateFormat::Jinja);
    assert!(config.rag.prompt.contains("{{ contexts }}"));
}

#[test]
fn test_missing_file_and_bad_toml() {
    let missing = std::path::Path::new("/nonexistent/trellis.toml");
    assert!(matches!(
        AppConfig::load(missing),
        Err(TrellisError::ConfigNotFound(_))
    ));

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[model\nprovider = ").expect("write toml");
    assert!(matches!(
        AppConfig::load(tmp.path()),
        Err(TrellisError::Config(_))
    ));

    // model_id is required
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = write_config(dir.path(), Some("[model]\nprovider = \"openai\"\n"));
    assert!(matches!(
        AppConfig::load(&path),
        Err(TrellisError::Config(_))
    ));
}

#[test]
fn test_local_services_config_from_disk() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = write_config(dir.path(), None);

    let loaded = AppConfig::load(&path).expect("load config");
    let expected = test_config();

    assert_eq!(loaded.model.provider, expected.model.provider);
    assert_eq!(loaded.model.model_id, expected.model.model_id);
    assert_eq!(loaded.engine.input_keys, expected.engine.input_keys);
    assert_eq!(loaded.engine.output_columns, vec!["response"]);
    assert_eq!(loaded.vector_store.collection, "Arxiv");
    assert_eq!(loaded.vector_store.k, 2);
    assert_eq!(loaded.embedding.map(|e| e.dimensions), Some(3));
}
