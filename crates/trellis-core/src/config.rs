use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrellisError};

/// Top-level Trellis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub embedding: Option<EmbeddingConfig>,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub rag: RagConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deadline applied by the caller around a whole engine run.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,
    /// Task columns seeded into the root context.
    #[serde(default = "default_input_keys")]
    pub input_keys: Vec<String>,
    /// Columns added to output tasks by the task handler.
    #[serde(default = "default_output_columns")]
    pub output_columns: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: default_run_timeout(),
            input_keys: default_input_keys(),
            output_columns: default_output_columns(),
        }
    }
}

fn default_run_timeout() -> u64 { 120 }
fn default_input_keys() -> Vec<String> { vec!["questions".to_string()] }
fn default_output_columns() -> Vec<String> { vec!["response".to_string()] }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 1024 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Embedding model configuration for retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "openai", "ollama", or any OpenAI-compatible API.
    pub provider: String,
    /// Model name (e.g., "all-MiniLM-L6-v2", "nomic-embed-text").
    pub model: String,
    /// Base URL for the embedding API (e.g., "http://localhost:11434/v1").
    #[serde(default)]
    pub base_url: Option<String>,
    /// API key (optional, for cloud providers).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Embedding dimensions (default: 384).
    #[serde(default = "default_embedding_dims")]
    pub dimensions: usize,
}

fn default_embedding_dims() -> usize { 384 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Number of records retrieved per query.
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            collection: default_collection(),
            k: default_k(),
        }
    }
}

fn default_store_path() -> String { "~/.trellis/vectors.db".to_string() }
fn default_collection() -> String { "Arxiv".to_string() }
fn default_k() -> usize { 4 }

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateFormat {
    /// `{{ name }}` placeholders.
    #[default]
    Jinja,
    /// `{name}` placeholders.
    FString,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default = "default_rag_prompt")]
    pub prompt: String,
    #[serde(default)]
    pub template_format: TemplateFormat,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            prompt: default_rag_prompt(),
            template_format: TemplateFormat::default(),
        }
    }
}

fn default_rag_prompt() -> String {
    "Answer the question using the context below.\n\nContext:\n{{ contexts }}\n\nQuestion: {{ query }}\nAnswer:".to_string()
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TrellisError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded)
            .map_err(|e| TrellisError::Config(e.to_string()))
    }

    /// Resolve the vector store path (expand ~).
    pub fn vector_store_path(&self) -> PathBuf {
        let path = &self.vector_store.path;
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_TRELLIS_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_TRELLIS_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_TRELLIS_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_TRELLIS_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_TRELLIS_VAR}\"");
    }

    #[test]
    fn test_defaults_from_minimal_toml() {
        let toml_str = r#"
[model]
model_id = "gpt-4o-mini"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.model.provider, "openai");
        assert_eq!(config.model.temperature, 0.0);
        assert!(config.model.retry.is_none());
        assert_eq!(config.engine.run_timeout_secs, 120);
        assert_eq!(config.engine.input_keys, vec!["questions"]);
        assert_eq!(config.engine.output_columns, vec!["response"]);
        assert!(config.embedding.is_none());
        assert_eq!(config.vector_store.collection, "Arxiv");
        assert_eq!(config.vector_store.k, 4);
        assert_eq!(config.rag.template_format, TemplateFormat::Jinja);
        assert!(config.rag.prompt.contains("{{ query }}"));
    }

    #[test]
    fn test_template_format_kebab_case() {
        let toml_str = r#"
[model]
model_id = "m"

[rag]
prompt = "Q: {query}"
template_format = "f-string"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.rag.template_format, TemplateFormat::FString);
    }

    #[test]
    fn test_vector_store_path_expands_home() {
        std::env::set_var("HOME", "/home/tester");
        let config: AppConfig = toml::from_str("[model]\nmodel_id = \"m\"\n").unwrap();
        assert_eq!(
            config.vector_store_path(),
            PathBuf::from("/home/tester/.trellis/vectors.db")
        );
    }
}
