use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrellisError {
    // Graph errors
    #[error("Graph construction failed: {0}")]
    GraphConstruction(String),

    #[error("Unresolved input '{input}' for node {node}")]
    UnresolvedInput { node: String, input: String },

    #[error("Node {node} wrote its output more than once")]
    DuplicateWrite { node: String },

    #[error("Node {node} finished without writing an output")]
    MissingOutput { node: String },

    #[error("Node {node} failed: {source}")]
    NodeExecution {
        node: String,
        #[source]
        source: Box<TrellisError>,
    },

    #[error("Task handler {handler} failed: {message}")]
    TaskHandler { handler: String, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Run cancelled")]
    Cancelled,

    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    // Retrieval errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrellisError {
    /// Attribute this error to the node at `path`.
    ///
    /// Errors that already name a node (wiring faults, nested node
    /// failures) and cancellation are returned unchanged, so the deepest
    /// failing node is the one reported.
    pub fn in_node(self, path: &str) -> Self {
        match self {
            e @ (TrellisError::UnresolvedInput { .. }
            | TrellisError::DuplicateWrite { .. }
            | TrellisError::MissingOutput { .. }
            | TrellisError::NodeExecution { .. }
            | TrellisError::Cancelled) => e,
            other => TrellisError::NodeExecution {
                node: path.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The node path this error is attributed to, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            TrellisError::UnresolvedInput { node, .. }
            | TrellisError::DuplicateWrite { node }
            | TrellisError::MissingOutput { node }
            | TrellisError::NodeExecution { node, .. } => Some(node),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TrellisError>;
