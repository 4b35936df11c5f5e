//! Built-in leaf nodes and the retrieval-augmented generation composite.

pub mod extracter;
pub mod generate;
pub mod lambda;
pub mod rag;
pub mod retriever;
pub mod template;

pub use extracter::ExtracterNode;
pub use generate::LlmGenerateNode;
pub use lambda::LambdaNode;
pub use rag::rag_graph;
pub use retriever::RetrieverNode;
pub use template::PromptTemplateNode;
