pub mod engine;
pub mod graph;
pub mod handler;
pub mod nodes;

pub use engine::{Engine, RunOutput};
pub use graph::{Context, Graph, InputMapping, InputRef, Node};
pub use handler::{SimpleTaskHandler, TaskHandler};
pub use nodes::{
    rag_graph, ExtracterNode, LambdaNode, LlmGenerateNode, PromptTemplateNode, RetrieverNode,
};
