//! Shared test utilities: deterministic service stubs, instrumented
//! nodes, and fixtures.

pub mod fixtures;
pub mod nodes;
pub mod stubs;

pub use fixtures::{question_task, seeded_context, test_config, write_config};
pub use nodes::{FailingNode, RecordingNode, Span, Timeline};
pub use stubs::{FailingLlm, StubEmbedder, StubLlm, StubVectorStore};
