//! Graph execution: named nodes wired by input references.
//!
//! A [`Graph`] is a composite node holding child nodes in declaration
//! order. Each child declares the inputs it reads; the graph maps them
//! onto either its own inputs (`query`) or a sibling's output (`/retriever`).
//! Execution runs children in dependency waves: every child whose
//! producers have finished is started, the wave is awaited as a whole,
//! and the outputs are merged before the next wave starts.

pub mod composite;
pub mod context;
pub mod executor;
pub mod input;
pub mod node;

pub use composite::Graph;
pub use context::Context;
pub use input::{InputMapping, InputRef};
pub use node::Node;
