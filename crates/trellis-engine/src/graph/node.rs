use std::sync::Arc;

use futures::future::BoxFuture;

use trellis_core::error::Result;

use super::context::Context;

/// A unit of work in a graph.
///
/// `execute` receives a context holding exactly the inputs named by
/// `input_names`, writes one output with [`Context::set_output`] and
/// hands the context back. A node that fails returns the error and
/// nothing it wrote is kept.
pub trait Node: Send + Sync + 'static {
    /// Local names of the inputs this node reads.
    fn input_names(&self) -> Vec<String>;

    /// Run the node. May suspend on external calls.
    fn execute(&self, ctx: Context) -> BoxFuture<'_, Result<Context>>;
}

impl<N: Node + ?Sized> Node for Arc<N> {
    fn input_names(&self) -> Vec<String> {
        (**self).input_names()
    }

    fn execute(&self, ctx: Context) -> BoxFuture<'_, Result<Context>> {
        (**self).execute(ctx)
    }
}

impl<N: Node + ?Sized> Node for Box<N> {
    fn input_names(&self) -> Vec<String> {
        (**self).input_names()
    }

    fn execute(&self, ctx: Context) -> BoxFuture<'_, Result<Context>> {
        (**self).execute(ctx)
    }
}
