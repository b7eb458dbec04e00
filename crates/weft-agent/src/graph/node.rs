use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use weft_core::error::Result;
use weft_core::types::RunId;

use super::state::GraphState;

/// Per-invocation context handed to a node.
#[derive(Debug, Clone)]
pub struct NodeContext {
    pub run_id: RunId,
    /// Zero-based index of this node invocation within the run.
    pub step: usize,
    /// Cancelled when the run is aborted; race external calls against it.
    pub cancel: CancellationToken,
}

/// A named unit of work: reads the state, returns the fields it owns.
///
/// A node never mutates the state it is given. Its update always carries
/// one trace entry naming the node (optionally outcome-tagged).
pub trait Node<S: GraphState>: Send + Sync + 'static {
    fn run<'a>(&'a self, state: &'a S, ctx: &'a NodeContext) -> BoxFuture<'a, Result<S::Update>>;
}

/// Adapter turning a synchronous closure into a [`Node`].
pub struct FnNode<F>(F);

/// Wrap a closure `Fn(&S) -> Result<S::Update>` as a node.
pub fn from_fn<F>(f: F) -> FnNode<F> {
    FnNode(f)
}

impl<S, F> Node<S> for FnNode<F>
where
    S: GraphState,
    F: Fn(&S) -> Result<S::Update> + Send + Sync + 'static,
{
    fn run<'a>(&'a self, state: &'a S, _ctx: &'a NodeContext) -> BoxFuture<'a, Result<S::Update>> {
        let out = (self.0)(state);
        Box::pin(async move { out })
    }
}
