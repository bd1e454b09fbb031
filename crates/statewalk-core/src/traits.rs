use futures::future::BoxFuture;

use crate::error::Result;
use crate::state::{State, StateUpdate};
use crate::types::{Checkpoint, NodeContext, SessionId, Transition};

/// Node action — the opaque unit of work a graph node runs.
///
/// Receives an owned snapshot of the state and proposes a partial update.
/// The core does not know what the action computes; model calls, web
/// search, and any retries live entirely inside the implementation.
pub trait NodeAction: Send + Sync + 'static {
    fn invoke(&self, ctx: NodeContext, state: State) -> BoxFuture<'_, Result<StateUpdate>>;
}

/// Adapter turning a plain function into a [`NodeAction`].
pub struct NodeFn<F>(F);

impl<F> NodeFn<F>
where
    F: Fn(NodeContext, State) -> Result<StateUpdate> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> NodeAction for NodeFn<F>
where
    F: Fn(NodeContext, State) -> Result<StateUpdate> + Send + Sync + 'static,
{
    fn invoke(&self, ctx: NodeContext, state: State) -> BoxFuture<'_, Result<StateUpdate>> {
        let out = (self.0)(ctx, state);
        Box::pin(async move { out })
    }
}

/// Conditional router — selects the next node (or the end sentinel) from
/// the post-merge state. Pure with respect to the core.
pub trait Router: Send + Sync + 'static {
    fn decide(&self, state: &State) -> Result<Transition>;
}

/// Adapter turning a plain function into a [`Router`].
pub struct RouterFn<F>(F);

impl<F> RouterFn<F>
where
    F: Fn(&State) -> Result<Transition> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Router for RouterFn<F>
where
    F: Fn(&State) -> Result<Transition> + Send + Sync + 'static,
{
    fn decide(&self, state: &State) -> Result<Transition> {
        (self.0)(state)
    }
}

/// Checkpoint persistence backend.
///
/// `save` must be durable before the executor proceeds to the next step.
/// Each write is a new versioned record; `load_latest` returns the highest
/// sequence number for a session. Concurrent writes under distinct session
/// keys must not interfere.
pub trait CheckpointStore: Send + Sync + 'static {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    fn load_latest(&self, session: &SessionId) -> Result<Option<Checkpoint>>;

    /// Remove all checkpoints for a session, forcing the next run to start
    /// fresh. Returns the number of records removed.
    fn delete(&self, session: &SessionId) -> Result<usize>;
}
