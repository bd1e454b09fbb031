use std::sync::Arc;

use chrono::Utc;
use futures::Stream;
use tracing::{debug, error, info, warn};

use statewalk_core::error::{Result, StatewalkError};
use statewalk_core::state::State;
use statewalk_core::traits::CheckpointStore;
use statewalk_core::types::{Checkpoint, NodeContext, SessionId, Transition};

use crate::graph::{Graph, Route};

/// One completed step of a walk: the node that ran and the state after its
/// update was merged and checkpointed.
#[derive(Debug, Clone)]
pub struct Step {
    pub node: String,
    pub state: State,
}

/// Drives a [`Graph`] over a state record, one session at a time.
///
/// The checkpoint store is an explicitly injected capability; the executor
/// holds no global state and may serve many sessions, each walked on its
/// own logical thread of control.
pub struct Executor {
    store: Arc<dyn CheckpointStore>,
}

impl Executor {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store }
    }

    /// Run the graph to the end sentinel and return the final state.
    pub async fn run(
        &self,
        graph: &Graph,
        initial: State,
        session: &SessionId,
        resume: bool,
    ) -> Result<State> {
        let mut walk = self.walk(graph, initial, session, resume)?;
        while walk.next_step().await?.is_some() {}
        Ok(walk.into_state())
    }

    /// Begin a step-by-step walk.
    ///
    /// When `resume` is true and a checkpoint exists for the session, the
    /// walk restarts from the checkpointed position and state; `initial` is
    /// used only when no checkpoint is found. Dropping the walk is
    /// cancellation — no further node runs.
    pub fn walk<'a>(
        &self,
        graph: &'a Graph,
        initial: State,
        session: &SessionId,
        resume: bool,
    ) -> Result<Walk<'a>> {
        let (current, state, seq) = if resume {
            match self.store.load_latest(session)? {
                Some(cp) => {
                    info!(
                        session = %session,
                        seq = cp.seq,
                        node = %cp.node,
                        "Resuming from checkpoint"
                    );
                    // The checkpoint records the node that last completed;
                    // routing is pure on state, so re-deriving the target
                    // re-enters exactly where the walk left off.
                    let next = match &cp.node {
                        Transition::To(id) => evaluate_route(graph, id, &cp.state)?,
                        Transition::End => Transition::End,
                    };
                    (next, cp.state, cp.seq)
                }
                None => (Transition::to(graph.entry()), initial, 0),
            }
        } else {
            // A fresh walk under a reused session key continues the stored
            // sequence numbering so its checkpoints strictly supersede the
            // previous run's.
            let seq = self.store.load_latest(session)?.map_or(0, |cp| cp.seq);
            (Transition::to(graph.entry()), initial, seq)
        };

        graph.schema().validate_initial(&state)?;

        Ok(Walk {
            graph,
            store: self.store.clone(),
            session: session.clone(),
            current,
            state,
            seq,
            steps: 0,
        })
    }

    /// Drop all checkpoints for a session, forcing the next resume to start
    /// fresh.
    pub fn reset(&self, session: &SessionId) -> Result<usize> {
        self.store.delete(session)
    }
}

/// An in-progress traversal. Finite by construction: the run configuration's
/// step limit cuts off any router that never reaches the end sentinel.
pub struct Walk<'a> {
    graph: &'a Graph,
    store: Arc<dyn CheckpointStore>,
    session: SessionId,
    current: Transition,
    state: State,
    seq: u64,
    steps: usize,
}

impl<'a> Walk<'a> {
    /// Where the walk stands: the node about to run, or the end sentinel.
    pub fn current_node(&self) -> &Transition {
        &self.current
    }

    /// The last successfully merged state. After a checkpoint failure this
    /// is the in-memory result the store never saw.
    pub fn last_state(&self) -> &State {
        &self.state
    }

    pub fn into_state(self) -> State {
        self.state
    }

    /// Execute one step: invoke the current node, merge its update, persist
    /// a checkpoint, and evaluate the route. Returns `None` once the end
    /// sentinel has been reached.
    pub async fn next_step(&mut self) -> Result<Option<Step>> {
        let node_id = match &self.current {
            Transition::To(id) => id.clone(),
            Transition::End => return Ok(None),
        };

        let limit = self.graph.config().step_limit;
        if self.steps >= limit {
            warn!(
                session = %self.session,
                node_id = %node_id,
                "Step limit reached without end sentinel, aborting walk"
            );
            return Err(StatewalkError::StepLimitExceeded(self.steps));
        }

        let spec = self.graph.node(&node_id).ok_or_else(|| {
            StatewalkError::Validation(format!("node '{}' not found in graph", node_id))
        })?;

        info!(
            session = %self.session,
            node_id = %node_id,
            step = self.steps,
            "Executing graph node"
        );

        let ctx = NodeContext {
            session: self.session.clone(),
            node: node_id.clone(),
            step: self.steps,
        };
        let update = match spec.action.invoke(ctx, self.state.clone()).await {
            Ok(update) => update,
            Err(e @ StatewalkError::Action { .. }) => return Err(e),
            Err(e) => {
                error!(node_id = %node_id, error = %e, "Graph node failed");
                return Err(StatewalkError::Action {
                    node: node_id,
                    message: e.to_string(),
                });
            }
        };

        self.state.apply(
            update,
            self.graph.schema(),
            self.graph.config().history_window,
            spec.increments.as_deref(),
        )?;
        self.steps += 1;
        self.seq += 1;

        // Durable before the walk advances; a failed write aborts the walk
        // with the merged state the store never saw, also kept observable
        // via last_state().
        if let Err(e) = self.store.save(&Checkpoint {
            session_id: self.session.clone(),
            seq: self.seq,
            node: Transition::to(node_id.as_str()),
            state: self.state.clone(),
            timestamp: Utc::now(),
        }) {
            error!(node_id = %node_id, error = %e, "Checkpoint write failed");
            return Err(StatewalkError::CheckpointWrite {
                node: node_id,
                message: e.to_string(),
                state: Box::new(self.state.clone()),
            });
        }

        self.current = evaluate_route(self.graph, &node_id, &self.state)?;

        debug!(
            node_id = %node_id,
            next = %self.current,
            seq = self.seq,
            "Step complete"
        );

        Ok(Some(Step {
            node: node_id,
            state: self.state.clone(),
        }))
    }

    /// Adapt the walk to a lazy stream of steps. The consumer stopping is
    /// the cancellation mechanism.
    pub fn into_stream(self) -> impl Stream<Item = Result<Step>> + 'a {
        futures::stream::try_unfold(self, |mut walk| async move {
            let item = walk.next_step().await?;
            Ok(item.map(|step| (step, walk)))
        })
    }
}

/// Evaluate a node's outgoing route against post-merge state.
fn evaluate_route(graph: &Graph, node_id: &str, state: &State) -> Result<Transition> {
    let route = graph.route(node_id).ok_or_else(|| {
        StatewalkError::Validation(format!("node '{}' has no outgoing route", node_id))
    })?;
    match route {
        Route::Static(target) => Ok(target.clone()),
        Route::Conditional { router, targets } => {
            let target = router.decide(state)?;
            if !targets.contains(&target) {
                return Err(StatewalkError::UndeclaredRoute {
                    node: node_id.to_string(),
                    target: target.to_string(),
                });
            }
            Ok(target)
        }
    }
}
