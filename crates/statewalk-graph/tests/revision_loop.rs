//! End-to-end walk of a draft/critique revision loop over the SQLite
//! checkpoint store, including an interrupted session resumed mid-loop.

use std::sync::Arc;

use serde_json::json;

use statewalk_core::history::{self, HistoryEntry};
use statewalk_core::state::{FieldKind, State, StateSchema, StateUpdate};
use statewalk_core::traits::{CheckpointStore, NodeFn};
use statewalk_core::types::{NodeContext, SessionId, Transition};
use statewalk_graph::{Comparison, Executor, Graph, GraphBuilder, RevisionGate};
use statewalk_memory::SqliteCheckpointStore;

fn schema() -> StateSchema {
    StateSchema::new()
        .field("task", FieldKind::Text)
        .field("revision_number", FieldKind::Counter)
        .field("max_revisions", FieldKind::Ceiling)
        .optional("draft", FieldKind::Text)
        .optional("critique", FieldKind::Text)
}

/// planner -> generate, generate gates to reflect until the revision
/// counter passes the ceiling, reflect -> generate.
fn essay_graph(comparison: Comparison) -> Graph {
    let planner = NodeFn::new(|_ctx, state: State| {
        let task = state.get_str("task").unwrap_or_default().to_string();
        Ok(StateUpdate::new().set_str("draft", format!("outline for: {}", task)))
    });
    let generate = NodeFn::new(|ctx: NodeContext, state: State| {
        let n = state.get_u64("revision_number").unwrap_or(0);
        let entry = HistoryEntry::new(ctx.node, format!("draft v{}", n + 1));
        Ok(StateUpdate::new()
            .set_str("draft", format!("draft v{}", n + 1))
            .set("revision_number", json!(n + 1))
            .with_history(history::append(state.history(), entry, 4)))
    });
    let reflect = NodeFn::new(|_ctx, state: State| {
        let draft = state.get_str("draft").unwrap_or_default().to_string();
        Ok(StateUpdate::new().set_str("critique", format!("critique of {}", draft)))
    });

    let gate =
        RevisionGate::new("revision_number", "max_revisions", "reflect").with_comparison(comparison);
    let targets = gate.targets();

    GraphBuilder::new(schema())
        .add_node("planner", planner)
        .add_incrementing_node("generate", "revision_number", generate)
        .add_node("reflect", reflect)
        .set_entry("planner")
        .add_edge("planner", "generate")
        .add_conditional_edges("generate", gate, targets)
        .add_edge("reflect", "generate")
        .build()
        .unwrap()
}

fn initial() -> State {
    State::new()
        .with("task", json!("langchain vs langsmith"))
        .with("revision_number", json!(1))
        .with("max_revisions", json!(3))
}

fn sqlite_store(dir: &tempfile::TempDir) -> Arc<SqliteCheckpointStore> {
    Arc::new(SqliteCheckpointStore::open(&dir.path().join("checkpoints.db")).unwrap())
}

#[tokio::test]
async fn full_loop_runs_to_the_declared_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Executor::new(sqlite_store(&dir));
    let graph = essay_graph(Comparison::Greater);
    let session = SessionId::from("essay-1");

    let final_state = executor
        .run(&graph, initial(), &session, false)
        .await
        .unwrap();

    // revision_number climbs 1 -> 4; with `>` the gate ends once it passes 3.
    assert_eq!(final_state.get_u64("revision_number"), Some(4));
    assert_eq!(final_state.get_str("draft"), Some("draft v4"));
    assert_eq!(
        final_state.get_str("critique"),
        Some("critique of draft v3")
    );
    // Three generate passes, window 4: all retained.
    assert_eq!(final_state.history().len(), 3);
    assert_eq!(final_state.history()[2].text, "draft v4");
}

#[tokio::test]
async fn greater_or_equal_ends_one_revision_earlier() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Executor::new(sqlite_store(&dir));
    let graph = essay_graph(Comparison::GreaterOrEqual);
    let session = SessionId::from("essay-2");

    let final_state = executor
        .run(&graph, initial(), &session, false)
        .await
        .unwrap();
    assert_eq!(final_state.get_u64("revision_number"), Some(3));
}

#[tokio::test]
async fn interrupted_session_resumes_to_the_same_result() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir);
    let graph = essay_graph(Comparison::Greater);

    // Reference run, no interruption.
    let reference = Executor::new(store.clone())
        .run(&graph, initial(), &SessionId::from("ref"), false)
        .await
        .unwrap();

    // Crash three steps in: drop the walk, then build a fresh executor on
    // the same database, as a restarted process would.
    let session = SessionId::from("crashy");
    {
        let executor = Executor::new(store.clone());
        let mut walk = executor.walk(&graph, initial(), &session, false).unwrap();
        for _ in 0..3 {
            walk.next_step().await.unwrap().unwrap();
        }
    }

    let resumed = Executor::new(store.clone())
        .run(&graph, State::new(), &session, true)
        .await
        .unwrap();
    assert_eq!(resumed, reference);

    // The checkpoint trail is versioned: the resumed session has one row
    // per completed step across both executions.
    let latest = store.load_latest(&session).unwrap().unwrap();
    assert_eq!(latest.node, Transition::to("generate"));
    assert_eq!(latest.state, reference);
}

#[tokio::test]
async fn concurrent_sessions_do_not_interfere() {
    let dir = tempfile::tempdir().unwrap();
    let store = sqlite_store(&dir);
    let graph = Arc::new(essay_graph(Comparison::Greater));

    let mut handles = Vec::new();
    for i in 0..4 {
        let store = store.clone();
        let graph = graph.clone();
        handles.push(tokio::spawn(async move {
            let executor = Executor::new(store);
            let session = SessionId::from(format!("worker-{}", i));
            executor.run(&graph, initial(), &session, false).await
        }));
    }
    for handle in handles {
        let state = handle.await.unwrap().unwrap();
        assert_eq!(state.get_u64("revision_number"), Some(4));
    }
}
