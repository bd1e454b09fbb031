use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

use statewalk_core::error::{Result, StatewalkError};
use statewalk_core::traits::CheckpointStore;
use statewalk_core::types::{Checkpoint, SessionId, Transition};

/// SQLite-backed checkpoint store.
///
/// Every `save` inserts a new versioned row; nothing is mutated in place,
/// so a session's full step history stays available for replay and
/// debugging. Distinct session keys never interfere; one connection behind
/// a mutex serves all of them.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Open or create the checkpoint database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StatewalkError::Store(format!("Failed to create checkpoint directory: {}", e))
            })?;
        }

        let conn = Connection::open(path)
            .map_err(|e| StatewalkError::Store(format!("Failed to open checkpoint store: {}", e)))?;
        Self::init(conn, path.display().to_string())
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StatewalkError::Store(format!("Failed to open checkpoint store: {}", e)))?;
        Self::init(conn, ":memory:".to_string())
    }

    fn init(conn: Connection, label: String) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS checkpoints (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 session_id TEXT NOT NULL,
                 seq INTEGER NOT NULL,
                 node TEXT NOT NULL,
                 state_json TEXT NOT NULL,
                 timestamp TEXT NOT NULL
             );

             CREATE INDEX IF NOT EXISTS idx_cp_session_seq
                 ON checkpoints(session_id, seq DESC);",
        )
        .map_err(|e| StatewalkError::Store(format!("Failed to initialize checkpoint schema: {}", e)))?;

        debug!(path = %label, "Checkpoint store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn save(&self, cp: &Checkpoint) -> Result<()> {
        let node_json = serde_json::to_string(&cp.node)?;
        let state_json = serde_json::to_string(&cp.state)?;

        let conn = self.conn.lock().map_err(|e| StatewalkError::Store(e.to_string()))?;
        conn.execute(
            "INSERT INTO checkpoints (session_id, seq, node, state_json, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                cp.session_id.0,
                cp.seq as i64,
                node_json,
                state_json,
                cp.timestamp.to_rfc3339(),
            ],
        )
        .map_err(|e| StatewalkError::Store(format!("Failed to save checkpoint: {}", e)))?;
        Ok(())
    }

    fn load_latest(&self, session: &SessionId) -> Result<Option<Checkpoint>> {
        let conn = self.conn.lock().map_err(|e| StatewalkError::Store(e.to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT seq, node, state_json, timestamp
                 FROM checkpoints
                 WHERE session_id = ?1
                 ORDER BY seq DESC, id DESC
                 LIMIT 1",
            )
            .map_err(|e| StatewalkError::Store(format!("Failed to prepare query: {}", e)))?;

        let row = stmt
            .query_row(params![session.0], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StatewalkError::Store(format!(
                    "Failed to load checkpoint: {}",
                    other
                ))),
            })?;

        match row {
            None => Ok(None),
            Some((seq, node_json, state_json, ts_str)) => {
                let node: Transition = serde_json::from_str(&node_json)?;
                let state = serde_json::from_str(&state_json)?;
                let timestamp = DateTime::parse_from_rfc3339(&ts_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| {
                        StatewalkError::Store(format!("Invalid checkpoint timestamp: {}", e))
                    })?;
                Ok(Some(Checkpoint {
                    session_id: session.clone(),
                    seq: seq as u64,
                    node,
                    state,
                    timestamp,
                }))
            }
        }
    }

    fn delete(&self, session: &SessionId) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| StatewalkError::Store(e.to_string()))?;
        conn.execute(
            "DELETE FROM checkpoints WHERE session_id = ?1",
            params![session.0],
        )
        .map_err(|e| StatewalkError::Store(format!("Failed to delete checkpoints: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use statewalk_core::state::State;

    fn checkpoint(session: &str, seq: u64, iteration: u64) -> Checkpoint {
        Checkpoint {
            session_id: SessionId::from(session),
            seq,
            node: Transition::to("generate"),
            state: State::new().with("iteration", json!(iteration)),
            timestamp: Utc::now(),
        }
    }

    fn temp_store() -> (SqliteCheckpointStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteCheckpointStore::open(&dir.path().join("checkpoints.db")).unwrap();
        (store, dir)
    }

    #[test]
    fn test_save_and_load_latest() {
        let (store, _dir) = temp_store();
        store.save(&checkpoint("s1", 1, 1)).unwrap();
        store.save(&checkpoint("s1", 2, 2)).unwrap();

        let cp = store.load_latest(&SessionId::from("s1")).unwrap().unwrap();
        assert_eq!(cp.seq, 2);
        assert_eq!(cp.state.get_u64("iteration"), Some(2));
        assert_eq!(cp.node, Transition::to("generate"));
    }

    #[test]
    fn test_writes_are_versioned_not_overwritten() {
        let (store, _dir) = temp_store();
        for seq in 1..=3 {
            store.save(&checkpoint("s1", seq, seq)).unwrap();
        }
        // All three rows survive; delete reports the full count.
        let removed = store.delete(&SessionId::from("s1")).unwrap();
        assert_eq!(removed, 3);
    }

    #[test]
    fn test_load_nonexistent() {
        let (store, _dir) = temp_store();
        assert!(store
            .load_latest(&SessionId::from("nobody"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_sessions_are_isolated() {
        let (store, _dir) = temp_store();
        store.save(&checkpoint("s1", 5, 5)).unwrap();
        store.save(&checkpoint("s2", 1, 1)).unwrap();

        let cp1 = store.load_latest(&SessionId::from("s1")).unwrap().unwrap();
        let cp2 = store.load_latest(&SessionId::from("s2")).unwrap().unwrap();
        assert_eq!(cp1.seq, 5);
        assert_eq!(cp2.seq, 1);

        store.delete(&SessionId::from("s1")).unwrap();
        assert!(store.load_latest(&SessionId::from("s2")).unwrap().is_some());
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteCheckpointStore::in_memory().unwrap();
        store.save(&checkpoint("s1", 1, 1)).unwrap();
        assert!(store.load_latest(&SessionId::from("s1")).unwrap().is_some());
    }

    #[test]
    fn test_state_roundtrips_with_history() {
        use statewalk_core::history::HistoryEntry;

        let (store, _dir) = temp_store();
        let mut state = State::new().with("iteration", json!(2));
        state.set_history(vec![HistoryEntry::new("reviewer", "tighten section 2")]);
        store
            .save(&Checkpoint {
                session_id: SessionId::from("s1"),
                seq: 1,
                node: Transition::to("reflect"),
                state: state.clone(),
                timestamp: Utc::now(),
            })
            .unwrap();

        let cp = store.load_latest(&SessionId::from("s1")).unwrap().unwrap();
        assert_eq!(cp.state, state);
        assert_eq!(cp.state.history()[0].producer, "reviewer");
    }

    #[test]
    fn test_duplicate_seq_resolves_to_latest_row() {
        let (store, _dir) = temp_store();
        store.save(&checkpoint("s1", 2, 7)).unwrap();
        store.save(&checkpoint("s1", 2, 9)).unwrap();

        // Same seq: the more recently inserted row wins.
        let cp = store.load_latest(&SessionId::from("s1")).unwrap().unwrap();
        assert_eq!(cp.state.get_u64("iteration"), Some(9));
    }

    #[test]
    fn test_corrupt_timestamp_is_a_store_error() {
        let (store, dir) = temp_store();
        store.save(&checkpoint("s1", 1, 1)).unwrap();

        let conn = Connection::open(dir.path().join("checkpoints.db")).unwrap();
        conn.execute("UPDATE checkpoints SET timestamp = 'not-a-time'", [])
            .unwrap();
        drop(conn);

        let err = store.load_latest(&SessionId::from("s1")).unwrap_err();
        assert!(matches!(err, StatewalkError::Store(_)));
        assert!(err.to_string().contains("timestamp"));
    }
}
