use std::collections::HashMap;
use std::sync::Mutex;

use statewalk_core::error::{Result, StatewalkError};
use statewalk_core::traits::CheckpointStore;
use statewalk_core::types::{Checkpoint, SessionId};

/// In-memory checkpoint store (for tests and ephemeral sessions).
///
/// Keeps every versioned write, like the SQLite store, minus durability.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    sessions: Mutex<HashMap<SessionId, Vec<Checkpoint>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints recorded for a session.
    pub fn count(&self, session: &SessionId) -> usize {
        self.sessions
            .lock()
            .map(|s| s.get(session).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, cp: &Checkpoint) -> Result<()> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| StatewalkError::Store(e.to_string()))?;
        sessions
            .entry(cp.session_id.clone())
            .or_default()
            .push(cp.clone());
        Ok(())
    }

    fn load_latest(&self, session: &SessionId) -> Result<Option<Checkpoint>> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|e| StatewalkError::Store(e.to_string()))?;
        Ok(sessions
            .get(session)
            .and_then(|cps| cps.iter().max_by_key(|cp| cp.seq))
            .cloned())
    }

    fn delete(&self, session: &SessionId) -> Result<usize> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| StatewalkError::Store(e.to_string()))?;
        Ok(sessions.remove(session).map_or(0, |cps| cps.len()))
    }
}
