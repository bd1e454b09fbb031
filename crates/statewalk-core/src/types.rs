use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::State;

/// Caller-chosen identifier scoping one execution's checkpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where control goes after a node's update has been merged.
///
/// `End` is the terminal sentinel: a router returning it stops the walk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "node", rename_all = "snake_case")]
pub enum Transition {
    /// Continue at the named node.
    To(String),
    /// Stop the walk.
    End,
}

impl Transition {
    pub fn to(node: impl Into<String>) -> Self {
        Self::To(node.into())
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Transition::End)
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::To(node) => write!(f, "{}", node),
            Transition::End => write!(f, "<end>"),
        }
    }
}

/// Per-invocation context threaded into each node action.
///
/// Carries run metadata only. Collaborators a node needs (model clients,
/// search clients) are injected where the action is constructed, never
/// through globals.
#[derive(Debug, Clone)]
pub struct NodeContext {
    /// Session this invocation belongs to.
    pub session: SessionId,
    /// Node being invoked.
    pub node: String,
    /// Zero-based step number within the walk.
    pub step: usize,
}

/// A durable, versioned snapshot of state plus execution position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Session being checkpointed.
    pub session_id: SessionId,
    /// Sequence number within the session; each write gets a new one.
    pub seq: u64,
    /// Node that completed the step producing this checkpoint. Resume
    /// re-evaluates its route to find the next node to enter.
    pub node: Transition,
    /// Full state record after the step that produced this checkpoint.
    pub state: State,
    /// When the checkpoint was created.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_unique() {
        assert_ne!(SessionId::new().0, SessionId::new().0);
    }

    #[test]
    fn test_transition_display() {
        assert_eq!(Transition::to("plan").to_string(), "plan");
        assert_eq!(Transition::End.to_string(), "<end>");
        assert!(Transition::End.is_end());
        assert!(!Transition::to("plan").is_end());
    }

    #[test]
    fn test_transition_serde_roundtrip() {
        let t = Transition::to("reflect");
        let json = serde_json::to_string(&t).unwrap();
        let parsed: Transition = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, t);

        let end: Transition = serde_json::from_str(r#"{"type":"end"}"#).unwrap();
        assert!(end.is_end());
    }
}
