use thiserror::Error;

use crate::state::State;

#[derive(Debug, Error)]
pub enum StatewalkError {
    // Graph construction errors
    #[error("Graph validation failed: {0}")]
    Validation(String),

    // State errors
    #[error("Schema violation: {0}")]
    Schema(String),

    // Node action errors
    #[error("Node '{node}' failed: {message}")]
    Action { node: String, message: String },

    // Routing errors
    #[error("Router for node '{node}' returned undeclared target '{target}'")]
    UndeclaredRoute { node: String, target: String },

    #[error("Step limit exceeded ({0} steps) without reaching the end sentinel")]
    StepLimitExceeded(usize),

    // Checkpoint persistence errors
    #[error("Checkpoint store error: {0}")]
    Store(String),

    // Checkpoint write failed mid-walk. Carries the merged state the
    // store never saw so callers keep the last good result.
    #[error("Checkpoint write failed at node '{node}': {message}")]
    CheckpointWrite {
        node: String,
        message: String,
        state: Box<State>,
    },

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StatewalkError>;
