pub mod config;
pub mod error;
pub mod history;
pub mod state;
pub mod traits;
pub mod types;

pub use config::RunConfig;
pub use error::{Result, StatewalkError};
pub use history::HistoryEntry;
pub use state::{FieldKind, FieldSpec, State, StateSchema, StateUpdate};
pub use traits::{CheckpointStore, NodeAction, NodeFn, Router, RouterFn};
pub use types::{Checkpoint, NodeContext, SessionId, Transition};
