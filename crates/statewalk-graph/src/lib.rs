//! Graph definition and execution for Statewalk.
//!
//! A workflow is a directed graph of named nodes over one shared,
//! schema-validated state record. Each node's action proposes a partial
//! update; the executor merges it, checkpoints the result, then follows the
//! node's route — a static successor or a conditional router that may
//! return the end sentinel.
//!
//! [`GraphBuilder`] validates the whole node/edge set once at construction;
//! [`Executor`] walks a built [`Graph`] to completion or step by step,
//! persisting a checkpoint after every step so a session can resume.

pub mod executor;
pub mod gate;
pub mod graph;

pub use executor::{Executor, Step, Walk};
pub use gate::{Comparison, RevisionGate};
pub use graph::{Graph, GraphBuilder};
