use serde::{Deserialize, Serialize};

use statewalk_core::error::{Result, StatewalkError};
use statewalk_core::state::State;
use statewalk_core::traits::Router;
use statewalk_core::types::Transition;

/// How a [`RevisionGate`] decides that the counter has passed the ceiling.
///
/// Callers in the wild use both; the comparison is an explicit parameter
/// rather than a hard-coded choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Terminal once `counter > ceiling`.
    #[default]
    Greater,
    /// Terminal once `counter >= ceiling` (one step earlier).
    GreaterOrEqual,
}

impl Comparison {
    pub fn passed(self, counter: u64, ceiling: u64) -> bool {
        match self {
            Comparison::Greater => counter > ceiling,
            Comparison::GreaterOrEqual => counter >= ceiling,
        }
    }
}

/// Termination router comparing a counter field against a ceiling field.
///
/// Returns the end sentinel once the counter has passed the ceiling under
/// the configured comparison, otherwise routes to `otherwise`. The gate
/// never increments the counter itself; that belongs to exactly one node
/// per cycle, declared via `add_incrementing_node`.
pub struct RevisionGate {
    counter: String,
    ceiling: String,
    comparison: Comparison,
    otherwise: Transition,
}

impl RevisionGate {
    pub fn new(
        counter: impl Into<String>,
        ceiling: impl Into<String>,
        otherwise: impl Into<String>,
    ) -> Self {
        Self {
            counter: counter.into(),
            ceiling: ceiling.into(),
            comparison: Comparison::default(),
            otherwise: Transition::to(otherwise),
        }
    }

    pub fn with_comparison(mut self, comparison: Comparison) -> Self {
        self.comparison = comparison;
        self
    }

    /// The declared output set, for `add_conditional_edges`.
    pub fn targets(&self) -> Vec<Transition> {
        vec![Transition::End, self.otherwise.clone()]
    }

    fn read(&self, state: &State, field: &str) -> Result<u64> {
        state.get_u64(field).ok_or_else(|| {
            StatewalkError::Schema(format!(
                "revision gate field '{}' missing or not an integer",
                field
            ))
        })
    }
}

impl Router for RevisionGate {
    fn decide(&self, state: &State) -> Result<Transition> {
        let counter = self.read(state, &self.counter)?;
        let ceiling = self.read(state, &self.ceiling)?;
        if self.comparison.passed(counter, ceiling) {
            Ok(Transition::End)
        } else {
            Ok(self.otherwise.clone())
        }
    }
}
