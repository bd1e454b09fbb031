use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StatewalkError};
use crate::history::{self, HistoryEntry};

/// Declared type of a state field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Non-negative integer, monotonically non-decreasing across steps.
    /// Raised only by the one node declared as its incrementer.
    Counter,
    /// Non-negative integer ceiling, fixed at session creation.
    Ceiling,
    /// Free-form string.
    Text,
    /// JSON array, replaced wholesale on merge (never concatenated).
    List,
    /// Any JSON value, treated opaquely.
    Json,
}

/// Declaration of a single state field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub required: bool,
}

/// The fixed field schema for one graph instance.
///
/// Declared once at graph construction; every state record and every node
/// update is checked against it so missing-field and wrong-type errors
/// surface early, not mid-run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSchema {
    fields: BTreeMap<String, FieldSpec>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required field.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind,
                required: true,
            },
        );
        self
    }

    /// Declare an optional field.
    pub fn optional(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind,
                required: false,
            },
        );
        self
    }

    pub fn spec(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Check an initial state: all required fields present, all present
    /// fields matching their declared kind.
    pub fn validate_initial(&self, state: &State) -> Result<()> {
        for (name, spec) in &self.fields {
            match state.get(name) {
                Some(value) => check_kind(name, spec.kind, value)?,
                None if spec.required => {
                    return Err(StatewalkError::Schema(format!(
                        "required field '{}' missing from initial state",
                        name
                    )));
                }
                None => {}
            }
        }
        for name in state.values.keys() {
            if !self.contains(name) {
                return Err(StatewalkError::Schema(format!(
                    "initial state carries undeclared field '{}'",
                    name
                )));
            }
        }
        Ok(())
    }
}

fn check_kind(name: &str, kind: FieldKind, value: &Value) -> Result<()> {
    let ok = match kind {
        FieldKind::Counter | FieldKind::Ceiling => value.as_u64().is_some(),
        FieldKind::Text => value.is_string(),
        FieldKind::List => value.is_array(),
        FieldKind::Json => true,
    };
    if ok {
        Ok(())
    } else {
        Err(StatewalkError::Schema(format!(
            "field '{}' does not match declared kind {:?}: {}",
            name, kind, value
        )))
    }
}

/// The shared state record nodes read and partially update.
///
/// Owned exclusively by the executor during a step; actions receive an
/// owned snapshot and hand back a [`StateUpdate`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    values: BTreeMap<String, Value>,
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field initializer.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_str())
    }

    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.values.get(name).and_then(|v| v.as_u64())
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn set_history(&mut self, history: Vec<HistoryEntry>) {
        self.history = history;
    }

    /// Merge a node's partial update into this record.
    ///
    /// Per-field replacement, last writer wins; list fields replace
    /// wholesale. Counters must not decrease and may only be raised by the
    /// node declared as their incrementer (`allowed_counter`); ceilings are
    /// immutable once set. A replacement history is re-truncated to the
    /// window so the bound holds regardless of what the action returned.
    pub fn apply(
        &mut self,
        update: StateUpdate,
        schema: &StateSchema,
        window: usize,
        allowed_counter: Option<&str>,
    ) -> Result<()> {
        for (name, value) in update.values {
            let spec = schema.spec(&name).ok_or_else(|| {
                StatewalkError::Schema(format!("update touches undeclared field '{}'", name))
            })?;
            check_kind(&name, spec.kind, &value)?;

            match spec.kind {
                FieldKind::Counter => {
                    let old = self.get_u64(&name).unwrap_or(0);
                    let new = value.as_u64().unwrap_or(0);
                    if new < old {
                        return Err(StatewalkError::Schema(format!(
                            "counter '{}' may not decrease ({} -> {})",
                            name, old, new
                        )));
                    }
                    if new > old && allowed_counter != Some(name.as_str()) {
                        return Err(StatewalkError::Schema(format!(
                            "counter '{}' raised by a node not declared as its incrementer",
                            name
                        )));
                    }
                }
                FieldKind::Ceiling => {
                    if let Some(old) = self.get(&name) {
                        if *old != value {
                            return Err(StatewalkError::Schema(format!(
                                "ceiling '{}' is fixed at session creation",
                                name
                            )));
                        }
                    }
                }
                _ => {}
            }

            self.values.insert(name, value);
        }

        if let Some(entries) = update.history {
            self.history = history::truncate(entries, window);
        }
        Ok(())
    }
}

/// A partial record returned by a node action.
///
/// Fields absent from the update are left unchanged by the merge. A list
/// field must carry the full intended value; the core never concatenates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateUpdate {
    values: BTreeMap<String, Value>,
    history: Option<Vec<HistoryEntry>>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn set_str(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, Value::String(value.into()))
    }

    /// Replace the history with the given full sequence.
    pub fn with_history(mut self, entries: Vec<HistoryEntry>) -> Self {
        self.history = Some(entries);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.history.is_none()
    }
}
