use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StatewalkError};

/// Graph-level run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// History window size K: after any step, at most this many entries
    /// are retained. Changing it mid-session is unsupported.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Hard safety bound on total steps, independent of any declared
    /// counter ceiling. A router that never reaches the end sentinel is
    /// cut off here.
    #[serde(default = "default_step_limit")]
    pub step_limit: usize,
}

fn default_history_window() -> usize {
    8
}

fn default_step_limit() -> usize {
    128
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            step_limit: default_step_limit(),
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| StatewalkError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_window == 0 {
            return Err(StatewalkError::Config(
                "history_window must be at least 1".into(),
            ));
        }
        if self.step_limit == 0 {
            return Err(StatewalkError::Config("step_limit must be at least 1".into()));
        }
        Ok(())
    }
}
