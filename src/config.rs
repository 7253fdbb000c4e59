//! Engine configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Execution options shared by all queries of an executor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Attach the edges walked by recursive steps to their result groups
    pub record_traces: bool,
    /// Upper bound on traversal rounds per recursive step; unbounded if unset
    pub max_recursion_rounds: Option<usize>,
}

impl EngineConfig {
    /// Load from a JSON file; missing keys take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    pub fn with_traces(mut self, record: bool) -> Self {
        self.record_traces = record;
        self
    }

    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_recursion_rounds = Some(rounds);
        self
    }
}
