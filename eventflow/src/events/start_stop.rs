//! The built-in start and stop payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Input of a run.
///
/// Carries the keyword arguments a run was started with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartEvent {
    /// The run inputs.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl StartEvent {
    /// Creates an empty start event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an input value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Gets an input value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

/// Terminal event of a run. Its `result` is what the run returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopEvent {
    /// The run result.
    #[serde(default)]
    pub result: Value,
}

impl StopEvent {
    /// Creates a stop event carrying `result`.
    #[must_use]
    pub fn new(result: impl Into<Value>) -> Self {
        Self {
            result: result.into(),
        }
    }

    /// Creates a stop event carrying no result.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a stop event from any serializable result.
    ///
    /// # Errors
    ///
    /// Returns the serde error if `result` cannot be represented as JSON.
    pub fn from_serializable<T: Serialize>(result: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            result: serde_json::to_value(result)?,
        })
    }
}
