//! Error types for the eventflow engine.
//!
//! Store and context errors are local, synchronous failures raised at the
//! offending call. Engine errors surface from [`crate::workflow::Workflow::run`].

use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// The main error type for eventflow operations.
#[derive(Debug, Error)]
pub enum EventflowError {
    /// A context was constructed without a state root.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// A keyed-store operation failed.
    #[error("{0}")]
    Context(#[from] ContextError),

    /// The workflow definition is invalid.
    #[error("{0}")]
    Validation(#[from] WorkflowValidationError),

    /// A run failed while executing.
    #[error("{0}")]
    Runtime(#[from] WorkflowRuntimeError),

    /// A run exceeded its time budget.
    #[error("{0}")]
    Timeout(#[from] WorkflowTimeoutError),

    /// A step asked for a service that was never registered.
    #[error("{0}")]
    ServiceNotFound(#[from] ServiceNotFoundError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error raised when a [`crate::context::Context`] has no state root to attach to.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error for a context built from neither a session nor a parent.
    #[must_use]
    pub fn missing_root() -> Self {
        Self::new("A session or a parent context is required to create a Context")
    }
}

/// Error raised when a private key collides with an existing key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("A key named '{key}' already exists in the Context storage")]
pub struct DuplicateKeyError {
    /// The conflicting key.
    pub key: String,
}

impl DuplicateKeyError {
    /// Creates a new duplicate key error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Error raised when reading a key that is private to another context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Key '{key}' is private to context {owner}")]
pub struct PrivacyViolationError {
    /// The requested key.
    pub key: String,
    /// The id of the context owning the private entry.
    pub owner: uuid::Uuid,
}

impl PrivacyViolationError {
    /// Creates a new privacy violation error.
    #[must_use]
    pub fn new(key: impl Into<String>, owner: uuid::Uuid) -> Self {
        Self {
            key: key.into(),
            owner,
        }
    }
}

/// Error raised when a key is absent and no default was supplied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Key '{key}' not found in Context")]
pub struct KeyNotFoundError {
    /// The missing key.
    pub key: String,
}

impl KeyNotFoundError {
    /// Creates a new key not found error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Errors returned by keyed-store operations on a context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// A private write collided with an existing key.
    #[error("{0}")]
    DuplicateKey(#[from] DuplicateKeyError),

    /// A read targeted another context's private entry.
    #[error("{0}")]
    PrivacyViolation(#[from] PrivacyViolationError),

    /// The key was not found.
    #[error("{0}")]
    KeyNotFound(#[from] KeyNotFoundError),

    /// A stored value could not be converted to the requested type.
    #[error("Value for key '{key}' has an unexpected shape: {reason}")]
    InvalidValue {
        /// The key that was read.
        key: String,
        /// The deserialization failure.
        reason: String,
    },
}

impl ContextError {
    /// Returns the key the error refers to.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::DuplicateKey(e) => &e.key,
            Self::PrivacyViolation(e) => &e.key,
            Self::KeyNotFound(e) => &e.key,
            Self::InvalidValue { key, .. } => key,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        let kind = match self {
            Self::DuplicateKey(_) => "DuplicateKeyError",
            Self::PrivacyViolation(_) => "PrivacyViolationError",
            Self::KeyNotFound(_) => "KeyNotFoundError",
            Self::InvalidValue { .. } => "InvalidValueError",
        };
        map.insert("type".to_string(), json!(kind));
        map.insert("key".to_string(), json!(self.key()));
        map.insert("message".to_string(), json!(self.to_string()));
        map
    }
}

/// Error raised when a workflow definition fails validation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct WorkflowValidationError {
    /// The error message.
    pub message: String,
    /// Names of the events or steps involved.
    pub subjects: Vec<String>,
}

impl WorkflowValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            subjects: Vec::new(),
        }
    }

    /// Builds a validation error listing the offending names.
    #[must_use]
    pub fn listing(prefix: &str, mut subjects: Vec<String>) -> Self {
        subjects.sort();
        Self {
            message: format!("{prefix}: {}", subjects.join(", ")),
            subjects,
        }
    }
}

/// Error raised while a run is executing.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct WorkflowRuntimeError {
    /// The error message.
    pub message: String,
    /// The step the failure originated in, if any.
    pub step: Option<String>,
}

impl WorkflowRuntimeError {
    /// Creates a new runtime error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            step: None,
        }
    }

    /// Wraps a failure raised by a step body.
    #[must_use]
    pub fn step_failed(step: &str, cause: &anyhow::Error) -> Self {
        Self {
            message: format!("Error in step '{step}': {cause:#}"),
            step: Some(step.to_string()),
        }
    }

    /// The error for an event addressed to an unknown step.
    #[must_use]
    pub fn unknown_step(step: &str) -> Self {
        Self::new(format!("Step {step} does not exist"))
    }

    /// The error for an event addressed to a step that cannot take it.
    #[must_use]
    pub fn rejected_event(step: &str, event_type: &str) -> Self {
        Self {
            message: format!("Step {step} does not accept event of type {event_type}"),
            step: Some(step.to_string()),
        }
    }
}

/// Error raised when a run exceeds its timeout.
#[derive(Debug, Clone, Error)]
#[error("Operation timed out after {} seconds", timeout.as_secs_f64())]
pub struct WorkflowTimeoutError {
    /// The configured timeout.
    pub timeout: Duration,
}

impl WorkflowTimeoutError {
    /// Creates a new timeout error.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Error raised when a service lookup fails.
#[derive(Debug, Clone, Error)]
#[error("Service {name} not found")]
pub struct ServiceNotFoundError {
    /// The requested service name.
    pub name: String,
}

impl ServiceNotFoundError {
    /// Creates a new service not found error.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_context_error_from_variants() {
        let err: ContextError = DuplicateKeyError::new("k").into();
        assert!(matches!(err, ContextError::DuplicateKey(_)));
        assert_eq!(err.key(), "k");

        let err: ContextError = KeyNotFoundError::new("missing").into();
        assert_eq!(err.to_string(), "Key 'missing' not found in Context");
    }

    #[test]
    fn test_context_error_to_dict() {
        let owner = uuid::Uuid::new_v4();
        let err: ContextError = PrivacyViolationError::new("secret", owner).into();
        let dict = err.to_dict();

        assert_eq!(dict.get("type").unwrap(), "PrivacyViolationError");
        assert_eq!(dict.get("key").unwrap(), "secret");
    }

    #[test]
    fn test_validation_error_listing_is_sorted() {
        let err = WorkflowValidationError::listing(
            "The following services are not available",
            vec!["b_service".to_string(), "a_service".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "The following services are not available: a_service, b_service"
        );
        assert_eq!(err.subjects, vec!["a_service", "b_service"]);
    }

    #[test]
    fn test_runtime_error_messages() {
        assert_eq!(
            WorkflowRuntimeError::unknown_step("does_not_exist").to_string(),
            "Step does_not_exist does not exist"
        );
        let err = WorkflowRuntimeError::rejected_event("step", "Event");
        assert_eq!(err.to_string(), "Step step does not accept event of type Event");
        assert_eq!(err.step.as_deref(), Some("step"));

        let cause = anyhow::anyhow!("boom");
        let err = WorkflowRuntimeError::step_failed("flaky", &cause);
        assert_eq!(err.to_string(), "Error in step 'flaky': boom");
    }

    #[test]
    fn test_timeout_error_message() {
        let err = WorkflowTimeoutError::new(Duration::from_secs(1));
        assert_eq!(err.to_string(), "Operation timed out after 1 seconds");
    }

    #[test]
    fn test_umbrella_conversion() {
        let err: EventflowError = ConfigurationError::missing_root().into();
        assert!(matches!(err, EventflowError::Configuration(_)));

        let err: EventflowError = ContextError::from(KeyNotFoundError::new("x")).into();
        assert!(matches!(err, EventflowError::Context(ContextError::KeyNotFound(_))));
    }
}
