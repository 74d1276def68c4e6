//! Step specifications.

use super::RetryConfig;
use crate::context::Context;
use crate::errors::WorkflowValidationError;
use crate::events::{Event, EventType};
use crate::steps::{FnStep, Step, SyncFnStep};
use std::future::Future;
use std::sync::Arc;

/// Specification for a single step of a workflow.
#[derive(Debug, Clone)]
pub struct StepSpec<E: Event> {
    /// The unique name of the step.
    pub name: String,
    /// The step implementation.
    pub runner: Arc<dyn Step<E>>,
    /// Event types the step is dispatched.
    pub accepted_events: Vec<EventType>,
    /// Event types the step may return.
    pub produced_events: Vec<EventType>,
    /// Whether the step may legitimately return nothing.
    pub optional_output: bool,
    /// Number of concurrent invocations sharing the step's queue.
    pub num_workers: usize,
    /// Names of the services the step calls.
    pub required_services: Vec<String>,
    /// Retry policy for failing invocations.
    pub retry: Option<RetryConfig>,
}

impl<E: Event> StepSpec<E> {
    /// Creates a specification named after `runner`.
    #[must_use]
    pub fn new(runner: Arc<dyn Step<E>>) -> Self {
        Self {
            name: runner.name().to_string(),
            runner,
            accepted_events: Vec::new(),
            produced_events: Vec::new(),
            optional_output: false,
            num_workers: 1,
            required_services: Vec::new(),
            retry: None,
        }
    }

    /// Creates a specification from an async closure.
    #[must_use]
    pub fn from_fn<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Context<E>, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<E>>> + Send + 'static,
    {
        Self::new(Arc::new(FnStep::new(name, func)))
    }

    /// Creates a specification from a synchronous closure.
    #[must_use]
    pub fn from_sync_fn<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Context<E>, E) -> anyhow::Result<Option<E>> + Send + Sync + 'static,
    {
        Self::new(Arc::new(SyncFnStep::new(name, func)))
    }

    /// Adds accepted event types.
    #[must_use]
    pub fn accepts(mut self, types: impl IntoIterator<Item = EventType>) -> Self {
        self.accepted_events.extend(types);
        self
    }

    /// Adds produced event types.
    #[must_use]
    pub fn produces(mut self, types: impl IntoIterator<Item = EventType>) -> Self {
        self.produced_events.extend(types);
        self
    }

    /// Marks the output as optional.
    #[must_use]
    pub fn optional_output(mut self) -> Self {
        self.optional_output = true;
        self
    }

    /// Sets the number of workers.
    #[must_use]
    pub fn with_num_workers(mut self, workers: usize) -> Self {
        self.num_workers = workers;
        self
    }

    /// Declares a service the step calls.
    #[must_use]
    pub fn requires_service(mut self, name: impl Into<String>) -> Self {
        self.required_services.push(name.into());
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Returns true if the step is dispatched events of `event_type`.
    #[must_use]
    pub fn accepts_type(&self, event_type: EventType) -> bool {
        self.accepted_events.contains(&event_type)
    }

    /// Validates the specification on its own.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty name, no accepted events, or zero workers.
    pub fn validate(&self) -> Result<(), WorkflowValidationError> {
        if self.name.trim().is_empty() {
            return Err(WorkflowValidationError::new("Step name cannot be empty"));
        }
        if self.accepted_events.is_empty() {
            return Err(WorkflowValidationError::new(format!(
                "Step '{}' does not accept any event",
                self.name
            )));
        }
        if self.num_workers == 0 {
            return Err(WorkflowValidationError::new(format!(
                "Step '{}' needs at least one worker",
                self.name
            )));
        }
        Ok(())
    }
}
