//! Workflow builder with validation.

use super::{StepSpec, Workflow, WorkflowService};
use crate::config::WorkflowConfig;
use crate::errors::WorkflowValidationError;
use crate::events::Event;
use crate::observability::{NoOpEventSink, RunEventSink};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating workflows.
pub struct WorkflowBuilder<E: Event> {
    name: String,
    steps: Vec<StepSpec<E>>,
    config: WorkflowConfig,
    services: Vec<(String, Arc<dyn WorkflowService>)>,
    sink: Arc<dyn RunEventSink>,
}

impl<E: Event> std::fmt::Debug for WorkflowBuilder<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowBuilder")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E: Event> WorkflowBuilder<E> {
    /// Creates a new builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            config: WorkflowConfig::default(),
            services: Vec::new(),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Adds a step.
    #[must_use]
    pub fn step(mut self, spec: StepSpec<E>) -> Self {
        self.steps.push(spec);
        self
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the run timeout; `None` lets runs take as long as they need.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    /// Enables or disables verbose step logging.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config = self.config.with_verbose(verbose);
        self
    }

    /// Skips validation at the start of each run.
    #[must_use]
    pub fn disable_validation(mut self) -> Self {
        self.config = self.config.with_disable_validation(true);
        self
    }

    /// Sets the sink receiving run lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn RunEventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Registers a service the steps can call.
    #[must_use]
    pub fn with_service(mut self, name: impl Into<String>, service: Arc<dyn WorkflowService>) -> Self {
        self.services.push((name.into(), service));
        self
    }

    /// Returns the workflow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Builds the workflow.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no steps, two steps share a name, or a
    /// step specification is invalid.
    pub fn build(self) -> Result<Workflow<E>, WorkflowValidationError> {
        if self.steps.is_empty() {
            return Err(WorkflowValidationError::new("Workflow has no steps"));
        }

        let mut seen = HashSet::new();
        for spec in &self.steps {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(WorkflowValidationError::listing(
                    "Duplicate step names",
                    vec![spec.name.clone()],
                ));
            }
        }

        let workflow = Workflow::from_parts(self.name, self.steps, self.config, self.sink);
        for (name, service) in self.services {
            workflow.add_service(name, service);
        }
        Ok(workflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use crate::testing::{RecordingStep, TestEvent};

    fn step(name: &str) -> StepSpec<TestEvent> {
        StepSpec::new(Arc::new(RecordingStep::<TestEvent>::new(name)))
            .accepts([EventType::START])
            .produces([EventType::STOP])
    }

    #[test]
    fn test_builder_builds_workflow() {
        let builder = WorkflowBuilder::new("wf")
            .step(step("a"))
            .verbose(true)
            .with_timeout(Some(Duration::from_secs(2)));
        assert_eq!(builder.name(), "wf");
        assert_eq!(builder.step_count(), 1);

        let workflow = builder.build().unwrap();
        assert_eq!(workflow.name(), "wf");
        assert!(workflow.config().verbose);
        assert_eq!(workflow.config().timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_builder_rejects_empty_workflow() {
        let err = WorkflowBuilder::<TestEvent>::new("empty").build().unwrap_err();
        assert_eq!(err.to_string(), "Workflow has no steps");
    }

    #[test]
    fn test_builder_rejects_duplicate_names() {
        let err = WorkflowBuilder::new("dup")
            .step(step("a"))
            .step(step("a"))
            .build()
            .unwrap_err();
        assert_eq!(err.to_string(), "Duplicate step names: a");
    }

    #[test]
    fn test_builder_rejects_invalid_step() {
        let idle = StepSpec::new(Arc::new(RecordingStep::<TestEvent>::new("idle")));
        assert!(WorkflowBuilder::new("wf").step(idle).build().is_err());
    }

    #[test]
    fn test_builder_registers_services() {
        let inner = WorkflowBuilder::new("inner").step(step("a")).build().unwrap();
        let outer = WorkflowBuilder::new("outer")
            .step(step("b"))
            .with_service("inner", Arc::new(inner))
            .disable_validation()
            .build()
            .unwrap();

        assert!(outer.services().contains("inner"));
        assert!(outer.config().disable_validation);
    }
}
