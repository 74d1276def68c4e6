//! Shared fixtures: a test event enum and small ready-made workflows.

use crate::context::Context;
use crate::errors::WorkflowValidationError;
use crate::events::{Event, EventType, StartEvent, StopEvent};
use crate::workflow::{StepSpec, Workflow};
use serde::Serialize;

/// Event enum used throughout the crate's tests and benchmarks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum TestEvent {
    /// Run input.
    Start(StartEvent),
    /// First test payload.
    One {
        /// Payload.
        test_param: String,
    },
    /// Second test payload.
    Another {
        /// Payload.
        another_test_param: String,
    },
    /// Payload-free marker.
    Last,
    /// Run result.
    Stop(StopEvent),
}

impl TestEvent {
    /// Type of [`TestEvent::One`].
    pub const ONE: EventType = EventType::new("OneTestEvent");
    /// Type of [`TestEvent::Another`].
    pub const ANOTHER: EventType = EventType::new("AnotherTestEvent");
    /// Type of [`TestEvent::Last`].
    pub const LAST: EventType = EventType::new("LastEvent");

    /// Builds a [`TestEvent::One`].
    #[must_use]
    pub fn one(param: &str) -> Self {
        Self::One {
            test_param: param.to_string(),
        }
    }

    /// Builds a [`TestEvent::Another`].
    #[must_use]
    pub fn another(param: &str) -> Self {
        Self::Another {
            another_test_param: param.to_string(),
        }
    }

    /// Builds a stop event carrying `result`.
    #[must_use]
    pub fn stop(result: impl Into<serde_json::Value>) -> Self {
        Self::Stop(StopEvent::new(result))
    }
}

impl Event for TestEvent {
    fn event_type(&self) -> EventType {
        match self {
            Self::Start(_) => EventType::START,
            Self::One { .. } => Self::ONE,
            Self::Another { .. } => Self::ANOTHER,
            Self::Last => Self::LAST,
            Self::Stop(_) => EventType::STOP,
        }
    }

    fn from_start(start: StartEvent) -> Self {
        Self::Start(start)
    }

    fn into_stop(self) -> Result<StopEvent, Self> {
        match self {
            Self::Stop(stop) => Ok(stop),
            other => Err(other),
        }
    }
}

/// start -> `One` -> `Last` -> stop("Workflow completed").
///
/// # Errors
///
/// Returns the builder's validation error; the fixture is valid.
pub fn linear_workflow() -> Result<Workflow<TestEvent>, WorkflowValidationError> {
    Workflow::builder("linear")
        .step(
            StepSpec::from_sync_fn("start_step", |_ctx: &Context<TestEvent>, _ev| {
                Ok(Some(TestEvent::one("test")))
            })
            .accepts([EventType::START])
            .produces([TestEvent::ONE]),
        )
        .step(
            StepSpec::from_sync_fn("middle_step", |_ctx: &Context<TestEvent>, _ev| {
                Ok(Some(TestEvent::Last))
            })
            .accepts([TestEvent::ONE])
            .produces([TestEvent::LAST]),
        )
        .step(
            StepSpec::from_sync_fn("end_step", |_ctx: &Context<TestEvent>, _ev| {
                Ok(Some(TestEvent::stop("Workflow completed")))
            })
            .accepts([TestEvent::LAST])
            .produces([EventType::STOP]),
        )
        .build()
}

/// Two steps turn the start event into `One` and `Another`; a third collects
/// both and stops with the collected pair.
///
/// # Errors
///
/// Returns the builder's validation error; the fixture is valid.
pub fn collect_pair_workflow() -> Result<Workflow<TestEvent>, WorkflowValidationError> {
    Workflow::builder("collect_pair")
        .step(
            StepSpec::from_sync_fn("emit_one", |_ctx: &Context<TestEvent>, _ev| {
                Ok(Some(TestEvent::one("test")))
            })
            .accepts([EventType::START])
            .produces([TestEvent::ONE]),
        )
        .step(
            StepSpec::from_sync_fn("emit_another", |_ctx: &Context<TestEvent>, _ev| {
                Ok(Some(TestEvent::another("test")))
            })
            .accepts([EventType::START])
            .produces([TestEvent::ANOTHER]),
        )
        .step(
            StepSpec::from_sync_fn("collect", |ctx: &Context<TestEvent>, ev| {
                let Some(events) = ctx.collect_events(ev, &[TestEvent::ONE, TestEvent::ANOTHER])
                else {
                    return Ok(None);
                };
                Ok(Some(TestEvent::Stop(StopEvent::from_serializable(&events)?)))
            })
            .accepts([TestEvent::ONE, TestEvent::ANOTHER])
            .produces([EventType::STOP])
            .optional_output(),
        )
        .build()
}
