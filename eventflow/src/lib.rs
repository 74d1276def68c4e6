//! # Eventflow
//!
//! An event-driven workflow engine.
//!
//! A workflow is a set of steps. Each step declares the event types it
//! accepts and produces; the engine routes every event a step returns to the
//! steps accepting its type until some step produces the stop event, whose
//! payload becomes the run result.
//!
//! - **Scoped context store**: a run-wide global partition plus per-context
//!   private keys that are unique along the context chain
//! - **Event collection**: steps can wait until a set of event types has
//!   arrived before acting
//! - **Concurrent workers**: a step may run several invocations at once
//! - **Observability**: `tracing` spans and logs plus pluggable run event sinks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eventflow::prelude::*;
//! use eventflow::testing::TestEvent;
//!
//! # async fn demo() -> Result<(), EventflowError> {
//! let workflow = Workflow::builder("hello")
//!     .step(
//!         StepSpec::from_sync_fn("greet", |_ctx: &Context<TestEvent>, _ev| {
//!             Ok(Some(TestEvent::stop("hello")))
//!         })
//!         .accepts([EventType::START])
//!         .produces([EventType::STOP]),
//!     )
//!     .build()?;
//!
//! let result = workflow.run(StartEvent::new()).await?;
//! assert_eq!(result, "hello");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod observability;
pub mod steps;
pub mod testing;
pub mod utils;
pub mod workflow;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::WorkflowConfig;
    pub use crate::context::{
        BufferKey, Context, EventCollector, GlobalStore, LegacyData, PrivateStore,
    };
    pub use crate::errors::{
        ConfigurationError, ContextError, DuplicateKeyError, EventflowError, KeyNotFoundError,
        PrivacyViolationError, ServiceNotFoundError, WorkflowRuntimeError, WorkflowTimeoutError,
        WorkflowValidationError,
    };
    pub use crate::events::{Event, EventType, StartEvent, StopEvent};
    pub use crate::observability::{
        CollectingEventSink, LoggingEventSink, NoOpEventSink, RunEventSink,
    };
    pub use crate::steps::{FnStep, Step, SyncFnStep};
    pub use crate::utils::{generate_uuid, iso_timestamp};
    pub use crate::workflow::{
        RetryConfig, Session, StepSpec, SteppedRun, Workflow, WorkflowBuilder, WorkflowHandle,
        WorkflowService,
    };
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use crate::testing::TestEvent;

    #[test]
    fn test_prelude_names_store_errors() {
        let err: ConfigurationError = Context::<TestEvent>::new(None, None).unwrap_err();
        assert!(!err.to_string().is_empty());

        let session = Session::<TestEvent>::standalone();
        let parent = Context::from_session(&session);
        let child = parent.child();
        parent.set_private("secret", 1).unwrap();

        let violation: Option<PrivacyViolationError> = match child.get("secret") {
            Err(ContextError::PrivacyViolation(e)) => Some(e),
            _ => None,
        };
        assert_eq!(violation.map(|e| e.owner), Some(parent.id()));

        let missing: Option<KeyNotFoundError> = match child.get("absent") {
            Err(ContextError::KeyNotFound(e)) => Some(e),
            _ => None,
        };
        assert_eq!(missing, Some(KeyNotFoundError::new("absent")));
    }
}
