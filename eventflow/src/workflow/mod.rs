//! Workflow definition and execution.
//!
//! This module provides:
//! - Step specifications and the workflow builder
//! - The engine running steps as concurrent workers
//! - Per-run sessions routing events between steps
//! - Services, streaming handles and step retries
//! - Manually stepped runs

mod builder;
mod engine;
mod handle;
mod retry;
mod service;
mod session;
mod spec;
mod stepped;

pub use builder::WorkflowBuilder;
pub use engine::Workflow;
pub use handle::WorkflowHandle;
pub use retry::{with_retry, BackoffStrategy, JitterStrategy, RetryConfig};
pub use service::{ServiceManager, WorkflowService};
pub use session::Session;
pub(crate) use session::SessionInner;
pub use spec::StepSpec;
pub use stepped::SteppedRun;
