//! Testing utilities for eventflow workflows.
//!
//! This module provides:
//! - A ready-made event enum and small fixture workflows
//! - Mock steps that record, fail or stall

mod fixtures;
mod mocks;

pub use fixtures::{collect_pair_workflow, linear_workflow, TestEvent};
pub use mocks::{FlakyStep, RecordingStep, SlowStep};
