//! Context management for workflow runs.
//!
//! This module provides:
//! - The session-wide global partition and per-context private partitions
//! - Execution contexts linked in a parent/child hierarchy
//! - The event-collection barrier steps use to wait for several events

mod collector;
#[cfg(test)]
mod context_tests;
mod execution;
mod store;

pub use collector::{BufferKey, EventCollector};
pub use execution::{Context, LegacyData};
pub use store::{GlobalStore, PrivateStore};
