//! Services: named collaborators a step can call during a run.

use crate::errors::{EventflowError, ServiceNotFoundError};
use crate::events::StartEvent;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// A service callable from inside a step.
///
/// Every [`Workflow`](super::Workflow) is a service, so one workflow can run
/// another and use its result.
#[async_trait]
pub trait WorkflowService: Send + Sync + Debug {
    /// Runs the service to completion.
    async fn run_service(&self, start: StartEvent) -> Result<Value, EventflowError>;
}

/// Registry of the services available to a workflow's steps.
#[derive(Debug, Default)]
pub struct ServiceManager {
    services: RwLock<HashMap<String, Arc<dyn WorkflowService>>>,
}

impl ServiceManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` under `name`, replacing any previous one.
    pub fn add(&self, name: impl Into<String>, service: Arc<dyn WorkflowService>) {
        self.services.write().insert(name.into(), service);
    }

    /// Looks up a service.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceNotFoundError`] for an unknown name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn WorkflowService>, ServiceNotFoundError> {
        self.services
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceNotFoundError::new(name))
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }

    /// Returns the registered names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.services.read().keys().cloned().collect()
    }
}
