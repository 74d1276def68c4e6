//! Manually driven runs.

use super::engine::{elapsed_ms, StepWorker};
use super::Session;
use crate::errors::{EventflowError, WorkflowRuntimeError};
use crate::events::Event;
use crate::observability::{run_event_payload, RunEventSink};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// A run advanced one round per [`run_step`](Self::run_step) call.
///
/// Created by [`Workflow::start`](super::Workflow::start). A round hands each
/// step at most one of the events queued for it when the round begins; events
/// produced during the round wait for the next one. After the round in which
/// a step produces the stop event, one more call returns the result and marks
/// the run done.
pub struct SteppedRun<E: Event> {
    name: String,
    session: Session<E>,
    workers: Vec<StepWorker<E>>,
    sink: Arc<dyn RunEventSink>,
    started: Instant,
    done: bool,
}

impl<E: Event> fmt::Debug for SteppedRun<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SteppedRun")
            .field("workflow", &self.name)
            .field("session", &self.session)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl<E: Event> SteppedRun<E> {
    pub(super) fn new(
        name: String,
        session: Session<E>,
        workers: Vec<StepWorker<E>>,
        sink: Arc<dyn RunEventSink>,
    ) -> Self {
        Self {
            name,
            session,
            workers,
            sink,
            started: Instant::now(),
            done: false,
        }
    }

    /// Returns the session of the run.
    #[must_use]
    pub fn session(&self) -> &Session<E> {
        &self.session
    }

    /// Returns true once the result has been returned or the run failed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Runs one round.
    ///
    /// Returns `Ok(None)` while the run is in progress and `Ok(Some(result))`
    /// on the call after the stop event was produced.
    ///
    /// # Errors
    ///
    /// - [`EventflowError::Runtime`] if a step fails, no step has a pending
    ///   event, or the run is already done
    pub async fn run_step(&mut self) -> Result<Option<Value>, EventflowError> {
        if self.done {
            return Err(WorkflowRuntimeError::new("The run has already finished").into());
        }

        if self.session.is_done() {
            let result = self.session.result().unwrap_or(Value::Null);
            self.finish();
            self.emit(
                "workflow.completed",
                json!({
                    "workflow": self.name,
                    "duration_ms": elapsed_ms(self.started),
                    "result": result,
                }),
            );
            return Ok(Some(result));
        }

        let mut ready = Vec::new();
        for (index, worker) in self.workers.iter().enumerate() {
            if let Ok(event) = worker.queue.lock().await.try_recv() {
                ready.push((index, event));
            }
        }
        if ready.is_empty() {
            return Err(self.fail(WorkflowRuntimeError::new(
                "No step has a pending event and no stop event was produced",
            )));
        }
        debug!(workflow = %self.name, steps = ready.len(), "Running round");

        for (index, event) in ready {
            let worker = &self.workers[index];
            let ctx = self.session.get_context(&worker.spec.name);
            let outcome = worker.handle(&ctx, event).await;
            if let Err(e) = outcome {
                return Err(self.fail(e));
            }
        }
        Ok(None)
    }

    fn finish(&mut self) {
        self.done = true;
        self.session.close();
    }

    fn fail(&mut self, error: WorkflowRuntimeError) -> EventflowError {
        warn!(workflow = %self.name, error = %error, "Stepped run failed");
        self.finish();
        self.emit(
            "workflow.failed",
            json!({
                "workflow": self.name,
                "duration_ms": elapsed_ms(self.started),
                "error": error.to_string(),
            }),
        );
        error.into()
    }

    fn emit(&self, event_type: &str, fields: Value) {
        self.sink
            .try_emit(event_type, Some(run_event_payload(self.session.id(), fields)));
    }
}
