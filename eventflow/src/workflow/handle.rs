//! Handle to a streamed run.

use super::Session;
use crate::errors::EventflowError;
use crate::events::Event;
use futures::stream::{self, Stream};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A run started with [`Workflow::run_streaming`](super::Workflow::run_streaming).
///
/// Events written to the stream are delivered in order; the stop event is
/// delivered last, after which the stream ends.
#[derive(Debug)]
pub struct WorkflowHandle<E: Event> {
    session: Session<E>,
    events: mpsc::UnboundedReceiver<E>,
    task: JoinHandle<Result<Value, EventflowError>>,
}

impl<E: Event> WorkflowHandle<E> {
    pub(crate) fn new(
        session: Session<E>,
        events: mpsc::UnboundedReceiver<E>,
        task: JoinHandle<Result<Value, EventflowError>>,
    ) -> Self {
        Self {
            session,
            events,
            task,
        }
    }

    /// Returns the session of the run.
    #[must_use]
    pub fn session(&self) -> &Session<E> {
        &self.session
    }

    /// Waits for the next streamed event; `None` once the run has ended and
    /// every event was delivered.
    pub async fn next_event(&mut self) -> Option<E> {
        self.events.recv().await
    }

    /// Returns the streamed events as a [`Stream`].
    pub fn stream_events(&mut self) -> impl Stream<Item = E> + '_ {
        stream::unfold(&mut self.events, |events| async move {
            events.recv().await.map(|event| (event, events))
        })
    }

    /// Returns true once the run task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the run.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Waits for the run to end and returns its result.
    ///
    /// # Errors
    ///
    /// Returns the run's error, or [`EventflowError::Internal`] if the run
    /// task was cancelled or panicked.
    pub async fn result(self) -> Result<Value, EventflowError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(EventflowError::Internal(format!("Workflow task failed: {e}"))),
        }
    }
}
