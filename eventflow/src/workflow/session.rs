//! Per-run session: event routing, step contexts and the run result.

use super::ServiceManager;
use crate::context::{Context, GlobalStore};
use crate::errors::WorkflowRuntimeError;
use crate::events::{Event, EventType};
use crate::utils::generate_uuid;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

/// Routing entry of one step.
#[derive(Debug, Clone)]
pub(crate) struct StepRoute {
    pub(crate) name: String,
    pub(crate) accepts: Vec<EventType>,
}

pub(crate) struct SessionInner<E: Event> {
    id: Uuid,
    store: Arc<GlobalStore>,
    routes: Vec<StepRoute>,
    services: Arc<ServiceManager>,
    queues: RwLock<HashMap<String, mpsc::UnboundedSender<E>>>,
    broker_log: Mutex<Vec<E>>,
    accepted_events: Mutex<Vec<(String, EventType)>>,
    step_contexts: DashMap<String, Context<E>>,
    root_context: Context<E>,
    result: Mutex<Option<Value>>,
    finished: AtomicBool,
    done: Notify,
    stream: Mutex<Option<mpsc::UnboundedSender<E>>>,
}

/// The state of one workflow run.
///
/// A session owns the run's global partition and root context, routes events
/// between steps, and records what happened. Cloning is cheap and yields a
/// handle to the same session.
pub struct Session<E: Event> {
    inner: Arc<SessionInner<E>>,
}

impl<E: Event> Clone for Session<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Event> fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("steps", &self.inner.routes.len())
            .field("finished", &self.is_done())
            .finish_non_exhaustive()
    }
}

impl<E: Event> Session<E> {
    pub(crate) fn new(routes: Vec<StepRoute>, services: Arc<ServiceManager>) -> Self {
        let store = Arc::new(GlobalStore::new());
        let inner = Arc::new_cyclic(|weak| SessionInner {
            id: generate_uuid(),
            root_context: Context::attach(Arc::clone(&store), weak.clone()),
            store,
            routes,
            services,
            queues: RwLock::new(HashMap::new()),
            broker_log: Mutex::new(Vec::new()),
            accepted_events: Mutex::new(Vec::new()),
            step_contexts: DashMap::new(),
            result: Mutex::new(None),
            finished: AtomicBool::new(false),
            done: Notify::new(),
            stream: Mutex::new(None),
        });
        Self { inner }
    }

    /// Creates a session with no steps, for using contexts outside a run.
    #[must_use]
    pub fn standalone() -> Self {
        Self::new(Vec::new(), Arc::new(ServiceManager::new()))
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner<E>> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<SessionInner<E>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Returns the session id, which is also the run id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns the global partition of the run.
    #[must_use]
    pub fn store(&self) -> &Arc<GlobalStore> {
        &self.inner.store
    }

    /// Returns the services available to the run's steps.
    #[must_use]
    pub fn services(&self) -> &ServiceManager {
        &self.inner.services
    }

    /// Returns the root context of the run.
    #[must_use]
    pub fn root_context(&self) -> Context<E> {
        self.inner.root_context.clone()
    }

    /// Returns the context of `step`, creating it as a child of the root
    /// context on first use. The same context is returned for the whole run.
    #[must_use]
    pub fn get_context(&self, step: &str) -> Context<E> {
        self.inner
            .step_contexts
            .entry(step.to_string())
            .or_insert_with(|| self.inner.root_context.child())
            .clone()
    }

    /// Sends an event.
    ///
    /// With `step` set to `None` the event goes to every step accepting its
    /// type, and a stop event finishes the run. With a step name it goes to
    /// that step only.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowRuntimeError`] when the named step does not exist or
    /// does not accept the event's type.
    pub fn send_event(&self, event: E, step: Option<&str>) -> Result<(), WorkflowRuntimeError> {
        let event_type = event.event_type();

        if let Some(name) = step {
            let route = self
                .route(name)
                .ok_or_else(|| WorkflowRuntimeError::unknown_step(name))?;
            if !route.accepts.contains(&event_type) {
                return Err(WorkflowRuntimeError::rejected_event(name, event_type.name()));
            }
            self.inner.broker_log.lock().push(event.clone());
            self.enqueue(name, event);
            return Ok(());
        }

        self.inner.broker_log.lock().push(event.clone());

        if event.is_stop() {
            self.stop(event);
            return Ok(());
        }

        let targets: Vec<&str> = self
            .inner
            .routes
            .iter()
            .filter(|r| r.accepts.contains(&event_type))
            .map(|r| r.name.as_str())
            .collect();
        if targets.is_empty() {
            debug!(event_type = %event_type, "No step accepts event, dropping");
        }
        for name in targets {
            self.enqueue(name, event.clone());
        }
        Ok(())
    }

    fn route(&self, name: &str) -> Option<&StepRoute> {
        self.inner.routes.iter().find(|r| r.name == name)
    }

    fn enqueue(&self, step: &str, event: E) {
        let queues = self.inner.queues.read();
        match queues.get(step) {
            Some(tx) => {
                debug!(step = %step, event_type = %event.event_type(), "Dispatching event");
                if tx.send(event).is_err() {
                    debug!(step = %step, "Step queue closed, dropping event");
                }
            }
            None => debug!(step = %step, "Step has no open queue, dropping event"),
        }
    }

    fn stop(&self, event: E) {
        let streamed = event.clone();
        match event.into_stop() {
            Ok(stop) => {
                self.write_event_to_stream(streamed);
                self.finish(stop.result);
            }
            Err(event) => {
                warn!(event_type = %event.event_type(), "Event reports the stop type but is not a stop event");
            }
        }
    }

    pub(crate) fn finish(&self, result: Value) {
        let mut slot = self.inner.result.lock();
        if slot.is_none() {
            *slot = Some(result);
        }
        drop(slot);
        self.inner.finished.store(true, Ordering::SeqCst);
        self.inner.done.notify_one();
    }

    pub(crate) async fn finished(&self) {
        while !self.is_done() {
            self.inner.done.notified().await;
        }
    }

    /// Returns true once a stop event has been sent.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.inner.finished.load(Ordering::SeqCst)
    }

    /// Returns the run result, once the run has finished.
    #[must_use]
    pub fn result(&self) -> Option<Value> {
        self.inner.result.lock().clone()
    }

    /// Returns every event sent through the session, in send order.
    #[must_use]
    pub fn broker_log(&self) -> Vec<E> {
        self.inner.broker_log.lock().clone()
    }

    /// Returns the `(step, event type)` pairs of every event a step received.
    #[must_use]
    pub fn accepted_events(&self) -> Vec<(String, EventType)> {
        self.inner.accepted_events.lock().clone()
    }

    pub(crate) fn record_accepted(&self, step: &str, event_type: EventType) {
        self.inner
            .accepted_events
            .lock()
            .push((step.to_string(), event_type));
    }

    /// Forwards `event` to the caller streaming this run.
    ///
    /// Without a streaming caller the event is dropped.
    pub fn write_event_to_stream(&self, event: E) {
        let stream = self.inner.stream.lock();
        match stream.as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    warn!(run_id = %self.inner.id, "Stream receiver dropped, discarding event");
                }
            }
            None => debug!(run_id = %self.inner.id, "Run is not streamed, discarding event"),
        }
    }

    pub(crate) fn open_queue(&self, step: &str) -> mpsc::UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.queues.write().insert(step.to_string(), tx);
        rx
    }

    pub(crate) fn open_stream(&self) -> mpsc::UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.stream.lock() = Some(tx);
        rx
    }

    /// Closes every step queue and the event stream.
    pub(crate) fn close(&self) {
        self.inner.queues.write().clear();
        self.inner.stream.lock().take();
    }
}
