//! The workflow engine: step workers, event dispatch and run supervision.

use super::retry::with_retry;
use super::session::StepRoute;
use super::{
    ServiceManager, Session, StepSpec, SteppedRun, WorkflowBuilder, WorkflowHandle, WorkflowService,
};
use crate::config::WorkflowConfig;
use crate::context::Context;
use crate::errors::{
    EventflowError, WorkflowRuntimeError, WorkflowTimeoutError, WorkflowValidationError,
};
use crate::events::{Event, EventType, StartEvent};
use crate::observability::{run_event_payload, RunEventSink};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

struct WorkflowInner<E: Event> {
    name: String,
    steps: Vec<Arc<StepSpec<E>>>,
    config: WorkflowConfig,
    services: Arc<ServiceManager>,
    sink: Arc<dyn RunEventSink>,
}

/// A validated set of steps that can be run any number of times, also
/// concurrently.
///
/// Cloning is cheap; clones share steps, configuration and services.
pub struct Workflow<E: Event> {
    inner: Arc<WorkflowInner<E>>,
}

impl<E: Event> Clone for Workflow<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Event> std::fmt::Debug for Workflow<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.inner.name)
            .field(
                "steps",
                &self.inner.steps.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            )
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

type WorkerSet = JoinSet<Result<(), WorkflowRuntimeError>>;

impl<E: Event> Workflow<E> {
    /// Starts building a workflow.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder<E> {
        WorkflowBuilder::new(name)
    }

    pub(crate) fn from_parts(
        name: String,
        steps: Vec<StepSpec<E>>,
        config: WorkflowConfig,
        sink: Arc<dyn RunEventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(WorkflowInner {
                name,
                steps: steps.into_iter().map(Arc::new).collect(),
                config,
                services: Arc::new(ServiceManager::new()),
                sink,
            }),
        }
    }

    /// Returns the workflow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the step specifications, in declaration order.
    #[must_use]
    pub fn steps(&self) -> &[Arc<StepSpec<E>>] {
        &self.inner.steps
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &WorkflowConfig {
        &self.inner.config
    }

    /// Returns the services registry.
    #[must_use]
    pub fn services(&self) -> &ServiceManager {
        &self.inner.services
    }

    /// Registers a service the steps can call.
    pub fn add_service(&self, name: impl Into<String>, service: Arc<dyn WorkflowService>) {
        self.inner.services.add(name, service);
    }

    /// Checks that the steps form a runnable workflow.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowValidationError`] when a step declares no produced
    /// events, no step produces the stop event, an event is consumed but never
    /// produced (or the reverse), or a required service is missing.
    pub fn validate(&self) -> Result<(), WorkflowValidationError> {
        let steps = &self.inner.steps;

        let silent: Vec<String> = steps
            .iter()
            .filter(|s| s.produced_events.is_empty())
            .map(|s| s.name.clone())
            .collect();
        if !silent.is_empty() {
            return Err(WorkflowValidationError::listing(
                "The following steps do not declare any produced event",
                silent,
            ));
        }

        let mut produced: BTreeSet<EventType> = BTreeSet::from([EventType::START]);
        produced.extend(steps.iter().flat_map(|s| s.produced_events.iter().copied()));
        let consumed: BTreeSet<EventType> = steps
            .iter()
            .flat_map(|s| s.accepted_events.iter().copied())
            .collect();

        if !produced.contains(&EventType::STOP) {
            return Err(WorkflowValidationError::new(
                "At least one step must produce a StopEvent",
            ));
        }

        let never_produced = names(consumed.difference(&produced));
        if !never_produced.is_empty() {
            return Err(WorkflowValidationError::listing(
                "The following events are consumed but never produced",
                never_produced,
            ));
        }

        let never_consumed =
            names(produced.difference(&consumed).filter(|t| **t != EventType::STOP));
        if !never_consumed.is_empty() {
            return Err(WorkflowValidationError::listing(
                "The following events are produced but never consumed",
                never_consumed,
            ));
        }

        let missing: BTreeSet<&str> = steps
            .iter()
            .flat_map(|s| s.required_services.iter())
            .filter(|name| !self.inner.services.contains(name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(WorkflowValidationError::listing(
                "The following services are not available",
                missing.into_iter().map(str::to_string).collect(),
            ));
        }

        Ok(())
    }

    /// Runs the workflow to completion and returns the stop event's result.
    ///
    /// # Errors
    ///
    /// - [`EventflowError::Validation`] if validation is enabled and fails
    /// - [`EventflowError::Runtime`] if a step fails
    /// - [`EventflowError::Timeout`] if the run exceeds the configured timeout
    pub async fn run(&self, start: StartEvent) -> Result<Value, EventflowError> {
        let session = self.new_session();
        self.run_session(session, start).await
    }

    /// Starts a run on a background task and returns a handle streaming the
    /// events its steps write with
    /// [`Context::write_event_to_stream`](crate::context::Context::write_event_to_stream).
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn run_streaming(&self, start: StartEvent) -> WorkflowHandle<E> {
        let session = self.new_session();
        let events = session.open_stream();
        let workflow = self.clone();
        let run_session = session.clone();
        let task = tokio::spawn(async move { workflow.run_session(run_session, start).await });
        WorkflowHandle::new(session, events, task)
    }

    fn new_session(&self) -> Session<E> {
        let routes = self
            .inner
            .steps
            .iter()
            .map(|s| StepRoute {
                name: s.name.clone(),
                accepts: s.accepted_events.clone(),
            })
            .collect();
        Session::new(routes, Arc::clone(&self.inner.services))
    }

    async fn run_session(&self, session: Session<E>, start: StartEvent) -> Result<Value, EventflowError> {
        let run_id = session.id();
        let span = info_span!("workflow_run", workflow = %self.inner.name, run_id = %run_id);

        async move {
            let started = Instant::now();
            let outcome = self.execute(&session, start).await;
            session.close();

            let duration_ms = elapsed_ms(started);
            match &outcome {
                Ok(result) => {
                    debug!(duration_ms, "Workflow completed");
                    self.emit(
                        run_id,
                        "workflow.completed",
                        json!({"workflow": self.inner.name, "duration_ms": duration_ms, "result": result}),
                    );
                }
                Err(e) => {
                    warn!(duration_ms, error = %e, "Workflow failed");
                    self.emit(
                        run_id,
                        "workflow.failed",
                        json!({"workflow": self.inner.name, "duration_ms": duration_ms, "error": e.to_string()}),
                    );
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, session: &Session<E>, start: StartEvent) -> Result<Value, EventflowError> {
        if !self.inner.config.disable_validation {
            self.validate()?;
        }
        self.emit(session.id(), "workflow.started", json!({"workflow": self.inner.name}));

        let mut workers = WorkerSet::new();
        for spec in &self.inner.steps {
            let queue = Arc::new(AsyncMutex::new(session.open_queue(&spec.name)));
            for worker_id in 0..spec.num_workers {
                let worker = self.worker(session, spec, Arc::clone(&queue));
                workers.spawn(worker.run(worker_id).in_current_span());
            }
        }

        let outcome = match session.send_event(E::from_start(start), None) {
            Ok(()) => self.supervise(session, &mut workers).await,
            Err(e) => Err(e.into()),
        };
        workers.shutdown().await;
        outcome
    }

    async fn supervise(&self, session: &Session<E>, workers: &mut WorkerSet) -> Result<Value, EventflowError> {
        match self.inner.config.timeout() {
            Some(limit) => tokio::time::timeout(limit, drive(session, workers))
                .await
                .unwrap_or_else(|_| Err(WorkflowTimeoutError::new(limit).into())),
            None => drive(session, workers).await,
        }
    }

    /// Starts a run driven one round at a time with
    /// [`SteppedRun::run_step`].
    ///
    /// Each step gets a single worker; `num_workers` and the run timeout do
    /// not apply.
    ///
    /// # Errors
    ///
    /// Returns [`EventflowError::Validation`] if validation is enabled and
    /// fails.
    pub fn start(&self, start: StartEvent) -> Result<SteppedRun<E>, EventflowError> {
        if !self.inner.config.disable_validation {
            self.validate()?;
        }
        let session = self.new_session();
        self.emit(
            session.id(),
            "workflow.started",
            json!({"workflow": self.inner.name, "stepped": true}),
        );

        let workers = self
            .inner
            .steps
            .iter()
            .map(|spec| {
                let queue = Arc::new(AsyncMutex::new(session.open_queue(&spec.name)));
                self.worker(&session, spec, queue)
            })
            .collect();
        session.send_event(E::from_start(start), None)?;

        Ok(SteppedRun::new(
            self.inner.name.clone(),
            session,
            workers,
            Arc::clone(&self.inner.sink),
        ))
    }

    fn worker(&self, session: &Session<E>, spec: &Arc<StepSpec<E>>, queue: StepQueue<E>) -> StepWorker<E> {
        StepWorker {
            spec: Arc::clone(spec),
            session: session.clone(),
            queue,
            sink: Arc::clone(&self.inner.sink),
            verbose: self.inner.config.verbose,
        }
    }

    fn emit(&self, run_id: Uuid, event_type: &str, fields: Value) {
        self.inner
            .sink
            .try_emit(event_type, Some(run_event_payload(run_id, fields)));
    }
}

/// Waits for the stop event, failing as soon as a worker fails.
async fn drive<E: Event>(session: &Session<E>, workers: &mut WorkerSet) -> Result<Value, EventflowError> {
    loop {
        tokio::select! {
            biased;
            () = session.finished() => return Ok(session.result().unwrap_or(Value::Null)),
            joined = workers.join_next() => match joined {
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => return Err(e.into()),
                Some(Err(e)) if e.is_panic() => {
                    return Err(EventflowError::Internal(format!("A step worker panicked: {e}")));
                }
                Some(Err(_)) => {}
                None => {
                    return Err(WorkflowRuntimeError::new(
                        "Every step worker exited before a stop event was produced",
                    )
                    .into());
                }
            },
        }
    }
}

fn names<'a>(types: impl Iterator<Item = &'a EventType>) -> Vec<String> {
    types.map(|t| t.name().to_string()).collect()
}

pub(super) fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

type StepQueue<E> = Arc<AsyncMutex<mpsc::UnboundedReceiver<E>>>;

pub(super) struct StepWorker<E: Event> {
    pub(super) spec: Arc<StepSpec<E>>,
    session: Session<E>,
    pub(super) queue: StepQueue<E>,
    sink: Arc<dyn RunEventSink>,
    verbose: bool,
}

impl<E: Event> StepWorker<E> {
    async fn run(self, worker_id: usize) -> Result<(), WorkflowRuntimeError> {
        let ctx = self.session.get_context(&self.spec.name);
        debug!(step = %self.spec.name, worker_id, "Step worker started");

        loop {
            let next = self.queue.lock().await.recv().await;
            let Some(event) = next else {
                debug!(step = %self.spec.name, worker_id, "Step queue closed");
                return Ok(());
            };
            self.handle(&ctx, event).await?;
        }
    }

    pub(super) async fn handle(&self, ctx: &Context<E>, event: E) -> Result<(), WorkflowRuntimeError> {
        let spec = &self.spec;
        let event_type = event.event_type();
        self.session.record_accepted(&spec.name, event_type);
        self.emit(
            "step.started",
            json!({"step": spec.name, "event_type": event_type}),
        );

        let started = Instant::now();
        let outcome = match &spec.retry {
            Some(retry) => {
                let runner = &spec.runner;
                with_retry(retry, &spec.name, move |_| runner.execute(ctx, event.clone())).await
            }
            None => spec.runner.execute(ctx, event).await,
        };
        let duration_ms = elapsed_ms(started);

        match outcome {
            Ok(Some(next)) => {
                let produced = next.event_type();
                if !spec.produced_events.contains(&produced) {
                    warn!(step = %spec.name, event_type = %produced, "Step returned an undeclared event type");
                }
                if self.verbose {
                    info!(step = %spec.name, produced = %produced, duration_ms, "Step produced event");
                }
                self.emit(
                    "step.completed",
                    json!({"step": spec.name, "produced": produced, "duration_ms": duration_ms}),
                );
                self.session.send_event(next, None)
            }
            Ok(None) => {
                if self.verbose {
                    info!(step = %spec.name, duration_ms, "Step produced no event");
                } else if !spec.optional_output {
                    debug!(step = %spec.name, "Step produced no event");
                }
                self.emit(
                    "step.completed",
                    json!({"step": spec.name, "produced": Value::Null, "duration_ms": duration_ms}),
                );
                Ok(())
            }
            Err(e) => {
                error!(step = %spec.name, error = %e, "Step failed");
                self.emit(
                    "step.failed",
                    json!({"step": spec.name, "error": format!("{e:#}"), "duration_ms": duration_ms}),
                );
                Err(WorkflowRuntimeError::step_failed(&spec.name, &e))
            }
        }
    }

    fn emit(&self, event_type: &str, fields: Value) {
        self.sink
            .try_emit(event_type, Some(run_event_payload(self.session.id(), fields)));
    }
}

#[async_trait]
impl<E: Event> WorkflowService for Workflow<E> {
    async fn run_service(&self, start: StartEvent) -> Result<Value, EventflowError> {
        self.run(start).await
    }
}
