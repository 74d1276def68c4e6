//! Mock steps for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::context::Context;
use crate::events::Event;
use crate::steps::Step;

/// A step that records every event it receives and answers with a fixed
/// output.
#[derive(Debug)]
pub struct RecordingStep<E: Event> {
    name: String,
    output: Mutex<Option<E>>,
    received: Mutex<Vec<E>>,
}

impl<E: Event> RecordingStep<E> {
    /// Creates a recording step that returns nothing.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: Mutex::new(None),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Sets the event returned by every invocation.
    #[must_use]
    pub fn with_output(self, output: E) -> Self {
        *self.output.lock() = Some(output);
        self
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.received.lock().len()
    }

    /// Returns the received events, in order.
    #[must_use]
    pub fn received(&self) -> Vec<E> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl<E: Event> Step<E> for RecordingStep<E> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &Context<E>, event: E) -> anyhow::Result<Option<E>> {
        self.received.lock().push(event);
        Ok(self.output.lock().clone())
    }
}

/// A step that fails a fixed number of times before succeeding.
#[derive(Debug)]
pub struct FlakyStep<E: Event> {
    name: String,
    failures: usize,
    attempts: AtomicUsize,
    output: E,
}

impl<E: Event> FlakyStep<E> {
    /// Creates a step failing `failures` times, then returning `output`.
    #[must_use]
    pub fn new(name: impl Into<String>, failures: usize, output: E) -> Self {
        Self {
            name: name.into(),
            failures,
            attempts: AtomicUsize::new(0),
            output,
        }
    }

    /// Returns the number of invocations so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<E: Event> Step<E> for FlakyStep<E> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &Context<E>, _event: E) -> anyhow::Result<Option<E>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            anyhow::bail!("transient failure {}", attempt + 1);
        }
        Ok(Some(self.output.clone()))
    }
}

/// A step that sleeps before answering.
#[derive(Debug)]
pub struct SlowStep<E: Event> {
    name: String,
    delay: Duration,
    output: E,
}

impl<E: Event> SlowStep<E> {
    /// Creates a step sleeping `delay`, then returning `output`.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration, output: E) -> Self {
        Self {
            name: name.into(),
            delay,
            output,
        }
    }
}

#[async_trait]
impl<E: Event> Step<E> for SlowStep<E> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &Context<E>, _event: E) -> anyhow::Result<Option<E>> {
        tokio::time::sleep(self.delay).await;
        Ok(Some(self.output.clone()))
    }
}
