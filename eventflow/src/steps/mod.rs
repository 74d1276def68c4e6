//! Step trait and implementations.
//!
//! Steps are the units of work of a workflow: each one receives an event it
//! accepts and may answer with one event.

use crate::context::Context;
use crate::events::Event;
use async_trait::async_trait;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

/// Trait for workflow steps.
#[async_trait]
pub trait Step<E: Event>: Send + Sync + Debug {
    /// Returns the name of the step.
    fn name(&self) -> &str;

    /// Executes the step.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The step's context; the same one for every invocation in a run
    /// * `event` - The dispatched event
    ///
    /// # Returns
    ///
    /// The event to send next, or `None` when the step has nothing to emit
    /// yet (for example while collecting events).
    async fn execute(&self, ctx: &Context<E>, event: E) -> anyhow::Result<Option<E>>;
}

/// An async function-based step.
pub struct FnStep<E, F, Fut>
where
    E: Event,
    F: Fn(Context<E>, E) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<E>>> + Send,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn(E) -> Fut>,
}

impl<E, F, Fut> FnStep<E, F, Fut>
where
    E: Event,
    F: Fn(Context<E>, E) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<E>>> + Send,
{
    /// Creates a new async function-based step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<E, F, Fut> Debug for FnStep<E, F, Fut>
where
    E: Event,
    F: Fn(Context<E>, E) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<E>>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<E, F, Fut> Step<E> for FnStep<E, F, Fut>
where
    E: Event,
    F: Fn(Context<E>, E) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<E>>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &Context<E>, event: E) -> anyhow::Result<Option<E>> {
        (self.func)(ctx.clone(), event).await
    }
}

/// A synchronous function-based step.
///
/// The body runs inline on the worker task, so it should not block for long.
pub struct SyncFnStep<E, F>
where
    E: Event,
    F: Fn(&Context<E>, E) -> anyhow::Result<Option<E>> + Send + Sync,
{
    name: String,
    func: F,
    _phantom: PhantomData<fn(E)>,
}

impl<E, F> SyncFnStep<E, F>
where
    E: Event,
    F: Fn(&Context<E>, E) -> anyhow::Result<Option<E>> + Send + Sync,
{
    /// Creates a new synchronous function-based step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _phantom: PhantomData,
        }
    }
}

impl<E, F> Debug for SyncFnStep<E, F>
where
    E: Event,
    F: Fn(&Context<E>, E) -> anyhow::Result<Option<E>> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncFnStep").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<E, F> Step<E> for SyncFnStep<E, F>
where
    E: Event,
    F: Fn(&Context<E>, E) -> anyhow::Result<Option<E>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &Context<E>, event: E) -> anyhow::Result<Option<E>> {
        (self.func)(ctx, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StopEvent;
    use crate::testing::TestEvent;
    use crate::workflow::Session;

    fn test_context() -> (Session<TestEvent>, Context<TestEvent>) {
        let session = Session::standalone();
        let ctx = Context::from_session(&session);
        (session, ctx)
    }

    #[tokio::test]
    async fn test_fn_step() {
        let step = FnStep::new("echo", |ctx: Context<TestEvent>, ev: TestEvent| async move {
            ctx.set("seen", ev.event_type().name());
            anyhow::Ok(Some(TestEvent::Stop(StopEvent::new("done"))))
        });
        assert_eq!(step.name(), "echo");

        let (_session, ctx) = test_context();
        let out = step.execute(&ctx, TestEvent::Last).await.unwrap();

        assert_eq!(out, Some(TestEvent::Stop(StopEvent::new("done"))));
        assert_eq!(ctx.get("seen").unwrap(), "LastEvent");
    }

    #[tokio::test]
    async fn test_sync_fn_step() {
        let step = SyncFnStep::new("sync", |_ctx: &Context<TestEvent>, _ev: TestEvent| Ok(None));
        assert_eq!(step.name(), "sync");

        let (_session, ctx) = test_context();
        assert_eq!(step.execute(&ctx, TestEvent::Last).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_step_errors_propagate() {
        let step = SyncFnStep::new("boom", |_ctx: &Context<TestEvent>, _ev: TestEvent| {
            anyhow::bail!("exploded")
        });

        let (_session, ctx) = test_context();
        let err = step.execute(&ctx, TestEvent::Last).await.unwrap_err();
        assert_eq!(err.to_string(), "exploded");
    }
}
