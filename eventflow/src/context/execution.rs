//! Execution contexts: scoped state and event collection for a run.

use super::{EventCollector, GlobalStore, PrivateStore};
use crate::errors::{
    ConfigurationError, ContextError, DuplicateKeyError, EventflowError, KeyNotFoundError,
    PrivacyViolationError, WorkflowRuntimeError,
};
use crate::events::{Event, EventType};
use crate::utils::generate_uuid;
use crate::workflow::{Session, SessionInner, WorkflowService};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use uuid::Uuid;

pub(crate) struct ContextInner<E: Event> {
    id: Uuid,
    store: Arc<GlobalStore>,
    private: PrivateStore,
    parent: Option<Weak<ContextInner<E>>>,
    children: Mutex<Vec<Weak<ContextInner<E>>>>,
    session: Weak<SessionInner<E>>,
    collector: EventCollector<E>,
}

/// Handle to the state of a run, or of one step within a run.
///
/// Every context of a session shares the session's global partition. Each
/// context additionally owns a private partition whose entries are visible
/// only through that exact context, and an [`EventCollector`].
///
/// Contexts form a tree: a child is created from a parent and inherits its
/// state root without copying any data. Parent links are weak, so a child
/// never keeps its parent alive.
pub struct Context<E: Event> {
    inner: Arc<ContextInner<E>>,
}

impl<E: Event> Clone for Context<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Event> fmt::Debug for Context<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("has_parent", &self.inner.parent.is_some())
            .field("private_keys", &self.inner.private.len())
            .finish_non_exhaustive()
    }
}

impl<E: Event> Context<E> {
    /// Creates a context attached to a session, a parent, or both.
    ///
    /// With a parent, the context inherits the parent's state root and is
    /// registered as its child. With only a session, it attaches to the
    /// session's global partition.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] when neither a session nor a parent is
    /// given, or when the parent belongs to a different session.
    pub fn new(
        session: Option<&Session<E>>,
        parent: Option<&Self>,
    ) -> Result<Self, ConfigurationError> {
        match (session, parent) {
            (None, None) => Err(ConfigurationError::missing_root()),
            (Some(session), None) => Ok(Self::from_session(session)),
            (None, Some(parent)) => Ok(parent.child()),
            (Some(session), Some(parent)) => {
                if !Arc::ptr_eq(session.store(), &parent.inner.store) {
                    return Err(ConfigurationError::new(
                        "The parent context belongs to a different session",
                    ));
                }
                Ok(parent.child())
            }
        }
    }

    /// Creates a parentless context on the session's global partition.
    #[must_use]
    pub fn from_session(session: &Session<E>) -> Self {
        Self::attach(Arc::clone(session.store()), session.downgrade())
    }

    /// Creates a child of this context.
    #[must_use]
    pub fn child(&self) -> Self {
        let parent = self;
        let inner = Arc::new(ContextInner {
            id: generate_uuid(),
            store: Arc::clone(&parent.inner.store),
            private: PrivateStore::new(),
            parent: Some(Arc::downgrade(&parent.inner)),
            children: Mutex::new(Vec::new()),
            session: parent.inner.session.clone(),
            collector: EventCollector::new(),
        });

        // Registration happens under the root lock so private-key checks
        // never observe a half-linked child.
        let root = inner.store.write();
        let mut children = parent.inner.children.lock();
        children.retain(|c| c.strong_count() > 0);
        children.push(Arc::downgrade(&inner));
        drop(children);
        drop(root);

        Self { inner }
    }

    pub(crate) fn attach(store: Arc<GlobalStore>, session: Weak<SessionInner<E>>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: generate_uuid(),
                store,
                private: PrivateStore::new(),
                parent: None,
                children: Mutex::new(Vec::new()),
                session,
                collector: EventCollector::new(),
            }),
        }
    }

    /// Returns the context id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Returns the parent context, if it is still alive.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Self { inner })
    }

    /// Returns true if both handles refer to the same context.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns the owning session.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowRuntimeError`] once the session has been dropped.
    pub fn session(&self) -> Result<Session<E>, WorkflowRuntimeError> {
        Session::upgrade(&self.inner.session)
            .ok_or_else(|| WorkflowRuntimeError::new("The session of this context has ended"))
    }

    /// Returns the global partition shared by the session.
    #[must_use]
    pub fn store(&self) -> &Arc<GlobalStore> {
        &self.inner.store
    }

    /// Returns the private partition of this context.
    #[must_use]
    pub fn private_store(&self) -> &PrivateStore {
        &self.inner.private
    }

    /// Writes a global value visible to every context of the session.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        debug!(context = %self.inner.id, key = %key, "Setting global value");
        self.inner.store.insert(key, value.into());
    }

    /// Writes a value visible only through this context.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateKeyError`] when `key` already exists globally or as
    /// a private entry anywhere along this context's ancestor or descendant
    /// chain. Nothing is written in that case.
    pub fn set_private(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), DuplicateKeyError> {
        let key = key.into();
        let globals = self.inner.store.write();

        if globals.contains_key(&key) || self.find_private_owner(&key).is_some() {
            debug!(context = %self.inner.id, key = %key, "Rejecting duplicate private key");
            return Err(DuplicateKeyError::new(key));
        }

        debug!(context = %self.inner.id, key = %key, "Setting private value");
        self.inner.private.insert(key, value.into());
        drop(globals);
        Ok(())
    }

    /// Writes a value, privately or globally.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateKeyError`] for a colliding private write.
    pub fn set_with(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
        private: bool,
    ) -> Result<(), DuplicateKeyError> {
        if private {
            self.set_private(key, value)
        } else {
            self.set(key, value);
            Ok(())
        }
    }

    /// Serializes `value` and writes it globally.
    ///
    /// # Errors
    ///
    /// Returns the serde error if `value` cannot be represented as JSON.
    pub fn set_serialized<T: Serialize>(
        &self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        self.set(key, serde_json::to_value(value)?);
        Ok(())
    }

    /// Reads a value.
    ///
    /// This context's private entry wins over a global one.
    ///
    /// # Errors
    ///
    /// - [`ContextError::PrivacyViolation`] when the key is private to
    ///   another context of the chain.
    /// - [`ContextError::KeyNotFound`] when the key does not exist.
    pub fn get(&self, key: &str) -> Result<Value, ContextError> {
        self.lookup(key)?
            .ok_or_else(|| KeyNotFoundError::new(key).into())
    }

    /// Reads a value, falling back to `default` when it does not exist.
    ///
    /// The default is returned as is and never stored.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::PrivacyViolation`] when the key is private to
    /// another context of the chain.
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Result<Value, ContextError> {
        Ok(self.lookup(key)?.unwrap_or_else(|| default.into()))
    }

    /// Reads a value and deserializes it.
    ///
    /// # Errors
    ///
    /// Fails like [`get`](Self::get), or with [`ContextError::InvalidValue`]
    /// when the stored value does not match `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, ContextError> {
        let value = self.get(key)?;
        serde_json::from_value(value).map_err(|e| ContextError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn lookup(&self, key: &str) -> Result<Option<Value>, ContextError> {
        let globals = self.inner.store.read();

        if let Some(value) = self.inner.private.get(key) {
            return Ok(Some(value));
        }
        if let Some(value) = globals.get(key) {
            return Ok(Some(value.clone()));
        }
        if let Some(owner) = self.find_private_owner(key) {
            return Err(PrivacyViolationError::new(key, owner).into());
        }
        Ok(None)
    }

    // Callers hold the root lock.
    fn find_private_owner(&self, key: &str) -> Option<Uuid> {
        if self.inner.private.contains_key(key) {
            return Some(self.inner.id);
        }

        let mut ancestor = self.inner.parent.as_ref().and_then(Weak::upgrade);
        while let Some(node) = ancestor {
            if node.private.contains_key(key) {
                return Some(node.id);
            }
            ancestor = node.parent.as_ref().and_then(Weak::upgrade);
        }

        Self::find_in_descendants(&self.inner, key)
    }

    fn find_in_descendants(node: &ContextInner<E>, key: &str) -> Option<Uuid> {
        let children: Vec<_> = node
            .children
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        children.iter().find_map(|child| {
            if child.private.contains_key(key) {
                Some(child.id)
            } else {
                Self::find_in_descendants(child, key)
            }
        })
    }

    /// Returns an index-style view over the global partition.
    ///
    /// The view is a copy taken when it is created; no lock is held while it
    /// is alive. Writes through [`LegacyData::insert`] are global writes.
    ///
    /// ```
    /// use eventflow::prelude::*;
    /// use eventflow::testing::TestEvent;
    ///
    /// let session = Session::<TestEvent>::standalone();
    /// let ctx = Context::from_session(&session);
    /// ctx.set("num_to_collect", 3);
    /// assert_eq!(ctx.data()["num_to_collect"], 3);
    ///
    /// ctx.set("doubled", ctx.data()["num_to_collect"].as_i64().map(|n| n * 2));
    /// assert_eq!(ctx.get("doubled").unwrap(), 6);
    /// ```
    #[must_use]
    pub fn data(&self) -> LegacyData<'_> {
        LegacyData {
            snapshot: self.inner.store.to_dict(),
            store: self.inner.store.as_ref(),
        }
    }

    /// Buffers `event` until every type in `required` has arrived.
    ///
    /// Returns the batch, ordered like `required`, once complete; `None`
    /// otherwise. Buffers are keyed by the multiset of required types and
    /// live as long as this context.
    pub fn collect_events(&self, event: E, required: &[EventType]) -> Option<Vec<E>> {
        self.inner.collector.collect(event, required)
    }

    /// Like [`collect_events`](Self::collect_events), under an explicit buffer id.
    pub fn collect_events_with_id(
        &self,
        buffer_id: impl Into<String>,
        event: E,
        required: &[EventType],
    ) -> Option<Vec<E>> {
        self.inner.collector.collect_with_id(buffer_id, event, required)
    }

    /// Returns the collector of this context.
    #[must_use]
    pub fn collector(&self) -> &EventCollector<E> {
        &self.inner.collector
    }

    /// Sends an event through the session, to every accepting step or to one.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowRuntimeError`] when the session has ended or the
    /// target step does not exist or does not accept the event.
    pub fn send_event(&self, event: E, step: Option<&str>) -> Result<(), WorkflowRuntimeError> {
        self.session()?.send_event(event, step)
    }

    /// Forwards an event to the caller streaming this run.
    pub fn write_event_to_stream(&self, event: E) {
        match Session::upgrade(&self.inner.session) {
            Some(session) => session.write_event_to_stream(event),
            None => warn!(event_type = %event.event_type(), "Session ended, dropping stream event"),
        }
    }

    /// Looks up a service registered with the workflow.
    ///
    /// # Errors
    ///
    /// Returns [`EventflowError::ServiceNotFound`] for an unknown name, or
    /// [`EventflowError::Runtime`] once the session has ended.
    pub fn service(&self, name: &str) -> Result<Arc<dyn WorkflowService>, EventflowError> {
        Ok(self.session()?.services().get(name)?)
    }
}

/// Index-style view over a session's global partition.
pub struct LegacyData<'a> {
    snapshot: HashMap<String, Value>,
    store: &'a GlobalStore,
}

impl LegacyData<'_> {
    /// Writes a global value and mirrors it into this view.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        self.store.insert(key.clone(), value.clone());
        self.snapshot.insert(key, value)
    }
}

impl Deref for LegacyData<'_> {
    type Target = HashMap<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.snapshot
    }
}

impl fmt::Debug for LegacyData<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.snapshot.iter()).finish()
    }
}
