//! The event-collection barrier.
//!
//! A step that needs several events before it can proceed hands each event it
//! receives to [`EventCollector::collect`] together with the list of types it
//! is waiting for. The collector buffers events per collection point and
//! releases one batch, in the order the types were requested, as soon as every
//! requested type has arrived.

use crate::events::{Event, EventType};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Identifies a collection point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BufferKey {
    /// Keyed by the multiset of required types (sorted, so order does not matter).
    Types(Vec<EventType>),
    /// Keyed by an explicit collection id.
    Id(String),
}

impl BufferKey {
    /// Builds the key shared by every call requiring the same multiset of types.
    #[must_use]
    pub fn for_types(required: &[EventType]) -> Self {
        let mut types = required.to_vec();
        types.sort_unstable();
        Self::Types(types)
    }

    /// Builds a key for an explicit collection id.
    #[must_use]
    pub fn for_id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }
}

type Buffer<E> = HashMap<EventType, VecDeque<E>>;

/// Accumulates events until a required set of types is complete.
///
/// Every buffer is guarded by one mutex: appending, checking and draining
/// happen in a single critical section, so exactly one caller receives a
/// completed batch.
#[derive(Debug)]
pub struct EventCollector<E> {
    buffers: Mutex<HashMap<BufferKey, Buffer<E>>>,
}

impl<E> Default for EventCollector<E> {
    fn default() -> Self {
        Self {
            buffers: Mutex::new(HashMap::new()),
        }
    }
}

impl<E: Event> EventCollector<E> {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers `event` and returns the batch once `required` is satisfied.
    ///
    /// Calls with the same multiset of required types share one buffer,
    /// whatever their order. Returns `None` while the batch is incomplete.
    pub fn collect(&self, event: E, required: &[EventType]) -> Option<Vec<E>> {
        self.collect_in(BufferKey::for_types(required), event, required)
    }

    /// Like [`collect`](Self::collect), but buffers under an explicit id.
    pub fn collect_with_id(
        &self,
        buffer_id: impl Into<String>,
        event: E,
        required: &[EventType],
    ) -> Option<Vec<E>> {
        self.collect_in(BufferKey::for_id(buffer_id), event, required)
    }

    fn collect_in(&self, key: BufferKey, event: E, required: &[EventType]) -> Option<Vec<E>> {
        if required.is_empty() {
            return Some(Vec::new());
        }

        let event_type = event.event_type();
        if !required.contains(&event_type) {
            debug!(event_type = %event_type, "Event not part of the collection, ignoring");
            return None;
        }

        let mut buffers = self.buffers.lock();
        let buffer = buffers.entry(key.clone()).or_default();
        buffer.entry(event_type).or_default().push_back(event);

        let mut needed: HashMap<EventType, usize> = HashMap::new();
        for ty in required {
            *needed.entry(*ty).or_default() += 1;
        }
        let satisfied = needed
            .iter()
            .all(|(ty, count)| buffer.get(ty).map_or(0, VecDeque::len) >= *count);

        if !satisfied {
            debug!(event_type = %event_type, ?key, "Collection incomplete");
            return None;
        }

        // A completed buffer is dropped whole; the next cycle starts clean.
        let mut buffer = buffers.remove(&key)?;
        drop(buffers);

        let batch: Vec<E> = required
            .iter()
            .filter_map(|ty| buffer.get_mut(ty).and_then(VecDeque::pop_front))
            .collect();
        debug!(?key, size = batch.len(), "Collection complete");
        Some(batch)
    }

    /// Returns how many events are buffered for the given required types.
    #[must_use]
    pub fn pending(&self, required: &[EventType]) -> usize {
        self.pending_for(&BufferKey::for_types(required))
    }

    /// Returns how many events are buffered under a key.
    #[must_use]
    pub fn pending_for(&self, key: &BufferKey) -> usize {
        self.buffers
            .lock()
            .get(key)
            .map_or(0, |buffer| buffer.values().map(VecDeque::len).sum())
    }

    /// Returns the number of open collection points.
    #[must_use]
    pub fn open_buffers(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Discards every partially collected batch.
    pub fn clear(&self) {
        self.buffers.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestEvent;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const ONE: EventType = TestEvent::ONE;
    const ANOTHER: EventType = TestEvent::ANOTHER;

    #[test]
    fn test_collect_releases_batch_when_complete() {
        let collector = EventCollector::new();

        assert_eq!(collector.collect(TestEvent::one("a"), &[ONE, ANOTHER]), None);
        let batch = collector.collect(TestEvent::another("b"), &[ONE, ANOTHER]);

        assert_eq!(batch, Some(vec![TestEvent::one("a"), TestEvent::another("b")]));
        assert_eq!(collector.open_buffers(), 0);
    }

    #[test]
    fn test_batch_follows_requested_order() {
        let collector = EventCollector::new();

        assert_eq!(collector.collect(TestEvent::one("a"), &[ANOTHER, ONE]), None);
        let batch = collector.collect(TestEvent::another("b"), &[ANOTHER, ONE]);

        assert_eq!(batch, Some(vec![TestEvent::another("b"), TestEvent::one("a")]));
    }

    #[test]
    fn test_request_order_shares_buffer() {
        let collector = EventCollector::new();

        assert_eq!(collector.collect(TestEvent::one("a"), &[ONE, ANOTHER]), None);
        let batch = collector.collect(TestEvent::another("b"), &[ANOTHER, ONE]);

        assert_eq!(batch, Some(vec![TestEvent::another("b"), TestEvent::one("a")]));
    }

    #[test]
    fn test_unrelated_event_does_not_touch_buffer() {
        let collector = EventCollector::new();

        assert_eq!(collector.collect(TestEvent::one("a"), &[ONE, ANOTHER]), None);
        assert_eq!(collector.collect(TestEvent::Last, &[ONE, ANOTHER]), None);
        assert_eq!(collector.pending(&[ONE, ANOTHER]), 1);

        let batch = collector.collect(TestEvent::another("b"), &[ONE, ANOTHER]);
        assert_eq!(batch, Some(vec![TestEvent::one("a"), TestEvent::another("b")]));
    }

    #[test]
    fn test_duplicate_types_need_distinct_instances() {
        let collector = EventCollector::new();
        let required = [ANOTHER, ANOTHER, ANOTHER];

        assert_eq!(collector.collect(TestEvent::another("1"), &required), None);
        assert_eq!(collector.collect(TestEvent::another("2"), &required), None);
        let batch = collector.collect(TestEvent::another("3"), &required);

        assert_eq!(
            batch,
            Some(vec![
                TestEvent::another("1"),
                TestEvent::another("2"),
                TestEvent::another("3"),
            ])
        );
    }

    #[test]
    fn test_same_type_is_fifo() {
        let collector = EventCollector::new();

        assert_eq!(collector.collect(TestEvent::one("first"), &[ONE, ANOTHER]), None);
        assert_eq!(collector.collect(TestEvent::one("second"), &[ONE, ANOTHER]), None);
        let batch = collector.collect(TestEvent::another("b"), &[ONE, ANOTHER]);

        assert_eq!(batch, Some(vec![TestEvent::one("first"), TestEvent::another("b")]));
        // Surplus events belong to the completed cycle and are dropped with it.
        assert_eq!(collector.pending(&[ONE, ANOTHER]), 0);
    }

    #[test]
    fn test_distinct_requirement_sets_do_not_interfere() {
        let collector = EventCollector::new();

        assert_eq!(collector.collect(TestEvent::one("a"), &[ONE, ANOTHER]), None);
        assert_eq!(collector.collect(TestEvent::one("x"), &[ONE, ONE]), None);
        assert_eq!(collector.open_buffers(), 2);

        let batch = collector.collect(TestEvent::another("b"), &[ONE, ANOTHER]);
        assert_eq!(batch, Some(vec![TestEvent::one("a"), TestEvent::another("b")]));
        assert_eq!(collector.pending(&[ONE, ONE]), 1);
    }

    #[test]
    fn test_explicit_ids_partition_buffers() {
        let collector = EventCollector::new();

        assert_eq!(collector.collect_with_id("left", TestEvent::one("l"), &[ONE, ANOTHER]), None);
        assert_eq!(collector.collect_with_id("right", TestEvent::one("r"), &[ONE, ANOTHER]), None);

        let batch = collector.collect_with_id("right", TestEvent::another("b"), &[ONE, ANOTHER]);
        assert_eq!(batch, Some(vec![TestEvent::one("r"), TestEvent::another("b")]));
        assert_eq!(collector.pending_for(&BufferKey::for_id("left")), 1);
    }

    #[test]
    fn test_empty_requirement_is_immediately_satisfied() {
        let collector = EventCollector::new();
        assert_eq!(collector.collect(TestEvent::Last, &[]), Some(Vec::new()));
        assert_eq!(collector.open_buffers(), 0);
    }

    #[test]
    fn test_cycle_restarts_after_completion() {
        let collector = EventCollector::new();

        collector.collect(TestEvent::one("a"), &[ONE, ANOTHER]);
        assert!(collector.collect(TestEvent::another("b"), &[ONE, ANOTHER]).is_some());

        assert_eq!(collector.collect(TestEvent::another("c"), &[ONE, ANOTHER]), None);
        let batch = collector.collect(TestEvent::one("d"), &[ONE, ANOTHER]);
        assert_eq!(batch, Some(vec![TestEvent::one("d"), TestEvent::another("c")]));
    }

    #[test]
    fn test_clear_discards_partial_batches() {
        let collector = EventCollector::new();
        collector.collect(TestEvent::one("a"), &[ONE, ANOTHER]);
        collector.clear();
        assert_eq!(collector.open_buffers(), 0);
    }

    #[test]
    fn test_concurrent_collectors_deliver_exactly_once() {
        let collector = Arc::new(EventCollector::new());
        let required = [ANOTHER; 8];

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let collector = collector.clone();
                std::thread::spawn(move || {
                    collector.collect(TestEvent::another(&i.to_string()), &required)
                })
            })
            .collect();

        let batches: Vec<Vec<TestEvent>> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 8);
        assert_eq!(collector.open_buffers(), 0);
    }
}
