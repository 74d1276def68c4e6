//! Workflow events.
//!
//! A workflow's events form a closed enum defined by the application. The
//! enum implements [`Event`], reporting an [`EventType`] per variant so the
//! engine can route events and the collector can bucket them without any
//! runtime type inspection.

mod start_stop;

pub use start_stop::{StartEvent, StopEvent};

use serde::{Serialize, Serializer};
use std::fmt;

/// Identifier of an event kind.
///
/// Identifiers are compile-time constants:
///
/// ```
/// use eventflow::events::EventType;
///
/// const ONE: EventType = EventType::new("OneEvent");
/// assert_eq!(ONE.name(), "OneEvent");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventType(&'static str);

impl EventType {
    /// The synthetic event every run starts from.
    pub const START: Self = Self("StartEvent");
    /// The terminal event whose payload is the run result.
    pub const STOP: Self = Self("StopEvent");

    /// Creates an event type identifier.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the identifier's name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

/// Trait implemented by a workflow's event enum.
///
/// The start variant must report [`EventType::START`] and the stop variant
/// [`EventType::STOP`].
pub trait Event: Clone + fmt::Debug + Send + Sync + 'static {
    /// Returns the kind of this event.
    fn event_type(&self) -> EventType;

    /// Wraps the run input into the start variant.
    fn from_start(start: StartEvent) -> Self;

    /// Unwraps the stop variant, handing any other event back.
    fn into_stop(self) -> Result<StopEvent, Self>;

    /// Returns true for the terminal variant.
    fn is_stop(&self) -> bool {
        self.event_type() == EventType::STOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestEvent;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_event_type_identity() {
        const A: EventType = EventType::new("A");
        assert_eq!(A, EventType::new("A"));
        assert_ne!(A, EventType::new("B"));
        assert_eq!(A.to_string(), "A");
    }

    #[test]
    fn test_event_type_ordering_is_by_name() {
        let mut types = vec![EventType::new("b"), EventType::new("a")];
        types.sort();
        assert_eq!(types, vec![EventType::new("a"), EventType::new("b")]);
    }

    #[test]
    fn test_event_type_serializes_as_name() {
        let json = serde_json::to_value(EventType::STOP).unwrap();
        assert_eq!(json, serde_json::json!("StopEvent"));
    }

    #[test]
    fn test_start_and_stop_round_trip_through_enum() {
        let start = TestEvent::from_start(StartEvent::new().with("number", 3));
        assert_eq!(start.event_type(), EventType::START);
        assert!(!start.is_stop());

        let stop = TestEvent::Stop(StopEvent::new(42));
        assert!(stop.is_stop());
        assert_eq!(stop.into_stop().unwrap().result, serde_json::json!(42));

        let other = TestEvent::Last;
        assert!(matches!(other.into_stop(), Err(TestEvent::Last)));
    }
}
