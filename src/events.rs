// src/events.rs - Event payloads, sink contract, and subscriber fan-out
use crate::types::{DataValue, NodeId};
use serde::Serialize;

/// Well-known event type node ids (OPC-UA namespace 0).
pub mod event_type_ids {
    use crate::types::NodeId;

    pub const CONDITION: NodeId = NodeId::Numeric(2782);
    pub const ACKNOWLEDGEABLE_CONDITION: NodeId = NodeId::Numeric(2881);
    pub const ALARM_CONDITION: NodeId = NodeId::Numeric(2915);
    pub const LIMIT_ALARM: NodeId = NodeId::Numeric(2955);
    pub const EXCLUSIVE_LIMIT_ALARM: NodeId = NodeId::Numeric(9341);
    pub const NON_EXCLUSIVE_LIMIT_ALARM: NodeId = NodeId::Numeric(9906);
    pub const EXCLUSIVE_DEVIATION_ALARM: NodeId = NodeId::Numeric(9764);
    pub const NON_EXCLUSIVE_DEVIATION_ALARM: NodeId = NodeId::Numeric(10368);
    pub const OFF_NORMAL_ALARM: NodeId = NodeId::Numeric(10637);
    pub const REFRESH_START: NodeId = NodeId::Numeric(2787);
    pub const REFRESH_END: NodeId = NodeId::Numeric(2788);
}

/// Flat, ordered mapping from dotted property path (`"enabledState.id"`) to
/// a `(value, status, timestamp)` triple. This shape is the wire contract
/// consumed by event filters; insertion order is preserved.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventPayload {
    fields: Vec<(String, DataValue)>,
}

impl EventPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field, keeping the original position on replace.
    pub fn set(&mut self, key: impl Into<String>, value: DataValue) {
        let key = key.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
    }

    /// Field lookup by exact dotted path.
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterate fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One event as delivered to subscribers: the concrete event type node and
/// the flat payload.
#[derive(Debug, Clone, Serialize)]
pub struct ConditionEvent {
    pub event_type: NodeId,
    pub payload: EventPayload,
}

/// Abstract sink the condition machinery emits into. The engine's
/// [`EventBus`] is the production implementation; tests use
/// [`RecordingSink`] to assert on emission order and payload content.
pub trait EventSink {
    fn emit(&mut self, event: ConditionEvent);
}

/// Handle returned by [`EventBus::subscribe`]; pass it back to
/// [`EventBus::unsubscribe`] to deregister. Unsubscribing twice is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

type Listener = Box<dyn FnMut(&ConditionEvent)>;

/// Synchronous fan-out of condition events to registered listeners.
///
/// Delivery is in registration order, on the caller's stack, before `emit`
/// returns. Listeners must not re-enter the engine; they record or forward.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<(SubscriptionHandle, Listener)>,
    next_handle: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; returns the handle used to unsubscribe.
    pub fn subscribe<F>(&mut self, handler: F) -> SubscriptionHandle
    where
        F: FnMut(&ConditionEvent) + 'static,
    {
        let handle = SubscriptionHandle(self.next_handle);
        self.next_handle += 1;
        self.listeners.push((handle, Box::new(handler)));
        handle
    }

    /// Remove a listener. Idempotent.
    pub fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        self.listeners.retain(|(h, _)| *h != handle);
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventSink for EventBus {
    fn emit(&mut self, event: ConditionEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }
}

/// Sink that records every emitted event, for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<ConditionEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&ConditionEvent> {
        self.events.last()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: ConditionEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataValue;
    use crate::value::Variant;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn sample_event(n: i32) -> ConditionEvent {
        let mut payload = EventPayload::new();
        payload.set("severity", DataValue::new(Variant::Int32(n)));
        ConditionEvent { event_type: event_type_ids::CONDITION, payload }
    }

    #[test]
    fn test_payload_preserves_insertion_order() {
        let mut p = EventPayload::new();
        p.set("eventId", DataValue::new(Variant::Null));
        p.set("severity", DataValue::new(Variant::Int32(1)));
        p.set("eventId", DataValue::new(Variant::Int32(2)));
        let keys: Vec<_> = p.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["eventId", "severity"]);
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        for tag in ["a", "b", "c"] {
            let seen = seen.clone();
            bus.subscribe(move |_| seen.borrow_mut().push(tag));
        }
        bus.emit(sample_event(1));
        assert_eq!(*seen.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let seen = Rc::new(RefCell::new(0u32));
        let mut bus = EventBus::new();
        let counter = seen.clone();
        let handle = bus.subscribe(move |_| *counter.borrow_mut() += 1);
        bus.emit(sample_event(1));
        bus.unsubscribe(handle);
        bus.unsubscribe(handle);
        bus.emit(sample_event(2));
        assert_eq!(*seen.borrow(), 1);
    }
}
