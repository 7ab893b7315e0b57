use super::bus::EventBus;
use crate::error::EventError;
use std::fmt;
use std::marker::PhantomData;

/// A topic name bound to the payload type it carries.
///
/// ```
/// use hai3_state::EventKey;
///
/// const THREAD_SELECTED: EventKey<String> = EventKey::new("chat/threadSelected");
/// assert_eq!(THREAD_SELECTED.topic(), "chat/threadSelected");
/// ```
pub struct EventKey<P> {
    topic: &'static str,
    _payload: PhantomData<fn(P)>,
}

impl<P> EventKey<P> {
    /// Bind `topic` to the payload type `P`.
    pub const fn new(topic: &'static str) -> Self {
        Self {
            topic,
            _payload: PhantomData,
        }
    }

    pub const fn topic(&self) -> &'static str {
        self.topic
    }
}

impl<P> Clone for EventKey<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for EventKey<P> {}

impl<P> fmt::Debug for EventKey<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventKey").field(&self.topic).finish()
    }
}

/// An action: a function that emits an event.
///
/// Actions never touch the store. An effect subscribed to the same key turns
/// the event into store instructions.
pub struct Action<P> {
    bus: EventBus,
    key: EventKey<P>,
}

impl<P: 'static> Action<P> {
    /// Create an action emitting on `key` through `bus`.
    pub fn new(bus: EventBus, key: EventKey<P>) -> Self {
        Self { bus, key }
    }

    /// Emit the event. Returns how many handlers ran.
    pub fn call(&self, payload: P) -> Result<usize, EventError> {
        self.bus.emit_event(&self.key, payload)
    }

    /// The key this action emits on.
    pub fn key(&self) -> EventKey<P> {
        self.key
    }
}

impl<P> Clone for Action<P> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            key: self.key,
        }
    }
}

impl<P> fmt::Debug for Action<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("key", &self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const RENAMED: EventKey<String> = EventKey::new("profile/renamed");

    #[test]
    fn action_emits_on_its_key() {
        let bus = EventBus::new();
        let names = Arc::new(Mutex::new(Vec::new()));
        let names_clone = names.clone();

        let _subscription = bus.subscribe(&RENAMED, move |name: &String| {
            names_clone.lock().unwrap().push(name.clone());
        });

        let rename = Action::new(bus.clone(), RENAMED);
        assert_eq!(rename.call("ada".to_string()).unwrap(), 1);
        assert_eq!(*names.lock().unwrap(), vec!["ada".to_string()]);
    }
}
