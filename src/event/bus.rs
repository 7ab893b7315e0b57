use super::key::EventKey;
use crate::error::EventError;
use crate::sync::{read, write};
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

/// A handler for events carrying a `P` payload.
pub type EventHandler<P> = Arc<dyn Fn(&P) + Send + Sync>;

type ErasedHandler = Arc<dyn Fn(&dyn Any) + Send + Sync>;

struct HandlerEntry {
    id: u64,
    once: bool,
    payload_type: TypeId,
    payload_type_name: &'static str,
    handler: ErasedHandler,
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    topics: HashMap<String, Vec<HandlerEntry>>,
}

impl BusInner {
    fn remove(&mut self, topic: &str, id: u64) -> bool {
        let Some(handlers) = self.topics.get_mut(topic) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|entry| entry.id != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            self.topics.remove(topic);
        }
        removed
    }
}

/// A typed publish/subscribe registry.
///
/// Independent of the store: effects subscribe here and dispatch into the
/// store, actions emit here. Cloning yields another handle to the same bus.
///
/// # Examples
///
/// ```
/// use hai3_state::EventBus;
/// use std::sync::{Arc, atomic::{AtomicI32, Ordering}};
///
/// let bus = EventBus::new();
/// let seen = Arc::new(AtomicI32::new(0));
/// let seen_clone = seen.clone();
///
/// let subscription = bus.on("t", move |value: &i32| {
///     seen_clone.store(*value, Ordering::SeqCst);
/// });
///
/// assert_eq!(bus.emit("t", 42).unwrap(), 1);
/// assert_eq!(seen.load(Ordering::SeqCst), 42);
/// subscription.unsubscribe();
/// ```
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<RwLock<BusInner>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler` to `topic`.
    ///
    /// The handler stays registered for as long as the returned
    /// [`Subscription`] lives (or forever, after [`Subscription::detach`]).
    pub fn on<P, F>(&self, topic: impl Into<String>, handler: F) -> Subscription
    where
        P: 'static,
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.insert(topic.into(), false, handler)
    }

    /// Subscribe an already shared [`EventHandler`] to `topic`.
    pub fn on_handler<P: 'static>(&self, topic: impl Into<String>, handler: EventHandler<P>) -> Subscription {
        self.insert(topic.into(), false, move |payload: &P| handler(payload))
    }

    /// Like [`on`](Self::on), but the handler is removed before its first run.
    pub fn once<P, F>(&self, topic: impl Into<String>, handler: F) -> Subscription
    where
        P: 'static,
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.insert(topic.into(), true, handler)
    }

    /// Subscribe through a typed key.
    pub fn subscribe<P, F>(&self, key: &EventKey<P>, handler: F) -> Subscription
    where
        P: 'static,
        F: Fn(&P) + Send + Sync + 'static,
    {
        self.insert(key.topic().to_string(), false, handler)
    }

    fn insert<P, F>(&self, topic: String, once: bool, handler: F) -> Subscription
    where
        P: 'static,
        F: Fn(&P) + Send + Sync + 'static,
    {
        let handler: ErasedHandler = Arc::new(move |payload: &dyn Any| {
            if let Some(payload) = payload.downcast_ref::<P>() {
                handler(payload);
            }
        });

        let mut inner = write(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .topics
            .entry(topic.clone())
            .or_default()
            .push(HandlerEntry {
                id,
                once,
                payload_type: TypeId::of::<P>(),
                payload_type_name: type_name::<P>(),
                handler,
            });
        drop(inner);

        tracing::debug!(topic = %topic, id, once, "event handler subscribed");
        Subscription {
            id,
            topic,
            bus: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    /// Invoke every handler currently subscribed to `topic` with `payload`.
    ///
    /// Returns how many handlers ran. If any handler expects a different
    /// payload type, nothing runs and [`EventError::PayloadType`] is returned.
    pub fn emit<P: 'static>(&self, topic: &str, payload: P) -> Result<usize, EventError> {
        let handlers = {
            let mut inner = write(&self.inner);
            let Some(entries) = inner.topics.get_mut(topic) else {
                tracing::trace!(topic, "event emitted without handlers");
                return Ok(0);
            };

            if let Some(mismatch) = entries
                .iter()
                .find(|entry| entry.payload_type != TypeId::of::<P>())
            {
                return Err(EventError::PayloadType {
                    topic: topic.to_string(),
                    expected: mismatch.payload_type_name,
                    found: type_name::<P>(),
                });
            }

            let handlers: Vec<ErasedHandler> = entries
                .iter()
                .map(|entry| Arc::clone(&entry.handler))
                .collect();
            entries.retain(|entry| !entry.once);
            if entries.is_empty() {
                inner.topics.remove(topic);
            }
            handlers
        };

        tracing::trace!(topic, handlers = handlers.len(), "event emitted");
        for handler in &handlers {
            handler(&payload);
        }
        Ok(handlers.len())
    }

    /// Emit through a typed key.
    pub fn emit_event<P: 'static>(&self, key: &EventKey<P>, payload: P) -> Result<usize, EventError> {
        self.emit(key.topic(), payload)
    }

    /// Remove the handler behind `subscription`. Returns whether it was still registered.
    pub fn unsubscribe(&self, mut subscription: Subscription) -> bool {
        subscription.active = false;
        write(&self.inner).remove(&subscription.topic, subscription.id)
    }

    /// Remove every handler of `topic`.
    pub fn clear(&self, topic: &str) {
        write(&self.inner).topics.remove(topic);
    }

    /// Remove every handler of every topic.
    pub fn clear_all(&self) {
        write(&self.inner).topics.clear();
    }

    /// Number of handlers currently subscribed to `topic`.
    pub fn handler_count(&self, topic: &str) -> usize {
        read(&self.inner).topics.get(topic).map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = read(&self.inner);
        let mut topics: Vec<_> = inner
            .topics
            .iter()
            .map(|(topic, handlers)| (topic.as_str(), handlers.len()))
            .collect();
        topics.sort_unstable();
        f.debug_struct("EventBus").field("topics", &topics).finish()
    }
}

/// RAII guard for an event handler.
///
/// Dropping the guard unsubscribes the handler.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: u64,
    topic: String,
    bus: Weak<RwLock<BusInner>>,
    active: bool,
}

impl Subscription {
    /// The topic this subscription listens on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Whether the handler is still registered on a live bus.
    pub fn is_active(&self) -> bool {
        self.bus.upgrade().map_or(false, |bus| {
            read(&bus)
                .topics
                .get(&self.topic)
                .map_or(false, |handlers| handlers.iter().any(|entry| entry.id == self.id))
        })
    }

    /// Remove the handler now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keep the handler registered for the lifetime of the bus.
    pub fn detach(mut self) {
        self.active = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            if write(&bus).remove(&self.topic, self.id) {
                tracing::debug!(topic = %self.topic, id = self.id, "event handler unsubscribed");
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn emit_invokes_handler_once_with_payload() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let _subscription = bus.on("t", move |value: &i32| {
            seen_clone.lock().unwrap().push(*value);
        });

        assert_eq!(bus.emit("t", 42).unwrap(), 1);
        assert_eq!(*seen.lock().unwrap(), vec![42]);
    }

    #[test]
    fn unsubscribe_before_emit_prevents_invocation() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let subscription = bus.on("t", move |_: &i32| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(bus.unsubscribe(subscription));

        assert_eq!(bus.emit("t", 42).unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let bus = EventBus::new();
        {
            let _subscription = bus.on("t", |_: &i32| {});
            assert_eq!(bus.handler_count("t"), 1);
        }
        assert_eq!(bus.handler_count("t"), 0);
    }

    #[test]
    fn detached_subscription_survives_guard() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        bus.on("t", move |_: &()| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        })
        .detach();

        bus.emit("t", ()).unwrap();
        bus.emit("t", ()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn once_handler_runs_a_single_time() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let subscription = bus.once("t", move |_: &()| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(bus.emit("t", ()).unwrap(), 1);
        assert_eq!(bus.emit("t", ()).unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!subscription.is_active());
    }

    #[test]
    fn payload_type_mismatch_runs_nothing() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let _subscription = bus.on("t", move |_: &i32| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let err = bus.emit("t", "forty-two").unwrap_err();
        assert!(matches!(err, EventError::PayloadType { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handlers_may_emit_reentrantly() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = calls.clone();
        let _second = bus.on("second", move |_: &()| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        let inner_bus = bus.clone();
        let _first = bus.on("first", move |_: &()| {
            inner_bus.emit("second", ()).unwrap();
        });

        bus.emit("first", ()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shared_handler_serves_several_topics() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let handler: EventHandler<u32> = Arc::new(move |value: &u32| {
            calls_clone.fetch_add(*value as usize, Ordering::SeqCst);
        });

        let _a = bus.on_handler("a", Arc::clone(&handler));
        let _b = bus.on_handler("b", handler);

        bus.emit("a", 2u32).unwrap();
        bus.emit("b", 3u32).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn clear_removes_topic_handlers() {
        let bus = EventBus::new();
        let a = bus.on("a", |_: &()| {});
        let _b = bus.on("b", |_: &()| {});

        bus.clear("a");
        assert_eq!(bus.handler_count("a"), 0);
        assert_eq!(bus.handler_count("b"), 1);
        assert!(!a.is_active());

        bus.clear_all();
        assert_eq!(bus.handler_count("b"), 0);
    }
}
