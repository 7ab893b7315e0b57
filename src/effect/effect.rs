use crate::event::Subscription;
use crate::store::AppDispatch;
use std::fmt;

/// Called once when a slice is registered; wires event handlers that dispatch
/// into the store and hands back their subscriptions.
pub type EffectInitializer = Box<dyn FnOnce(AppDispatch) -> Effects>;

/// The event subscriptions owned by a registered slice.
///
/// Effects live exactly as long as their slice stays registered: unregistering
/// the slice drops the bag, and every [`Subscription`] in it unsubscribes.
///
/// # Examples
///
/// ```
/// use hai3_state::{EventBus, Effects};
///
/// let bus = EventBus::new();
/// let effects = Effects::new()
///     .with(bus.on("session/started", |_: &()| {}))
///     .with(bus.on("session/ended", |_: &()| {}));
///
/// assert_eq!(effects.len(), 2);
/// drop(effects);
/// assert_eq!(bus.handler_count("session/started"), 0);
/// ```
#[derive(Default)]
pub struct Effects {
    subscriptions: Vec<Subscription>,
}

impl Effects {
    /// An empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `subscription`, builder style.
    pub fn with(mut self, subscription: Subscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    /// Add `subscription` in place.
    pub fn push(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Number of subscriptions held.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether the bag holds no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl From<Vec<Subscription>> for Effects {
    fn from(subscriptions: Vec<Subscription>) -> Self {
        Self { subscriptions }
    }
}

impl FromIterator<Subscription> for Effects {
    fn from_iter<I: IntoIterator<Item = Subscription>>(iter: I) -> Self {
        Self {
            subscriptions: iter.into_iter().collect(),
        }
    }
}

impl fmt::Debug for Effects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.subscriptions.iter().map(Subscription::topic))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;

    #[test]
    fn dropping_effects_unsubscribes_all() {
        let bus = EventBus::new();
        let effects: Effects = ["a", "b", "a"]
            .into_iter()
            .map(|topic| bus.on(topic, |_: &u8| {}))
            .collect();

        assert_eq!(effects.len(), 3);
        assert_eq!(bus.handler_count("a"), 2);

        drop(effects);
        assert_eq!(bus.handler_count("a"), 0);
        assert_eq!(bus.handler_count("b"), 0);
    }
}
