//! Typed publish/subscribe, decoupled from the store.
//!
//! - [`EventBus`] - the registry
//! - [`EventKey`] - a topic bound to its payload type
//! - [`Action`] - an event emitter (the only meaning of "action" in this crate)

mod bus;
mod key;

pub use bus::{EventBus, EventHandler, Subscription};
pub use key::{Action, EventKey};
