//! Effects: event handlers that turn bus events into store instructions.

mod effect;

pub use effect::{EffectInitializer, Effects};
