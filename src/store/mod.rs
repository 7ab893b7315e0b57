//! The store: an explicit context aggregating the state of registered slices.
//!
//! Slices are registered and unregistered at runtime; instructions produced by
//! update functions are routed to the slice they name.

mod config;
mod store;

pub use config::{DuplicatePolicy, StoreConfig};
pub use store::{AppDispatch, RootState, Store, StoreSubscription};
