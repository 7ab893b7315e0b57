//! Store accessors.
//!
//! This module provides the store lifecycle (`create_store`, `reset_store`,
//! `teardown_store`) and the slice operations that act on the current
//! [`StoreRuntime`].

mod context;

pub use context::{
    create_store, event_bus, get_registered_slices, get_store, has_slice, register_slice,
    register_slice_with_effects, reset_store, teardown_store, unregister_slice, StoreRuntime,
};
