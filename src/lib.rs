//! # hai3-state
//!
//! Slice-based state management with dynamic slice registration and a typed
//! event bus.
//!
//! ## Slices
//!
//! A slice is a named unit of state plus the update functions that change it:
//! - [`create_slice`] - builder producing a [`SliceResult`]
//! - [`Slice`] - the registrable part (name + reducer + initial state)
//! - [`UpdateFn`] - turns a payload into a dispatchable [`Instruction`]
//!
//! ## Store
//!
//! - [`Store`] - explicit store context aggregating registered slices
//! - [`runtime`] - `create_store` / `get_store` / `register_slice` / ... acting
//!   on the current [`StoreRuntime`]
//!
//! ## Events
//!
//! - [`EventBus`] - typed publish/subscribe, independent of the store
//! - [`Action`] - an event emitter
//! - [`Effects`] - event subscriptions owned by a registered slice
//!
//! "Action" always means an event emitter here. What the store consumes is an
//! [`Instruction`].

pub mod effect;
pub mod error;
pub mod event;
pub mod runtime;
pub mod slice;
pub mod store;

mod sync;

// Re-export main types for convenience
pub use effect::{EffectInitializer, Effects};
pub use error::{EventError, SliceError, StoreError};
pub use event::{Action, EventBus, EventHandler, EventKey, Subscription};
pub use runtime::StoreRuntime;
pub use slice::{
    create_slice, Instruction, Reducer, ReducerPayload, Slice, SliceBuilder, SliceResult, UpdateFn,
};
pub use store::{AppDispatch, DuplicatePolicy, RootState, Store, StoreConfig, StoreSubscription};

/// The registrable `{ name, reducer }` part of a slice.
pub type SliceObject<S> = Slice<S>;
