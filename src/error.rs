//! Error types for slices, the store and the event bus.

use thiserror::Error;

/// Errors raised while building slices or applying their updates.
#[derive(Error, Debug)]
pub enum SliceError {
    #[error("slice name must not be empty")]
    InvalidName,

    #[error("invalid update name {0:?}: must be non-empty and must not contain '/'")]
    InvalidUpdateName(String),

    #[error("update {update:?} declared twice in slice {slice:?}")]
    DuplicateUpdate { slice: String, update: String },

    #[error("slice {slice:?} has no update named {update:?}")]
    UnknownUpdate { slice: String, update: String },

    #[error("update {kind:?} takes a {expected} payload, not {found}")]
    PayloadType {
        kind: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid payload for {kind:?}: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by the store and the store accessors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("slice {0:?} is already registered")]
    DuplicateSlice(String),

    #[error("slice {0:?} is not registered")]
    UnknownSlice(String),

    #[error("slice {name:?} does not hold a {requested} state")]
    StateType {
        name: String,
        requested: &'static str,
    },

    #[error("failed to serialize state of slice {name:?}: {source}")]
    Snapshot {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store has not been created")]
    NotCreated,

    #[error("store has been dropped")]
    StoreDropped,

    #[error(transparent)]
    Slice(#[from] SliceError),
}

/// Errors raised by the event bus.
#[derive(Error, Debug)]
pub enum EventError {
    #[error("event {topic:?} carries a {expected} payload, not {found}")]
    PayloadType {
        topic: String,
        expected: &'static str,
        found: &'static str,
    },
}
