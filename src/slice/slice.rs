use crate::error::SliceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What an update function receives next to the draft state.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducerPayload<P> {
    /// Full instruction kind, `"<slice>/<update>"`.
    pub kind: String,
    /// The decoded payload.
    pub payload: P,
}

/// A dispatchable store instruction.
///
/// Produced by an [`UpdateFn`](super::UpdateFn) and routed by the store to the
/// slice named in its kind. This is deliberately not called an action: actions
/// are event-bus emitters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    kind: String,
    payload: Value,
}

impl Instruction {
    /// Create an instruction from a raw kind and JSON payload.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// The `"<slice>/<update>"` this instruction targets.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The JSON payload carried to the update.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The slice part of the kind (everything before the last `/`).
    pub fn slice_name(&self) -> Option<&str> {
        self.kind.rsplit_once('/').map(|(slice, _)| slice)
    }

    /// The update part of the kind (everything after the last `/`).
    pub fn update_name(&self) -> Option<&str> {
        self.kind.rsplit_once('/').map(|(_, update)| update)
    }
}

pub(crate) type CaseReducer<S> =
    Arc<dyn Fn(&mut S, &Instruction) -> Result<(), SliceError> + Send + Sync>;

/// The combined update dispatcher of a slice.
pub struct Reducer<S> {
    name: Arc<str>,
    updates: Arc<BTreeMap<String, CaseReducer<S>>>,
}

impl<S> Reducer<S> {
    pub(crate) fn new(name: Arc<str>, updates: BTreeMap<String, CaseReducer<S>>) -> Self {
        Self {
            name,
            updates: Arc::new(updates),
        }
    }

    /// Apply `instruction` to `state`.
    ///
    /// Returns `Ok(false)` and leaves the state alone when the instruction
    /// targets another slice or an update this slice does not declare. The
    /// payload is decoded before the update function runs, so a malformed
    /// payload never leaves a half-applied state behind.
    pub fn reduce(&self, state: &mut S, instruction: &Instruction) -> Result<bool, SliceError> {
        if instruction.slice_name() != Some(&*self.name) {
            return Ok(false);
        }
        let update = match instruction
            .update_name()
            .and_then(|name| self.updates.get(name))
        {
            Some(update) => update,
            None => return Ok(false),
        };
        update(state, instruction)?;
        Ok(true)
    }

    /// Whether `instruction` would be handled by this reducer.
    pub fn handles(&self, instruction: &Instruction) -> bool {
        instruction.slice_name() == Some(&*self.name)
            && instruction
                .update_name()
                .map_or(false, |name| self.updates.contains_key(name))
    }

    /// Declared update names, sorted.
    pub fn update_names(&self) -> impl Iterator<Item = &str> {
        self.updates.keys().map(String::as_str)
    }
}

impl<S> Clone for Reducer<S> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            updates: Arc::clone(&self.updates),
        }
    }
}

impl<S> fmt::Debug for Reducer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reducer")
            .field("name", &self.name)
            .field("updates", &self.updates.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A registrable slice: its name, its reducer and the state it starts from.
pub struct Slice<S> {
    name: Arc<str>,
    initial_state: S,
    reducer: Reducer<S>,
}

impl<S> Slice<S> {
    pub(crate) fn new(name: Arc<str>, initial_state: S, reducer: Reducer<S>) -> Self {
        Self {
            name,
            initial_state,
            reducer,
        }
    }

    /// The slice name; also its key in the root state.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The combined update dispatcher.
    pub fn reducer(&self) -> &Reducer<S> {
        &self.reducer
    }

    /// The state a fresh registration starts from.
    pub fn initial_state(&self) -> &S {
        &self.initial_state
    }
}

impl<S: Clone> Clone for Slice<S> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            initial_state: self.initial_state.clone(),
            reducer: self.reducer.clone(),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for Slice<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slice")
            .field("name", &self.name)
            .field("initial_state", &self.initial_state)
            .field("reducer", &self.reducer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn instruction_splits_on_last_separator() {
        let instruction = Instruction::new("chat/threads/setSelected", json!("t-1"));
        assert_eq!(instruction.slice_name(), Some("chat/threads"));
        assert_eq!(instruction.update_name(), Some("setSelected"));

        let bare = Instruction::new("noslash", Value::Null);
        assert_eq!(bare.slice_name(), None);
        assert_eq!(bare.update_name(), None);
    }

    #[test]
    fn instruction_serializes_kind_and_payload() {
        let instruction = Instruction::new("counter/add", json!(3));
        let value = serde_json::to_value(&instruction).unwrap();
        assert_eq!(value, json!({ "kind": "counter/add", "payload": 3 }));
    }
}
