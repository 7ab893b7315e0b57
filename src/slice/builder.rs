use super::slice::{CaseReducer, Instruction, Reducer, ReducerPayload, Slice};
use crate::error::SliceError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::{type_name, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Start building a slice.
///
/// Update functions are declared with [`SliceBuilder::reducer`]; each one
/// receives a mutable draft of the state and the typed payload.
///
/// ```
/// use hai3_state::{create_slice, ReducerPayload};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Threads {
///     selected: Option<String>,
///     loading: bool,
/// }
///
/// let threads = create_slice("chat/threads", Threads { selected: None, loading: false })
///     .reducer("setSelected", |state: &mut Threads, action: ReducerPayload<String>| {
///         state.selected = Some(action.payload);
///     })
///     .reducer("setLoading", |state: &mut Threads, action: ReducerPayload<bool>| {
///         state.loading = action.payload;
///     })
///     .build()
///     .unwrap();
///
/// let set_selected = threads.update::<String>("setSelected").unwrap();
/// let instruction = set_selected.call("t-1".to_string()).unwrap();
/// assert_eq!(instruction.kind(), "chat/threads/setSelected");
/// ```
pub fn create_slice<S>(name: impl Into<String>, initial_state: S) -> SliceBuilder<S>
where
    S: Send + Sync + 'static,
{
    SliceBuilder {
        name: name.into(),
        initial_state,
        updates: Vec::new(),
    }
}

struct DeclaredReducer<S> {
    name: String,
    payload_type: TypeId,
    payload_type_name: &'static str,
    reducer: CaseReducer<S>,
}

/// Builder returned by [`create_slice`].
pub struct SliceBuilder<S> {
    name: String,
    initial_state: S,
    updates: Vec<DeclaredReducer<S>>,
}

impl<S> SliceBuilder<S>
where
    S: Send + Sync + 'static,
{
    /// Declare an update function named `update`.
    ///
    /// Validation happens in [`build`](Self::build).
    pub fn reducer<P, F>(mut self, update: impl Into<String>, f: F) -> Self
    where
        P: Serialize + DeserializeOwned + 'static,
        F: Fn(&mut S, ReducerPayload<P>) + Send + Sync + 'static,
    {
        let reducer: CaseReducer<S> = Arc::new(
            move |state: &mut S, instruction: &Instruction| -> Result<(), SliceError> {
                let payload =
                    P::deserialize(instruction.payload()).map_err(|source| SliceError::Payload {
                        kind: instruction.kind().to_string(),
                        source,
                    })?;
                f(
                    state,
                    ReducerPayload {
                        kind: instruction.kind().to_string(),
                        payload,
                    },
                );
                Ok(())
            },
        );

        self.updates.push(DeclaredReducer {
            name: update.into(),
            payload_type: TypeId::of::<P>(),
            payload_type_name: type_name::<P>(),
            reducer,
        });
        self
    }

    /// Validate the declarations and produce the slice plus its update functions.
    pub fn build(self) -> Result<SliceResult<S>, SliceError> {
        if self.name.is_empty() {
            return Err(SliceError::InvalidName);
        }
        let name: Arc<str> = Arc::from(self.name);

        let mut reducers = BTreeMap::new();
        let mut updates = BTreeMap::new();
        for declared in self.updates {
            if declared.name.is_empty() || declared.name.contains('/') {
                return Err(SliceError::InvalidUpdateName(declared.name));
            }
            if reducers.contains_key(&declared.name) {
                return Err(SliceError::DuplicateUpdate {
                    slice: name.to_string(),
                    update: declared.name,
                });
            }
            updates.insert(
                declared.name.clone(),
                DeclaredUpdate {
                    kind: Arc::from(format!("{}/{}", name, declared.name)),
                    payload_type: declared.payload_type,
                    payload_type_name: declared.payload_type_name,
                },
            );
            reducers.insert(declared.name, declared.reducer);
        }

        let reducer = Reducer::new(Arc::clone(&name), reducers);
        Ok(SliceResult {
            slice: Slice::new(name, self.initial_state, reducer),
            updates,
        })
    }
}

#[derive(Debug, Clone)]
struct DeclaredUpdate {
    kind: Arc<str>,
    payload_type: TypeId,
    payload_type_name: &'static str,
}

/// The slice plus one update function per declared update name.
pub struct SliceResult<S> {
    /// The registrable part: name, reducer and initial state.
    pub slice: Slice<S>,
    updates: BTreeMap<String, DeclaredUpdate>,
}

impl<S> SliceResult<S> {
    /// The typed update function declared as `name`.
    pub fn update<P>(&self, name: &str) -> Result<UpdateFn<P>, SliceError>
    where
        P: Serialize + 'static,
    {
        let declared = self
            .updates
            .get(name)
            .ok_or_else(|| SliceError::UnknownUpdate {
                slice: self.slice.name().to_string(),
                update: name.to_string(),
            })?;
        if declared.payload_type != TypeId::of::<P>() {
            return Err(SliceError::PayloadType {
                kind: declared.kind.to_string(),
                expected: declared.payload_type_name,
                found: type_name::<P>(),
            });
        }
        Ok(UpdateFn {
            kind: Arc::clone(&declared.kind),
            _payload: PhantomData,
        })
    }

    /// Declared update names, sorted.
    pub fn update_names(&self) -> impl Iterator<Item = &str> {
        self.updates.keys().map(String::as_str)
    }

    /// Whether an update named `name` was declared.
    pub fn has_update(&self, name: &str) -> bool {
        self.updates.contains_key(name)
    }

    /// Split off the registrable slice.
    pub fn into_slice(self) -> Slice<S> {
        self.slice
    }
}

impl<S: fmt::Debug> fmt::Debug for SliceResult<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceResult")
            .field("slice", &self.slice)
            .field("updates", &self.updates.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Turns a payload into an [`Instruction`] for one update of one slice.
pub struct UpdateFn<P> {
    kind: Arc<str>,
    _payload: PhantomData<fn(P)>,
}

impl<P: Serialize> UpdateFn<P> {
    /// Build the instruction carrying `payload`.
    pub fn call(&self, payload: P) -> Result<Instruction, SliceError> {
        let payload = serde_json::to_value(payload).map_err(|source| SliceError::Payload {
            kind: self.kind.to_string(),
            source,
        })?;
        Ok(Instruction::new(&*self.kind, payload))
    }

    /// The `"<slice>/<update>"` kind of the instructions this builds.
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl<P> Clone for UpdateFn<P> {
    fn clone(&self) -> Self {
        Self {
            kind: Arc::clone(&self.kind),
            _payload: PhantomData,
        }
    }
}

impl<P> fmt::Debug for UpdateFn<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateFn")
            .field("kind", &self.kind)
            .field("payload", &type_name::<P>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: i64,
    }

    fn increment(state: &mut Counter, _: ReducerPayload<()>) {
        state.count += 1;
    }

    fn add(state: &mut Counter, action: ReducerPayload<i64>) {
        state.count += action.payload;
    }

    fn counter() -> SliceResult<Counter> {
        create_slice("counter", Counter { count: 0 })
            .reducer("increment", increment)
            .reducer("add", add)
            .build()
            .unwrap()
    }

    #[test]
    fn result_exposes_exactly_declared_updates() {
        let result = counter();
        assert_eq!(result.slice.name(), "counter");
        assert_eq!(result.update_names().collect::<Vec<_>>(), vec!["add", "increment"]);
        assert!(!result.has_update("reset"));
        assert!(matches!(
            result.update::<()>("reset"),
            Err(SliceError::UnknownUpdate { .. })
        ));
    }

    #[test]
    fn reducer_matches_direct_invocation() {
        let result = counter();
        let instruction = result.update::<i64>("add").unwrap().call(5).unwrap();

        let mut via_reducer = result.slice.initial_state().clone();
        assert!(result.slice.reducer().reduce(&mut via_reducer, &instruction).unwrap());

        let mut direct = result.slice.initial_state().clone();
        add(
            &mut direct,
            ReducerPayload {
                kind: "counter/add".to_string(),
                payload: 5,
            },
        );

        assert_eq!(via_reducer, direct);
        assert_eq!(via_reducer, Counter { count: 5 });
    }

    #[test]
    fn update_fn_checks_payload_type() {
        let result = counter();
        assert!(matches!(
            result.update::<String>("add"),
            Err(SliceError::PayloadType { .. })
        ));
        let increment = result.update::<()>("increment").unwrap();
        let instruction = increment.call(()).unwrap();
        assert_eq!(instruction.kind(), "counter/increment");
        assert_eq!(instruction.payload(), &json!(null));
    }

    #[test]
    fn foreign_and_unknown_instructions_are_ignored() {
        let result = counter();
        let mut state = Counter { count: 3 };

        let foreign = Instruction::new("other/increment", json!(null));
        assert!(!result.slice.reducer().reduce(&mut state, &foreign).unwrap());

        let unknown = Instruction::new("counter/reset", json!(null));
        assert!(!result.slice.reducer().reduce(&mut state, &unknown).unwrap());
        assert!(!result.slice.reducer().handles(&unknown));

        assert_eq!(state, Counter { count: 3 });
    }

    #[test]
    fn malformed_payload_leaves_state_untouched() {
        let result = counter();
        let mut state = Counter { count: 3 };
        let bad = Instruction::new("counter/add", json!("five"));
        let err = result.slice.reducer().reduce(&mut state, &bad).unwrap_err();
        assert!(matches!(err, SliceError::Payload { .. }));
        assert_eq!(state, Counter { count: 3 });
    }

    #[test]
    fn build_rejects_bad_declarations() {
        assert!(matches!(
            create_slice("", Counter { count: 0 }).build(),
            Err(SliceError::InvalidName)
        ));
        assert!(matches!(
            create_slice("counter", Counter { count: 0 })
                .reducer("a/b", increment)
                .build(),
            Err(SliceError::InvalidUpdateName(name)) if name == "a/b"
        ));
        assert!(matches!(
            create_slice("counter", Counter { count: 0 })
                .reducer("increment", increment)
                .reducer("increment", increment)
                .build(),
            Err(SliceError::DuplicateUpdate { .. })
        ));
    }

    #[test]
    fn nested_slice_names_route_by_last_segment() {
        let result = create_slice("chat/threads", Counter { count: 0 })
            .reducer("increment", increment)
            .build()
            .unwrap();
        let instruction = result.update::<()>("increment").unwrap().call(()).unwrap();
        let mut state = Counter { count: 0 };
        assert!(result.slice.reducer().reduce(&mut state, &instruction).unwrap());
        assert_eq!(state.count, 1);
    }
}
