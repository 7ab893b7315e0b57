use super::config::{DuplicatePolicy, StoreConfig};
use crate::effect::{EffectInitializer, Effects};
use crate::error::{SliceError, StoreError};
use crate::slice::{Instruction, Slice};
use crate::sync::{read, write};
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};

/// Snapshot of every registered slice's state, keyed by slice name.
pub type RootState = Value;

type Listener = Arc<dyn Fn(&RootState) + Send + Sync>;

/// A registered slice with its live state, erased over the state type.
trait RegisteredSlice: Send + Sync {
    fn registration(&self) -> u64;
    fn apply(&mut self, instruction: &Instruction) -> Result<bool, SliceError>;
    fn snapshot(&self) -> Result<Value, serde_json::Error>;
    fn state(&self) -> &dyn Any;
    fn attach_effects(&mut self, effects: Effects);
    fn effect_count(&self) -> usize;
}

struct Entry<S> {
    registration: u64,
    slice: Slice<S>,
    state: S,
    effects: Effects,
}

impl<S> RegisteredSlice for Entry<S>
where
    S: Clone + Serialize + Send + Sync + 'static,
{
    fn registration(&self) -> u64 {
        self.registration
    }

    fn apply(&mut self, instruction: &Instruction) -> Result<bool, SliceError> {
        let reducer = self.slice.reducer();
        if !reducer.handles(instruction) {
            return Ok(false);
        }
        // Updates run on a draft; a failing or panicking update leaves the live state intact.
        let mut draft = self.state.clone();
        let handled = reducer.reduce(&mut draft, instruction)?;
        if handled {
            self.state = draft;
        }
        Ok(handled)
    }

    fn snapshot(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(&self.state)
    }

    fn state(&self) -> &dyn Any {
        &self.state
    }

    fn attach_effects(&mut self, effects: Effects) {
        self.effects = effects;
    }

    fn effect_count(&self) -> usize {
        self.effects.len()
    }
}

#[derive(Default)]
struct StoreInner {
    slices: BTreeMap<String, Box<dyn RegisteredSlice>>,
    listeners: Vec<(u64, Listener)>,
    next_registration: u64,
    next_listener: u64,
}

/// The store context: a registry of slices and their live state.
///
/// `Store` is a shared handle; clones see the same slices. Slices are added
/// and removed at runtime, and instructions are routed to the slice named in
/// their kind.
///
/// # Examples
///
/// ```
/// use hai3_state::{create_slice, ReducerPayload, Store};
/// use serde::{Deserialize, Serialize};
/// use serde_json::json;
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Counter {
///     count: i32,
/// }
///
/// let counter = create_slice("counter", Counter { count: 0 })
///     .reducer("increment", |state: &mut Counter, _: ReducerPayload<()>| state.count += 1)
///     .build()
///     .unwrap();
/// let increment = counter.update::<()>("increment").unwrap();
///
/// let store = Store::default();
/// store.register_slice(counter.slice).unwrap();
/// store.dispatch(&increment.call(()).unwrap()).unwrap();
///
/// assert_eq!(store.state().unwrap(), json!({ "counter": { "count": 1 } }));
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<RwLock<StoreInner>>,
    config: Arc<StoreConfig>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl Store {
    /// Create an empty store.
    pub fn new(config: StoreConfig) -> Self {
        tracing::debug!(store = %config.label, "store created");
        Self {
            inner: Arc::new(RwLock::new(StoreInner::default())),
            config: Arc::new(config),
        }
    }

    /// The configuration this store was created with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Register `slice`, starting from its initial state.
    ///
    /// Fails with [`StoreError::Snapshot`], leaving the store untouched, when
    /// the initial state cannot be serialized.
    pub fn register_slice<S>(&self, slice: Slice<S>) -> Result<(), StoreError>
    where
        S: Clone + Serialize + Send + Sync + 'static,
    {
        self.register(slice, None)
    }

    /// Register `slice` and run `init` to wire its effects.
    ///
    /// `init` runs after the slice is in place and without any store lock
    /// held, so it may dispatch immediately.
    pub fn register_slice_with_effects<S, F>(&self, slice: Slice<S>, init: F) -> Result<(), StoreError>
    where
        S: Clone + Serialize + Send + Sync + 'static,
        F: FnOnce(AppDispatch) -> Effects + 'static,
    {
        self.register(slice, Some(Box::new(init)))
    }

    fn register<S>(&self, slice: Slice<S>, init: Option<EffectInitializer>) -> Result<(), StoreError>
    where
        S: Clone + Serialize + Send + Sync + 'static,
    {
        let name = slice.name().to_string();
        serde_json::to_value(slice.initial_state()).map_err(|source| StoreError::Snapshot {
            name: name.clone(),
            source,
        })?;

        let (registration, replaced) = {
            let mut inner = write(&self.inner);
            let replaced = if inner.slices.contains_key(&name) {
                match self.config.on_duplicate {
                    DuplicatePolicy::Reject => return Err(StoreError::DuplicateSlice(name)),
                    DuplicatePolicy::Ignore => {
                        tracing::warn!(store = %self.config.label, slice = %name, "slice already registered, ignoring");
                        return Ok(());
                    }
                    DuplicatePolicy::Replace => inner.slices.remove(&name),
                }
            } else {
                None
            };

            let registration = inner.next_registration;
            inner.next_registration += 1;
            let entry = Entry {
                registration,
                state: slice.initial_state().clone(),
                slice,
                effects: Effects::new(),
            };
            inner.slices.insert(name.clone(), Box::new(entry));
            (registration, replaced)
        };

        if replaced.is_some() {
            tracing::warn!(store = %self.config.label, slice = %name, "slice replaced");
        }
        drop(replaced);
        tracing::debug!(store = %self.config.label, slice = %name, "slice registered");

        if let Some(init) = init {
            let effects = init(self.dispatcher());
            let mut inner = write(&self.inner);
            match inner.slices.get_mut(&name) {
                Some(entry) if entry.registration() == registration => {
                    entry.attach_effects(effects);
                    tracing::debug!(slice = %name, effects = entry.effect_count(), "effects attached");
                }
                // Unregistered while its effects were being set up; they drop here.
                _ => {}
            }
        }

        self.notify();
        Ok(())
    }

    /// Remove a slice together with its state and effects.
    ///
    /// Returns whether the slice was registered. A later registration under
    /// the same name starts again from that slice's initial state.
    pub fn unregister_slice(&self, name: &str) -> Result<bool, StoreError> {
        let removed = write(&self.inner).slices.remove(name);
        match removed {
            Some(entry) => {
                drop(entry);
                tracing::debug!(store = %self.config.label, slice = %name, "slice unregistered");
                self.notify();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether a slice named `name` is registered.
    pub fn has_slice(&self, name: &str) -> bool {
        read(&self.inner).slices.contains_key(name)
    }

    /// Names of all registered slices, sorted.
    pub fn registered_slices(&self) -> Vec<String> {
        read(&self.inner).slices.keys().cloned().collect()
    }

    /// Route `instruction` to the slice named in its kind.
    ///
    /// Returns whether a slice handled it. Instructions for unregistered
    /// slices or undeclared updates are ignored. The update runs on a copy of
    /// the slice state that replaces it only once the update completes.
    pub fn dispatch(&self, instruction: &Instruction) -> Result<bool, StoreError> {
        let handled = {
            let mut inner = write(&self.inner);
            let entry = match instruction.slice_name() {
                Some(name) => inner.slices.get_mut(name),
                None => None,
            };
            match entry {
                Some(entry) => entry.apply(instruction)?,
                None => false,
            }
        };

        tracing::debug!(store = %self.config.label, kind = instruction.kind(), handled, "dispatch");
        if handled || self.config.notify_unhandled {
            self.notify();
        }
        Ok(handled)
    }

    /// Snapshot of the whole store as a JSON object.
    pub fn state(&self) -> Result<RootState, StoreError> {
        let inner = read(&self.inner);
        let mut root = Map::new();
        for (name, entry) in &inner.slices {
            let value = entry.snapshot().map_err(|source| StoreError::Snapshot {
                name: name.clone(),
                source,
            })?;
            root.insert(name.clone(), value);
        }
        Ok(Value::Object(root))
    }

    /// Clone out the typed state of one slice.
    pub fn select<S>(&self, name: &str) -> Result<S, StoreError>
    where
        S: Clone + 'static,
    {
        self.with_slice(name, |state: &S| state.clone())
    }

    /// Read the typed state of one slice in place.
    ///
    /// The store is read-locked while `f` runs; `f` must not dispatch.
    pub fn with_slice<S, R>(&self, name: &str, f: impl FnOnce(&S) -> R) -> Result<R, StoreError>
    where
        S: 'static,
    {
        let inner = read(&self.inner);
        let entry = inner
            .slices
            .get(name)
            .ok_or_else(|| StoreError::UnknownSlice(name.to_string()))?;
        let state = entry
            .state()
            .downcast_ref::<S>()
            .ok_or_else(|| StoreError::StateType {
                name: name.to_string(),
                requested: type_name::<S>(),
            })?;
        Ok(f(state))
    }

    /// Call `listener` with a fresh snapshot after every state change.
    pub fn subscribe<F>(&self, listener: F) -> StoreSubscription
    where
        F: Fn(&RootState) + Send + Sync + 'static,
    {
        let mut inner = write(&self.inner);
        let id = inner.next_listener;
        inner.next_listener += 1;
        inner.listeners.push((id, Arc::new(listener)));
        StoreSubscription {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    /// A weak dispatch handle for effects.
    pub fn dispatcher(&self) -> AppDispatch {
        AppDispatch {
            inner: Arc::downgrade(&self.inner),
            config: Arc::clone(&self.config),
        }
    }

    /// Drop every slice, their effects and all listeners.
    pub fn reset(&self) {
        let (slices, listeners) = {
            let mut inner = write(&self.inner);
            (
                std::mem::take(&mut inner.slices),
                std::mem::take(&mut inner.listeners),
            )
        };
        tracing::debug!(store = %self.config.label, slices = slices.len(), listeners = listeners.len(), "store reset");
    }

    /// Runs after a change is committed, so a snapshot failure is logged
    /// rather than reported to the caller.
    fn notify(&self) {
        let listeners: Vec<Listener> = read(&self.inner)
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        if listeners.is_empty() {
            return;
        }

        let state = match self.state() {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(store = %self.config.label, error = %err, "skipping listeners, state snapshot failed");
                return;
            }
        };
        for listener in &listeners {
            listener(&state);
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = read(&self.inner);
        f.debug_struct("Store")
            .field("label", &self.config.label)
            .field("slices", &inner.slices.keys().collect::<Vec<_>>())
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

/// A dispatch handle that does not keep the store alive.
#[derive(Clone)]
pub struct AppDispatch {
    inner: Weak<RwLock<StoreInner>>,
    config: Arc<StoreConfig>,
}

impl AppDispatch {
    /// The store behind this handle, if it is still alive.
    pub fn store(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store {
            inner,
            config: Arc::clone(&self.config),
        })
    }

    /// Dispatch into the store, failing once it has been dropped.
    pub fn dispatch(&self, instruction: &Instruction) -> Result<bool, StoreError> {
        self.store()
            .ok_or(StoreError::StoreDropped)?
            .dispatch(instruction)
    }
}

impl fmt::Debug for AppDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppDispatch")
            .field("label", &self.config.label)
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// RAII guard for a store listener.
#[must_use = "dropping a StoreSubscription removes its listener"]
pub struct StoreSubscription {
    id: u64,
    store: Weak<RwLock<StoreInner>>,
}

impl StoreSubscription {
    /// Remove the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        if let Some(store) = self.store.upgrade() {
            write(&store).listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for StoreSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSubscription").field("id", &self.id).finish()
    }
}
