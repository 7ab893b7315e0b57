use crate::effect::Effects;
use crate::error::StoreError;
use crate::event::EventBus;
use crate::slice::Slice;
use crate::store::{AppDispatch, Store, StoreConfig};
use crate::sync::{read, write};
use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, RwLock};

/// A store context paired with the event bus its effects listen on.
///
/// One runtime can be installed process-wide with [`create_store`]; scoped
/// runtimes pushed with [`StoreRuntime::scope`] or
/// [`StoreRuntime::with_runtime`] shadow it on the current thread. The free
/// functions in this module always act on the current runtime.
///
/// # Examples
///
/// Using a scoped runtime for isolation:
///
/// ```
/// use hai3_state::runtime::{get_registered_slices, get_store, StoreRuntime};
///
/// StoreRuntime::scope(|| {
///     let store = get_store().unwrap();
///     assert!(store.registered_slices().is_empty());
///     assert!(get_registered_slices().is_empty());
/// });
/// // The scoped store and its bus are dropped here
/// ```
pub struct StoreRuntime {
    store: Store,
    event_bus: EventBus,
}

thread_local! {
    static RUNTIME_STACK: RefCell<Vec<Arc<StoreRuntime>>> = const { RefCell::new(Vec::new()) };
}

static GLOBAL_RUNTIME: RwLock<Option<Arc<StoreRuntime>>> = RwLock::new(None);

impl StoreRuntime {
    /// Create a new runtime with a fresh store and bus.
    pub fn new(config: StoreConfig) -> Arc<Self> {
        Arc::new(StoreRuntime {
            store: Store::new(config),
            event_bus: EventBus::new(),
        })
    }

    /// Run `f` with a fresh isolated runtime as the current one.
    ///
    /// The runtime and all of its state is dropped when `f` returns.
    pub fn scope<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        Self::with_runtime(Self::new(StoreConfig::default()), f)
    }

    /// Run `f` with `runtime` as the current runtime on this thread.
    pub fn with_runtime<F, R>(runtime: Arc<Self>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().push(runtime);
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        RUNTIME_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });

        match result {
            Ok(r) => r,
            Err(e) => std::panic::resume_unwind(e),
        }
    }

    /// The innermost scoped runtime, or the process-wide one.
    pub fn current() -> Option<Arc<Self>> {
        RUNTIME_STACK
            .with(|stack| stack.borrow().last().cloned())
            .or_else(|| read(&GLOBAL_RUNTIME).clone())
    }

    /// The runtime's store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The bus this runtime's effects subscribe on.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Drop all slices, effects, listeners and event handlers.
    pub fn reset(&self) {
        self.store.reset();
        self.event_bus.clear_all();
    }
}

impl fmt::Debug for StoreRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRuntime")
            .field("store", &self.store)
            .field("event_bus", &self.event_bus)
            .finish()
    }
}

fn current() -> Result<Arc<StoreRuntime>, StoreError> {
    StoreRuntime::current().ok_or(StoreError::NotCreated)
}

/// Install a new process-wide runtime and return its store.
///
/// An existing process-wide runtime is reset and replaced.
pub fn create_store(config: StoreConfig) -> Store {
    let runtime = StoreRuntime::new(config);
    let store = runtime.store.clone();
    let previous = write(&GLOBAL_RUNTIME).replace(runtime);
    if let Some(previous) = previous {
        tracing::warn!(store = %previous.store.config().label, "replacing existing store");
        previous.reset();
    }
    store
}

/// The current store.
pub fn get_store() -> Result<Store, StoreError> {
    Ok(current()?.store.clone())
}

/// The event bus of the current runtime.
pub fn event_bus() -> Result<EventBus, StoreError> {
    Ok(current()?.event_bus.clone())
}

/// Register `slice` on the current store.
pub fn register_slice<S>(slice: Slice<S>) -> Result<(), StoreError>
where
    S: Clone + Serialize + Send + Sync + 'static,
{
    current()?.store.register_slice(slice)
}

/// Register `slice` on the current store; `init` receives the store's
/// dispatcher and the runtime's event bus.
pub fn register_slice_with_effects<S, F>(slice: Slice<S>, init: F) -> Result<(), StoreError>
where
    S: Clone + Serialize + Send + Sync + 'static,
    F: FnOnce(AppDispatch, EventBus) -> Effects + 'static,
{
    let runtime = current()?;
    let bus = runtime.event_bus.clone();
    runtime
        .store
        .register_slice_with_effects(slice, move |dispatch| init(dispatch, bus))
}

/// Unregister `name` from the current store. Returns whether it was registered.
pub fn unregister_slice(name: &str) -> Result<bool, StoreError> {
    current()?.store.unregister_slice(name)
}

/// `false` when no store has been created.
pub fn has_slice(name: &str) -> bool {
    StoreRuntime::current().map_or(false, |runtime| runtime.store.has_slice(name))
}

/// Empty when no store has been created.
pub fn get_registered_slices() -> Vec<String> {
    StoreRuntime::current()
        .map(|runtime| runtime.store.registered_slices())
        .unwrap_or_default()
}

/// Reset the current runtime's store and event bus.
pub fn reset_store() -> Result<(), StoreError> {
    current()?.reset();
    Ok(())
}

/// Reset and uninstall the process-wide runtime. Returns whether one existed.
///
/// Store handles obtained earlier stay valid but empty.
pub fn teardown_store() -> bool {
    let previous = write(&GLOBAL_RUNTIME).take();
    match previous {
        Some(runtime) => {
            runtime.reset();
            tracing::debug!(store = %runtime.store.config().label, "store torn down");
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::{create_slice, ReducerPayload};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Flag {
        on: bool,
    }

    fn flag() -> Slice<Flag> {
        create_slice("flag", Flag { on: false })
            .reducer("set", |state: &mut Flag, action: ReducerPayload<bool>| {
                state.on = action.payload;
            })
            .build()
            .unwrap()
            .into_slice()
    }

    #[test]
    fn scopes_are_isolated() {
        StoreRuntime::scope(|| {
            register_slice(flag()).unwrap();
            assert!(has_slice("flag"));

            StoreRuntime::scope(|| {
                assert!(!has_slice("flag"));
                assert!(get_registered_slices().is_empty());
            });

            assert_eq!(get_registered_slices(), vec!["flag".to_string()]);
            assert!(unregister_slice("flag").unwrap());
            assert!(!has_slice("flag"));
        });
    }

    #[test]
    fn with_runtime_shares_an_explicit_runtime() {
        let runtime = StoreRuntime::new(StoreConfig::default().with_label("explicit"));

        StoreRuntime::with_runtime(runtime.clone(), || {
            register_slice(flag()).unwrap();
        });

        assert!(runtime.store().has_slice("flag"));
        runtime.reset();
        assert!(!runtime.store().has_slice("flag"));
    }

    #[test]
    fn effects_receive_the_runtime_bus() {
        StoreRuntime::scope(|| {
            let result = create_slice("flag", Flag { on: false })
                .reducer("set", |state: &mut Flag, action: ReducerPayload<bool>| {
                    state.on = action.payload;
                })
                .build()
                .unwrap();
            let set = result.update::<bool>("set").unwrap();

            register_slice_with_effects(result.slice, move |dispatch, bus| {
                Effects::new().with(bus.on("flag/toggled", move |on: &bool| {
                    if let Ok(instruction) = set.call(*on) {
                        let _ = dispatch.dispatch(&instruction);
                    }
                }))
            })
            .unwrap();

            event_bus().unwrap().emit("flag/toggled", true).unwrap();
            let store = get_store().unwrap();
            assert_eq!(store.select::<Flag>("flag").unwrap(), Flag { on: true });

            reset_store().unwrap();
            assert_eq!(event_bus().unwrap().handler_count("flag/toggled"), 0);
        });
    }
}
