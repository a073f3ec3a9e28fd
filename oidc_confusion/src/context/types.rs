use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::barrier::{Abandon, Barrier};

use super::errors::ContextError;

/// Name of a context entry that statically carries the entry's value type.
pub struct ContextKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for ContextKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextKey<T> {}

impl<T> std::fmt::Debug for ContextKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContextKey({})", self.name)
    }
}

type Entry = Arc<dyn Any + Send + Sync>;

/// Extensible key/value bag shared between concurrently running actors.
///
/// Typed values and plain string parameters live side by side. Every
/// individual operation is atomic; sequences of operations are not.
#[derive(Default)]
pub struct ContextMap {
    values: RwLock<HashMap<&'static str, Entry>>,
    params: RwLock<HashMap<String, String>>,
}

impl ContextMap {
    pub fn with_params(params: HashMap<String, String>) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            params: RwLock::new(params),
        }
    }

    pub fn insert<T: Any + Send + Sync>(&self, key: ContextKey<T>, value: T) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.name, Arc::new(value));
    }

    /// Insert only when the key is vacant. Returns whether the value was stored.
    pub fn insert_if_absent<T: Any + Send + Sync>(&self, key: ContextKey<T>, value: T) -> bool {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        if values.contains_key(key.name) {
            return false;
        }
        values.insert(key.name, Arc::new(value));
        true
    }

    pub fn get<T: Any + Send + Sync + Clone>(&self, key: ContextKey<T>) -> Option<T> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        let entry = values.get(key.name)?;
        match entry.as_ref().downcast_ref::<T>() {
            Some(value) => Some(value.clone()),
            None => {
                tracing::warn!("Context entry '{}' holds an unexpected type", key.name);
                None
            }
        }
    }

    pub fn get_or<T: Any + Send + Sync + Clone>(&self, key: ContextKey<T>, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn require<T: Any + Send + Sync + Clone>(
        &self,
        key: ContextKey<T>,
    ) -> Result<T, ContextError> {
        self.get(key)
            .ok_or_else(|| ContextError::Missing(key.name.to_string()))
    }

    pub fn get_or_insert_with<T: Any + Send + Sync + Clone>(
        &self,
        key: ContextKey<T>,
        init: impl FnOnce() -> T,
    ) -> T {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(value) = values
            .get(key.name)
            .and_then(|entry| entry.as_ref().downcast_ref::<T>())
        {
            return value.clone();
        }
        let value = init();
        values.insert(key.name, Arc::new(value.clone()));
        value
    }

    pub fn contains<T>(&self, key: ContextKey<T>) -> bool {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key.name)
    }

    pub fn remove<T>(&self, key: ContextKey<T>) -> bool {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key.name)
            .is_some()
    }

    pub fn set_param(&self, name: &str, value: impl Into<String>) {
        self.params
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), value.into());
    }

    pub fn param(&self, name: &str) -> Option<String> {
        self.params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// `true` only for a case-insensitive "true" value.
    pub fn param_bool(&self, name: &str) -> bool {
        self.param(name)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }

    pub fn require_param(&self, name: &str) -> Result<String, ContextError> {
        self.param(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ContextError::Missing(name.to_string()))
    }

    /// Snapshot of all string parameters.
    pub fn params(&self) -> HashMap<String, String> {
        self.params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// State that outlives a single step, owned by the test object.
#[derive(Default)]
pub struct SuiteContext {
    map: ContextMap,
}

impl SuiteContext {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Deref for SuiteContext {
    type Target = ContextMap;

    fn deref(&self) -> &ContextMap {
        &self.map
    }
}

/// State of exactly one step execution, including its barriers.
#[derive(Default)]
pub struct StepContext {
    map: ContextMap,
    barriers: Mutex<Vec<Box<dyn Abandon>>>,
}

impl StepContext {
    pub fn new(params: HashMap<String, String>) -> Self {
        Self {
            map: ContextMap::with_params(params),
            barriers: Mutex::new(Vec::new()),
        }
    }

    /// Barrier stored under `key`, created on first use.
    ///
    /// Producers and consumers may call this in any order and always end up
    /// with the same cell.
    pub fn barrier<T: Clone + Send + Sync + 'static>(
        &self,
        key: ContextKey<Barrier<T>>,
    ) -> Barrier<T> {
        let mut created = None;
        let barrier = self.map.get_or_insert_with(key, || {
            let barrier = Barrier::new(key.name());
            created = Some(barrier.clone());
            barrier
        });
        if let Some(new_barrier) = created {
            self.track(Box::new(new_barrier));
        }
        barrier
    }

    /// Replace the barrier under `key` with a new pending one. A previous
    /// pending barrier is abandoned so nobody keeps waiting on it.
    pub fn fresh_barrier<T: Clone + Send + Sync + 'static>(
        &self,
        key: ContextKey<Barrier<T>>,
    ) -> Barrier<T> {
        if let Some(previous) = self.map.get(key) {
            Abandon::abandon(&previous);
        }
        let barrier = Barrier::new(key.name());
        self.map.insert(key, barrier.clone());
        self.track(Box::new(barrier.clone()));
        barrier
    }

    /// Settle every still-pending barrier of this step as abandoned.
    /// Returns how many were released.
    pub fn abandon_barriers(&self) -> usize {
        let barriers = self.barriers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut released = 0;
        for barrier in barriers.iter() {
            if barrier.abandon() {
                tracing::debug!("Released pending barrier '{}'", barrier.label());
                released += 1;
            }
        }
        released
    }

    fn track(&self, barrier: Box<dyn Abandon>) {
        self.barriers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(barrier);
    }
}

impl Deref for StepContext {
    type Target = ContextMap;

    fn deref(&self) -> &ContextMap {
        &self.map
    }
}
