//! Class-level and per-record cache containers.
//!
//! Both live inside the table they were computed for, so they are dropped
//! exactly when a reload replaces that table.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use mastertable_foundation::Serial;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// A type-erased cached value.
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// Wraps a value for storage in a cache.
#[must_use]
pub fn cache_value<T: Any + Send + Sync>(value: T) -> CacheValue {
    Arc::new(value)
}

/// Aggregates computed once per published table, by name.
#[derive(Clone, Default)]
pub struct ClassCache {
    values: FxHashMap<Arc<str>, CacheValue>,
}

impl ClassCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a named value.
    pub fn insert(&mut self, name: Arc<str>, value: CacheValue) {
        self.values.insert(name, value);
    }

    /// Returns a named value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CacheValue> {
        self.values.get(name)
    }

    /// Returns the number of cached aggregates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ClassCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

/// Lazily computed per-record values, keyed by accessor name and record serial.
#[derive(Default)]
pub struct MethodCache {
    entries: RwLock<FxHashMap<Arc<str>, FxHashMap<Serial, CacheValue>>>,
}

impl MethodCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value, computing it on first access.
    ///
    /// `compute` runs without the lock held. When two callers race, the
    /// first stored value wins and both receive it.
    pub fn get_or_compute(
        &self,
        name: &Arc<str>,
        serial: Serial,
        compute: impl FnOnce() -> CacheValue,
    ) -> CacheValue {
        if let Some(value) = self.get(name, serial) {
            return value;
        }
        let value = compute();
        let mut entries = self.entries.write();
        entries
            .entry(Arc::clone(name))
            .or_default()
            .entry(serial)
            .or_insert(value)
            .clone()
    }

    /// Returns a cached value without computing it.
    #[must_use]
    pub fn get(&self, name: &str, serial: Serial) -> Option<CacheValue> {
        self.entries
            .read()
            .get(name)
            .and_then(|per_record| per_record.get(&serial))
            .cloned()
    }

    /// Returns how many records have a value for `name`.
    #[must_use]
    pub fn len(&self, name: &str) -> usize {
        self.entries.read().get(name).map_or(0, FxHashMap::len)
    }

    /// Drops every cached value.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl fmt::Debug for MethodCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.read();
        f.debug_map()
            .entries(entries.iter().map(|(name, values)| (name, values.len())))
            .finish()
    }
}
