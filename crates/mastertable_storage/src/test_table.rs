//! Mutable fixture tables.
//!
//! A [`TestTable`] accepts direct writes and rebuilds its derived state
//! (`all`, group indices, the class cache) lazily on the next read after a
//! write marked it dirty.

use std::fmt;
use std::sync::Arc;

use mastertable_foundation::{Frozen, RecordId};
use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use crate::cache::{ClassCache, MethodCache};
use crate::catalog::{Catalog, ClassId};
use crate::index::{GroupIndex, GroupIndices, IdIndex, build_groups};
use crate::record::Record;
use crate::store::RecordStore;

/// A fixture table with dirty-flag-gated index maintenance.
pub struct TestTable {
    class: ClassId,
    class_name: Arc<str>,
    group_keys: Vec<Arc<str>>,
    state: RwLock<State>,
    method_cache: MethodCache,
}

#[derive(Clone, Default)]
struct State {
    id_hash: IdIndex,
    all: Frozen<Record>,
    grouped: GroupIndices,
    class_cache: Option<Arc<ClassCache>>,
    generation: u64,
    all_dirty: bool,
    grouped_dirty: bool,
    class_cache_dirty: bool,
}

impl State {
    fn touch(&mut self) {
        self.generation += 1;
        self.all_dirty = true;
        self.grouped_dirty = true;
        self.class_cache_dirty = true;
    }

    fn refresh_all(&mut self) {
        if self.all_dirty {
            self.all = self.id_hash.values().cloned().collect();
            self.all_dirty = false;
        }
    }

    fn refresh_grouped(&mut self, group_keys: &[Arc<str>]) {
        self.refresh_all();
        if self.grouped_dirty {
            self.grouped = build_groups(&self.all, group_keys);
            self.grouped_dirty = false;
        }
    }
}

impl TestTable {
    /// Creates an empty fixture table for `class`.
    #[must_use]
    pub fn new(catalog: &Catalog, class: ClassId) -> Self {
        let def = catalog.class(class);
        let mut state = State::default();
        state.touch();
        Self {
            class,
            class_name: Arc::clone(def.name_arc()),
            group_keys: def.layout().group_keys().cloned().collect(),
            state: RwLock::new(state),
            method_cache: MethodCache::new(),
        }
    }

    /// Inserts or replaces a record, returning the one it replaced.
    pub fn insert(&self, record: Record) -> Option<Record> {
        let id = record.id();
        self.update(id, record)
    }

    /// Stores `record` under `id`, returning the one it replaced.
    pub fn update(&self, id: RecordId, record: Record) -> Option<Record> {
        let mut state = self.state.write();
        state.touch();
        state.id_hash.insert(id, record)
    }

    /// Removes the record with `id`.
    pub fn remove(&self, id: RecordId) -> Option<Record> {
        let mut state = self.state.write();
        let removed = state.id_hash.shift_remove(&id);
        if removed.is_some() {
            state.touch();
        }
        removed
    }

    /// Marks group indices and the class cache stale without touching the
    /// record list.
    pub fn record_updated(&self) {
        let mut state = self.state.write();
        state.generation += 1;
        state.grouped_dirty = true;
        state.class_cache_dirty = true;
    }

    /// Replaces every record at once.
    pub fn set_all(&self, records: impl IntoIterator<Item = Record>) {
        let mut state = self.state.write();
        state.id_hash = records.into_iter().map(|r| (r.id(), r)).collect();
        state.touch();
    }

    /// Removes every record.
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.id_hash.clear();
        state.touch();
    }

    /// Returns an independent copy holding the same records.
    ///
    /// Caches are not carried over.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        let mut state = self.state.read().clone();
        state.class_cache = None;
        state.class_cache_dirty = true;
        Self {
            class: self.class,
            class_name: Arc::clone(&self.class_name),
            group_keys: self.group_keys.clone(),
            state: RwLock::new(state),
            method_cache: MethodCache::new(),
        }
    }

    /// Returns the class-level cache, recomputing it after writes.
    ///
    /// `compute` runs without the table lock held, so it may read this
    /// table. A write that lands while it runs leaves the cache dirty.
    pub fn class_cache(&self, compute: impl FnOnce() -> ClassCache) -> Arc<ClassCache> {
        let generation = {
            let state = self.state.read();
            if let (false, Some(cache)) = (state.class_cache_dirty, &state.class_cache) {
                return Arc::clone(cache);
            }
            state.generation
        };

        let cache = Arc::new(compute());
        let mut state = self.state.write();
        if state.generation == generation {
            state.class_cache = Some(Arc::clone(&cache));
            state.class_cache_dirty = false;
        }
        cache
    }

    /// Returns the per-record cache.
    #[must_use]
    pub fn method_cache(&self) -> &MethodCache {
        &self.method_cache
    }
}

impl RecordStore for TestTable {
    fn class(&self) -> ClassId {
        self.class
    }

    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn all(&self) -> Frozen<Record> {
        let state = self.state.upgradable_read();
        if !state.all_dirty {
            return state.all.clone();
        }
        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        state.refresh_all();
        state.all.clone()
    }

    fn find_by_id(&self, id: RecordId) -> Option<Record> {
        self.state.read().id_hash.get(&id).cloned()
    }

    fn group_index(&self, column: &str) -> Option<Arc<GroupIndex>> {
        let state = self.state.upgradable_read();
        if !state.grouped_dirty {
            return state.grouped.get(column).cloned();
        }
        let mut state = RwLockUpgradableReadGuard::upgrade(state);
        state.refresh_grouped(&self.group_keys);
        state.grouped.get(column).cloned()
    }

    fn len(&self) -> usize {
        self.state.read().id_hash.len()
    }
}

impl fmt::Debug for TestTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("TestTable")
            .field("class", &self.class_name)
            .field("records", &state.id_hash.len())
            .field("all_dirty", &state.all_dirty)
            .field("grouped_dirty", &state.grouped_dirty)
            .finish_non_exhaustive()
    }
}
