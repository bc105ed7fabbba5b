//! Dataset snapshots.
//!
//! A [`Dataset`] is one consistent view of every catalog table. Loading never
//! mutates a dataset in place: [`Dataset::load`] builds the next snapshot off
//! to the side and returns it, so readers holding the old one are never
//! affected and a failed load leaves it servable.

use std::any::{Any, type_name};
use std::fmt;
use std::iter;
use std::sync::Arc;
use std::time::Instant;

use mastertable_foundation::{
    Error, ErrorKind, RawPayload, RawValue, RecordId, Result, Value,
};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::cache::{CacheValue, ClassCache, cache_value};
use crate::catalog::{Catalog, ClassDef, ClassId};
use crate::config::DatasetConfig;
use crate::context;
use crate::diff::Overlay;
use crate::loader::{LoadRequest, Loader, MemoryLoader};
use crate::record::{Record, RecordBuilder};
use crate::schema::MethodCacheDef;
use crate::store::{RecordStore, Store};
use crate::table::{LoadOutcome, Table};
use crate::test_table::TestTable;
use crate::validation::{Errors, validate_record};

/// How a dataset's tables are backed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DatasetMode {
    /// Immutable tables published by load passes.
    Loaded,
    /// Mutable fixture tables written directly.
    Fixture,
}

/// One consistent snapshot of every catalog table.
pub struct Dataset {
    catalog: Arc<Catalog>,
    loader: Arc<dyn Loader>,
    config: DatasetConfig,
    mode: DatasetMode,
    tables: im::HashMap<ClassId, Store>,
    diff: Overlay,
    load_targets: Option<Vec<ClassId>>,
    cache: Mutex<FxHashMap<String, CacheValue>>,
}

impl Dataset {
    /// Creates an unloaded dataset reading from `loader`.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>, loader: Arc<dyn Loader>) -> Self {
        let tables = loaded_tables(&catalog);
        Self {
            catalog,
            loader,
            config: DatasetConfig::default(),
            mode: DatasetMode::Loaded,
            tables,
            diff: Overlay::new(),
            load_targets: None,
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// Creates a dataset of empty fixture tables, one per class.
    #[must_use]
    pub fn for_fixtures(catalog: Arc<Catalog>) -> Self {
        let tables = fixture_tables(&catalog);
        Self {
            catalog,
            loader: Arc::new(MemoryLoader::new()),
            config: DatasetConfig::for_test(),
            mode: DatasetMode::Fixture,
            tables,
            diff: Overlay::new(),
            load_targets: None,
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: DatasetConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the diff overlay merged by the next load.
    #[must_use]
    pub fn with_diff(mut self, diff: Overlay) -> Self {
        self.diff = diff;
        self
    }

    /// Sets the diff overlay merged by the next load.
    pub fn set_diff(&mut self, diff: Overlay) {
        self.diff = diff;
    }

    /// Restricts loads to the tables of the named classes.
    ///
    /// Classes resolve to their base class; duplicates collapse.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown class name.
    pub fn set_load_targets(&mut self, classes: &[&str]) -> Result<()> {
        let mut targets = Vec::with_capacity(classes.len());
        for name in classes {
            let base = self.catalog.class(self.catalog.lookup(name)?).base();
            if !targets.contains(&base) {
                targets.push(base);
            }
        }
        self.load_targets = Some(targets);
        Ok(())
    }

    /// Loads every table again.
    pub fn clear_load_targets(&mut self) {
        self.load_targets = None;
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Returns the loader.
    #[must_use]
    pub fn loader(&self) -> &Arc<dyn Loader> {
        &self.loader
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    /// Returns how tables are backed.
    #[must_use]
    pub fn mode(&self) -> DatasetMode {
        self.mode
    }

    /// Returns the diff overlay.
    #[must_use]
    pub fn diff(&self) -> &Overlay {
        &self.diff
    }

    /// Returns the base classes a load pass visits.
    #[must_use]
    pub fn load_targets(&self) -> Vec<ClassId> {
        match &self.load_targets {
            Some(targets) => targets.clone(),
            None => self.catalog.bases().map(ClassDef::id).collect(),
        }
    }

    /// Returns the store of a class.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the class has no table (abstract non-base
    /// classes have none).
    pub fn store(&self, class: ClassId) -> Result<&Store> {
        self.tables.get(&class).ok_or_else(|| {
            Error::not_found(format!("table for {}", self.catalog.class(class).name()))
        })
    }

    /// Returns the store of a class by name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown class or a class without a table.
    pub fn store_by_name(&self, class: &str) -> Result<&Store> {
        self.store(self.catalog.lookup(class)?)
    }

    /// Returns a read scope over one class.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the class has no table.
    pub fn scope(&self, class: ClassId) -> Result<ClassScope<'_>> {
        Ok(ClassScope {
            dataset: self,
            class,
            store: self.store(class)?,
        })
    }

    // =========================================================================
    // Loading
    // =========================================================================

    /// Runs a load pass and returns the resulting snapshot.
    ///
    /// Tables whose payload and diff fragment are unchanged are carried
    /// over as-is, caches included. Class-level and eager per-record caches
    /// are then computed and the catalog's after-load hooks run, all with
    /// the new snapshot active.
    ///
    /// # Errors
    ///
    /// Returns the first table or hook failure. `self` is left untouched.
    pub fn load(&self) -> Result<Arc<Dataset>> {
        let started = Instant::now();
        let targets = self.load_targets();
        let mut tables = match self.mode {
            DatasetMode::Loaded => self.tables.clone(),
            DatasetMode::Fixture => loaded_tables(&self.catalog),
        };

        for &base in &targets {
            let def = self.catalog.class(base);
            let current = match tables.get(&base) {
                Some(Store::Loaded(table)) => Arc::clone(table),
                _ => Arc::new(Table::empty(&self.catalog, base)),
            };
            let request = LoadRequest {
                catalog: &self.catalog,
                class: base,
                config: &self.config,
            };
            let fragment = self.diff.fragment(def.table_name());
            match current.load(&request, self.loader.as_ref(), fragment)? {
                LoadOutcome::Unchanged => {
                    debug!(table = def.table_name(), records = current.len(), changed = false, "table loaded");
                }
                LoadOutcome::Reloaded(table) => {
                    debug!(table = def.table_name(), records = table.len(), changed = true, "table loaded");
                    insert_table(&mut tables, Arc::new(table));
                }
            }
        }
        let load_elapsed = started.elapsed();

        let cache = if self.config.clear_cache_on_load {
            FxHashMap::default()
        } else {
            self.cache.lock().clone()
        };
        let dataset = Arc::new(Self {
            catalog: Arc::clone(&self.catalog),
            loader: Arc::clone(&self.loader),
            config: self.config.clone(),
            mode: DatasetMode::Loaded,
            tables,
            diff: self.diff.clone(),
            load_targets: self.load_targets.clone(),
            cache: Mutex::new(cache),
        });

        let phase = Instant::now();
        context::use_dataset(&dataset, || dataset.update_caches(&targets))?;
        let cache_elapsed = phase.elapsed();

        let phase = Instant::now();
        context::use_dataset(&dataset, || dataset.run_after_load())?;
        let hooks_elapsed = phase.elapsed();

        if self.config.log_timings {
            info!(tables = targets.len(), elapsed = ?load_elapsed, "master data load");
            info!(elapsed = ?cache_elapsed, "master data cache update");
            info!(elapsed = ?hooks_elapsed, "after-load hooks");
        }
        Ok(dataset)
    }

    /// Reloads: a new load pass for loaded datasets, an unload for fixtures.
    ///
    /// # Errors
    ///
    /// Returns the load pass failure.
    pub fn reload(&self) -> Result<Arc<Dataset>> {
        match self.mode {
            DatasetMode::Loaded => self.load(),
            DatasetMode::Fixture => Ok(Arc::new(self.unload())),
        }
    }

    /// Returns a copy with empty tables and an empty scratch cache.
    #[must_use]
    pub fn unload(&self) -> Dataset {
        let tables = match self.mode {
            DatasetMode::Loaded => loaded_tables(&self.catalog),
            DatasetMode::Fixture => fixture_tables(&self.catalog),
        };
        self.derive(tables, self.diff.clone())
    }

    /// Returns a copy that will merge `diff` (or the current diff) on its
    /// next load.
    ///
    /// Tables whose applied fragment already equals the new one are shared.
    /// Others are left unbuilt until the next load. Fixture tables are
    /// copied so writes to either dataset stay separate.
    #[must_use]
    pub fn duplicate(&self, diff: Option<Overlay>) -> Dataset {
        let diff = diff.unwrap_or_else(|| self.diff.clone());
        let tables = match self.mode {
            DatasetMode::Loaded => {
                let mut tables = im::HashMap::new();
                for def in self.catalog.bases() {
                    let Some(Store::Loaded(table)) = self.tables.get(&def.id()) else {
                        continue;
                    };
                    if table.applied_diff() == diff.fragment(def.table_name()) {
                        insert_table(&mut tables, Arc::clone(table));
                    } else {
                        insert_table(&mut tables, Arc::new(table.unbuilt(&self.catalog)));
                    }
                }
                tables
            }
            DatasetMode::Fixture => self
                .tables
                .iter()
                .map(|(class, store)| {
                    let store = match store {
                        Store::Fixture(table) => Store::Fixture(Arc::new(table.duplicate())),
                        Store::Loaded(table) => Store::Loaded(Arc::clone(table)),
                    };
                    (*class, store)
                })
                .collect(),
        };
        self.derive(tables, diff)
    }

    fn derive(&self, tables: im::HashMap<ClassId, Store>, diff: Overlay) -> Dataset {
        Self {
            catalog: Arc::clone(&self.catalog),
            loader: Arc::clone(&self.loader),
            config: self.config.clone(),
            mode: self.mode,
            tables,
            diff,
            load_targets: self.load_targets.clone(),
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    fn update_caches(&self, bases: &[ClassId]) -> Result<()> {
        for &base in bases {
            let def = self.catalog.class(base);
            for class in iter::once(base).chain(def.descendants().iter().copied()) {
                if let Some(store) = self.tables.get(&class) {
                    store.class_cache(|| self.compute_class_cache(class, store));
                }
            }

            let Some(store) = self.tables.get(&base) else {
                continue;
            };
            for record in store.all().iter() {
                let class = self.catalog.class(record.class());
                for method in class.method_caches().iter().filter(|m| m.eager) {
                    self.method_value(record, method)?;
                }
            }
        }
        Ok(())
    }

    fn run_after_load(&self) -> Result<()> {
        for hook in self.catalog.after_load_hooks() {
            hook(self)?;
        }
        Ok(())
    }

    // =========================================================================
    // Caches
    // =========================================================================

    /// Returns a class-level aggregate.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown class or cache name, and `Internal`
    /// if the cached value is not a `T`.
    pub fn class_cache<T: Any + Send + Sync>(&self, class: &str, name: &str) -> Result<Arc<T>> {
        self.class_cache_of(self.catalog.lookup(class)?, name)
    }

    /// Returns a class-level aggregate by class id.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown cache name, and `Internal` if the
    /// cached value is not a `T`.
    pub fn class_cache_of<T: Any + Send + Sync>(&self, class: ClassId, name: &str) -> Result<Arc<T>> {
        let store = self.store(class)?;
        let cache = store.class_cache(|| self.compute_class_cache(class, store));
        let value = cache.get(name).cloned().ok_or_else(|| {
            Error::not_found(format!("class cache {name} on {}", self.catalog.class(class).name()))
        })?;
        downcast(value, name)
    }

    fn compute_class_cache(&self, class: ClassId, store: &Store) -> ClassCache {
        let scope = ClassScope {
            dataset: self,
            class,
            store,
        };
        let def = self.catalog.class(class);
        let mut cache = ClassCache::new();
        for aggregate in def.class_caches() {
            let values = (aggregate.compute)(&scope);
            if values.len() != aggregate.names.len() {
                warn!(
                    class = def.name(),
                    expected = aggregate.names.len(),
                    returned = values.len(),
                    "class cache returned a different number of values"
                );
            }
            for (name, value) in aggregate.names.iter().zip(values) {
                cache.insert(Arc::clone(name), value);
            }
        }
        cache
    }

    /// Returns a per-record derived value, computing it on first access.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the record's class declares no such accessor,
    /// and `Internal` if the cached value is not a `T`.
    pub fn cached<T: Any + Send + Sync>(&self, record: &Record, name: &str) -> Result<Arc<T>> {
        let class = self.catalog.class(record.class());
        let method = class.method_cache(name).ok_or_else(|| {
            Error::not_found(format!("cached method {name} on {}", class.name()))
        })?;
        downcast(self.method_value(record, method)?, name)
    }

    fn method_value(&self, record: &Record, method: &MethodCacheDef) -> Result<CacheValue> {
        let base = self.store(self.catalog.class(record.class()).base())?;
        let scope = self.scope(record.class())?;
        Ok(base
            .method_cache()
            .get_or_compute(&method.name, record.serial(), || (method.compute)(&scope, record)))
    }

    /// Returns a scratch cache entry.
    #[must_use]
    pub fn cache_read(&self, key: &str) -> Option<CacheValue> {
        self.cache.lock().get(key).cloned()
    }

    /// Returns a scratch cache entry, computing and storing it on a miss.
    ///
    /// `compute` runs without the cache lock held. If another caller stores
    /// the key first, its value is returned.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the stored value is not a `T`.
    pub fn cache_fetch<T, F>(&self, key: &str, compute: F) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        if let Some(value) = self.cache_read(key) {
            return downcast(value, key);
        }
        let value = cache_value(compute());
        let stored = Arc::clone(self.cache.lock().entry(key.to_string()).or_insert(value));
        downcast(stored, key)
    }

    /// Stores a scratch cache entry.
    pub fn cache_write<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.cache.lock().insert(key.into(), cache_value(value));
    }

    /// Removes a scratch cache entry.
    pub fn cache_delete(&self, key: &str) -> Option<CacheValue> {
        self.cache.lock().remove(key)
    }

    // =========================================================================
    // Fixture writes
    // =========================================================================

    /// Starts a record of the named class.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown class.
    pub fn builder(&self, class: &str) -> Result<RecordBuilder> {
        let id = self.catalog.lookup(class)?;
        Ok(RecordBuilder::new(Arc::clone(self.catalog.class(id).layout())))
    }

    /// Inserts a record into its class table and every ancestor table.
    ///
    /// A record that replaces one of another variant is removed from the
    /// tables of the old variant's ancestry first.
    ///
    /// # Errors
    ///
    /// Returns `Internal` unless this is a fixture dataset.
    pub fn insert(&self, record: Record) -> Result<()> {
        let base = self.catalog.class(record.class()).base();
        if let Some(previous) = self.fixture(base)?.find_by_id(record.id()) {
            if previous.class() != record.class() {
                self.remove_from_ancestry(&previous)?;
            }
        }
        for &class in self.catalog.class(record.class()).ancestors() {
            self.fixture(class)?.insert(record.clone());
        }
        Ok(())
    }

    /// Removes a record from every table holding it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown class and `Internal` unless this is
    /// a fixture dataset.
    pub fn remove(&self, class: &str, id: RecordId) -> Result<Option<Record>> {
        let class = self.catalog.lookup(class)?;
        let Some(record) = self.fixture(class)?.find_by_id(id) else {
            return Ok(None);
        };
        self.remove_from_ancestry(&record)?;
        Ok(Some(record))
    }

    /// Marks the indices and class caches of a class and its ancestors stale.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown class and `Internal` unless this is
    /// a fixture dataset.
    pub fn record_updated(&self, class: &str) -> Result<()> {
        let class = self.catalog.lookup(class)?;
        for &ancestor in self.catalog.class(class).ancestors() {
            self.fixture(ancestor)?.record_updated();
        }
        Ok(())
    }

    fn remove_from_ancestry(&self, record: &Record) -> Result<()> {
        for &class in self.catalog.class(record.class()).ancestors() {
            self.fixture(class)?.remove(record.id());
        }
        Ok(())
    }

    fn fixture(&self, class: ClassId) -> Result<&TestTable> {
        match self.store(class)? {
            Store::Fixture(table) => Ok(table),
            Store::Loaded(_) => Err(Error::new(ErrorKind::Internal(format!(
                "{} is not a fixture table",
                self.catalog.class(class).name()
            )))),
        }
    }

    // =========================================================================
    // Queries over records
    // =========================================================================

    /// Follows a polymorphic reference stored in two columns of `record`.
    ///
    /// Returns `None` when either column is nil or the target is missing.
    ///
    /// # Errors
    ///
    /// Returns `UnknownColumn` for a missing column, `NotFound` for an
    /// unknown target class, and `Casting` for a non-integer id.
    pub fn resolve_reference(
        &self,
        record: &Record,
        type_column: &str,
        id_column: &str,
    ) -> Result<Option<Record>> {
        let class = match record.try_get(type_column)? {
            Value::Nil => return Ok(None),
            value => value.to_string(),
        };
        let id = match record.try_get(id_column)? {
            Value::Nil => return Ok(None),
            Value::Int(id) => RecordId(*id),
            other => {
                return Err(Error::casting(
                    record.class_name(),
                    id_column,
                    other.to_string(),
                    "reference id must be an integer",
                ));
            }
        };
        Ok(self.store_by_name(&class)?.find_by_id(id))
    }

    /// Exports a class's records in wire form.
    ///
    /// The header lists the class's columns followed by any column only its
    /// variants declare; records lacking a column export `null`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown class or a class without a table.
    pub fn export(&self, class: &str) -> Result<RawPayload> {
        let id = self.catalog.lookup(class)?;
        let store = self.store(id)?;
        let def = self.catalog.class(id);

        let mut columns: Vec<String> = Vec::new();
        for class in iter::once(id).chain(def.descendants().iter().copied()) {
            for column in self.catalog.class(class).layout().columns() {
                if !columns.iter().any(|c| c == column.name()) {
                    columns.push(column.name().to_string());
                }
            }
        }

        let mut payload = RawPayload::with_columns(columns.iter().map(String::as_str));
        for record in store.all().iter() {
            let mut raw = record.to_raw();
            let row = columns
                .iter()
                .map(|c| raw.remove(c).unwrap_or(RawValue::Null))
                .collect();
            payload = payload.with_row(row);
        }
        Ok(payload)
    }

    /// Validates every record and returns the failures.
    #[must_use]
    pub fn validate(&self) -> Errors {
        let mut errors = Errors::new();
        self.validate_into(&mut errors);
        errors
    }

    /// Validates every record, adding failures to `errors`.
    pub fn validate_into(&self, errors: &mut Errors) {
        for base in self.catalog.bases() {
            let Some(store) = self.tables.get(&base.id()) else {
                continue;
            };
            for record in store.all().iter() {
                let class = self.catalog.class(record.class());
                if class.validators().is_empty() {
                    continue;
                }
                let scope = ClassScope {
                    dataset: self,
                    class: class.id(),
                    store: self.tables.get(&class.id()).unwrap_or(store),
                };
                validate_record(class.validators(), &scope, record, errors);
            }
        }
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("mode", &self.mode)
            .field("classes", &self.catalog.len())
            .field("tables", &self.tables.len())
            .field("diff", &self.diff.tables().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn loaded_tables(catalog: &Catalog) -> im::HashMap<ClassId, Store> {
    let mut tables = im::HashMap::new();
    for def in catalog.bases() {
        insert_table(&mut tables, Arc::new(Table::empty(catalog, def.id())));
    }
    tables
}

fn fixture_tables(catalog: &Catalog) -> im::HashMap<ClassId, Store> {
    catalog
        .classes()
        .map(|def| (def.id(), Store::Fixture(Arc::new(TestTable::new(catalog, def.id())))))
        .collect()
}

fn insert_table(tables: &mut im::HashMap<ClassId, Store>, table: Arc<Table>) {
    for sub in table.sub_tables() {
        tables.insert(sub.class(), Store::Loaded(Arc::clone(sub)));
    }
    tables.insert(table.class(), Store::Loaded(table));
}

fn downcast<T: Any + Send + Sync>(value: CacheValue, name: &str) -> Result<Arc<T>> {
    value.downcast::<T>().map_err(|_| {
        Error::new(ErrorKind::Internal(format!(
            "cache {name} does not hold a {}",
            type_name::<T>()
        )))
    })
}

// =============================================================================
// ClassScope
// =============================================================================

/// A read view of one class within a dataset, handed to cache and
/// validation closures.
#[derive(Clone, Copy)]
pub struct ClassScope<'a> {
    dataset: &'a Dataset,
    class: ClassId,
    store: &'a Store,
}

impl<'a> ClassScope<'a> {
    /// Returns the dataset being read.
    #[must_use]
    pub fn dataset(&self) -> &'a Dataset {
        self.dataset
    }

    /// Returns the catalog.
    #[must_use]
    pub fn catalog(&self) -> &'a Catalog {
        &self.dataset.catalog
    }

    /// Returns the class.
    #[must_use]
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Returns the class name.
    #[must_use]
    pub fn class_name(&self) -> &'a str {
        self.catalog().class(self.class).name()
    }

    /// Returns the class's store.
    #[must_use]
    pub fn store(&self) -> &'a Store {
        self.store
    }

    /// Returns the class's records.
    #[must_use]
    pub fn all(&self) -> mastertable_foundation::Frozen<Record> {
        self.store.all()
    }

    /// Returns another class's store.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown class or a class without a table.
    pub fn other(&self, class: &str) -> Result<&'a Store> {
        self.dataset.store_by_name(class)
    }
}

impl fmt::Debug for ClassScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassScope")
            .field("class", &self.class_name())
            .field("records", &self.store.len())
            .finish()
    }
}
