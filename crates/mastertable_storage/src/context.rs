//! The active dataset for ambient lookups.
//!
//! Each thread has a scoped current dataset, installed with [`use_dataset`]
//! or a [`DatasetScope`] guard and restored when the scope ends, however it
//! ends. Threads with nothing installed fall back to a process-wide dataset
//! set by [`install_global`], which a maintenance task can swap after each
//! load pass.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use mastertable_foundation::{Error, ErrorKind, Frozen, RecordId, Result, Value};
use parking_lot::RwLock;

use crate::dataset::Dataset;
use crate::record::Record;
use crate::store::{RecordStore, Store};

thread_local! {
    static CURRENT: RefCell<Option<Arc<Dataset>>> = const { RefCell::new(None) };
}

static GLOBAL: RwLock<Option<Arc<Dataset>>> = RwLock::new(None);

/// Returns the dataset in effect on this thread.
///
/// # Errors
///
/// Returns `NoActiveDataset` if neither a scope nor a global dataset is
/// installed.
pub fn current() -> Result<Arc<Dataset>> {
    try_current().ok_or_else(|| Error::new(ErrorKind::NoActiveDataset))
}

/// Returns the dataset in effect on this thread, if any.
#[must_use]
pub fn try_current() -> Option<Arc<Dataset>> {
    CURRENT
        .with(|current| current.borrow().clone())
        .or_else(|| GLOBAL.read().clone())
}

/// Runs `f` with `dataset` installed as this thread's current dataset.
pub fn use_dataset<R>(dataset: &Arc<Dataset>, f: impl FnOnce() -> R) -> R {
    let _scope = DatasetScope::enter(Arc::clone(dataset));
    f()
}

/// Replaces the process-wide fallback dataset, returning the previous one.
pub fn install_global(dataset: Arc<Dataset>) -> Option<Arc<Dataset>> {
    GLOBAL.write().replace(dataset)
}

/// Removes the process-wide fallback dataset.
pub fn clear_global() -> Option<Arc<Dataset>> {
    GLOBAL.write().take()
}

/// Guard that installs a dataset on this thread until dropped.
#[must_use = "the dataset is uninstalled when the scope is dropped"]
pub struct DatasetScope {
    previous: Option<Arc<Dataset>>,
    _thread_bound: PhantomData<*const ()>,
}

impl DatasetScope {
    /// Installs `dataset`, remembering the one it replaces.
    pub fn enter(dataset: Arc<Dataset>) -> Self {
        let previous = CURRENT.with(|current| current.replace(Some(dataset)));
        Self {
            previous,
            _thread_bound: PhantomData,
        }
    }
}

impl Drop for DatasetScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| {
            *current.borrow_mut() = previous;
        });
    }
}

// =============================================================================
// ClassRef
// =============================================================================

/// A catalog class name resolved against the current dataset on each call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClassRef(Arc<str>);

impl ClassRef {
    /// Creates a reference to the named class.
    #[must_use]
    pub fn new(class: &str) -> Self {
        Self(class.into())
    }

    /// Returns the class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Runs `f` against the class's store in the current dataset.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveDataset`, or `NotFound` for an unknown class.
    pub fn with_store<R>(&self, f: impl FnOnce(&Store) -> R) -> Result<R> {
        let dataset = current()?;
        let store = dataset.store_by_name(&self.0)?;
        Ok(f(store))
    }

    /// Returns every record.
    ///
    /// # Errors
    ///
    /// See [`ClassRef::with_store`].
    pub fn all(&self) -> Result<Frozen<Record>> {
        self.with_store(RecordStore::all)
    }

    /// Returns the number of records.
    ///
    /// # Errors
    ///
    /// See [`ClassRef::with_store`].
    pub fn len(&self) -> Result<usize> {
        self.with_store(RecordStore::len)
    }

    /// Returns the record with `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if it is missing.
    pub fn find(&self, id: RecordId) -> Result<Record> {
        self.with_store(|s| s.find(id))?
    }

    /// Returns the record with `id`, if present.
    ///
    /// # Errors
    ///
    /// See [`ClassRef::with_store`].
    pub fn find_by_id(&self, id: RecordId) -> Result<Option<Record>> {
        self.with_store(|s| s.find_by_id(id))
    }

    /// Returns the existing records among `ids`.
    ///
    /// # Errors
    ///
    /// See [`ClassRef::with_store`].
    pub fn find_by_ids(&self, ids: &[RecordId]) -> Result<Vec<Record>> {
        self.with_store(|s| s.find_by_ids(ids))
    }

    /// Returns true if a record has `id`.
    ///
    /// # Errors
    ///
    /// See [`ClassRef::with_store`].
    pub fn exists(&self, id: RecordId) -> Result<bool> {
        self.with_store(|s| s.exists(id))
    }

    /// Returns the records whose `column` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `column` is not a group key.
    pub fn all_by(&self, column: &str, value: impl Into<Value>) -> Result<Frozen<Record>> {
        let value = value.into();
        self.with_store(|s| s.all_by(column, &value))?
    }

    /// Returns the first record whose `column` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `column` is not a group key.
    pub fn find_by(&self, column: &str, value: impl Into<Value>) -> Result<Option<Record>> {
        let value = value.into();
        self.with_store(|s| s.find_by(column, &value))?
    }

    /// Returns the matches for several values.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `column` is not a group key.
    pub fn all_in(&self, column: &str, values: &[Value]) -> Result<Frozen<Record>> {
        self.with_store(|s| s.all_in(column, values))?
    }

    /// Returns a class-level aggregate.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown cache, or `Internal` on a type
    /// mismatch.
    pub fn class_cache<T: std::any::Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        current()?.class_cache(&self.0, name)
    }
}
