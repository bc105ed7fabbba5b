//! The lookup contract shared by every record store.

use std::sync::Arc;

use mastertable_foundation::{Error, Frozen, RecordId, Result, Value};

use crate::cache::{ClassCache, MethodCache};
use crate::catalog::ClassId;
use crate::index::GroupIndex;
use crate::record::Record;
use crate::table::Table;
use crate::test_table::TestTable;

/// Read-only lookups over one class's published records.
///
/// Implementors supply the class identity, the record list, id lookup, and
/// group indices; every other lookup is derived from those.
pub trait RecordStore {
    /// Returns the class these records belong to.
    fn class(&self) -> ClassId;

    /// Returns the class name.
    fn class_name(&self) -> &str;

    /// Returns every record in publish order.
    fn all(&self) -> Frozen<Record>;

    /// Returns the record with `id`, if present.
    fn find_by_id(&self, id: RecordId) -> Option<Record>;

    /// Returns the group index of `column`, if it is a declared group key.
    fn group_index(&self, column: &str) -> Option<Arc<GroupIndex>>;

    /// Returns the number of records.
    fn len(&self) -> usize {
        self.all().len()
    }

    /// Returns true if there are no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns every identifier in publish order.
    fn ids(&self) -> Vec<RecordId> {
        self.all().iter().map(Record::id).collect()
    }

    /// Returns the record with `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no record has that id.
    fn find(&self, id: RecordId) -> Result<Record> {
        self.find_by_id(id)
            .ok_or_else(|| Error::not_found(format!("{} id {id}", self.class_name())))
    }

    /// Returns the records for `ids` that exist, in the order asked.
    fn find_by_ids(&self, ids: &[RecordId]) -> Vec<Record> {
        ids.iter().filter_map(|id| self.find_by_id(*id)).collect()
    }

    /// Returns the records for `ids`, all of which must exist.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` naming the first missing id.
    fn find_by_ids_strict(&self, ids: &[RecordId]) -> Result<Vec<Record>> {
        ids.iter().map(|id| self.find(*id)).collect()
    }

    /// Returns true if a record has `id`.
    fn exists(&self, id: RecordId) -> bool {
        self.find_by_id(id).is_some()
    }

    /// Returns the records whose `column` equals `value`.
    ///
    /// A declared key with no matching value gives an empty list.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `column` is not a declared group key.
    fn all_by(&self, column: &str, value: &Value) -> Result<Frozen<Record>> {
        let index = self.require_group(column)?;
        Ok(index.get(value).cloned().unwrap_or_default())
    }

    /// Returns the records whose `column` equals `value`, which must exist.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `column` is not a group key or no record has
    /// that value.
    fn all_by_strict(&self, column: &str, value: &Value) -> Result<Frozen<Record>> {
        let index = self.require_group(column)?;
        index.get(value).cloned().ok_or_else(|| {
            Error::not_found(format!("{} with {column} = {value}", self.class_name()))
        })
    }

    /// Returns the first record whose `column` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `column` is not a declared group key.
    fn find_by(&self, column: &str, value: &Value) -> Result<Option<Record>> {
        Ok(self.all_by(column, value)?.first().cloned())
    }

    /// Returns the concatenated matches for several values.
    ///
    /// Values without matches contribute nothing.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `column` is not a declared group key.
    fn all_in(&self, column: &str, values: &[Value]) -> Result<Frozen<Record>> {
        let index = self.require_group(column)?;
        let mut out = Vec::new();
        for value in values {
            if let Some(members) = index.get(value) {
                out.extend_from_slice(members);
            }
        }
        Ok(Frozen::new(out))
    }

    /// Returns the distinct values of a group key, in first-seen order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `column` is not a declared group key.
    fn group_values(&self, column: &str) -> Result<Vec<Value>> {
        Ok(self.require_group(column)?.keys().cloned().collect())
    }

    /// Returns the first record.
    fn first(&self) -> Option<Record> {
        self.all().first().cloned()
    }

    /// Returns the last record.
    fn last(&self) -> Option<Record> {
        self.all().last().cloned()
    }

    /// Returns a group index or a `NotFound` error.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `column` is not a declared group key.
    fn require_group(&self, column: &str) -> Result<Arc<GroupIndex>> {
        self.group_index(column).ok_or_else(|| {
            Error::not_found(format!("group key {column} on {}", self.class_name()))
        })
    }
}

/// A table as held by a dataset: loaded from a source or built by fixtures.
#[derive(Clone, Debug)]
pub enum Store {
    /// An immutable table published by a load pass.
    Loaded(Arc<Table>),
    /// A mutable fixture table.
    Fixture(Arc<TestTable>),
}

impl Store {
    /// Returns the per-record cache.
    #[must_use]
    pub fn method_cache(&self) -> &MethodCache {
        match self {
            Self::Loaded(table) => table.method_cache(),
            Self::Fixture(table) => table.method_cache(),
        }
    }

    /// Returns the class-level cache, computing it if needed.
    pub fn class_cache(&self, compute: impl FnOnce() -> ClassCache) -> Arc<ClassCache> {
        match self {
            Self::Loaded(table) => table.class_cache(compute),
            Self::Fixture(table) => table.class_cache(compute),
        }
    }

    /// Returns true once the table holds published data. Fixture tables
    /// always do.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        match self {
            Self::Loaded(table) => table.is_loaded(),
            Self::Fixture(_) => true,
        }
    }

    /// Returns true if both handles are the same table.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        match (a, b) {
            (Self::Loaded(x), Self::Loaded(y)) => Arc::ptr_eq(x, y),
            (Self::Fixture(x), Self::Fixture(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }
}

impl RecordStore for Store {
    fn class(&self) -> ClassId {
        match self {
            Self::Loaded(table) => table.class(),
            Self::Fixture(table) => table.class(),
        }
    }

    fn class_name(&self) -> &str {
        match self {
            Self::Loaded(table) => table.class_name(),
            Self::Fixture(table) => table.class_name(),
        }
    }

    fn all(&self) -> Frozen<Record> {
        match self {
            Self::Loaded(table) => table.all(),
            Self::Fixture(table) => table.all(),
        }
    }

    fn find_by_id(&self, id: RecordId) -> Option<Record> {
        match self {
            Self::Loaded(table) => table.find_by_id(id),
            Self::Fixture(table) => table.find_by_id(id),
        }
    }

    fn group_index(&self, column: &str) -> Option<Arc<GroupIndex>> {
        match self {
            Self::Loaded(table) => table.group_index(column),
            Self::Fixture(table) => table.group_index(column),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Loaded(table) => table.len(),
            Self::Fixture(table) => table.len(),
        }
    }
}
