//! Id and group-key indices over a published record list.

use std::sync::Arc;

use indexmap::IndexMap;
use mastertable_foundation::{Frozen, RecordId, Value};
use rustc_hash::{FxBuildHasher, FxHashMap};
use tracing::warn;

use crate::record::Record;

/// Identifier index, in publish order.
pub type IdIndex = IndexMap<RecordId, Record, FxBuildHasher>;

/// One group key's index: value to the records sharing it, in first-seen order.
pub type GroupIndex = IndexMap<Value, Frozen<Record>, FxBuildHasher>;

/// Every group index of a table, by column name.
pub type GroupIndices = FxHashMap<Arc<str>, Arc<GroupIndex>>;

/// Indexes records by identifier.
///
/// A repeated identifier replaces the earlier record in place.
pub fn index_by_id(records: impl IntoIterator<Item = Record>, table: &str) -> IdIndex {
    let mut index = IdIndex::default();
    for record in records {
        let id = record.id();
        if index.insert(id, record).is_some() {
            warn!(table, id = id.get(), "duplicate id, keeping the later row");
        }
    }
    index
}

/// Builds the group index of every listed column.
pub fn build_groups<'a>(
    records: &[Record],
    columns: impl IntoIterator<Item = &'a Arc<str>>,
) -> GroupIndices {
    columns
        .into_iter()
        .map(|column| (Arc::clone(column), Arc::new(group_by(records, column))))
        .collect()
}

fn group_by(records: &[Record], column: &str) -> GroupIndex {
    let mut buckets: IndexMap<Value, Vec<Record>, FxBuildHasher> = IndexMap::default();
    for record in records {
        buckets
            .entry(record.value(column).clone())
            .or_default()
            .push(record.clone());
    }
    buckets
        .into_iter()
        .map(|(value, members)| (value, Frozen::new(members)))
        .collect()
}
