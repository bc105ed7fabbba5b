//! Immutable per-class tables and the load protocol.
//!
//! A load attempt is a pure function from the previous table and the current
//! source to a [`LoadOutcome`]. All intermediate state lives in locals, so a
//! failed attempt leaves nothing behind and the previous table stays
//! authoritative.

use std::fmt;
use std::sync::{Arc, OnceLock};

use mastertable_foundation::{Digest, ErrorContext, Frozen, RawValue, RecordId};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::cache::{ClassCache, MethodCache};
use crate::catalog::{Catalog, ClassId};
use crate::diff::apply_fragment;
use crate::index::{GroupIndex, GroupIndices, IdIndex, build_groups, index_by_id};
use crate::loader::{LoadRequest, Loader};
use crate::record::Record;
use crate::store::RecordStore;

/// Result of one table load attempt.
#[derive(Debug)]
pub enum LoadOutcome {
    /// The digest matched; the previous table stays in place.
    Unchanged,
    /// A new table was built and should replace the previous one.
    Reloaded(Table),
}

/// The published records of one class with their indices and caches.
pub struct Table {
    class: ClassId,
    class_name: Arc<str>,
    all: Frozen<Record>,
    id_hash: IdIndex,
    grouped: GroupIndices,
    digest: Option<Digest>,
    applied_diff: Option<Arc<RawValue>>,
    sub_tables: FxHashMap<ClassId, Arc<Table>>,
    built: Option<Built>,
    class_cache: OnceLock<Arc<ClassCache>>,
    method_cache: MethodCache,
}

/// Records as built from a payload, before any diff was merged.
#[derive(Clone)]
struct Built {
    raw: u64,
    records: Arc<IdIndex>,
}

impl Table {
    /// Creates an empty, never-loaded table.
    #[must_use]
    pub fn empty(catalog: &Catalog, class: ClassId) -> Self {
        Self::publish(catalog, class, IdIndex::default(), None, None)
    }

    /// Runs one load attempt against `loader`.
    ///
    /// # Errors
    ///
    /// Returns the loader's error, or the merge error of `fragment`, with
    /// the table name attached.
    pub fn load(
        &self,
        request: &LoadRequest<'_>,
        loader: &dyn Loader,
        fragment: Option<&RawValue>,
    ) -> mastertable_foundation::Result<LoadOutcome> {
        let name = request.table_name();
        let context = || ErrorContext::new().with_table(name);

        let raw = loader.read_raw(request).map_err(|e| e.with_context(context()))?;
        let digest = raw.digest().with_diff(fragment);
        if self.digest == Some(digest) {
            debug!(table = name, %digest, "digest unchanged, keeping published records");
            return Ok(LoadOutcome::Unchanged);
        }

        // Only the diff changed: merge onto the records already built so
        // unpatched records keep their identity.
        let built = match &self.built {
            Some(built) if built.raw == digest.raw() => {
                debug!(table = name, "payload unchanged, reusing built records");
                built.clone()
            }
            _ => {
                let records = loader
                    .build_records(request, &raw)
                    .map_err(|e| e.with_context(context()))?;
                Built {
                    raw: digest.raw(),
                    records: Arc::new(index_by_id(records, name)),
                }
            }
        };

        let mut id_hash = IdIndex::clone(&built.records);
        if let Some(fragment) = fragment {
            apply_fragment(request.catalog, request.class, &mut id_hash, fragment)?;
        }

        let mut table = Self::publish(
            request.catalog,
            request.class,
            id_hash,
            Some(digest),
            fragment.map(|f| Arc::new(f.clone())),
        );
        table.built = Some(built);
        Ok(LoadOutcome::Reloaded(table))
    }

    /// Returns an unpublished copy that keeps the pre-diff records.
    ///
    /// The copy exposes no records until its next load, which skips the
    /// record build if the payload is unchanged.
    #[must_use]
    pub fn unbuilt(&self, catalog: &Catalog) -> Self {
        let mut table = Self::empty(catalog, self.class);
        table.built.clone_from(&self.built);
        table
    }

    /// Publishes a working id index: freezes `all`, builds group indices,
    /// and partitions records into one sub-table per concrete descendant.
    fn publish(
        catalog: &Catalog,
        class: ClassId,
        id_hash: IdIndex,
        digest: Option<Digest>,
        applied_diff: Option<Arc<RawValue>>,
    ) -> Self {
        let mut table = Self::from_members(catalog, class, id_hash, digest, applied_diff);
        let def = catalog.class(class);
        table.sub_tables = def
            .descendants()
            .iter()
            .map(|&sub| {
                let members = table
                    .all
                    .iter()
                    .filter(|r| catalog.is_a(r.class(), sub))
                    .cloned();
                let sub_table = Self::from_members(
                    catalog,
                    sub,
                    index_by_id(members, def.table_name()),
                    digest,
                    table.applied_diff.clone(),
                );
                (sub, Arc::new(sub_table))
            })
            .collect();
        table
    }

    fn from_members(
        catalog: &Catalog,
        class: ClassId,
        id_hash: IdIndex,
        digest: Option<Digest>,
        applied_diff: Option<Arc<RawValue>>,
    ) -> Self {
        let def = catalog.class(class);
        let all: Frozen<Record> = id_hash.values().cloned().collect();
        let grouped = build_groups(&all, def.layout().group_keys());
        Self {
            class,
            class_name: Arc::clone(def.name_arc()),
            all,
            id_hash,
            grouped,
            digest,
            applied_diff,
            sub_tables: FxHashMap::default(),
            built: None,
            class_cache: OnceLock::new(),
            method_cache: MethodCache::new(),
        }
    }

    /// Returns the digest of the last successful load.
    #[must_use]
    pub fn digest(&self) -> Option<Digest> {
        self.digest
    }

    /// Returns the diff fragment merged into this table.
    #[must_use]
    pub fn applied_diff(&self) -> Option<&RawValue> {
        self.applied_diff.as_deref()
    }

    /// Returns true once a load has published this table.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.digest.is_some()
    }

    /// Returns the sub-table of a concrete descendant.
    #[must_use]
    pub fn sub_table(&self, class: ClassId) -> Option<&Arc<Table>> {
        self.sub_tables.get(&class)
    }

    /// Returns every sub-table.
    pub fn sub_tables(&self) -> impl Iterator<Item = &Arc<Table>> {
        self.sub_tables.values()
    }

    /// Returns the class-level cache, computing it on first access.
    pub fn class_cache(&self, compute: impl FnOnce() -> ClassCache) -> Arc<ClassCache> {
        Arc::clone(self.class_cache.get_or_init(|| Arc::new(compute())))
    }

    /// Returns true if the class-level cache has been computed.
    #[must_use]
    pub fn has_class_cache(&self) -> bool {
        self.class_cache.get().is_some()
    }

    /// Returns the per-record cache.
    #[must_use]
    pub fn method_cache(&self) -> &MethodCache {
        &self.method_cache
    }
}

impl RecordStore for Table {
    fn class(&self) -> ClassId {
        self.class
    }

    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn all(&self) -> Frozen<Record> {
        self.all.clone()
    }

    fn find_by_id(&self, id: RecordId) -> Option<Record> {
        self.id_hash.get(&id).cloned()
    }

    fn group_index(&self, column: &str) -> Option<Arc<GroupIndex>> {
        self.grouped.get(column).cloned()
    }

    fn len(&self) -> usize {
        self.all.len()
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("class", &self.class_name)
            .field("records", &self.all.len())
            .field("digest", &self.digest.map(|d| d.to_string()))
            .field("sub_tables", &self.sub_tables.len())
            .finish_non_exhaustive()
    }
}
