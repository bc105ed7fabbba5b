//! The loader contract and the shared row builder.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use mastertable_foundation::{
    Error, ErrorContext, RawPayload, RawValue, Result, Value, ValueInterner,
};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;

use crate::catalog::{Catalog, ClassDef, ClassId};
use crate::config::DatasetConfig;
use crate::record::{Record, RecordBuilder};

/// Everything a loader needs to know about the table being loaded.
#[derive(Clone, Copy, Debug)]
pub struct LoadRequest<'a> {
    /// The catalog the table belongs to.
    pub catalog: &'a Catalog,
    /// The base class owning the table.
    pub class: ClassId,
    /// The loading dataset's configuration.
    pub config: &'a DatasetConfig,
}

impl<'a> LoadRequest<'a> {
    /// Returns the base class definition.
    #[must_use]
    pub fn class_def(&self) -> &'a ClassDef {
        self.catalog.class(self.class)
    }

    /// Returns the table name.
    #[must_use]
    pub fn table_name(&self) -> &'a str {
        self.class_def().table_name()
    }
}

/// A source of raw table data.
///
/// `read_raw` must be an idempotent read. `build_records` must be a pure
/// function of the payload; the default implementation is [`build_rows`].
pub trait Loader: Send + Sync + fmt::Debug {
    /// Reads the raw payload of one table.
    ///
    /// # Errors
    ///
    /// Returns `SourceUnavailable` if the source cannot be read.
    fn read_raw(&self, request: &LoadRequest<'_>) -> Result<RawPayload>;

    /// Turns a payload into records, dropping unreadable rows.
    ///
    /// # Errors
    ///
    /// Returns `UnknownColumn` for an undeclared header column when the
    /// configuration is strict.
    fn build_records(&self, request: &LoadRequest<'_>, raw: &RawPayload) -> Result<Vec<Record>> {
        build_rows(request, raw)
    }
}

/// Builds records from a tabular payload.
///
/// Each row's variant column selects the concrete class. Rows with an
/// unsupported variant, a value that fails its cast, or no id are dropped
/// with a warning.
///
/// # Errors
///
/// Returns `UnknownColumn` if the header names a column no class of the
/// hierarchy declares and the configuration is strict.
pub fn build_rows(request: &LoadRequest<'_>, raw: &RawPayload) -> Result<Vec<Record>> {
    let catalog = request.catalog;
    let base = request.class_def();
    let table = base.table_name();

    check_header(request, raw)?;

    let tag_index = base
        .layout()
        .variant_column()
        .and_then(|c| raw.column_index(c.name()));
    let mut interner = request.config.intern_values.then(ValueInterner::new);

    let mut records = Vec::with_capacity(raw.len());
    for (row_number, row) in raw.rows.iter().enumerate() {
        match build_row(catalog, base, tag_index, &raw.columns, row, interner.as_mut()) {
            Ok(record) => records.push(record),
            Err(error) => {
                warn!(table, row = row_number, %error, "dropping unreadable row");
            }
        }
    }
    Ok(records)
}

fn check_header(request: &LoadRequest<'_>, raw: &RawPayload) -> Result<()> {
    let base = request.class_def();
    let mut known: FxHashSet<&str> = base.layout().columns().iter().map(|c| c.name()).collect();
    for descendant in base.descendants() {
        known.extend(
            request
                .catalog
                .class(*descendant)
                .layout()
                .columns()
                .iter()
                .map(|c| c.name()),
        );
    }

    for column in &raw.columns {
        if known.contains(column.as_str()) {
            continue;
        }
        if request.config.strict_columns {
            return Err(Error::unknown_column(base.name(), column.as_str()).with_context(
                ErrorContext::new()
                    .with_table(base.table_name())
                    .with_column(column.as_str()),
            ));
        }
        warn!(table = base.table_name(), column = column.as_str(), "ignoring undeclared column");
    }
    Ok(())
}

fn build_row(
    catalog: &Catalog,
    base: &ClassDef,
    tag_index: Option<usize>,
    columns: &[String],
    row: &[RawValue],
    mut interner: Option<&mut ValueInterner>,
) -> Result<Record> {
    let class = match tag_index.and_then(|i| row.get(i)) {
        Some(raw_tag) => {
            let tag = match raw_tag {
                RawValue::Null => Value::Nil,
                RawValue::String(s) => Value::from(s.as_str()),
                other => Value::from(other.to_string()),
            };
            catalog.resolve_variant(base.id(), &tag)?
        }
        None => catalog.resolve_variant(base.id(), &Value::Nil)?,
    };

    let layout = catalog.class(class).layout();
    let mut builder = RecordBuilder::new(layout.clone());
    for (name, raw) in columns.iter().zip(row) {
        let Some(slot) = layout.slot(name) else {
            continue;
        };
        match interner.as_deref_mut() {
            Some(interner) => builder.set_raw_interned(slot, raw, interner)?,
            None => {
                let value = layout.columns()[slot].cast_in(layout.class_name(), raw)?;
                builder.set_slot(slot, value);
            }
        }
    }
    builder.build()
}

// =============================================================================
// MemoryLoader
// =============================================================================

/// A loader serving payloads held in memory, keyed by table name.
///
/// Payloads can be replaced between loads to simulate source changes.
#[derive(Default)]
pub struct MemoryLoader {
    tables: RwLock<FxHashMap<String, RawPayload>>,
    reads: AtomicUsize,
}

impl MemoryLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table payload.
    #[must_use]
    pub fn with_table(self, table: impl Into<String>, payload: RawPayload) -> Self {
        self.insert(table, payload);
        self
    }

    /// Sets or replaces a table payload.
    pub fn insert(&self, table: impl Into<String>, payload: RawPayload) {
        self.tables.write().insert(table.into(), payload);
    }

    /// Removes a table payload, making the table unavailable.
    pub fn remove(&self, table: &str) -> Option<RawPayload> {
        self.tables.write().remove(table)
    }

    /// Returns how many reads have been served.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl Loader for MemoryLoader {
    fn read_raw(&self, request: &LoadRequest<'_>) -> Result<RawPayload> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let table = request.table_name();
        self.tables
            .read()
            .get(table)
            .cloned()
            .ok_or_else(|| Error::source_unavailable(table, "no payload registered"))
    }
}

impl fmt::Debug for MemoryLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read();
        let mut names: Vec<&String> = tables.keys().collect();
        names.sort();
        f.debug_struct("MemoryLoader")
            .field("tables", &names)
            .field("reads", &self.reads())
            .finish()
    }
}
