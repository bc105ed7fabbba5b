//! Diff overlays and the patch-merge algorithm.
//!
//! An overlay is a sparse document of per-record field overrides:
//!
//! ```json
//! { "weapons": { "2": { "attack": 42.0 }, "3": null, "__rev": 7 } }
//! ```
//!
//! Merging never mutates a published record. Every patched record is a new
//! record, and any failure aborts the whole merge for that table.

use std::sync::Arc;

use mastertable_foundation::{
    Error, ErrorContext, ErrorKind, RawObject, RawValue, RecordId, Result, Value, render,
};

use crate::catalog::{Catalog, ClassId};
use crate::index::IdIndex;
use crate::record::RecordBuilder;

/// Keys starting with this prefix are envelope metadata, not data.
pub const METADATA_PREFIX: &str = "__";

/// Returns true for envelope metadata keys.
#[must_use]
pub fn is_metadata_key(key: &str) -> bool {
    key.starts_with(METADATA_PREFIX)
}

/// A full overlay document, keyed by table name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Overlay {
    tables: Arc<RawObject>,
}

impl Overlay {
    /// Creates an empty overlay.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an overlay from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` for malformed JSON or a non-object document.
    pub fn parse(text: &str) -> Result<Self> {
        let value: RawValue = serde_json::from_str(text)
            .map_err(|e| Error::new(ErrorKind::Serialization(e.to_string())))?;
        Self::from_value(value)
    }

    /// Wraps an already decoded document.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the document is not an object; `null` gives
    /// an empty overlay.
    pub fn from_value(value: RawValue) -> Result<Self> {
        match value {
            RawValue::Null => Ok(Self::new()),
            RawValue::Object(tables) => Ok(Self {
                tables: Arc::new(tables),
            }),
            other => Err(Error::new(ErrorKind::Serialization(format!(
                "overlay must be an object, got {}",
                render(&other)
            )))),
        }
    }

    /// Returns the fragment targeting `table`, if any.
    #[must_use]
    pub fn fragment(&self, table: &str) -> Option<&RawValue> {
        self.tables.get(table).filter(|f| !f.is_null())
    }

    /// Returns the names of the tables this overlay touches.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Returns true if the overlay touches no table.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Returns the overlay as a JSON document.
    #[must_use]
    pub fn to_value(&self) -> RawValue {
        RawValue::Object((*self.tables).clone())
    }

    /// Adds or replaces a field patch for one record.
    #[must_use]
    pub fn with_patch(mut self, table: &str, id: i64, patch: RawValue) -> Self {
        self.insert(table, id, patch);
        self
    }

    /// Marks one record for deletion.
    #[must_use]
    pub fn with_deletion(mut self, table: &str, id: i64) -> Self {
        self.insert(table, id, RawValue::Null);
        self
    }

    fn insert(&mut self, table: &str, id: i64, patch: RawValue) {
        let tables = Arc::make_mut(&mut self.tables);
        let fragment = tables
            .entry(table.to_string())
            .or_insert_with(|| RawValue::Object(RawObject::new()));
        if let RawValue::Object(entries) = fragment {
            entries.insert(id.to_string(), patch);
        } else {
            let mut entries = RawObject::new();
            entries.insert(id.to_string(), patch);
            *fragment = RawValue::Object(entries);
        }
    }
}

/// Applies one table's fragment to a working id index.
///
/// # Errors
///
/// Returns `UnknownColumn`, `Assignment`, or `UnsupportedVariant`, each with
/// table, id, and column context. The index is left partially patched on
/// error and must be discarded.
pub fn apply_fragment(
    catalog: &Catalog,
    base: ClassId,
    id_hash: &mut IdIndex,
    fragment: &RawValue,
) -> Result<()> {
    let base_def = catalog.class(base);
    let table = base_def.table_name();
    let class_name = base_def.name();

    let RawValue::Object(entries) = fragment else {
        return Err(Error::assignment(
            class_name,
            "(fragment)",
            render(fragment),
            "diff fragment must be an object",
        )
        .with_context(ErrorContext::new().with_table(table)));
    };

    let variant_column = base_def.layout().variant_column().map(|c| c.name().to_string());

    for (key, patch) in entries {
        if is_metadata_key(key) {
            continue;
        }
        let id: RecordId = key.parse().map_err(|_| {
            Error::assignment(class_name, "id", key.as_str(), "diff key is not an integer id")
                .with_context(ErrorContext::new().with_table(table))
        })?;
        let context = || ErrorContext::new().with_table(table).with_record(id);

        let fields = match patch {
            RawValue::Null => {
                id_hash.shift_remove(&id);
                continue;
            }
            RawValue::Object(fields) => fields,
            other => {
                return Err(Error::assignment(
                    class_name,
                    "(patch)",
                    render(other),
                    "patch must be an object or null",
                )
                .with_context(context()));
            }
        };

        // A patch that names a variant switches the record to that class.
        let target = match variant_column
            .as_deref()
            .and_then(|c| fields.get(c))
            .filter(|v| !v.is_null())
        {
            Some(tag) => {
                let tag = tag.as_str().map_or_else(|| render(tag), str::to_string);
                if tag.trim().is_empty() {
                    return Err(Error::unsupported_variant(catalog.class(base).name(), tag)
                        .with_context(context()));
                }
                let resolved = catalog
                    .resolve_variant(base, &Value::from(tag))
                    .map_err(|e| e.with_context(context()))?;
                Some(resolved)
            }
            None => None,
        };

        let mut builder = match (id_hash.get(&id), target) {
            (None, target) => {
                let class = match target {
                    Some(class) => class,
                    None => catalog
                        .resolve_variant(base, &Value::Nil)
                        .map_err(|e| e.with_context(context()))?,
                };
                let mut builder = RecordBuilder::new(catalog.class(class).layout().clone());
                builder.set_id(id);
                builder
            }
            (Some(original), Some(class)) => {
                RecordBuilder::reseed(catalog.class(class).layout().clone(), original)
            }
            (Some(original), None) => RecordBuilder::copy_of(original),
        };
        let target_name = builder.layout().class_name().to_string();

        for (column, raw) in fields {
            if is_metadata_key(column) {
                continue;
            }
            let Some(slot) = builder.layout().slot(column) else {
                return Err(Error::unknown_column(&target_name, column.as_str())
                    .with_context(context().with_column(column.as_str())));
            };
            let value = builder.layout().columns()[slot]
                .cast_in(&target_name, raw)
                .map_err(|e| {
                    let reason = match e.kind {
                        ErrorKind::Casting { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    Error::assignment(&target_name, column.as_str(), render(raw), reason)
                        .with_context(context().with_column(column.as_str()))
                })?;
            builder.set_slot(slot, value);
        }
        builder.set_id(id);

        let record = builder.build().map_err(|e| e.with_context(context()))?;
        id_hash.insert(id, record);
    }

    Ok(())
}
