//! Immutable records and their builder.

use std::fmt;
use std::sync::Arc;

use mastertable_foundation::{
    Error, RawObject, RawValue, RecordId, Result, Serial, Value, ValueInterner,
};

use crate::catalog::{ClassId, Layout};

/// One immutable record of a catalog class.
///
/// Cloning is a reference-count bump; [`Record::ptr_eq`] tells whether two
/// handles are the same published record.
#[derive(Clone)]
pub struct Record(Arc<RecordData>);

struct RecordData {
    layout: Arc<Layout>,
    id: RecordId,
    serial: Serial,
    values: Box<[Value]>,
}

impl Record {
    /// Returns the record identifier.
    #[must_use]
    pub fn id(&self) -> RecordId {
        self.0.id
    }

    /// Returns the load-scoped handle keying per-record caches.
    #[must_use]
    pub fn serial(&self) -> Serial {
        self.0.serial
    }

    /// Returns the concrete class.
    #[must_use]
    pub fn class(&self) -> ClassId {
        self.0.layout.class()
    }

    /// Returns the concrete class name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        self.0.layout.class_name()
    }

    /// Returns the column layout.
    #[must_use]
    pub fn layout(&self) -> &Arc<Layout> {
        &self.0.layout
    }

    /// Returns a column value, or `None` if the class has no such column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.layout.slot(column).map(|i| &self.0.values[i])
    }

    /// Returns a column value.
    ///
    /// # Errors
    ///
    /// Returns `UnknownColumn` if the class has no such column.
    pub fn try_get(&self, column: &str) -> Result<&Value> {
        self.get(column)
            .ok_or_else(|| Error::unknown_column(self.class_name(), column))
    }

    /// Returns a column value, treating unknown columns as nil.
    #[must_use]
    pub fn value(&self, column: &str) -> &Value {
        const NIL: &Value = &Value::Nil;
        self.get(column).unwrap_or(NIL)
    }

    /// Returns all values in layout order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0.values
    }

    /// Returns the value of the variant column, if the class has one.
    #[must_use]
    pub fn variant_tag(&self) -> Option<&str> {
        self.0
            .layout
            .variant_slot()
            .and_then(|i| self.0.values[i].as_str())
    }

    /// Returns the names of the flags set in a bitmask column.
    ///
    /// # Errors
    ///
    /// Returns `UnknownColumn` if the column is missing or not a bitmask.
    pub fn flags(&self, column: &str) -> Result<Vec<&str>> {
        let col = self
            .0
            .layout
            .column(column)
            .ok_or_else(|| Error::unknown_column(self.class_name(), column))?;
        let bitmask = col
            .caster()
            .as_bitmask()
            .ok_or_else(|| Error::unknown_column(self.class_name(), format!("{column} (bitmask)")))?;
        Ok(self.value(column).as_bits().map(|b| bitmask.names(b)).unwrap_or_default())
    }

    /// Returns the integer code of an enum column.
    ///
    /// # Errors
    ///
    /// Returns `UnknownColumn` if the column is missing or not an enum.
    pub fn enum_code(&self, column: &str) -> Result<Option<i64>> {
        let col = self
            .0
            .layout
            .column(column)
            .ok_or_else(|| Error::unknown_column(self.class_name(), column))?;
        let enumeration = col
            .caster()
            .as_enum()
            .ok_or_else(|| Error::unknown_column(self.class_name(), format!("{column} (enum)")))?;
        Ok(self.value(column).as_str().and_then(|name| enumeration.code_of(name)))
    }

    /// Converts every column back to its wire form.
    #[must_use]
    pub fn to_raw(&self) -> RawObject {
        self.0
            .layout
            .columns()
            .iter()
            .zip(self.0.values.iter())
            .map(|(column, value)| (column.name().to_string(), column.cast_out(value)))
            .collect()
    }

    /// Returns true if both handles are the same record.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl PartialEq for Record {
    /// Field equality: same class, id, and values.
    fn eq(&self, other: &Self) -> bool {
        self.class() == other.class() && self.id() == other.id() && self.values() == other.values()
    }
}

impl Eq for Record {}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.class_name());
        for (column, value) in self.0.layout.columns().iter().zip(self.0.values.iter()) {
            s.field(column.name(), value);
        }
        s.finish()
    }
}

// =============================================================================
// RecordBuilder
// =============================================================================

/// Builds a new record; published records are never modified.
#[derive(Clone)]
pub struct RecordBuilder {
    layout: Arc<Layout>,
    values: Vec<Value>,
}

impl RecordBuilder {
    /// Starts a record with every column at its default.
    #[must_use]
    pub fn new(layout: Arc<Layout>) -> Self {
        let values = layout.defaults();
        Self { layout, values }
    }

    /// Starts a copy of an existing record.
    #[must_use]
    pub fn copy_of(record: &Record) -> Self {
        Self {
            layout: Arc::clone(record.layout()),
            values: record.values().to_vec(),
        }
    }

    /// Starts a record of another class seeded from `record`.
    ///
    /// Columns shared by name keep their current value; columns only the new
    /// class has start at their default; the rest are dropped.
    #[must_use]
    pub fn reseed(layout: Arc<Layout>, record: &Record) -> Self {
        let values = layout
            .columns()
            .iter()
            .map(|c| {
                record
                    .get(c.name())
                    .cloned()
                    .unwrap_or_else(|| c.default_value().clone())
            })
            .collect();
        Self { layout, values }
    }

    /// Returns the layout being built.
    #[must_use]
    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    /// Sets an already cast value.
    ///
    /// # Errors
    ///
    /// Returns `UnknownColumn` if the class has no such column.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let slot = self.slot(column)?;
        self.values[slot] = value.into();
        Ok(self)
    }

    /// Casts and sets a raw value.
    ///
    /// # Errors
    ///
    /// Returns `UnknownColumn` for a missing column or `Casting` for a value
    /// the column rejects.
    pub fn set_raw(&mut self, column: &str, raw: &RawValue) -> Result<&mut Self> {
        let slot = self.slot(column)?;
        self.values[slot] = self.layout.columns()[slot].cast_in(self.layout.class_name(), raw)?;
        Ok(self)
    }

    /// Builder form of [`RecordBuilder::set`].
    ///
    /// # Errors
    ///
    /// Returns `UnknownColumn` if the class has no such column.
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(column, value)?;
        Ok(self)
    }

    /// Builder form of [`RecordBuilder::set_raw`].
    ///
    /// # Errors
    ///
    /// Returns `UnknownColumn` or `Casting`.
    pub fn with_raw(mut self, column: &str, raw: &RawValue) -> Result<Self> {
        self.set_raw(column, raw)?;
        Ok(self)
    }

    /// Sets the identifier.
    pub fn set_id(&mut self, id: RecordId) -> &mut Self {
        self.values[self.layout.id_slot()] = Value::Int(id.get());
        self
    }

    pub(crate) fn set_slot(&mut self, slot: usize, value: Value) {
        self.values[slot] = value;
    }

    pub(crate) fn set_raw_interned(
        &mut self,
        slot: usize,
        raw: &RawValue,
        interner: &mut ValueInterner,
    ) -> Result<()> {
        let column = &self.layout.columns()[slot];
        self.values[slot] = interner.cast(self.layout.class_name(), column, raw)?;
        Ok(())
    }

    /// Finishes the record, assigning it a fresh serial.
    ///
    /// A subclass record always carries its own class in the variant column.
    ///
    /// # Errors
    ///
    /// Returns `Casting` if the identifier is missing.
    pub fn build(mut self) -> Result<Record> {
        if let Some((slot, tag)) = self.layout.variant_tag() {
            self.values[slot] = tag.clone();
        }
        let id = self.values[self.layout.id_slot()].as_int().ok_or_else(|| {
            Error::casting(self.layout.class_name(), "id", "null", "record has no id")
        })?;
        Ok(Record(Arc::new(RecordData {
            layout: self.layout,
            id: RecordId(id),
            serial: Serial::next(),
            values: self.values.into_boxed_slice(),
        })))
    }

    fn slot(&self, column: &str) -> Result<usize> {
        self.layout
            .slot(column)
            .ok_or_else(|| Error::unknown_column(self.layout.class_name(), column))
    }
}

impl fmt::Debug for RecordBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordBuilder")
            .field("class", &self.layout.class_name())
            .field("values", &self.values)
            .finish()
    }
}
