//! Value interning for repeated column casts.
//!
//! Master data repeats the same strings, timestamps, and structures across
//! many rows. When a column is internable, equal raw inputs are cast once
//! and every record shares the resulting value.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::column::Column;
use crate::error::Result;
use crate::raw::{RawValue, render};
use crate::value::Value;

/// Cache of cast results keyed by cast implementation and rendered raw input.
///
/// One interner lives for the duration of a single table load and is shared
/// by every class of a hierarchy, so a subclass that redeclares a column
/// with another type gets its own entries.
#[derive(Default)]
pub struct ValueInterner {
    entries: FxHashMap<(usize, String), Value>,
    hits: usize,
}

impl ValueInterner {
    /// Creates an empty interner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Casts `raw` through `column`, reusing an earlier result when possible.
    ///
    /// Columns that are not internable are cast directly. Failed casts are
    /// never cached.
    ///
    /// # Errors
    ///
    /// Returns the column's casting error.
    pub fn cast(&mut self, class: &str, column: &Column, raw: &RawValue) -> Result<Value> {
        if !column.is_internable() || raw.is_null() {
            return column.cast_in(class, raw);
        }

        let key = (column.cast_identity(), render(raw));
        if let Some(value) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(value.clone());
        }

        let value = column.cast_in(class, raw)?;
        self.entries.insert(key, value.clone());
        Ok(value)
    }

    /// Returns the number of distinct cached values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns how many casts were served from the cache.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Drops every cached value.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
    }
}

impl fmt::Debug for ValueInterner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueInterner")
            .field("entries", &self.entries.len())
            .field("hits", &self.hits)
            .finish()
    }
}
