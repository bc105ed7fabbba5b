//! Raw payloads as delivered by loaders, and their digests.
//!
//! Raw values use the JSON data model: the same encoding is used by loader
//! payloads and by diff overlay documents, so both pass through the same
//! column casts.

use std::fmt;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

/// A raw, uncast value (scalar or nested structure).
pub type RawValue = serde_json::Value;

/// A raw JSON object (`column -> value`).
pub type RawObject = serde_json::Map<String, RawValue>;

/// Tabular raw data for one table: a header plus positional rows.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPayload {
    /// Column names, in source order.
    pub columns: Vec<String>,
    /// Rows, each with one value per column.
    pub rows: Vec<Vec<RawValue>>,
}

impl RawPayload {
    /// Creates an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a payload with the given header and no rows.
    #[must_use]
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    #[must_use]
    pub fn with_row(mut self, row: Vec<RawValue>) -> Self {
        self.rows.push(row);
        self
    }

    /// Builds a payload from a list of JSON objects.
    ///
    /// The header is the union of keys in order of first appearance; a key
    /// missing from an object becomes `null` in that row.
    #[must_use]
    pub fn from_objects(objects: &[RawObject]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for object in objects {
            for key in object.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = objects
            .iter()
            .map(|object| {
                columns
                    .iter()
                    .map(|c| object.get(c).cloned().unwrap_or(RawValue::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the payload has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the position of a column in the header.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Computes the fingerprint of this payload.
    #[must_use]
    pub fn digest(&self) -> Digest {
        let mut hasher = FxHasher::default();
        self.columns.hash(&mut hasher);
        self.rows.len().hash(&mut hasher);
        for row in &self.rows {
            row.len().hash(&mut hasher);
            for value in row {
                hash_raw(value, &mut hasher);
            }
        }
        Digest {
            raw: hasher.finish(),
            diff: None,
        }
    }
}

/// Fingerprint of a loaded payload, optionally combined with the diff
/// fragment applied on top of it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Digest {
    raw: u64,
    diff: Option<u64>,
}

impl Digest {
    /// Combines this digest with the fingerprint of a diff fragment.
    #[must_use]
    pub fn with_diff(self, fragment: Option<&RawValue>) -> Self {
        Self {
            raw: self.raw,
            diff: fragment.map(fingerprint),
        }
    }

    /// Returns the payload part of the digest.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.raw
    }

    /// Returns the diff part of the digest, if a diff was combined.
    #[must_use]
    pub const fn diff(self) -> Option<u64> {
        self.diff
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.raw)?;
        if let Some(diff) = self.diff {
            write!(f, "/{diff:016x}")?;
        }
        Ok(())
    }
}

/// Fingerprints a single raw value.
#[must_use]
pub fn fingerprint(value: &RawValue) -> u64 {
    let mut hasher = FxHasher::default();
    hash_raw(value, &mut hasher);
    hasher.finish()
}

/// Feeds a raw value into a hasher.
///
/// Object keys are visited in sorted order so the result does not depend on
/// map iteration order.
pub fn hash_raw<H: Hasher>(value: &RawValue, state: &mut H) {
    match value {
        RawValue::Null => 0u8.hash(state),
        RawValue::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        RawValue::Number(n) => {
            2u8.hash(state);
            if let Some(i) = n.as_i64() {
                i.hash(state);
            } else if let Some(u) = n.as_u64() {
                u.hash(state);
            } else if let Some(f) = n.as_f64() {
                f.to_bits().hash(state);
            }
        }
        RawValue::String(s) => {
            3u8.hash(state);
            s.hash(state);
        }
        RawValue::Array(items) => {
            4u8.hash(state);
            items.len().hash(state);
            for item in items {
                hash_raw(item, state);
            }
        }
        RawValue::Object(map) => {
            5u8.hash(state);
            map.len().hash(state);
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                key.hash(state);
                hash_raw(&map[key.as_str()], state);
            }
        }
    }
}

/// Renders a raw value compactly for error messages and intern keys.
#[must_use]
pub fn render(value: &RawValue) -> String {
    value.to_string()
}
