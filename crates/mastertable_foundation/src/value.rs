//! Internal column values held by records.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::raw::{RawValue, hash_raw};

/// Internal representation of one column value of a record.
///
/// Values are immutable and cheaply cloneable. Structured values are shared
/// behind `Arc` so interned values can be reused across records.
#[derive(Clone)]
pub enum Value {
    /// The nil value (absent, null, or blank input).
    Nil,
    /// Boolean value.
    Bool(bool),
    /// Integer and id column values.
    Int(i64),
    /// Float column values.
    Float(f64),
    /// String value.
    String(Arc<str>),
    /// Symbolic name (enum members, type names).
    Symbol(Arc<str>),
    /// Timestamp truncated to whole seconds.
    Time(DateTime<Utc>),
    /// Decoded structured value.
    Json(Arc<RawValue>),
    /// Packed bitmask.
    Bits(u64),
}

impl Value {
    /// Returns true for `Nil`.
    #[must_use]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Returns a short name for the value's variant.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Time(_) => "time",
            Self::Json(_) => "json",
            Self::Bits(_) => "bits",
        }
    }

    /// Returns the boolean, if this is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer, if this is one.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the float, if this is one.
    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns ints and floats widened to `f64`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract string content (strings and symbols).
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to extract a timestamp.
    #[must_use]
    pub const fn as_time(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Time(t) => Some(t),
            _ => None,
        }
    }

    /// Attempts to extract a structured value.
    #[must_use]
    pub fn as_json(&self) -> Option<&RawValue> {
        match self {
            Self::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Attempts to extract packed bits.
    #[must_use]
    pub const fn as_bits(&self) -> Option<u64> {
        match self {
            Self::Bits(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns true for everything except nil and `false`.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) | (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Time(a), Self::Time(b)) => a == b,
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Bits(a), Self::Bits(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Nil => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(n) => n.hash(state),
            Self::Float(n) => n.to_bits().hash(state),
            Self::String(s) | Self::Symbol(s) => s.hash(state),
            Self::Time(t) => t.timestamp().hash(state),
            Self::Json(v) => hash_raw(v, state),
            Self::Bits(b) => b.hash(state),
        }
    }
}

impl PartialOrd for Value {
    /// Orders values of the same variant; nil sorts before everything.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Nil, Self::Nil) => Some(Ordering::Equal),
            (Self::Nil, _) => Some(Ordering::Less),
            (_, Self::Nil) => Some(Ordering::Greater),
            (Self::Bool(a), Self::Bool(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Int(b)) => a.partial_cmp(b),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(_), Self::Float(b)) => self.as_number()?.partial_cmp(b),
            (Self::Float(a), Self::Int(_)) => a.partial_cmp(&other.as_number()?),
            (Self::String(a), Self::String(b)) | (Self::Symbol(a), Self::Symbol(b)) => {
                a.partial_cmp(b)
            }
            (Self::Time(a), Self::Time(b)) => a.partial_cmp(b),
            (Self::Bits(a), Self::Bits(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n:?}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Symbol(s) => write!(f, ":{s}"),
            Self::Time(t) => write!(f, "#time {}", t.format("%Y-%m-%d %H:%M:%S")),
            Self::Json(v) => write!(f, "#json {v}"),
            Self::Bits(b) => write!(f, "#bits {b:#b}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(f, "nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::String(s) | Self::Symbol(s) => write!(f, "{s}"),
            Self::Time(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
            Self::Json(v) => write!(f, "{v}"),
            Self::Bits(b) => write!(f, "{b}"),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s.into())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Time(t)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Nil, Into::into)
    }
}
