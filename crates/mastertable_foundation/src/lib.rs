//! Core values, column casting, and errors for mastertable.
//!
//! This crate provides:
//! - [`Value`] - The internal value type held by records
//! - [`RecordId`] and [`Serial`] - Record identifiers and load-scoped handles
//! - [`Column`] and [`ColumnCast`] - Typed column descriptors and casting
//! - [`RawPayload`] and [`Digest`] - Raw loader payloads and fingerprints
//! - [`ValueInterner`] - Sharing of repeated cast results
//! - [`Frozen`] - Shared immutable result lists
//! - [`Error`] - Rich error types with context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collections;
pub mod column;
pub mod error;
pub mod id;
pub mod intern;
pub mod raw;
pub mod value;

pub use collections::Frozen;
pub use column::{BitmaskCast, Column, ColumnCast, ColumnRole, ColumnType, EnumCast};
pub use error::{Error, ErrorContext, ErrorKind, Result};
pub use id::{RecordId, Serial};
pub use intern::ValueInterner;
pub use raw::{Digest, RawObject, RawPayload, RawValue, fingerprint, hash_raw, render};
pub use value::Value;
