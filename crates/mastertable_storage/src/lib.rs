//! Tables, datasets, diff overlays, and loaders for mastertable.
//!
//! This crate provides:
//! - [`Catalog`] - Resolved class declarations and variant hierarchies
//! - [`Table`] - Immutable per-class records with id and group indices
//! - [`TestTable`] - Mutable fixture tables with lazy index rebuilds
//! - [`Dataset`] - Snapshot of every table, loaded through a [`Loader`]
//! - [`Overlay`] - Diff documents merged into tables at load time
//! - [`use_dataset`] and [`ClassRef`] - Ambient lookups against the active dataset

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod catalog;
pub mod config;
pub mod context;
pub mod dataset;
pub mod diff;
pub mod index;
pub mod loader;
pub mod record;
pub mod schema;
pub mod store;
pub mod table;
pub mod test_table;
pub mod validation;

pub use cache::{CacheValue, ClassCache, MethodCache, cache_value};
pub use catalog::{Catalog, CatalogBuilder, ClassDef, ClassId, Layout};
pub use config::DatasetConfig;
pub use context::{
    ClassRef, DatasetScope, clear_global, current, install_global, try_current, use_dataset,
};
pub use dataset::{ClassScope, Dataset, DatasetMode};
pub use diff::{METADATA_PREFIX, Overlay, apply_fragment, is_metadata_key};
pub use index::{GroupIndex, IdIndex};
pub use loader::{LoadRequest, Loader, MemoryLoader, build_rows};
pub use record::{Record, RecordBuilder};
pub use schema::{ClassCacheDef, ClassSchema, MethodCacheDef, table_name_for};
pub use store::{RecordStore, Store};
pub use table::{LoadOutcome, Table};
pub use test_table::TestTable;
pub use validation::{
    Errors, RecordErrors, ValidationError, ValidationKind, Validator, validate_record,
};
