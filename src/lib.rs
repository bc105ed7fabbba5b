//! Mastertable - Read-mostly master data with swappable immutable snapshots
//!
//! Re-exports the layer crates under short names. Each layer only depends on
//! the ones below it.
//!
//! ```text
//! Layer 2: mastertable_runtime     JSON directory loader, MessagePack snapshots
//! Layer 1: mastertable_storage     Catalog, tables, datasets, diffs, active dataset
//! Layer 0: mastertable_foundation  Values, columns, record ids, digests, errors
//! ```

pub use mastertable_foundation as foundation;
pub use mastertable_runtime as runtime;
pub use mastertable_storage as storage;
