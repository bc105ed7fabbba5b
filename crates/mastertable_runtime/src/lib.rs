//! Source adapters and snapshots for mastertable.
//!
//! This crate provides:
//! - [`JsonDirLoader`] - One JSON file per table
//! - [`DatasetLoader`] - The loaded tables of another dataset
//! - [`SnapshotLoader`] - `MessagePack` snapshots of loaded datasets
//! - [`save_dataset`] - Writes a snapshot of a dataset's loaded tables

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod dataset_loader;
pub mod json_loader;
pub mod serialize;

pub use dataset_loader::DatasetLoader;
pub use json_loader::{JsonDirLoader, parse_payload};
pub use serialize::{
    SNAPSHOT_VERSION, Snapshot, SnapshotLoader, from_bytes, load_snapshot, save_dataset, to_bytes,
};
