//! Dataset snapshots using `MessagePack`.
//!
//! A snapshot holds the wire form of every loaded base table, diffs already
//! merged. [`SnapshotLoader`] serves it back as a source, so a dataset can be
//! restored without reaching the original data.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use mastertable_foundation::{Error, ErrorKind, RawPayload, Result};
use mastertable_storage::{Dataset, LoadRequest, Loader};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Every base table's payload, by table name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version.
    pub version: u32,
    /// Payloads by table name.
    pub tables: BTreeMap<String, RawPayload>,
}

impl Snapshot {
    /// Captures the loaded base tables of a dataset.
    ///
    /// Tables that were never loaded are left out.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if a base class has no table.
    pub fn capture(dataset: &Dataset) -> Result<Self> {
        let mut tables = BTreeMap::new();
        for def in dataset.catalog().bases() {
            if !dataset.store(def.id())?.is_loaded() {
                continue;
            }
            tables.insert(def.table_name().to_string(), dataset.export(def.name())?);
        }
        Ok(Self {
            version: SNAPSHOT_VERSION,
            tables,
        })
    }
}

/// Encodes a snapshot as `MessagePack` with named fields.
///
/// # Errors
///
/// Returns `Serialization` if encoding fails.
pub fn to_bytes(snapshot: &Snapshot) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(snapshot).map_err(|e| Error::new(ErrorKind::Serialization(e.to_string())))
}

/// Deserializes a snapshot from `MessagePack` bytes.
///
/// # Errors
///
/// Returns an error if deserialization fails or the version is unknown.
pub fn from_bytes(bytes: &[u8]) -> Result<Snapshot> {
    let snapshot: Snapshot = rmp_serde::from_slice(bytes)
        .map_err(|e| Error::new(ErrorKind::Serialization(e.to_string())))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(Error::new(ErrorKind::Serialization(format!(
            "unsupported snapshot version {}",
            snapshot.version
        ))));
    }
    Ok(snapshot)
}

/// Saves the loaded tables of a dataset to a file, replacing any existing
/// contents.
///
/// # Errors
///
/// Returns `Io` if the file cannot be written, or `Serialization` if the
/// snapshot cannot be encoded.
pub fn save_dataset<P: AsRef<Path>>(dataset: &Dataset, path: P) -> Result<()> {
    let path = path.as_ref();
    let snapshot = Snapshot::capture(dataset)?;
    let bytes = to_bytes(&snapshot)?;

    let mut writer = BufWriter::new(File::create(path).map_err(|e| io_error("create", path, &e))?);
    writer
        .write_all(&bytes)
        .and_then(|()| writer.flush())
        .map_err(|e| io_error("write", path, &e))?;

    debug!(path = %path.display(), tables = snapshot.tables.len(), "saved snapshot");
    Ok(())
}

/// Loads a snapshot from a `MessagePack` file.
///
/// # Errors
///
/// Returns `Io` if the file cannot be read, or `Serialization` if its
/// contents are not a snapshot.
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Snapshot> {
    let path = path.as_ref();
    let mut bytes = Vec::new();
    File::open(path)
        .map(BufReader::new)
        .and_then(|mut reader| reader.read_to_end(&mut bytes))
        .map_err(|e| io_error("read", path, &e))?;
    from_bytes(&bytes)
}

fn io_error(action: &str, path: &Path, e: &std::io::Error) -> Error {
    Error::new(ErrorKind::Io(format!("cannot {action} snapshot {}: {e}", path.display())))
}

/// A loader serving the tables of a snapshot.
#[derive(Clone, Debug)]
pub struct SnapshotLoader {
    snapshot: Snapshot,
}

impl SnapshotLoader {
    /// Serves an in-memory snapshot.
    #[must_use]
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }

    /// Reads a snapshot file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(load_snapshot(path)?))
    }

    /// Returns the snapshot being served.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

impl Loader for SnapshotLoader {
    fn read_raw(&self, request: &LoadRequest<'_>) -> Result<RawPayload> {
        let table = request.table_name();
        self.snapshot
            .tables
            .get(table)
            .cloned()
            .ok_or_else(|| Error::source_unavailable(table, "table missing from snapshot"))
    }
}
