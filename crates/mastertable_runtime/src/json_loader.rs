//! A loader reading one JSON file per table from a directory.
//!
//! `<dir>/<table>.json` holds either a list of row objects
//! (`[{"id": 1, ...}, ...]`) or a tabular document
//! (`{"columns": [...], "rows": [[...], ...]}`).

use std::fs;
use std::path::{Path, PathBuf};

use mastertable_foundation::{Error, ErrorContext, ErrorKind, RawObject, RawPayload, RawValue, Result};
use mastertable_storage::{LoadRequest, Loader};
use tracing::trace;

/// Reads table payloads from JSON files.
#[derive(Clone, Debug)]
pub struct JsonDirLoader {
    dir: PathBuf,
}

impl JsonDirLoader {
    /// Creates a loader over `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory read from.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file holding a table.
    #[must_use]
    pub fn path_for(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.json"))
    }
}

impl Loader for JsonDirLoader {
    fn read_raw(&self, request: &LoadRequest<'_>) -> Result<RawPayload> {
        let table = request.table_name();
        let path = self.path_for(table);
        trace!(table, path = %path.display(), "reading table file");

        let text = fs::read_to_string(&path).map_err(|e| {
            Error::source_unavailable(table, format!("failed to read '{}': {e}", path.display()))
        })?;
        parse_payload(&text).map_err(|e| e.with_context(ErrorContext::new().with_table(table)))
    }
}

/// Parses a table document in either accepted shape.
///
/// # Errors
///
/// Returns `Serialization` for invalid JSON or an unrecognised shape.
pub fn parse_payload(text: &str) -> Result<RawPayload> {
    let value: RawValue = serde_json::from_str(text)
        .map_err(|e| Error::new(ErrorKind::Serialization(e.to_string())))?;

    match value {
        RawValue::Array(items) => {
            let objects = items
                .into_iter()
                .enumerate()
                .map(|(index, item)| match item {
                    RawValue::Object(object) => Ok(object),
                    other => Err(Error::new(ErrorKind::Serialization(format!(
                        "row {index} is not an object: {other}"
                    )))),
                })
                .collect::<Result<Vec<RawObject>>>()?;
            Ok(RawPayload::from_objects(&objects))
        }
        RawValue::Object(_) => {
            let payload: RawPayload = serde_json::from_value(value)
                .map_err(|e| Error::new(ErrorKind::Serialization(e.to_string())))?;
            if let Some(index) = payload.rows.iter().position(|r| r.len() != payload.columns.len()) {
                return Err(Error::new(ErrorKind::Serialization(format!(
                    "row {index} has {} values for {} columns",
                    payload.rows[index].len(),
                    payload.columns.len()
                ))));
            }
            Ok(payload)
        }
        other => Err(Error::new(ErrorKind::Serialization(format!(
            "expected a list of rows or a columns/rows document, found {other}"
        )))),
    }
}
