//! A loader reading the tables of another dataset.
//!
//! The source's records, diffs already merged, become the new dataset's
//! source data. When both datasets share one catalog the records themselves
//! are reused; otherwise they are rebuilt from the exported wire form.

use std::sync::Arc;

use mastertable_foundation::{Error, RawPayload, Result};
use mastertable_storage::{Dataset, LoadRequest, Loader, Record, RecordStore, Store, build_rows};
use tracing::trace;

/// Serves the loaded tables of a source dataset.
#[derive(Clone, Debug)]
pub struct DatasetLoader {
    source: Arc<Dataset>,
}

impl DatasetLoader {
    /// Creates a loader over `source`.
    #[must_use]
    pub fn new(source: Arc<Dataset>) -> Self {
        Self { source }
    }

    /// Returns the dataset read from.
    #[must_use]
    pub fn source(&self) -> &Arc<Dataset> {
        &self.source
    }

    fn shares_catalog(&self, request: &LoadRequest<'_>) -> bool {
        std::ptr::eq(Arc::as_ptr(self.source.catalog()), request.catalog)
    }
}

impl Loader for DatasetLoader {
    fn read_raw(&self, request: &LoadRequest<'_>) -> Result<RawPayload> {
        let table = request.table_name();
        let class = request.class_def().name();
        let loaded = self
            .source
            .store_by_name(class)
            .is_ok_and(Store::is_loaded);
        if !loaded {
            return Err(Error::source_unavailable(table, "table not loaded in source dataset"));
        }
        trace!(table, "exporting table from source dataset");
        self.source
            .export(class)
            .map_err(|e| Error::source_unavailable(table, e.to_string()))
    }

    fn build_records(&self, request: &LoadRequest<'_>, raw: &RawPayload) -> Result<Vec<Record>> {
        if !self.shares_catalog(request) {
            return build_rows(request, raw);
        }
        let store = self.source.store(request.class)?;
        Ok(store.all().to_vec())
    }
}
