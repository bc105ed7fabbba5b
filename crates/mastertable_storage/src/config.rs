//! Configuration for dataset loading.

/// Configuration for a [`Dataset`](crate::Dataset).
///
/// Controls header strictness, timing logs, and value interning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetConfig {
    /// Fail a table load when the payload header names an undeclared column
    /// (false = ignore the column with a warning).
    pub strict_columns: bool,

    /// Log per-phase elapsed time for every load pass.
    pub log_timings: bool,

    /// Empty the scratch cache at the start of every load pass.
    pub clear_cache_on_load: bool,

    /// Share equal cast results between records while building a table.
    pub intern_values: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            strict_columns: true,
            log_timings: true,
            clear_cache_on_load: true,
            intern_values: true,
        }
    }
}

impl DatasetConfig {
    /// Creates a configuration for development with lenient column checks.
    #[must_use]
    pub fn development() -> Self {
        Self {
            strict_columns: false,
            ..Self::default()
        }
    }

    /// Creates a configuration for tests: quiet and without interning.
    #[must_use]
    pub fn for_test() -> Self {
        Self {
            strict_columns: true,
            log_timings: false,
            clear_cache_on_load: true,
            intern_values: false,
        }
    }

    /// Builder method to set column strictness.
    #[must_use]
    pub fn with_strict_columns(mut self, strict: bool) -> Self {
        self.strict_columns = strict;
        self
    }

    /// Builder method to enable/disable timing logs.
    #[must_use]
    pub fn with_log_timings(mut self, log: bool) -> Self {
        self.log_timings = log;
        self
    }

    /// Builder method to keep or clear the scratch cache on load.
    #[must_use]
    pub fn with_clear_cache_on_load(mut self, clear: bool) -> Self {
        self.clear_cache_on_load = clear;
        self
    }

    /// Builder method to enable/disable value interning.
    #[must_use]
    pub fn with_intern_values(mut self, intern: bool) -> Self {
        self.intern_values = intern;
        self
    }
}
