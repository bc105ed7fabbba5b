//! Error types for the mastertable system.
//!
//! Every fallible operation returns [`Error`]: a matchable [`ErrorKind`] plus
//! optional [`ErrorContext`] naming the table, record, and column involved.

use std::fmt;

use thiserror::Error;

use crate::id::RecordId;

/// Error returned by mastertable operations.
#[derive(Debug, Error)]
#[error("{kind}{}", context_suffix(.context))]
pub struct Error {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Where it went wrong, when known.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates an error without context.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Attaches context, merging with any already present.
    ///
    /// Fields already set are kept; `context` only fills the gaps.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(match self.context.take() {
            Some(existing) => existing.merge(context),
            None => context,
        });
        self
    }

    /// Creates a source unavailable error.
    #[must_use]
    pub fn source_unavailable(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::SourceUnavailable {
            table: table.into(),
            reason: reason.into(),
        })
    }

    /// Creates an unknown column error.
    #[must_use]
    pub fn unknown_column(class: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownColumn {
            class: class.into(),
            column: column.into(),
        })
    }

    /// Creates an assignment error.
    #[must_use]
    pub fn assignment(
        class: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::Assignment {
            class: class.into(),
            column: column.into(),
            value: value.into(),
            reason: reason.into(),
        })
    }

    /// Creates a casting error.
    #[must_use]
    pub fn casting(
        class: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::Casting {
            class: class.into(),
            column: column.into(),
            value: value.into(),
            reason: reason.into(),
        })
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound(what.into()))
    }

    /// Creates an unsupported variant error.
    #[must_use]
    pub fn unsupported_variant(class: impl Into<String>, variant: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedVariant {
            class: class.into(),
            variant: variant.into(),
        })
    }

    /// Creates a schema declaration error.
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Schema(message.into()))
    }

    /// Returns true if this error came from a lookup miss.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, ErrorKind::NotFound(_))
    }
}

/// What went wrong, for matching on.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// The loader could not read the raw payload for a table.
    #[error("source unavailable for table {table}: {reason}")]
    SourceUnavailable {
        /// The table whose source failed.
        table: String,
        /// Description of the failure.
        reason: String,
    },

    /// A patch or payload header named a column the class does not declare.
    #[error("column {column} does not exist on {class}")]
    UnknownColumn {
        /// The class that was targeted.
        class: String,
        /// The missing column name.
        column: String,
    },

    /// A diff patch value could not be assigned.
    #[error("failed to assign {class}.{column} = {value}: {reason}")]
    Assignment {
        /// The class that was targeted.
        class: String,
        /// The column being assigned.
        column: String,
        /// The offending raw value.
        value: String,
        /// Why the assignment failed.
        reason: String,
    },

    /// A raw value could not be cast by its column.
    #[error("cannot cast {class}.{column} from {value}: {reason}")]
    Casting {
        /// The class owning the column.
        class: String,
        /// The column name.
        column: String,
        /// The offending raw value.
        value: String,
        /// Why the cast failed.
        reason: String,
    },

    /// A strict lookup found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A variant selector named a class outside the declared hierarchy.
    #[error("unsupported variant {variant} for {class}")]
    UnsupportedVariant {
        /// The base class being loaded.
        class: String,
        /// The variant name found in the row.
        variant: String,
    },

    /// An ambient lookup ran with no dataset installed.
    #[error("no active dataset in this context")]
    NoActiveDataset,

    /// The catalog declaration is invalid.
    #[error("schema error: {0}")]
    Schema(String),

    /// File or stream I/O failed.
    #[error("i/o error: {0}")]
    Io(String),

    /// Encoding or decoding a snapshot failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Broken invariant or mistyped cache access.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Table, record, and column an error concerns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Table being loaded or queried.
    pub table: Option<String>,
    /// Record identifier being processed.
    pub record_id: Option<RecordId>,
    /// Column being cast or assigned.
    pub column: Option<String>,
}

impl ErrorContext {
    /// Creates a context with nothing set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the table name.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Sets the record identifier.
    #[must_use]
    pub fn with_record(mut self, id: RecordId) -> Self {
        self.record_id = Some(id);
        self
    }

    /// Sets the column name.
    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    fn merge(self, outer: ErrorContext) -> Self {
        Self {
            table: self.table.or(outer.table),
            record_id: self.record_id.or(outer.record_id),
            column: self.column.or(outer.column),
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        if let Some(table) = &self.table {
            write!(f, "table {table}")?;
            sep = ", ";
        }
        if let Some(id) = self.record_id {
            write!(f, "{sep}id {id}")?;
            sep = ", ";
        }
        if let Some(column) = &self.column {
            write!(f, "{sep}column {column}")?;
        }
        Ok(())
    }
}

fn context_suffix(context: &Option<ErrorContext>) -> String {
    context
        .as_ref()
        .map(|c| format!(" ({c})"))
        .unwrap_or_default()
}

/// Result type alias using the mastertable [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
