//! Error types for query compilation.

use alloc::string::String;
use core::fmt;

/// Result type alias for compiler operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Source span of a construct in the query text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Location {
    pub fn new(start_line: u32, start_column: u32, end_line: u32, end_column: u32) -> Self {
        Self {
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.start_line, self.start_column, self.end_line, self.end_column
        )
    }
}

/// Broad classification of an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// User-correctable problem with the query.
    Semantic,
    /// A compiler invariant was violated.
    Internal,
    /// Fault surfaced from the metadata snapshot.
    Environment,
}

/// Error types for query compilation.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Table not found.
    TableNotFound {
        name: String,
        location: Option<Location>,
    },
    /// Column or field not found.
    ColumnNotFound {
        table: String,
        column: String,
        location: Option<Location>,
    },
    /// Index named in a hint not found.
    IndexNotFound {
        table: String,
        index: String,
        location: Option<Location>,
    },
    /// Operands of a comparison can never be compared.
    IncomparableTypes {
        left: String,
        right: String,
        location: Option<Location>,
    },
    /// The same hint was given more than once.
    DuplicateHint {
        hint: String,
        location: Option<Location>,
    },
    /// Two select-list entries have the same name.
    DuplicateColumn {
        name: String,
        location: Option<Location>,
    },
    /// A predicate path can be read both as a map-key lookup and as a plain
    /// field of the same index.
    AmbiguousMapKey {
        path: String,
        location: Option<Location>,
    },
    /// The forced index cannot deliver the requested order.
    ForcedIndexConflict {
        forced: String,
        sort_index: String,
        location: Option<Location>,
    },
    /// Construct not supported in this context.
    Unsupported {
        message: String,
        location: Option<Location>,
    },
    /// Invalid schema definition in the metadata snapshot.
    InvalidSchema { message: String },
    /// Other metadata access fault.
    Metadata { message: String },
    /// Internal invariant violation.
    Internal { message: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TableNotFound { name, .. } => write!(f, "Table not found: {}", name),
            Error::ColumnNotFound { table, column, .. } => {
                write!(f, "Column {} not found in table {}", column, table)
            }
            Error::IndexNotFound { table, index, .. } => {
                write!(f, "Index {} not found in table {}", index, table)
            }
            Error::IncomparableTypes { left, right, .. } => {
                write!(f, "Incompatible types for comparison: {} and {}", left, right)
            }
            Error::DuplicateHint { hint, .. } => write!(f, "Duplicate hint: {}", hint),
            Error::DuplicateColumn { name, .. } => {
                write!(f, "Duplicate column name in select list: {}", name)
            }
            Error::AmbiguousMapKey { path, .. } => {
                write!(f, "Ambiguous map-key predicate on path {}", path)
            }
            Error::ForcedIndexConflict {
                forced, sort_index, ..
            } => write!(
                f,
                "Forced index {} conflicts with index {} required by the order-by clause",
                forced, sort_index
            ),
            Error::Unsupported { message, .. } => write!(f, "Unsupported: {}", message),
            Error::InvalidSchema { message } => write!(f, "Invalid schema: {}", message),
            Error::Metadata { message } => write!(f, "Metadata error: {}", message),
            Error::Internal { message } => write!(f, "Internal compiler error: {}", message),
        }?;
        if let Some(loc) = self.location() {
            write!(f, " at {}", loc)?;
        }
        Ok(())
    }
}

impl Error {
    /// Returns the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidSchema { .. } | Error::Metadata { .. } => ErrorCategory::Environment,
            Error::Internal { .. } => ErrorCategory::Internal,
            _ => ErrorCategory::Semantic,
        }
    }

    /// Returns the source location attached to this error, if any.
    pub fn location(&self) -> Option<Location> {
        match self {
            Error::TableNotFound { location, .. }
            | Error::ColumnNotFound { location, .. }
            | Error::IndexNotFound { location, .. }
            | Error::IncomparableTypes { location, .. }
            | Error::DuplicateHint { location, .. }
            | Error::DuplicateColumn { location, .. }
            | Error::AmbiguousMapKey { location, .. }
            | Error::ForcedIndexConflict { location, .. }
            | Error::Unsupported { location, .. } => *location,
            Error::InvalidSchema { .. } | Error::Metadata { .. } | Error::Internal { .. } => None,
        }
    }

    /// Attaches a location to a semantic error that has none yet.
    pub fn at(mut self, loc: Option<Location>) -> Self {
        match &mut self {
            Error::TableNotFound { location, .. }
            | Error::ColumnNotFound { location, .. }
            | Error::IndexNotFound { location, .. }
            | Error::IncomparableTypes { location, .. }
            | Error::DuplicateHint { location, .. }
            | Error::DuplicateColumn { location, .. }
            | Error::AmbiguousMapKey { location, .. }
            | Error::ForcedIndexConflict { location, .. }
            | Error::Unsupported { location, .. } => {
                if location.is_none() {
                    *location = loc;
                }
            }
            Error::InvalidSchema { .. } | Error::Metadata { .. } | Error::Internal { .. } => {}
        }
        self
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound {
            name: name.into(),
            location: None,
        }
    }

    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            table: table.into(),
            column: column.into(),
            location: None,
        }
    }

    /// Creates an index not found error.
    pub fn index_not_found(table: impl Into<String>, index: impl Into<String>) -> Self {
        Error::IndexNotFound {
            table: table.into(),
            index: index.into(),
            location: None,
        }
    }

    /// Creates an incomparable types error.
    pub fn incomparable(left: impl Into<String>, right: impl Into<String>) -> Self {
        Error::IncomparableTypes {
            left: left.into(),
            right: right.into(),
            location: None,
        }
    }

    /// Creates a duplicate hint error.
    pub fn duplicate_hint(hint: impl Into<String>) -> Self {
        Error::DuplicateHint {
            hint: hint.into(),
            location: None,
        }
    }

    /// Creates a duplicate select-column error.
    pub fn duplicate_column(name: impl Into<String>) -> Self {
        Error::DuplicateColumn {
            name: name.into(),
            location: None,
        }
    }

    /// Creates an ambiguous map-key predicate error.
    pub fn ambiguous_map_key(path: impl Into<String>) -> Self {
        Error::AmbiguousMapKey {
            path: path.into(),
            location: None,
        }
    }

    /// Creates a forced-index conflict error.
    pub fn forced_index_conflict(forced: impl Into<String>, sort_index: impl Into<String>) -> Self {
        Error::ForcedIndexConflict {
            forced: forced.into(),
            sort_index: sort_index.into(),
            location: None,
        }
    }

    /// Creates an unsupported construct error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported {
            message: message.into(),
            location: None,
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a metadata fault.
    pub fn metadata(message: impl Into<String>) -> Self {
        Error::Metadata {
            message: message.into(),
        }
    }

    /// Creates an internal invariant violation.
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }
}
